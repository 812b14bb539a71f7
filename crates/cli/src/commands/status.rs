//! `synapse status`: show configuration and the tool registry.

use synapse_config::AppConfig;

pub async fn run(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    println!("Synapse Status");
    println!("==============");
    println!("  Service:      {}", config.service_name);
    println!("  Environment:  {}", config.environment);
    println!("  Gateway:      {}:{}", config.gateway.host, config.gateway.port);
    println!("  Provider:     {}", config.llm.provider);
    println!("  Model:        {}", config.llm.model);
    println!("  Temperature:  {}", config.llm.temperature);
    println!("  RAG service:  {}", config.rag.url);
    println!("  Iterations:   {}", config.agent.max_iterations);
    println!("  Tool timeout: {}s", config.agent.tool_timeout_secs);

    let registry = synapse_tools::build_registry(&synapse_tools::default_groups(&config)).await;
    let mut tools = registry.summaries();
    tools.sort_by_key(|(name, _)| *name);

    println!();
    println!("  Tools loaded: {}", tools.len());
    for (name, description) in tools {
        let summary = description.split(". ").next().unwrap_or(description);
        println!("    - {name}: {summary}");
    }

    Ok(())
}
