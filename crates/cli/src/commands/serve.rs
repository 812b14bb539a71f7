//! `synapse serve`: start the HTTP API server.

use synapse_config::AppConfig;

pub async fn run(mut config: AppConfig, port_override: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    println!("Synapse Agents Gateway");
    println!("   Listening:   {}:{}", config.gateway.host, config.gateway.port);
    println!("   Environment: {}", config.environment);
    println!("   Provider:    {} ({})", config.llm.provider, config.llm.model);

    synapse_gateway::start(config).await
}
