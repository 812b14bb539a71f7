//! `synapse doctor`: diagnose configuration and connectivity.

use synapse_config::AppConfig;
use synapse_rag::{RagClient, RetrievalBackend};

pub async fn run(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    println!("Synapse Doctor");
    println!("==============\n");

    let mut issues = 0;

    println!("  [ok]   Config valid ({} / {})", config.llm.provider, config.llm.model);

    match config.llm.require_api_key() {
        Ok(_) => println!("  [ok]   API key configured for '{}'", config.llm.provider),
        Err(e) => {
            println!("  [fail] {e}");
            issues += 1;
        }
    }

    match RagClient::new(&config.rag) {
        Ok(client) => match client.check_health().await {
            Ok(health) => println!("  [ok]   RAG service reachable at {} ({})", config.rag.url, health.status),
            Err(e) => {
                println!("  [warn] RAG service unreachable at {}: {e}", config.rag.url);
                issues += 1;
            }
        },
        Err(e) => {
            println!("  [fail] RAG client could not be built: {e}");
            issues += 1;
        }
    }

    println!();
    if issues == 0 {
        println!("  All checks passed!");
    } else {
        println!("  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
