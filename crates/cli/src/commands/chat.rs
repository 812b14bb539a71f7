//! `synapse chat`: one-shot agent run from the terminal.

use synapse_config::AppConfig;
use synapse_core::message::{Conversation, Message, SessionId};

pub async fn run(
    config: AppConfig,
    message: String,
    session: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let agent = synapse_agent::build_agent(&config)
        .await
        .map_err(|e| format!("Agent is not available: {e}"))?;

    let session_id = session
        .filter(|s| !s.trim().is_empty())
        .map(SessionId::from)
        .unwrap_or_else(SessionId::generate);
    let mut conversation = Conversation::new(session_id);
    conversation.push(Message::user(message));

    eprint!("  Thinking...");
    let outcome = agent.run(&mut conversation).await;
    eprint!("\r              \r");

    println!("{}", outcome.response());
    println!();

    let tools = conversation.tools_used();
    if tools.is_empty() {
        println!("  Tools used: none");
    } else {
        println!("  Tools used: {}", tools.join(", "));
    }
    println!("  Status:     {}", outcome.status.as_str());
    println!("  Session:    {}", conversation.id);

    if let Some(error) = outcome.error() {
        return Err(error.to_string().into());
    }
    Ok(())
}
