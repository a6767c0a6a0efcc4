//! `llmgate serve`: Start the HTTP gateway.

use std::path::Path;
use tracing::debug;

pub async fn run(
    config_path: Option<&Path>,
    port_override: Option<u16>,
    host_override: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config =
        super::load_config(config_path).map_err(|e| format!("Failed to load config: {e}"))?;

    if let Some(port) = port_override {
        debug!(port, "Port set on the command line");
        config.gateway.port = port;
    }
    if let Some(host) = host_override {
        debug!(host = %host, "Host set on the command line");
        config.gateway.host = host;
    }

    println!("llmgate gateway");
    println!("   Listening:  {}:{}", config.gateway.host, config.gateway.port);
    println!(
        "   Rate limit: {} requests / {}s",
        config.rate_limit.max_requests, config.rate_limit.window_secs
    );
    println!("   Store:      {}", config.store.backend);
    println!("   Model:      {}", config.inference.default_model);

    llmgate_gateway::start(config).await?;

    Ok(())
}
