//! `llmgate config`: Show configuration.

use llmgate_config::AppConfig;
use std::path::Path;

pub fn run(config_path: Option<&Path>, default: bool) -> Result<(), Box<dyn std::error::Error>> {
    if default {
        print!("{}", AppConfig::default_toml());
        return Ok(());
    }

    let config =
        super::load_config(config_path).map_err(|e| format!("Failed to load config: {e}"))?;

    if !config.has_api_key() {
        println!("warning: no API key set (set API_SECRET_KEY or [auth].api_key)");
    }
    if config.inference.account_id.is_none() || config.inference.api_token.is_none() {
        println!(
            "warning: inference credentials incomplete (set LLMGATE_INFERENCE_ACCOUNT and LLMGATE_INFERENCE_TOKEN)"
        );
    }

    // Debug output redacts secrets.
    println!("{config:#?}");
    Ok(())
}
