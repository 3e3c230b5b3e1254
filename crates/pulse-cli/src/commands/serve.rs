//! Server command implementation

use std::path::Path;

use anyhow::{Context, Result};
use pulse_core::EngineConfig;

use super::open_db;

pub async fn cmd_serve(
    db_path: &Path,
    host: &str,
    port: u16,
    no_auth: bool,
    no_encrypt: bool,
    config: EngineConfig,
) -> Result<()> {
    println!("🚀 Starting Pulse web server...");
    println!("   Database: {}", db_path.display());
    println!("   Listening: http://{}:{}", host, port);

    // Parse API keys from environment (comma-separated)
    let api_keys: Vec<String> = std::env::var("PULSE_API_KEYS")
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    if no_auth {
        println!();
        println!("   ⚠️  Authentication DISABLED - do not expose to network!");
    } else if api_keys.is_empty() {
        println!("   🔒 Authentication: enabled, but PULSE_API_KEYS is empty");
        println!("      Every request will be rejected until a key is configured");
    } else {
        println!("   🔑 API keys: {} configured", api_keys.len());
    }

    let allowed_origins: Vec<String> = std::env::var("PULSE_ALLOWED_ORIGINS")
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    let db = open_db(db_path, no_encrypt)?;
    let server_config = pulse_server::ServerConfig {
        require_auth: !no_auth,
        allowed_origins,
        api_keys,
        engine: config,
    };

    let addr = format!("{}:{}", host, port);
    pulse_server::serve_with_config(db, &addr, server_config)
        .await
        .context("Server failed")?;

    Ok(())
}
