pub mod cli;
pub mod demo;
pub mod error;
pub mod history;
pub mod llm;
pub mod logging;
pub mod models;
pub mod server;

use cli::Args;
use history::initialize_history_store;
use llm::{ chat::new_client, LlmConfig };
use log::info;
use server::Server;
use std::error::Error;

pub use error::RelayError;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("--- Core Configuration ---");
    info!("HTTP Address: {}", args.http_addr());
    info!("WebSocket Address: {}", args.ws_addr().as_deref().unwrap_or("disabled"));
    info!("ASI1 API URL: {}", args.asi_api_url);
    info!("ASI1 Model: {}", args.asi_model);
    info!("ASI1 Timeout: {}s", args.asi_timeout_secs);
    info!("API Key Auth: {}", if args.api_key().is_some() { "enabled" } else { "disabled" });
    if args.rate_limit_requests > 0 {
        info!("Rate Limit: {} requests / {}s", args.rate_limit_requests, args.rate_limit_window);
    } else {
        info!("Rate Limit: disabled");
    }
    let tls_on = args.tls_paths()?.is_some();
    info!("TLS: {}", tls_on);
    info!("-------------------------");

    if tls_on {
        // Both rustls crypto backends may be linked; pin ring as the process default.
        let _ = rustls::crypto::ring::default_provider().install_default();
    }

    let client = new_client(&LlmConfig::from(&args))?;
    let history = initialize_history_store(&args);
    let server = Server::new(client, history, args);
    server.run().await?;

    Ok(())
}
