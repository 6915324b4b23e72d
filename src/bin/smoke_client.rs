use asi_chat_relay::demo::{ run_smoke_suite, sample_conversations, RelayClient };
use clap::Parser;
use dotenv::dotenv;
use log::{ info, error };
use std::error::Error;
use std::process::ExitCode;
use std::time::Duration;

/// Sends the canned conversations to a running relay and reports the outcome.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Base URL of the relay
    #[arg(long, env = "RELAY_URL", default_value = "http://localhost:8000")]
    base_url: String,

    /// API key for relays started with SERVER_API_KEY
    #[arg(long, env = "SERVER_API_KEY")]
    api_key: Option<String>,

    /// Model to request
    #[arg(long, env = "ASI_MODEL", default_value = "asi1-mini")]
    model: String,

    /// Seconds to wait between conversations
    #[arg(long, default_value = "2")]
    pause_secs: u64,

    /// Send a single message through /simple-chat instead of running the suite
    #[arg(long)]
    message: Option<String>,
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn Error + Send + Sync>> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let client = RelayClient::new(args.base_url, args.api_key)?.with_model(args.model);

    if let Some(message) = args.message {
        return match client.simple_chat(&message).await {
            Ok(result) => {
                info!("{}", serde_json::to_string_pretty(&result)?);
                Ok(ExitCode::SUCCESS)
            }
            Err(e) => {
                error!("Simple chat failed: {}", e);
                Ok(ExitCode::FAILURE)
            }
        };
    }

    let report = run_smoke_suite(
        &client,
        &sample_conversations(),
        Duration::from_secs(args.pause_secs)
    ).await;

    Ok(if report.all_passed() { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
