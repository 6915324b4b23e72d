use asi_chat_relay::cli::Args;
use asi_chat_relay::logging;
use clap::Parser;
use dotenv::dotenv;
use std::error::Error;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    dotenv().ok();
    let args = Args::parse();
    logging::init(&args)?;

    asi_chat_relay::run(args).await
}
