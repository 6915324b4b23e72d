use clap::Parser;
use crate::error::RelayError;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    // --- Server Args ---
    /// Interface the HTTP API binds to.
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port for the HTTP API.
    #[arg(long, env = "PORT", default_value = "8000")]
    pub port: u16,

    /// Port for the WebSocket relay. The relay is disabled when unset.
    #[arg(long, env = "WS_PORT")]
    pub ws_port: Option<u16>,

    /// Optional API Key clients must send (X-API-Key header for HTTP, ts/sig signature for WebSocket).
    #[arg(long, env = "SERVER_API_KEY")]
    pub server_api_key: Option<String>,

    /// Maximum chat requests accepted per rate limit window. 0 disables the limit.
    #[arg(long, env = "RATE_LIMIT_REQUESTS", default_value = "100")]
    pub rate_limit_requests: u32,

    /// Rate limit window in seconds.
    #[arg(long, env = "RATE_LIMIT_WINDOW", default_value = "60")]
    pub rate_limit_window: u64,

    // --- ASI1 Upstream Args ---
    /// API Key for the ASI1.AI chat completion API
    #[arg(long, env = "ASI_API_KEY", default_value = "", hide_env_values = true)]
    pub asi_api_key: String,

    /// Full URL of the ASI1.AI chat completion endpoint
    #[arg(long, env = "ASI_API_URL", default_value = "https://api.asi1.ai/v1/chat/completions")]
    pub asi_api_url: String,

    /// Model used when a request does not name one
    #[arg(long, env = "ASI_MODEL", default_value = "asi1-mini")]
    pub asi_model: String,

    /// Timeout in seconds for a single upstream call
    #[arg(long, env = "ASI_TIMEOUT_SECS", default_value = "30")]
    pub asi_timeout_secs: u64,

    // --- Conversation Args ---
    /// Number of past messages of a WebSocket conversation sent upstream with each turn.
    #[arg(long, env = "HISTORY_LIMIT", default_value = "20")]
    pub history_limit: usize,

    // --- Logging Args ---
    /// Default log filter (RUST_LOG takes precedence).
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Write JSON log lines to this file instead of the console.
    #[arg(long, env = "LOG_FILE")]
    pub log_file: Option<String>,

    // --- TLS Args ---
    /// Optional path to the TLS certificate file (PEM format). Requires --tls-key-path.
    #[arg(long, env = "TLS_CERT_PATH")]
    pub tls_cert_path: Option<String>,

    /// Optional path to the TLS private key file (PEM format). Requires --tls-cert-path.
    #[arg(long, env = "TLS_KEY_PATH")]
    pub tls_key_path: Option<String>,

    #[arg(long, env = "ENABLE_TLS", default_value = "false")]
    pub enable_tls: bool,
}

impl Args {
    pub fn http_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn ws_addr(&self) -> Option<String> {
        self.ws_port.map(|port| format!("{}:{}", self.host, port))
    }

    /// Certificate and key paths when TLS is on. `--enable-tls` with a missing path is an error.
    pub fn tls_paths(&self) -> Result<Option<(&str, &str)>, RelayError> {
        if !self.enable_tls {
            return Ok(None);
        }
        match (&self.tls_cert_path, &self.tls_key_path) {
            (Some(cert), Some(key)) => Ok(Some((cert.as_str(), key.as_str()))),
            _ =>
                Err(
                    RelayError::Config(
                        "--enable-tls requires both --tls-cert-path and --tls-key-path".to_string()
                    )
                ),
        }
    }

    pub fn api_key(&self) -> Option<String> {
        self.server_api_key.clone().filter(|k| !k.trim().is_empty())
    }
}
