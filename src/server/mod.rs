pub mod api;
pub mod stats;
pub mod websocket;

use crate::cli::Args;
use crate::history::HistoryStore;
use crate::llm::chat::ChatClient;
use self::api::AppState;
use self::stats::RelayStats;
use self::websocket::WsContext;
use log::error;
use std::error::Error;
use std::sync::Arc;

pub struct Server {
    client: Arc<dyn ChatClient>,
    history: Arc<dyn HistoryStore>,
    stats: Arc<RelayStats>,
    args: Args,
}

impl Server {
    pub fn new(
        client: Arc<dyn ChatClient>,
        history: Arc<dyn HistoryStore>,
        args: Args,
    ) -> Self {
        Self {
            client,
            history,
            stats: Arc::new(RelayStats::default()),
            args,
        }
    }

    /// Serves the HTTP API until shutdown; the WebSocket relay runs alongside when configured.
    pub async fn run(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        if let Some(ws_addr) = self.args.ws_addr() {
            self.start_ws_server(ws_addr);
        }

        self.start_http_server().await
    }

    async fn start_http_server(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        let state = AppState::from_args(&self.args, self.client.clone(), self.stats.clone());
        api::start_http_server(&self.args, state).await
    }

    fn start_ws_server(&self, addr: String) {
        let ctx = Arc::new(WsContext {
            client: self.client.clone(),
            history: self.history.clone(),
            stats: self.stats.clone(),
            history_limit: self.args.history_limit,
        });
        let api_key = self.args.api_key();
        let args = self.args.clone();

        tokio::spawn(async move {
            if let Err(e) = websocket::start_ws_server(&addr, ctx, api_key, &args).await {
                error!("WebSocket relay on {} stopped: {}", addr, e);
            }
        });
    }
}
