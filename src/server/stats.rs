use serde::Serialize;
use std::sync::atomic::{ AtomicU64, Ordering };

#[derive(Debug, Default)]
pub struct RelayStats {
    chat_requests: AtomicU64,
    upstream_failures: AtomicU64,
    ws_total_connections: AtomicU64,
    ws_active_connections: AtomicU64,
    ws_messages_received: AtomicU64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub chat_requests: u64,
    pub upstream_failures: u64,
    pub ws_total_connections: u64,
    pub ws_active_connections: u64,
    pub ws_messages_received: u64,
}

impl RelayStats {
    pub fn record_chat_request(&self) {
        self.chat_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_upstream_failure(&self) {
        self.upstream_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn ws_connected(&self) {
        self.ws_total_connections.fetch_add(1, Ordering::Relaxed);
        self.ws_active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn ws_disconnected(&self) {
        let _ = self.ws_active_connections.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n|
            n.checked_sub(1)
        );
    }

    pub fn record_ws_message(&self) {
        self.ws_messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            chat_requests: self.chat_requests.load(Ordering::Relaxed),
            upstream_failures: self.upstream_failures.load(Ordering::Relaxed),
            ws_total_connections: self.ws_total_connections.load(Ordering::Relaxed),
            ws_active_connections: self.ws_active_connections.load(Ordering::Relaxed),
            ws_messages_received: self.ws_messages_received.load(Ordering::Relaxed),
        }
    }
}
