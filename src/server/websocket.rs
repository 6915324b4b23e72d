use crate::cli::Args;
use crate::error::RelayError;
use crate::history::{ to_messages, HistoryStore };
use crate::llm::chat::{ assistant_reply, ChatClient };
use crate::models::chat::{ preview, ChatRequest, Message as UpstreamMessage };
use crate::models::websocket::{ ClientMessage, ServerMessage };
use crate::server::stats::RelayStats;

use std::error::Error;
use std::fs::File;
use std::io::{ self, BufReader };
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use std::collections::HashMap;

use tokio::net::TcpListener;
use tokio::io::{ AsyncRead, AsyncWrite };

use tokio_tungstenite::{ accept_hdr_async, WebSocketStream };
use tokio_tungstenite::tungstenite::handshake::server::{ Request, Response, ErrorResponse };
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_rustls::TlsAcceptor;

use rustls::ServerConfig;
use rustls::pki_types::{ CertificateDer, PrivateKeyDer };
use rustls_pemfile::{ certs, pkcs8_private_keys };

use lazy_static::lazy_static;
use governor::{ RateLimiter, Quota, state::{ InMemoryState, NotKeyed }, clock::DefaultClock };

use hmac::{ Hmac, Mac };
use sha2::Sha256;
use chrono::Utc;
use url::form_urlencoded;

use log::{ debug, info, warn, error };
use futures::{ Sink, SinkExt, StreamExt };
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

const MAX_MESSAGE_SIZE: usize = 1 * 1024 * 1024;
const MAX_CLOCK_SKEW_SECS: u64 = 300;

lazy_static! {
    static ref CONNECTION_LIMITER: RateLimiter<NotKeyed, InMemoryState, DefaultClock> =
        RateLimiter::direct(Quota::per_second(NonZeroU32::new(10).unwrap()));
}

/// Everything a WebSocket session needs to relay turns upstream.
pub struct WsContext {
    pub client: Arc<dyn ChatClient>,
    pub history: Arc<dyn HistoryStore>,
    pub stats: Arc<RelayStats>,
    pub history_limit: usize,
}

fn load_tls_config(
    cert_path: &str,
    key_path: &str
) -> Result<Arc<ServerConfig>, Box<dyn Error + Send + Sync>> {
    let cert_file = File::open(cert_path).map_err(|e|
        format!("Failed to open TLS certificate file '{}': {}", cert_path, e)
    )?;
    let key_file = File::open(key_path).map_err(|e|
        format!("Failed to open TLS key file '{}': {}", key_path, e)
    )?;

    let mut cert_reader = BufReader::new(cert_file);
    let mut key_reader = BufReader::new(key_file);
    let cert_chain: Vec<CertificateDer<'static>> = certs(&mut cert_reader)
        .collect::<Result<_, _>>()
        .map_err(|e| format!("Failed to read certificate(s): {}", e))?;

    let mut keys = pkcs8_private_keys(&mut key_reader);
    let key = match keys.next() {
        Some(Ok(k)) => PrivateKeyDer::Pkcs8(k),
        Some(Err(e)) => {
            return Err(format!("Error reading private key: {}", e).into());
        }
        None => {
            return Err("No PKCS8 private key found in key file".into());
        }
    };

    let config = ServerConfig::builder().with_no_client_auth().with_single_cert(cert_chain, key)?;
    Ok(Arc::new(config))
}

/// Hex HMAC-SHA256 of the unix timestamp `ts`, keyed with the server API key.
pub fn sign_timestamp(secret: &str, ts: &str) -> Result<String, RelayError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|e|
        RelayError::Internal(e.to_string())
    )?;
    mac.update(ts.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn verify_signature(secret: &str, ts: &str, sig: &str, now: i64) -> Result<(), &'static str> {
    let ts_i: i64 = ts.parse().map_err(|_| "invalid timestamp")?;
    if now.abs_diff(ts_i) > MAX_CLOCK_SKEW_SECS {
        return Err("timestamp out of range");
    }

    let expected = hex::decode(sig).map_err(|_| "bad signature")?;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| "bad signature")?;
    mac.update(ts.as_bytes());
    mac.verify_slice(&expected).map_err(|_| "bad signature")
}

fn unauthorized(reason: &str) -> ErrorResponse {
    let mut res = ErrorResponse::new(Some(reason.to_string()));
    *res.status_mut() = StatusCode::UNAUTHORIZED;
    res
}

pub async fn start_ws_server(
    addr: &str,
    ctx: Arc<WsContext>,
    api_key: Option<String>,
    args: &Args,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let tls_acceptor = if let Some((cert_path, key_path)) = args.tls_paths()? {
        info!("TLS enabled. Loading certificate from '{}' and key from '{}'", cert_path, key_path);
        let config = load_tls_config(cert_path, key_path)?;
        Some(TlsAcceptor::from(config))
    } else {
        info!("TLS not enabled. Running plain WebSocket (WS) relay.");
        None
    };

    let listener = TcpListener::bind(addr).await?;
    let protocol = if tls_acceptor.is_some() { "WSS" } else { "WS" };
    info!("{} relay listening on: {}", protocol, addr);

    serve(listener, ctx, api_key, tls_acceptor).await
}

/// Pause before the next `accept` after an error. Per-connection failures retry at once;
/// anything else (fd exhaustion and the like) waits a second.
fn accept_backoff(err: &io::Error) -> Duration {
    match err.kind() {
        | io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::ConnectionReset => Duration::ZERO,
        _ => Duration::from_secs(1),
    }
}

pub async fn serve(
    listener: TcpListener,
    ctx: Arc<WsContext>,
    api_key: Option<String>,
    tls_acceptor: Option<TlsAcceptor>,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                let pause = accept_backoff(&e);
                if pause.is_zero() {
                    debug!("Dropped connection during accept: {}", e);
                } else {
                    error!("Failed to accept WebSocket connection: {}. Retrying in {:?}", e, pause);
                    tokio::time::sleep(pause).await;
                }
                continue;
            }
        };

        if CONNECTION_LIMITER.check().is_err() {
            warn!("Global connection rate limit exceeded for {}. Dropping connection.", peer);
            continue;
        }

        info!("Incoming connection from: {}", peer);
        let ctx_clone = Arc::clone(&ctx);
        let required_api_key = api_key.clone();
        let tls_acceptor_clone = tls_acceptor.clone();

        tokio::spawn(async move {
            let process_result = if let Some(acceptor) = tls_acceptor_clone {
                match acceptor.accept(stream).await {
                    Ok(tls_stream) => {
                        info!("TLS handshake successful for {}", peer);
                        process_connection(peer, tls_stream, ctx_clone, required_api_key).await
                    }
                    Err(e) => {
                        error!("TLS handshake error for {}: {}", peer, e);
                        Err(Box::new(e) as Box<dyn Error + Send + Sync>)
                    }
                }
            } else {
                process_connection(peer, stream, ctx_clone, required_api_key).await
            };

            if let Err(e) = process_result {
                error!("Failed to process connection for {}: {}", peer, e);
            }
        });
    }
}

async fn process_connection<S>(
    peer: SocketAddr,
    stream: S,
    ctx: Arc<WsContext>,
    required_api_key: Option<String>
) -> Result<(), Box<dyn Error + Send + Sync>>
    where S: AsyncRead + AsyncWrite + Unpin + Send + 'static
{
    let auth_callback = |req: &Request, response: Response| -> Result<Response, ErrorResponse> {
        let secret = match &required_api_key {
            Some(k) if !k.is_empty() => k,
            _ => return Ok(response),
        };

        let qs = req.uri().query().unwrap_or("");
        let params: HashMap<String, String> =
            form_urlencoded::parse(qs.as_bytes()).into_owned().collect();

        debug!("Auth params from {}: {:?}", peer, params.keys().collect::<Vec<_>>());

        let ts = params.get("ts").map(|s| s.as_str());
        let sig = params.get("sig").map(|s| s.as_str());

        match (ts, sig) {
            (Some(ts), Some(sig)) => match verify_signature(secret, ts, sig, Utc::now().timestamp()) {
                Ok(()) => {
                    info!("{} authenticated", peer);
                    Ok(response)
                }
                Err(reason) => {
                    warn!("{}: {}", peer, reason);
                    Err(unauthorized(reason))
                }
            },
            _ => {
                warn!("{}: missing ts/sig", peer);
                Err(unauthorized("missing ts/sig"))
            }
        }
    };

    match accept_hdr_async(stream, auth_callback).await {
        Ok(ws) => {
            handle_connection(peer, ws, ctx).await;
            Ok(())
        }
        Err(e) => {
            error!("Handshake failed for {}: {}", peer, e);
            Err(Box::new(e) as _)
        }
    }
}

async fn send_frame<T>(tx: &mut T, frame: &ServerMessage) -> Result<(), WsError>
    where T: Sink<Message, Error = WsError> + Unpin
{
    tx.send(Message::Text(frame.to_json())).await
}

pub async fn handle_connection<S>(
    peer: SocketAddr,
    websocket: WebSocketStream<S>,
    ctx: Arc<WsContext>
)
    where S: AsyncRead + AsyncWrite + Unpin
{
    ctx.stats.ws_connected();
    let (mut tx, mut rx) = websocket.split();
    let conversation_id = Uuid::new_v4().to_string();
    info!("Assigned conversation ID {} to {}", conversation_id, peer);

    let welcome = ServerMessage::Connected { conversation_id: conversation_id.clone() };
    if let Err(e) = send_frame(&mut tx, &welcome).await {
        error!("Failed to send welcome to {}: {}", peer, e);
    }

    while let Some(msg) = rx.next().await {
        match msg {
            Ok(message) => {
                if message.len() > MAX_MESSAGE_SIZE {
                    warn!(
                        "Message from {} exceeds size limit ({} > {})",
                        peer,
                        message.len(),
                        MAX_MESSAGE_SIZE
                    );
                    if send_frame(&mut tx, &ServerMessage::error("Message too large")).await.is_err() {
                        error!("Failed to send size limit error to {}", peer);
                    }
                    let _ = tx.send(Message::Close(None)).await;
                    break;
                }

                match message {
                    Message::Text(text) => {
                        ctx.stats.record_ws_message();
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(ClientMessage::Chat { content }) => {
                                if let Err(e) = send_frame(&mut tx, &ServerMessage::Processing).await {
                                    error!("Error sending processing status to {}: {}", peer, e);
                                    break;
                                }

                                let frame = match relay_turn(&ctx, &conversation_id, &content).await {
                                    Ok(reply) => ServerMessage::Response {
                                        content: reply,
                                        timestamp: Utc::now().timestamp(),
                                    },
                                    Err(e) => {
                                        error!("Relay error for {}: {}", peer, e);
                                        ServerMessage::error(e.to_string())
                                    }
                                };
                                if let Err(e) = send_frame(&mut tx, &frame).await {
                                    error!("Error sending response to {}: {}", peer, e);
                                    break;
                                }
                            }
                            Ok(ClientMessage::Reset) => {
                                if let Err(e) = ctx.history.clear_conversation(&conversation_id).await {
                                    error!("Failed to reset conversation {}: {}", conversation_id, e);
                                }
                                info!("Conversation {} reset by {}", conversation_id, peer);
                                let frame = ServerMessage::Connected { conversation_id: conversation_id.clone() };
                                if send_frame(&mut tx, &frame).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => {
                                error!("Failed to parse message from {}: {}", peer, e);
                                let frame = ServerMessage::error(format!("Failed to parse message: {}", e));
                                if let Err(e) = send_frame(&mut tx, &frame).await {
                                    error!("Error sending parse error to {}: {}", peer, e);
                                    break;
                                }
                            }
                        }
                    }
                    Message::Close(_) => {
                        info!("Received close frame from {}", peer);
                        break;
                    }
                    Message::Ping(ping_data) => {
                        if tx.send(Message::Pong(ping_data)).await.is_err() {
                            error!("Failed to send pong to {}", peer);
                            break;
                        }
                    }
                    Message::Pong(_) => {}
                    Message::Binary(_) => {
                        warn!("Ignoring binary message from {}", peer);
                    }
                    Message::Frame(_) => {}
                }
            }
            Err(e) => {
                match e {
                    | WsError::ConnectionClosed
                    | WsError::Protocol(_)
                    | WsError::Utf8 => {
                        info!("WebSocket connection closed or protocol error for {}: {}", peer, e);
                    }
                    WsError::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::ConnectionReset => {
                        info!("WebSocket connection reset by peer {}", peer);
                    }
                    WsError::Capacity(ref cap_err) => {
                        error!("WebSocket capacity error for {}: {}", peer, cap_err);
                        let _ = send_frame(&mut tx, &ServerMessage::error("Server capacity error")).await;
                    }
                    _ => {
                        error!("Error receiving message from {}: {}", peer, e);
                    }
                }
                break;
            }
        }
    }

    if let Err(e) = ctx.history.clear_conversation(&conversation_id).await {
        error!("Failed to drop conversation {}: {}", conversation_id, e);
    }
    ctx.stats.ws_disconnected();
    info!("WebSocket connection closed for {} (Conv ID: {})", peer, conversation_id);
}

/// Sends the recent history plus `content` upstream; both turns are stored only on success.
async fn relay_turn(ctx: &WsContext, conversation_id: &str, content: &str) -> Result<String, RelayError> {
    if content.trim().is_empty() {
        return Err(RelayError::InvalidRequest("content must not be empty".to_string()));
    }
    info!("WebSocket message on {}: {}", conversation_id, preview(content, 100));

    let past = ctx.history
        .get_conversation(conversation_id, ctx.history_limit.saturating_sub(1)).await?;
    let mut messages = to_messages(&past);
    messages.push(UpstreamMessage::user(content));

    let completion = ctx.client.complete(&ChatRequest::new(messages)).await.map_err(|e| {
        if e.is_upstream() {
            ctx.stats.record_upstream_failure();
        }
        e
    })?;
    let reply = assistant_reply(&completion)?;

    ctx.history.add_message(conversation_id, UpstreamMessage::user(content)).await?;
    ctx.history.add_message(conversation_id, UpstreamMessage::assistant(reply.clone())).await?;
    Ok(reply)
}
