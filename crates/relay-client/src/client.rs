//! `ChatClient`: one chat participant over the RPC socket and chat stream.
//!
//! The RPC socket is owned by a background task that keeps reading it, so
//! heartbeat pings are answered while the caller is idle. Requests reach the
//! task over a channel and responses come back through per-request oneshots.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use futures::{SinkExt, StreamExt};
use relay_core::rpc::{CONNECTION_ESTABLISHED, INTERNAL_ERROR, RpcErrorBody, RpcRequest, RpcResponse};
use relay_core::{ClientMessage, CloseReason, RelayedMessage, SessionToken};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, warn};

use crate::error::RpcFailure;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Default deadline for one RPC round trip.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Pending RPC call waiting for its response.
type PendingTx = oneshot::Sender<RpcResponse>;

/// Text sent on the chat stream right after it opens.
pub fn join_announcement(username: &str) -> String {
    format!("Joined chat as {username}")
}

/// Something that arrived on the chat stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChatEvent {
    /// A message relayed from another participant.
    Message(RelayedMessage),
    /// The stream ended. `None` when the server sent no recognised close code.
    Closed(Option<CloseReason>),
}

struct Session {
    username: String,
    token: SessionToken,
}

/// Internal RPC command message.
struct RpcCommand {
    method: String,
    params: Value,
    response_tx: PendingTx,
}

/// A connected chat participant.
pub struct ChatClient {
    base_url: String,
    cmd_tx: mpsc::Sender<RpcCommand>,
    chat: Option<WsStream>,
    session: Option<Session>,
    client_id: Option<String>,
    request_timeout: Duration,
    _handler: JoinHandle<()>,
}

impl ChatClient {
    /// Open the RPC socket at `<base_url>/ws`.
    pub async fn connect(base_url: &str) -> Result<Self> {
        let base_url = base_url.trim_end_matches('/').to_owned();
        let url = format!("{base_url}/ws");
        let (mut rpc, _) = connect_async(url.as_str())
            .await
            .with_context(|| format!("Failed to connect to {url}"))?;

        let client_id = tokio::time::timeout(DEFAULT_REQUEST_TIMEOUT, read_established(&mut rpc))
            .await
            .map_err(|_| anyhow!("no connection.established from {url}"))??;

        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        let handler = tokio::spawn(rpc_handler_loop(rpc, cmd_rx));

        Ok(Self {
            base_url,
            cmd_tx,
            chat: None,
            session: None,
            client_id,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            _handler: handler,
        })
    }

    /// Set the deadline for each RPC round trip.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Connection ID the server assigned to the RPC socket.
    pub fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }

    /// Username of the current session.
    pub fn username(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.username.as_str())
    }

    /// Whether a session is held.
    pub fn is_logged_in(&self) -> bool {
        self.session.is_some()
    }

    /// Whether the chat stream is open.
    pub fn has_chat_stream(&self) -> bool {
        self.chat.is_some()
    }

    /// Log in and open the chat stream.
    ///
    /// Returns `false` if the username is taken. On success the join
    /// announcement is sent on the new stream, which binds it to the session.
    /// If the stream cannot be opened or announced, the server session is
    /// released again and the client stays logged out.
    pub async fn login(&mut self, username: &str) -> Result<bool> {
        if let Some(ref session) = self.session {
            bail!("already logged in as {}", session.username);
        }

        let result = self
            .call("session.login", json!({ "username": username }))
            .await?;
        if result["status"] != "OK" {
            return Ok(false);
        }
        let token = SessionToken::from(
            result["token"]
                .as_str()
                .ok_or_else(|| anyhow!("login succeeded without a token"))?,
        );

        let chat = match self.open_chat(username, &token).await {
            Ok(chat) => chat,
            Err(e) => {
                let release = json!({ "username": username, "token": token });
                if let Err(logout_err) = self.call("session.logout", release).await {
                    warn!(error = %logout_err, username, "failed to release session after login error");
                }
                return Err(e);
            }
        };

        self.chat = Some(chat);
        self.session = Some(Session {
            username: username.to_owned(),
            token,
        });
        debug!(username, "logged in");
        Ok(true)
    }

    /// Connect `/chat` and send the join announcement on it.
    async fn open_chat(&self, username: &str, token: &SessionToken) -> Result<WsStream> {
        let url = format!("{}/chat", self.base_url);
        let (mut chat, _) = connect_async(url.as_str())
            .await
            .with_context(|| format!("Failed to open chat stream at {url}"))?;

        let frame = ClientMessage::new(username, token.clone(), join_announcement(username));
        chat.send(Message::text(serde_json::to_string(&frame)?))
            .await
            .context("Failed to send join announcement")?;
        Ok(chat)
    }

    /// Send a chat message.
    pub async fn send(&mut self, body: &str) -> Result<()> {
        let session = self.session.as_ref().context("not logged in")?;
        let frame = ClientMessage::new(session.username.as_str(), session.token.clone(), body);
        let text = serde_json::to_string(&frame)?;

        let chat = self.chat.as_mut().context("chat stream is not open")?;
        chat.send(Message::text(text))
            .await
            .context("Failed to send chat message")
    }

    /// Wait for the next event on the chat stream.
    pub async fn next_message(&mut self) -> Result<ChatEvent> {
        loop {
            let chat = self.chat.as_mut().context("chat stream is not open")?;
            match chat.next().await {
                Some(Ok(Message::Text(text))) => {
                    let message: RelayedMessage =
                        serde_json::from_str(&text).context("invalid relayed message")?;
                    return Ok(ChatEvent::Message(message));
                }
                Some(Ok(Message::Close(frame))) => {
                    self.chat = None;
                    let reason = frame.and_then(|f| CloseReason::from_code(u16::from(f.code)));
                    debug!(?reason, "chat stream closed by server");
                    return Ok(ChatEvent::Closed(reason));
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    self.chat = None;
                    return Err(e).context("chat stream failed");
                }
                None => {
                    self.chat = None;
                    return Ok(ChatEvent::Closed(None));
                }
            }
        }
    }

    /// Usernames of everyone logged in, sorted.
    pub async fn list_users(&mut self) -> Result<Vec<String>> {
        let params = self.credentials()?;
        let result = self.call("session.listUsers", params).await?;
        let users = result
            .get("users")
            .cloned()
            .ok_or_else(|| anyhow!("listUsers result has no users"))?;
        Ok(serde_json::from_value(users)?)
    }

    /// End the session.
    ///
    /// Returns `false` without contacting the server when not logged in. The
    /// chat stream stays open so the server's close can still be read.
    pub async fn logout(&mut self) -> Result<bool> {
        if self.session.is_none() {
            return Ok(false);
        }
        let params = self.credentials()?;
        let result = self.call("session.logout", params).await?;
        if result["status"] != "OK" {
            return Ok(false);
        }
        self.session = None;
        debug!("logged out");
        Ok(true)
    }

    fn credentials(&self) -> Result<Value> {
        let session = self.session.as_ref().context("not logged in")?;
        Ok(json!({ "username": session.username, "token": session.token }))
    }

    /// Send an RPC request and wait for its response.
    async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(RpcCommand {
                method: method.to_owned(),
                params,
                response_tx: tx,
            })
            .await
            .map_err(|_| anyhow!("RPC socket closed"))?;

        let response = tokio::time::timeout(self.request_timeout, rx)
            .await
            .map_err(|_| anyhow!("{method} timed out after {:?}", self.request_timeout))?
            .map_err(|_| anyhow!("RPC socket closed before {method} was answered"))?;

        if response.success {
            return Ok(response.result.unwrap_or(Value::Null));
        }
        let error = response.error.unwrap_or_else(|| RpcErrorBody {
            code: INTERNAL_ERROR.to_owned(),
            message: "error response without a body".to_owned(),
            details: None,
        });
        Err(RpcFailure {
            method: method.to_owned(),
            code: error.code,
            message: error.message,
        }
        .into())
    }
}

impl std::fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatClient")
            .field("base_url", &self.base_url)
            .field("client_id", &self.client_id)
            .field("username", &self.username())
            .field("chat_open", &self.chat.is_some())
            .finish_non_exhaustive()
    }
}

/// Read frames until `connection.established` and return its client ID.
async fn read_established(ws: &mut WsStream) -> Result<Option<String>> {
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => {
                let Ok(value) = serde_json::from_str::<Value>(&text) else {
                    continue;
                };
                if value.get("type").and_then(Value::as_str) == Some(CONNECTION_ESTABLISHED) {
                    return Ok(value["data"]["clientId"].as_str().map(str::to_owned));
                }
            }
            Some(Ok(Message::Close(_))) | None => bail!("RPC socket closed during handshake"),
            Some(Ok(_)) => {}
            Some(Err(e)) => return Err(e).context("RPC socket failed"),
        }
    }
}

/// Owns the RPC socket: writes requests, routes responses, answers pings.
///
/// Ends when the client is dropped or the socket closes; pending callers then
/// see their oneshot dropped.
async fn rpc_handler_loop(ws: WsStream, mut cmd_rx: mpsc::Receiver<RpcCommand>) {
    let (mut ws_tx, mut ws_rx) = ws.split();
    let mut pending: HashMap<String, PendingTx> = HashMap::new();
    let mut next_id: u64 = 1;

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else { break };
                let id = format!("c{next_id}");
                next_id += 1;

                // Callers that timed out no longer wait.
                pending.retain(|_, tx| !tx.is_closed());

                let request = RpcRequest::new(id.as_str(), cmd.method, Some(cmd.params));
                let Ok(text) = serde_json::to_string(&request) else { continue };
                let _ = pending.insert(id, cmd.response_tx);
                if ws_tx.send(Message::text(text)).await.is_err() {
                    break;
                }
            }
            msg = ws_rx.next() => {
                let Some(Ok(msg)) = msg else { break };
                match msg {
                    Message::Text(text) => {
                        let Ok(value) = serde_json::from_str::<Value>(&text) else { continue };
                        let Some(id) = value.get("id").and_then(Value::as_str) else { continue };
                        let Some(tx) = pending.remove(id) else { continue };
                        match serde_json::from_value::<RpcResponse>(value) {
                            Ok(response) => {
                                let _ = tx.send(response);
                            }
                            Err(e) => warn!(error = %e, "unreadable RPC response"),
                        }
                    }
                    Message::Ping(data) => {
                        if ws_tx.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Message::Close(frame) => {
                        let reason = frame.and_then(|f| CloseReason::from_code(u16::from(f.code)));
                        debug!(?reason, "RPC socket closed by server");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }
}
