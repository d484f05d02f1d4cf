//! Chrome DevTools Protocol client for a single page target.
//!
//! Commands are matched to responses by id. Events are dropped: every wait
//! in this crate is an explicit poll against the page.

use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::keys::KeySpec;

const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum CdpError {
    #[error("cannot connect to {url}: {reason}")]
    Connect { url: String, reason: String },

    #[error("connection closed")]
    Closed,

    #[error("{method} timed out after {secs}s")]
    Timeout { method: String, secs: u64 },

    #[error("{method} failed ({code}): {message}")]
    Protocol {
        method: String,
        code: i64,
        message: String,
    },

    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("script error: {0}")]
    Script(String),

    #[error("unexpected response to {method}: {reason}")]
    Decode { method: String, reason: String },
}

impl From<CdpError> for wadriver_core::Error {
    fn from(err: CdpError) -> Self {
        match err {
            CdpError::Timeout { .. } => wadriver_core::Error::Timeout(err.to_string()),
            CdpError::Navigation(_) => wadriver_core::Error::Network(err.to_string()),
            _ => wadriver_core::Error::Browser(format!("CDP {}", err)),
        }
    }
}

/// A response frame. Event frames carry no id and are skipped.
#[derive(Debug, Deserialize)]
struct Incoming {
    id: Option<u64>,
    #[serde(default)]
    result: Value,
    error: Option<ProtocolError>,
}

#[derive(Debug, Deserialize)]
struct ProtocolError {
    code: i64,
    message: String,
}

type Reply = std::result::Result<Value, ProtocolError>;
type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Reply>>>>;

/// Hand a text frame to whoever is waiting on its id.
fn route(pending: &Pending, text: &str) {
    let frame = match serde_json::from_str::<Incoming>(text) {
        Ok(frame) => frame,
        Err(e) => {
            trace!(error = %e, "Ignoring undecodable CDP frame");
            return;
        }
    };
    let Some(id) = frame.id else {
        return;
    };
    let waiter = pending
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .remove(&id);
    if let Some(tx) = waiter {
        let reply = match frame.error {
            Some(err) => Err(err),
            None => Ok(frame.result),
        };
        let _ = tx.send(reply);
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Evaluated {
    #[serde(default)]
    result: RemoteObject,
    exception_details: Option<ExceptionDetails>,
}

#[derive(Debug, Default, Deserialize)]
struct RemoteObject {
    #[serde(default)]
    value: Value,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ExceptionDetails {
    text: String,
    exception: Option<RemoteObject>,
}

impl ExceptionDetails {
    fn message(&self) -> String {
        self.exception
            .as_ref()
            .and_then(|e| e.description.clone())
            .unwrap_or_else(|| self.text.clone())
    }
}

/// Page rectangle for a clipped screenshot, in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Clip {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub scale: f64,
}

impl Clip {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
            scale: 1.0,
        }
    }
}

pub struct CdpClient {
    outgoing: mpsc::Sender<String>,
    pending: Pending,
    next_id: AtomicU64,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl CdpClient {
    /// Connect to a page target's `webSocketDebuggerUrl`.
    pub async fn connect(ws_url: &str) -> std::result::Result<Self, CdpError> {
        use futures::{SinkExt, StreamExt};
        use tokio_tungstenite::tungstenite::Message;

        let (socket, _) = tokio_tungstenite::connect_async(ws_url)
            .await
            .map_err(|e| CdpError::Connect {
                url: ws_url.to_string(),
                reason: e.to_string(),
            })?;
        let (mut sink, mut stream) = socket.split();
        let (outgoing, mut queue) = mpsc::channel::<String>(64);
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));

        let writer = tokio::spawn(async move {
            while let Some(frame) = queue.recv().await {
                if let Err(e) = sink.send(Message::Text(frame)).await {
                    warn!(error = %e, "CDP write failed");
                    break;
                }
            }
        });

        let routes = pending.clone();
        let reader = tokio::spawn(async move {
            while let Some(message) = stream.next().await {
                match message {
                    Ok(Message::Text(text)) => route(&routes, &text),
                    Ok(Message::Close(_)) => {
                        debug!("CDP socket closed by browser");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "CDP read failed");
                        break;
                    }
                }
            }
            // Dropping the senders wakes every waiter with Closed.
            routes
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .clear();
        });

        Ok(Self {
            outgoing,
            pending,
            next_id: AtomicU64::new(1),
            reader,
            writer,
        })
    }

    /// Send one command and wait for its result object.
    pub async fn call(&self, method: &str, params: Value) -> std::result::Result<Value, CdpError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(id, tx);

        let frame = json!({ "id": id, "method": method, "params": params }).to_string();
        if self.outgoing.send(frame).await.is_err() {
            self.forget(id);
            return Err(CdpError::Closed);
        }

        match tokio::time::timeout(COMMAND_TIMEOUT, rx).await {
            Ok(Ok(Ok(result))) => Ok(result),
            Ok(Ok(Err(err))) => Err(CdpError::Protocol {
                method: method.to_string(),
                code: err.code,
                message: err.message,
            }),
            Ok(Err(_)) => Err(CdpError::Closed),
            Err(_) => {
                self.forget(id);
                Err(CdpError::Timeout {
                    method: method.to_string(),
                    secs: COMMAND_TIMEOUT.as_secs(),
                })
            }
        }
    }

    fn forget(&self, id: u64) {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&id);
    }

    /// Enable the domains the page driver relies on.
    pub async fn enable(&self, domains: &[&str]) -> std::result::Result<(), CdpError> {
        for domain in domains {
            self.call(&format!("{}.enable", domain), json!({})).await?;
        }
        Ok(())
    }

    /// Start a navigation. Network-level failures come back as `errorText`.
    pub async fn navigate(&self, url: &str) -> std::result::Result<(), CdpError> {
        let result = self.call("Page.navigate", json!({ "url": url })).await?;
        match result.get("errorText").and_then(Value::as_str) {
            Some(text) if !text.is_empty() => Err(CdpError::Navigation(format!("{}: {}", url, text))),
            _ => Ok(()),
        }
    }

    /// Evaluate an expression, awaiting promises, and return its JSON value.
    pub async fn evaluate(&self, expression: &str) -> std::result::Result<Value, CdpError> {
        let raw = self
            .call(
                "Runtime.evaluate",
                json!({
                    "expression": expression,
                    "returnByValue": true,
                    "awaitPromise": true,
                }),
            )
            .await?;
        let evaluated: Evaluated = serde_json::from_value(raw).map_err(|e| CdpError::Decode {
            method: "Runtime.evaluate".to_string(),
            reason: e.to_string(),
        })?;
        if let Some(details) = evaluated.exception_details {
            return Err(CdpError::Script(details.message()));
        }
        Ok(evaluated.result.value)
    }

    /// Capture the viewport, or just `clip`, as PNG bytes.
    pub async fn screenshot(&self, clip: Option<Clip>) -> std::result::Result<Vec<u8>, CdpError> {
        let mut params = json!({ "format": "png" });
        if let Some(clip) = clip {
            params["clip"] = json!(clip);
        }
        let result = self.call("Page.captureScreenshot", params).await?;
        let decode_err = |reason: String| CdpError::Decode {
            method: "Page.captureScreenshot".to_string(),
            reason,
        };
        let data = result
            .get("data")
            .and_then(Value::as_str)
            .ok_or_else(|| decode_err("missing data".to_string()))?;
        base64::engine::general_purpose::STANDARD
            .decode(data)
            .map_err(|e| decode_err(e.to_string()))
    }

    /// Left click at viewport coordinates.
    pub async fn click_at(&self, x: f64, y: f64) -> std::result::Result<(), CdpError> {
        for kind in ["mousePressed", "mouseReleased"] {
            self.call(
                "Input.dispatchMouseEvent",
                json!({ "type": kind, "x": x, "y": y, "button": "left", "clickCount": 1 }),
            )
            .await?;
        }
        Ok(())
    }

    /// keyDown then keyUp for one key chord.
    pub async fn press(&self, key: &KeySpec) -> std::result::Result<(), CdpError> {
        self.call("Input.dispatchKeyEvent", key_event("keyDown", key))
            .await?;
        self.call("Input.dispatchKeyEvent", key_event("keyUp", key))
            .await?;
        Ok(())
    }

    /// Insert text at the caret without synthesizing key events.
    pub async fn insert_text(&self, text: &str) -> std::result::Result<(), CdpError> {
        self.call("Input.insertText", json!({ "text": text })).await?;
        Ok(())
    }

    pub async fn set_user_agent(&self, user_agent: &str) -> std::result::Result<(), CdpError> {
        self.call(
            "Network.setUserAgentOverride",
            json!({ "userAgent": user_agent }),
        )
        .await?;
        Ok(())
    }

    /// Ask the browser to exit. The socket usually drops before a reply.
    pub async fn close_browser(&self) -> std::result::Result<(), CdpError> {
        match self.call("Browser.close", json!({})).await {
            Ok(_) | Err(CdpError::Closed) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

impl Drop for CdpClient {
    fn drop(&mut self) {
        self.reader.abort();
        self.writer.abort();
    }
}

fn key_event(kind: &str, key: &KeySpec) -> Value {
    let mut params = json!({ "type": kind, "key": key.key, "code": key.code });
    if key.modifiers != 0 {
        params["modifiers"] = json!(key.modifiers);
    }
    if let Some(vk) = key.key_code {
        params["windowsVirtualKeyCode"] = json!(vk);
        params["nativeVirtualKeyCode"] = json!(vk);
    }
    if kind == "keyDown" {
        if let Some(text) = key.text() {
            params["text"] = json!(text);
        }
    }
    params
}
