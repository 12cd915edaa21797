//! Websocket mount: a client connection with bounded reconnects.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::errors::TriggerError;
use crate::runtime::WebsocketConfig;
use crate::traits::TriggerCallback;
use crate::triggers::scope::{ActivationScope, MountStatus};
use crate::types::{Trigger, TriggerEvent, WebsocketSpec};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const ABNORMAL_CLOSURE: u16 = 1006;

/// Delay before the attempt following `attempt`: `attempt² × retry_delay`.
pub(crate) fn backoff_delay(attempt: u32, retry_delay: Duration) -> Duration {
    retry_delay.saturating_mul(attempt.saturating_mul(attempt))
}

enum Closure {
    /// Dropped without a close handshake, or closed with 1006.
    Abnormal,
    Terminal(Option<u16>),
}

pub(super) async fn mount(
    scope: &mut ActivationScope,
    trigger: &Trigger,
    spec: &WebsocketSpec,
    callback: Arc<dyn TriggerCallback>,
    config: &WebsocketConfig,
) -> Result<(), TriggerError> {
    let status = scope.status_sender();
    let stream = connect_with_retry(spec, config, &status, false).await?;
    tracing::info!(trigger_id = %trigger.id, url = %spec.url, "websocket connected");

    let trigger_id = trigger.id.clone();
    let spec = spec.clone();
    let config = config.clone();
    let disposed = scope.disposed_flag();
    scope.spawn(async move {
        let mut stream = stream;
        loop {
            let closure = pump(&mut stream, callback.as_ref(), &trigger_id).await;
            if disposed.load(Ordering::SeqCst) {
                return;
            }
            match closure {
                Closure::Abnormal => {
                    tracing::warn!(trigger_id = %trigger_id, "websocket closed abnormally, reconnecting");
                    match reconnect(&spec, &config, &status, &disposed).await {
                        Some(next) => stream = next,
                        None => return,
                    }
                }
                Closure::Terminal(code) => {
                    tracing::info!(trigger_id = %trigger_id, ?code, "websocket closed");
                    status.send_replace(MountStatus::Closed);
                    return;
                }
            }
        }
    });
    Ok(())
}

async fn reconnect(
    spec: &WebsocketSpec,
    config: &WebsocketConfig,
    status: &watch::Sender<MountStatus>,
    disposed: &AtomicBool,
) -> Option<WsStream> {
    if disposed.load(Ordering::SeqCst) {
        return None;
    }
    match connect_with_retry(spec, config, status, true).await {
        Ok(stream) => Some(stream),
        Err(e) => {
            tracing::error!(url = %spec.url, error = %e, "websocket reconnect failed");
            None
        }
    }
}

async fn connect_with_retry(
    spec: &WebsocketSpec,
    config: &WebsocketConfig,
    status: &watch::Sender<MountStatus>,
    reconnecting: bool,
) -> Result<WsStream, TriggerError> {
    let max_attempts = config.max_attempts.max(1);
    let mut last_error = String::new();

    for attempt in 1..=max_attempts {
        status.send_replace(if reconnecting {
            MountStatus::Reconnecting { attempt }
        } else {
            MountStatus::Connecting { attempt }
        });

        match open(spec).await {
            Ok(stream) => {
                status.send_replace(MountStatus::Connected);
                return Ok(stream);
            }
            Err(e) => {
                tracing::warn!(url = %spec.url, attempt, max_attempts, error = %e, "websocket connection attempt failed");
                last_error = e;
            }
        }
        if attempt < max_attempts {
            tokio::time::sleep(backoff_delay(attempt, config.retry_delay)).await;
        }
    }

    let message = format!(
        "failed to connect to {} after {max_attempts} attempts: {last_error}",
        spec.url
    );
    status.send_replace(MountStatus::Failed {
        message: message.clone(),
    });
    Err(TriggerError::Runtime { message })
}

async fn open(spec: &WebsocketSpec) -> Result<WsStream, String> {
    let (mut stream, _response) = connect_async(spec.url.as_str())
        .await
        .map_err(|e| e.to_string())?;
    if let Some(init) = &spec.init {
        stream
            .send(Message::Text(init.to_string()))
            .await
            .map_err(|e| format!("failed to send init message: {e}"))?;
    }
    Ok(stream)
}

async fn pump(stream: &mut WsStream, callback: &dyn TriggerCallback, trigger_id: &str) -> Closure {
    while let Some(message) = stream.next().await {
        let decoded = match message {
            Ok(Message::Text(text)) => serde_json::from_str::<Value>(&text),
            Ok(Message::Binary(bytes)) => serde_json::from_slice::<Value>(&bytes),
            Ok(Message::Close(frame)) => {
                let code = frame.map(|f| u16::from(f.code));
                return if code == Some(ABNORMAL_CLOSURE) {
                    Closure::Abnormal
                } else {
                    Closure::Terminal(code)
                };
            }
            Ok(_) => continue,
            Err(e) => {
                tracing::warn!(trigger_id, error = %e, "websocket protocol error");
                return Closure::Abnormal;
            }
        };
        match decoded {
            Ok(data) => {
                callback.fire(TriggerEvent::Websocket { data }).await;
            }
            Err(e) => tracing::warn!(trigger_id, error = %e, "failed to decode websocket message"),
        }
    }
    Closure::Abnormal
}
