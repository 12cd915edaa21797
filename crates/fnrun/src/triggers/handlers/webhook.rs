//! Webhook mount: a local HTTP listener per trigger.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{Method, StatusCode};
use axum::Router;
use serde_json::Value;
use tokio::net::TcpListener;

use super::TriggerContext;
use crate::errors::TriggerError;
use crate::traits::TriggerCallback;
use crate::triggers::scope::{ActivationScope, MountStatus};
use crate::types::{Trigger, TriggerEvent, TriggerSpec, WebhookSpec};

#[derive(Clone)]
struct WebhookState {
    trigger_id: String,
    method: String,
    callback: Arc<dyn TriggerCallback>,
}

async fn handle(State(state): State<WebhookState>, method: Method, body: Bytes) -> StatusCode {
    if !method.as_str().eq_ignore_ascii_case(&state.method) {
        tracing::debug!(
            trigger_id = %state.trigger_id,
            method = %method,
            expected = %state.method,
            "webhook method not allowed"
        );
        return StatusCode::METHOD_NOT_ALLOWED;
    }

    let body = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&body).into_owned()))
    };
    let status = state
        .callback
        .fire(TriggerEvent::Webhook {
            method: method.to_string(),
            body,
        })
        .await
        .unwrap_or(200);
    StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

pub(super) async fn mount(
    scope: &mut ActivationScope,
    ctx: &TriggerContext,
    trigger: &Trigger,
    spec: &WebhookSpec,
    callback: Arc<dyn TriggerCallback>,
) -> Result<(), TriggerError> {
    let addr = SocketAddr::from(([127, 0, 0, 1], spec.port.unwrap_or(0)));
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| TriggerError::Runtime {
            message: format!("failed to bind webhook listener on {addr}: {e}"),
        })?;
    let port = listener
        .local_addr()
        .map_err(|e| TriggerError::Runtime {
            message: format!("failed to read webhook listener address: {e}"),
        })?
        .port();

    let app = Router::new().fallback(handle).with_state(WebhookState {
        trigger_id: trigger.id.clone(),
        method: spec.method.to_uppercase(),
        callback,
    });

    let trigger_id = trigger.id.clone();
    let mut shutdown = scope.shutdown_signal();
    scope.spawn(async move {
        let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        });
        if let Err(e) = serve.await {
            tracing::error!(trigger_id = %trigger_id, error = %e, "webhook listener failed");
        }
    });

    if spec.port != Some(port) {
        let mut updated = trigger.clone();
        if let TriggerSpec::Webhook(webhook) = &mut updated.spec {
            webhook.port = Some(port);
        }
        ctx.database.add(updated.to_object()?).await?;
    }

    tracing::info!(trigger_id = %trigger.id, port, method = %spec.method, "webhook listening");
    scope.set_status(MountStatus::Ready);
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;
    use crate::defaults::InMemoryDatabase;
    use crate::traits::Database;
    use crate::triggers::callback_fn;
    use crate::types::{ObjectRef, SpaceKey};

    async fn mounted(
        status: Option<u16>,
    ) -> (ActivationScope, u16, Arc<AtomicUsize>, Arc<InMemoryDatabase>) {
        let db = Arc::new(InMemoryDatabase::new());
        let trigger = Trigger::new(TriggerSpec::webhook("POST")).with_id("hook");
        db.add(trigger.to_object().expect("object"))
            .await
            .expect("add");
        let ctx = TriggerContext::new(SpaceKey::new("space-1"), db.clone());

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let callback = Arc::new(callback_fn(move |event| {
            let counter = Arc::clone(&counter);
            async move {
                match event {
                    TriggerEvent::Webhook { body, .. } => assert_eq!(body, json!({"ping": 1})),
                    other => panic!("expected webhook event, got: {other:?}"),
                }
                counter.fetch_add(1, Ordering::SeqCst);
                status
            }
        }));

        let TriggerSpec::Webhook(spec) = &trigger.spec else {
            panic!("expected webhook spec");
        };
        let mut scope = ActivationScope::new();
        mount(&mut scope, &ctx, &trigger, spec, callback)
            .await
            .expect("mount");

        let stored = db
            .load(&ObjectRef::new("hook"))
            .await
            .expect("load")
            .expect("present");
        let port = match Trigger::from_object(&stored).expect("decode").spec {
            TriggerSpec::Webhook(webhook) => webhook.port.expect("port written back"),
            other => panic!("expected webhook spec, got: {other:?}"),
        };
        (scope, port, calls, db)
    }

    #[tokio::test]
    async fn test_matching_method_invokes_callback() {
        let (_scope, port, calls, _db) = mounted(Some(202)).await;
        let response = reqwest::Client::new()
            .post(format!("http://127.0.0.1:{port}/"))
            .json(&json!({"ping": 1}))
            .send()
            .await
            .expect("request");
        assert_eq!(response.status().as_u16(), 202);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_wrong_method_is_405() {
        let (_scope, port, calls, _db) = mounted(None).await;
        let response = reqwest::Client::new()
            .get(format!("http://127.0.0.1:{port}/anything"))
            .send()
            .await
            .expect("request");
        assert_eq!(response.status().as_u16(), 405);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_dispose_closes_listener() {
        let (scope, port, _calls, _db) = mounted(None).await;
        scope.dispose();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let result = reqwest::Client::new()
            .post(format!("http://127.0.0.1:{port}/"))
            .json(&json!({"ping": 1}))
            .send()
            .await;
        assert!(result.is_err(), "listener should be closed");
    }
}
