//! Capability registry and per-job dispatch.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::config::EndpointRole;
use crate::error::{BridgeError, DispatchError};
use crate::protocol::{self, Inbound};

/// A unit of work this endpoint can perform.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn call(&self, payload: Value) -> Result<Value, BridgeError>;
}

/// Registry of capability name → handler, populated once at startup from
/// static configuration. No runtime discovery.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn JobHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, handler: Arc<dyn JobHandler>) {
        let name = name.into();
        tracing::debug!(capability = %name, "Registered handler");
        self.handlers.insert(name, handler);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(name).cloned()
    }

    pub fn has(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn count(&self) -> usize {
        self.handlers.len()
    }
}

/// Demultiplexes inbound frames by role and capability, runs the matching
/// handler, and produces at most one result frame per frame.
pub struct Dispatcher {
    role: EndpointRole,
    registry: HandlerRegistry,
}

impl Dispatcher {
    pub fn new(role: EndpointRole, registry: HandlerRegistry) -> Self {
        Self { role, registry }
    }

    pub fn role(&self) -> EndpointRole {
        self.role
    }

    /// Handle one decoded frame. Returns the result frame to send back, or
    /// `None` when the frame is filtered out (wrong flavor for this role,
    /// unknown worker capability, or an ignored frame type).
    pub async fn dispatch(&self, frame: Inbound) -> Option<Value> {
        match frame {
            Inbound::Job { job_id, action, payload } if self.role == EndpointRole::Tool => {
                let outcome = self.run(&action, payload).await;
                if let Err(e) = &outcome {
                    tracing::warn!(%job_id, error = %e, "Job failed");
                }
                Some(protocol::result_frame(
                    self.role,
                    &job_id,
                    outcome.map_err(|e| e.to_string()),
                ))
            }
            Inbound::Task { tracking_id, capability, payload }
                if self.role == EndpointRole::Worker =>
            {
                // Tasks for capabilities we never registered are dropped
                // without a result frame.
                if !self.registry.has(&capability) {
                    tracing::debug!(%tracking_id, %capability, "Dropping task for unknown capability");
                    return None;
                }
                let outcome = self.run(&capability, payload).await;
                if let Err(e) = &outcome {
                    tracing::warn!(%tracking_id, error = %e, "Task failed");
                }
                Some(protocol::result_frame(
                    self.role,
                    &tracking_id,
                    outcome.map_err(|e| e.to_string()),
                ))
            }
            _ => None,
        }
    }

    async fn run(&self, name: &str, payload: Value) -> Result<Value, DispatchError> {
        let handler = self
            .registry
            .get(name)
            .ok_or_else(|| DispatchError::UnsupportedAction(name.to_string()))?;
        let payload = if payload.is_null() { json!({}) } else { payload };
        Ok(handler.call(payload).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoHandler;

    #[async_trait]
    impl JobHandler for EchoHandler {
        async fn call(&self, payload: Value) -> Result<Value, BridgeError> {
            Ok(json!({"echo": payload}))
        }
    }

    struct FailingHandler;

    #[async_trait]
    impl JobHandler for FailingHandler {
        async fn call(&self, _payload: Value) -> Result<Value, BridgeError> {
            Err(BridgeError::Request {
                url: "http://backend/api/chat".into(),
                reason: "connection refused".into(),
            })
        }
    }

    fn tool_dispatcher() -> Dispatcher {
        let mut registry = HandlerRegistry::new();
        registry.register("echo", Arc::new(EchoHandler));
        registry.register("fail", Arc::new(FailingHandler));
        Dispatcher::new(EndpointRole::Tool, registry)
    }

    fn worker_dispatcher() -> Dispatcher {
        let mut registry = HandlerRegistry::new();
        registry.register("echo", Arc::new(EchoHandler));
        Dispatcher::new(EndpointRole::Worker, registry)
    }

    fn job(id: &str, action: &str, payload: Value) -> Inbound {
        Inbound::Job {
            job_id: id.into(),
            action: action.into(),
            payload,
        }
    }

    fn task(id: &str, capability: &str, payload: Value) -> Inbound {
        Inbound::Task {
            tracking_id: id.into(),
            capability: capability.into(),
            payload,
        }
    }

    #[test]
    fn registry_register_and_lookup() {
        let mut registry = HandlerRegistry::new();
        assert_eq!(registry.count(), 0);
        registry.register("echo", Arc::new(EchoHandler));
        assert!(registry.has("echo"));
        assert!(!registry.has("other"));
        assert!(registry.get("echo").is_some());
        assert_eq!(registry.count(), 1);
    }

    #[tokio::test]
    async fn tool_job_produces_ok_result() {
        let frame = tool_dispatcher()
            .dispatch(job("j1", "echo", json!({"x": 1})))
            .await
            .unwrap();
        assert_eq!(
            frame,
            json!({"job_id": "j1", "status": "ok", "result": {"echo": {"x": 1}}})
        );
    }

    #[tokio::test]
    async fn tool_unsupported_action_produces_error_result() {
        let frame = tool_dispatcher()
            .dispatch(job("j2", "nope", json!({})))
            .await
            .unwrap();
        assert_eq!(frame["status"], "error");
        assert_eq!(frame["error"], "Unsupported action: nope");
        assert!(frame.get("result").is_none());
    }

    #[tokio::test]
    async fn handler_failure_produces_error_result() {
        let frame = tool_dispatcher()
            .dispatch(job("j3", "fail", json!({})))
            .await
            .unwrap();
        assert_eq!(frame["status"], "error");
        let error = frame["error"].as_str().unwrap();
        assert!(error.contains("connection refused"), "got: {error}");
    }

    #[tokio::test]
    async fn null_payload_becomes_empty_object() {
        let frame = tool_dispatcher()
            .dispatch(job("j4", "echo", Value::Null))
            .await
            .unwrap();
        assert_eq!(frame["result"]["echo"], json!({}));
    }

    #[tokio::test]
    async fn tool_ignores_task_frames() {
        assert!(tool_dispatcher().dispatch(task("t1", "echo", json!({}))).await.is_none());
    }

    #[tokio::test]
    async fn worker_ignores_job_frames() {
        assert!(worker_dispatcher().dispatch(job("j1", "echo", json!({}))).await.is_none());
    }

    #[tokio::test]
    async fn worker_drops_unknown_capability_silently() {
        assert!(
            worker_dispatcher()
                .dispatch(task("t1", "unknown_cap", json!({})))
                .await
                .is_none()
        );
    }

    #[tokio::test]
    async fn worker_result_carries_task_result_envelope() {
        let frame = worker_dispatcher()
            .dispatch(task("t2", "echo", json!({"y": 2})))
            .await
            .unwrap();
        assert_eq!(frame["type"], "task_result");
        assert_eq!(frame["tracking_id"], "t2");
        assert_eq!(frame["status"], "ok");
    }

    #[tokio::test]
    async fn ignored_frames_produce_nothing() {
        assert!(tool_dispatcher().dispatch(Inbound::Ignored).await.is_none());
    }
}
