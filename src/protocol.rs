//! Wire frames exchanged with the gateway.
//!
//! All frames are JSON text. The tool and worker roles share one session
//! implementation but differ in registration shape, accepted inbound frame
//! type, and result envelope — those differences live here.

use serde::Deserialize;
use serde_json::{Value, json};

use crate::config::{EndpointRole, Settings};

/// Inbound frames from the gateway. Frames with an unknown `type` decode to
/// [`Inbound::Ignored`] and are dropped without ending the session.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum Inbound {
    #[serde(rename = "job")]
    Job {
        job_id: String,
        action: String,
        #[serde(default)]
        payload: Value,
    },
    #[serde(rename = "task")]
    Task {
        tracking_id: String,
        capability: String,
        #[serde(default)]
        payload: Value,
    },
    #[serde(other)]
    Ignored,
}

/// Liveness frame sent on every heartbeat interval.
pub fn heartbeat() -> Value {
    json!({"type": "heartbeat"})
}

/// Registration descriptor, sent as the first frame of every connection
/// generation — verbatim on each reconnect.
///
/// The tool frame carries `pc_id`/`token` as explicit nulls when unset; the
/// worker frame omits them entirely. Both shapes match what the gateway
/// already accepts.
pub fn registration_frame(settings: &Settings) -> Value {
    match settings.role {
        EndpointRole::Tool => json!({
            "tool_id": settings.endpoint_id,
            "capabilities": ["ollama", "ollama_chat"],
            "base_url": settings.backend_url,
            "metadata": {
                "kind": "ollama",
                "actions": ["ollama_chat"],
                "schemas": {
                    "ollama_chat": {
                        "request_example": chat_request_example(),
                        "response_example": {
                            "status": "ok",
                            "result": {"message": {"content": "Hello!"}},
                        },
                    }
                },
            },
            "schemas": {
                "ollama_chat": {"request_example": chat_request_example()}
            },
            "pc_id": settings.pc_id,
            "token": settings.token,
        }),
        EndpointRole::Worker => json!({
            "worker_id": settings.endpoint_id,
            "capabilities": ["ollama_chat_task"],
            "metadata": {
                "kind": "ollama",
                "actions": ["ollama_chat_task"],
                "schemas": {
                    "ollama_chat_task": {"request_example": chat_request_example()}
                },
            },
        }),
    }
}

/// Result frame for one dispatched job, shaped per role. Exactly one of
/// `result`/`error` is present; the other key is omitted.
pub fn result_frame(
    role: EndpointRole,
    correlation_id: &str,
    outcome: Result<Value, String>,
) -> Value {
    let mut frame = match role {
        EndpointRole::Tool => json!({"job_id": correlation_id}),
        EndpointRole::Worker => json!({"type": "task_result", "tracking_id": correlation_id}),
    };
    match outcome {
        Ok(result) => {
            frame["status"] = json!("ok");
            frame["result"] = result;
        }
        Err(error) => {
            frame["status"] = json!("error");
            frame["error"] = json!(error);
        }
    }
    frame
}

fn chat_request_example() -> Value {
    json!({
        "model": "gpt-oss:latest",
        "messages": [
            {"role": "system", "content": "You are a helpful assistant."},
            {"role": "user", "content": "Write a one-line greeting."}
        ],
        "stream": false
    })
}
