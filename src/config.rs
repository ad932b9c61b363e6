//! Endpoint configuration.

use std::time::Duration;

use crate::error::ConfigError;

/// Which flavor of endpoint this process registers as. The role decides the
/// connection path suffix, the registration frame shape, which inbound frame
/// type is served, and the result frame shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum EndpointRole {
    /// Registers under `/ws/tools/{id}` and serves `"job"` frames.
    Tool,
    /// Registers under `/ws/workers/{id}` and serves `"task"` frames.
    Worker,
}

impl EndpointRole {
    /// Path prefix appended to the gateway address when missing.
    pub fn path_prefix(self) -> &'static str {
        match self {
            EndpointRole::Tool => "/ws/tools",
            EndpointRole::Worker => "/ws/workers",
        }
    }

    /// Identity used when none is configured.
    pub fn default_endpoint_id(self) -> &'static str {
        match self {
            EndpointRole::Tool => "ollama-vps",
            EndpointRole::Worker => "ollama-worker-1",
        }
    }

    /// Name the chat bridge is registered under for this role.
    pub fn chat_capability(self) -> &'static str {
        match self {
            EndpointRole::Tool => "ollama_chat",
            EndpointRole::Worker => "ollama_chat_task",
        }
    }
}

impl std::fmt::Display for EndpointRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EndpointRole::Tool => write!(f, "tool"),
            EndpointRole::Worker => write!(f, "worker"),
        }
    }
}

/// Endpoint settings, resolved once at startup (flag > env > default).
#[derive(Debug, Clone)]
pub struct Settings {
    /// Gateway WS base or full session URL.
    pub gateway_ws: String,
    pub role: EndpointRole,
    /// Identity embedded in the connection URL and the registration frame.
    pub endpoint_id: String,
    /// Primary backend base URL.
    pub backend_url: String,
    /// Optional fallback backend base URL tried when the primary fails.
    pub fallback_backend_url: Option<String>,
    /// Machine identifier included in tool registration, if any.
    pub pc_id: Option<String>,
    /// Token issued with the machine identifier; passed through, never validated.
    pub token: Option<String>,
    pub heartbeat_interval: Duration,
    pub reconnect_delay: Duration,
    pub backend_timeout: Duration,
}

impl Settings {
    /// Validate the parts of the configuration that would otherwise make the
    /// supervisor loop forever on an unusable URL.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let base = self.gateway_ws.trim_end_matches('/');
        if !(base.starts_with("ws://") || base.starts_with("wss://")) {
            return Err(ConfigError::InvalidValue {
                key: "gateway".into(),
                message: format!("expected a ws:// or wss:// URL, got {}", self.gateway_ws),
            });
        }
        if self.endpoint_id.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "endpoint-id".into(),
                message: "must not be empty".into(),
            });
        }
        if self.endpoint_id.contains('/') {
            return Err(ConfigError::InvalidValue {
                key: "endpoint-id".into(),
                message: "must not contain '/'".into(),
            });
        }
        Ok(())
    }

    /// The full session URL: the configured gateway address with the role's
    /// path suffix appended unless it is already present.
    pub fn session_url(&self) -> String {
        let base = self.gateway_ws.trim_end_matches('/');
        let suffix = format!("{}/{}", self.role.path_prefix(), self.endpoint_id);
        if base.ends_with(&suffix) {
            base.to_string()
        } else {
            format!("{base}{suffix}")
        }
    }

    /// Backend candidates in try order: primary first, then the fallback.
    pub fn backend_endpoints(&self) -> Vec<String> {
        let mut endpoints = vec![self.backend_url.clone()];
        if let Some(fallback) = &self.fallback_backend_url {
            endpoints.push(fallback.clone());
        }
        endpoints
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(gateway: &str, role: EndpointRole, id: &str) -> Settings {
        Settings {
            gateway_ws: gateway.into(),
            role,
            endpoint_id: id.into(),
            backend_url: "http://127.0.0.1:11434".into(),
            fallback_backend_url: None,
            pc_id: None,
            token: None,
            heartbeat_interval: Duration::from_secs(15),
            reconnect_delay: Duration::from_secs(5),
            backend_timeout: Duration::from_secs(60),
        }
    }

    #[test]
    fn session_url_appends_tool_suffix() {
        let s = settings("ws://gw:30091", EndpointRole::Tool, "ollama-vps");
        assert_eq!(s.session_url(), "ws://gw:30091/ws/tools/ollama-vps");
    }

    #[test]
    fn session_url_appends_worker_suffix() {
        let s = settings("ws://gw:30091", EndpointRole::Worker, "w1");
        assert_eq!(s.session_url(), "ws://gw:30091/ws/workers/w1");
    }

    #[test]
    fn session_url_keeps_existing_suffix() {
        let s = settings("ws://gw:30091/ws/tools/ollama-vps", EndpointRole::Tool, "ollama-vps");
        assert_eq!(s.session_url(), "ws://gw:30091/ws/tools/ollama-vps");
    }

    #[test]
    fn session_url_trims_trailing_slash() {
        let s = settings("ws://gw:30091/", EndpointRole::Tool, "t1");
        assert_eq!(s.session_url(), "ws://gw:30091/ws/tools/t1");
    }

    #[test]
    fn validate_accepts_wss() {
        let s = settings("wss://gw.example.com", EndpointRole::Tool, "t1");
        assert!(s.validate().is_ok());
    }

    #[test]
    fn validate_rejects_http_scheme() {
        let s = settings("http://gw:30091", EndpointRole::Tool, "t1");
        assert!(s.validate().is_err());
    }

    #[test]
    fn validate_rejects_empty_id() {
        let s = settings("ws://gw:30091", EndpointRole::Tool, "");
        assert!(s.validate().is_err());
    }

    #[test]
    fn validate_rejects_id_with_slash() {
        let s = settings("ws://gw:30091", EndpointRole::Tool, "a/b");
        assert!(s.validate().is_err());
    }

    #[test]
    fn backend_endpoints_order() {
        let mut s = settings("ws://gw", EndpointRole::Tool, "t1");
        assert_eq!(s.backend_endpoints(), vec!["http://127.0.0.1:11434"]);
        s.fallback_backend_url = Some("http://10.0.0.2:11434".into());
        assert_eq!(
            s.backend_endpoints(),
            vec!["http://127.0.0.1:11434", "http://10.0.0.2:11434"]
        );
    }

    #[test]
    fn role_defaults() {
        assert_eq!(EndpointRole::Tool.default_endpoint_id(), "ollama-vps");
        assert_eq!(EndpointRole::Worker.default_endpoint_id(), "ollama-worker-1");
        assert_eq!(EndpointRole::Tool.chat_capability(), "ollama_chat");
        assert_eq!(EndpointRole::Worker.chat_capability(), "ollama_chat_task");
    }
}
