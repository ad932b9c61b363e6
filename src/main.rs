use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use gateway_endpoint::bridge::ChatBridge;
use gateway_endpoint::config::{EndpointRole, Settings};
use gateway_endpoint::dispatch::{Dispatcher, HandlerRegistry, JobHandler};
use gateway_endpoint::session::Session;
use gateway_endpoint::supervisor::Supervisor;

/// Gateway endpoint — bridges gateway jobs to a local Ollama instance.
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Gateway WS base; the role's path suffix is appended when missing.
    #[arg(long, env = "GATEWAY_WS", default_value = "ws://localhost:30091")]
    gateway: String,

    /// Register as a tool or as a task worker.
    #[arg(long, value_enum, env = "ENDPOINT_ROLE", default_value_t = EndpointRole::Tool)]
    role: EndpointRole,

    /// Identity used in the connection URL and the registration frame.
    #[arg(long, env = "ENDPOINT_ID")]
    endpoint_id: Option<String>,

    /// Local Ollama base URL.
    #[arg(long, env = "OLLAMA_BASE_URL", default_value = "http://127.0.0.1:11434")]
    ollama: String,

    /// Optional fallback Ollama base URL tried when the primary fails.
    #[arg(long, env = "OLLAMA_FALLBACK_URL")]
    fallback_ollama: Option<String>,

    /// Port shorthand: builds http://127.0.0.1:{port} and overrides --ollama.
    #[arg(long, env = "OLLAMA_PORT")]
    port: Option<u16>,

    /// Machine identifier included in tool registration.
    #[arg(long, env = "PC_ID")]
    pc_id: Option<String>,

    /// Token issued with the machine identifier; passed through, never validated.
    #[arg(long, env = "PC_TOKEN")]
    token: Option<String>,

    /// Seconds between liveness heartbeats.
    #[arg(long, env = "HEARTBEAT_SECS", default_value_t = 15)]
    heartbeat_secs: u64,

    /// Seconds to wait before reconnecting after a session failure.
    #[arg(long, env = "RECONNECT_SECS", default_value_t = 5)]
    reconnect_secs: u64,

    /// Backend request timeout in seconds.
    #[arg(long, env = "BACKEND_TIMEOUT_SECS", default_value_t = 60)]
    backend_timeout_secs: u64,
}

impl Cli {
    fn into_settings(self) -> Settings {
        let endpoint_id = self
            .endpoint_id
            .unwrap_or_else(|| self.role.default_endpoint_id().to_string());
        let backend_url = match self.port {
            Some(port) => format!("http://127.0.0.1:{port}"),
            None => self.ollama,
        };
        Settings {
            gateway_ws: self.gateway,
            role: self.role,
            endpoint_id,
            backend_url,
            fallback_backend_url: self.fallback_ollama,
            pc_id: self.pc_id,
            token: self.token,
            heartbeat_interval: Duration::from_secs(self.heartbeat_secs),
            reconnect_delay: Duration::from_secs(self.reconnect_secs),
            backend_timeout: Duration::from_secs(self.backend_timeout_secs),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let settings = Cli::parse().into_settings();
    if let Err(e) = settings.validate() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }

    let endpoints = settings.backend_endpoints();
    eprintln!("🔌 Gateway Endpoint v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Role: {}", settings.role);
    eprintln!("   Gateway: {}", settings.session_url());
    eprintln!("   Backend: {}", endpoints.join(", "));

    let bridge = Arc::new(ChatBridge::new(endpoints, settings.backend_timeout)?);

    let mut registry = HandlerRegistry::new();
    registry.register(
        settings.role.chat_capability(),
        Arc::clone(&bridge) as Arc<dyn JobHandler>,
    );
    eprintln!("   Capabilities: {} registered\n", registry.count());

    let dispatcher = Arc::new(Dispatcher::new(settings.role, registry));
    let session = Session::new(&settings, dispatcher);
    let supervisor = Supervisor::new(session, settings.reconnect_delay);
    supervisor.run().await;

    Ok(())
}
