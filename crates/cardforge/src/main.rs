//! Process entry point: reads `server/` on the working directory, wires up
//! the shared facade, and runs the TCP acceptor alongside the background
//! loops (heartbeat, content digest refresh, UDP discovery).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::net::ToSocketAddrs;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cardforge_persist::{AuthDb, DbWorker};
use cardforge_session::AuthManager;
use cardforge_transport::{ServerSummary, TcpTransport, Transport, UdpDiscovery};

use cardforge::config::ServerConfig;
use cardforge::state::{self, ServerState};
use cardforge::{handler, ServerError};

const DEFAULT_PORT: u16 = 9527;

/// Protocol-compatibility token reported to clients over UDP discovery.
/// Fixed, not the crate's own build version — clients compare it against
/// their own build to decide whether they can connect at all.
const PROTOCOL_VERSION: &str = "0.5.14+";

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cardforge=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn read_to_string_opt(path: &Path) -> Option<String> {
    match std::fs::read_to_string(path) {
        Ok(contents) => Some(contents),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to read file, ignoring");
            None
        }
    }
}

fn listen_port() -> u16 {
    std::env::args()
        .nth(1)
        .and_then(|arg| arg.parse().ok())
        .unwrap_or(DEFAULT_PORT)
}

async fn bind_sockets(addr: impl ToSocketAddrs + Clone) -> Result<(TcpTransport, UdpDiscovery), ServerError> {
    let tcp = TcpTransport::bind(addr.clone()).await?;
    let udp = UdpDiscovery::bind(addr).await?;
    Ok((tcp, udp))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let server_dir = PathBuf::from("server");
    let packages_dir = server_dir.join("packages");

    let config_raw = read_to_string_opt(Path::new("freekill.server.config.json"));
    let config = ServerConfig::parse(config_raw.as_deref().unwrap_or("{}"));

    let auth = AuthManager::load_or_generate(server_dir.join("rsa"))?;

    let init_sql = read_to_string_opt(&server_dir.join("init.sql"));
    let auth_db = Arc::new(AuthDb::open(server_dir.join("users.db"), init_sql.as_deref())?);

    let gamedb_init_sql = read_to_string_opt(&server_dir.join("gamedb_init.sql"));
    let game_db = DbWorker::spawn(server_dir.join("game.db"), gamedb_init_sql, "cardforge-game-db");

    let state = Arc::new(ServerState::new(auth, auth_db, game_db, config, String::new()));
    state.refresh_md5(&packages_dir).await;
    state::install(state.clone());

    let port = listen_port();
    let addr = ("0.0.0.0", port);
    let (mut tcp, udp) = bind_sockets(addr).await?;
    let local_addr = tcp.local_addr()?;
    tracing::info!(addr = %local_addr, "cardforge listening");

    tokio::spawn(state.clone().heartbeat_loop());

    let refresh_state = state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(300));
        loop {
            interval.tick().await;
            refresh_state.refresh_md5(&packages_dir).await;
        }
    });

    let discovery_state = state.clone();
    tokio::spawn(async move {
        udp.run(|| summary_for_discovery(&discovery_state)).await;
    });

    loop {
        let conn = tcp.accept().await?;
        let peer_ip = conn.peer_addr().ip().to_string();
        let conn = Arc::new(conn);
        tokio::spawn(async move {
            handler::handle_connection(conn, peer_ip).await;
        });
    }
}

/// Builds a [`ServerSummary`] synchronously for the UDP responder, which
/// only offers a plain `Fn`. Online count is read via `try_lock` — a probe
/// under contention just reports the last-known count rather than blocking
/// the discovery loop.
fn summary_for_discovery(state: &Arc<ServerState>) -> ServerSummary {
    let online_count = state.users.try_lock().map(|u| u.online_count() as u32).unwrap_or(0);
    let config = state.config.try_read();
    let (description, icon_url, capacity) = match config {
        Ok(config) => (config.description.clone(), config.icon_url.clone(), config.capacity),
        Err(_) => (String::new(), String::new(), 100),
    };
    ServerSummary {
        version: PROTOCOL_VERSION.to_string(),
        icon_url,
        description,
        capacity,
        online_count,
    }
}
