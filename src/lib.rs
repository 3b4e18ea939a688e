//! UDP-to-HTTP MPEG-TS relay library: the program registry, ingest
//! worker, MPEG-TS inspector, and HTTP surface. `src/main.rs` is a thin
//! CLI wrapper around [`run`].
pub mod config;
pub mod entry;
pub mod http;
pub mod limits;
pub mod registry;
pub mod slots;
pub mod ts;
pub mod udp;
pub mod worker;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Opt;
use crate::http::AppState;
use crate::limits::Limits;
use crate::registry::ProgramRegistry;

/// Grace period `main` waits for ingest workers to notice the shutdown
/// token and exit before giving up and returning anyway.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Build the registry and HTTP router from `opt` and serve until a SIGINT
/// or the server itself exits, then drain outstanding ingest workers.
pub async fn run(opt: Opt) -> Result<()> {
    let listen: SocketAddr = opt.listen;
    let limits = Limits::from_opt(&opt);

    let registry = Arc::new(ProgramRegistry::new(limits));
    let shutdown = CancellationToken::new();
    let workers = Arc::new(AsyncMutex::new(JoinSet::new()));

    let state = AppState {
        registry,
        shutdown: shutdown.clone(),
        workers: workers.clone(),
    };
    let app = http::router(state).into_make_service_with_connect_info::<SocketAddr>();

    info!(%listen, ?limits, "starting udp2http");

    let server = axum::Server::bind(&listen).serve(app);

    tokio::select! {
        result = server => {
            result.context("http server exited unexpectedly")?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received shutdown signal");
        }
    }

    shutdown.cancel();
    join_workers(workers).await;

    Ok(())
}

/// Wait for every tracked ingest worker to exit (they notice the
/// cancellation token on their next loop iteration), giving up after
/// `SHUTDOWN_GRACE` so a stuck worker can never hang the process.
async fn join_workers(workers: Arc<AsyncMutex<JoinSet<()>>>) {
    let mut workers = workers.lock().await;
    let deadline = tokio::time::sleep(SHUTDOWN_GRACE);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            next = workers.join_next() => {
                match next {
                    Some(_) => continue,
                    None => {
                        info!("all ingest workers exited cleanly");
                        break;
                    }
                }
            }
            _ = &mut deadline => {
                warn!("timed out waiting for ingest workers to exit");
                break;
            }
        }
    }
}
