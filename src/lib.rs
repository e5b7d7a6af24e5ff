pub mod cli;
pub mod config;
pub mod error;
pub mod ipc;
pub mod observability;
pub mod store;

use std::sync::Arc;

use config::ServerConfig;
use ipc::event::EventBroadcaster;
use store::Storage;

/// Shared application state passed to every RPC handler.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub storage: Arc<Storage>,
    pub broadcaster: Arc<EventBroadcaster>,
    pub started_at: std::time::Instant,
}
