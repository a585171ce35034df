//! # Router de Conexiones
//! src/router/mod.rs
//!
//! Decide qué hacer con una conexión según el modo del servidor:
//!
//! ```text
//! Connection → Router ─┬─ Files → request → archivo / listado / error
//!                      └─ Proxy → connect upstream → ProxyLink (2 pumps)
//! ```
//!
//! El modo se fija al arrancar; el router no cambia después.

pub mod files;
pub mod proxy;

use crate::config::{ServeMode, ServerConfig};
use crate::metrics::ServerStats;
use crate::server::connection::Connection;
use crate::server::dispatch::ConnectionHandler;

pub use files::FileService;
pub use proxy::ProxyService;

/// Valor del header `Server` en las respuestas propias
pub const SERVER_NAME: &str = concat!("dispatch_server/", env!("CARGO_PKG_VERSION"));

/// Handler de conexiones del servidor
pub enum Router {
    Files(FileService),
    Proxy(ProxyService),
}

impl Router {
    pub fn new(config: &ServerConfig, stats: ServerStats) -> Self {
        match &config.mode {
            ServeMode::Files { root } => Router::Files(FileService::new(root.clone(), stats)),
            ServeMode::Proxy(target) => {
                Router::Proxy(ProxyService::new(target.clone(), config.idle_timeout, stats))
            }
        }
    }
}

impl ConnectionHandler for Router {
    fn handle(&self, conn: Connection) {
        match self {
            Router::Files(service) => service.handle(conn),
            Router::Proxy(service) => service.handle(conn),
        }
    }
}
