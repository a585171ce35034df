//! # Logging
//! src/logging.rs
//!
//! Inicializa `tracing`. `RUST_LOG` tiene prioridad; si no está definido se
//! usa el filtro de `--log-level`. Los logs llevan el nombre del thread para
//! distinguir accept loop, workers y pumps del proxy.

use crate::error::ServerError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Instala el subscriber global
pub fn init(default_level: &str) -> Result<(), ServerError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| ServerError::Logging(e.to_string()))?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_thread_names(true)
        .with_target(false)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| ServerError::Logging(e.to_string()))
}
