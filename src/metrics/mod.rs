//! # Estadísticas del Servidor
//! src/metrics/mod.rs
//!
//! Contadores de conexiones y handlers. Sirven para observar el servidor
//! (se loguean en JSON al cerrar) y para verificar en tests que ninguna
//! conexión se pierde y que el pool no supera su tamaño.

pub mod collector;

pub use collector::{HandlerGuard, ServerStats, StatsSnapshot};
