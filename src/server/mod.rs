//! # Módulo del Servidor
//! src/server/mod.rs
//!
//! Capa de despacho de conexiones:
//! 1. `tcp`: socket de escucha y accept loop
//! 2. `connection`: la conexión aceptada, dueña del socket
//! 3. `dispatch`: las cuatro estrategias (inline, forked, threaded, pooled)
//! 4. `pool` + `queue`: workers fijos alimentados por una cola FIFO

pub mod connection;
pub mod dispatch;
pub mod pool;
pub mod queue;
pub mod tcp;

pub use connection::{Connection, ConnectionState};
pub use dispatch::{ConnectionHandler, Dispatcher, Strategy};
pub use pool::WorkerPool;
pub use queue::WorkQueue;
pub use tcp::{Server, ShutdownHandle};
