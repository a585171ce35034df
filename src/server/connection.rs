//! # Conexión Aceptada
//! src/server/connection.rs
//!
//! Una `Connection` es dueña del `TcpStream` aceptado. Pasa por valor del
//! accept loop al dispatcher, de ahí (quizá por la cola) a un handler, y se
//! cierra exactamente una vez: cuando se suelta el valor.

use crate::metrics::ServerStats;
use std::net::{SocketAddr, TcpStream};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Estado de una conexión
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Recién salida de `accept()`
    Accepted,
    /// Entregada a la estrategia de despacho
    Dispatched,
    /// Un handler la está procesando
    Handling,
    /// Stream cerrado
    Closed,
}

/// Conexión de cliente
#[derive(Debug)]
pub struct Connection {
    id: u64,
    stream: TcpStream,
    peer: SocketAddr,
    state: ConnectionState,
    stats: Option<ServerStats>,
}

impl Connection {
    /// Envuelve un stream aceptado
    pub fn new(stream: TcpStream, peer: SocketAddr) -> Self {
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            stream,
            peer,
            state: ConnectionState::Accepted,
            stats: None,
        }
    }

    /// Asocia las estadísticas del servidor (registra el accept)
    pub fn with_stats(mut self, stats: &ServerStats) -> Self {
        stats.record_accepted();
        self.stats = Some(stats.clone());
        self
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// El stream; `&TcpStream` implementa `Read` y `Write`
    pub fn stream(&self) -> &TcpStream {
        &self.stream
    }

    pub(crate) fn mark_dispatched(&mut self) {
        debug_assert_eq!(self.state, ConnectionState::Accepted);
        self.state = ConnectionState::Dispatched;
    }

    pub(crate) fn mark_handling(&mut self) {
        debug_assert_eq!(self.state, ConnectionState::Dispatched);
        self.state = ConnectionState::Handling;
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        // El fd lo cierra el drop de TcpStream justo después
        self.state = ConnectionState::Closed;
        if let Some(stats) = &self.stats {
            stats.record_closed();
        }
        trace!(conn = self.id, peer = %self.peer, "conexión cerrada");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::net::TcpListener;

    fn pair() -> (Connection, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (stream, peer) = listener.accept().unwrap();
        (Connection::new(stream, peer), client)
    }

    #[test]
    fn test_ids_are_unique() {
        let (a, _ca) = pair();
        let (b, _cb) = pair();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_state_transitions() {
        let (mut conn, _client) = pair();
        assert_eq!(conn.state(), ConnectionState::Accepted);
        conn.mark_dispatched();
        assert_eq!(conn.state(), ConnectionState::Dispatched);
        conn.mark_handling();
        assert_eq!(conn.state(), ConnectionState::Handling);
    }

    #[test]
    fn test_debug_includes_stats() {
        let stats = ServerStats::new();
        let (conn, _client) = pair();
        let conn = conn.with_stats(&stats);

        let text = format!("{:?}", conn);
        assert!(text.contains("Connection"));
        assert!(text.contains("accepted: 1"));
    }

    #[test]
    fn test_drop_closes_once_and_counts() {
        let stats = ServerStats::new();
        let (conn, mut client) = pair();
        let conn = conn.with_stats(&stats);
        assert_eq!(stats.snapshot().accepted, 1);

        drop(conn);
        assert_eq!(stats.snapshot().closed, 1);

        // El cliente ve EOF
        let mut buf = Vec::new();
        assert_eq!(client.read_to_end(&mut buf).unwrap(), 0);
    }
}
