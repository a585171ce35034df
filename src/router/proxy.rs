//! # Servicio de Proxy
//! src/router/proxy.rs
//!
//! Reenvía cada conexión a un upstream fijo. Si el upstream no responde se
//! contesta 502 al cliente; si responde, los bytes pasan sin tocar en ambas
//! direcciones hasta que los dos lados terminan.

use crate::config::ProxyTarget;
use crate::http::{Request, Response, StatusCode};
use crate::metrics::ServerStats;
use crate::relay::ProxyLink;
use crate::router::SERVER_NAME;
use crate::server::connection::Connection;
use std::io;
use std::net::TcpStream;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub struct ProxyService {
    target: ProxyTarget,
    idle_timeout: Option<Duration>,
    stats: ServerStats,
}

impl ProxyService {
    pub fn new(target: ProxyTarget, idle_timeout: Option<Duration>, stats: ServerStats) -> Self {
        Self {
            target,
            idle_timeout,
            stats,
        }
    }

    pub fn target(&self) -> &ProxyTarget {
        &self.target
    }

    pub fn handle(&self, conn: Connection) {
        let start = Instant::now();

        let upstream = match self.connect() {
            Ok(upstream) => upstream,
            Err(e) => {
                warn!(conn = conn.id(), target = %self.target, error = %e, "upstream no disponible");
                self.bad_gateway(&conn);
                self.stats
                    .record_response(StatusCode::BadGateway.as_u16(), start.elapsed());
                return;
            }
        };

        debug!(conn = conn.id(), target = %self.target, "conectado al upstream");
        let id = conn.id();
        let report = ProxyLink::new(conn, upstream).run();

        info!(
            conn = id,
            bytes_up = report.bytes_up(),
            bytes_down = report.bytes_down(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "sesión de proxy terminada"
        );
    }

    /// Resuelve el destino e intenta cada dirección en orden
    fn connect(&self) -> io::Result<TcpStream> {
        let mut last_error = None;

        for addr in self.target.resolve()? {
            match TcpStream::connect(addr) {
                Ok(stream) => {
                    if self.idle_timeout.is_some() {
                        stream.set_read_timeout(self.idle_timeout)?;
                    }
                    return Ok(stream);
                }
                Err(e) => {
                    debug!(addr = %addr, error = %e, "connect falló");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, "no addresses to connect to")
        }))
    }

    /// Consume el request del cliente y responde 502
    fn bad_gateway(&self, conn: &Connection) {
        let mut stream = conn.stream();
        // El contenido no importa, solo vaciar lo que mandó el cliente
        let _ = Request::read_from(&mut stream);

        let response = Response::error(StatusCode::BadGateway)
            .with_header("Server", SERVER_NAME)
            .with_header("Connection", "close");
        if let Err(e) = response.write_to(&mut stream) {
            debug!(conn = conn.id(), error = %e, "no se pudo enviar el 502");
        }
    }
}
