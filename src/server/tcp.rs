//! # Servidor TCP
//! src/server/tcp.rs
//!
//! Crea el socket de escucha y corre el accept loop. Cada conexión aceptada
//! se envuelve en una `Connection` y se entrega al `Dispatcher`; el loop
//! nunca atiende requests por su cuenta (salvo con `Strategy::Inline`, donde
//! el propio dispatcher ejecuta el handler).
//!
//! El loop termina cuando alguien dispara el `ShutdownHandle` (SIGINT en el
//! binario, o un test).

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::metrics::ServerStats;
use crate::router::Router;
use crate::server::connection::Connection;
use crate::server::dispatch::{ConnectionHandler, Dispatcher};
use socket2::{Domain, Protocol, SockRef, Socket, Type};
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Backlog del `listen()`
pub const LISTEN_BACKLOG: i32 = 1024;

/// Servidor con su socket ya escuchando
pub struct Server {
    config: Arc<ServerConfig>,
    listener: TcpListener,
    local_addr: SocketAddr,
    dispatcher: Dispatcher,
    stats: ServerStats,
    shutdown: Arc<AtomicBool>,
}

impl Server {
    /// Bindea el socket y prepara el router que indica `config.mode`
    pub fn bind(config: Arc<ServerConfig>) -> Result<Self, ServerError> {
        let stats = ServerStats::new();
        let router = Router::new(&config, stats.clone());
        Self::build(config, Arc::new(router), stats)
    }

    /// Igual que `bind` pero con un handler arbitrario
    pub fn bind_with_handler(
        config: Arc<ServerConfig>,
        handler: Arc<dyn ConnectionHandler>,
    ) -> Result<Self, ServerError> {
        Self::build(config, handler, ServerStats::new())
    }

    fn build(
        config: Arc<ServerConfig>,
        handler: Arc<dyn ConnectionHandler>,
        stats: ServerStats,
    ) -> Result<Self, ServerError> {
        let address = config.address();
        let bind_error = |source: io::Error| ServerError::Bind {
            addr: address.clone(),
            source,
        };

        let addr = address
            .to_socket_addrs()
            .map_err(bind_error)?
            .next()
            .ok_or_else(|| {
                bind_error(io::Error::new(
                    io::ErrorKind::AddrNotAvailable,
                    "address resolved to nothing",
                ))
            })?;

        let listener = listen(addr).map_err(bind_error)?;
        let local_addr = listener.local_addr().map_err(bind_error)?;

        // El pool se crea antes de aceptar la primera conexión
        let dispatcher = Dispatcher::new(config.strategy, config.pool_size, handler, stats.clone())?;

        Ok(Self {
            config,
            listener,
            local_addr,
            dispatcher,
            stats,
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn stats(&self) -> ServerStats {
        self.stats.clone()
    }

    /// Handle para detener el accept loop desde otro thread
    pub fn shutdown_handle(&self) -> io::Result<ShutdownHandle> {
        Ok(ShutdownHandle {
            flag: Arc::clone(&self.shutdown),
            listener: Arc::new(self.listener.try_clone()?),
            wake_addr: wake_address(self.local_addr),
        })
    }

    /// Accept loop
    ///
    /// Los errores de `accept()` se loguean y el loop sigue. Retorna cuando
    /// se dispara el `ShutdownHandle`.
    pub fn run(&self) -> Result<(), ServerError> {
        info!(
            address = %self.local_addr,
            strategy = %self.dispatcher.strategy(),
            "servidor escuchando"
        );

        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }

            match self.listener.accept() {
                Ok((stream, peer)) => {
                    if self.shutdown.load(Ordering::SeqCst) {
                        break;
                    }
                    if let Some(timeout) = self.config.idle_timeout {
                        if let Err(e) = stream.set_read_timeout(Some(timeout)) {
                            warn!(peer = %peer, error = %e, "no se pudo aplicar el idle timeout");
                        }
                    }

                    let conn = Connection::new(stream, peer).with_stats(&self.stats);
                    debug!(conn = conn.id(), peer = %peer, "nueva conexión");
                    self.dispatcher.dispatch(conn);
                }
                Err(_) if self.shutdown.load(Ordering::SeqCst) => break,
                Err(e) => {
                    warn!(error = %e, "error al aceptar conexión");
                }
            }
        }

        info!(stats = %self.stats.to_json(), "servidor detenido");
        Ok(())
    }

    /// Libera el dispatcher; con `Pooled` vacía la cola y espera a los workers
    pub fn shutdown(self) {
        self.dispatcher.shutdown();
    }
}

/// Detiene el accept loop de un `Server`
#[derive(Clone)]
pub struct ShutdownHandle {
    flag: Arc<AtomicBool>,
    listener: Arc<TcpListener>,
    wake_addr: SocketAddr,
}

impl ShutdownHandle {
    /// Marca el servidor como detenido y desbloquea `accept()`
    ///
    /// El `shutdown()` sobre el socket de escucha hace que Linux despierte el
    /// `accept()` con error; la conexión a la propia dirección cubre las
    /// plataformas donde eso no pasa.
    pub fn trigger(&self) {
        if self.flag.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = SockRef::from(self.listener.as_ref()).shutdown(Shutdown::Both);
        let _ = TcpStream::connect_timeout(&self.wake_addr, Duration::from_millis(200));
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// socket() + SO_REUSEADDR + bind() + listen(1024)
fn listen(addr: SocketAddr) -> io::Result<TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(LISTEN_BACKLOG)?;
    Ok(socket.into())
}

/// Dirección a la que conectarse para despertar `accept()`
fn wake_address(local: SocketAddr) -> SocketAddr {
    match local.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => SocketAddr::new(Ipv4Addr::LOCALHOST.into(), local.port()),
        IpAddr::V6(ip) if ip.is_unspecified() => SocketAddr::new(Ipv6Addr::LOCALHOST.into(), local.port()),
        _ => local,
    }
}
