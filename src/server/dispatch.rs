//! # Estrategias de Despacho
//! src/server/dispatch.rs
//!
//! Decide cómo se ejecuta el handler de cada conexión aceptada respecto al
//! accept loop. Las cuatro estrategias producen el mismo comportamiento
//! observable; cambian el uso de recursos y el aislamiento de fallos:
//!
//! | Estrategia | Concurrencia | Aislamiento |
//! |------------|--------------|-------------|
//! | `Inline`   | ninguna: el accept loop atiende | ninguno |
//! | `Forked`   | un proceso por conexión | total (otro espacio de memoria) |
//! | `Threaded` | un thread por conexión, sin límite | panics aislados |
//! | `Pooled`   | N workers fijos + cola FIFO | panics aislados |
//!
//! Los threads y procesos creados por `Threaded` y `Forked` nunca se
//! esperan (join). Los hijos de `Forked` se cosechan con `waitpid` no
//! bloqueante después de cada fork para no acumular zombies.

use crate::metrics::ServerStats;
use crate::server::connection::Connection;
use crate::server::pool::WorkerPool;
use crate::signals;
use clap::ValueEnum;
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{fork, ForkResult, Pid};
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use tracing::{debug, error, warn};

/// Algo que sabe atender una conexión
///
/// El handler recibe la conexión por valor: al terminar (o al hacer panic)
/// la suelta y el socket se cierra.
pub trait ConnectionHandler: Send + Sync + 'static {
    fn handle(&self, conn: Connection);
}

impl<F> ConnectionHandler for F
where
    F: Fn(Connection) + Send + Sync + 'static,
{
    fn handle(&self, conn: Connection) {
        self(conn)
    }
}

/// Estrategia elegida al arrancar
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Strategy {
    /// El accept loop ejecuta el handler
    Inline,
    /// `fork()` por conexión
    Forked,
    /// Un thread por conexión
    Threaded,
    /// Pool fijo de workers alimentado por una cola
    Pooled,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Inline => "inline",
            Strategy::Forked => "forked",
            Strategy::Threaded => "threaded",
            Strategy::Pooled => "pooled",
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

enum Mode {
    Inline,
    Forked,
    Threaded,
    Pooled(WorkerPool),
}

/// Ejecuta la estrategia activa sobre cada conexión
pub struct Dispatcher {
    handler: Arc<dyn ConnectionHandler>,
    stats: ServerStats,
    mode: Mode,
}

impl Dispatcher {
    /// Crea el dispatcher; con `Pooled` lanza los `pool_size` workers ya
    pub fn new(
        strategy: Strategy,
        pool_size: usize,
        handler: Arc<dyn ConnectionHandler>,
        stats: ServerStats,
    ) -> io::Result<Self> {
        let mode = match strategy {
            Strategy::Inline => Mode::Inline,
            Strategy::Forked => Mode::Forked,
            Strategy::Threaded => Mode::Threaded,
            Strategy::Pooled => Mode::Pooled(WorkerPool::spawn(
                pool_size,
                Arc::clone(&handler),
                stats.clone(),
            )?),
        };

        Ok(Self {
            handler,
            stats,
            mode,
        })
    }

    pub fn strategy(&self) -> Strategy {
        match self.mode {
            Mode::Inline => Strategy::Inline,
            Mode::Forked => Strategy::Forked,
            Mode::Threaded => Strategy::Threaded,
            Mode::Pooled(_) => Strategy::Pooled,
        }
    }

    /// Programa la atención de una conexión
    pub fn dispatch(&self, mut conn: Connection) {
        conn.mark_dispatched();

        match &self.mode {
            Mode::Inline => run_handler(self.handler.as_ref(), &self.stats, conn),
            Mode::Forked => self.fork_and_handle(conn),
            Mode::Threaded => self.spawn_and_handle(conn),
            Mode::Pooled(pool) => match pool.submit(conn) {
                Ok(()) => debug!(queued = pool.queued(), workers = pool.size(), "conexión encolada"),
                Err(conn) => warn!(conn = conn.id(), "cola cerrada, se descarta la conexión"),
            },
        }
    }

    fn fork_and_handle(&self, conn: Connection) {
        // SAFETY: el hijo solo atiende esta conexión y termina con _exit,
        // sin volver al accept loop ni tocar el estado del padre.
        match unsafe { fork() } {
            Ok(ForkResult::Child) => {
                // El handler de Ctrl+C del padre vive en un thread que el hijo no tiene
                if let Err(e) = signals::reset_interrupt() {
                    warn!(conn = conn.id(), error = %e, "no se pudo restaurar SIGINT en el hijo");
                }
                run_handler(self.handler.as_ref(), &self.stats, conn);
                // SAFETY: _exit termina el hijo sin correr hooks de atexit del padre
                unsafe { nix::libc::_exit(0) }
            }
            Ok(ForkResult::Parent { child }) => {
                debug!(conn = conn.id(), child = child.as_raw(), "conexión entregada a proceso hijo");
                // La copia del padre se cierra ya; el hijo tiene la suya
                drop(conn);
                reap_children();
            }
            Err(errno) => {
                error!(conn = conn.id(), error = %errno, "fork falló, se cierra la conexión");
            }
        }
    }

    fn spawn_and_handle(&self, conn: Connection) {
        let id = conn.id();
        let handler = Arc::clone(&self.handler);
        let stats = self.stats.clone();

        let spawned = thread::Builder::new()
            .name(format!("conn-{}", id))
            .spawn(move || run_handler(handler.as_ref(), &stats, conn));

        // Sin join: el thread libera sus recursos al terminar
        if let Err(e) = spawned {
            error!(conn = id, error = %e, "no se pudo crear el thread, se cierra la conexión");
        }
    }

    /// Cierra la cola y espera a los workers (solo `Pooled`)
    ///
    /// Las conexiones ya encoladas se atienden antes de que los workers
    /// salgan.
    pub fn shutdown(self) {
        if let Mode::Pooled(pool) = self.mode {
            pool.shutdown();
        }
    }
}

/// Ejecuta el handler con la conexión; un panic queda contenido aquí
pub(crate) fn run_handler(handler: &dyn ConnectionHandler, stats: &ServerStats, mut conn: Connection) {
    conn.mark_handling();
    let id = conn.id();
    let _guard = stats.handler_started();

    if panic::catch_unwind(AssertUnwindSafe(|| handler.handle(conn))).is_err() {
        error!(conn = id, "el handler hizo panic; la conexión quedó cerrada");
    }
}

/// Cosecha todos los hijos que ya terminaron, sin bloquear
///
/// Retorna cuántos cosechó.
pub fn reap_children() -> usize {
    let mut reaped = 0;
    loop {
        match waitpid(Pid::from_raw(-1), Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::Exited(pid, code)) => {
                reaped += 1;
                debug!(pid = pid.as_raw(), code = code, "hijo cosechado");
            }
            Ok(WaitStatus::Signaled(pid, sig, _)) => {
                reaped += 1;
                warn!(pid = pid.as_raw(), signal = ?sig, "hijo terminado por señal");
            }
            Ok(WaitStatus::StillAlive) => break,
            Err(nix::errno::Errno::ECHILD) => break,
            Err(e) => {
                warn!(error = %e, "waitpid falló");
                break;
            }
            _ => {}
        }
    }
    reaped
}
