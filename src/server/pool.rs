//! # Pool de Workers
//! src/server/pool.rs
//!
//! Número fijo de threads que consumen conexiones de una `WorkQueue`.
//! Los workers se crean una sola vez, antes de aceptar la primera conexión,
//! y cada uno atiende una conexión a la vez.

use crate::metrics::ServerStats;
use crate::server::connection::Connection;
use crate::server::dispatch::{run_handler, ConnectionHandler};
use crate::server::queue::WorkQueue;
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

pub struct WorkerPool {
    queue: WorkQueue<Connection>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Lanza `size` workers (mínimo 1)
    ///
    /// Si un thread no se puede crear, cierra la cola para liberar a los ya
    /// creados y retorna el error.
    pub fn spawn(
        size: usize,
        handler: Arc<dyn ConnectionHandler>,
        stats: ServerStats,
    ) -> io::Result<Self> {
        let size = size.max(1);
        let queue = WorkQueue::new();
        let mut workers = Vec::with_capacity(size);

        for id in 0..size {
            let worker_queue = queue.clone();
            let handler = Arc::clone(&handler);
            let stats = stats.clone();

            let spawned = thread::Builder::new()
                .name(format!("worker-{}", id))
                .spawn(move || worker_loop(id, worker_queue, handler, stats));

            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    queue.close();
                    for handle in workers {
                        let _ = handle.join();
                    }
                    return Err(e);
                }
            }
        }

        info!(workers = size, "pool de workers iniciado");
        Ok(Self { queue, workers })
    }

    /// Encola una conexión; la devuelve si la cola ya está cerrada
    pub fn submit(&self, conn: Connection) -> Result<(), Connection> {
        self.queue.push(conn)
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Conexiones esperando un worker libre
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Cierra la cola, deja que se vacíe y espera a todos los workers
    pub fn shutdown(self) {
        self.queue.close();
        for handle in self.workers {
            if handle.join().is_err() {
                warn!("un worker terminó con panic");
            }
        }
    }
}

fn worker_loop(
    id: usize,
    queue: WorkQueue<Connection>,
    handler: Arc<dyn ConnectionHandler>,
    stats: ServerStats,
) {
    debug!(worker = id, "worker esperando conexiones");

    while let Some(conn) = queue.pop_blocking() {
        debug!(worker = id, conn = conn.id(), "worker toma conexión");
        run_handler(handler.as_ref(), &stats, conn);
    }

    debug!(worker = id, "cola cerrada, worker termina");
}
