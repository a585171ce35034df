//! # Cola de Trabajo
//! src/server/queue.rs
//!
//! Cola FIFO thread-safe que conecta el accept loop con los workers del
//! pool. Un `Mutex` protege el contenido y un `Condvar` avisa cuando deja de
//! estar vacía.
//!
//! No tiene límite de capacidad. Se puede cerrar: después de `close()` los
//! `push` se rechazan y `pop_blocking` sigue entregando lo que quedó hasta
//! vaciarse, luego retorna `None`.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

struct QueueState<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// Cola FIFO bloqueante
pub struct WorkQueue<T> {
    state: Arc<Mutex<QueueState<T>>>,

    /// Condvar para notificar cuando hay nuevos items (o se cerró la cola)
    not_empty: Arc<Condvar>,
}

impl<T> WorkQueue<T> {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(QueueState {
                items: VecDeque::new(),
                closed: false,
            })),
            not_empty: Arc::new(Condvar::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Encola al final y despierta a un worker
    ///
    /// Si la cola está cerrada devuelve el item.
    pub fn push(&self, item: T) -> Result<(), T> {
        let mut state = self.lock();
        if state.closed {
            return Err(item);
        }
        state.items.push_back(item);
        drop(state);

        self.not_empty.notify_one();
        Ok(())
    }

    /// Desencola el primero, bloqueando mientras la cola esté vacía
    ///
    /// El mutex se libera mientras se espera. Retorna `None` solo si la cola
    /// está cerrada y vacía.
    pub fn pop_blocking(&self) -> Option<T> {
        let mut state = self.lock();

        loop {
            if let Some(item) = state.items.pop_front() {
                return Some(item);
            }
            if state.closed {
                return None;
            }
            state = self
                .not_empty
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Intenta desencolar sin bloquear
    pub fn try_pop(&self) -> Option<T> {
        self.lock().items.pop_front()
    }

    /// Cierra la cola y despierta a todos los que esperan
    pub fn close(&self) {
        self.lock().closed = true;
        self.not_empty.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for WorkQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for WorkQueue<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            not_empty: Arc::clone(&self.not_empty),
        }
    }
}
