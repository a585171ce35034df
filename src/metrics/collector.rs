//! # Estadísticas de Conexiones
//! src/metrics/collector.rs
//!
//! Contadores del servidor: conexiones aceptadas y cerradas, handlers
//! activos (y el pico observado) y respuestas por código de estado.
//!
//! Con `Strategy::Forked` los handlers corren en procesos hijos, así que el
//! padre solo ve aceptadas/cerradas; el resto lo cuenta cada hijo en su copia.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Collector de estadísticas thread-safe
#[derive(Debug, Clone)]
pub struct ServerStats {
    inner: Arc<Mutex<StatsData>>,
    start_time: Instant,
}

#[derive(Debug, Default)]
struct StatsData {
    accepted: u64,
    closed: u64,
    active_handlers: usize,
    peak_handlers: usize,
    status_codes: BTreeMap<u16, u64>,
    responses: u64,
    total_latency: Duration,
    max_latency: Duration,
}

impl ServerStats {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(StatsData::default())),
            start_time: Instant::now(),
        }
    }

    fn data(&self) -> MutexGuard<'_, StatsData> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Una conexión salió de `accept()`
    pub fn record_accepted(&self) {
        self.data().accepted += 1;
    }

    /// Una conexión se cerró (lo llama `Drop` de `Connection`)
    pub fn record_closed(&self) {
        self.data().closed += 1;
    }

    /// Marca el inicio de un handler; el guard lo da por terminado al soltarse
    pub fn handler_started(&self) -> HandlerGuard {
        let mut data = self.data();
        data.active_handlers += 1;
        data.peak_handlers = data.peak_handlers.max(data.active_handlers);
        HandlerGuard {
            stats: self.clone(),
        }
    }

    /// Registra una respuesta generada por el servidor
    pub fn record_response(&self, status_code: u16, latency: Duration) {
        let mut data = self.data();
        *data.status_codes.entry(status_code).or_insert(0) += 1;
        data.responses += 1;
        data.total_latency += latency;
        data.max_latency = data.max_latency.max(latency);
    }

    pub fn active_handlers(&self) -> usize {
        self.data().active_handlers
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let data = self.data();
        let avg_latency_us = if data.responses == 0 {
            0
        } else {
            (data.total_latency.as_micros() / u128::from(data.responses)) as u64
        };

        StatsSnapshot {
            uptime_secs: self.start_time.elapsed().as_secs(),
            accepted: data.accepted,
            closed: data.closed,
            open: data.accepted.saturating_sub(data.closed),
            active_handlers: data.active_handlers,
            peak_handlers: data.peak_handlers,
            status_codes: data.status_codes.clone(),
            avg_latency_us,
            max_latency_us: data.max_latency.as_micros() as u64,
        }
    }

    /// Snapshot serializado como JSON
    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.snapshot()).unwrap_or_else(|e| format!("{{\"error\":\"{}\"}}", e))
    }
}

impl Default for ServerStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Guard RAII de un handler en ejecución
pub struct HandlerGuard {
    stats: ServerStats,
}

impl Drop for HandlerGuard {
    fn drop(&mut self) {
        let mut data = self.stats.data();
        data.active_handlers = data.active_handlers.saturating_sub(1);
    }
}

/// Snapshot de estadísticas (para logs y tests)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub uptime_secs: u64,
    pub accepted: u64,
    pub closed: u64,
    pub open: u64,
    pub active_handlers: usize,
    pub peak_handlers: usize,
    pub status_codes: BTreeMap<u16, u64>,
    pub avg_latency_us: u64,
    pub max_latency_us: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accept_close_counters() {
        let stats = ServerStats::new();
        stats.record_accepted();
        stats.record_accepted();
        stats.record_closed();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.accepted, 2);
        assert_eq!(snapshot.closed, 1);
        assert_eq!(snapshot.open, 1);
    }

    #[test]
    fn test_handler_guard_tracks_peak() {
        let stats = ServerStats::new();

        let a = stats.handler_started();
        let b = stats.handler_started();
        assert_eq!(stats.active_handlers(), 2);
        drop(a);
        let c = stats.handler_started();
        assert_eq!(stats.active_handlers(), 2);
        drop(b);
        drop(c);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.active_handlers, 0);
        assert_eq!(snapshot.peak_handlers, 2);
    }

    #[test]
    fn test_status_codes_and_latency() {
        let stats = ServerStats::new();
        stats.record_response(200, Duration::from_millis(10));
        stats.record_response(200, Duration::from_millis(30));
        stats.record_response(404, Duration::from_millis(5));

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.status_codes.get(&200), Some(&2));
        assert_eq!(snapshot.status_codes.get(&404), Some(&1));
        assert_eq!(snapshot.max_latency_us, 30_000);
        assert_eq!(snapshot.avg_latency_us, 15_000);
    }

    #[test]
    fn test_json_format() {
        let stats = ServerStats::new();
        stats.record_accepted();
        stats.record_response(502, Duration::from_millis(1));

        let value: serde_json::Value = serde_json::from_str(&stats.to_json()).unwrap();
        assert_eq!(value["accepted"], 1);
        assert_eq!(value["status_codes"]["502"], 1);
    }

    #[test]
    fn test_clones_share_state() {
        let stats = ServerStats::new();
        let other = stats.clone();
        other.record_accepted();
        assert_eq!(stats.snapshot().accepted, 1);
    }
}
