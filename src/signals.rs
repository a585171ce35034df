//! # Señales
//! src/signals.rs
//!
//! - SIGPIPE se ignora: escribir a un peer que cerró debe dar `EPIPE` como
//!   error de I/O, no matar el proceso.
//! - SIGINT cierra el socket de escucha y termina el proceso con 0, aunque
//!   haya handlers bloqueados (con `Strategy::Inline` el propio accept loop
//!   puede estar dentro de uno).
//! - Los hijos de `Strategy::Forked` vuelven a la acción por defecto de
//!   SIGINT: el handler de `ctrlc` depende de un thread que no existe tras
//!   `fork()`.

use crate::error::ServerError;
use crate::metrics::ServerStats;
use crate::server::ShutdownHandle;
use nix::sys::signal::{self, SigHandler, Signal};
use tracing::info;

pub fn ignore_sigpipe() -> Result<(), ServerError> {
    // SAFETY: SigIgn no ejecuta código nuestro dentro del handler
    unsafe { signal::signal(Signal::SIGPIPE, SigHandler::SigIgn) }?;
    Ok(())
}

/// Restaura la acción por defecto de SIGINT (se usa en hijos de fork)
pub fn reset_interrupt() -> nix::Result<()> {
    // SAFETY: SigDfl no ejecuta código nuestro dentro del handler
    unsafe { signal::signal(Signal::SIGINT, SigHandler::SigDfl) }?;
    Ok(())
}

/// Instala el handler de Ctrl+C
///
/// Detiene el accept loop, loguea las estadísticas y sale con 0 sin esperar
/// a las conexiones en vuelo. Solo puede instalarse una vez por proceso.
pub fn install_interrupt_handler(handle: ShutdownHandle, stats: ServerStats) -> Result<(), ServerError> {
    ctrlc::set_handler(move || {
        info!("SIGINT recibido, cerrando el socket de escucha");
        handle.trigger();
        info!(stats = %stats.to_json(), "servidor detenido");
        std::process::exit(0);
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::net::{TcpListener, TcpStream};

    #[test]
    fn test_write_to_closed_peer_is_an_error() {
        ignore_sigpipe().unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        drop(listener.accept().unwrap());

        // Con SIGPIPE ignorado esto termina en Err en lugar de matar el test
        let chunk = [0u8; 8192];
        let mut failed = false;
        for _ in 0..1000 {
            if client.write_all(&chunk).is_err() {
                failed = true;
                break;
            }
        }
        assert!(failed);
    }

    #[test]
    fn test_reset_interrupt_restores_default() {
        // SAFETY: solo se cambia la disposición, sin handler propio
        unsafe { signal::signal(Signal::SIGINT, SigHandler::SigIgn) }.unwrap();
        reset_interrupt().unwrap();

        let previous = unsafe { signal::signal(Signal::SIGINT, SigHandler::SigDfl) }.unwrap();
        assert_eq!(previous, SigHandler::SigDfl);
    }
}
