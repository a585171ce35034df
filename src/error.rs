//! # Errores del Servidor
//! src/error.rs
//!
//! Errores fatales de arranque. Los errores por conexión (parseo, upstream
//! caído, I/O a mitad de un relay) no llegan aquí: se resuelven con una
//! respuesta 4xx/502 o se loguean dentro del handler.

use std::io;
use thiserror::Error;

/// Código de salida para configuración inválida (igual que clap)
pub const EXIT_USAGE: i32 = 2;

/// Errores que terminan el proceso
#[derive(Debug, Error)]
pub enum ServerError {
    /// Combinación de opciones inválida
    #[error("invalid configuration: {0}")]
    Config(String),

    /// No se pudo crear/bindear/escuchar el socket
    #[error("cannot listen on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// El host del proxy no resuelve a ninguna dirección
    #[error("cannot resolve proxy target {host}:{port}: {source}")]
    Resolve {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    /// Error de una llamada al sistema (fork, sigaction...)
    #[error("syscall error: {0}")]
    Syscall(#[from] nix::Error),

    /// No se pudo instalar el handler de SIGINT
    #[error("signal handler error: {0}")]
    Signal(#[from] ctrlc::Error),

    /// No se pudo inicializar el subscriber de tracing
    #[error("logging init failed: {0}")]
    Logging(String),

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl ServerError {
    /// Código de salida del proceso para este error
    ///
    /// Usa el errno subyacente cuando existe.
    pub fn exit_code(&self) -> i32 {
        match self {
            ServerError::Config(_) => EXIT_USAGE,
            ServerError::Bind { source, .. } | ServerError::Io(source) => {
                source.raw_os_error().unwrap_or(1)
            }
            ServerError::Resolve { source, .. } => {
                source.raw_os_error().unwrap_or(nix::libc::ENXIO)
            }
            ServerError::Syscall(errno) => *errno as i32,
            ServerError::Signal(_) | ServerError::Logging(_) => 1,
        }
    }
}
