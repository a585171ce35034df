//! # Configuración del Servidor
//! src/config.rs
//!
//! Parsing de argumentos CLI (con fallback a variables de entorno) y
//! construcción de la configuración inmutable que se comparte con el resto
//! del servidor.
//!
//! ## Ejemplos de uso
//!
//! ```bash
//! ./dispatch_server --files ./www --port 8000 --strategy pooled --num-threads 4
//! ./dispatch_server --proxy example.com:80 --strategy threaded
//! ```
//!
//! `Config` es lo que llega de la línea de comandos; `ServerConfig` es el
//! resultado validado. Una vez que arranca el accept loop nadie lo modifica.

use crate::error::ServerError;
use crate::server::dispatch::Strategy;
use clap::{ArgGroup, Parser};
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

/// Puerto por defecto del proxy si `--proxy` no lo indica
pub const DEFAULT_PROXY_PORT: u16 = 80;

/// Argumentos de línea de comandos
#[derive(Debug, Clone, Parser)]
#[command(name = "dispatch_server")]
#[command(about = "Servidor de archivos / proxy TCP con estrategias de despacho intercambiables")]
#[command(version)]
#[command(group(ArgGroup::new("mode").required(true).args(["files", "proxy"])))]
pub struct Config {
    /// Directorio raíz a servir (excluyente con --proxy)
    #[arg(long, env = "SERVER_FILES")]
    pub files: Option<PathBuf>,

    /// Destino del proxy, `host[:puerto]` (excluyente con --files)
    #[arg(long, env = "SERVER_PROXY")]
    pub proxy: Option<String>,

    /// Puerto en el que escucha el servidor
    #[arg(short, long, default_value = "8000", env = "SERVER_PORT")]
    pub port: u16,

    /// Interfaz en la que escucha
    #[arg(long, default_value = "0.0.0.0", env = "SERVER_HOST")]
    pub host: String,

    /// Tamaño del pool de workers (obligatorio con --strategy pooled)
    #[arg(long = "num-threads", env = "SERVER_NUM_THREADS")]
    pub num_threads: Option<usize>,

    /// Estrategia de despacho de conexiones
    #[arg(long, value_enum, default_value = "pooled", env = "SERVER_STRATEGY")]
    pub strategy: Strategy,

    /// Timeout de inactividad en segundos para lecturas de socket (0 = sin timeout)
    #[arg(long = "idle-timeout", default_value = "0", env = "SERVER_IDLE_TIMEOUT")]
    pub idle_timeout_secs: u64,

    /// Filtro de logs si RUST_LOG no está definido
    #[arg(long = "log-level", default_value = "info", env = "LOG_LEVEL")]
    pub log_level: String,
}

impl Config {
    /// Valida combinaciones que clap no puede expresar
    pub fn validate(&self) -> Result<(), String> {
        if self.num_threads == Some(0) {
            return Err("--num-threads must be a positive integer".to_string());
        }
        if self.strategy == Strategy::Pooled && self.num_threads.is_none() {
            return Err("--num-threads is required with --strategy pooled".to_string());
        }
        if self.files.is_some() == self.proxy.is_some() {
            return Err("exactly one of --files or --proxy is required".to_string());
        }
        Ok(())
    }

    /// Valida y construye la configuración inmutable
    ///
    /// Canonicaliza la raíz de archivos y resuelve el host del proxy una vez
    /// al arrancar; un host que no resuelve es un error fatal.
    pub fn into_server_config(self) -> Result<ServerConfig, ServerError> {
        self.validate().map_err(ServerError::Config)?;

        let mode = match (self.files, self.proxy) {
            (Some(root), None) => {
                let root = root.canonicalize().map_err(|e| {
                    ServerError::Config(format!("--files {}: {}", root.display(), e))
                })?;
                if !root.is_dir() {
                    return Err(ServerError::Config(format!(
                        "--files {} is not a directory",
                        root.display()
                    )));
                }
                ServeMode::Files { root }
            }
            (None, Some(target)) => {
                let target = ProxyTarget::parse(&target).map_err(ServerError::Config)?;
                target.resolve().map_err(|source| ServerError::Resolve {
                    host: target.host.clone(),
                    port: target.port,
                    source,
                })?;
                ServeMode::Proxy(target)
            }
            _ => {
                return Err(ServerError::Config(
                    "exactly one of --files or --proxy is required".to_string(),
                ))
            }
        };

        Ok(ServerConfig {
            host: self.host,
            port: self.port,
            strategy: self.strategy,
            pool_size: self.num_threads.unwrap_or(1),
            mode,
            idle_timeout: (self.idle_timeout_secs > 0)
                .then(|| Duration::from_secs(self.idle_timeout_secs)),
        })
    }
}

/// Qué hace el servidor con cada conexión
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServeMode {
    /// Servir archivos bajo `root` (ya canonicalizado)
    Files { root: PathBuf },

    /// Reenviar bytes a un upstream fijo
    Proxy(ProxyTarget),
}

/// Destino `host:puerto` del proxy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyTarget {
    pub host: String,
    pub port: u16,
}

impl ProxyTarget {
    /// Parsea `host[:puerto]`; sin puerto usa 80
    ///
    /// # Ejemplo
    /// ```
    /// use dispatch_server::config::ProxyTarget;
    ///
    /// let target = ProxyTarget::parse("example.com").unwrap();
    /// assert_eq!(target.port, 80);
    /// let target = ProxyTarget::parse("[::1]:8080").unwrap();
    /// assert_eq!(target.host, "::1");
    /// ```
    pub fn parse(s: &str) -> Result<Self, String> {
        let (host, port) = if let Some(rest) = s.strip_prefix('[') {
            // IPv6 literal: [addr] o [addr]:port
            let (host, after) = rest
                .split_once(']')
                .ok_or_else(|| format!("invalid proxy target: {}", s))?;
            match after.strip_prefix(':') {
                Some(port) => (host, Some(port)),
                None if after.is_empty() => (host, None),
                None => return Err(format!("invalid proxy target: {}", s)),
            }
        } else {
            match s.rsplit_once(':') {
                Some((host, port)) if !host.contains(':') => (host, Some(port)),
                Some(_) => (s, None),
                None => (s, None),
            }
        };

        if host.is_empty() {
            return Err(format!("invalid proxy target: {}", s));
        }

        let port = match port {
            Some(p) => p
                .parse::<u16>()
                .map_err(|_| format!("invalid proxy port: {}", p))?,
            None => DEFAULT_PROXY_PORT,
        };

        Ok(Self {
            host: host.to_string(),
            port,
        })
    }

    /// Resuelve el destino por DNS
    pub fn resolve(&self) -> io::Result<Vec<SocketAddr>> {
        let addrs: Vec<SocketAddr> = (self.host.as_str(), self.port).to_socket_addrs()?.collect();
        if addrs.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} resolved to no addresses", self.host),
            ));
        }
        Ok(addrs)
    }
}

impl std::fmt::Display for ProxyTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Configuración inmutable del proceso
///
/// Se construye una sola vez y se comparte como `Arc<ServerConfig>`.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub strategy: Strategy,

    /// Workers del pool; solo se usa con `Strategy::Pooled`
    pub pool_size: usize,

    pub mode: ServeMode,

    /// Read timeout aplicado a los sockets de cliente y upstream
    pub idle_timeout: Option<Duration>,
}

impl ServerConfig {
    /// Configuración para servir `root` (sin validar)
    pub fn files(root: impl Into<PathBuf>, strategy: Strategy, pool_size: usize) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            strategy,
            pool_size,
            mode: ServeMode::Files { root: root.into() },
            idle_timeout: None,
        }
    }

    /// Configuración de proxy hacia `target` (sin validar)
    pub fn proxy(target: ProxyTarget, strategy: Strategy, pool_size: usize) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            strategy,
            pool_size,
            mode: ServeMode::Proxy(target),
            idle_timeout: None,
        }
    }

    /// Dirección completa para bind (host:port)
    pub fn address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Loguea un resumen de la configuración
    pub fn log_summary(&self) {
        match &self.mode {
            ServeMode::Files { root } => info!(
                address = %self.address(),
                strategy = %self.strategy,
                pool_size = self.pool_size,
                root = %root.display(),
                "modo archivos"
            ),
            ServeMode::Proxy(target) => info!(
                address = %self.address(),
                strategy = %self.strategy,
                pool_size = self.pool_size,
                target = %target,
                idle_timeout_secs = self.idle_timeout.map(|d| d.as_secs()).unwrap_or(0),
                "modo proxy"
            ),
        }
    }
}
