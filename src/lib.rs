//! # Dispatch Server
//! src/lib.rs
//!
//! Servidor TCP que sirve archivos estáticos o actúa como proxy transparente
//! hacia un upstream fijo. Lo interesante no es HTTP sino la capa de
//! despacho: la misma lógica de atención corre con cuatro estrategias de
//! concurrencia intercambiables en runtime.
//!
//! ## Arquitectura
//!
//! - `server`: accept loop, conexiones, estrategias de despacho, pool y cola
//! - `router`: atención de una conexión (archivos o proxy)
//! - `relay`: copia de bytes entre streams y el par de pumps del proxy
//! - `http`: parsing de requests y armado de respuestas HTTP/1.0
//! - `config`: CLI y configuración inmutable
//! - `metrics`: contadores de conexiones y handlers
//! - `logging`, `signals`, `error`: soporte del binario
//!
//! ## Ejemplo de uso
//!
//! ```no_run
//! use dispatch_server::config::ServerConfig;
//! use dispatch_server::server::{Server, Strategy};
//! use std::sync::Arc;
//!
//! let config = Arc::new(ServerConfig::files("./www", Strategy::Pooled, 4));
//! let server = Server::bind(config).unwrap();
//! server.run().unwrap();
//! ```

pub mod config;
pub mod error;
pub mod http;
pub mod logging;
pub mod metrics;
pub mod relay;
pub mod router;
pub mod server;
pub mod signals;
