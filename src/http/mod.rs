//! # Módulo HTTP
//! src/http/mod.rs
//!
//! Implementación mínima de HTTP/1.0 para el modo servidor de archivos:
//!
//! - Parsing de la cabecera del request
//! - Construcción de responses
//! - Códigos de estado
//! - Tipos MIME y listado HTML de directorios
//!
//! El modo proxy no usa este módulo salvo para responder 502: el tráfico
//! proxeado se reenvía opaco.
//!
//! ### Formato de Response
//!
//! ```text
//! HTTP/1.0 200 OK\r\n
//! Content-Type: text/html\r\n
//! Content-Length: 10\r\n
//! \r\n
//! hello\n123\n
//! ```

pub mod listing;
pub mod mime;
pub mod request;
pub mod response;
pub mod status;

pub use request::{Method, ParseError, Request};
pub use response::Response;
pub use status::StatusCode;
