//! # Tipos MIME
//! src/http/mime.rs
//!
//! Extensión → `Content-Type` vía `mime_guess`. Lo que no se reconoce se
//! sirve como `text/plain`.

use std::path::Path;

/// Content-Type por defecto para extensiones desconocidas
pub const DEFAULT_MIME: &str = "text/plain";

/// Determina el Content-Type a partir de la extensión del archivo
///
/// # Ejemplo
/// ```
/// use dispatch_server::http::mime::content_type_for;
/// use std::path::Path;
///
/// assert_eq!(content_type_for(Path::new("/srv/index.html")), "text/html");
/// assert_eq!(content_type_for(Path::new("notas")), "text/plain");
/// ```
pub fn content_type_for(path: &Path) -> &'static str {
    mime_guess::from_path(path).first_raw().unwrap_or(DEFAULT_MIME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_extensions() {
        assert_eq!(content_type_for(Path::new("a.css")), "text/css");
        assert_eq!(content_type_for(Path::new("a.JPG")), "image/jpeg");
        assert_eq!(content_type_for(Path::new("dir/a.pdf")), "application/pdf");
        assert_eq!(content_type_for(Path::new("index.html")), "text/html");
        assert_eq!(content_type_for(Path::new("logo.png")), "image/png");
        assert_eq!(content_type_for(Path::new("notes.txt")), "text/plain");
    }

    #[test]
    fn test_unknown_extension_defaults() {
        assert_eq!(content_type_for(Path::new("a.xyz")), DEFAULT_MIME);
        assert_eq!(content_type_for(Path::new("Makefile")), DEFAULT_MIME);
    }
}
