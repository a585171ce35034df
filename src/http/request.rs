//! # Parsing de Requests HTTP/1.0
//! src/http/request.rs
//!
//! Parser HTTP/1.0 desde cero. Solo nos interesa la cabecera del request:
//! el servidor de archivos no acepta body y el proxy no reinterpreta nada
//! (solo descarta la cabecera cuando responde 502).
//!
//! ## Formato de un Request HTTP/1.0
//!
//! ```text
//! GET /docs/a.txt HTTP/1.0\r\n
//! Host: localhost:8000\r\n
//! \r\n
//! ```

use std::collections::HashMap;
use std::io::{self, Read};
use thiserror::Error;

/// Tamaño máximo de la cabecera de un request (request line + headers)
pub const MAX_REQUEST_SIZE: usize = 8192;

/// Métodos HTTP soportados
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// GET - Obtener un recurso
    GET,

    /// HEAD - Como GET pero solo retorna headers
    HEAD,
}

impl Method {
    fn parse(s: &str) -> Result<Self, ParseError> {
        match s {
            "GET" => Ok(Method::GET),
            "HEAD" => Ok(Method::HEAD),
            _ => Err(ParseError::UnsupportedMethod(s.to_string())),
        }
    }

    /// Convierte el método a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::GET => "GET",
            Method::HEAD => "HEAD",
        }
    }
}

/// Errores que pueden ocurrir leyendo o parseando la cabecera
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// El peer cerró sin mandar nada
    #[error("Empty request")]
    EmptyRequest,

    /// La cabecera no cabe en `MAX_REQUEST_SIZE` bytes
    #[error("Request head exceeds {} bytes", MAX_REQUEST_SIZE)]
    TooLarge,

    /// Formato inválido de la request line
    #[error("Invalid request line format")]
    InvalidRequestLine,

    /// Método HTTP no soportado
    #[error("Unsupported HTTP method: {0}")]
    UnsupportedMethod(String),

    /// Versión HTTP incorrecta
    #[error("Invalid HTTP version: {0}")]
    InvalidHttpVersion(String),

    /// Header malformado
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// Escape `%XX` inválido o bytes que no son UTF-8 en el path
    #[error("Invalid path encoding: {0}")]
    InvalidPath(String),

    /// Error de I/O leyendo del socket
    #[error("I/O error reading request: {0:?}")]
    Io(io::ErrorKind),
}

/// Representa la cabecera de un request HTTP/1.0 parseado
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,

    /// Path ya decodificado (sin query string)
    path: String,

    /// Query string cruda, si existe
    query: Option<String>,

    /// Headers con el nombre en minúsculas
    headers: HashMap<String, String>,

    version: String,
}

impl Request {
    /// Lee la cabecera de un request desde un stream y la parsea
    ///
    /// Lee hasta encontrar la línea vacía que cierra los headers, hasta EOF,
    /// o hasta llenar `MAX_REQUEST_SIZE` bytes.
    pub fn read_from<R: Read + ?Sized>(reader: &mut R) -> Result<Self, ParseError> {
        let head = read_head(reader)?;
        Self::parse(&head)
    }

    /// Parsea una cabecera HTTP/1.0 desde bytes
    ///
    /// # Ejemplo
    ///
    /// ```
    /// use dispatch_server::http::Request;
    ///
    /// let raw = b"GET /docs/a%20b.txt?x=1 HTTP/1.0\r\n\r\n";
    /// let request = Request::parse(raw).unwrap();
    ///
    /// assert_eq!(request.path(), "/docs/a b.txt");
    /// assert_eq!(request.query(), Some("x=1"));
    /// ```
    pub fn parse(buffer: &[u8]) -> Result<Self, ParseError> {
        let request_str =
            std::str::from_utf8(buffer).map_err(|_| ParseError::InvalidRequestLine)?;

        if request_str.trim().is_empty() {
            return Err(ParseError::EmptyRequest);
        }

        let mut lines = request_str.lines();
        let request_line = lines.next().ok_or(ParseError::InvalidRequestLine)?;
        let (method, target, version) = Self::parse_request_line(request_line)?;

        let (raw_path, query) = match target.split_once('?') {
            Some((path, query)) => (path, Some(query.to_string())),
            None => (target, None),
        };
        let path = percent_decode(raw_path)?;

        let headers = Self::parse_headers(lines)?;

        Ok(Request {
            method,
            path,
            query,
            headers,
            version,
        })
    }

    /// Formato: `GET /path?query HTTP/1.0`
    fn parse_request_line(line: &str) -> Result<(Method, &str, String), ParseError> {
        let parts: Vec<&str> = line.split_whitespace().collect();

        if parts.len() != 3 {
            return Err(ParseError::InvalidRequestLine);
        }

        let method = Method::parse(parts[0])?;

        let version = parts[2].to_string();
        if version != "HTTP/1.0" && version != "HTTP/1.1" {
            return Err(ParseError::InvalidHttpVersion(version));
        }

        Ok((method, parts[1], version))
    }

    fn parse_headers<'a>(
        lines: impl Iterator<Item = &'a str>,
    ) -> Result<HashMap<String, String>, ParseError> {
        let mut headers = HashMap::new();

        for line in lines {
            // La línea vacía marca el fin de los headers
            if line.trim().is_empty() {
                break;
            }

            match line.split_once(':') {
                Some((name, value)) => {
                    headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
                }
                None => return Err(ParseError::InvalidHeader(line.to_string())),
            }
        }

        Ok(headers)
    }

    pub fn method(&self) -> Method {
        self.method
    }

    /// Path decodificado, sin query string
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// Obtiene un header (búsqueda sin distinguir mayúsculas)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(|s| s.as_str())
    }

    pub fn version(&self) -> &str {
        &self.version
    }
}

/// Lee bytes hasta el fin de la cabecera (`\r\n\r\n` o `\n\n`)
fn read_head<R: Read + ?Sized>(reader: &mut R) -> Result<Vec<u8>, ParseError> {
    let mut head = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];

    loop {
        let n = match reader.read(&mut chunk) {
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(ParseError::Io(e.kind())),
        };

        if n == 0 {
            if head.is_empty() {
                return Err(ParseError::EmptyRequest);
            }
            // EOF sin línea vacía: parseamos lo que llegó
            return Ok(head);
        }

        head.extend_from_slice(&chunk[..n]);

        if let Some(end) = find_head_end(&head) {
            head.truncate(end);
            return Ok(head);
        }
        if head.len() >= MAX_REQUEST_SIZE {
            return Err(ParseError::TooLarge);
        }
    }
}

fn find_head_end(buf: &[u8]) -> Option<usize> {
    let crlf = buf.windows(4).position(|w| w == b"\r\n\r\n").map(|i| i + 4);
    let lf = buf.windows(2).position(|w| w == b"\n\n").map(|i| i + 2);
    match (crlf, lf) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

/// Decodifica escapes `%XX` del path
///
/// A diferencia de la query, en el path `+` es un carácter literal.
fn percent_decode(raw: &str) -> Result<String, ParseError> {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = bytes
                .get(i + 1..i + 3)
                .and_then(|h| std::str::from_utf8(h).ok())
                .and_then(|h| u8::from_str_radix(h, 16).ok())
                .ok_or_else(|| ParseError::InvalidPath(raw.to_string()))?;
            out.push(hex);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }

    String::from_utf8(out).map_err(|_| ParseError::InvalidPath(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_get() {
        let request = Request::parse(b"GET / HTTP/1.0\r\n\r\n").unwrap();

        assert_eq!(request.method(), Method::GET);
        assert_eq!(request.path(), "/");
        assert_eq!(request.query(), None);
        assert_eq!(request.version(), "HTTP/1.0");
    }

    #[test]
    fn test_parse_head_and_http11() {
        let request = Request::parse(b"HEAD /index.html HTTP/1.1\r\n\r\n").unwrap();
        assert_eq!(request.method(), Method::HEAD);
        assert_eq!(request.version(), "HTTP/1.1");
    }

    #[test]
    fn test_parse_with_headers_case_insensitive() {
        let raw = b"GET / HTTP/1.0\r\nHost: localhost:8000\r\nUser-Agent: test\r\n\r\n";
        let request = Request::parse(raw).unwrap();

        assert_eq!(request.header("host"), Some("localhost:8000"));
        assert_eq!(request.header("USER-AGENT"), Some("test"));
    }

    #[test]
    fn test_percent_decoded_path_exposes_dotdot() {
        let request = Request::parse(b"GET /%2e%2e/secret HTTP/1.0\r\n\r\n").unwrap();
        assert_eq!(request.path(), "/../secret");
    }

    #[test]
    fn test_plus_is_literal_in_path() {
        let request = Request::parse(b"GET /a+b.txt HTTP/1.0\r\n\r\n").unwrap();
        assert_eq!(request.path(), "/a+b.txt");
    }

    #[test]
    fn test_bad_percent_escape() {
        let result = Request::parse(b"GET /%zz HTTP/1.0\r\n\r\n");
        assert!(matches!(result, Err(ParseError::InvalidPath(_))));
    }

    #[test]
    fn test_unsupported_method() {
        let result = Request::parse(b"POST / HTTP/1.0\r\n\r\n");
        assert_eq!(result.unwrap_err(), ParseError::UnsupportedMethod("POST".to_string()));
    }

    #[test]
    fn test_invalid_version() {
        let result = Request::parse(b"GET / HTTP/2.0\r\n\r\n");
        assert!(matches!(result, Err(ParseError::InvalidHttpVersion(_))));
    }

    #[test]
    fn test_invalid_request_line() {
        let result = Request::parse(b"GET\r\n\r\n");
        assert_eq!(result.unwrap_err(), ParseError::InvalidRequestLine);
    }

    #[test]
    fn test_invalid_header() {
        let result = Request::parse(b"GET / HTTP/1.0\r\nno-colon-here\r\n\r\n");
        assert!(matches!(result, Err(ParseError::InvalidHeader(_))));
    }

    #[test]
    fn test_read_from_stops_at_blank_line() {
        let raw = b"GET /a HTTP/1.0\r\nHost: x\r\n\r\nBODY-THAT-IS-IGNORED";
        let mut reader = &raw[..];
        let request = Request::read_from(&mut reader).unwrap();
        assert_eq!(request.path(), "/a");
    }

    #[test]
    fn test_read_from_empty_stream() {
        let mut reader = &b""[..];
        assert_eq!(Request::read_from(&mut reader).unwrap_err(), ParseError::EmptyRequest);
    }

    #[test]
    fn test_read_from_without_terminator_parses_what_arrived() {
        let mut reader = &b"GET /x HTTP/1.0\r\n"[..];
        assert_eq!(Request::read_from(&mut reader).unwrap().path(), "/x");
    }

    #[test]
    fn test_read_from_too_large() {
        let mut raw = b"GET / HTTP/1.0\r\n".to_vec();
        raw.extend(std::iter::repeat(b'a').take(MAX_REQUEST_SIZE));
        let mut reader = &raw[..];
        assert_eq!(Request::read_from(&mut reader).unwrap_err(), ParseError::TooLarge);
    }
}
