//! # Servicio de Archivos
//! src/router/files.rs
//!
//! Atiende un request HTTP/1.0 sirviendo archivos bajo una raíz:
//!
//! - archivo regular → 200 con Content-Type por extensión y el contenido
//! - directorio → su `index.html`, o un listado HTML de sus entradas
//! - path relativo o request inválido → 400
//! - path con `..`, o que sale de la raíz al resolver symlinks → 403
//! - cualquier otra cosa → 404
//!
//! Después de responder la conexión se cierra (HTTP/1.0 sin keep-alive).

use crate::http::listing::render_listing;
use crate::http::mime::content_type_for;
use crate::http::{Method, Request, Response, StatusCode};
use crate::metrics::ServerStats;
use crate::relay::{relay, RELAY_BUFFER_SIZE};
use crate::router::SERVER_NAME;
use crate::server::connection::Connection;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, warn};

/// Resultado de resolver un path pedido contra la raíz
#[derive(Debug, PartialEq)]
enum Target {
    File { path: PathBuf, len: u64 },
    Directory(PathBuf),
}

pub struct FileService {
    root: PathBuf,
    stats: ServerStats,
}

impl FileService {
    /// `root` se canonicaliza aquí si todavía no lo está
    pub fn new(root: PathBuf, stats: ServerStats) -> Self {
        let root = root.canonicalize().unwrap_or(root);
        Self { root, stats }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn handle(&self, conn: Connection) {
        let start = Instant::now();
        let mut stream = conn.stream();

        match self.serve(&mut stream) {
            Ok(status) => {
                debug!(conn = conn.id(), status = status.as_u16(), "respuesta enviada");
                self.stats.record_response(status.as_u16(), start.elapsed());
            }
            Err(e) => {
                debug!(conn = conn.id(), error = %e, "cliente desconectado durante la respuesta");
            }
        }
    }

    /// Lee un request de `stream` y escribe la respuesta completa
    ///
    /// Retorna el status enviado; `Err` solo si falló la escritura (o la
    /// lectura del archivo a mitad del body).
    pub fn serve<S: Read + Write + ?Sized>(&self, stream: &mut S) -> io::Result<StatusCode> {
        let request = match Request::read_from(stream) {
            Ok(request) => request,
            Err(e) => {
                debug!(error = %e, "request inválido");
                return send(stream, Response::error(StatusCode::BadRequest), false);
            }
        };
        let head_only = request.method() == Method::HEAD;
        debug!(
            method = request.method().as_str(),
            path = request.path(),
            query = request.query().unwrap_or(""),
            version = request.version(),
            user_agent = request.header("user-agent").unwrap_or("-"),
            "request"
        );

        let target = match self.resolve(request.path()) {
            Ok(target) => target,
            Err(status) => return send(stream, Response::error(status), head_only),
        };

        match target {
            Target::File { path, len } => send_file(stream, &path, len, head_only),
            Target::Directory(dir) => match self.index_of(&dir) {
                Ok(Some((index, len))) => send_file(stream, &index, len, head_only),
                Ok(None) => match list_directory(&dir) {
                    Ok(entries) => send(
                        stream,
                        Response::html(render_listing(request.path(), entries)),
                        head_only,
                    ),
                    Err(e) => {
                        warn!(dir = %dir.display(), error = %e, "no se pudo listar el directorio");
                        send(stream, Response::error(StatusCode::InternalServerError), head_only)
                    }
                },
                Err(status) => send(stream, Response::error(status), head_only),
            },
        }
    }

    /// `index.html` del directorio, si es un archivo regular dentro de la raíz
    ///
    /// Si no existe (o es un symlink roto) se lista el directorio; si apunta
    /// fuera de la raíz es 403.
    fn index_of(&self, dir: &Path) -> Result<Option<(PathBuf, u64)>, StatusCode> {
        let canonical = match dir.join("index.html").canonicalize() {
            Ok(path) => path,
            Err(_) => return Ok(None),
        };

        if !canonical.starts_with(&self.root) {
            debug!(path = %canonical.display(), "index.html fuera de la raíz");
            return Err(StatusCode::Forbidden);
        }

        match fs::metadata(&canonical) {
            Ok(meta) if meta.is_file() => Ok(Some((canonical, meta.len()))),
            _ => Ok(None),
        }
    }

    /// Traduce el path del request a algo dentro de la raíz
    fn resolve(&self, request_path: &str) -> Result<Target, StatusCode> {
        if !request_path.starts_with('/') {
            return Err(StatusCode::BadRequest);
        }
        // Se rechaza sin tocar el filesystem
        if request_path.split('/').any(|segment| segment == "..") {
            return Err(StatusCode::Forbidden);
        }

        let joined = self.root.join(request_path.trim_start_matches('/'));
        let canonical = joined.canonicalize().map_err(|e| match e.kind() {
            io::ErrorKind::PermissionDenied => StatusCode::Forbidden,
            _ => StatusCode::NotFound,
        })?;

        // Un symlink puede apuntar fuera de la raíz
        if !canonical.starts_with(&self.root) {
            debug!(path = %canonical.display(), "path fuera de la raíz");
            return Err(StatusCode::Forbidden);
        }

        let meta = fs::metadata(&canonical).map_err(|_| StatusCode::NotFound)?;
        if meta.is_file() {
            Ok(Target::File {
                path: canonical,
                len: meta.len(),
            })
        } else if meta.is_dir() {
            Ok(Target::Directory(canonical))
        } else {
            Err(StatusCode::NotFound)
        }
    }
}

/// Nombres de las entradas en el orden que entrega el sistema
fn list_directory(dir: &Path) -> io::Result<Vec<String>> {
    fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.file_name().to_string_lossy().into_owned()))
        .collect()
}

fn decorate(response: Response) -> Response {
    response
        .with_header("Server", SERVER_NAME)
        .with_header("Connection", "close")
}

fn send<W: Write + ?Sized>(
    stream: &mut W,
    response: Response,
    head_only: bool,
) -> io::Result<StatusCode> {
    let response = decorate(response);
    if head_only {
        response.write_head(stream)?;
    } else {
        response.write_to(stream)?;
    }
    Ok(response.status())
}

/// Cabecera con el tamaño del archivo y luego el contenido vía `relay`
fn send_file<W: Write + ?Sized>(
    stream: &mut W,
    path: &Path,
    len: u64,
    head_only: bool,
) -> io::Result<StatusCode> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "no se pudo abrir el archivo");
            let status = if e.kind() == io::ErrorKind::PermissionDenied {
                StatusCode::Forbidden
            } else {
                StatusCode::NotFound
            };
            return send(stream, Response::error(status), head_only);
        }
    };

    let response = decorate(
        Response::new(StatusCode::Ok)
            .with_header("Content-Type", content_type_for(path))
            .with_header("Content-Length", &len.to_string()),
    );
    response.write_head(stream)?;

    if !head_only {
        let sent = relay(&mut file, stream, RELAY_BUFFER_SIZE)?;
        if sent != len {
            warn!(path = %path.display(), expected = len, sent = sent, "el archivo cambió de tamaño durante el envío");
        }
    }

    Ok(StatusCode::Ok)
}
