//! # Relay de Bytes
//! src/relay.rs
//!
//! `relay` copia bytes de un stream a otro hasta EOF o error. Se usa para
//! mandar el contenido de un archivo al cliente y para cada dirección del
//! proxy.
//!
//! `ProxyLink` empareja la conexión del cliente con la del upstream y corre
//! dos pumps en paralelo:
//!
//! ```text
//!   +--------+  cliente -> upstream   +----------+
//!   | client | ---------------------> |  target  |
//!   |        | <--------------------- |          |
//!   +--------+  upstream -> cliente   +----------+
//! ```
//!
//! Cada pump tiene su propio buffer. El link espera a que terminen los dos
//! antes de cerrar los sockets.

use crate::server::connection::Connection;
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::thread;
use tracing::{debug, warn};

/// Capacidad del buffer de cada relay
pub const RELAY_BUFFER_SIZE: usize = 8192;

/// Copia bytes de `source` a `destination` hasta EOF
///
/// Cada lectura toma como máximo `chunk_limit` bytes (acotado al buffer de
/// 8 KiB). Cada chunk se escribe completo: las escrituras parciales se
/// reintentan con el resto. No cierra ninguno de los dos streams.
///
/// Retorna el total de bytes copiados, o el primer error de lectura o
/// escritura.
///
/// # Ejemplo
/// ```
/// use dispatch_server::relay::relay;
///
/// let mut source = &b"hello\n123\n"[..];
/// let mut destination = Vec::new();
/// let copied = relay(&mut source, &mut destination, 4).unwrap();
///
/// assert_eq!(copied, 10);
/// assert_eq!(destination, b"hello\n123\n");
/// ```
pub fn relay<R, W>(source: &mut R, destination: &mut W, chunk_limit: usize) -> io::Result<u64>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    let mut buf = [0u8; RELAY_BUFFER_SIZE];
    let limit = chunk_limit.clamp(1, RELAY_BUFFER_SIZE);
    let mut total: u64 = 0;

    loop {
        let n = match source.read(&mut buf[..limit]) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };

        write_chunk(destination, &buf[..n])?;
        total += n as u64;
    }

    destination.flush()?;
    Ok(total)
}

/// Escribe el chunk completo, reintentando escrituras parciales
fn write_chunk<W: Write + ?Sized>(destination: &mut W, mut chunk: &[u8]) -> io::Result<()> {
    while !chunk.is_empty() {
        match destination.write(chunk) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "destination accepted no bytes",
                ))
            }
            Ok(written) => chunk = &chunk[written..],
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Resultado de una sesión de proxy
#[derive(Debug)]
pub struct LinkReport {
    /// Bytes cliente -> upstream (o el error que cortó esa dirección)
    pub upstream: io::Result<u64>,

    /// Bytes upstream -> cliente
    pub downstream: io::Result<u64>,
}

impl LinkReport {
    pub fn bytes_up(&self) -> u64 {
        *self.upstream.as_ref().unwrap_or(&0)
    }

    pub fn bytes_down(&self) -> u64 {
        *self.downstream.as_ref().unwrap_or(&0)
    }
}

/// Emparejamiento cliente <-> upstream
pub struct ProxyLink {
    client: Connection,
    target: TcpStream,
}

impl ProxyLink {
    pub fn new(client: Connection, target: TcpStream) -> Self {
        Self { client, target }
    }

    /// Corre los dos pumps y espera a ambos
    ///
    /// Cuando un pump llega a EOF propaga el half-close haciendo
    /// `shutdown(Write)` sobre su destino, así el otro extremo ve EOF y puede
    /// terminar. Si un pump falla, cierra ambos sockets en ambas direcciones
    /// para desbloquear al otro. Al retornar, los dos sockets se cierran
    /// (drop de `self`).
    pub fn run(self) -> LinkReport {
        let client = self.client.stream();
        let target = &self.target;
        let id = self.client.id();

        let (upstream, downstream) = thread::scope(|scope| {
            let up = thread::Builder::new()
                .name(format!("pump-{}-up", id))
                .spawn_scoped(scope, || pump(client, target));
            let down = thread::Builder::new()
                .name(format!("pump-{}-down", id))
                .spawn_scoped(scope, || pump(target, client));

            (join_pump(up), join_pump(down))
        });

        debug!(
            conn = id,
            up_ok = upstream.is_ok(),
            down_ok = downstream.is_ok(),
            "pumps terminados, cerrando ambos sockets"
        );

        LinkReport {
            upstream,
            downstream,
        }
    }
}

/// Una dirección del proxy
fn pump(source: &TcpStream, destination: &TcpStream) -> io::Result<u64> {
    let mut reader = source;
    let mut writer = destination;

    match relay(&mut reader, &mut writer, RELAY_BUFFER_SIZE) {
        Ok(n) => {
            // El otro lado puede ya estar cerrado; no es un error del pump
            let _ = destination.shutdown(Shutdown::Write);
            Ok(n)
        }
        Err(e) => {
            let _ = source.shutdown(Shutdown::Both);
            let _ = destination.shutdown(Shutdown::Both);
            Err(e)
        }
    }
}

fn join_pump(
    spawned: io::Result<thread::ScopedJoinHandle<'_, io::Result<u64>>>,
) -> io::Result<u64> {
    match spawned {
        Ok(handle) => handle
            .join()
            .unwrap_or_else(|_| Err(io::Error::new(io::ErrorKind::Other, "pump panicked"))),
        Err(e) => {
            warn!(error = %e, "no se pudo crear el thread del pump");
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::net::TcpListener;

    /// Writer que acepta como máximo `max` bytes por llamada
    struct ShortWriter {
        out: Vec<u8>,
        max: usize,
        calls: usize,
    }

    impl Write for ShortWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.calls += 1;
            let n = buf.len().min(self.max);
            self.out.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Reader que falla después de entregar `data`
    struct FailingReader {
        data: Cursor<Vec<u8>>,
    }

    impl Read for FailingReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.data.read(buf)? {
                0 => Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")),
                n => Ok(n),
            }
        }
    }

    struct ZeroWriter;

    impl Write for ZeroWriter {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Ok(0)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_relay_copies_everything() {
        let data: Vec<u8> = (0..100_000u32).map(|i| (i % 251) as u8).collect();
        let mut source = Cursor::new(data.clone());
        let mut destination = Vec::new();

        let copied = relay(&mut source, &mut destination, RELAY_BUFFER_SIZE).unwrap();
        assert_eq!(copied, data.len() as u64);
        assert_eq!(destination, data);
    }

    #[test]
    fn test_relay_retries_short_writes() {
        let data = b"the quick brown fox jumps over the lazy dog".to_vec();
        let mut source = Cursor::new(data.clone());
        let mut destination = ShortWriter {
            out: Vec::new(),
            max: 3,
            calls: 0,
        };

        relay(&mut source, &mut destination, RELAY_BUFFER_SIZE).unwrap();
        assert_eq!(destination.out, data);
        assert!(destination.calls >= data.len() / 3);
    }

    #[test]
    fn test_relay_chunk_limit_is_clamped() {
        let data = vec![7u8; RELAY_BUFFER_SIZE * 3];
        let mut destination = Vec::new();

        // 0 se trata como 1; un límite enorme se acota al buffer
        assert_eq!(relay(&mut &data[..10], &mut destination, 0).unwrap(), 10);
        assert_eq!(
            relay(&mut &data[..], &mut destination, usize::MAX).unwrap(),
            data.len() as u64
        );
    }

    #[test]
    fn test_relay_read_error_is_returned() {
        let mut source = FailingReader {
            data: Cursor::new(b"partial".to_vec()),
        };
        let mut destination = Vec::new();

        let err = relay(&mut source, &mut destination, 4).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
        // Lo leído antes del error ya se entregó completo
        assert_eq!(destination, b"partial");
    }

    #[test]
    fn test_relay_write_zero_is_error() {
        let mut source = &b"data"[..];
        let err = relay(&mut source, &mut ZeroWriter, 4).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WriteZero);
    }

    #[test]
    fn test_relay_empty_source() {
        let mut source = &b""[..];
        let mut destination = Vec::new();
        assert_eq!(relay(&mut source, &mut destination, 16).unwrap(), 0);
        assert!(destination.is_empty());
    }

    #[test]
    fn test_relay_between_sockets() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let payload: Vec<u8> = (0..50_000u32).map(|i| (i % 13) as u8).collect();

        let sender = {
            let payload = payload.clone();
            thread::spawn(move || {
                let mut stream = TcpStream::connect(addr).unwrap();
                stream.write_all(&payload).unwrap();
            })
        };

        let (mut accepted, _) = listener.accept().unwrap();
        let mut received = Vec::new();
        relay(&mut accepted, &mut received, 1000).unwrap();
        sender.join().unwrap();

        assert_eq!(received, payload);
    }
}
