//! Tests de integración del servidor
//! tests/integration_test.rs
//!
//! Cada test levanta su propio servidor en 127.0.0.1 con puerto efímero,
//! corre el accept loop en un thread y lo detiene con el `ShutdownHandle`.

use dispatch_server::config::{ProxyTarget, ServerConfig};
use dispatch_server::metrics::ServerStats;
use dispatch_server::server::{Connection, ConnectionHandler, Server, ShutdownHandle, Strategy};
use std::fs;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

struct Running {
    addr: SocketAddr,
    handle: ShutdownHandle,
    stats: ServerStats,
    runner: JoinHandle<()>,
}

impl Running {
    fn start(server: Server) -> Self {
        let addr = server.local_addr();
        let handle = server.shutdown_handle().unwrap();
        let stats = server.stats();
        let runner = thread::spawn(move || {
            server.run().unwrap();
            server.shutdown();
        });
        Running {
            addr,
            handle,
            stats,
            runner,
        }
    }

    fn stop(self) -> ServerStats {
        self.handle.trigger();
        self.runner.join().unwrap();
        self.stats
    }
}

fn start_files(root: &std::path::Path, strategy: Strategy) -> Running {
    let config = Arc::new(ServerConfig::files(root, strategy, 2));
    Running::start(Server::bind(config).unwrap())
}

/// Envía un request crudo y retorna la respuesta completa
fn request(addr: SocketAddr, raw: &str) -> Vec<u8> {
    let mut stream = TcpStream::connect(addr).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(10))).unwrap();
    stream.write_all(raw.as_bytes()).unwrap();

    let mut response = Vec::new();
    stream.read_to_end(&mut response).unwrap();
    response
}

fn get(addr: SocketAddr, path: &str) -> Vec<u8> {
    request(addr, &format!("GET {} HTTP/1.0\r\n\r\n", path))
}

/// Separa cabecera y body
fn split(response: &[u8]) -> (String, Vec<u8>) {
    let pos = response
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .unwrap_or_else(|| panic!("respuesta sin cabecera: {:?}", String::from_utf8_lossy(response)));
    (
        String::from_utf8_lossy(&response[..pos]).into_owned(),
        response[pos + 4..].to_vec(),
    )
}

#[test]
fn test_root_serves_index_html() {
    let root = tempfile::tempdir().unwrap();
    fs::write(root.path().join("index.html"), "hello\n123\n").unwrap();
    let server = start_files(root.path(), Strategy::Pooled);

    let (head, body) = split(&get(server.addr, "/"));
    assert!(head.starts_with("HTTP/1.0 200 OK"), "{}", head);
    assert!(head.contains("Content-Length: 10"));
    assert!(head.contains("Content-Type: text/html"));
    assert_eq!(body, b"hello\n123\n");

    server.stop();
}

#[test]
fn test_directory_without_index_is_listed() {
    let root = tempfile::tempdir().unwrap();
    fs::create_dir(root.path().join("docs")).unwrap();
    fs::write(root.path().join("docs").join("a.txt"), "a").unwrap();
    fs::write(root.path().join("docs").join("b.txt"), "b").unwrap();
    let server = start_files(root.path(), Strategy::Threaded);

    let (head, body) = split(&get(server.addr, "/docs/"));
    let body = String::from_utf8(body).unwrap();
    assert!(head.starts_with("HTTP/1.0 200 OK"));
    assert_eq!(body.matches("<a href=").count(), 2);
    assert!(body.contains(r#"<a href="/docs/a.txt">a.txt</a>"#));
    assert!(body.contains(r#"<a href="/docs/b.txt">b.txt</a>"#));

    server.stop();
}

#[test]
fn test_parent_traversal_is_forbidden() {
    let parent = tempfile::tempdir().unwrap();
    let root = parent.path().join("www");
    fs::create_dir(&root).unwrap();
    fs::write(parent.path().join("secret"), "top secret").unwrap();
    let server = start_files(&root, Strategy::Inline);

    let response = get(server.addr, "/../secret");
    let text = String::from_utf8_lossy(&response);
    assert!(text.starts_with("HTTP/1.0 403 Forbidden"));
    assert!(!text.contains("top secret"));

    server.stop();
}

#[test]
fn test_missing_path_is_404() {
    let root = tempfile::tempdir().unwrap();
    let server = start_files(root.path(), Strategy::Pooled);

    let (head, _) = split(&get(server.addr, "/nothing/here.txt"));
    assert!(head.starts_with("HTTP/1.0 404 Not Found"));

    let stats = server.stop();
    assert_eq!(stats.snapshot().status_codes.get(&404), Some(&1));
}

#[test]
fn test_unreachable_proxy_target_gets_502() {
    // Puerto que nadie escucha
    let port = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
    let target = ProxyTarget::parse(&format!("127.0.0.1:{}", port)).unwrap();
    let config = Arc::new(ServerConfig::proxy(target, Strategy::Threaded, 1));
    let server = Running::start(Server::bind(config).unwrap());

    for _ in 0..3 {
        let (head, _) = split(&get(server.addr, "/"));
        assert!(head.starts_with("HTTP/1.0 502 Bad Gateway"));
    }

    let snapshot = server.stop().snapshot();
    assert_eq!(snapshot.status_codes.get(&502), Some(&3));
    assert_eq!(snapshot.accepted, snapshot.closed);
}

#[test]
fn test_pool_bounds_concurrency() {
    const DELAY: Duration = Duration::from_millis(100);

    let handler: Arc<dyn ConnectionHandler> = Arc::new(|conn: Connection| {
        thread::sleep(DELAY);
        let mut stream = conn.stream();
        let _ = stream.write_all(b"done");
    });
    let root = tempfile::tempdir().unwrap();
    let config = Arc::new(ServerConfig::files(root.path(), Strategy::Pooled, 2));
    let server = Running::start(Server::bind_with_handler(config, handler).unwrap());
    let addr = server.addr;

    let start = Instant::now();
    let clients: Vec<_> = (0..5)
        .map(|_| {
            thread::spawn(move || {
                let mut stream = TcpStream::connect(addr).unwrap();
                let mut reply = String::new();
                stream.read_to_string(&mut reply).unwrap();
                reply
            })
        })
        .collect();

    for client in clients {
        assert_eq!(client.join().unwrap(), "done");
    }
    let elapsed = start.elapsed();

    // 5 conexiones con 2 workers: al menos 3 tandas de 100 ms
    assert!(elapsed >= DELAY * 3, "elapsed {:?}", elapsed);

    let snapshot = server.stop().snapshot();
    assert!(snapshot.peak_handlers <= 2);
    assert_eq!(snapshot.accepted, 5);
    assert_eq!(snapshot.closed, 5);
}

#[test]
fn test_forked_strategy_serves_files() {
    let root = tempfile::tempdir().unwrap();
    fs::write(root.path().join("index.html"), "hello\n123\n").unwrap();
    let server = start_files(root.path(), Strategy::Forked);

    for _ in 0..3 {
        let (head, body) = split(&get(server.addr, "/"));
        assert!(head.starts_with("HTTP/1.0 200 OK"));
        assert_eq!(body, b"hello\n123\n");
    }

    let snapshot = server.stop().snapshot();
    assert_eq!(snapshot.accepted, 3);
    assert_eq!(snapshot.closed, 3);
}
