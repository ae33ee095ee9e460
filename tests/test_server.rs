use std::fs;
use std::io::{ ErrorKind, Read, Write };
use std::net::{ SocketAddr, TcpStream };
use std::os::unix::fs::PermissionsExt;
use std::thread::{ self, JoinHandle };
use std::time::Duration;

use staticserver::error::ServerError;
use staticserver::server::metrics::ServerMetrics;
use staticserver::{ Config, Server, ShutdownHandle };
use std::sync::Arc;
use tempfile::TempDir;

const HELLO: &[u8] = b"hello, static world\n";

struct TestServer {
    addr: SocketAddr,
    handle: ShutdownHandle,
    metrics: Arc<ServerMetrics>,
    thread: Option<JoinHandle<Result<(), ServerError>>>,
    _root: TempDir,
}

impl TestServer {
    fn start(tweak: impl FnOnce(&mut Config)) -> Self {
        let root = tempfile::tempdir().unwrap();
        fs::write(root.path().join("hello.txt"), HELLO).unwrap();
        fs::write(root.path().join("empty.html"), b"").unwrap();

        let secret = root.path().join("secret.txt");
        fs::write(&secret, b"top secret").unwrap();
        fs::set_permissions(&secret, fs::Permissions::from_mode(0o640)).unwrap();

        let sub = root.path().join("sub");
        fs::create_dir(&sub).unwrap();
        fs::set_permissions(&sub, fs::Permissions::from_mode(0o755)).unwrap();

        let mut config = Config {
            host: "127.0.0.1".to_string(),
            port: 0,
            document_root: root.path().to_path_buf(),
            workers: 2,
            max_connections: 16,
            ..Config::default()
        };
        tweak(&mut config);

        let mut server = Server::new(config).unwrap();
        let addr = server.bind().unwrap();
        let handle = server.shutdown_handle();
        let metrics = server.metrics();
        let thread = thread::spawn(move || server.run());

        Self { addr, handle, metrics, thread: Some(thread), _root: root }
    }

    fn connect(&self) -> TcpStream {
        let stream = TcpStream::connect(self.addr).unwrap();
        stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        stream
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.shutdown();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

struct Response {
    head: String,
    body: Vec<u8>,
}

impl Response {
    fn status(&self) -> u16 {
        self.head.split(' ').nth(1).and_then(|s| s.parse().ok()).unwrap()
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.head
            .split("\r\n")
            .filter_map(|line| line.split_once(':'))
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.trim())
    }
}

/// Reads one response, leaving anything after its body unread.
fn read_response(stream: &mut TcpStream) -> Response {
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        let n = stream.read(&mut byte).unwrap();
        assert_eq!(n, 1, "connection closed inside headers: {:?}", String::from_utf8_lossy(&head));
        head.push(byte[0]);
    }
    let head = String::from_utf8(head).unwrap();

    let mut response = Response { head, body: Vec::new() };
    let len: usize = response.header("Content-Length").unwrap().parse().unwrap();
    response.body = vec![0u8; len];
    stream.read_exact(&mut response.body).unwrap();
    response
}

/// Everything the server sends until it closes; a reset counts as the end.
fn read_until_closed(stream: &mut TcpStream) -> Vec<u8> {
    let mut out = Vec::new();
    let mut chunk = [0u8; 512];
    loop {
        match stream.read(&mut chunk) {
            Ok(0) => return out,
            Ok(n) => out.extend_from_slice(&chunk[..n]),
            Err(e) if e.kind() == ErrorKind::ConnectionReset => return out,
            Err(e) => panic!("read failed: {}", e),
        }
    }
}

fn get(server: &TestServer, url: &str) -> Response {
    let mut stream = server.connect();
    write!(stream, "GET {} HTTP/1.1\r\nHost: localhost\r\n\r\n", url).unwrap();
    read_response(&mut stream)
}

#[test]
fn serves_file_contents() {
    let server = TestServer::start(|_| {});
    let mut stream = server.connect();
    stream.write_all(b"GET /hello.txt HTTP/1.1\r\nHost: localhost\r\n\r\n").unwrap();

    let response = read_response(&mut stream);
    assert!(response.head.starts_with("HTTP/1.1 200 OK\r\n"), "{}", response.head);
    assert_eq!(response.header("Content-Length"), Some(HELLO.len().to_string().as_str()));
    assert_eq!(response.header("Connection"), Some("close"));
    assert_eq!(response.body, HELLO);

    // Not persistent: the server closes after the body.
    assert!(read_until_closed(&mut stream).is_empty());
}

#[test]
fn empty_file_gets_placeholder_body() {
    let server = TestServer::start(|_| {});
    let response = get(&server, "/empty.html");
    assert_eq!(response.status(), 200);
    assert_eq!(response.body, b"<html><body></body></html>");
}

#[test]
fn error_statuses() {
    let server = TestServer::start(|_| {});

    let missing = get(&server, "/nope.txt");
    assert_eq!(missing.status(), 404);
    assert_eq!(missing.body, b"The requested file was not found on this server.\n");

    let dir = get(&server, "/sub");
    assert_eq!(dir.status(), 400);

    let secret = get(&server, "/secret.txt");
    assert_eq!(secret.status(), 403);
    assert_eq!(secret.body, b"You do not have permission to get file from this server.\n");

    let escape = get(&server, "/sub/../hello.txt");
    assert_eq!(escape.status(), 403);
}

#[test]
fn malformed_requests_get_400() {
    let server = TestServer::start(|_| {});
    for raw in [
        &b"POST /hello.txt HTTP/1.1\r\n\r\n"[..],
        b"GET /hello.txt HTTP/1.0\r\n\r\n",
        b"GET /hello.txt HTTP/1.1\nHost: x\n\n",
    ] {
        let mut stream = server.connect();
        stream.write_all(raw).unwrap();
        let response = read_response(&mut stream);
        assert_eq!(response.status(), 400, "{:?}", String::from_utf8_lossy(raw));
        assert_eq!(
            response.body,
            b"Your request has bad syntax or is inherently impossible to satisfy.\n"
        );
    }
}

#[test]
fn keep_alive_serves_several_requests() {
    let server = TestServer::start(|_| {});
    let mut stream = server.connect();

    for _ in 0..3 {
        stream
            .write_all(b"GET /hello.txt HTTP/1.1\r\nConnection: keep-alive\r\n\r\n")
            .unwrap();
        let response = read_response(&mut stream);
        assert_eq!(response.status(), 200);
        assert_eq!(response.header("Connection"), Some("keep-alive"));
        assert_eq!(response.body, HELLO);
    }

    // Without the header the last response ends the connection.
    stream.write_all(b"GET /nope HTTP/1.1\r\n\r\n").unwrap();
    assert_eq!(read_response(&mut stream).status(), 404);
    assert!(read_until_closed(&mut stream).is_empty());
}

#[test]
fn pipelined_requests_are_answered_in_order() {
    let server = TestServer::start(|_| {});
    let mut stream = server.connect();
    stream
        .write_all(
            b"GET /hello.txt HTTP/1.1\r\nConnection: keep-alive\r\n\r\n\
              GET /missing HTTP/1.1\r\nConnection: keep-alive\r\n\r\n"
        )
        .unwrap();

    assert_eq!(read_response(&mut stream).status(), 200);
    assert_eq!(read_response(&mut stream).status(), 404);
}

#[test]
fn request_split_across_writes() {
    let server = TestServer::start(|_| {});
    let mut stream = server.connect();
    stream.set_nodelay(true).unwrap();

    for part in [&b"GE"[..], b"T /hello.t", b"xt HTTP/1.1\r", b"\nHost: x\r\n", b"\r\n"] {
        stream.write_all(part).unwrap();
        thread::sleep(Duration::from_millis(20));
    }

    let response = read_response(&mut stream);
    assert_eq!(response.status(), 200);
    assert_eq!(response.body, HELLO);
}

#[test]
fn waits_for_declared_body() {
    let server = TestServer::start(|_| {});
    let mut stream = server.connect();
    stream.set_nodelay(true).unwrap();

    stream.write_all(b"GET /hello.txt HTTP/1.1\r\nContent-Length: 5\r\n\r\nab").unwrap();
    thread::sleep(Duration::from_millis(50));
    stream.write_all(b"cde").unwrap();

    assert_eq!(read_response(&mut stream).status(), 200);
}

#[test]
fn oversized_request_closes_without_response() {
    let server = TestServer::start(|c| c.read_buffer_size = 64);
    let mut stream = server.connect();
    let _ = stream.write_all(&[b'a'; 200]);
    assert!(read_until_closed(&mut stream).is_empty());
}

#[test]
fn oversized_response_closes_without_response() {
    let server = TestServer::start(|c| c.write_buffer_size = 16);
    let mut stream = server.connect();
    stream.write_all(b"GET /hello.txt HTTP/1.1\r\n\r\n").unwrap();
    assert!(read_until_closed(&mut stream).is_empty());
}

#[test]
fn busy_server_turns_clients_away() {
    let server = TestServer::start(|c| c.max_connections = 1);

    let mut first = server.connect();
    let mut second = server.connect();
    assert_eq!(read_until_closed(&mut second), b"Internal server busy");

    first.write_all(b"GET /hello.txt HTTP/1.1\r\n\r\n").unwrap();
    assert_eq!(read_response(&mut first).status(), 200);
}

#[test]
fn slot_is_reused_after_close() {
    let server = TestServer::start(|c| c.max_connections = 1);
    for _ in 0..5 {
        let mut stream = server.connect();
        stream.write_all(b"GET /hello.txt HTTP/1.1\r\n\r\n").unwrap();
        assert_eq!(read_response(&mut stream).status(), 200);
        assert!(read_until_closed(&mut stream).is_empty());
    }
    assert_eq!(server.metrics.req_count(), 5);
}

#[test]
fn shutdown_stops_the_loop() {
    let mut server = TestServer::start(|_| {});
    let _idle = server.connect();
    server.handle.shutdown();

    let result = server.thread.take().unwrap().join().unwrap();
    assert!(result.is_ok());
}

#[test]
fn run_requires_bind() {
    let root = tempfile::tempdir().unwrap();
    let config = Config {
        document_root: root.path().to_path_buf(),
        workers: 1,
        max_connections: 4,
        ..Config::default()
    };
    let mut server = Server::new(config).unwrap();
    assert!(matches!(server.run(), Err(ServerError::NotBound)));
}
