use std::{
    fs,
    io::{BufRead, BufReader, Read, Write},
    net::{SocketAddr, TcpStream},
    path::PathBuf,
    thread::spawn,
    time::Duration,
};

use serde_json::{json, Value};

use omnifs::{
    FormatOptions, OmniFileSystem, OmniServer, ServerConfig, ServerHandle, UserRole,
};

const TEST_ROOT: &str = "/tmp/omnifs_test/";

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn options() -> FormatOptions {
    FormatOptions {
        total_size: 1024 * 1024,
        header_size: 512,
        block_size: 1024,
        max_users: 8,
        file_table_blocks: 128,
        label: "integration".to_string(),
    }
}

fn loopback() -> SocketAddr {
    "127.0.0.1:0".parse().unwrap()
}

fn start_memory() -> ServerHandle {
    init();
    let fs = OmniFileSystem::new_memory(&options()).unwrap();
    OmniServer::new(fs, ServerConfig::new("memory", loopback()))
        .start()
        .unwrap()
}

struct LineClient {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl LineClient {
    fn connect(addr: SocketAddr) -> Self {
        let writer = TcpStream::connect(addr).unwrap();
        let reader = BufReader::new(writer.try_clone().unwrap());
        LineClient { reader, writer }
    }

    fn send(&mut self, request: Value) {
        let mut line = request.to_string();
        line.push('\n');
        self.writer.write_all(line.as_bytes()).unwrap();
    }

    fn receive(&mut self) -> Value {
        let mut line = String::new();
        self.reader.read_line(&mut line).unwrap();
        serde_json::from_str(&line).unwrap()
    }

    fn call(&mut self, request: Value) -> Value {
        self.send(request);
        self.receive()
    }

    /// Create the first user, and log in as them
    fn bootstrap(&mut self) -> String {
        let r = self.call(json!({
            "operation": "user_create",
            "username": "root",
            "password": "toor",
            "role": "admin",
        }));
        assert_eq!(r["status"], "success", "{}", r);

        let r = self.call(json!({
            "operation": "user_login",
            "username": "root",
            "password": "toor",
        }));
        r["token"].as_str().unwrap().to_string()
    }
}

/// One HTTP exchange; returns the status line and the body
fn http(addr: SocketAddr, request: &str) -> (String, String) {
    let mut stream = TcpStream::connect(addr).unwrap();
    stream.write_all(request.as_bytes()).unwrap();

    let mut response = String::new();
    stream.read_to_string(&mut response).unwrap();

    let status = response.lines().next().unwrap_or_default().to_string();
    let body = match response.find("\r\n\r\n") {
        Some(n) => response[n + 4..].to_string(),
        None => String::new(),
    };
    (status, body)
}

fn post(addr: SocketAddr, body: &Value) -> (String, Value) {
    let body = body.to_string();
    let (status, response) = http(
        addr,
        &format!(
            "POST / HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
            body.len(),
            body
        ),
    );
    (status, serde_json::from_str(&response).unwrap())
}

#[test]
fn line_ping() {
    let server = start_memory();
    let mut client = LineClient::connect(server.local_addr());

    let r = client.call(json!({"operation": "ping", "request_id": "abc"}));
    assert_eq!(
        r,
        json!({"status": "success", "request_id": "abc", "message": "pong"})
    );

    server.shutdown().unwrap();
}

#[test]
fn line_session_and_files() {
    let server = start_memory();
    let mut client = LineClient::connect(server.local_addr());

    let r = client.call(json!({
        "operation": "user_create", "username": "mallory", "password": "x"
    }));
    assert_eq!(r["status"], "success", "the first user needs no token");

    let r = client.call(json!({
        "operation": "user_create", "request_id": "2", "username": "eve", "password": "x"
    }));
    assert_eq!(r["error"], "permission_denied");
    assert_eq!(r["request_id"], "2");

    let r = client.call(json!({
        "operation": "user_login", "username": "mallory", "password": "wrong"
    }));
    assert_eq!(r["error"], "permission_denied");

    let r = client.call(json!({
        "operation": "user_login", "username": "mallory", "password": "x"
    }));
    assert_eq!(r["role"], 0);
    let token = r["token"].as_str().unwrap().to_string();

    let r = client.call(json!({
        "operation": "file_create", "token": token, "path": "/notes.txt", "data": "remember"
    }));
    assert_eq!(r["status"], "success");

    let r = client.call(json!({
        "operation": "file_read", "token": token, "path": "/notes.txt"
    }));
    assert_eq!(r["data"], "remember");

    let r = client.call(json!({
        "operation": "user_list", "token": token
    }));
    assert_eq!(r["error"], "permission_denied", "not an admin");

    let r = client.call(json!({
        "operation": "file_delete", "token": token, "path": "/notes.txt"
    }));
    assert_eq!(r["status"], "success");

    let r = client.call(json!({
        "operation": "file_read", "token": token, "path": "/notes.txt"
    }));
    assert_eq!(r["error"], "not_found");

    let r = client.call(json!({
        "operation": "file_read", "token": "0000", "path": "/notes.txt"
    }));
    assert_eq!(r["error"], "invalid_session");

    let r = client.call(json!({"operation": "teleport", "request_id": 9}));
    assert_eq!(r["error"], "unknown_operation");
    assert_eq!(r["request_id"], "9");

    server.shutdown().unwrap();
}

#[test]
fn line_garbage_gets_an_error() {
    let server = start_memory();
    let mut client = LineClient::connect(server.local_addr());

    client.writer.write_all(b"this is not json\n").unwrap();
    let r = client.receive();
    assert_eq!(r["status"], "error");
    assert_eq!(r["error"], "invalid_request");
    assert_eq!(r["request_id"], "");

    // The connection is still usable afterwards.
    let r = client.call(json!({"operation": "ping"}));
    assert_eq!(r["message"], "pong");

    server.shutdown().unwrap();
}

#[test]
fn line_bad_utf8_gets_an_error_in_turn() {
    let server = start_memory();
    let mut client = LineClient::connect(server.local_addr());

    // Both lines go out before either answer comes back.
    client
        .writer
        .write_all(b"{\"operation\":\"ping\",\"request_id\":\"\xff\"}\n")
        .unwrap();
    client.send(json!({"operation": "ping", "request_id": "after"}));

    let r = client.receive();
    assert_eq!(r["error"], "invalid_request");
    let r = client.receive();
    assert_eq!(r["message"], "pong");
    assert_eq!(r["request_id"], "after");

    server.shutdown().unwrap();
}

#[test]
fn http_requests() {
    let server = start_memory();
    let addr = server.local_addr();

    let (status, r) = post(addr, &json!({"operation": "ping", "request_id": "h1"}));
    assert_eq!(status, "HTTP/1.1 200 OK");
    assert_eq!(r["message"], "pong");
    assert_eq!(r["request_id"], "h1");

    let (status, r) = post(
        addr,
        &json!({"operation": "user_create", "username": "root", "password": "pw", "role": 1}),
    );
    assert_eq!(status, "HTTP/1.1 200 OK");
    assert_eq!(r["status"], "success");

    let (_, r) = post(
        addr,
        &json!({"operation": "user_login", "username": "root", "password": "pw"}),
    );
    let token = r["token"].as_str().unwrap().to_string();

    let (_, r) = post(
        addr,
        &json!({"operation": "dir_create", "token": token, "path": "/web"}),
    );
    assert_eq!(r["status"], "success");

    let (_, r) = post(
        addr,
        &json!({"operation": "dir_list", "token": token, "path": "/"}),
    );
    assert_eq!(r["entries"], json!([{"name": "/web", "type": 1}]));

    let (status, body) = http(addr, "GET / HTTP/1.1\r\nHost: localhost\r\n\r\n");
    assert_eq!(status, "HTTP/1.1 200 OK");
    let r: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(r["stat"]["entries"], 1);
    assert_eq!(r["stat"]["block_size"], 1024);

    server.shutdown().unwrap();
}

#[test]
fn http_edge_cases() {
    let server = start_memory();
    let addr = server.local_addr();

    let (status, body) = http(
        addr,
        "OPTIONS / HTTP/1.1\r\nHost: localhost\r\nOrigin: http://example.com\r\n\r\n",
    );
    assert_eq!(status, "HTTP/1.1 204 No Content");
    assert!(body.is_empty());

    let (status, _) = http(addr, "POST / HTTP/1.1\r\nHost: localhost\r\n\r\n");
    assert_eq!(status, "HTTP/1.1 400 Bad Request");

    let (status, _) = http(
        addr,
        "POST / HTTP/1.1\r\nContent-Length: many\r\n\r\n{}",
    );
    assert_eq!(status, "HTTP/1.1 400 Bad Request");

    let (status, _) = http(addr, "DELETE /x HTTP/1.1\r\nHost: localhost\r\n\r\n");
    assert_eq!(status, "HTTP/1.1 405 Method Not Allowed");

    server.shutdown().unwrap();
}

#[test]
fn http_expect_continue() {
    let server = start_memory();
    let body = json!({"operation": "ping", "request_id": "slow"}).to_string();

    let stream = TcpStream::connect(server.local_addr()).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    let mut writer = stream.try_clone().unwrap();
    let mut reader = BufReader::new(stream);

    write!(
        writer,
        "POST / HTTP/1.1\r\nHost: localhost\r\nContent-Length: {}\r\nExpect: 100-continue\r\n\r\n",
        body.len()
    )
    .unwrap();

    // The interim response arrives before we've sent a byte of body.
    let mut line = String::new();
    reader.read_line(&mut line).unwrap();
    assert_eq!(line.trim_end(), "HTTP/1.1 100 Continue");
    line.clear();
    reader.read_line(&mut line).unwrap();
    assert_eq!(line, "\r\n");

    writer.write_all(body.as_bytes()).unwrap();
    let mut response = String::new();
    reader.read_to_string(&mut response).unwrap();
    assert!(response.starts_with("HTTP/1.1 200 OK"), "{}", response);
    assert!(response.contains("\"request_id\":\"slow\""), "{}", response);

    server.shutdown().unwrap();
}

#[test]
fn http_chunked_body() {
    let server = start_memory();
    let body = json!({"operation": "ping", "request_id": "chunky"}).to_string();
    let (head, tail) = body.split_at(10);

    let (status, response) = http(
        server.local_addr(),
        &format!(
            "POST / HTTP/1.1\r\nHost: localhost\r\nTransfer-Encoding: chunked\r\n\r\n{:x}\r\n{}\r\n{:x}\r\n{}\r\n0\r\n\r\n",
            head.len(),
            head,
            tail.len(),
            tail
        ),
    );
    assert_eq!(status, "HTTP/1.1 200 OK");
    let r: Value = serde_json::from_str(&response).unwrap();
    assert_eq!(r["message"], "pong");
    assert_eq!(r["request_id"], "chunky");

    server.shutdown().unwrap();
}

#[test]
fn pipelined_requests_are_applied_in_order() {
    const CLIENTS: usize = 4;
    const WRITES: usize = 25;

    let server = start_memory();
    let addr = server.local_addr();
    let token = LineClient::connect(addr).bootstrap();

    let workers = (0..CLIENTS)
        .map(|c| {
            let token = token.clone();
            spawn(move || {
                let mut client = LineClient::connect(addr);
                // Send everything before reading anything back.
                for n in 0..WRITES {
                    client.send(json!({
                        "operation": "file_create",
                        "request_id": format!("{}-{}", c, n),
                        "token": token,
                        "path": format!("/c{}/{:03}", c, n),
                        "data": n.to_string(),
                    }));
                }
                for n in 0..WRITES {
                    let r = client.receive();
                    assert_eq!(r["status"], "success", "{}", r);
                    assert_eq!(r["request_id"], format!("{}-{}", c, n));
                }
            })
        })
        .collect::<Vec<_>>();

    for w in workers {
        w.join().unwrap();
    }

    let mut client = LineClient::connect(addr);
    for c in 0..CLIENTS {
        let r = client.call(json!({
            "operation": "dir_list", "token": token, "path": format!("/c{}", c)
        }));
        let names = r["entries"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["name"].as_str().unwrap().to_string())
            .collect::<Vec<_>>();
        let expected = (0..WRITES)
            .map(|n| format!("/c{}/{:03}", c, n))
            .collect::<Vec<_>>();
        assert_eq!(names, expected, "table order is arrival order");

        let r = client.call(json!({
            "operation": "file_read", "token": token, "path": format!("/c{}/{:03}", c, WRITES - 1)
        }));
        assert_eq!(r["data"], (WRITES - 1).to_string());
    }

    server.shutdown().unwrap();
}

#[test]
fn shutdown_unmounts() {
    init();
    fs::create_dir_all(TEST_ROOT).unwrap();
    let path: PathBuf = [TEST_ROOT, "shutdown_unmounts"].iter().collect();
    let _ = fs::remove_file(&path);

    OmniFileSystem::format(&path, &options()).unwrap();
    let omni = OmniFileSystem::mount(&path).unwrap();
    let server = OmniServer::new(omni, ServerConfig::new(&path, loopback()))
        .start()
        .unwrap();

    let mut client = LineClient::connect(server.local_addr());
    let token = client.bootstrap();
    let r = client.call(json!({
        "operation": "file_create", "token": token, "path": "/kept", "data": "still here"
    }));
    assert_eq!(r["status"], "success");

    server.shutdown().unwrap();

    let mut omni = OmniFileSystem::mount(&path).unwrap();
    let root = omni.login("root", "toor").unwrap();
    assert_eq!(root.user().role, UserRole::Admin);
    assert!(root.user().last_login > 0);
    assert_eq!(omni.file_read(Some(&root), "/kept").unwrap(), b"still here");
    omni.unmount().unwrap();
}

#[test]
fn stopper_ends_wait() {
    init();
    fs::create_dir_all(TEST_ROOT).unwrap();
    let path: PathBuf = [TEST_ROOT, "stopper_ends_wait"].iter().collect();
    let _ = fs::remove_file(&path);

    OmniFileSystem::format(&path, &options()).unwrap();
    let omni = OmniFileSystem::mount(&path).unwrap();
    let server = OmniServer::new(omni, ServerConfig::new(&path, loopback()))
        .start()
        .unwrap();
    let addr = server.local_addr();
    let stopper = server.stopper();
    let waiting = spawn(move || server.wait());

    let mut client = LineClient::connect(addr);
    let token = client.bootstrap();
    let r = client.call(json!({
        "operation": "file_create", "token": token, "path": "/kept", "data": "still here"
    }));
    assert_eq!(r["status"], "success");

    stopper.stop();
    stopper.stop();
    waiting.join().unwrap().unwrap();

    let mut omni = OmniFileSystem::mount(&path).unwrap();
    let root = omni.login("root", "toor").unwrap();
    assert_eq!(root.user().role, UserRole::Admin);
    assert!(root.user().last_login > 0);
    assert_eq!(omni.file_read(Some(&root), "/kept").unwrap(), b"still here");
    omni.unmount().unwrap();
}
