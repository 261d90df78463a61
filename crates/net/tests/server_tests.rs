//! End-to-end tests: a real server on a loopback port, driven by the
//! blocking client.

use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::JoinHandle;

use engine::{Engine, Options};
use net::{Client, NetError, Server, ServerConfig, ShutdownHandle};
use tempfile::TempDir;

struct TestServer {
    addr: SocketAddr,
    shutdown: ShutdownHandle,
    thread: Option<JoinHandle<()>>,
    _dir: TempDir,
}

impl TestServer {
    fn start() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(
            Engine::open_with(
                dir.path(),
                Options {
                    sync_writes: false,
                    ..Options::default()
                },
            )
            .unwrap(),
        );

        let server = Server::bind(
            "127.0.0.1:0",
            engine,
            ServerConfig {
                workers: 2,
                max_connections: 16,
            },
        )
        .unwrap();
        let addr = server.local_addr().unwrap();
        let shutdown = server.shutdown_handle();

        let thread = std::thread::spawn(move || {
            server.run().unwrap();
        });

        Self {
            addr,
            shutdown,
            thread: Some(thread),
            _dir: dir,
        }
    }

    fn client(&self) -> Client {
        Client::connect(self.addr).unwrap()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.shutdown();
        if let Some(thread) = self.thread.take() {
            thread.join().unwrap();
        }
    }
}

#[test]
fn put_read_delete_over_the_wire() {
    let server = TestServer::start();
    let mut client = server.client();

    client.put("user:1001", Some(b"{\"name\":\"John Doe\"}")).unwrap();
    assert_eq!(
        client.read("user:1001").unwrap(),
        Some(b"{\"name\":\"John Doe\"}".to_vec())
    );

    client.delete("user:1001").unwrap();
    assert_eq!(client.read("user:1001").unwrap(), None);
}

#[test]
fn missing_key_reads_as_none() {
    let server = TestServer::start();
    let mut client = server.client();

    assert_eq!(client.read("nope").unwrap(), None);
}

#[test]
fn put_with_none_value_deletes() {
    let server = TestServer::start();
    let mut client = server.client();

    client.put("k", Some(b"v")).unwrap();
    client.put("k", None).unwrap();
    assert_eq!(client.read("k").unwrap(), None);
}

#[test]
fn batch_put_and_range_scan() {
    let server = TestServer::start();
    let mut client = server.client();

    client
        .batch_put(&[
            ("user:1002".to_string(), Some(b"jane".to_vec())),
            ("user:1003".to_string(), Some(b"bob".to_vec())),
            ("user:1004".to_string(), Some(b"alice".to_vec())),
        ])
        .unwrap();

    let range = client.read_range("user:1002", "user:1004").unwrap();
    assert_eq!(range.len(), 3);
    assert_eq!(range.get("user:1003"), Some(&b"bob".to_vec()));

    // inclusive bounds: a narrower scan drops the edges outside it
    let narrower = client.read_range("user:1003", "user:1003").unwrap();
    assert_eq!(narrower.len(), 1);
}

#[test]
fn server_reports_engine_errors() {
    let server = TestServer::start();
    let mut client = server.client();

    let err = client.put("", Some(b"v")).unwrap_err();
    match err {
        NetError::Remote(msg) => assert!(msg.contains("invalid argument"), "got {msg:?}"),
        other => panic!("expected remote error, got {other:?}"),
    }

    let err = client.read_range("z", "a").unwrap_err();
    assert!(matches!(err, NetError::Remote(_)));
}

#[test]
fn ping_round_trips() {
    let server = TestServer::start();
    let mut client = server.client();
    client.ping().unwrap();
}

#[test]
fn empty_values_survive_the_wire() {
    let server = TestServer::start();
    let mut client = server.client();

    client.put("empty", Some(b"")).unwrap();
    assert_eq!(client.read("empty").unwrap(), Some(Vec::new()));

    let range = client.read_range("a", "z").unwrap();
    assert_eq!(range.get("empty"), Some(&Vec::new()));
}

#[test]
fn concurrent_clients_share_one_engine() {
    let server = TestServer::start();

    let mut handles = Vec::new();
    for c in 0..4 {
        let mut client = server.client();
        handles.push(std::thread::spawn(move || {
            for i in 0..25 {
                let key = format!("c{c}-{i:02}");
                client.put(&key, Some(key.as_bytes())).unwrap();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    let mut client = server.client();
    for c in 0..4 {
        for i in 0..25 {
            let key = format!("c{c}-{i:02}");
            assert_eq!(client.read(&key).unwrap(), Some(key.clone().into_bytes()));
        }
    }
}
