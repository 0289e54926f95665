//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use aorta::config::ProxyConfig;
use aorta::net::listener::Listener;
use aorta::protocol::{Command, Reply, RespConn};
use aorta::{ConnectionPool, ProxyServer, Shutdown};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

pub const PROXY_PASSWORD: &str = "proxy-secret";

/// An in-process RESP server standing in for a real upstream.
pub struct MockUpstream {
    pub addr: SocketAddr,
    accepts: Arc<AtomicUsize>,
    auths: Arc<AtomicUsize>,
    kill: broadcast::Sender<()>,
}

impl MockUpstream {
    /// Number of TCP connections accepted so far.
    pub fn accepts(&self) -> usize {
        self.accepts.load(Ordering::SeqCst)
    }

    /// Number of AUTH commands received so far.
    pub fn auths(&self) -> usize {
        self.auths.load(Ordering::SeqCst)
    }

    /// Drop every live connection from the server side.
    pub fn kill_connections(&self) {
        let _ = self.kill.send(());
    }
}

/// Start a mock upstream that accepts any of `passwords` (none = no AUTH required).
///
/// Supports AUTH, PING, SET and GET against an in-memory map; everything else
/// is answered with an unknown-command error.
pub async fn start_mock_upstream(passwords: &'static [&'static str]) -> MockUpstream {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepts = Arc::new(AtomicUsize::new(0));
    let auths = Arc::new(AtomicUsize::new(0));
    let (kill, _) = broadcast::channel::<()>(4);
    let store: Arc<Mutex<HashMap<Vec<u8>, Vec<u8>>>> = Arc::default();

    let (accepts_task, auths_task, kill_task) = (accepts.clone(), auths.clone(), kill.clone());
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            accepts_task.fetch_add(1, Ordering::SeqCst);
            let auths = auths_task.clone();
            let store = store.clone();
            let mut killed = kill_task.subscribe();

            tokio::spawn(async move {
                let mut conn = RespConn::new(socket, Duration::from_secs(30));
                let mut authed = passwords.is_empty();
                loop {
                    let cmd = tokio::select! {
                        cmd = conn.read_command() => match cmd {
                            Ok(cmd) => cmd,
                            Err(_) => break,
                        },
                        _ = killed.recv() => break,
                    };
                    let reply = respond(&cmd, passwords, &mut authed, &auths, &store);
                    if conn.write_raw(&reply).await.is_err() {
                        break;
                    }
                }
            });
        }
    });

    MockUpstream {
        addr,
        accepts,
        auths,
        kill,
    }
}

fn respond(
    cmd: &Command,
    passwords: &[&str],
    authed: &mut bool,
    auths: &AtomicUsize,
    store: &Mutex<HashMap<Vec<u8>, Vec<u8>>>,
) -> Vec<u8> {
    let name = cmd.name();
    if name == "AUTH" {
        auths.fetch_add(1, Ordering::SeqCst);
        let ok = cmd.arg_str(1).map_or(false, |pw| passwords.contains(&pw));
        *authed = ok;
        return if ok {
            b"+OK\r\n".to_vec()
        } else {
            b"-ERR invalid password\r\n".to_vec()
        };
    }
    if !*authed {
        return b"-NOAUTH Authentication required.\r\n".to_vec();
    }

    let args = cmd.args();
    match (name.as_str(), args.len()) {
        ("PING", 1) => b"+PONG\r\n".to_vec(),
        ("SET", 3) => {
            store
                .lock()
                .unwrap()
                .insert(args[1].to_vec(), args[2].to_vec());
            b"+OK\r\n".to_vec()
        }
        ("GET", 2) => match store.lock().unwrap().get(&args[1][..]) {
            Some(value) => {
                let mut out = format!("${}\r\n", value.len()).into_bytes();
                out.extend_from_slice(value);
                out.extend_from_slice(b"\r\n");
                out
            }
            None => b"$-1\r\n".to_vec(),
        },
        _ => format!("-ERR unknown command '{}'\r\n", name).into_bytes(),
    }
}

/// A proxy running on an ephemeral port.
pub struct RunningProxy {
    pub addr: SocketAddr,
    pub pool: Arc<ConnectionPool>,
    pub shutdown: Shutdown,
    pub task: JoinHandle<()>,
}

/// Config bound to an ephemeral loopback port with short timeouts.
pub fn test_config() -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.auth.password = PROXY_PASSWORD.into();
    config.timeouts.client_idle_secs = 5;
    config.timeouts.server_secs = 2;
    config.shutdown.drain_secs = 1;
    config
}

pub async fn start_proxy(config: ProxyConfig) -> RunningProxy {
    let pool = Arc::new(ConnectionPool::new(config.timeouts.server()));
    let listener = Listener::bind(&config.listener).await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let server = ProxyServer::new(config, pool.clone());
    let rx = shutdown.subscribe();
    let task = tokio::spawn(async move {
        server.run(listener, rx).await.unwrap();
    });

    RunningProxy {
        addr,
        pool,
        shutdown,
        task,
    }
}

/// A downstream client speaking RESP.
pub struct Client {
    conn: RespConn<TcpStream>,
}

impl Client {
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        Self {
            conn: RespConn::new(stream, Duration::from_secs(5)),
        }
    }

    /// Send a command without reading a reply.
    pub async fn send(&mut self, args: &[&str]) {
        self.conn.write_raw(Command::new(args).raw()).await.unwrap();
    }

    /// Send a command and return the full reply.
    pub async fn call(&mut self, args: &[&str]) -> Reply {
        self.conn.write_raw(Command::new(args).raw()).await.unwrap();
        self.conn.read_reply().await.unwrap()
    }

    /// Send a command and return the raw reply bytes.
    pub async fn call_raw(&mut self, args: &[&str]) -> Vec<u8> {
        self.call(args).await.raw.to_vec()
    }

    /// Authenticate and bind to `upstream` with `credential`.
    pub async fn bind(&mut self, upstream: SocketAddr, credential: &str) {
        assert_eq!(self.call_raw(&["AUTH", PROXY_PASSWORD]).await, b"+OK\r\n");
        let port = upstream.port().to_string();
        let host = upstream.ip().to_string();
        assert_eq!(
            self.call_raw(&["PROXY", host.as_str(), port.as_str(), credential]).await,
            b"+OK\r\n"
        );
    }

    /// True once the proxy has closed this connection.
    pub async fn is_closed(&mut self) -> bool {
        self.conn.read_frame().await.is_err()
    }
}
