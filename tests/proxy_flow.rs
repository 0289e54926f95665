//! End-to-end tests: real TCP clients through a running proxy to a mock upstream.

use std::time::Duration;

mod common;

use common::{start_mock_upstream, start_proxy, test_config, Client, PROXY_PASSWORD};

#[tokio::test]
async fn forwards_commands_and_returns_raw_replies() {
    let upstream = start_mock_upstream(&["upstream-pw"]).await;
    let proxy = start_proxy(test_config()).await;

    let mut client = Client::connect(proxy.addr).await;
    client.bind(upstream.addr, "upstream-pw").await;

    assert_eq!(client.call_raw(&["SET", "greeting", "hello"]).await, b"+OK\r\n");
    assert_eq!(client.call_raw(&["GET", "greeting"]).await, b"$5\r\nhello\r\n");
    assert_eq!(client.call_raw(&["get", "missing"]).await, b"$-1\r\n");

    // Upstream error objects are relayed untouched and the session stays up.
    assert_eq!(
        client.call_raw(&["FLUSHEVERYTHING"]).await,
        b"-ERR unknown command 'FLUSHEVERYTHING'\r\n"
    );
    assert_eq!(client.call_raw(&["PING"]).await, b"+PONG\r\n");

    assert_eq!(upstream.accepts(), 1);
    assert_eq!(upstream.auths(), 1);
}

#[tokio::test]
async fn unauthenticated_command_closes_session() {
    let proxy = start_proxy(test_config()).await;

    let mut client = Client::connect(proxy.addr).await;
    assert_eq!(
        client.call_raw(&["PING"]).await,
        b"-NOAUTH Authentication required.\r\n"
    );
    assert!(client.is_closed().await);
}

#[tokio::test]
async fn destination_required_after_auth() {
    let proxy = start_proxy(test_config()).await;

    let mut client = Client::connect(proxy.addr).await;
    assert_eq!(client.call_raw(&["AUTH", PROXY_PASSWORD]).await, b"+OK\r\n");
    assert_eq!(
        client.call_raw(&["GET", "foo"]).await,
        b"-aorta: proxy destination not set\r\n"
    );
    assert_eq!(
        client.call_raw(&["PROXY", "127.0.0.1", "6379"]).await,
        b"-ERR wrong number of arguments for 'proxy' command\r\n"
    );
    assert_eq!(
        client.call_raw(&["GET", "foo"]).await,
        b"-aorta: proxy destination not set\r\n"
    );
}

#[tokio::test]
async fn sessions_with_same_identity_share_one_socket() {
    let upstream = start_mock_upstream(&["pw", "other"]).await;
    let proxy = start_proxy(test_config()).await;

    let mut handles = Vec::new();
    for i in 0..8 {
        let proxy_addr = proxy.addr;
        let upstream_addr = upstream.addr;
        handles.push(tokio::spawn(async move {
            let mut client = Client::connect(proxy_addr).await;
            client.bind(upstream_addr, "pw").await;
            let key = format!("key-{}", i);
            let value = format!("value-{}", i);
            for _ in 0..10 {
                assert_eq!(client.call_raw(&["SET", key.as_str(), value.as_str()]).await, b"+OK\r\n");
                let expected = format!("${}\r\n{}\r\n", value.len(), value).into_bytes();
                assert_eq!(client.call_raw(&["GET", key.as_str()]).await, expected);
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(upstream.accepts(), 1);
    assert_eq!(upstream.auths(), 1);
    assert_eq!(proxy.pool.len(), 1);

    // A different credential for the same address gets its own socket.
    let mut client = Client::connect(proxy.addr).await;
    client.bind(upstream.addr, "other").await;
    assert_eq!(client.call_raw(&["PING"]).await, b"+PONG\r\n");
    assert_eq!(upstream.accepts(), 2);
    assert_eq!(proxy.pool.len(), 2);
}

#[tokio::test]
async fn upstream_socket_heals_after_server_drop() {
    let upstream = start_mock_upstream(&["pw"]).await;
    let proxy = start_proxy(test_config()).await;

    let mut client = Client::connect(proxy.addr).await;
    client.bind(upstream.addr, "pw").await;
    assert_eq!(client.call_raw(&["PING"]).await, b"+PONG\r\n");

    upstream.kill_connections();
    tokio::time::sleep(Duration::from_millis(50)).await;

    // The dead socket can cost one command, reported as a proxy error.
    let reply = client.call(&["PING"]).await;
    if let Some(message) = reply.frame.error_message() {
        assert!(message.starts_with("aorta: "), "{}", message);
        assert_eq!(client.call_raw(&["PING"]).await, b"+PONG\r\n");
    } else {
        assert_eq!(&reply.raw[..], b"+PONG\r\n");
    }

    assert_eq!(upstream.accepts(), 2);
    assert_eq!(upstream.auths(), 2);
}

#[tokio::test]
async fn rejected_upstream_credential_is_relayed() {
    let upstream = start_mock_upstream(&["pw"]).await;
    let proxy = start_proxy(test_config()).await;

    let mut client = Client::connect(proxy.addr).await;
    client.bind(upstream.addr, "wrong").await;

    let reply = client.call(&["PING"]).await;
    let message = reply.frame.error_message().unwrap().to_string();
    assert!(message.starts_with("aorta: upstream"), "{}", message);
    assert!(message.contains("ERR invalid password"), "{}", message);

    // Session stays open and bound.
    let reply = client.call(&["PING"]).await;
    assert!(reply.is_error());
}

#[tokio::test]
async fn cached_stub_reports_errors() {
    let upstream = start_mock_upstream(&[]).await;
    let proxy = start_proxy(test_config()).await;

    let mut client = Client::connect(proxy.addr).await;
    client.bind(upstream.addr, "").await;

    assert_eq!(
        client.call_raw(&["CACHED", "abc", "GET", "foo"]).await,
        b"-ERR syntax error\r\n"
    );
    assert_eq!(
        client.call_raw(&["CACHED", "5", "GET", "foo"]).await,
        b"-aorta: CACHED is not implemented\r\n"
    );
    assert_eq!(client.call_raw(&["PING"]).await, b"+PONG\r\n");
}

#[tokio::test]
async fn shutdown_closes_pooled_sockets() {
    let upstream = start_mock_upstream(&[]).await;
    let proxy = start_proxy(test_config()).await;

    {
        let mut client = Client::connect(proxy.addr).await;
        client.bind(upstream.addr, "").await;
        assert_eq!(client.call_raw(&["PING"]).await, b"+PONG\r\n");
        client.send(&["QUIT"]).await;
        assert!(client.is_closed().await);
    }
    tokio::time::sleep(Duration::from_millis(50)).await;

    let conn = proxy.pool.get(&upstream.addr.to_string(), "");
    assert!(conn.is_connected().await);

    proxy.shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(5), proxy.task)
        .await
        .expect("proxy did not stop")
        .unwrap();

    assert!(!conn.is_connected().await);
    assert!(tokio::net::TcpStream::connect(proxy.addr).await.is_err());
}

#[tokio::test]
async fn shutdown_does_not_wait_for_idle_clients() {
    let upstream = start_mock_upstream(&[]).await;
    let mut config = test_config();
    config.timeouts.client_idle_secs = 60;
    config.shutdown.drain_secs = 30;
    let proxy = start_proxy(config).await;

    let mut client = Client::connect(proxy.addr).await;
    client.bind(upstream.addr, "").await;
    assert_eq!(client.call_raw(&["PING"]).await, b"+PONG\r\n");

    proxy.shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(3), proxy.task)
        .await
        .expect("shutdown waited for an idle client")
        .unwrap();
    assert!(client.is_closed().await);
}

#[tokio::test]
async fn idle_upstream_sockets_are_evicted() {
    let upstream = start_mock_upstream(&[]).await;
    let mut config = test_config();
    config.upstream.idle_timeout_secs = 1;
    config.upstream.sweep_interval_secs = 1;
    let proxy = start_proxy(config).await;

    let mut client = Client::connect(proxy.addr).await;
    client.bind(upstream.addr, "").await;
    assert_eq!(client.call_raw(&["PING"]).await, b"+PONG\r\n");

    let conn = proxy.pool.get(&upstream.addr.to_string(), "");
    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert!(!conn.is_connected().await);

    // The binding survives eviction and redials transparently.
    assert_eq!(client.call_raw(&["PING"]).await, b"+PONG\r\n");
    assert_eq!(upstream.accepts(), 2);
}
