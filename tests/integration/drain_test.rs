// tests/integration/drain_test.rs

use super::test_helpers::*;
use gracewell::ServerError;
use std::time::Duration;
use tokio::io::{AsyncReadExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

#[tokio::test]
async fn test_drain_lets_connections_finish() {
    let server = local_server(echo_handler(), Duration::from_secs(5));
    let drained = server.stop_signal();
    let (handle, addr) = spawn_server(&server).await;

    let mut a = BufReader::new(TcpStream::connect(addr).await.unwrap());
    let mut b = BufReader::new(TcpStream::connect(addr).await.unwrap());
    assert_eq!(roundtrip(&mut a, "a").await, "a");
    assert_eq!(roundtrip(&mut b, "b").await, "b");

    server.shutdown();
    assert_eq!(read_line(&mut a).await, "BYE");
    assert_eq!(read_line(&mut b).await, "BYE");

    let report = tokio::time::timeout(STARTUP_TIMEOUT, drained.wait())
        .await
        .unwrap()
        .expect("server dropped before draining");
    assert_eq!(report.drained, 2);
    assert_eq!(report.force_closed, 0);
    join_server(handle).await.unwrap();
}

#[tokio::test]
async fn test_grace_timeout_aborts_stuck_connections() {
    let server = local_server(stubborn_handler(), Duration::from_secs(30));
    let drained = server.stop_signal();
    let (handle, addr) = spawn_server(&server).await;

    let mut client = TcpStream::connect(addr).await.unwrap();
    // Give the loop a moment to hand the socket to the handler.
    tokio::time::sleep(Duration::from_millis(50)).await;

    server.stop(Duration::from_millis(100));
    join_server(handle).await.unwrap();
    assert!(server.is_stopped());

    let report = drained.wait().await.unwrap();
    assert_eq!(report.force_closed, 1);
    assert_eq!(report.drained, 0);
    assert!(report.elapsed >= Duration::from_millis(100));

    // The aborted handler dropped its socket, so the client sees EOF.
    let mut buf = [0u8; 16];
    let n = tokio::time::timeout(STARTUP_TIMEOUT, client.read(&mut buf))
        .await
        .unwrap()
        .unwrap_or(0);
    assert_eq!(n, 0);
}

#[tokio::test]
async fn test_stop_returns_before_drain_completes() {
    let server = local_server(stubborn_handler(), Duration::from_secs(30));
    let (handle, addr) = spawn_server(&server).await;

    let _client = TcpStream::connect(addr).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    server.stop(Duration::from_millis(300));
    // The flag flips at once, while the start call is still draining.
    assert!(server.is_stopped());
    assert!(!handle.is_finished());

    join_server(handle).await.unwrap();
}

#[tokio::test]
async fn test_stop_signal_waits_for_next_cycle() {
    let server = local_server(echo_handler(), Duration::from_secs(1));

    // Obtained before the server ever started.
    let drained = server.stop_signal();
    let waiter = tokio::spawn(drained.wait());
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!waiter.is_finished());

    let (handle, _addr) = spawn_server(&server).await;
    server.stop(Duration::ZERO);
    join_server(handle).await.unwrap();

    let report = tokio::time::timeout(STARTUP_TIMEOUT, waiter)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(report.drained, 0);
    assert_eq!(report.force_closed, 0);
}

#[tokio::test]
async fn test_idle_handlers_leave_on_shutdown_notice() {
    let server = local_server(idle_handler(), Duration::from_secs(5));
    let drained = server.stop_signal();
    let (handle, addr) = spawn_server(&server).await;

    let mut clients = Vec::new();
    for _ in 0..3 {
        clients.push(TcpStream::connect(addr).await.unwrap());
    }
    tokio::time::sleep(Duration::from_millis(50)).await;

    server.shutdown();
    join_server(handle).await.unwrap();

    let report = drained.wait().await.unwrap();
    assert_eq!(report.drained, 3);
    assert_eq!(report.force_closed, 0);
    assert!(report.elapsed < Duration::from_secs(5));

    for mut client in clients {
        let mut buf = [0u8; 1];
        let n = tokio::time::timeout(STARTUP_TIMEOUT, client.read(&mut buf))
            .await
            .unwrap()
            .unwrap_or(0);
        assert_eq!(n, 0);
    }
}

#[tokio::test]
async fn test_restart_during_drain_is_rejected() {
    let server = local_server(stubborn_handler(), Duration::from_secs(30));
    let (handle, addr) = spawn_server(&server).await;

    let _client = TcpStream::connect(addr).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    server.stop(Duration::from_millis(300));
    assert!(server.is_stopped());
    assert!(server.is_draining());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let err = server.serve(listener).await.unwrap_err();
    assert!(matches!(err, ServerError::Draining), "unexpected error: {err}");
    assert!(server.is_stopped());

    // Taken while draining, so it belongs to the cycle that is winding down.
    let draining = server.stop_signal();
    join_server(handle).await.unwrap();
    assert!(!server.is_draining());
    let report = draining.wait().await.unwrap();
    assert_eq!(report.force_closed, 1);

    // Once drained, the server starts again and a fresh signal waits for the new cycle.
    let (handle, _addr) = spawn_server(&server).await;
    let waiter = tokio::spawn(server.stop_signal().wait());
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(server.is_serving());
    assert!(!waiter.is_finished());

    server.stop(Duration::ZERO);
    join_server(handle).await.unwrap();
    let report = tokio::time::timeout(STARTUP_TIMEOUT, waiter)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(report.force_closed, 0);
    assert_eq!(report.drained, 0);
}
