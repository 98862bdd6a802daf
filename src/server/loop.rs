// Server loop module
// Accepts connections until shutdown is requested

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{watch, Notify};

use super::connection::accept_connection;
use crate::config::AppState;
use crate::logger;

/// Accept connections until `shutdown` is notified, then drain.
///
/// Open connections finish their in-flight request and close. Those still
/// open after `write_timeout` seconds are dropped with the runtime.
pub async fn run(listener: TcpListener, state: Arc<AppState>, shutdown: Arc<Notify>) {
    let active_connections = Arc::new(AtomicUsize::new(0));
    let (stop_tx, _) = watch::channel(false);

    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, peer_addr)) => {
                        accept_connection(
                            stream,
                            peer_addr,
                            &state,
                            &active_connections,
                            stop_tx.subscribe(),
                        );
                    }
                    Err(e) => {
                        logger::log_error(&format!("Failed to accept connection: {e}"));
                    }
                }
            }

            () = shutdown.notified() => break,
        }
    }

    drop(listener);
    logger::log_info(&format!(
        "Listener closed, draining {} connection(s)",
        active_connections.load(Ordering::SeqCst)
    ));

    stop_tx.send_replace(true);
    let grace = Duration::from_secs(state.config.performance.write_timeout);
    if tokio::time::timeout(grace, stop_tx.closed()).await.is_err() {
        logger::log_warning(&format!(
            "Dropping {} connection(s) still open after {}s",
            active_connections.load(Ordering::SeqCst),
            grace.as_secs()
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::server::create_listener;
    use http_body_util::{BodyExt, Empty};
    use hyper::body::Bytes;
    use hyper::client::conn::http1::{self, SendRequest};
    use hyper::{Request, StatusCode};
    use hyper_util::rt::TokioIo;
    use std::net::SocketAddr;
    use tempfile::TempDir;
    use tokio::net::TcpStream;
    use tokio::task::JoinHandle;
    use tokio::time::{sleep, timeout, Duration};

    struct TestServer {
        _dir: TempDir,
        addr: SocketAddr,
        shutdown: Arc<Notify>,
        handle: JoinHandle<()>,
    }

    fn start(max_connections: Option<u64>) -> TestServer {
        start_with(|config| config.performance.max_connections = max_connections)
    }

    fn start_with(tune: impl FnOnce(&mut Config)) -> TestServer {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("index.html"), "<h1>snake</h1>").unwrap();
        std::fs::write(dir.path().join("main.js"), "let score = 0;").unwrap();

        let mut config = Config::from_toml_str("").unwrap();
        config.logging.access_log = false;
        tune(&mut config);
        let state = Arc::new(AppState::new(config, dir.path().to_path_buf()));

        let listener = create_listener("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = Arc::new(Notify::new());
        let handle = tokio::spawn(run(listener, state, Arc::clone(&shutdown)));

        TestServer {
            _dir: dir,
            addr,
            shutdown,
            handle,
        }
    }

    async fn connect(addr: SocketAddr) -> hyper::Result<SendRequest<Empty<Bytes>>> {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (sender, conn) = http1::handshake(TokioIo::new(stream)).await?;
        tokio::spawn(conn);
        Ok(sender)
    }

    async fn get(
        sender: &mut SendRequest<Empty<Bytes>>,
        path: &str,
    ) -> hyper::Result<(StatusCode, Bytes)> {
        let req = Request::builder()
            .uri(path)
            .header(hyper::header::HOST, "localhost")
            .body(Empty::<Bytes>::new())
            .unwrap();
        let resp = sender.send_request(req).await?;
        let status = resp.status();
        let body = resp.into_body().collect().await?.to_bytes();
        Ok((status, body))
    }

    #[tokio::test]
    async fn test_serves_over_tcp() {
        let server = start(None);
        let mut sender = connect(server.addr).await.unwrap();

        let (status, body) = get(&mut sender, "/health").await.unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, Bytes::from_static(b"{\"status\":\"ok\"}"));

        // Same keep-alive connection
        let (status, body) = get(&mut sender, "/").await.unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, Bytes::from_static(b"<h1>snake</h1>"));

        let (status, body) = get(&mut sender, "/static/main.js").await.unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, Bytes::from_static(b"let score = 0;"));

        let (status, _) = get(&mut sender, "/static/../../etc/passwd").await.unwrap();
        assert_eq!(status, StatusCode::FORBIDDEN);

        server.shutdown.notify_one();
        server.handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_rejects_over_connection_limit() {
        let server = start(Some(0));

        let rejected = match connect(server.addr).await {
            Ok(mut sender) => get(&mut sender, "/health").await.is_err(),
            Err(_) => true,
        };
        assert!(rejected);

        server.shutdown.notify_one();
        server.handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_stops_accepting() {
        let server = start(None);
        server.shutdown.notify_one();
        server.handle.await.unwrap();

        assert!(TcpStream::connect(server.addr).await.is_err());
    }

    #[tokio::test]
    async fn test_keep_alive_outlives_read_timeout() {
        let server = start_with(|config| {
            config.performance.read_timeout = 1;
            config.performance.write_timeout = 1;
            config.performance.keep_alive_timeout = 75;
        });
        let mut sender = connect(server.addr).await.unwrap();

        let (status, _) = get(&mut sender, "/health").await.unwrap();
        assert_eq!(status, StatusCode::OK);

        sleep(Duration::from_millis(1500)).await;
        let (status, _) = get(&mut sender, "/health").await.unwrap();
        assert_eq!(status, StatusCode::OK);

        server.shutdown.notify_one();
        server.handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_idle_connection_closed_after_keep_alive() {
        let server = start_with(|config| {
            config.performance.read_timeout = 30;
            config.performance.keep_alive_timeout = 1;
        });
        let mut sender = connect(server.addr).await.unwrap();

        let (status, _) = get(&mut sender, "/health").await.unwrap();
        assert_eq!(status, StatusCode::OK);

        sleep(Duration::from_millis(1500)).await;
        assert!(get(&mut sender, "/health").await.is_err());

        server.shutdown.notify_one();
        server.handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_closes_idle_connections() {
        let server = start(None);
        let mut sender = connect(server.addr).await.unwrap();
        let (status, _) = get(&mut sender, "/").await.unwrap();
        assert_eq!(status, StatusCode::OK);

        server.shutdown.notify_one();
        // Drain finishes well before the 30s write_timeout grace
        timeout(Duration::from_secs(5), server.handle)
            .await
            .expect("drain did not finish")
            .unwrap();
        assert!(get(&mut sender, "/health").await.is_err());
    }
}
