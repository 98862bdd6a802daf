// Connection handling module
// Accepts a single TCP connection and serves it on its own task

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::config::AppState;
use crate::handler;
use crate::logger;

/// Accept and process a connection, enforcing the connection limit.
///
/// `stop` flips to `true` when the server starts shutting down.
pub fn accept_connection(
    stream: tokio::net::TcpStream,
    peer_addr: SocketAddr,
    state: &Arc<AppState>,
    conn_counter: &Arc<AtomicUsize>,
    stop: watch::Receiver<bool>,
) {
    // Increment counter first, then check limit (prevents race condition)
    let prev_count = conn_counter.fetch_add(1, Ordering::SeqCst);

    if let Some(max_conn) = state.config.performance.max_connections {
        if prev_count >= usize::try_from(max_conn).unwrap_or(usize::MAX) {
            conn_counter.fetch_sub(1, Ordering::SeqCst);
            logger::log_warning(&format!(
                "Max connections reached: {prev_count}/{max_conn}. Connection from {peer_addr} rejected."
            ));
            drop(stream);
            return;
        }
    }

    logger::log_connection_accepted(&peer_addr);
    handle_connection(
        stream,
        peer_addr,
        Arc::clone(state),
        Arc::clone(conn_counter),
        stop,
    );
}

/// Deadlines applied to one connection
#[derive(Clone, Copy)]
struct Windows {
    /// Until the first request arrives
    first_request: Duration,
    /// While a handler is producing a response
    response: Duration,
    /// After a response, until the next request arrives
    idle: Duration,
}

impl Windows {
    fn from_state(state: &AppState) -> Self {
        let perf = &state.config.performance;
        let response = Duration::from_secs(perf.write_timeout);
        Self {
            first_request: Duration::from_secs(perf.read_timeout),
            response,
            idle: if perf.keep_alive_timeout > 0 {
                Duration::from_secs(perf.keep_alive_timeout)
            } else {
                response
            },
        }
    }
}

/// Serve one connection in a spawned task.
///
/// HTTP/1.1 with keep-alive when `keep_alive_timeout > 0`. The connection is
/// dropped once its current deadline passes (see [`Windows`]); each request
/// moves the deadline. On shutdown the connection finishes its in-flight
/// request and closes. The connection counter is decremented when the task ends.
fn handle_connection(
    stream: tokio::net::TcpStream,
    peer_addr: SocketAddr,
    state: Arc<AppState>,
    conn_counter: Arc<AtomicUsize>,
    mut stop: watch::Receiver<bool>,
) {
    tokio::spawn(async move {
        let io = TokioIo::new(stream);
        let windows = Windows::from_state(&state);
        let (deadline_tx, mut deadline_rx) = watch::channel(Instant::now() + windows.first_request);
        let deadline_tx = Arc::new(deadline_tx);

        let mut builder = http1::Builder::new();
        builder.keep_alive(state.config.performance.keep_alive_timeout > 0);

        let service_state = Arc::clone(&state);
        let conn = builder.serve_connection(
            io,
            service_fn(move |req| {
                let state = Arc::clone(&service_state);
                let deadline_tx = Arc::clone(&deadline_tx);
                async move {
                    deadline_tx.send_replace(Instant::now() + windows.response);
                    let response = handler::handle_request(req, state, Some(peer_addr)).await;
                    deadline_tx.send_replace(Instant::now() + windows.idle);
                    response
                }
            }),
        );
        tokio::pin!(conn);

        let mut draining = false;
        loop {
            let deadline = *deadline_rx.borrow_and_update();
            tokio::select! {
                result = conn.as_mut() => {
                    if let Err(err) = result {
                        logger::log_connection_error(&err);
                    }
                    break;
                }
                Ok(()) = deadline_rx.changed() => {}
                Ok(()) = stop.changed(), if !draining => {
                    draining = true;
                    conn.as_mut().graceful_shutdown();
                }
                () = tokio::time::sleep_until(deadline) => {
                    logger::log_debug(&format!("Connection from {peer_addr} timed out"));
                    break;
                }
            }
        }

        conn_counter.fetch_sub(1, Ordering::SeqCst);
    });
}
