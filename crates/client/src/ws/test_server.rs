//! Loopback WebSocket server for connection tests.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_tungstenite::{accept_async, tungstenite::Message};

#[derive(Default)]
pub(crate) struct ServerStats {
    accepted: AtomicUsize,
    open: AtomicUsize,
    /// Keepalive pings received, indexed by connection.
    pings: Mutex<Vec<usize>>,
}

impl ServerStats {
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    pub fn open(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    pub fn pings(&self) -> Vec<usize> {
        self.pings.lock().unwrap().clone()
    }
}

pub(crate) struct TestServer {
    pub url: String,
    pub stats: Arc<ServerStats>,
}

impl TestServer {
    /// Start a server that sends `frames` to every client it accepts. The
    /// first `close_first` connections are closed right after the frames
    /// go out; later ones stay open until the client leaves.
    pub async fn start(frames: Vec<String>, close_first: usize) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let stats = Arc::new(ServerStats::default());

        let server_stats = stats.clone();
        tokio::spawn(async move {
            while let Ok((tcp, _)) = listener.accept().await {
                let index = server_stats.accepted.fetch_add(1, Ordering::SeqCst);
                server_stats.pings.lock().unwrap().push(0);
                let stats = server_stats.clone();
                let frames = frames.clone();

                tokio::spawn(async move {
                    let Ok(mut ws) = accept_async(tcp).await else {
                        return;
                    };
                    stats.open.fetch_add(1, Ordering::SeqCst);

                    for frame in frames {
                        if ws.send(Message::text(frame)).await.is_err() {
                            break;
                        }
                    }

                    if index < close_first {
                        let _ = ws.close(None).await;
                    } else {
                        while let Some(Ok(msg)) = ws.next().await {
                            match msg {
                                Message::Text(text) if text.as_str().contains("ping") => {
                                    stats.pings.lock().unwrap()[index] += 1;
                                }
                                Message::Close(_) => break,
                                _ => {}
                            }
                        }
                    }
                    stats.open.fetch_sub(1, Ordering::SeqCst);
                });
            }
        });

        Self { url, stats }
    }

    /// A ws:// URL nothing is listening on.
    pub async fn unused_url() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        drop(listener);
        url
    }
}

/// Poll `condition` every 10ms until it holds or `timeout` passes.
pub(crate) async fn wait_until(mut condition: impl FnMut() -> bool, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Await `future` with a timeout, panicking if it does not finish.
pub(crate) async fn within<T>(timeout: Duration, future: impl Future<Output = T>) -> T {
    tokio::time::timeout(timeout, future)
        .await
        .expect("future did not finish in time")
}
