//! Manager for the single realtime connection.
//!
//! At most one connection task and one reconnect timer exist at a time.
//! Every call to [`ConnectionManager::connect`] starts a new generation;
//! tasks from an older generation close their socket and never touch the
//! lifecycle again, so a superseded connection cannot schedule a reconnect.
//!
//! The manager is single-threaded: it spawns with
//! [`tokio::task::spawn_local`] and must be driven from inside a
//! [`tokio::task::LocalSet`].

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use claw_shared::ClientCommand;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use super::connection::{ConnectionState, ReconnectConfig};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Why a live connection stopped.
enum Exit {
    /// `connect` or `disconnect` asked for it.
    Requested,
    /// The server closed it or the transport failed.
    Lost,
}

#[derive(Default)]
struct Lifecycle {
    state: ConnectionState,
    attempts: u32,
    generation: u64,
    /// Generation of a connection that was asked to close and has not
    /// finished closing yet.
    pending_close: Option<u64>,
    connection_task: Option<JoinHandle<()>>,
    close_tx: Option<oneshot::Sender<()>>,
    reconnect_timer: Option<JoinHandle<()>>,
}

impl Lifecycle {
    fn cancel_reconnect(&mut self) {
        if let Some(timer) = self.reconnect_timer.take() {
            timer.abort();
        }
    }

    /// Ask the current connection task to close. Returns false if there was
    /// no task.
    fn request_close(&mut self) -> bool {
        // Detach rather than abort so the task can send a close frame.
        self.connection_task.take();
        match self.close_tx.take() {
            Some(close_tx) => {
                let _ = close_tx.send(());
                true
            }
            None => false,
        }
    }
}

struct Shared {
    url: String,
    ping_interval: Duration,
    reconnect: ReconnectConfig,
    on_frame: Box<dyn Fn(&str)>,
    lifecycle: RefCell<Lifecycle>,
}

/// Owns the realtime connection and hands every text frame to `on_frame`.
#[derive(Clone)]
pub struct ConnectionManager {
    shared: Rc<Shared>,
}

impl ConnectionManager {
    pub fn new(
        url: impl Into<String>,
        ping_interval: Duration,
        reconnect: ReconnectConfig,
        on_frame: impl Fn(&str) + 'static,
    ) -> Self {
        Self {
            shared: Rc::new(Shared {
                url: url.into(),
                ping_interval,
                reconnect,
                on_frame: Box::new(on_frame),
                lifecycle: RefCell::new(Lifecycle::default()),
            }),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.lifecycle.borrow().state
    }

    /// Consecutive failed attempts since the last successful open.
    pub fn reconnect_attempts(&self) -> u32 {
        self.shared.lifecycle.borrow().attempts
    }

    pub fn has_pending_reconnect(&self) -> bool {
        self.shared.lifecycle.borrow().reconnect_timer.is_some()
    }

    /// Open a fresh connection, closing the current one and cancelling any
    /// scheduled reconnect first.
    pub fn connect(&self) {
        let (generation, close_rx) = {
            let mut lifecycle = self.shared.lifecycle.borrow_mut();
            lifecycle.cancel_reconnect();
            if lifecycle.request_close() {
                lifecycle.state = ConnectionState::Closing;
                crate::log_info!("Closing current connection to {} before reconnecting", self.shared.url);
            }

            let (close_tx, close_rx) = oneshot::channel();
            lifecycle.generation += 1;
            lifecycle.pending_close = None;
            lifecycle.close_tx = Some(close_tx);
            lifecycle.state = ConnectionState::Connecting;
            (lifecycle.generation, close_rx)
        };

        let this = self.clone();
        let task = tokio::task::spawn_local(async move { this.run(generation, close_rx).await });
        self.shared.lifecycle.borrow_mut().connection_task = Some(task);
    }

    /// Close the connection and stop reconnecting.
    pub fn disconnect(&self) {
        let mut lifecycle = self.shared.lifecycle.borrow_mut();
        lifecycle.cancel_reconnect();
        let closing = lifecycle.request_close();
        let generation = lifecycle.generation;
        lifecycle.generation += 1;
        if closing {
            lifecycle.pending_close = Some(generation);
            lifecycle.state = ConnectionState::Closing;
        } else {
            lifecycle.state = ConnectionState::Disconnected;
        }
    }

    async fn run(self, generation: u64, mut close_rx: oneshot::Receiver<()>) {
        let opened = tokio::select! {
            result = connect_async(self.shared.url.as_str()) => result,
            _ = &mut close_rx => {
                self.settle_closed(generation);
                return;
            }
        };

        match opened {
            Ok((socket, _response)) => {
                if !self.on_open(generation) {
                    return;
                }
                match self.pump(socket, &mut close_rx).await {
                    Exit::Requested => {
                        self.settle_closed(generation);
                        return;
                    }
                    Exit::Lost => crate::log_info!("Connection to {} closed", self.shared.url),
                }
            }
            Err(e) => crate::log_error!("Connection error for {}: {}", self.shared.url, e),
        }

        self.on_close(generation);
    }

    fn on_open(&self, generation: u64) -> bool {
        let mut lifecycle = self.shared.lifecycle.borrow_mut();
        if lifecycle.generation != generation {
            return false;
        }
        lifecycle.attempts = 0;
        lifecycle.cancel_reconnect();
        lifecycle.state = ConnectionState::Open;
        crate::log_info!("Connected to {}", self.shared.url);
        true
    }

    /// Read frames and send keepalives until the socket ends or a close is
    /// requested.
    async fn pump(&self, socket: Socket, close_rx: &mut oneshot::Receiver<()>) -> Exit {
        let (mut write, mut read) = socket.split();
        let period = self.shared.ping_interval;
        let mut keepalive = tokio::time::interval_at(Instant::now() + period, period);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = &mut *close_rx => {
                    if let Err(e) = write.send(Message::Close(None)).await {
                        crate::log_debug!("Close frame to {} not sent: {}", self.shared.url, e);
                    }
                    return Exit::Requested;
                }
                msg = read.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        crate::log_debug!("Received: {}", text.as_str());
                        (self.shared.on_frame)(text.as_str());
                    }
                    Some(Ok(Message::Close(frame))) => {
                        crate::log_info!("Server closed connection: {:?}", frame);
                        return Exit::Lost;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        crate::log_error!("Read error on {}: {}", self.shared.url, e);
                        return Exit::Lost;
                    }
                    None => return Exit::Lost,
                },
                _ = keepalive.tick() => {
                    let ping = match serde_json::to_string(&ClientCommand::Ping) {
                        Ok(ping) => ping,
                        Err(e) => {
                            crate::log_error!("Serialize failed: {}", e);
                            continue;
                        }
                    };
                    if let Err(e) = write.send(Message::text(ping)).await {
                        crate::log_error!("Keepalive to {} failed: {}", self.shared.url, e);
                        return Exit::Lost;
                    }
                }
            }
        }
    }

    /// Finish a close requested by `disconnect`. Connections superseded by
    /// `connect` leave the lifecycle alone.
    fn settle_closed(&self, generation: u64) {
        let mut lifecycle = self.shared.lifecycle.borrow_mut();
        if lifecycle.pending_close == Some(generation) {
            lifecycle.pending_close = None;
            lifecycle.state = ConnectionState::Disconnected;
            crate::log_info!("Disconnected from {}", self.shared.url);
        }
    }

    /// Schedule the next attempt after an unrequested close or failed open.
    fn on_close(&self, generation: u64) {
        let mut lifecycle = self.shared.lifecycle.borrow_mut();
        if lifecycle.generation != generation {
            drop(lifecycle);
            self.settle_closed(generation);
            return;
        }
        lifecycle.connection_task = None;
        lifecycle.close_tx = None;
        lifecycle.state = ConnectionState::Disconnected;

        let delay = self.shared.reconnect.delay_for_attempt(lifecycle.attempts);
        lifecycle.attempts = lifecycle.attempts.saturating_add(1);
        crate::log_info!(
            "Reconnecting to {} in {}ms (attempt {})",
            self.shared.url,
            delay.as_millis(),
            lifecycle.attempts
        );

        let this = self.clone();
        lifecycle.cancel_reconnect();
        lifecycle.reconnect_timer = Some(tokio::task::spawn_local(async move {
            tokio::time::sleep(delay).await;
            this.shared.lifecycle.borrow_mut().reconnect_timer = None;
            this.connect();
        }));
    }
}
