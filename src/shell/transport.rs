//! WebSocket transport for the shell session.
//!
//! A single tokio task owns the socket. It does exactly what it is told
//! (connect after a delay, send, close) and reports what happened; retry
//! policy lives in [`super::ShellSession`]. Commands and events travel over
//! unbounded mpsc channels so the UI side never blocks on the socket.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use super::markers::Utf8Carry;
use super::{ShellTransport, MAX_RETRIES, RECONNECT_DELAY};

pub const DEFAULT_SHELL_URL: &str = "ws://localhost:8000";

/// Quiet period after inbound data before an [`TransportEventKind::Idle`]
/// is reported.
pub const IDLE_FLUSH: Duration = Duration::from_millis(80);

#[derive(Debug, Clone)]
pub struct ShellConfig {
    pub url: String,
    pub retry_delay: Duration,
    pub max_retries: u32,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_SHELL_URL.to_string(),
            retry_delay: RECONNECT_DELAY,
            max_retries: MAX_RETRIES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEventKind {
    Opened,
    /// Text frame, or a binary frame decoded as UTF-8.
    Message(String),
    /// Connection ended or could not be established. `error` is `None` for
    /// an orderly close.
    Closed { error: Option<String> },
    /// No inbound data for [`IDLE_FLUSH`] since the last message.
    Idle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportEvent {
    pub generation: u64,
    pub kind: TransportEventKind,
}

/// Snapshot of the transport task, readable from any thread.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TransportStatus {
    pub connected: bool,
    pub generation: u64,
    pub last_error: Option<String>,
    pub messages_in: u64,
    pub messages_out: u64,
}

#[derive(Debug)]
enum Command {
    Connect { generation: u64, delay: Duration },
    Send(String),
    Close,
    Shutdown,
}

/// UI-side handle to the transport task. The task stops once every clone
/// is dropped or [`ShellHandle::shutdown`] is called.
#[derive(Clone)]
pub struct ShellHandle {
    commands: mpsc::UnboundedSender<Command>,
    status: Arc<Mutex<TransportStatus>>,
}

impl ShellHandle {
    /// Spawn the transport task on the current tokio runtime.
    pub fn spawn(url: impl Into<String>) -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (ev_tx, ev_rx) = mpsc::unbounded_channel();
        let status = Arc::new(Mutex::new(TransportStatus::default()));
        tokio::spawn(drive(url.into(), cmd_rx, ev_tx, status.clone()));
        (Self { commands: cmd_tx, status }, ev_rx)
    }

    pub fn status(&self) -> TransportStatus {
        self.status.lock().clone()
    }

    pub fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown);
    }

    fn command(&self, cmd: Command) {
        if self.commands.send(cmd).is_err() {
            tracing::debug!("shell transport task has exited");
        }
    }
}

impl ShellTransport for ShellHandle {
    fn connect(&mut self, generation: u64, delay: Duration) {
        self.command(Command::Connect { generation, delay });
    }

    fn send(&mut self, text: String) {
        self.command(Command::Send(text));
    }

    fn close(&mut self) {
        self.command(Command::Close);
    }
}

async fn drive(
    url: String,
    mut commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedSender<TransportEvent>,
    status: Arc<Mutex<TransportStatus>>,
) {
    let emit = |generation: u64, kind: TransportEventKind| {
        let _ = events.send(TransportEvent { generation, kind });
    };
    let mut next: Option<Command> = None;

    'idle: loop {
        let cmd = match next.take() {
            Some(cmd) => cmd,
            None => match commands.recv().await {
                Some(cmd) => cmd,
                None => return,
            },
        };
        let (generation, delay) = match cmd {
            Command::Connect { generation, delay } => (generation, delay),
            Command::Send(_) => {
                tracing::debug!("shell send dropped: not connected");
                continue;
            }
            Command::Close => continue,
            Command::Shutdown => return,
        };

        // Wait out the reconnect delay. Close or a newer Connect cancels it.
        if !delay.is_zero() {
            let sleep = tokio::time::sleep(delay);
            tokio::pin!(sleep);
            loop {
                tokio::select! {
                    _ = &mut sleep => break,
                    cmd = commands.recv() => match cmd {
                        None | Some(Command::Shutdown) => return,
                        Some(Command::Send(_)) => {}
                        Some(other) => {
                            next = Some(other);
                            continue 'idle;
                        }
                    },
                }
            }
        }

        status.lock().generation = generation;
        let ws = match connect_async(url.as_str()).await {
            Ok((ws, _)) => ws,
            Err(e) => {
                let msg = e.to_string();
                tracing::warn!("shell connect to {url} failed: {msg}");
                {
                    let mut s = status.lock();
                    s.connected = false;
                    s.last_error = Some(msg.clone());
                }
                emit(generation, TransportEventKind::Closed { error: Some(msg) });
                continue;
            }
        };

        {
            let mut s = status.lock();
            s.connected = true;
            s.last_error = None;
        }
        emit(generation, TransportEventKind::Opened);

        let (mut sink, mut stream) = ws.split();
        let mut utf8 = Utf8Carry::default();
        let idle = tokio::time::sleep(IDLE_FLUSH);
        tokio::pin!(idle);
        let mut quiet = true;

        let error: Option<String> = loop {
            tokio::select! {
                msg = stream.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        status.lock().messages_in += 1;
                        emit(generation, TransportEventKind::Message(text.as_str().to_owned()));
                        idle.as_mut().reset(tokio::time::Instant::now() + IDLE_FLUSH);
                        quiet = false;
                    }
                    Some(Ok(Message::Binary(data))) => {
                        status.lock().messages_in += 1;
                        let text = utf8.push(&data);
                        if !text.is_empty() {
                            emit(generation, TransportEventKind::Message(text));
                            idle.as_mut().reset(tokio::time::Instant::now() + IDLE_FLUSH);
                            quiet = false;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break None,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => break Some(e.to_string()),
                },
                _ = &mut idle, if !quiet => {
                    quiet = true;
                    emit(generation, TransportEventKind::Idle);
                }
                cmd = commands.recv() => match cmd {
                    Some(Command::Send(text)) => {
                        if let Err(e) = sink.send(Message::Text(text.into())).await {
                            break Some(e.to_string());
                        }
                        status.lock().messages_out += 1;
                    }
                    Some(Command::Close) => {
                        let _ = sink.close().await;
                        break None;
                    }
                    Some(cmd @ Command::Connect { .. }) => {
                        let _ = sink.close().await;
                        next = Some(cmd);
                        break None;
                    }
                    None | Some(Command::Shutdown) => {
                        let _ = sink.close().await;
                        status.lock().connected = false;
                        return;
                    }
                },
            }
        };

        let rest = utf8.flush();
        if !rest.is_empty() {
            emit(generation, TransportEventKind::Message(rest));
        }
        {
            let mut s = status.lock();
            s.connected = false;
            if error.is_some() {
                s.last_error = error.clone();
            }
        }
        emit(generation, TransportEventKind::Closed { error });
    }
}
