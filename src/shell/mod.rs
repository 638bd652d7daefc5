//! Terminal ↔ shell-proxy session.
//!
//! [`ShellSession`] is the connection lifecycle as a plain state machine: it
//! owns the terminal widget, decides when to (re)connect, and turns transport
//! events into terminal writes and [`ShellEvent`]s for the rest of the UI.
//! The socket itself lives in [`transport`], behind the [`ShellTransport`]
//! seam.

pub mod markers;
pub mod transport;

use std::time::Duration;

use serde::Serialize;

use crate::widgets::TerminalWidget;
use markers::{Frame, MarkerScanner};
pub use transport::{ShellConfig, ShellHandle, TransportEvent, TransportEventKind};

/// Consecutive failed connection attempts before the session gives up.
pub const MAX_RETRIES: u32 = 5;
pub const RECONNECT_DELAY: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Uninitialized,
    Connecting,
    Open,
    Closed,
    /// Retry budget spent. Only `restart()` leaves this state.
    GaveUp,
}

/// What the rest of the UI hears from the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellEvent {
    Output(String),
    Clear,
    Path(String),
    State(ConnectionState),
    /// Status-bar text. `persistent` marks the give-up message.
    Status { text: String, persistent: bool },
}

/// Outbound side of a shell connection.
///
/// `generation` tags a connection attempt; every event the transport reports
/// carries the generation it belongs to, so a late close from a replaced
/// connection can be told apart from the current one.
pub trait ShellTransport: Send {
    fn connect(&mut self, generation: u64, delay: Duration);
    fn send(&mut self, text: String);
    fn close(&mut self);
}

pub struct ShellSession {
    state: ConnectionState,
    retry_count: u32,
    max_retries: u32,
    retry_delay: Duration,
    killed: bool,
    generation: u64,
    remote_working_directory: Option<String>,
    pending_cursor_column: Option<u16>,
    scanner: MarkerScanner,
    terminal: Option<Box<dyn TerminalWidget>>,
    transport: Box<dyn ShellTransport>,
}

impl ShellSession {
    pub fn new(transport: Box<dyn ShellTransport>, config: &ShellConfig) -> Self {
        Self {
            state: ConnectionState::Uninitialized,
            retry_count: 0,
            max_retries: config.max_retries,
            retry_delay: config.retry_delay,
            killed: false,
            generation: 0,
            remote_working_directory: None,
            pending_cursor_column: None,
            scanner: MarkerScanner::new(),
            terminal: None,
            transport,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn is_killed(&self) -> bool {
        self.killed
    }

    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }

    pub fn remote_working_directory(&self) -> Option<&str> {
        self.remote_working_directory.as_deref()
    }

    pub fn pending_cursor_column(&self) -> Option<u16> {
        self.pending_cursor_column
    }

    pub fn terminal(&self) -> Option<&dyn TerminalWidget> {
        self.terminal.as_deref()
    }

    pub fn has_terminal(&self) -> bool {
        self.terminal.is_some()
    }

    /// Status-bar text for the working directory.
    pub fn path_status(&self) -> String {
        match &self.remote_working_directory {
            Some(dir) => format!("📁 {dir}"),
            None => "📁 Not connected".to_string(),
        }
    }

    /// Bind the terminal widget. A previously bound widget is disposed first.
    pub fn bind_terminal(&mut self, widget: Box<dyn TerminalWidget>) {
        self.dispose_terminal();
        self.terminal = Some(widget);
    }

    fn dispose_terminal(&mut self) {
        if let Some(mut old) = self.terminal.take() {
            old.dispose();
        }
    }

    /// Begin connecting. Ignored while a connection is open or pending, and
    /// after `kill()`.
    pub fn start(&mut self) -> Vec<ShellEvent> {
        match self.state {
            ConnectionState::Uninitialized | ConnectionState::Closed if !self.killed => {
                self.attempt(Duration::ZERO)
            }
            other => {
                tracing::debug!(state = ?other, killed = self.killed, "shell start ignored");
                Vec::new()
            }
        }
    }

    fn attempt(&mut self, delay: Duration) -> Vec<ShellEvent> {
        if self.retry_count >= self.max_retries {
            tracing::warn!(retries = self.retry_count, "shell reconnect budget exhausted");
            self.state = ConnectionState::GaveUp;
            if let Some(term) = self.terminal.as_mut() {
                term.write("\r\n\x1b[1;31m✗ Max connection retries reached\x1b[0m\r\n");
            }
            return vec![
                ShellEvent::State(ConnectionState::GaveUp),
                ShellEvent::Status {
                    text: "Max connection retries reached. Make sure the shell server is running".to_string(),
                    persistent: true,
                },
            ];
        }
        self.retry_count += 1;
        self.generation += 1;
        self.state = ConnectionState::Connecting;
        tracing::info!(attempt = self.retry_count, generation = self.generation, "connecting shell");
        self.transport.connect(self.generation, delay);
        vec![ShellEvent::State(ConnectionState::Connecting)]
    }

    /// Feed one event from the transport.
    pub fn handle(&mut self, event: TransportEvent) -> Vec<ShellEvent> {
        if event.generation != self.generation || self.killed {
            tracing::debug!(
                event_generation = event.generation,
                current = self.generation,
                killed = self.killed,
                "stale shell event dropped"
            );
            return Vec::new();
        }
        match event.kind {
            TransportEventKind::Opened => self.on_open(),
            TransportEventKind::Message(text) => self.on_message(&text),
            TransportEventKind::Closed { error } => self.on_closed(error.as_deref()),
            TransportEventKind::Idle => self.on_idle(),
        }
    }

    /// The stream went quiet. A held-back marker prefix that never grew into
    /// a marker is plain output after all.
    fn on_idle(&mut self) -> Vec<ShellEvent> {
        if self.state != ConnectionState::Open {
            return Vec::new();
        }
        match self.scanner.flush() {
            Some(Frame::Output(text)) => {
                if let Some(term) = self.terminal.as_mut() {
                    term.write(&text);
                }
                vec![ShellEvent::Output(text)]
            }
            _ => Vec::new(),
        }
    }

    fn on_open(&mut self) -> Vec<ShellEvent> {
        if self.state != ConnectionState::Connecting {
            return Vec::new();
        }
        tracing::info!("shell connected");
        self.state = ConnectionState::Open;
        self.retry_count = 0;
        self.scanner.reset();
        if let Some(term) = self.terminal.as_mut() {
            term.clear();
            let (cols, rows) = term.size();
            self.transport.send(markers::resize(cols, rows));
        }
        vec![
            ShellEvent::State(ConnectionState::Open),
            ShellEvent::Status { text: self.path_status(), persistent: false },
        ]
    }

    fn on_message(&mut self, chunk: &str) -> Vec<ShellEvent> {
        let mut events = Vec::new();
        for frame in self.scanner.push(chunk) {
            match frame {
                Frame::Output(text) => {
                    if let Some(term) = self.terminal.as_mut() {
                        term.write(&text);
                    }
                    events.push(ShellEvent::Output(text));
                }
                Frame::Clear => {
                    if let Some(term) = self.terminal.as_mut() {
                        term.clear();
                    }
                    events.push(ShellEvent::Clear);
                }
                Frame::Path(dir) => {
                    self.remote_working_directory = Some(dir.clone());
                    events.push(ShellEvent::Path(dir));
                    events.push(ShellEvent::Status { text: self.path_status(), persistent: false });
                }
            }
        }
        events
    }

    fn on_closed(&mut self, error: Option<&str>) -> Vec<ShellEvent> {
        if !matches!(self.state, ConnectionState::Open | ConnectionState::Connecting) {
            return Vec::new();
        }
        match error {
            Some(e) => tracing::warn!(
                kind = crate::error::classify_transport_error(e).as_str(),
                "shell connection closed: {e}"
            ),
            None => tracing::info!("shell connection closed"),
        }
        if let Some(Frame::Output(rest)) = self.scanner.flush()
            && let Some(term) = self.terminal.as_mut()
        {
            term.write(&rest);
        }
        self.state = ConnectionState::Closed;
        let mut events = vec![ShellEvent::State(ConnectionState::Closed)];
        events.extend(self.attempt(self.retry_delay));
        events
    }

    /// Keystrokes from the terminal widget. Sent verbatim while open, never
    /// echoed locally. Returns `false` when nothing was sent.
    pub fn input(&mut self, data: &str) -> bool {
        if !self.is_open() {
            tracing::debug!("terminal not ready for input");
            return false;
        }
        if let Some(term) = self.terminal.as_ref() {
            self.pending_cursor_column = Some(term.cursor_column());
        }
        self.transport.send(data.to_string());
        true
    }

    /// Tell the proxy about a new terminal grid size.
    pub fn resize(&mut self, cols: u16, rows: u16) -> bool {
        if !self.is_open() {
            return false;
        }
        self.transport.send(markers::resize(cols, rows));
        true
    }

    /// Send a control message (run file, run code) while open.
    pub fn send_control(&mut self, message: String) -> bool {
        if !self.is_open() {
            tracing::debug!("control message dropped: shell not open");
            return false;
        }
        self.transport.send(message);
        true
    }

    /// Tear everything down and suppress reconnects.
    pub fn kill(&mut self) {
        tracing::info!("shell session killed");
        self.killed = true;
        self.transport.close();
        self.dispose_terminal();
        self.scanner.reset();
        self.state = ConnectionState::Closed;
    }

    /// Clear the screen: ask the proxy to reset its process, then kill the
    /// session. The terminal is rebuilt with `restart()`.
    pub fn clear_and_kill(&mut self) {
        if self.is_open() {
            self.transport.send(markers::TERMINAL_RESET.to_string());
        }
        if let Some(term) = self.terminal.as_mut() {
            term.clear();
        }
        self.pending_cursor_column = Some(0);
        self.kill();
    }

    /// Replace the terminal widget and return to `Uninitialized`. The old
    /// widget is disposed before the new one is bound. Call `start()` to
    /// connect again.
    pub fn restart(&mut self, widget: Box<dyn TerminalWidget>) {
        self.transport.close();
        self.dispose_terminal();
        self.terminal = Some(widget);
        self.state = ConnectionState::Uninitialized;
        self.retry_count = 0;
        self.killed = false;
        // bump so events from the torn-down connection are ignored
        self.generation += 1;
        self.remote_working_directory = None;
        self.pending_cursor_column = None;
        self.scanner.reset();
    }
}

impl Drop for ShellSession {
    fn drop(&mut self) {
        self.dispose_terminal();
    }
}
