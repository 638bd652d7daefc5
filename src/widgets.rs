//! Editor and terminal widgets as opaque handles.
//!
//! The shell core never renders anything itself. It owns widget handles,
//! forwards text to and from them, and disposes them on every removal path.
//! A `dispose()` must be idempotent; owners call it exactly once in practice
//! but the headless widgets tolerate repeats.

use serde_json::Value;
use std::io::Write;

/// A mounted code editor bound to one document.
pub trait EditorWidget: Send {
    /// Current text of the editor buffer.
    fn content(&self) -> String;
    fn set_content(&mut self, content: &str);
    /// Selected text, if any.
    fn selection(&self) -> Option<String> {
        None
    }
    /// Replace the selection with `text`, or insert at the cursor when
    /// nothing is selected.
    fn replace_selection(&mut self, _text: &str) {}
    fn select_all(&mut self) {}
    fn focus(&mut self) {}
    /// Apply a new editor option blob (font, tab size, wrap, ...).
    fn update_options(&mut self, _options: &Value) {}
    fn dispose(&mut self);
}

/// A mounted terminal emulator.
pub trait TerminalWidget: Send {
    fn write(&mut self, text: &str);
    fn clear(&mut self);
    /// `(cols, rows)` of the visible grid.
    fn size(&self) -> (u16, u16);
    fn selection(&self) -> Option<String> {
        None
    }
    /// Column of the cursor on its current line; used as a hint for the
    /// shell proxy after a clear.
    fn cursor_column(&self) -> u16 {
        0
    }
    fn dispose(&mut self);
}

/// Creates widgets on demand. The workspace calls this when a tab is
/// activated for the first time and when the terminal is (re)started.
pub trait WidgetFactory: Send {
    fn create_editor(
        &mut self,
        path: &str,
        language: &str,
        content: &str,
        options: &Value,
    ) -> Box<dyn EditorWidget>;

    fn create_terminal(&mut self, options: &Value) -> Box<dyn TerminalWidget>;
}

// ---------------------------------------------------------------------------
// Headless widgets used by the command-line host
// ---------------------------------------------------------------------------

/// In-memory editor: a text buffer and nothing else.
#[derive(Debug, Default)]
pub struct BufferEditor {
    text: String,
    all_selected: bool,
    disposed: bool,
}

impl EditorWidget for BufferEditor {
    fn content(&self) -> String {
        self.text.clone()
    }

    fn set_content(&mut self, content: &str) {
        self.text = content.to_string();
        self.all_selected = false;
    }

    fn selection(&self) -> Option<String> {
        (self.all_selected && !self.text.is_empty()).then(|| self.text.clone())
    }

    // no cursor model: without a selection the text is appended
    fn replace_selection(&mut self, text: &str) {
        if self.all_selected {
            self.text.clear();
            self.all_selected = false;
        }
        self.text.push_str(text);
    }

    fn select_all(&mut self) {
        self.all_selected = true;
    }

    fn dispose(&mut self) {
        self.disposed = true;
        self.text.clear();
    }
}

/// Terminal that writes straight to the process stdout.
#[derive(Debug)]
pub struct StdoutTerminal {
    cols: u16,
    rows: u16,
    column: u16,
    disposed: bool,
}

impl StdoutTerminal {
    pub fn new(cols: u16, rows: u16) -> Self {
        Self { cols, rows, column: 0, disposed: false }
    }
}

impl TerminalWidget for StdoutTerminal {
    fn write(&mut self, text: &str) {
        if self.disposed {
            return;
        }
        let mut out = std::io::stdout().lock();
        if let Err(e) = out.write_all(text.as_bytes()).and_then(|_| out.flush()) {
            tracing::warn!("terminal write failed: {e}");
        }
        match text.rfind(['\n', '\r']) {
            Some(pos) => self.column = text[pos + 1..].chars().count() as u16,
            None => self.column = self.column.saturating_add(text.chars().count() as u16),
        }
    }

    fn clear(&mut self) {
        // ED2 + cursor home
        self.write("\x1b[2J\x1b[H");
        self.column = 0;
    }

    fn size(&self) -> (u16, u16) {
        (self.cols, self.rows)
    }

    fn cursor_column(&self) -> u16 {
        self.column
    }

    fn dispose(&mut self) {
        self.disposed = true;
    }
}

#[derive(Debug, Default)]
pub struct HeadlessWidgets;

impl WidgetFactory for HeadlessWidgets {
    fn create_editor(
        &mut self,
        _path: &str,
        _language: &str,
        content: &str,
        _options: &Value,
    ) -> Box<dyn EditorWidget> {
        Box::new(BufferEditor { text: content.to_string(), ..BufferEditor::default() })
    }

    fn create_terminal(&mut self, _options: &Value) -> Box<dyn TerminalWidget> {
        Box::new(StdoutTerminal::new(120, 30))
    }
}

// ---------------------------------------------------------------------------
// Recording fakes for tests
// ---------------------------------------------------------------------------
