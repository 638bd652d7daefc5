//! In-band control markers on the shell socket.
//!
//! The shell proxy mixes control tokens into the ordinary output stream.
//! Inbound chunks go through [`MarkerScanner`] before anything reaches the
//! terminal; outbound control messages are built with the encoders below.
//!
//! Markers are recognised anywhere in a chunk. A path value runs until the
//! first CR or LF, or to the end of the (carried-over) chunk. A single line
//! break after a marker belongs to the marker and is swallowed with it.

pub const PATH_MARKER: &str = "__PATH__:";
pub const CLEAR_MARKER: &str = "__CLEAR__";
pub const RESIZE_MARKER: &str = "__RESIZE__";
pub const TERMINAL_RESET: &str = "__TERMINAL_RESET__";
pub const RUN_FILE_MARKER: &str = "__RUN_FILE__";
pub const RUN_CODE_MARKER: &str = "__RUN__";

/// Shortest marker prefix worth holding back at the end of a chunk. A lone
/// `_` is far too common in real output to delay it.
const MIN_CARRY: usize = 2;

/// One piece of a scanned inbound chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Plain terminal output, markers removed.
    Output(String),
    /// The remote working directory changed.
    Path(String),
    /// The proxy asked for a screen clear.
    Clear,
}

#[derive(Clone, Copy)]
enum Marker {
    Path,
    Clear,
}

/// Splits inbound chunks into output and control frames.
///
/// A chunk that ends in the middle of a marker token (`...__PA`) keeps that
/// tail and prepends it to the next chunk. The carry can never exceed the
/// longest marker, so a stream of underscores cannot stall output.
#[derive(Debug, Default)]
pub struct MarkerScanner {
    carry: String,
}

impl MarkerScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &str) -> Vec<Frame> {
        let mut data = std::mem::take(&mut self.carry);
        data.push_str(chunk);

        let mut frames = Vec::new();
        let mut rest = data.as_str();

        while let Some((idx, marker)) = next_marker(rest) {
            push_output(&mut frames, &rest[..idx]);
            match marker {
                Marker::Path => {
                    let after = &rest[idx + PATH_MARKER.len()..];
                    let end = after.find(['\r', '\n']).unwrap_or(after.len());
                    let value = after[..end].trim();
                    if !value.is_empty() {
                        frames.push(Frame::Path(value.to_string()));
                    }
                    rest = skip_line_break(&after[end..]);
                }
                Marker::Clear => {
                    frames.push(Frame::Clear);
                    rest = skip_line_break(&rest[idx + CLEAR_MARKER.len()..]);
                }
            }
        }

        let keep = partial_marker_len(rest);
        let (out, tail) = rest.split_at(rest.len() - keep);
        push_output(&mut frames, out);
        self.carry = tail.to_string();
        frames
    }

    /// Release whatever is held back (end of stream).
    pub fn flush(&mut self) -> Option<Frame> {
        if self.carry.is_empty() {
            None
        } else {
            Some(Frame::Output(std::mem::take(&mut self.carry)))
        }
    }

    pub fn reset(&mut self) {
        self.carry.clear();
    }

    #[cfg(test)]
    fn carried(&self) -> &str {
        &self.carry
    }
}

fn next_marker(s: &str) -> Option<(usize, Marker)> {
    let path = s.find(PATH_MARKER).map(|i| (i, Marker::Path));
    let clear = s.find(CLEAR_MARKER).map(|i| (i, Marker::Clear));
    match (path, clear) {
        (Some(p), Some(c)) => Some(if p.0 <= c.0 { p } else { c }),
        (p, c) => p.or(c),
    }
}

fn push_output(frames: &mut Vec<Frame>, text: &str) {
    if text.is_empty() {
        return;
    }
    // merge with a preceding output frame so callers see one write per run
    if let Some(Frame::Output(prev)) = frames.last_mut() {
        prev.push_str(text);
    } else {
        frames.push(Frame::Output(text.to_string()));
    }
}

fn skip_line_break(s: &str) -> &str {
    s.strip_prefix("\r\n")
        .or_else(|| s.strip_prefix('\n'))
        .or_else(|| s.strip_prefix('\r'))
        .unwrap_or(s)
}

/// Length of the longest proper prefix of a marker that `s` ends with.
fn partial_marker_len(s: &str) -> usize {
    let bytes = s.as_bytes();
    let mut best = 0;
    for marker in [PATH_MARKER, CLEAR_MARKER] {
        let m = marker.as_bytes();
        for len in (MIN_CARRY..m.len()).rev() {
            if len <= bytes.len() && bytes.ends_with(&m[..len]) {
                best = best.max(len);
                break;
            }
        }
    }
    best
}

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

pub fn resize(cols: u16, rows: u16) -> String {
    format!("{RESIZE_MARKER}:{cols}:{rows}")
}

/// Ask the proxy to run a saved file with the interpreter for `language`.
pub fn run_file(language: &str, path: &str) -> String {
    format!("{RUN_FILE_MARKER}:{language}:{path}")
}

/// Ask the proxy to run an unsaved buffer. The code goes after the first
/// colon verbatim.
pub fn run_code(language: &str, code: &str) -> String {
    format!("{RUN_CODE_MARKER}{language}:{code}")
}

// ---------------------------------------------------------------------------
// Binary frames
// ---------------------------------------------------------------------------

/// Decodes binary frames as UTF-8, holding back a multi-byte character that
/// is split across two frames. Invalid bytes become U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8Carry {
    pending: Vec<u8>,
}

impl Utf8Carry {
    pub fn push(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::with_capacity(self.pending.len());
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(s) => {
                    out.push_str(s);
                    self.pending.clear();
                    return out;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(std::str::from_utf8(&self.pending[..valid]).unwrap_or_default());
                    match e.error_len() {
                        // incomplete sequence at the end: keep it for the next frame
                        None => {
                            self.pending.drain(..valid);
                            return out;
                        }
                        Some(bad) => {
                            out.push('\u{FFFD}');
                            self.pending.drain(..valid + bad);
                        }
                    }
                }
            }
        }
    }

    pub fn flush(&mut self) -> String {
        let rest = std::mem::take(&mut self.pending);
        String::from_utf8_lossy(&rest).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn out(s: &str) -> Frame {
        Frame::Output(s.to_string())
    }

    #[test]
    fn plain_output_passes_through() {
        let mut sc = MarkerScanner::new();
        assert_eq!(sc.push("hello world\r\n"), vec![out("hello world\r\n")]);
        assert_eq!(sc.push(""), vec![]);
    }

    #[test]
    fn path_marker_is_extracted_and_stripped() {
        let mut sc = MarkerScanner::new();
        let frames = sc.push("ls\r\n__PATH__:/home/u/proj\r\nPS> ");
        assert_eq!(
            frames,
            vec![out("ls\r\n"), Frame::Path("/home/u/proj".into()), out("PS> ")]
        );
    }

    #[test]
    fn path_runs_to_end_of_chunk() {
        let mut sc = MarkerScanner::new();
        assert_eq!(sc.push("__PATH__:C:\\Users\\me"), vec![Frame::Path("C:\\Users\\me".into())]);
    }

    #[test]
    fn empty_path_is_dropped() {
        let mut sc = MarkerScanner::new();
        assert_eq!(sc.push("__PATH__:\nok"), vec![out("ok")]);
    }

    #[test]
    fn clear_marker_anywhere() {
        let mut sc = MarkerScanner::new();
        assert_eq!(sc.push("before__CLEAR__after"), vec![out("before"), Frame::Clear, out("after")]);
    }

    #[test]
    fn several_markers_in_one_chunk() {
        let mut sc = MarkerScanner::new();
        let frames = sc.push("__CLEAR__\n__PATH__:/a\n__PATH__:/b\n$ ");
        assert_eq!(
            frames,
            vec![Frame::Clear, Frame::Path("/a".into()), Frame::Path("/b".into()), out("$ ")]
        );
    }

    #[test]
    fn marker_split_across_chunks_is_carried() {
        let mut sc = MarkerScanner::new();
        assert_eq!(sc.push("output __PA"), vec![out("output ")]);
        assert_eq!(sc.carried(), "__PA");
        assert_eq!(sc.push("TH__:/srv\n"), vec![Frame::Path("/srv".into())]);
        assert_eq!(sc.carried(), "");

        assert_eq!(sc.push("x__CLEA"), vec![out("x")]);
        assert_eq!(sc.push("R__y"), vec![Frame::Clear, out("y")]);
    }

    #[test]
    fn carried_text_that_is_not_a_marker_is_released() {
        let mut sc = MarkerScanner::new();
        assert_eq!(sc.push("a__"), vec![out("a")]);
        assert_eq!(sc.push("init__ done"), vec![out("__init__ done")]);
    }

    #[test]
    fn single_underscore_is_not_held() {
        let mut sc = MarkerScanner::new();
        assert_eq!(sc.push("snake_"), vec![out("snake_")]);
        assert_eq!(sc.carried(), "");
    }

    #[test]
    fn carry_is_bounded_by_marker_length() {
        let mut sc = MarkerScanner::new();
        let noise = "_".repeat(1000);
        let frames = sc.push(&noise);
        assert!(sc.carried().len() < PATH_MARKER.len());
        assert_eq!(frames, vec![out(&noise[..1000 - sc.carried().len()])]);
        assert_eq!(sc.flush(), Some(out(&"_".repeat(2))));
        assert_eq!(sc.flush(), None);
    }

    #[test]
    fn multibyte_output_around_markers() {
        let mut sc = MarkerScanner::new();
        let frames = sc.push("été__PATH__:/données\n🦀");
        assert_eq!(frames, vec![out("été"), Frame::Path("/données".into()), out("🦀")]);
    }

    #[test]
    fn outbound_encoders() {
        assert_eq!(resize(120, 30), "__RESIZE__:120:30");
        assert_eq!(run_file("python", "/w/a.py"), "__RUN_FILE__:python:/w/a.py");
        assert_eq!(run_code("python", "print(1)"), "__RUN__python:print(1)");
    }

    #[test]
    fn utf8_carry_joins_split_characters() {
        let mut buf = Utf8Carry::default();
        let crab = "🦀".as_bytes();
        assert_eq!(buf.push(b"ok "), "ok ");
        assert_eq!(buf.push(&crab[..1]), "");
        assert_eq!(buf.push(&crab[1..3]), "");
        assert_eq!(buf.push(&crab[3..]), "🦀");
        assert_eq!(buf.flush(), "");
    }

    #[test]
    fn utf8_carry_replaces_invalid_bytes() {
        let mut buf = Utf8Carry::default();
        assert_eq!(buf.push(&[b'a', 0xFF, b'b']), "a\u{FFFD}b");
        assert_eq!(buf.push(&[0xE2]), "");
        assert!(buf.flush().contains('\u{FFFD}'));
    }
}
