//! Command-line arguments and the line protocol of the headless host.
//!
//! Without a GUI the workspace is driven from stdin. Lines starting with
//! `:` are host commands; anything else is typed into the terminal.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use parking_lot::Mutex;

use crate::bridge::DEFAULT_BRIDGE_URL;
use crate::clipboard::FocusContext;
use crate::commands::KeyChord;
use crate::shell::transport::DEFAULT_SHELL_URL;
use crate::workspace::Prompt;

#[derive(Parser, Debug)]
#[command(name = "nebula-ide", version, about = "NebulaIDE shell core (headless host)")]
pub struct Cli {
    /// WebSocket endpoint of the shell proxy.
    #[arg(long, env = "NEBULA_SHELL_URL", default_value = DEFAULT_SHELL_URL)]
    pub shell_url: String,

    /// HTTP endpoint of the filesystem bridge.
    #[arg(long, env = "NEBULA_BRIDGE_URL", default_value = DEFAULT_BRIDGE_URL)]
    pub bridge_url: String,

    /// Folder to open. Defaults to the most recent project.
    #[arg(short, long)]
    pub workspace: Option<String>,

    /// Directory holding settings.json, keybindings.json and recent.json.
    #[arg(long, env = "NEBULA_CONFIG_DIR")]
    pub config_dir: Option<PathBuf>,

    /// Answer yes to every confirmation that has no queued answer.
    #[arg(long)]
    pub yes: bool,
}

/// One line of host input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCommand {
    Open(String),
    Save,
    SaveAs(String),
    Close,
    /// Activate the n-th tab (1-based).
    Tab(usize),
    Folder(String),
    NewFile(String),
    NewFolder(String),
    Delete(Vec<String>),
    Rename { path: String, name: String },
    Copy(Vec<String>),
    Cut(Vec<String>),
    Paste(Option<String>),
    /// Designate the folder a paste goes to when no folder was clicked.
    PasteHere(String),
    Click(String),
    Focus(FocusContext),
    Key(KeyChord),
    Search(String),
    /// Move the search highlight.
    Next,
    Prev,
    Pick,
    Run,
    Clear,
    Toggle,
    Update,
    /// Message for the assistant chat.
    Chat(String),
    /// Change one setting. The value is parsed as JSON, falling back to a
    /// plain string.
    Set { key: String, value: serde_json::Value },
    Tree,
    Tabs,
    Status,
    Answer(Answer),
    Quit,
    /// Raw text for the terminal. A carriage return is appended.
    Input(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Answer {
    Yes,
    No,
    Text(String),
}

impl HostCommand {
    pub fn parse(line: &str) -> Result<Self, String> {
        let line = line.trim_end_matches(['\r', '\n']);
        let Some(rest) = line.strip_prefix(':') else {
            return Ok(HostCommand::Input(line.to_string()));
        };
        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (rest, ""),
        };
        let required = |what: &str| -> Result<String, String> {
            if arg.is_empty() {
                Err(format!(":{name} needs {what}"))
            } else {
                Ok(arg.to_string())
            }
        };
        let paths = || -> Result<Vec<String>, String> {
            let list: Vec<String> = arg.split_whitespace().map(str::to_string).collect();
            if list.is_empty() {
                Err(format!(":{name} needs at least one path"))
            } else {
                Ok(list)
            }
        };

        let cmd = match name {
            "open" | "o" => HostCommand::Open(required("a path")?),
            "save" | "w" => HostCommand::Save,
            "saveas" => HostCommand::SaveAs(required("a path")?),
            "close" => HostCommand::Close,
            "tab" => {
                let n = arg
                    .parse::<usize>()
                    .ok()
                    .filter(|n| *n > 0)
                    .ok_or_else(|| format!("Invalid tab number: {arg:?}"))?;
                HostCommand::Tab(n)
            }
            "folder" => HostCommand::Folder(required("a path")?),
            "new" => HostCommand::NewFile(required("a name")?),
            "mkdir" => HostCommand::NewFolder(required("a name")?),
            "delete" | "rm" => HostCommand::Delete(paths()?),
            "rename" | "mv" => {
                let (path, name) = arg
                    .split_once(char::is_whitespace)
                    .map(|(p, n)| (p.to_string(), n.trim().to_string()))
                    .filter(|(_, n)| !n.is_empty())
                    .ok_or_else(|| ":rename needs a path and a new name".to_string())?;
                HostCommand::Rename { path, name }
            }
            "copy" => HostCommand::Copy(paths()?),
            "cut" => HostCommand::Cut(paths()?),
            "paste" => HostCommand::Paste((!arg.is_empty()).then(|| arg.to_string())),
            "paste-here" => HostCommand::PasteHere(required("a folder")?),
            "click" => HostCommand::Click(required("a path")?),
            "focus" => HostCommand::Focus(parse_focus(arg)?),
            "key" => {
                let chord = KeyChord::parse(arg).ok_or_else(|| format!("Invalid key chord: {arg:?}"))?;
                HostCommand::Key(chord)
            }
            "search" | "find" => HostCommand::Search(arg.to_string()),
            "next" => HostCommand::Next,
            "prev" => HostCommand::Prev,
            "pick" => HostCommand::Pick,
            "run" => HostCommand::Run,
            "clear" => HostCommand::Clear,
            "toggle" => HostCommand::Toggle,
            "update" => HostCommand::Update,
            "chat" | "ask" => HostCommand::Chat(required("a message")?),
            "set" => {
                let (key, raw) = arg
                    .split_once(char::is_whitespace)
                    .map(|(k, v)| (k.to_string(), v.trim()))
                    .filter(|(_, v)| !v.is_empty())
                    .ok_or_else(|| ":set needs a key and a value".to_string())?;
                let value = serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()));
                HostCommand::Set { key, value }
            }
            "tree" => HostCommand::Tree,
            "tabs" => HostCommand::Tabs,
            "status" => HostCommand::Status,
            "yes" | "y" => HostCommand::Answer(Answer::Yes),
            "no" | "n" => HostCommand::Answer(Answer::No),
            "answer" => HostCommand::Answer(Answer::Text(required("text")?)),
            "quit" | "q" => HostCommand::Quit,
            other => return Err(format!("Unknown command :{other}")),
        };
        Ok(cmd)
    }
}

fn parse_focus(arg: &str) -> Result<FocusContext, String> {
    match arg.to_ascii_lowercase().as_str() {
        "editor" => Ok(FocusContext::Editor),
        "terminal" => Ok(FocusContext::Terminal),
        "chat" => Ok(FocusContext::Chat),
        "explorer" | "tree" => Ok(FocusContext::Explorer),
        _ => Err(format!("Unknown focus region: {arg:?}")),
    }
}

/// Prompt fed from answers queued ahead of the command that asks.
///
/// The queue is shared with the host loop, which pushes `:yes`, `:no` and
/// `:answer` lines into it.
#[derive(Clone, Default)]
pub struct HeadlessPrompt {
    answers: Arc<Mutex<VecDeque<Answer>>>,
    assume_yes: bool,
}

impl HeadlessPrompt {
    pub fn new(assume_yes: bool) -> Self {
        Self { answers: Arc::default(), assume_yes }
    }

    pub fn queue(&self, answer: Answer) {
        self.answers.lock().push_back(answer);
    }

    pub fn pending(&self) -> usize {
        self.answers.lock().len()
    }
}

impl Prompt for HeadlessPrompt {
    fn confirm(&mut self, message: &str) -> bool {
        let answer = self.answers.lock().pop_front();
        let yes = match answer {
            Some(Answer::Yes) => true,
            Some(Answer::No) => false,
            Some(Answer::Text(text)) => matches!(text.to_ascii_lowercase().as_str(), "y" | "yes"),
            None => self.assume_yes,
        };
        eprintln!("? {message} {}", if yes { "[yes]" } else { "[no]" });
        yes
    }

    fn input(&mut self, message: &str, default: &str) -> Option<String> {
        let answer = self.answers.lock().pop_front();
        match answer {
            Some(Answer::Text(text)) => Some(text),
            Some(Answer::Yes) if !default.is_empty() => Some(default.to_string()),
            Some(_) => None,
            None => {
                tracing::warn!("no queued answer for prompt {message:?}; cancelling");
                None
            }
        }
    }
}
