//! Headless host: stdin lines in, terminal output on stdout, status
//! messages on stderr.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::bridge::{HttpBridge, NodeKind, TreeNode};
use crate::cli::{Answer, Cli, HeadlessPrompt, HostCommand};
use crate::clipboard::{system_clipboard, ClipboardKind};
use crate::commands::{CommandId, Keymap};
use crate::config::{config_dir, load_keybindings, RecentProjects, SettingsStore};
use crate::shell::{ShellConfig, ShellHandle};
use crate::state::ChatRole;
use crate::status_log::{StatusEntry, StatusKind};
use crate::widgets::HeadlessWidgets;
use crate::workspace::{Collaborators, KeyOutcome, WorkspaceConfig, WorkspaceView};

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let dir: PathBuf = cli.config_dir.clone().unwrap_or_else(config_dir);
    tracing::info!("config dir: {}", dir.display());

    let bridge = HttpBridge::new(&cli.bridge_url).map_err(anyhow::Error::msg)?;
    let (handle, mut transport_rx) = ShellHandle::spawn(cli.shell_url.clone());
    let prompt = HeadlessPrompt::new(cli.yes);

    let collaborators = Collaborators {
        bridge: Arc::new(bridge),
        transport: Box::new(handle.clone()),
        widgets: Box::new(HeadlessWidgets),
        prompt: Box::new(prompt.clone()),
        clipboard: system_clipboard(),
    };
    let config = WorkspaceConfig {
        settings: SettingsStore::load(&dir),
        keymap: Keymap::with_overrides(&load_keybindings(&dir)),
        recent: RecentProjects::load(&dir),
        config_dir: Some(dir),
        shell: ShellConfig { url: cli.shell_url.clone(), ..ShellConfig::default() },
        workspace_root: cli.workspace.clone(),
    };
    let (mut view, mut background_rx) = WorkspaceView::new(collaborators, config);

    let mut printed = 0u64;
    let mut replies = 0usize;
    view.startup().await;
    printed = flush_status(&view, printed);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while !view.is_exiting() {
        tokio::select! {
            line = lines.next_line() => {
                let line = line.context("Failed to read stdin")?;
                let Some(line) = line else {
                    tracing::info!("stdin closed");
                    if !view.request_exit().await {
                        // Nobody is left to answer; drop the edits.
                        view.registry.clear();
                        view.shell.kill();
                    }
                    break;
                };
                match HostCommand::parse(&line) {
                    Ok(cmd) => dispatch(&mut view, &prompt, cmd).await,
                    Err(e) => eprintln!("! {e}"),
                }
            }
            Some(event) = transport_rx.recv() => view.handle_transport_event(event),
            Some(event) = background_rx.recv() => view.handle_background(event).await,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted");
                view.request_exit().await;
                break;
            }
        }
        printed = flush_status(&view, printed);
        replies = flush_chat(&view, replies);
    }

    handle.shutdown();
    Ok(())
}

async fn dispatch(view: &mut WorkspaceView, prompt: &HeadlessPrompt, cmd: HostCommand) {
    match cmd {
        HostCommand::Open(path) => {
            view.open_file(&path).await;
        }
        HostCommand::Save => {
            view.save_active().await;
        }
        HostCommand::SaveAs(path) => {
            if view.registry.active_id().is_some() {
                prompt.queue(Answer::Text(path));
            }
            view.save_active_as().await;
        }
        HostCommand::Close => {
            view.execute(CommandId::CloseTab).await;
        }
        HostCommand::Tab(n) => {
            let found = view.registry.documents().nth(n - 1).map(|d| d.id);
            match found {
                Some(id) => {
                    view.activate_tab(id);
                }
                None => eprintln!("! No tab {n}"),
            }
        }
        HostCommand::Folder(path) => {
            view.open_folder(&path).await;
        }
        HostCommand::NewFile(name) => {
            view.create_item(NodeKind::File, &name).await;
        }
        HostCommand::NewFolder(name) => {
            view.create_item(NodeKind::Folder, &name).await;
        }
        HostCommand::Delete(paths) => {
            view.delete_items(&paths).await;
        }
        HostCommand::Rename { path, name } => {
            view.rename_item(&path, &name).await;
        }
        HostCommand::Copy(paths) => view.stage_items(ClipboardKind::Copy, &paths).await,
        HostCommand::Cut(paths) => view.stage_items(ClipboardKind::Cut, &paths).await,
        HostCommand::Paste(dest) => {
            view.paste_items(dest.as_deref()).await;
        }
        HostCommand::PasteHere(folder) => view.set_paste_target(Some(&folder)),
        HostCommand::Click(path) => view.click_tree_item(&path).await,
        HostCommand::Focus(focus) => view.focus_changed(focus),
        HostCommand::Key(chord) => match view.handle_key(&chord).await {
            KeyOutcome::Handled => {}
            KeyOutcome::Forward(cmd) => eprintln!("! {} needs a graphical editor", cmd.label()),
            KeyOutcome::Ignored => tracing::debug!("{chord} is not bound"),
        },
        HostCommand::Search(query) => {
            view.search(&query);
            print_search(view);
        }
        HostCommand::Next => {
            view.search.navigate(1);
            print_search(view);
        }
        HostCommand::Prev => {
            view.search.navigate(-1);
            print_search(view);
        }
        HostCommand::Pick => {
            view.open_search_result().await;
        }
        HostCommand::Run => {
            view.run_active_file();
        }
        HostCommand::Clear => view.clear_terminal(),
        HostCommand::Toggle => view.toggle_terminal(),
        HostCommand::Update => {
            view.update_project();
        }
        HostCommand::Chat(text) => {
            view.send_chat(&text);
        }
        HostCommand::Set { key, value } => {
            let mut partial = serde_json::Map::new();
            partial.insert(key, value);
            view.update_settings(partial);
        }
        HostCommand::Tree => print_tree(&view.state.tree, 0),
        HostCommand::Tabs => print_tabs(view),
        HostCommand::Status => {
            eprintln!(
                "# shell: {:?}  {}  root: {}",
                view.shell.state(),
                view.path_status(),
                view.state.workspace_root.as_deref().unwrap_or("-")
            );
            if !view.state.clipboard.is_empty() {
                eprintln!("# {}", view.state.clipboard.paste_label());
            }
        }
        HostCommand::Answer(answer) => prompt.queue(answer),
        HostCommand::Quit => {
            if !view.request_exit().await {
                eprintln!("! exit cancelled");
            }
        }
        HostCommand::Input(text) => {
            if !view.shell.input(&format!("{text}\r")) {
                eprintln!("! Terminal server not connected");
            }
        }
    }
}

/// Print status entries newer than `after`; returns the newest id printed.
fn flush_status(view: &WorkspaceView, after: u64) -> u64 {
    let mut last = after;
    for entry in view.status.recent(0).iter().filter(|e| e.id >= after) {
        eprintln!("{}", format_status(entry));
        last = entry.id + 1;
    }
    last
}

/// Print assistant messages past the first `seen`; returns the new count.
fn flush_chat(view: &WorkspaceView, seen: usize) -> usize {
    let history = &view.state.chat.history;
    for message in history.iter().skip(seen).filter(|m| m.role == ChatRole::Assistant) {
        eprintln!("> {}", message.text);
    }
    history.len()
}

fn format_status(entry: &StatusEntry) -> String {
    let tag = match entry.kind {
        StatusKind::Info => "info",
        StatusKind::Copy => "copy",
        StatusKind::Cut => "cut",
        StatusKind::Error => "error",
    };
    format!("[{tag}] {}", entry.message)
}

fn print_tree(nodes: &[TreeNode], depth: usize) {
    for node in nodes {
        let suffix = if node.is_folder() { "/" } else { "" };
        eprintln!("{}{}{}", "  ".repeat(depth), node.name, suffix);
        print_tree(&node.children, depth + 1);
    }
}

fn print_tabs(view: &WorkspaceView) {
    let active = view.registry.active_id();
    for (i, doc) in view.registry.documents().enumerate() {
        let marker = if Some(doc.id) == active { '*' } else { ' ' };
        let dirty = if doc.is_dirty() { " [+]" } else { "" };
        eprintln!("{marker}{} {}{dirty}  {}", i + 1, doc.display_name, doc.path);
    }
}

fn print_search(view: &WorkspaceView) {
    for (i, hit) in view.search.results.iter().enumerate() {
        let marker = if Some(i) == view.search.current { '>' } else { ' ' };
        let count = hit.matches.map(|n| format!(" ({n})")).unwrap_or_default();
        eprintln!("{marker} {:?} {}{count}  {}", hit.match_type, hit.name, hit.path);
    }
}
