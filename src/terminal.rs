use crate::controller::ChatController;
use crate::form::FormState;
use crate::input::{InputField, InputKind};
use crate::transcript::{EntryContent, EntryId, TranscriptEntry};
use crate::view::ChatView;
use crate::voice::{VoiceInput, VoiceState, VoiceToggle};
use anyhow::Context;
use kuchiki::traits::*;
use regex::Regex;
use std::io::Write;
use std::path::Path;
use std::sync::LazyLock;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinSet;
use tracing::debug;

static BLOCK_BREAK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)</(p|div|li|h[1-6])>|<br\s*/?>").expect("block break regex")
});

/// Plain-text projection of a markup fragment. Links keep their target so
/// datasheets stay reachable from a terminal.
pub fn plain_text(html: &str) -> String {
    let spaced = BLOCK_BREAK.replace_all(html, "$0 ");
    let document = kuchiki::parse_html().one(format!("<div>{spaced}</div>"));
    let mut text = document
        .text_contents()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    if let Ok(anchors) = document.select("a[href]") {
        for anchor in anchors {
            let attrs = anchor.attributes.borrow();
            if let Some(href) = attrs.get("href")
                && href != "#"
            {
                text.push_str(&format!(" <{href}>"));
            }
        }
    }
    text
}

/// Writes transcript changes to stdout.
#[derive(Debug, Default)]
pub struct TerminalView;

impl TerminalView {
    fn print(&self, line: &str) {
        let mut out = std::io::stdout().lock();
        let _ = writeln!(out, "{line}");
        let _ = out.flush();
    }

    pub fn format_entry(entry: &TranscriptEntry) -> String {
        let time = &entry.timestamp;
        match &entry.content {
            EntryContent::Bot { text } => format!("[{time}] bot: {}", plain_text(text)),
            EntryContent::User { text } => format!("[{time}] you: {text}"),
            EntryContent::ButtonGroup { buttons } => buttons
                .iter()
                .enumerate()
                .map(|(i, b)| format!("  {}) {}", i + 1, b.label))
                .collect::<Vec<_>>()
                .join("\n"),
            EntryContent::Graph {
                model_name,
                image_url,
            } => format!(
                "[{time}] bot: Here's the cooling performance graph for {model_name}: {image_url}"
            ),
            EntryContent::Loading => format!("[{time}] bot is typing..."),
        }
    }
}

impl ChatView for TerminalView {
    fn entry_appended(&self, entry: &TranscriptEntry) {
        self.print(&Self::format_entry(entry));
    }

    fn entry_removed(&self, id: EntryId) {
        debug!(id, "loading entry removed");
    }

    fn cleared(&self) {
        self.print("--- chat reset ---");
    }

    fn input_changed(&self, input: &InputField) {
        if input.kind != InputKind::Text || input.placeholder != crate::input::DEFAULT_PLACEHOLDER
        {
            self.print(&format!("({})", input.placeholder));
        }
    }

    fn listening_changed(&self, listening: bool) {
        self.print(if listening {
            "(listening...)"
        } else {
            "(stopped listening)"
        });
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalCommand {
    Quit,
    Reset,
    Voice,
    Help,
    Choose(usize),
    Text(String),
    Empty,
}

impl TerminalCommand {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        match line {
            "" => TerminalCommand::Empty,
            "/quit" | "/exit" => TerminalCommand::Quit,
            "/reset" => TerminalCommand::Reset,
            "/voice" => TerminalCommand::Voice,
            "/help" => TerminalCommand::Help,
            _ => match line.parse::<usize>() {
                Ok(n) if (1..=99).contains(&n) => TerminalCommand::Choose(n),
                _ => TerminalCommand::Text(line.to_string()),
            },
        }
    }
}

const HELP: &str = "Type a question, a number to pick an option, /voice, /reset or /quit.";

/// Applies typed lines to a controller. Each line is applied up to its
/// request before the next line is read; only the network half runs in the
/// background.
pub struct TerminalSession {
    controller: ChatController,
    voice: VoiceInput,
    tasks: JoinSet<()>,
}

impl TerminalSession {
    pub fn new(controller: ChatController, voice: VoiceInput) -> Self {
        Self {
            controller,
            voice,
            tasks: JoinSet::new(),
        }
    }

    /// Handle one input line. Returns `false` once the user asked to quit.
    pub async fn handle(&mut self, line: &str) -> bool {
        match TerminalCommand::parse(line) {
            TerminalCommand::Empty => {}
            TerminalCommand::Quit => return false,
            TerminalCommand::Help => TerminalView.print(HELP),
            TerminalCommand::Reset => {
                self.controller.clear_session().await;
                let chat = self.controller.clone();
                self.tasks.spawn(async move { chat.initialize().await });
            }
            TerminalCommand::Voice => {
                if self.voice.toggle().await == VoiceToggle::Unsupported {
                    debug!("voice input unavailable");
                }
            }
            TerminalCommand::Choose(n) => {
                let button = if self.controller.form_state().await == FormState::Inactive {
                    self.controller.last_buttons().await.into_iter().nth(n - 1)
                } else {
                    None
                };
                match button {
                    Some(button) => {
                        if let Some(pending) = self.controller.record_selection(&button.value).await
                        {
                            let chat = self.controller.clone();
                            self.tasks
                                .spawn(async move { chat.complete_selection(pending).await });
                        }
                    }
                    None => self.send_text(line).await,
                }
            }
            TerminalCommand::Text(text) => self.send_text(&text).await,
        }
        true
    }

    async fn send_text(&mut self, text: &str) {
        if let Some(pending) = self.controller.record_user_text(text).await {
            let chat = self.controller.clone();
            self.tasks
                .spawn(async move { chat.complete_message(pending).await });
        }
    }

    /// Stop listening and wait for every outstanding reply and submission.
    pub async fn finish(mut self) {
        if self.voice.state().await == VoiceState::Listening {
            self.voice.toggle().await;
        }
        self.voice.wait_idle().await;
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(err) = joined {
                debug!(?err, "terminal request task ended abnormally");
            }
        }
        self.controller.flush_background().await;
    }
}

/// Drive one chat session from stdin until `/quit`, EOF or Ctrl-C.
pub async fn run(controller: ChatController, voice: VoiceInput) -> anyhow::Result<()> {
    TerminalView.print(HELP);
    controller.initialize().await;

    let mut session = TerminalSession::new(controller, voice);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };
        if !session.handle(&line).await {
            break;
        }
    }

    session.finish().await;
    Ok(())
}

/// Write the rendered transcript markup to `path`.
pub async fn export_transcript(controller: &ChatController, path: &Path) -> anyhow::Result<()> {
    let html = controller.transcript_html().await;
    tokio::fs::write(path, html)
        .await
        .with_context(|| format!("failed to write transcript to {}", path.display()))
}
