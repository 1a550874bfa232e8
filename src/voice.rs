use crate::controller::ChatController;
use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Arc;
use thiserror::Error;
use tokio::process::Command;
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, warn};

pub const UNSUPPORTED_MESSAGE: &str = "Speech recognition is not supported in this environment.";

#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("speech recognition is not supported")]
    Unsupported,
    #[error("failed to start recognizer: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("recognizer failed: {0}")]
    Failed(String),
}

/// A source of spoken utterances.
#[async_trait]
pub trait SpeechProvider: Send + Sync {
    fn is_supported(&self) -> bool {
        true
    }

    /// Capture one utterance. Resolves to `None` when `stop` fires first or
    /// nothing was recognised.
    async fn capture(&self, stop: oneshot::Receiver<()>) -> Result<Option<String>, SpeechError>;
}

/// Used when no recognizer is available.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedSpeech;

#[async_trait]
impl SpeechProvider for UnsupportedSpeech {
    fn is_supported(&self) -> bool {
        false
    }

    async fn capture(&self, _stop: oneshot::Receiver<()>) -> Result<Option<String>, SpeechError> {
        Err(SpeechError::Unsupported)
    }
}

/// Runs an external recognizer and reads the utterance from its stdout.
#[derive(Debug, Clone)]
pub struct CommandSpeechProvider {
    program: String,
    args: Vec<String>,
}

impl CommandSpeechProvider {
    pub fn from_command_line(command: &str) -> Option<Self> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
        })
    }
}

#[async_trait]
impl SpeechProvider for CommandSpeechProvider {
    async fn capture(&self, stop: oneshot::Receiver<()>) -> Result<Option<String>, SpeechError> {
        let child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(SpeechError::Spawn)?;

        tokio::select! {
            output = child.wait_with_output() => {
                let output = output.map_err(SpeechError::Spawn)?;
                if !output.status.success() {
                    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
                    return Err(SpeechError::Failed(if stderr.is_empty() {
                        output.status.to_string()
                    } else {
                        stderr
                    }));
                }
                let transcript = String::from_utf8_lossy(&output.stdout).trim().to_string();
                Ok((!transcript.is_empty()).then_some(transcript))
            }
            Ok(()) = stop => {
                debug!(program = %self.program, "capture stopped");
                Ok(None)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceState {
    Idle,
    Listening,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceToggle {
    Unsupported,
    Started,
    Stopping,
}

#[derive(Default)]
struct Capture {
    generation: u64,
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

/// Idle/Listening toggle that feeds recognised speech into the controller.
#[derive(Clone)]
pub struct VoiceInput {
    provider: Arc<dyn SpeechProvider>,
    controller: ChatController,
    capture: Arc<Mutex<Capture>>,
}

impl VoiceInput {
    pub fn new(provider: Arc<dyn SpeechProvider>, controller: ChatController) -> Self {
        Self {
            provider,
            controller,
            capture: Arc::new(Mutex::new(Capture::default())),
        }
    }

    pub async fn state(&self) -> VoiceState {
        if self.capture.lock().await.stop.is_some() {
            VoiceState::Listening
        } else {
            VoiceState::Idle
        }
    }

    pub async fn toggle(&self) -> VoiceToggle {
        if !self.provider.is_supported() {
            self.controller.append_bot_message(UNSUPPORTED_MESSAGE).await;
            return VoiceToggle::Unsupported;
        }

        let mut capture = self.capture.lock().await;
        if let Some(stop) = capture.stop.take() {
            let _ = stop.send(());
            self.controller.view().listening_changed(false);
            return VoiceToggle::Stopping;
        }

        let (tx, rx) = oneshot::channel();
        capture.generation += 1;
        capture.stop = Some(tx);
        let generation = capture.generation;
        self.controller.view().listening_changed(true);

        let this = self.clone();
        let span = tracing::info_span!("voice_capture", session_id = %self.controller.session_id());
        capture.task = Some(tokio::spawn(
            async move {
                let result = this.provider.capture(rx).await;
                this.finish(generation).await;
                match result {
                    Ok(Some(transcript)) => {
                        info!("speech recognised");
                        this.controller.submit_voice_transcript(&transcript).await;
                    }
                    Ok(None) => debug!("capture ended without a transcript"),
                    Err(err) => warn!(%err, "speech recognition error"),
                }
            }
            .instrument(span),
        ));
        VoiceToggle::Started
    }

    async fn finish(&self, generation: u64) {
        let mut capture = self.capture.lock().await;
        if capture.generation == generation && capture.stop.take().is_some() {
            self.controller.view().listening_changed(false);
        }
    }

    /// Wait for the current capture, if any, to finish.
    pub async fn wait_idle(&self) {
        let task = self.capture.lock().await.task.take();
        if let Some(task) = task
            && let Err(err) = task.await
        {
            warn!(?err, "voice capture task panicked");
        }
    }
}
