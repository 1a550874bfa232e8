use crate::backend::{ChatBackend, MenuButton, MessageReply};
use crate::catalog::PdfCatalog;
use crate::config::ResponseOrdering;
use crate::form::{CustomizeRecord, FormCapture, FormState, FormStep, THANK_YOU};
use crate::input::InputField;
use crate::navigation::NavigationState;
use crate::submission;
use crate::transcript::{EntryContent, EntryId, TranscriptEntry, TranscriptStore};
use crate::view::ChatView;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

pub const APOLOGY_MESSAGE: &str =
    "Sorry, I encountered an error while processing your request. Please try again.";
pub const GREETING_FAILED_MESSAGE: &str =
    "Sorry, I couldn't load the initial options. Please try refreshing the page.";

/// Everything one chat session mutates.
pub(crate) struct SessionContext {
    pub(crate) transcript: TranscriptStore,
    pub(crate) navigation: NavigationState,
    pub(crate) form: FormCapture,
    pub(crate) input: InputField,
    /// Bumped on reset; responses from an older epoch are dropped.
    pub(crate) epoch: u64,
    pub(crate) message_seq: u64,
    pub(crate) menu_seq: u64,
    in_flight: usize,
}

/// Point-in-time copy of the session, for front-ends and tests.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub entries: Vec<TranscriptEntry>,
    pub navigation_path: String,
    pub form_state: FormState,
    pub input: InputField,
    pub is_loading: bool,
}

/// A message recorded in the transcript whose request has not been sent yet.
#[derive(Debug)]
pub struct PendingMessage {
    msg: String,
    epoch: u64,
    seq: u64,
    loading: EntryId,
    button_path: String,
}

/// Conversation controller for one chat session. Cheap to clone; clones share
/// the session.
#[derive(Clone)]
pub struct ChatController {
    session_id: Uuid,
    backend: Arc<dyn ChatBackend>,
    catalog: Arc<PdfCatalog>,
    ordering: ResponseOrdering,
    view: Arc<dyn ChatView>,
    pub(crate) ctx: Arc<Mutex<SessionContext>>,
    background: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl ChatController {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        catalog: Arc<PdfCatalog>,
        view: Arc<dyn ChatView>,
    ) -> Self {
        let ctx = SessionContext {
            transcript: TranscriptStore::new(view.clone()),
            navigation: NavigationState::default(),
            form: FormCapture::default(),
            input: InputField::default(),
            epoch: 0,
            message_seq: 0,
            menu_seq: 0,
            in_flight: 0,
        };
        Self {
            session_id: Uuid::new_v4(),
            backend,
            catalog,
            ordering: ResponseOrdering::default(),
            view,
            ctx: Arc::new(Mutex::new(ctx)),
            background: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_ordering(mut self, ordering: ResponseOrdering) -> Self {
        self.ordering = ordering;
        self
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub(crate) fn backend(&self) -> &Arc<dyn ChatBackend> {
        &self.backend
    }

    pub(crate) fn catalog(&self) -> &PdfCatalog {
        &self.catalog
    }

    pub(crate) fn view(&self) -> &Arc<dyn ChatView> {
        &self.view
    }

    /// Whether a response issued at `issued` may still be applied.
    pub(crate) fn accepts(&self, issued: u64, latest: u64) -> bool {
        match self.ordering {
            ResponseOrdering::ApplyAll => true,
            ResponseOrdering::DiscardStale => issued == latest,
        }
    }

    /// Fetch the greeting and the root menu.
    #[instrument(skip_all, fields(session_id = %self.session_id))]
    pub async fn initialize(&self) {
        let epoch = self.ctx.lock().await.epoch;
        let result = self.backend.greeting().await;
        let mut ctx = self.ctx.lock().await;
        if ctx.epoch != epoch {
            debug!("greeting arrived after reset; dropped");
            return;
        }
        match result {
            Ok(greeting) => {
                ctx.transcript.append(EntryContent::bot(greeting.greeting));
                ctx.transcript.append(EntryContent::ButtonGroup {
                    buttons: greeting.buttons,
                });
            }
            Err(err) => {
                warn!(?err, "failed to load greeting");
                ctx.transcript.append(EntryContent::bot(GREETING_FAILED_MESSAGE));
            }
        }
    }

    /// Clear the session and start over from the greeting.
    pub async fn reset(&self) {
        self.clear_session().await;
        self.initialize().await;
    }

    /// The local half of [`reset`](Self::reset): everything but the greeting
    /// fetch. Responses to requests issued before this point are dropped.
    #[instrument(skip_all, fields(session_id = %self.session_id))]
    pub async fn clear_session(&self) {
        let mut ctx = self.ctx.lock().await;
        ctx.epoch += 1;
        ctx.transcript.clear();
        ctx.navigation.clear();
        ctx.form.reset();
        ctx.input = InputField::default();
        self.view.input_changed(&ctx.input);
    }

    pub async fn set_input(&self, value: &str) {
        let mut ctx = self.ctx.lock().await;
        ctx.input.set_value(value);
        self.view.input_changed(&ctx.input);
    }

    /// Submit whatever the input field currently holds.
    pub async fn submit_input(&self) {
        let value = self.ctx.lock().await.input.value.clone();
        self.submit_user_text(&value).await;
    }

    /// Send a line of user text: into the lead form when it is collecting,
    /// otherwise to the message endpoint.
    pub async fn submit_user_text(&self, text: &str) {
        if let Some(pending) = self.record_user_text(text).await {
            self.complete_message(pending).await;
        }
    }

    /// Apply a line of user text up to the network call. Returns the request
    /// still to be sent, or `None` when the line was blank or went to the
    /// lead form. Calls made in sequence are applied in that order.
    #[instrument(skip_all, fields(session_id = %self.session_id))]
    pub async fn record_user_text(&self, text: &str) -> Option<PendingMessage> {
        let msg = text.trim();
        if msg.is_empty() {
            return None;
        }

        let mut ctx = self.ctx.lock().await;
        ctx.transcript.append(EntryContent::user(msg));
        ctx.input.clear();
        self.view.input_changed(&ctx.input);

        if ctx.form.is_active() {
            let step = ctx.form.process_input(msg);
            let completed = self.apply_form_step(&mut ctx, step);
            drop(ctx);
            if let Some(record) = completed {
                self.spawn_submission(record).await;
            }
            return None;
        }

        let loading = ctx.transcript.append(EntryContent::Loading);
        ctx.message_seq += 1;
        ctx.in_flight += 1;
        Some(PendingMessage {
            msg: msg.to_string(),
            epoch: ctx.epoch,
            seq: ctx.message_seq,
            loading,
            button_path: ctx.navigation.path().to_string(),
        })
    }

    /// Send a recorded message and apply the reply.
    #[instrument(skip_all, fields(session_id = %self.session_id, seq = pending.seq))]
    pub async fn complete_message(&self, pending: PendingMessage) {
        debug!(path = %pending.button_path, "sending message");
        let result = self
            .backend
            .send_message(&pending.msg, &pending.button_path)
            .await;

        let mut ctx = self.ctx.lock().await;
        ctx.in_flight = ctx.in_flight.saturating_sub(1);
        if ctx.epoch != pending.epoch {
            debug!("message response arrived after reset; dropped");
            return;
        }
        ctx.transcript.remove_loading(pending.loading);
        let latest = ctx.message_seq;
        if !self.accepts(pending.seq, latest) {
            debug!(latest, "stale message response dropped");
            return;
        }
        match result {
            Ok(MessageReply::Markup(body)) => {
                ctx.transcript.append(EntryContent::bot(body));
            }
            Ok(MessageReply::CoolingGraph {
                model_name,
                image_url,
            }) => {
                ctx.transcript.append(EntryContent::Graph {
                    model_name,
                    image_url,
                });
            }
            Err(err) => {
                warn!(?err, "message request failed");
                ctx.transcript.append(EntryContent::bot(APOLOGY_MESSAGE));
            }
        }
    }

    /// Start the lead-capture flow at the phone question.
    pub async fn begin_customize_flow(&self) {
        let mut ctx = self.ctx.lock().await;
        let step = ctx.form.begin();
        self.apply_form_step(&mut ctx, step);
    }

    fn apply_form_step(&self, ctx: &mut SessionContext, step: FormStep) -> Option<CustomizeRecord> {
        match step {
            FormStep::Prompt {
                prompt,
                kind,
                placeholder,
            } => {
                ctx.transcript.append(EntryContent::bot(prompt));
                ctx.input.set_affordance(kind, placeholder);
                self.view.input_changed(&ctx.input);
                None
            }
            FormStep::Reprompt(message) => {
                ctx.transcript.append(EntryContent::bot(message));
                None
            }
            FormStep::Complete(record) => {
                ctx.transcript.append(EntryContent::bot(THANK_YOU));
                ctx.input.restore_default_affordance();
                self.view.input_changed(&ctx.input);
                Some(record)
            }
            FormStep::Inactive => None,
        }
    }

    async fn spawn_submission(&self, record: CustomizeRecord) {
        let handle = submission::spawn_submission(self.backend.clone(), record, self.session_id);
        self.background.lock().await.push(handle);
    }

    /// Wait for background submissions to finish.
    pub async fn flush_background(&self) {
        let handles: Vec<_> = self.background.lock().await.drain(..).collect();
        for handle in handles {
            if let Err(err) = handle.await {
                warn!(?err, "background task panicked");
            }
        }
    }

    pub async fn append_bot_message(&self, text: &str) {
        self.ctx
            .lock()
            .await
            .transcript
            .append(EntryContent::bot(text));
    }

    /// Populate the input with a recognised utterance and send it.
    pub async fn submit_voice_transcript(&self, transcript: &str) {
        self.set_input(transcript).await;
        self.submit_input().await;
    }

    pub async fn last_buttons(&self) -> Vec<MenuButton> {
        self.ctx
            .lock()
            .await
            .transcript
            .last_button_group()
            .map(<[MenuButton]>::to_vec)
            .unwrap_or_default()
    }

    pub async fn form_state(&self) -> FormState {
        self.ctx.lock().await.form.state()
    }

    pub async fn transcript_html(&self) -> String {
        self.ctx.lock().await.transcript.to_html()
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let ctx = self.ctx.lock().await;
        SessionSnapshot {
            entries: ctx.transcript.entries().to_vec(),
            navigation_path: ctx.navigation.path().to_string(),
            form_state: ctx.form.state(),
            input: ctx.input.clone(),
            is_loading: ctx.in_flight > 0,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::backend::testing::{Call, FakeBackend, transport_error};
    use crate::form::{EMAIL_PROMPT, INVALID_PHONE, PHONE_PROMPT};
    use crate::input::InputKind;
    use crate::view::NullView;

    pub(crate) fn controller(backend: Arc<FakeBackend>) -> ChatController {
        ChatController::new(backend, Arc::new(PdfCatalog::builtin()), Arc::new(NullView))
    }

    pub(crate) fn bot_texts(snapshot: &SessionSnapshot) -> Vec<String> {
        snapshot
            .entries
            .iter()
            .filter_map(|e| match &e.content {
                EntryContent::Bot { text } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn initialize_shows_greeting_and_root_buttons() {
        let backend = Arc::new(FakeBackend::new());
        let chat = controller(backend.clone());
        chat.initialize().await;
        let snap = chat.snapshot().await;
        assert_eq!(snap.entries.len(), 2);
        assert_eq!(chat.last_buttons().await.len(), 3);
    }

    #[tokio::test]
    async fn greeting_failure_is_reported_once() {
        let backend = Arc::new(FakeBackend::new());
        backend.fail_greeting();
        let chat = controller(backend);
        chat.initialize().await;
        assert_eq!(bot_texts(&chat.snapshot().await), vec![GREETING_FAILED_MESSAGE]);
    }

    #[tokio::test]
    async fn blank_text_is_ignored() {
        let backend = Arc::new(FakeBackend::new());
        let chat = controller(backend.clone());
        chat.submit_user_text("   \t").await;
        assert!(chat.snapshot().await.entries.is_empty());
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn message_round_trip_uses_navigation_path() {
        let backend = Arc::new(FakeBackend::new());
        backend.push_reply(Ok(MessageReply::Markup("<p>22 kW</p>".into())));
        let chat = controller(backend.clone());
        chat.ctx.lock().await.navigation.select("OBC.450V");
        chat.set_input("  what power?  ").await;
        chat.submit_input().await;

        assert_eq!(
            backend.message_calls(),
            vec![("what power?".to_string(), "OBC.450V".to_string())]
        );
        let snap = chat.snapshot().await;
        assert!(!snap.is_loading);
        assert!(snap.input.value.is_empty());
        assert!(!snap.input.send_enabled);
        let contents: Vec<_> = snap.entries.iter().map(|e| e.content.clone()).collect();
        assert_eq!(
            contents,
            vec![
                EntryContent::user("what power?"),
                EntryContent::bot("<p>22 kW</p>"),
            ]
        );
    }

    #[tokio::test]
    async fn cooling_graph_reply_renders_image_entry() {
        let backend = Arc::new(FakeBackend::new());
        backend.push_reply(Ok(MessageReply::CoolingGraph {
            model_name: "OBC.450V".into(),
            image_url: "/static/cooling_graphs/OBC_450V.png".into(),
        }));
        let chat = controller(backend);
        chat.submit_user_text("yes").await;
        let snap = chat.snapshot().await;
        assert!(matches!(
            snap.entries.last().map(|e| &e.content),
            Some(EntryContent::Graph { model_name, .. }) if model_name == "OBC.450V"
        ));
    }

    #[tokio::test]
    async fn failed_message_removes_loading_and_apologises_once() {
        let backend = Arc::new(FakeBackend::new());
        let chat = controller(backend.clone());
        chat.initialize().await;
        let before = chat.snapshot().await.entries;

        backend.push_reply(Err(transport_error()));
        chat.submit_user_text("hello").await;

        let after = chat.snapshot().await.entries;
        assert_eq!(after.len(), before.len() + 2);
        assert_eq!(&after[..before.len()], &before[..]);
        assert_eq!(after[before.len()].content, EntryContent::user("hello"));
        assert_eq!(after[before.len() + 1].content, EntryContent::bot(APOLOGY_MESSAGE));
        assert!(!after.iter().any(|e| e.content == EntryContent::Loading));
    }

    #[tokio::test]
    async fn loading_entry_is_visible_while_request_is_outstanding() {
        let backend = Arc::new(FakeBackend::new());
        let gate = backend.gate_next_message();
        let chat = controller(backend.clone());

        let pending = tokio::spawn({
            let chat = chat.clone();
            async move { chat.submit_user_text("slow question").await }
        });
        while backend.message_calls().is_empty() {
            tokio::task::yield_now().await;
        }
        let snap = chat.snapshot().await;
        assert!(snap.is_loading);
        assert_eq!(snap.entries.last().unwrap().content, EntryContent::Loading);

        gate.notify_one();
        pending.await.unwrap();
        let snap = chat.snapshot().await;
        assert!(!snap.is_loading);
        assert!(!snap.entries.iter().any(|e| e.content == EntryContent::Loading));
    }

    async fn overlapping_replies(ordering: ResponseOrdering) -> Vec<String> {
        let backend = Arc::new(FakeBackend::new());
        let first_gate = backend.gate_next_message();
        backend.push_reply(Ok(MessageReply::Markup("first".into())));
        backend.push_reply(Ok(MessageReply::Markup("second".into())));
        let chat = controller(backend.clone()).with_ordering(ordering);

        let first = tokio::spawn({
            let chat = chat.clone();
            async move { chat.submit_user_text("one").await }
        });
        while backend.message_calls().is_empty() {
            tokio::task::yield_now().await;
        }
        chat.submit_user_text("two").await;
        first_gate.notify_one();
        first.await.unwrap();

        let snap = chat.snapshot().await;
        assert!(!snap.entries.iter().any(|e| e.content == EntryContent::Loading));
        bot_texts(&snap)
    }

    #[tokio::test]
    async fn stale_response_is_discarded_by_default() {
        assert_eq!(
            overlapping_replies(ResponseOrdering::DiscardStale).await,
            vec!["second"]
        );
    }

    #[tokio::test]
    async fn apply_all_keeps_arrival_order() {
        assert_eq!(
            overlapping_replies(ResponseOrdering::ApplyAll).await,
            vec!["second", "first"]
        );
    }

    #[tokio::test]
    async fn customize_flow_validates_and_submits_once() {
        let backend = Arc::new(FakeBackend::new());
        let chat = controller(backend.clone());
        chat.begin_customize_flow().await;

        let snap = chat.snapshot().await;
        assert_eq!(snap.form_state, FormState::CollectingPhone);
        assert_eq!(snap.input.kind, InputKind::Tel);

        chat.submit_user_text("abc").await;
        let snap = chat.snapshot().await;
        assert_eq!(snap.form_state, FormState::CollectingPhone);
        assert_eq!(bot_texts(&snap), vec![PHONE_PROMPT, INVALID_PHONE]);

        chat.submit_user_text("1234567890").await;
        let snap = chat.snapshot().await;
        assert_eq!(snap.form_state, FormState::CollectingEmail);
        assert_eq!(snap.input.kind, InputKind::Email);
        assert_eq!(bot_texts(&snap).last().unwrap(), EMAIL_PROMPT);

        chat.submit_user_text("lead@example.com").await;
        chat.submit_user_text("Custom 2x17 kVA housing").await;
        chat.flush_background().await;

        let snap = chat.snapshot().await;
        assert_eq!(snap.form_state, FormState::Inactive);
        assert_eq!(snap.input, InputField::default());
        assert_eq!(bot_texts(&snap).last().unwrap(), THANK_YOU);
        assert_eq!(
            backend.submissions(),
            vec![CustomizeRecord {
                phone: "1234567890".into(),
                email: "lead@example.com".into(),
                description: "Custom 2x17 kVA housing".into(),
            }]
        );
        assert!(backend.message_calls().is_empty());
    }

    #[tokio::test]
    async fn reset_clears_session_and_refetches_greeting() {
        let backend = Arc::new(FakeBackend::new());
        let chat = controller(backend.clone());
        chat.initialize().await;
        chat.ctx.lock().await.navigation.select("OBC");
        chat.begin_customize_flow().await;
        chat.submit_user_text("1234567890").await;

        chat.reset().await;

        let snap = chat.snapshot().await;
        assert_eq!(snap.navigation_path, "");
        assert_eq!(snap.form_state, FormState::Inactive);
        assert_eq!(snap.input, InputField::default());
        assert_eq!(snap.entries.len(), 2);
        assert_eq!(
            backend
                .calls()
                .iter()
                .filter(|c| **c == Call::Greeting)
                .count(),
            2
        );
    }

    #[tokio::test]
    async fn recorded_lines_keep_their_order_before_any_request() {
        let backend = Arc::new(FakeBackend::new());
        let chat = controller(backend.clone());
        let first = chat.record_user_text("first").await.unwrap();
        let second = chat.record_user_text("second").await.unwrap();
        assert!(chat.record_user_text("   ").await.is_none());
        assert!(backend.calls().is_empty());

        let snap = chat.snapshot().await;
        assert!(snap.is_loading);
        assert!(matches!(
            &snap.entries[0].content,
            EntryContent::User { text } if text == "first"
        ));
        assert!(matches!(
            &snap.entries[2].content,
            EntryContent::User { text } if text == "second"
        ));

        chat.complete_message(second).await;
        chat.complete_message(first).await;
        let snap = chat.snapshot().await;
        assert!(!snap.is_loading);
        assert_eq!(bot_texts(&snap), vec!["<p>echo: second</p>"]);
    }

    #[tokio::test]
    async fn response_from_before_reset_is_dropped() {
        let backend = Arc::new(FakeBackend::new());
        let gate = backend.gate_next_message();
        let chat = controller(backend.clone()).with_ordering(ResponseOrdering::ApplyAll);

        let pending = tokio::spawn({
            let chat = chat.clone();
            async move { chat.submit_user_text("old question").await }
        });
        while backend.message_calls().is_empty() {
            tokio::task::yield_now().await;
        }
        chat.reset().await;
        gate.notify_one();
        pending.await.unwrap();

        let snap = chat.snapshot().await;
        assert_eq!(snap.entries.len(), 2);
        assert!(!bot_texts(&snap).iter().any(|t| t.contains("old question")));
    }
}
