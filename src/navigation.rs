use crate::controller::ChatController;
use crate::render;
use crate::transcript::EntryContent;
use tracing::{debug, instrument, warn};

/// Menu value that opens the lead-capture form instead of a submenu.
pub const CUSTOMIZE_BUTTON: &str = "Customize";
pub const MENU_FAILED_MESSAGE: &str = "Sorry, I couldn't load the options. Please try again.";

/// Last selected menu path; empty means the root menu.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NavigationState {
    path: String,
}

impl NavigationState {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn select(&mut self, path: &str) {
        self.path = path.to_string();
    }

    pub fn clear(&mut self) {
        self.path.clear();
    }
}

pub fn product_question(path: &str) -> String {
    format!("Tell me about {path}")
}

/// A menu selection whose request has not been sent yet.
#[derive(Debug)]
pub struct PendingMenu {
    path: String,
    epoch: u64,
    seq: u64,
}

impl ChatController {
    /// Handle a menu button. Submenus are shown one level at a time; a leaf
    /// product gets its datasheet link and is asked about straight away.
    pub async fn select_button(&self, path: &str) {
        if let Some(pending) = self.record_selection(path).await {
            self.complete_selection(pending).await;
        }
    }

    /// Apply a selection up to the menu request. The Customize button is
    /// handled entirely here and yields `None`.
    #[instrument(skip_all, fields(session_id = %self.session_id(), path = %path))]
    pub async fn record_selection(&self, path: &str) -> Option<PendingMenu> {
        if path == CUSTOMIZE_BUTTON {
            self.begin_customize_flow().await;
            return None;
        }

        let mut ctx = self.ctx.lock().await;
        ctx.navigation.select(path);
        ctx.menu_seq += 1;
        Some(PendingMenu {
            path: path.to_string(),
            epoch: ctx.epoch,
            seq: ctx.menu_seq,
        })
    }

    /// Fetch the menu level for a recorded selection and render it.
    #[instrument(skip_all, fields(session_id = %self.session_id(), path = %pending.path))]
    pub async fn complete_selection(&self, pending: PendingMenu) {
        let PendingMenu { path, epoch, seq } = pending;
        let result = self.backend().menu(&path).await;

        let question = {
            let mut ctx = self.ctx.lock().await;
            if ctx.epoch != epoch {
                debug!("menu response arrived after reset; dropped");
                return;
            }
            let latest = ctx.menu_seq;
            if !self.accepts(seq, latest) {
                debug!(seq, latest, "stale menu response dropped");
                return;
            }
            match result {
                Ok(level) if !level.is_leaf() => {
                    ctx.transcript.append(EntryContent::bot(format!(
                        "Please select an option for {}:",
                        level.current_label
                    )));
                    ctx.transcript.append(EntryContent::ButtonGroup {
                        buttons: level.buttons,
                    });
                    None
                }
                Ok(_) => {
                    let pdf_url = self.catalog().lookup(&path);
                    ctx.transcript
                        .append(EntryContent::bot(render::product_prompt_html(pdf_url)));
                    let question = product_question(&path);
                    ctx.input.set_value(question.clone());
                    self.view().input_changed(&ctx.input);
                    Some(question)
                }
                Err(err) => {
                    warn!(?err, "failed to load menu");
                    ctx.transcript.append(EntryContent::bot(MENU_FAILED_MESSAGE));
                    None
                }
            }
        };

        if let Some(question) = question {
            self.submit_user_text(&question).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::{Call, FakeBackend};
    use crate::backend::{MenuButton, MenuLevel};
    use crate::catalog::NO_LINK;
    use crate::config::ResponseOrdering;
    use crate::controller::tests::{bot_texts, controller};
    use crate::form::{FormState, PHONE_PROMPT};
    use std::sync::Arc;

    fn submenu(label: &str, buttons: &[(&str, &str)]) -> MenuLevel {
        MenuLevel {
            current_label: label.to_string(),
            buttons: buttons
                .iter()
                .map(|(l, v)| MenuButton::new(*l, *v))
                .collect(),
            has_children: true,
            pdf_url: None,
        }
    }

    #[tokio::test]
    async fn submenu_renders_prompt_and_buttons() {
        let backend = Arc::new(FakeBackend::new());
        backend.set_menu(
            "OBC",
            submenu("On-Board Charger", &[("450V", "OBC.450V"), ("800V", "OBC.800V")]),
        );
        let chat = controller(backend.clone());
        chat.select_button("OBC").await;

        let snap = chat.snapshot().await;
        assert_eq!(snap.navigation_path, "OBC");
        assert_eq!(
            bot_texts(&snap),
            vec!["Please select an option for On-Board Charger:"]
        );
        assert_eq!(chat.last_buttons().await[1].value, "OBC.800V");
        assert!(backend.message_calls().is_empty());
    }

    #[tokio::test]
    async fn leaf_auto_sends_product_question() {
        let backend = Arc::new(FakeBackend::new());
        let chat = controller(backend.clone());
        chat.select_button("OBC.450V").await;

        assert_eq!(
            backend.message_calls(),
            vec![(
                "Tell me about OBC.450V".to_string(),
                "OBC.450V".to_string()
            )]
        );
        let snap = chat.snapshot().await;
        let texts = bot_texts(&snap);
        assert!(texts[0].contains("On-Board_Charger_datasheet"));
        assert_eq!(texts[1], "<p>echo: Tell me about OBC.450V</p>");
        assert!(snap.input.value.is_empty());
    }

    #[tokio::test]
    async fn leaf_without_datasheet_links_sentinel() {
        let backend = Arc::new(FakeBackend::new());
        let chat = controller(backend);
        chat.select_button("Mystery.widget").await;
        let texts = bot_texts(&chat.snapshot().await);
        assert!(texts[0].contains(&format!("href=\"{NO_LINK}\"")));
    }

    #[tokio::test]
    async fn customize_button_starts_form_without_network() {
        let backend = Arc::new(FakeBackend::new());
        let chat = controller(backend.clone());
        chat.select_button(CUSTOMIZE_BUTTON).await;
        let snap = chat.snapshot().await;
        assert_eq!(snap.form_state, FormState::CollectingPhone);
        assert_eq!(bot_texts(&snap), vec![PHONE_PROMPT]);
        assert_eq!(snap.navigation_path, "");
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn menu_failure_is_reported_without_retry() {
        let backend = Arc::new(FakeBackend::new());
        backend.fail_menus();
        let chat = controller(backend.clone());
        chat.select_button("inverter").await;
        assert_eq!(bot_texts(&chat.snapshot().await), vec![MENU_FAILED_MESSAGE]);
        assert_eq!(backend.calls(), vec![Call::Menu("inverter".into())]);
    }

    async fn overlapping_selections(ordering: ResponseOrdering) -> (Vec<String>, String, String) {
        let backend = Arc::new(FakeBackend::new());
        backend.set_menu("inverter", submenu("Inverter", &[("Traction", "inverter.t")]));
        backend.set_menu("OBC", submenu("On-Board Charger", &[("450V", "OBC.450V")]));
        let gate = backend.gate_next_menu();
        let chat = controller(backend.clone()).with_ordering(ordering);

        let first = tokio::spawn({
            let chat = chat.clone();
            async move { chat.select_button("inverter").await }
        });
        while !backend.calls().contains(&Call::Menu("inverter".into())) {
            tokio::task::yield_now().await;
        }
        chat.select_button("OBC").await;
        gate.notify_one();
        first.await.unwrap();

        let snap = chat.snapshot().await;
        let newest_button = chat.last_buttons().await[0].value.clone();
        (bot_texts(&snap), snap.navigation_path, newest_button)
    }

    #[tokio::test]
    async fn stale_submenu_is_discarded_by_default() {
        let (texts, path, newest) = overlapping_selections(ResponseOrdering::DiscardStale).await;
        assert_eq!(texts, vec!["Please select an option for On-Board Charger:"]);
        assert_eq!(path, "OBC");
        assert_eq!(newest, "OBC.450V");
    }

    #[tokio::test]
    async fn apply_all_renders_submenus_in_arrival_order() {
        let (texts, path, newest) = overlapping_selections(ResponseOrdering::ApplyAll).await;
        assert_eq!(
            texts,
            vec![
                "Please select an option for On-Board Charger:",
                "Please select an option for Inverter:",
            ]
        );
        assert_eq!(path, "OBC");
        assert_eq!(newest, "inverter.t");
    }

    #[tokio::test]
    async fn menu_response_from_before_reset_is_dropped() {
        let backend = Arc::new(FakeBackend::new());
        backend.set_menu("inverter", submenu("Inverter", &[("Traction", "inverter.t")]));
        let gate = backend.gate_next_menu();
        let chat = controller(backend.clone()).with_ordering(ResponseOrdering::ApplyAll);

        let pending = tokio::spawn({
            let chat = chat.clone();
            async move { chat.select_button("inverter").await }
        });
        while !backend.calls().contains(&Call::Menu("inverter".into())) {
            tokio::task::yield_now().await;
        }
        chat.reset().await;
        gate.notify_one();
        pending.await.unwrap();

        let snap = chat.snapshot().await;
        assert_eq!(snap.entries.len(), 2);
        assert_eq!(snap.navigation_path, "");
        assert!(!bot_texts(&snap).iter().any(|t| t.starts_with("Please select")));
        assert_eq!(chat.last_buttons().await[0].value, "inverter");
    }

    #[tokio::test]
    async fn recorded_selection_updates_path_before_the_request() {
        let backend = Arc::new(FakeBackend::new());
        let chat = controller(backend.clone());
        let pending = chat.record_selection("OBC.800V").await.unwrap();
        assert_eq!(chat.snapshot().await.navigation_path, "OBC.800V");
        assert!(backend.calls().is_empty());

        assert!(chat.record_selection(CUSTOMIZE_BUTTON).await.is_none());
        assert_eq!(chat.form_state().await, FormState::CollectingPhone);

        chat.complete_selection(pending).await;
        assert_eq!(backend.calls(), vec![Call::Menu("OBC.800V".into())]);
    }
}
