use crate::backend::MenuButton;
use crate::render;
use crate::view::ChatView;
use serde::Serialize;
use std::sync::Arc;

pub type EntryId = u64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntryContent {
    Bot { text: String },
    User { text: String },
    ButtonGroup { buttons: Vec<MenuButton> },
    Graph { model_name: String, image_url: String },
    Loading,
}

impl EntryContent {
    pub fn bot(text: impl Into<String>) -> Self {
        EntryContent::Bot { text: text.into() }
    }

    pub fn user(text: impl Into<String>) -> Self {
        EntryContent::User { text: text.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranscriptEntry {
    pub id: EntryId,
    pub timestamp: String,
    pub content: EntryContent,
}

impl TranscriptEntry {
    pub fn render_html(&self) -> String {
        match &self.content {
            EntryContent::Bot { text } => render::bot_message_html(text, &self.timestamp),
            EntryContent::User { text } => render::user_message_html(text, &self.timestamp),
            EntryContent::ButtonGroup { buttons } => render::buttons_html(buttons),
            EntryContent::Graph {
                model_name,
                image_url,
            } => render::cooling_graph_html(model_name, image_url, &self.timestamp),
            EntryContent::Loading => render::loading_html(self.id, &self.timestamp),
        }
    }
}

/// Append-only chat log. Loading placeholders are the only entries ever removed.
pub struct TranscriptStore {
    entries: Vec<TranscriptEntry>,
    next_id: EntryId,
    view: Arc<dyn ChatView>,
}

impl TranscriptStore {
    pub fn new(view: Arc<dyn ChatView>) -> Self {
        Self {
            entries: Vec::new(),
            next_id: 1,
            view,
        }
    }

    pub fn append(&mut self, content: EntryContent) -> EntryId {
        let id = self.next_id;
        self.next_id += 1;
        let entry = TranscriptEntry {
            id,
            timestamp: render::current_time(),
            content,
        };
        self.view.entry_appended(&entry);
        self.entries.push(entry);
        id
    }

    /// Remove the loading placeholder `id`. Other entry kinds are left alone.
    pub fn remove_loading(&mut self, id: EntryId) -> bool {
        let Some(pos) = self
            .entries
            .iter()
            .position(|e| e.id == id && e.content == EntryContent::Loading)
        else {
            return false;
        };
        self.entries.remove(pos);
        self.view.entry_removed(id);
        true
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.view.cleared();
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last_button_group(&self) -> Option<&[MenuButton]> {
        self.entries.iter().rev().find_map(|e| match &e.content {
            EntryContent::ButtonGroup { buttons } => Some(buttons.as_slice()),
            _ => None,
        })
    }

    pub fn to_html(&self) -> String {
        let body: String = self.entries.iter().map(TranscriptEntry::render_html).collect();
        format!("<div id=\"messageFormeight\" class=\"card-body msg_card_body\">{body}</div>")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::NullView;

    fn store() -> TranscriptStore {
        TranscriptStore::new(Arc::new(NullView))
    }

    #[test]
    fn ids_increase_and_order_is_kept() {
        let mut t = store();
        let a = t.append(EntryContent::bot("hi"));
        let b = t.append(EntryContent::user("hello"));
        assert!(b > a);
        let kinds: Vec<_> = t.entries().iter().map(|e| e.id).collect();
        assert_eq!(kinds, vec![a, b]);
    }

    #[test]
    fn only_loading_entries_are_removable() {
        let mut t = store();
        let bot = t.append(EntryContent::bot("hi"));
        let loading = t.append(EntryContent::Loading);
        assert!(!t.remove_loading(bot));
        assert!(t.remove_loading(loading));
        assert!(!t.remove_loading(loading));
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn last_button_group_is_most_recent() {
        let mut t = store();
        t.append(EntryContent::ButtonGroup {
            buttons: vec![MenuButton::new("Inverter", "inverter")],
        });
        t.append(EntryContent::bot("Please select an option for Inverter:"));
        t.append(EntryContent::ButtonGroup {
            buttons: vec![MenuButton::new("Traction Inverter", "inverter.traction_inverter")],
        });
        assert_eq!(
            t.last_button_group().unwrap()[0].value,
            "inverter.traction_inverter"
        );
    }

    #[test]
    fn html_contains_every_entry() {
        let mut t = store();
        t.append(EntryContent::bot("<p>Welcome</p>"));
        t.append(EntryContent::user("a < b"));
        t.append(EntryContent::Graph {
            model_name: "OBC.450V".into(),
            image_url: "/static/cooling_graphs/OBC_450V.png".into(),
        });
        let html = t.to_html();
        assert!(html.contains("<p>Welcome</p>"));
        assert!(html.contains("a &lt; b"));
        assert!(html.contains("cooling performance graph for OBC.450V"));
    }

    #[test]
    fn clear_empties_but_keeps_id_sequence() {
        let mut t = store();
        let first = t.append(EntryContent::bot("one"));
        t.clear();
        assert!(t.is_empty());
        assert!(t.append(EntryContent::bot("two")) > first);
    }
}
