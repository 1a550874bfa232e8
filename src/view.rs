use crate::input::InputField;
use crate::transcript::{EntryId, TranscriptEntry};

/// Rendering seam for the widget. Transcript and input callbacks run while
/// the session is locked; implementations must not call back into the
/// controller.
pub trait ChatView: Send + Sync {
    fn entry_appended(&self, _entry: &TranscriptEntry) {}
    fn entry_removed(&self, _id: EntryId) {}
    fn cleared(&self) {}
    fn input_changed(&self, _input: &InputField) {}
    fn listening_changed(&self, _listening: bool) {}
}

/// Headless view.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullView;

impl ChatView for NullView {}
