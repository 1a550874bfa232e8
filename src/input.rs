use serde::Serialize;

pub const DEFAULT_PLACEHOLDER: &str = "Type your message here...";

/// Input type hint for the message field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    #[default]
    Text,
    Tel,
    Email,
}

impl InputKind {
    pub fn html_type(self) -> &'static str {
        match self {
            InputKind::Text => "text",
            InputKind::Tel => "tel",
            InputKind::Email => "email",
        }
    }
}

/// The message field and its send control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InputField {
    pub value: String,
    pub kind: InputKind,
    pub placeholder: String,
    pub send_enabled: bool,
}

impl Default for InputField {
    fn default() -> Self {
        Self {
            value: String::new(),
            kind: InputKind::Text,
            placeholder: DEFAULT_PLACEHOLDER.to_string(),
            send_enabled: false,
        }
    }
}

impl InputField {
    pub fn set_value(&mut self, value: impl Into<String>) {
        self.value = value.into();
        self.send_enabled = !self.value.trim().is_empty();
    }

    pub fn clear(&mut self) {
        self.set_value(String::new());
    }

    pub fn set_affordance(&mut self, kind: InputKind, placeholder: &str) {
        self.kind = kind;
        self.placeholder = placeholder.to_string();
    }

    pub fn restore_default_affordance(&mut self) {
        self.set_affordance(InputKind::Text, DEFAULT_PLACEHOLDER);
    }
}
