use crate::input::InputKind;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

pub const PHONE_PROMPT: &str = "Please enter your mobile number:";
pub const PHONE_PLACEHOLDER: &str = "Enter your mobile number";
pub const EMAIL_PROMPT: &str = "Great! Now please enter your email address:";
pub const EMAIL_PLACEHOLDER: &str = "Enter your email";
pub const DESCRIPTION_PROMPT: &str =
    "Excellent! Finally, please describe the product customization you're looking for:";
pub const DESCRIPTION_PLACEHOLDER: &str = "Enter your requirements";
pub const INVALID_PHONE: &str = "Please enter a valid mobile number.";
pub const INVALID_EMAIL: &str = "Please enter a valid email address.";
pub const THANK_YOU: &str =
    "Thank you for providing your information! Our team will contact you soon.";

static PHONE_SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[-\s]").expect("phone separator regex"));
static TEN_DIGITS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{10}$").expect("phone digits regex"));
static EMAIL_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email regex"));

/// Ten digits once dashes and whitespace are removed.
pub fn validate_phone(phone: &str) -> bool {
    TEN_DIGITS.is_match(&PHONE_SEPARATORS.replace_all(phone, ""))
}

pub fn validate_email(email: &str) -> bool {
    EMAIL_SHAPE.is_match(email)
}

/// Lead-capture record posted to the customize-data endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomizeRecord {
    pub phone: String,
    pub email: String,
    pub description: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FormState {
    #[default]
    Inactive,
    CollectingPhone,
    CollectingEmail,
    CollectingDescription,
}

/// What the controller must do after the form consumed a line of input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormStep {
    /// Show `prompt` and switch the input affordance.
    Prompt {
        prompt: &'static str,
        kind: InputKind,
        placeholder: &'static str,
    },
    /// Validation failed; state unchanged.
    Reprompt(&'static str),
    /// Description captured; the record is ready to submit and the form is inactive again.
    Complete(CustomizeRecord),
    /// The form was not collecting anything.
    Inactive,
}

/// phone → email → description, strictly forward.
#[derive(Debug, Default)]
pub struct FormCapture {
    state: FormState,
    record: CustomizeRecord,
}

impl FormCapture {
    pub fn state(&self) -> FormState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state != FormState::Inactive
    }

    /// Enter the flow at the phone question. While already collecting, the
    /// current question is asked again instead.
    pub fn begin(&mut self) -> FormStep {
        match self.state {
            FormState::Inactive => {
                self.record = CustomizeRecord::default();
                self.state = FormState::CollectingPhone;
                Self::prompt_for(FormState::CollectingPhone)
            }
            current => Self::prompt_for(current),
        }
    }

    pub fn process_input(&mut self, input: &str) -> FormStep {
        match self.state {
            FormState::Inactive => FormStep::Inactive,
            FormState::CollectingPhone => {
                if !validate_phone(input) {
                    return FormStep::Reprompt(INVALID_PHONE);
                }
                self.record.phone = input.to_string();
                self.state = FormState::CollectingEmail;
                Self::prompt_for(self.state)
            }
            FormState::CollectingEmail => {
                if !validate_email(input) {
                    return FormStep::Reprompt(INVALID_EMAIL);
                }
                self.record.email = input.to_string();
                self.state = FormState::CollectingDescription;
                Self::prompt_for(self.state)
            }
            FormState::CollectingDescription => {
                self.record.description = input.to_string();
                self.state = FormState::Inactive;
                FormStep::Complete(std::mem::take(&mut self.record))
            }
        }
    }

    pub fn reset(&mut self) {
        self.state = FormState::Inactive;
        self.record = CustomizeRecord::default();
    }

    fn prompt_for(state: FormState) -> FormStep {
        let (prompt, kind, placeholder) = match state {
            FormState::CollectingPhone => (PHONE_PROMPT, InputKind::Tel, PHONE_PLACEHOLDER),
            FormState::CollectingEmail => (EMAIL_PROMPT, InputKind::Email, EMAIL_PLACEHOLDER),
            FormState::CollectingDescription => {
                (DESCRIPTION_PROMPT, InputKind::Text, DESCRIPTION_PLACEHOLDER)
            }
            FormState::Inactive => return FormStep::Inactive,
        };
        FormStep::Prompt {
            prompt,
            kind,
            placeholder,
        }
    }
}
