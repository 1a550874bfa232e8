//! HTML fragments for the chat log.
//!
//! Bot text is inserted verbatim because the message endpoint answers with
//! pre-formatted markup. User text and attribute values are escaped.

use crate::backend::MenuButton;

pub const BOT_AVATAR_URL: &str = "https://cdn-icons-png.flaticon.com/512/4712/4712100.png";

/// Local wall-clock time as HH:MM.
pub fn current_time() -> String {
    chrono::Local::now().format("%H:%M").to_string()
}

pub fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

fn avatar() -> String {
    format!(
        "<div class=\"img_cont_msg\"><img src=\"{BOT_AVATAR_URL}\" class=\"rounded-circle user_img_msg\" alt=\"AI Avatar\"></div>"
    )
}

pub fn bot_message_html(message: &str, time: &str) -> String {
    format!(
        "<div class=\"d-flex justify-content-start mb-4\">{}<div class=\"msg_cotainer\">{message}<span class=\"msg_time\">{time}</span></div></div>",
        avatar()
    )
}

pub fn user_message_html(message: &str, time: &str) -> String {
    format!(
        "<div class=\"d-flex justify-content-end mb-4\"><div class=\"msg_cotainer_send\">{}<span class=\"msg_time_send\">{time}</span></div></div>",
        escape_html(message)
    )
}

pub fn buttons_html(buttons: &[MenuButton]) -> String {
    let rendered: String = buttons
        .iter()
        .map(|button| {
            format!(
                "<button class=\"btn btn-primary m-1\" data-value=\"{}\">{}</button>",
                escape_html(&button.value),
                escape_html(&button.label)
            )
        })
        .collect();
    format!("<div class=\"d-flex justify-content-start mb-4 flex-wrap\">{rendered}</div>")
}

pub fn loading_html(entry_id: u64, time: &str) -> String {
    format!(
        "<div class=\"d-flex justify-content-start mb-4 loading-message\" data-entry-id=\"{entry_id}\">{}<div class=\"msg_cotainer loading-container\"><div class=\"loading-dots\"><span></span><span></span><span></span></div><span class=\"msg_time\">{time}</span></div></div>",
        avatar()
    )
}

pub fn cooling_graph_html(model_name: &str, image_url: &str, time: &str) -> String {
    format!(
        "<div class=\"d-flex justify-content-start mb-4\">{}<div class=\"msg_cotainer\"><p>Here's the cooling performance graph for {}:</p><img src=\"{}\" alt=\"Cooling Graph\" class=\"cooling-graph-img\"><span class=\"msg_time\">{time}</span></div></div>",
        avatar(),
        escape_html(model_name),
        escape_html(image_url)
    )
}

/// Body of the bot message shown when a leaf product is selected.
pub fn product_prompt_html(pdf_url: &str) -> String {
    format!(
        "<div class=\"product-info mb-3\"><p>You can find detailed specifications in the <a href=\"{}\" target=\"_blank\">product datasheet</a>.</p><p>Or type your specific question about this product below, and I'll help you find the information you need.</p></div>",
        escape_html(pdf_url)
    )
}
