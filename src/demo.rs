use crate::backend::{
    COOLING_GRAPH_TYPE, CoolingGraphPayload, Greeting, MenuButton, MenuLevel, SubmitAck,
};
use crate::form::CustomizeRecord;
use crate::render::escape_html;
use anyhow::Context;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Form, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

pub const GREETING: &str =
    "👋 Hello! How can REFU Ai assist you today? Please select a category to explore:";
pub const UNKNOWN_PRODUCT: &str =
    "I couldn't find information about that specific product. Please try another query.";
pub const COOLING_FOLLOW_UP: &str =
    "Would you like to see the cooling performance graph for this model?";
const PRODUCT_PREFIX: &str = "Tell me about ";
const GRAPH_REQUESTS: [&str; 3] = ["yes", "yes please", "show graph"];
const COOLING_TERMS: [&str; 3] = ["cooling", "temperature", "thermal"];

/// One node of the product menu tree.
#[derive(Debug)]
pub struct MenuNode {
    pub key: &'static str,
    pub label: &'static str,
    pub children: &'static [MenuNode],
}

macro_rules! menu {
    (@children) => { &[] };
    (@children [$($inner:tt)*]) => { menu!($($inner)*) };
    ($($key:literal => $label:literal $([$($inner:tt)*])?),* $(,)?) => {
        &[$(MenuNode {
            key: $key,
            label: $label,
            children: menu!(@children $([$($inner)*])?),
        }),*]
    };
}

pub static HIERARCHY: &[MenuNode] = menu![
    "inverter" => "Inverter" [
        "aux_inverter" => "Auxiliary Inverter" [
            "single_inverter" => "Single Inverter" [
                "17kva" => "17 kVA",
                "28kva" => "28 kVA",
            ],
            "Dual_inverter" => "Dual Inverter" [
                "2x15kva" => "2x15 kVA",
                "2x17kva" => "2x17 kVA",
                "2x28kva" => "2x28 kVA",
                "2x30kva" => "2x30 kVA",
                "2x55kva" => "2x55 kVA",
            ],
        ],
        "traction_inverter" => "Traction Inverter" [
            "80kva" => "80 kVA",
            "160kva" => "160 kVA",
            "150kva" => "150 kVA",
            "320kva" => "320 kVA",
            "320kva-HPP" => "320 kVA-HPP",
        ],
        "combi_inverter" => "Combi Inverter" [
            "17k3k" => "17k3k",
        ],
        "cabinet_inverter" => "Cabinet Inverter" [
            "8kva" => "8 kVA",
            "22kva" => "22 kVA",
            "55kva" => "55 kVA",
            "90kva" => "90 kVA",
            "200kva" => "200 kVA",
        ],
    ],
    "DC_DC" => "DC-DC" [
        "4kw-900" => "4kW-900",
        "6kw-750" => "6kW-750",
    ],
    "OBC" => "On-Board Charger" [
        "450V" => "450V",
        "800V" => "800V",
        "850V" => "850V",
    ],
    "BCS" => "Battery charging station" [
        "IP68housing" => "IP 68 housing",
        "Cabinet/Component" => "Cabinet/Component",
    ],
    "Customize" => "Customize Product",
];

/// Walk a dotted path. Segments that match nothing are skipped, so an
/// unknown path resolves to the deepest level that did match.
fn resolve(path: &str) -> (&'static [MenuNode], Vec<&'static str>) {
    let mut level = HIERARCHY;
    let mut labels = Vec::new();
    if path.is_empty() {
        return (level, labels);
    }
    for part in path.split('.') {
        if let Some(found) = level.iter().find(|n| n.key == part) {
            labels.push(found.label);
            level = found.children;
        }
    }
    (level, labels)
}

pub fn menu_level(selected: &str) -> MenuLevel {
    let (level, labels) = resolve(selected);
    let buttons = level
        .iter()
        .map(|n| {
            let value = if selected.is_empty() {
                n.key.to_string()
            } else {
                format!("{selected}.{}", n.key)
            };
            MenuButton::new(n.label, value)
        })
        .collect();
    MenuLevel {
        current_label: labels.last().copied().unwrap_or_default().to_string(),
        buttons,
        has_children: level.iter().any(|n| !n.children.is_empty()),
        pdf_url: None,
    }
}

/// Labels along a path joined with " - "; empty when nothing matches.
pub fn button_label(path: &str) -> String {
    resolve(path).1.join(" - ")
}

fn paragraphs(answer: &str) -> String {
    answer
        .split("\n\n")
        .map(|p| format!("<p>{p}</p>"))
        .collect()
}

pub fn cooling_image_url(path: &str) -> String {
    format!("/static/cooling_graphs/{}.png", path.replace('.', "_"))
}

/// In-memory stand-in for the chat service, used for local development.
#[derive(Debug, Clone, Default)]
pub struct DemoState {
    submissions: Arc<Mutex<Vec<CustomizeRecord>>>,
}

impl DemoState {
    pub async fn submissions(&self) -> Vec<CustomizeRecord> {
        self.submissions.lock().await.clone()
    }
}

pub fn router(state: DemoState, enable_cors: bool) -> Router {
    let app = Router::new()
        .route("/get_greeting", get(greeting))
        .route("/get", post(message))
        .route("/get_buttons", post(buttons))
        .route("/submit_customize_data", post(submit_customize))
        .with_state(state)
        .layer(TraceLayer::new_for_http());
    if enable_cors {
        app.layer(CorsLayer::permissive())
    } else {
        app
    }
}

pub async fn serve(addr: SocketAddr, state: DemoState, enable_cors: bool) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "starting demo chat backend");
    axum::serve(listener, router(state, enable_cors))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down demo chat backend");
        })
        .await
        .context("demo server failed")
}

async fn greeting() -> Json<Greeting> {
    Json(Greeting {
        greeting: GREETING.to_string(),
        buttons: menu_level("").buttons,
    })
}

#[derive(Debug, Deserialize)]
struct MessageForm {
    #[serde(default)]
    msg: String,
    #[serde(default)]
    button_path: String,
}

async fn message(Form(form): Form<MessageForm>) -> Response {
    let MessageForm { msg, button_path } = form;
    if msg.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "No message provided"})),
        )
            .into_response();
    }

    let lowered = msg.to_lowercase();
    if !button_path.is_empty() && GRAPH_REQUESTS.contains(&lowered.as_str()) {
        return Json(CoolingGraphPayload {
            kind: COOLING_GRAPH_TYPE.to_string(),
            model_name: button_path.clone(),
            cooling_image_url: cooling_image_url(&button_path),
        })
        .into_response();
    }

    let answer = if let Some(product) = msg.strip_prefix(PRODUCT_PREFIX) {
        let label = button_label(product);
        if label.is_empty() {
            warn!(%product, "unknown product requested");
            return (StatusCode::NOT_FOUND, Html(UNKNOWN_PRODUCT)).into_response();
        }
        format!(
            "{label}\n\nDetailed specifications and applications are listed in the product datasheet."
        )
    } else {
        let mut answer = match button_label(&button_path) {
            label if label.is_empty() => format!(
                "You asked: {}\n\nThis development backend has no knowledge base attached.",
                escape_html(&msg)
            ),
            label => format!(
                "You asked about {label}: {}\n\nThis development backend has no knowledge base attached.",
                escape_html(&msg)
            ),
        };
        if !button_path.is_empty() && COOLING_TERMS.iter().any(|t| lowered.contains(t)) {
            answer.push_str("\n\n");
            answer.push_str(COOLING_FOLLOW_UP);
        }
        answer
    };
    Html(paragraphs(&answer)).into_response()
}

#[derive(Debug, Deserialize)]
struct MenuForm {
    #[serde(default)]
    selected_button: String,
}

async fn buttons(Form(form): Form<MenuForm>) -> Json<MenuLevel> {
    Json(menu_level(&form.selected_button))
}

async fn submit_customize(
    State(state): State<DemoState>,
    payload: Result<Json<CustomizeRecord>, JsonRejection>,
) -> (StatusCode, Json<SubmitAck>) {
    match payload {
        Ok(Json(record)) => {
            info!(email = %record.email, "customize request stored");
            state.submissions.lock().await.push(record);
            (
                StatusCode::OK,
                Json(SubmitAck {
                    message: Some("Data stored successfully".into()),
                    error: None,
                }),
            )
        }
        Err(err) => {
            error!(%err, "error storing user data");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(SubmitAck {
                    message: None,
                    error: Some("Failed to store data".into()),
                }),
            )
        }
    }
}
