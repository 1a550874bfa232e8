//! Headless chat-widget controller for the REFU product assistant.
//!
//! [`controller::ChatController`] owns one chat session: the transcript, menu
//! navigation, the lead-capture form and the input field. Front-ends render
//! through [`view::ChatView`]; the service is reached through
//! [`backend::ChatBackend`].

pub mod backend;
pub mod catalog;
pub mod config;
pub mod controller;
pub mod demo;
pub mod form;
pub mod input;
pub mod navigation;
pub mod render;
pub mod submission;
pub mod terminal;
pub mod transcript;
pub mod view;
pub mod voice;
