//! Shared notes and an assistant to search them, for Wendy and Daniel.

use std::sync::Arc;

use sqlx::SqlitePool;

pub mod auth;
pub mod chat;
pub mod config;
pub mod conversations;
pub mod credentials;
pub mod db;
pub mod error;
pub mod handler;
pub mod inference;
pub mod model;
pub mod notes;
pub mod sessions;

pub use handler::configure;

use config::{BootstrapPasswords, ChatSettings};
use inference::CompletionClient;

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub inference: Arc<dyn CompletionClient>,
    pub chat: ChatSettings,
    pub bootstrap: BootstrapPasswords,
    pub cookie_secure: bool,
}

impl AppState {
    pub fn new(db: SqlitePool, inference: Arc<dyn CompletionClient>) -> Self {
        AppState {
            db,
            inference,
            chat: ChatSettings::default(),
            bootstrap: BootstrapPasswords::default(),
            cookie_secure: false,
        }
    }

    pub fn with_chat(mut self, chat: ChatSettings) -> Self {
        self.chat = chat;
        self
    }

    pub fn with_bootstrap(mut self, bootstrap: BootstrapPasswords) -> Self {
        self.bootstrap = bootstrap;
        self
    }

    pub fn with_secure_cookies(mut self, secure: bool) -> Self {
        self.cookie_secure = secure;
        self
    }
}
