use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

use crate::credentials::CredentialError;
use crate::inference::InferenceError;

pub type AppResult<T> = Result<T, AppError>;

/// Every failure a handler can return. The `Display` text of the client-facing
/// variants is what ends up in the `{"error": ...}` body.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Unauthenticated(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Configuration(String),
    #[error("upstream failure: {0}")]
    Upstream(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        AppError::NotFound(message.into())
    }

    pub fn unauthenticated() -> Self {
        AppError::Unauthenticated("Non authentifié".to_string())
    }

    fn public_message(&self) -> String {
        match self {
            AppError::Upstream(_) => "Erreur lors de la communication avec l'IA".to_string(),
            AppError::Database(_) | AppError::Internal(_) => {
                "Erreur interne du serveur".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Configuration(_)
            | AppError::Upstream(_)
            | AppError::Database(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            log::error!("{self}");
        }
        HttpResponse::build(status).json(json!({ "error": self.public_message() }))
    }
}

impl From<CredentialError> for AppError {
    fn from(err: CredentialError) -> Self {
        match err {
            CredentialError::InvalidUsername => AppError::validation("Utilisateur invalide"),
            CredentialError::InvalidPassword => {
                AppError::Unauthenticated("Mot de passe incorrect".to_string())
            }
            CredentialError::Hashing(detail) => AppError::Internal(detail),
            CredentialError::Database(e) => AppError::Database(e),
        }
    }
}

impl From<InferenceError> for AppError {
    fn from(err: InferenceError) -> Self {
        match err {
            InferenceError::NotConfigured => {
                AppError::Configuration("Configuration Cloudflare manquante".to_string())
            }
            other => AppError::Upstream(other.to_string()),
        }
    }
}
