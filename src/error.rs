use std::error::Error;
use std::fmt;

use crate::response::{HttpCode, Messages};

#[derive(Debug)]
pub enum AgendaError {
    // Auth errors
    MissingToken,
    InvalidToken(String),
    InvalidCredentials,
    SubjectNotFound(u64),
    InsufficientCapability(Messages),

    // Request errors
    Validation(Messages),
    NotFound(Messages),
    Conflict(Messages),

    // Store errors
    StoreUnavailable(String),

    // System errors
    Internal(String),

    // Configuration errors
    ConfigError(String),
}

impl AgendaError {
    /// Shorthand for a 400 with a bilingual message
    pub fn validation(fr: &str, en: &str) -> Self {
        Self::Validation(Messages::new(fr, en))
    }

    pub fn not_found(fr: &str, en: &str) -> Self {
        Self::NotFound(Messages::new(fr, en))
    }

    pub fn conflict(fr: &str, en: &str) -> Self {
        Self::Conflict(Messages::new(fr, en))
    }

    pub fn forbidden(fr: &str, en: &str) -> Self {
        Self::InsufficientCapability(Messages::new(fr, en))
    }

    /// Status code the error is answered with
    pub fn code(&self) -> HttpCode {
        match self {
            Self::MissingToken | Self::InvalidToken(_) | Self::InvalidCredentials => {
                HttpCode::Unauthorized
            }
            Self::SubjectNotFound(_) => HttpCode::NotFound,
            Self::InsufficientCapability(_) => HttpCode::Forbidden,
            Self::Validation(_) => HttpCode::BadRequest,
            Self::NotFound(_) => HttpCode::NotFound,
            Self::Conflict(_) => HttpCode::Conflict,
            Self::StoreUnavailable(_) | Self::Internal(_) | Self::ConfigError(_) => {
                HttpCode::InternalError
            }
        }
    }

    /// Messages safe to hand back to the caller. Internal failures never
    /// leak their detail.
    pub fn public_messages(&self) -> Messages {
        match self {
            Self::MissingToken => {
                Messages::new("Token manquant ou mal formé", "Missing or malformed token")
            }
            Self::InvalidToken(_) => Messages::new("Token invalide", "Invalid token"),
            Self::InvalidCredentials => Messages::new(
                "Nom d'utilisateur ou mot de passe incorrect",
                "Username or password is incorrect",
            ),
            Self::SubjectNotFound(_) => {
                Messages::new("Utilisateur non trouvé", "User not found")
            }
            Self::InsufficientCapability(messages)
            | Self::Validation(messages)
            | Self::NotFound(messages)
            | Self::Conflict(messages) => messages.clone(),
            Self::StoreUnavailable(_) | Self::Internal(_) | Self::ConfigError(_) => {
                Messages::new("Erreur interne du serveur", "Internal server error")
            }
        }
    }

    /// Whether the error is an expected, user-facing outcome
    pub fn is_expected(&self) -> bool {
        !matches!(
            self,
            Self::StoreUnavailable(_) | Self::Internal(_) | Self::ConfigError(_)
        )
    }
}

impl fmt::Display for AgendaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingToken => write!(f, "Missing or malformed bearer token"),
            Self::InvalidToken(reason) => write!(f, "Invalid token: {}", reason),
            Self::InvalidCredentials => write!(f, "Invalid credentials"),
            Self::SubjectNotFound(id) => write!(f, "Subject not found: {}", id),
            Self::InsufficientCapability(messages) => {
                write!(f, "Forbidden: {}", messages.en)
            }
            Self::Validation(messages) => write!(f, "Validation error: {}", messages.en),
            Self::NotFound(messages) => write!(f, "Not found: {}", messages.en),
            Self::Conflict(messages) => write!(f, "Conflict: {}", messages.en),
            Self::StoreUnavailable(msg) => write!(f, "Store unavailable: {}", msg),
            Self::Internal(msg) => write!(f, "Internal error: {}", msg),
            Self::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl Error for AgendaError {}

impl warp::reject::Reject for AgendaError {}

impl From<sqlx::Error> for AgendaError {
    fn from(err: sqlx::Error) -> Self {
        AgendaError::StoreUnavailable(err.to_string())
    }
}

impl From<argon2::password_hash::Error> for AgendaError {
    fn from(err: argon2::password_hash::Error) -> Self {
        AgendaError::Internal(format!("Password hashing failed: {}", err))
    }
}

// Generic result type for the agenda service
pub type Result<T> = std::result::Result<T, AgendaError>;
