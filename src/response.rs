//! Response envelope shared by every endpoint
//!
//! Every answer, success or failure, is a JSON object of the form
//! `{ "error": bool, "messages": { "fr": .., "en": .. }, "data"?: .. }`.

use serde::{Deserialize, Serialize};
use warp::http::StatusCode;
use warp::reply::Response;
use warp::Reply;

use crate::security::with_api_security_headers;

/// Bilingual message pair carried by every response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Messages {
    pub fr: String,
    pub en: String,
}

impl Messages {
    pub fn new(fr: &str, en: &str) -> Self {
        Self {
            fr: fr.to_string(),
            en: en.to_string(),
        }
    }

    pub fn success() -> Self {
        Self::new("Succès", "Success")
    }
}

/// Fixed set of statuses the service answers with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpCode {
    Ok,
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    Conflict,
    InternalError,
}

impl HttpCode {
    pub fn status(self) -> StatusCode {
        match self {
            HttpCode::Ok => StatusCode::OK,
            HttpCode::BadRequest => StatusCode::BAD_REQUEST,
            HttpCode::Unauthorized => StatusCode::UNAUTHORIZED,
            HttpCode::Forbidden => StatusCode::FORBIDDEN,
            HttpCode::NotFound => StatusCode::NOT_FOUND,
            HttpCode::Conflict => StatusCode::CONFLICT,
            HttpCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub error: bool,
    pub messages: Messages,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

/// 200 with `data` attached
pub fn success<T: Serialize>(data: T, messages: Messages) -> Response {
    let body = Envelope {
        error: false,
        messages,
        data: Some(data),
    };
    with_api_security_headers(warp::reply::with_status(
        warp::reply::json(&body),
        HttpCode::Ok.status(),
    ))
    .into_response()
}

/// Error envelope without `data`
pub fn failure(code: HttpCode, messages: Messages) -> Response {
    let body: Envelope<()> = Envelope {
        error: true,
        messages,
        data: None,
    };
    with_api_security_headers(warp::reply::with_status(
        warp::reply::json(&body),
        code.status(),
    ))
    .into_response()
}

/// Empty object used as `data` by mutating endpoints
#[derive(Debug, Serialize)]
pub struct Empty {}
