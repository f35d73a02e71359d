//! HTTP endpoints of the agenda service
//!
//! Every route is a warp filter. Guards run after path and method matching,
//! so a rejected token never hides a 404 of an unrelated path.

pub mod calendar;
pub mod groups;
pub mod roles;
pub mod users;

use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use warp::filters::BoxedFilter;
use warp::reply::Response;
use warp::{Filter, Rejection, Reply};

use crate::auth::{AccessGuard, Subject, TokenManager};
use crate::config::ServerConfig;
use crate::error::{AgendaError, Result};
use crate::response::{failure, success, HttpCode, Messages};
use crate::security_logger::SecurityLogger;
use crate::storage::StorageProvider;

/// Everything a request handler can reach
pub struct AppState {
    pub config: ServerConfig,
    pub tokens: Arc<TokenManager>,
    pub store: Arc<dyn StorageProvider>,
    pub security: Arc<SecurityLogger>,
    pub guard: AccessGuard,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(config: ServerConfig, store: Arc<dyn StorageProvider>) -> Self {
        let tokens = Arc::new(TokenManager::from_config(&config));
        let security = Arc::new(SecurityLogger::new());
        let guard = AccessGuard::new(tokens.clone(), store.clone(), security.clone());
        Self {
            config,
            tokens,
            store,
            security,
            guard,
        }
    }

    pub fn shared(self) -> SharedState {
        Arc::new(self)
    }
}

/// Id of a freshly created row
#[derive(Debug, Serialize)]
pub struct Created {
    pub id: u64,
}

pub fn with_state(state: SharedState) -> impl Filter<Extract = (SharedState,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

/// AuthenticateOnly guard
pub fn with_subject(state: SharedState) -> impl Filter<Extract = (Subject,), Error = Rejection> + Clone {
    warp::header::optional::<String>("authorization")
        .and(with_state(state))
        .and_then(|header: Option<String>, state: SharedState| async move {
            state
                .guard
                .authenticate(header.as_deref())
                .await
                .map_err(warp::reject::custom)
        })
}

/// RequireAdmin guard
pub fn with_admin(state: SharedState) -> impl Filter<Extract = (Subject,), Error = Rejection> + Clone {
    warp::header::optional::<String>("authorization")
        .and(with_state(state))
        .and_then(|header: Option<String>, state: SharedState| async move {
            state
                .guard
                .require_admin(header.as_deref())
                .await
                .map_err(warp::reject::custom)
        })
}

/// Resolve a handler outcome into the response envelope
pub async fn respond<F>(handler: F) -> std::result::Result<Response, Infallible>
where
    F: Future<Output = Result<Response>>,
{
    Ok(match handler.await {
        Ok(response) => response,
        Err(e) => error_response(&e),
    })
}

pub fn error_response(err: &AgendaError) -> Response {
    if err.is_expected() {
        log::debug!("Request refused: {}", err);
    } else {
        log::error!("Request failed: {}", err);
    }
    failure(err.code(), err.public_messages())
}

/// Treats empty strings like absent fields
pub(crate) fn required(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Full route table with rejection recovery and request logging
pub fn routes(state: SharedState) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let health = warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(|state: SharedState| respond(health_check(state)));

    users::routes(state.clone())
        .or(roles::routes(state.clone()))
        .unify()
        .or(groups::routes(state.clone()))
        .unify()
        .or(calendar::routes(state))
        .unify()
        .or(health)
        .unify()
        .recover(handle_rejection)
        .unify()
        .with(warp::log::custom(log_request))
}

async fn health_check(state: SharedState) -> Result<Response> {
    if !state.store.health_check().await? {
        return Err(AgendaError::StoreUnavailable("health check failed".to_string()));
    }
    Ok(success("OK", Messages::success()))
}

/// Turns every rejection into the response envelope
pub async fn handle_rejection(err: Rejection) -> std::result::Result<Response, Infallible> {
    if let Some(e) = err.find::<AgendaError>() {
        return Ok(error_response(e));
    }

    if let Some(e) = err.find::<warp::body::BodyDeserializeError>() {
        log::debug!("Malformed request body: {}", e);
        return Ok(failure(
            HttpCode::BadRequest,
            Messages::new("Corps de requête invalide", "Invalid request body"),
        ));
    }

    if err.find::<warp::reject::UnsupportedMediaType>().is_some()
        || err.find::<warp::reject::InvalidQuery>().is_some()
        || err.find::<warp::reject::InvalidHeader>().is_some()
    {
        return Ok(failure(
            HttpCode::BadRequest,
            Messages::new("Requête invalide", "Invalid request"),
        ));
    }

    if err.is_not_found() || err.find::<warp::reject::MethodNotAllowed>().is_some() {
        return Ok(failure(
            HttpCode::NotFound,
            Messages::new(
                "La ressource demandée n'existe pas.",
                "The requested resource does not exist.",
            ),
        ));
    }

    log::error!("Unhandled rejection: {:?}", err);
    Ok(failure(
        HttpCode::InternalError,
        Messages::new("Erreur interne du serveur", "Internal server error"),
    ))
}

fn log_request(info: warp::log::Info<'_>) {
    let status = info.status();
    if status.is_server_error() {
        log::error!(
            "{} {} {} ({:?})",
            info.method(),
            info.path(),
            status.as_u16(),
            info.elapsed()
        );
    } else if status.is_client_error() {
        log::warn!(
            "{} {} {} ({:?})",
            info.method(),
            info.path(),
            status.as_u16(),
            info.elapsed()
        );
    } else {
        log::info!(
            "{} {} {} ({:?})",
            info.method(),
            info.path(),
            status.as_u16(),
            info.elapsed()
        );
    }
}

/// Route set of one endpoint module
pub(crate) type Routes = BoxedFilter<(Response,)>;
