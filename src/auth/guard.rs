//! Request gate composing token verification and capability checks
//!
//! A request moves through `Unauthenticated -> TokenPresent -> TokenValid ->
//! SubjectResolved` and ends `Authorized` or rejected. `authenticate` stops at
//! `SubjectResolved`; `require_admin` also demands the `admin` capability.

use std::sync::Arc;

use crate::auth::evaluator::PermissionEvaluator;
use crate::auth::token::{extract_bearer_token, TokenManager};
use crate::auth::user::{PermissionSet, Subject};
use crate::error::{AgendaError, Result};
use crate::security_logger::{SecurityEvent, SecurityLogger};
use crate::storage::StorageProvider;

pub struct AccessGuard {
    tokens: Arc<TokenManager>,
    evaluator: PermissionEvaluator,
    store: Arc<dyn StorageProvider>,
    security: Arc<SecurityLogger>,
}

impl AccessGuard {
    pub fn new(
        tokens: Arc<TokenManager>,
        store: Arc<dyn StorageProvider>,
        security: Arc<SecurityLogger>,
    ) -> Self {
        Self {
            tokens,
            evaluator: PermissionEvaluator::new(store.clone()),
            store,
            security,
        }
    }

    pub fn evaluator(&self) -> &PermissionEvaluator {
        &self.evaluator
    }

    /// Authenticate only: the bearer token must verify and its subject must
    /// still exist
    pub async fn authenticate(&self, auth_header: Option<&str>) -> Result<Subject> {
        let token = match auth_header.and_then(extract_bearer_token) {
            Some(token) => token,
            None => {
                self.security
                    .log_event(SecurityEvent::AuthenticationFailed {
                        user_id: None,
                        reason: "missing or malformed bearer header".to_string(),
                    })
                    .await;
                return Err(AgendaError::MissingToken);
            }
        };

        let subject_id = match self.tokens.verify(token) {
            Ok(id) => id,
            Err(e) => {
                self.security
                    .log_event(SecurityEvent::TokenValidationFailed {
                        reason: e.to_string(),
                    })
                    .await;
                return Err(e);
            }
        };

        if !self.store.users().user_exists(subject_id).await? {
            self.security
                .log_event(SecurityEvent::TokenValidationFailed {
                    reason: format!("subject {} no longer exists", subject_id),
                })
                .await;
            return Err(AgendaError::InvalidToken(format!(
                "subject {} no longer exists",
                subject_id
            )));
        }

        Ok(Subject::new(subject_id))
    }

    /// Authenticate, then require the `admin` capability
    pub async fn require_admin(&self, auth_header: Option<&str>) -> Result<Subject> {
        let subject = self.authenticate(auth_header).await?;

        let permissions = match self.evaluator.resolve_permissions(subject.id).await {
            Ok(permissions) => permissions,
            Err(AgendaError::SubjectNotFound(id)) => {
                return Err(AgendaError::InvalidToken(format!(
                    "subject {} has no role",
                    id
                )))
            }
            Err(e) => return Err(e),
        };

        if !permissions.is_admin() {
            self.security
                .log_event(SecurityEvent::PermissionDenied {
                    user_id: subject.id,
                    action: "admin".to_string(),
                })
                .await;
            return Err(AgendaError::forbidden("Accès interdit", "Access forbidden"));
        }

        Ok(subject)
    }

    /// Permissions of an already authenticated subject
    pub async fn permissions(&self, subject: &Subject) -> Result<PermissionSet> {
        self.evaluator.resolve_permissions(subject.id).await
    }

    /// Rejects a subject trying to modify itself through the admin update path
    pub async fn forbid_self_modification(&self, subject: &Subject, target_id: u64) -> Result<()> {
        if subject.id == target_id {
            self.security
                .log_event(SecurityEvent::SelfModificationAttempt { user_id: subject.id })
                .await;
            return Err(AgendaError::forbidden(
                "Vous ne pouvez pas modifier cet utilisateur",
                "You cannot modify this user",
            ));
        }
        Ok(())
    }
}
