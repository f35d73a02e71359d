//! Security-focused logging module to track authentication and authorization events

use std::collections::HashMap;
use tokio::sync::RwLock;

/// Types of security events to track
#[derive(Debug, Clone)]
pub enum SecurityEvent {
    // Authentication events
    AuthenticationFailed { user_id: Option<u64>, reason: String },
    AuthenticationSuccess { user_id: u64 },
    LoginFailed { username: String, reason: String },
    TokenValidationFailed { reason: String },

    // Authorization events
    PermissionDenied { user_id: u64, action: String },
    SelfModificationAttempt { user_id: u64 },
    ProtectedRoleDeletion { user_id: u64 },
}

impl SecurityEvent {
    /// Counter key of the event kind
    pub fn key(&self) -> &'static str {
        match self {
            SecurityEvent::AuthenticationFailed { .. } => "auth_failed",
            SecurityEvent::AuthenticationSuccess { .. } => "auth_success",
            SecurityEvent::LoginFailed { .. } => "login_failed",
            SecurityEvent::TokenValidationFailed { .. } => "token_validation_failed",
            SecurityEvent::PermissionDenied { .. } => "permission_denied",
            SecurityEvent::SelfModificationAttempt { .. } => "self_modification",
            SecurityEvent::ProtectedRoleDeletion { .. } => "protected_role_deletion",
        }
    }
}

/// Security logger for tracking and alerting on security events
pub struct SecurityLogger {
    event_counts: RwLock<HashMap<&'static str, usize>>,
    alert_thresholds: HashMap<&'static str, usize>,
}

impl SecurityLogger {
    /// Create a new security logger
    pub fn new() -> Self {
        let mut alert_thresholds = HashMap::new();
        alert_thresholds.insert("auth_failed", 10);
        alert_thresholds.insert("login_failed", 5);
        alert_thresholds.insert("token_validation_failed", 10);
        alert_thresholds.insert("permission_denied", 20);
        alert_thresholds.insert("self_modification", 3);
        alert_thresholds.insert("protected_role_deletion", 1);

        Self {
            event_counts: RwLock::new(HashMap::new()),
            alert_thresholds,
        }
    }

    /// Log a security event
    pub async fn log_event(&self, event: SecurityEvent) {
        let event_key = event.key();

        {
            let mut counts = self.event_counts.write().await;
            let count = counts.entry(event_key).or_insert(0);
            *count += 1;

            if let Some(&threshold) = self.alert_thresholds.get(event_key) {
                if *count % threshold == 0 {
                    log::error!(
                        "SECURITY ALERT: {} events of type '{}' detected, latest: {:?}",
                        count,
                        event_key,
                        event
                    );
                }
            }
        }

        match event {
            SecurityEvent::AuthenticationFailed { user_id, reason } => {
                log::warn!("SECURITY: Authentication failed - User: {:?}, Reason: {}", user_id, reason);
            }
            SecurityEvent::AuthenticationSuccess { user_id } => {
                log::info!("SECURITY: Authentication success - User: {}", user_id);
            }
            SecurityEvent::LoginFailed { username, reason } => {
                log::warn!("SECURITY: Login failed - Username: {}, Reason: {}", username, reason);
            }
            SecurityEvent::TokenValidationFailed { reason } => {
                log::warn!("SECURITY: Token validation failed - Reason: {}", reason);
            }
            SecurityEvent::PermissionDenied { user_id, action } => {
                log::warn!("SECURITY: Permission denied - User: {}, Action: {}", user_id, action);
            }
            SecurityEvent::SelfModificationAttempt { user_id } => {
                log::warn!("SECURITY: User {} tried to modify itself through the admin path", user_id);
            }
            SecurityEvent::ProtectedRoleDeletion { user_id } => {
                log::error!("SECURITY: User {} tried to delete the administrator role", user_id);
            }
        }
    }

    /// Get event statistics
    pub async fn get_event_stats(&self) -> HashMap<&'static str, usize> {
        self.event_counts.read().await.clone()
    }
}

impl Default for SecurityLogger {
    fn default() -> Self {
        Self::new()
    }
}
