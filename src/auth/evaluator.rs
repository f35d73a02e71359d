//! Resolves a subject to the capabilities of its role

use std::sync::Arc;

use crate::auth::user::{Capability, PermissionSet};
use crate::error::{AgendaError, Result};
use crate::storage::StorageProvider;

pub struct PermissionEvaluator {
    store: Arc<dyn StorageProvider>,
}

impl PermissionEvaluator {
    pub fn new(store: Arc<dyn StorageProvider>) -> Self {
        Self { store }
    }

    /// Parsed permissions of the subject's role
    pub async fn resolve_permissions(&self, subject_id: u64) -> Result<PermissionSet> {
        match self.store.users().role_permission(subject_id).await? {
            Some(descriptor) => Ok(PermissionSet::parse(&descriptor)),
            None => Err(AgendaError::SubjectNotFound(subject_id)),
        }
    }

    /// False for unknown subjects and unknown tags
    pub async fn has_capability(&self, subject_id: u64, tag: &str) -> Result<bool> {
        match self.resolve_permissions(subject_id).await {
            Ok(permissions) => Ok(permissions.has_tag(tag)),
            Err(AgendaError::SubjectNotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn is_admin(&self, subject_id: u64) -> Result<bool> {
        self.has_capability(subject_id, Capability::Admin.as_str()).await
    }

    pub async fn can_write(&self, subject_id: u64) -> Result<bool> {
        self.has_capability(subject_id, Capability::Write.as_str()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStorage, NewUser, RoleDraft, RoleStorage, UserStorage};

    async fn subject_with(store: &MemoryStorage, descriptor: &str) -> u64 {
        let role_id = store
            .create_role(RoleDraft {
                label: format!("role-{}", descriptor),
                permission: descriptor.to_string(),
            })
            .await
            .unwrap();
        store
            .create_user(NewUser {
                username: format!("user-{}", descriptor),
                password_hash: "unused".to_string(),
                role_id,
                groups: Vec::new(),
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_write_role_probes() {
        let store = Arc::new(MemoryStorage::new());
        let subject = subject_with(&store, "write").await;
        let evaluator = PermissionEvaluator::new(store);

        assert!(!evaluator.has_capability(subject, "admin").await.unwrap());
        assert!(evaluator.has_capability(subject, "write").await.unwrap());
    }

    #[tokio::test]
    async fn test_admin_role_is_admin_and_writer() {
        let store = Arc::new(MemoryStorage::new());
        let subject = subject_with(&store, "read,admin").await;
        let evaluator = PermissionEvaluator::new(store);

        assert!(evaluator.is_admin(subject).await.unwrap());
        assert!(evaluator.can_write(subject).await.unwrap());
    }

    #[tokio::test]
    async fn test_unknown_subject() {
        let evaluator = PermissionEvaluator::new(Arc::new(MemoryStorage::new()));

        assert!(matches!(
            evaluator.resolve_permissions(99).await,
            Err(AgendaError::SubjectNotFound(99))
        ));
        assert!(!evaluator.is_admin(99).await.unwrap());
    }
}
