//! Abstract storage interfaces for pluggable backends
//!
//! This module defines the records the service persists and one trait per
//! concern (users, memberships, roles, groups, calendar events). Every
//! backend implements all of them and exposes them through `StorageProvider`.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Login material for a user
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserCredentials {
    pub id: u64,
    pub username: String,
    pub password_hash: String,
}

/// User with the label of its role
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserProfile {
    pub id: u64,
    pub username: String,
    pub role_label: String,
    pub role_id: u64,
}

/// User with the full records of its groups, as listed to administrators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserWithGroups {
    pub id: u64,
    pub username: String,
    pub role_label: String,
    pub role_id: u64,
    pub groups: Vec<Group>,
}

/// User to insert; the password is already hashed
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub password_hash: String,
    pub role_id: u64,
    /// Initial memberships, without duplicates
    pub groups: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Role {
    pub id: u64,
    pub label: String,
    /// Delimited capability tags, e.g. "read,write"
    pub permission: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoleDraft {
    pub label: String,
    pub permission: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Group {
    pub id: u64,
    pub label: String,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupDraft {
    pub label: String,
    pub color: String,
}

/// Id and label of a group, as shown on a user's own profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct GroupSummary {
    pub id: u64,
    pub label: String,
}

/// Calendar event joined with its group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct CalendarEvent {
    pub id: u64,
    pub title: String,
    pub color: String,
    pub group_label: String,
    pub group_id: u64,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

/// Writable fields of an event
#[derive(Debug, Clone, PartialEq)]
pub struct EventDraft {
    pub title: String,
    pub group_id: u64,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

/// User data storage interface
#[async_trait]
pub trait UserStorage: Send + Sync {
    /// Get login material by username
    async fn find_credentials(&self, username: &str) -> Result<Option<UserCredentials>>;

    /// Check that a user id still exists
    async fn user_exists(&self, user_id: u64) -> Result<bool>;

    async fn username_taken(&self, username: &str) -> Result<bool>;

    /// Create a new user with its memberships and return its id. Either
    /// both are stored or neither is.
    async fn create_user(&self, user: NewUser) -> Result<u64>;

    /// Get user by ID
    async fn get_user(&self, user_id: u64) -> Result<Option<UserProfile>>;

    /// All users with their groups, ordered by user id then group label
    async fn list_users(&self) -> Result<Vec<UserWithGroups>>;

    async fn update_user(&self, user_id: u64, username: &str, role_id: u64) -> Result<()>;

    /// Delete a user together with its memberships
    async fn delete_user(&self, user_id: u64) -> Result<()>;

    /// Raw permission descriptor of the user's role, `None` when the user
    /// or its role does not exist
    async fn role_permission(&self, user_id: u64) -> Result<Option<String>>;
}

/// User <-> group association storage interface
#[async_trait]
pub trait MembershipStorage: Send + Sync {
    /// Ids of the groups a user belongs to
    async fn group_ids(&self, user_id: u64) -> Result<Vec<u64>>;

    /// Id and label of the groups a user belongs to
    async fn groups_of(&self, user_id: u64) -> Result<Vec<GroupSummary>>;

    /// Drop every membership of the user, then add `group_ids`
    async fn replace_memberships(&self, user_id: u64, group_ids: &[u64]) -> Result<()>;
}

/// Role storage interface
#[async_trait]
pub trait RoleStorage: Send + Sync {
    async fn list_roles(&self) -> Result<Vec<Role>>;

    async fn get_role(&self, role_id: u64) -> Result<Option<Role>>;

    async fn role_label_exists(&self, label: &str) -> Result<bool>;

    async fn create_role(&self, role: RoleDraft) -> Result<u64>;

    /// Returns false when no role has this id
    async fn update_role(&self, role_id: u64, role: RoleDraft) -> Result<bool>;

    /// Returns false when no role has this id
    async fn delete_role(&self, role_id: u64) -> Result<bool>;

    /// Whether any user still references the role
    async fn role_in_use(&self, role_id: u64) -> Result<bool>;
}

/// Group storage interface
#[async_trait]
pub trait GroupStorage: Send + Sync {
    async fn list_groups(&self) -> Result<Vec<Group>>;

    async fn get_group(&self, group_id: u64) -> Result<Option<Group>>;

    async fn group_label_exists(&self, label: &str) -> Result<bool>;

    /// Whether every id names an existing group
    async fn groups_exist(&self, group_ids: &[u64]) -> Result<bool>;

    async fn create_group(&self, group: GroupDraft) -> Result<u64>;

    /// Returns false when no group has this id
    async fn update_group(&self, group_id: u64, group: GroupDraft) -> Result<bool>;

    /// Returns false when no group has this id. Memberships go with it.
    async fn delete_group(&self, group_id: u64) -> Result<bool>;

    /// Whether any event is still attached to the group
    async fn group_has_events(&self, group_id: u64) -> Result<bool>;
}

/// Calendar event storage interface
#[async_trait]
pub trait EventStorage: Send + Sync {
    async fn create_event(&self, event: EventDraft, author_id: u64) -> Result<u64>;

    async fn get_event(&self, event_id: u64) -> Result<Option<CalendarEvent>>;

    /// Returns false when no event has this id
    async fn update_event(&self, event_id: u64, event: EventDraft) -> Result<bool>;

    /// Returns false when no event has this id
    async fn delete_event(&self, event_id: u64) -> Result<bool>;

    /// Events with `start <= range_end` and `end >= range_start`, restricted
    /// to `groups` when given
    async fn events_overlapping(
        &self,
        range_start: NaiveDateTime,
        range_end: NaiveDateTime,
        groups: Option<&[u64]>,
    ) -> Result<Vec<CalendarEvent>>;

    async fn all_events(&self) -> Result<Vec<CalendarEvent>>;
}

/// Combined storage provider interface
#[async_trait]
pub trait StorageProvider: Send + Sync {
    fn users(&self) -> &dyn UserStorage;

    fn memberships(&self) -> &dyn MembershipStorage;

    fn roles(&self) -> &dyn RoleStorage;

    fn groups(&self) -> &dyn GroupStorage;

    fn events(&self) -> &dyn EventStorage;

    /// Initialize the storage backend (create tables, seed the admin role)
    async fn initialize(&self) -> Result<()>;

    /// Health check for the storage backend
    async fn health_check(&self) -> Result<bool>;
}
