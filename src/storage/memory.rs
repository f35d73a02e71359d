//! In-memory storage implementation for development and testing
//!
//! Keeps every table in maps behind one lock and mirrors the relational
//! backend's semantics, including the seeded administrator role.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use std::collections::{BTreeMap, BTreeSet};
use tokio::sync::RwLock;

use super::traits::*;
use crate::constants::{ADMIN_ROLE_ID, ADMIN_ROLE_LABEL, ADMIN_ROLE_PERMISSION};
use crate::error::{AgendaError, Result};

#[derive(Debug, Clone)]
struct UserRow {
    username: String,
    password_hash: String,
    role_id: u64,
}

#[derive(Debug, Clone)]
struct EventRow {
    title: String,
    group_id: u64,
    start: NaiveDateTime,
    end: NaiveDateTime,
}

#[derive(Debug, Default)]
struct MemoryState {
    users: BTreeMap<u64, UserRow>,
    roles: BTreeMap<u64, RoleDraft>,
    groups: BTreeMap<u64, GroupDraft>,
    memberships: BTreeSet<(u64, u64)>, // (user_id, group_id)
    events: BTreeMap<u64, EventRow>,
    next_user_id: u64,
    next_role_id: u64,
    next_group_id: u64,
    next_event_id: u64,
}

impl MemoryState {
    fn next_id(counter: &mut u64) -> u64 {
        *counter += 1;
        *counter
    }

    fn event_view(&self, id: u64, row: &EventRow) -> Option<CalendarEvent> {
        let group = self.groups.get(&row.group_id)?;
        Some(CalendarEvent {
            id,
            title: row.title.clone(),
            color: group.color.clone(),
            group_label: group.label.clone(),
            group_id: row.group_id,
            start: row.start,
            end: row.end,
        })
    }

    fn profile(&self, id: u64, row: &UserRow) -> Option<UserProfile> {
        let role = self.roles.get(&row.role_id)?;
        Some(UserProfile {
            id,
            username: row.username.clone(),
            role_label: role.label.clone(),
            role_id: row.role_id,
        })
    }
}

/// Storage backend keeping everything in process memory
pub struct MemoryStorage {
    state: RwLock<MemoryState>,
}

impl MemoryStorage {
    /// Empty store with the administrator role already seeded
    pub fn new() -> Self {
        let mut state = MemoryState::default();
        state.roles.insert(
            ADMIN_ROLE_ID,
            RoleDraft {
                label: ADMIN_ROLE_LABEL.to_string(),
                permission: ADMIN_ROLE_PERMISSION.to_string(),
            },
        );
        state.next_role_id = ADMIN_ROLE_ID;
        Self {
            state: RwLock::new(state),
        }
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UserStorage for MemoryStorage {
    async fn find_credentials(&self, username: &str) -> Result<Option<UserCredentials>> {
        let state = self.state.read().await;
        Ok(state
            .users
            .iter()
            .find(|(_, row)| row.username == username)
            .map(|(id, row)| UserCredentials {
                id: *id,
                username: row.username.clone(),
                password_hash: row.password_hash.clone(),
            }))
    }

    async fn user_exists(&self, user_id: u64) -> Result<bool> {
        Ok(self.state.read().await.users.contains_key(&user_id))
    }

    async fn username_taken(&self, username: &str) -> Result<bool> {
        let state = self.state.read().await;
        Ok(state.users.values().any(|row| row.username == username))
    }

    async fn create_user(&self, user: NewUser) -> Result<u64> {
        let mut state = self.state.write().await;
        if !state.roles.contains_key(&user.role_id) {
            return Err(AgendaError::StoreUnavailable(format!(
                "foreign key violation: role {} does not exist",
                user.role_id
            )));
        }
        if let Some(missing) = user.groups.iter().find(|g| !state.groups.contains_key(*g)) {
            return Err(AgendaError::StoreUnavailable(format!(
                "foreign key violation: group {} does not exist",
                missing
            )));
        }
        let id = MemoryState::next_id(&mut state.next_user_id);
        state.users.insert(
            id,
            UserRow {
                username: user.username,
                password_hash: user.password_hash,
                role_id: user.role_id,
            },
        );
        for group_id in user.groups {
            state.memberships.insert((id, group_id));
        }
        Ok(id)
    }

    async fn get_user(&self, user_id: u64) -> Result<Option<UserProfile>> {
        let state = self.state.read().await;
        Ok(state
            .users
            .get(&user_id)
            .and_then(|row| state.profile(user_id, row)))
    }

    async fn list_users(&self) -> Result<Vec<UserWithGroups>> {
        let state = self.state.read().await;
        let users = state
            .users
            .iter()
            .filter_map(|(id, row)| state.profile(*id, row))
            .map(|profile| {
                let mut groups: Vec<Group> = state
                    .memberships
                    .iter()
                    .filter(|(user_id, _)| *user_id == profile.id)
                    .filter_map(|(_, group_id)| {
                        state.groups.get(group_id).map(|g| Group {
                            id: *group_id,
                            label: g.label.clone(),
                            color: g.color.clone(),
                        })
                    })
                    .collect();
                groups.sort_by(|a, b| a.label.cmp(&b.label));
                UserWithGroups {
                    id: profile.id,
                    username: profile.username,
                    role_label: profile.role_label,
                    role_id: profile.role_id,
                    groups,
                }
            })
            .collect();
        Ok(users)
    }

    async fn update_user(&self, user_id: u64, username: &str, role_id: u64) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.roles.contains_key(&role_id) {
            return Err(AgendaError::StoreUnavailable(format!(
                "foreign key violation: role {} does not exist",
                role_id
            )));
        }
        if let Some(row) = state.users.get_mut(&user_id) {
            row.username = username.to_string();
            row.role_id = role_id;
        }
        Ok(())
    }

    async fn delete_user(&self, user_id: u64) -> Result<()> {
        let mut state = self.state.write().await;
        state.memberships.retain(|(uid, _)| *uid != user_id);
        state.users.remove(&user_id);
        Ok(())
    }

    async fn role_permission(&self, user_id: u64) -> Result<Option<String>> {
        let state = self.state.read().await;
        Ok(state
            .users
            .get(&user_id)
            .and_then(|row| state.roles.get(&row.role_id))
            .map(|role| role.permission.clone()))
    }
}

#[async_trait]
impl MembershipStorage for MemoryStorage {
    async fn group_ids(&self, user_id: u64) -> Result<Vec<u64>> {
        let state = self.state.read().await;
        Ok(state
            .memberships
            .iter()
            .filter(|(uid, _)| *uid == user_id)
            .map(|(_, gid)| *gid)
            .collect())
    }

    async fn groups_of(&self, user_id: u64) -> Result<Vec<GroupSummary>> {
        let state = self.state.read().await;
        Ok(state
            .memberships
            .iter()
            .filter(|(uid, _)| *uid == user_id)
            .filter_map(|(_, gid)| {
                state.groups.get(gid).map(|g| GroupSummary {
                    id: *gid,
                    label: g.label.clone(),
                })
            })
            .collect())
    }

    async fn replace_memberships(&self, user_id: u64, group_ids: &[u64]) -> Result<()> {
        let mut state = self.state.write().await;
        state.memberships.retain(|(uid, _)| *uid != user_id);
        for group_id in group_ids {
            state.memberships.insert((user_id, *group_id));
        }
        Ok(())
    }
}

#[async_trait]
impl RoleStorage for MemoryStorage {
    async fn list_roles(&self) -> Result<Vec<Role>> {
        let state = self.state.read().await;
        Ok(state
            .roles
            .iter()
            .map(|(id, role)| Role {
                id: *id,
                label: role.label.clone(),
                permission: role.permission.clone(),
            })
            .collect())
    }

    async fn get_role(&self, role_id: u64) -> Result<Option<Role>> {
        let state = self.state.read().await;
        Ok(state.roles.get(&role_id).map(|role| Role {
            id: role_id,
            label: role.label.clone(),
            permission: role.permission.clone(),
        }))
    }

    async fn role_label_exists(&self, label: &str) -> Result<bool> {
        let state = self.state.read().await;
        Ok(state.roles.values().any(|role| role.label == label))
    }

    async fn create_role(&self, role: RoleDraft) -> Result<u64> {
        let mut state = self.state.write().await;
        let id = MemoryState::next_id(&mut state.next_role_id);
        state.roles.insert(id, role);
        Ok(id)
    }

    async fn update_role(&self, role_id: u64, role: RoleDraft) -> Result<bool> {
        let mut state = self.state.write().await;
        match state.roles.get_mut(&role_id) {
            Some(existing) => {
                *existing = role;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_role(&self, role_id: u64) -> Result<bool> {
        Ok(self.state.write().await.roles.remove(&role_id).is_some())
    }

    async fn role_in_use(&self, role_id: u64) -> Result<bool> {
        let state = self.state.read().await;
        Ok(state.users.values().any(|row| row.role_id == role_id))
    }
}

#[async_trait]
impl GroupStorage for MemoryStorage {
    async fn list_groups(&self) -> Result<Vec<Group>> {
        let state = self.state.read().await;
        Ok(state
            .groups
            .iter()
            .map(|(id, g)| Group {
                id: *id,
                label: g.label.clone(),
                color: g.color.clone(),
            })
            .collect())
    }

    async fn get_group(&self, group_id: u64) -> Result<Option<Group>> {
        let state = self.state.read().await;
        Ok(state.groups.get(&group_id).map(|g| Group {
            id: group_id,
            label: g.label.clone(),
            color: g.color.clone(),
        }))
    }

    async fn group_label_exists(&self, label: &str) -> Result<bool> {
        let state = self.state.read().await;
        Ok(state.groups.values().any(|g| g.label == label))
    }

    async fn groups_exist(&self, group_ids: &[u64]) -> Result<bool> {
        let state = self.state.read().await;
        Ok(group_ids.iter().all(|id| state.groups.contains_key(id)))
    }

    async fn create_group(&self, group: GroupDraft) -> Result<u64> {
        let mut state = self.state.write().await;
        let id = MemoryState::next_id(&mut state.next_group_id);
        state.groups.insert(id, group);
        Ok(id)
    }

    async fn update_group(&self, group_id: u64, group: GroupDraft) -> Result<bool> {
        let mut state = self.state.write().await;
        match state.groups.get_mut(&group_id) {
            Some(existing) => {
                *existing = group;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_group(&self, group_id: u64) -> Result<bool> {
        let mut state = self.state.write().await;
        if state.groups.remove(&group_id).is_none() {
            return Ok(false);
        }
        state.memberships.retain(|(_, gid)| *gid != group_id);
        Ok(true)
    }

    async fn group_has_events(&self, group_id: u64) -> Result<bool> {
        let state = self.state.read().await;
        Ok(state.events.values().any(|e| e.group_id == group_id))
    }
}

#[async_trait]
impl EventStorage for MemoryStorage {
    // The author is only recorded by the relational backend
    async fn create_event(&self, event: EventDraft, _author_id: u64) -> Result<u64> {
        let mut state = self.state.write().await;
        if !state.groups.contains_key(&event.group_id) {
            return Err(AgendaError::StoreUnavailable(format!(
                "foreign key violation: group {} does not exist",
                event.group_id
            )));
        }
        let id = MemoryState::next_id(&mut state.next_event_id);
        state.events.insert(
            id,
            EventRow {
                title: event.title,
                group_id: event.group_id,
                start: event.start,
                end: event.end,
            },
        );
        Ok(id)
    }

    async fn get_event(&self, event_id: u64) -> Result<Option<CalendarEvent>> {
        let state = self.state.read().await;
        Ok(state
            .events
            .get(&event_id)
            .and_then(|row| state.event_view(event_id, row)))
    }

    async fn update_event(&self, event_id: u64, event: EventDraft) -> Result<bool> {
        let mut state = self.state.write().await;
        match state.events.get_mut(&event_id) {
            Some(row) => {
                row.title = event.title;
                row.group_id = event.group_id;
                row.start = event.start;
                row.end = event.end;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_event(&self, event_id: u64) -> Result<bool> {
        Ok(self.state.write().await.events.remove(&event_id).is_some())
    }

    async fn events_overlapping(
        &self,
        range_start: NaiveDateTime,
        range_end: NaiveDateTime,
        groups: Option<&[u64]>,
    ) -> Result<Vec<CalendarEvent>> {
        let state = self.state.read().await;
        Ok(state
            .events
            .iter()
            .filter(|(_, row)| row.start <= range_end && row.end >= range_start)
            .filter(|(_, row)| groups.map_or(true, |ids| ids.contains(&row.group_id)))
            .filter_map(|(id, row)| state.event_view(*id, row))
            .collect())
    }

    async fn all_events(&self) -> Result<Vec<CalendarEvent>> {
        let state = self.state.read().await;
        Ok(state
            .events
            .iter()
            .filter_map(|(id, row)| state.event_view(*id, row))
            .collect())
    }
}

#[async_trait]
impl StorageProvider for MemoryStorage {
    fn users(&self) -> &dyn UserStorage {
        self
    }

    fn memberships(&self) -> &dyn MembershipStorage {
        self
    }

    fn roles(&self) -> &dyn RoleStorage {
        self
    }

    fn groups(&self) -> &dyn GroupStorage {
        self
    }

    fn events(&self) -> &dyn EventStorage {
        self
    }

    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}
