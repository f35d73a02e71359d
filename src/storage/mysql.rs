//! MySQL storage backend
//!
//! Every call checks a connection out of a managed pool and runs a single
//! parameterized statement, or a short transaction whenever memberships are
//! written. Failures surface as `StoreUnavailable`.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::mysql::{MySqlConnection, MySqlPool, MySqlPoolOptions};
use sqlx::{MySql, QueryBuilder};

use super::traits::*;
use crate::config::DatabaseConfig;
use crate::constants::{ADMIN_ROLE_ID, ADMIN_ROLE_LABEL, ADMIN_ROLE_PERMISSION};
use crate::error::Result;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS roles (
        id BIGINT UNSIGNED NOT NULL AUTO_INCREMENT PRIMARY KEY,
        label VARCHAR(100) NOT NULL UNIQUE,
        permission VARCHAR(255) NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS users (
        id BIGINT UNSIGNED NOT NULL AUTO_INCREMENT PRIMARY KEY,
        username VARCHAR(100) NOT NULL UNIQUE,
        password_hash VARCHAR(255) NOT NULL,
        role_id BIGINT UNSIGNED NOT NULL,
        CONSTRAINT fk_users_role FOREIGN KEY (role_id) REFERENCES roles (id)
    )",
    "CREATE TABLE IF NOT EXISTS agenda_groups (
        id BIGINT UNSIGNED NOT NULL AUTO_INCREMENT PRIMARY KEY,
        label VARCHAR(100) NOT NULL UNIQUE,
        color VARCHAR(32) NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS group_members (
        user_id BIGINT UNSIGNED NOT NULL,
        group_id BIGINT UNSIGNED NOT NULL,
        PRIMARY KEY (user_id, group_id),
        CONSTRAINT fk_members_user FOREIGN KEY (user_id) REFERENCES users (id) ON DELETE CASCADE,
        CONSTRAINT fk_members_group FOREIGN KEY (group_id) REFERENCES agenda_groups (id) ON DELETE CASCADE
    )",
    "CREATE TABLE IF NOT EXISTS events (
        id BIGINT UNSIGNED NOT NULL AUTO_INCREMENT PRIMARY KEY,
        title VARCHAR(255) NOT NULL,
        group_id BIGINT UNSIGNED NOT NULL,
        starts_at DATETIME NOT NULL,
        ends_at DATETIME NOT NULL,
        user_id BIGINT UNSIGNED NOT NULL,
        CONSTRAINT fk_events_group FOREIGN KEY (group_id) REFERENCES agenda_groups (id),
        INDEX idx_events_range (starts_at, ends_at)
    )",
];

const EVENT_COLUMNS: &str = "SELECT e.id, e.title, g.color AS color, g.label AS group_label, \
     g.id AS group_id, e.starts_at AS `start`, e.ends_at AS `end` \
     FROM events e INNER JOIN agenda_groups g ON g.id = e.group_id";

const PROFILE_QUERY: &str = "SELECT u.id, u.username, r.label AS role_label, r.id AS role_id \
     FROM users u INNER JOIN roles r ON r.id = u.role_id WHERE u.id = ?";

/// Flat row of the users x groups left join
#[derive(sqlx::FromRow)]
struct UserGroupRow {
    id: u64,
    username: String,
    role_label: String,
    role_id: u64,
    group_id: Option<u64>,
    group_label: Option<String>,
    group_color: Option<String>,
}

/// Folds consecutive rows of the same user into one entry
fn fold_user_rows(rows: Vec<UserGroupRow>) -> Vec<UserWithGroups> {
    let mut users: Vec<UserWithGroups> = Vec::new();
    for row in rows {
        let starts_new = users.last().map_or(true, |last| last.id != row.id);
        if starts_new {
            users.push(UserWithGroups {
                id: row.id,
                username: row.username,
                role_label: row.role_label,
                role_id: row.role_id,
                groups: Vec::new(),
            });
        }
        if let (Some(id), Some(label), Some(color), Some(user)) =
            (row.group_id, row.group_label, row.group_color, users.last_mut())
        {
            user.groups.push(Group { id, label, color });
        }
    }
    users
}

/// Inserts one membership row per distinct group id
async fn insert_memberships(conn: &mut MySqlConnection, user_id: u64, group_ids: &[u64]) -> Result<()> {
    let mut unique = group_ids.to_vec();
    unique.sort_unstable();
    unique.dedup();
    if unique.is_empty() {
        return Ok(());
    }

    let mut builder: QueryBuilder<MySql> =
        QueryBuilder::new("INSERT INTO group_members (user_id, group_id) ");
    builder.push_values(&unique, |mut row, group_id| {
        row.push_bind(user_id).push_bind(*group_id);
    });
    builder.build().execute(&mut *conn).await?;
    Ok(())
}

/// Relational backend over a MySQL connection pool
pub struct MySqlStorage {
    pool: MySqlPool,
}

impl MySqlStorage {
    /// Opens the pool; the configured timeout bounds both connect and acquire
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = MySqlPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.connect_timeout)
            .connect_with(config.connect_options()?)
            .await?;
        log::info!(
            "Connected to MySQL at {} (pool size {})",
            config.host,
            config.max_connections
        );
        Ok(Self { pool })
    }
}

#[async_trait]
impl UserStorage for MySqlStorage {
    async fn find_credentials(&self, username: &str) -> Result<Option<UserCredentials>> {
        log::debug!("Looking up credentials for {}", username);
        let row = sqlx::query_as::<_, UserCredentials>(
            "SELECT id, username, password_hash FROM users WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn user_exists(&self, user_id: u64) -> Result<bool> {
        let row: Option<(u64,)> = sqlx::query_as("SELECT id FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn username_taken(&self, username: &str) -> Result<bool> {
        let row: Option<(u64,)> = sqlx::query_as("SELECT id FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn create_user(&self, user: NewUser) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let result =
            sqlx::query("INSERT INTO users (username, password_hash, role_id) VALUES (?, ?, ?)")
                .bind(&user.username)
                .bind(&user.password_hash)
                .bind(user.role_id)
                .execute(&mut *tx)
                .await?;
        let user_id = result.last_insert_id();
        insert_memberships(&mut tx, user_id, &user.groups).await?;
        tx.commit().await?;
        Ok(user_id)
    }

    async fn get_user(&self, user_id: u64) -> Result<Option<UserProfile>> {
        let row = sqlx::query_as::<_, UserProfile>(PROFILE_QUERY)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn list_users(&self) -> Result<Vec<UserWithGroups>> {
        let rows = sqlx::query_as::<_, UserGroupRow>(
            "SELECT u.id, u.username, r.label AS role_label, r.id AS role_id, \
             g.id AS group_id, g.label AS group_label, g.color AS group_color \
             FROM users u \
             INNER JOIN roles r ON r.id = u.role_id \
             LEFT JOIN group_members m ON m.user_id = u.id \
             LEFT JOIN agenda_groups g ON g.id = m.group_id \
             ORDER BY u.id, g.label",
        )
        .fetch_all(&self.pool)
        .await?;
        log::debug!("Fetched {} user/group rows", rows.len());
        Ok(fold_user_rows(rows))
    }

    async fn update_user(&self, user_id: u64, username: &str, role_id: u64) -> Result<()> {
        sqlx::query("UPDATE users SET username = ?, role_id = ? WHERE id = ?")
            .bind(username)
            .bind(role_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_user(&self, user_id: u64) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM group_members WHERE user_id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn role_permission(&self, user_id: u64) -> Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT r.permission FROM users u INNER JOIN roles r ON r.id = u.role_id WHERE u.id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(permission,)| permission))
    }
}

#[async_trait]
impl MembershipStorage for MySqlStorage {
    async fn group_ids(&self, user_id: u64) -> Result<Vec<u64>> {
        let rows: Vec<(u64,)> = sqlx::query_as("SELECT group_id FROM group_members WHERE user_id = ?")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn groups_of(&self, user_id: u64) -> Result<Vec<GroupSummary>> {
        let rows = sqlx::query_as::<_, GroupSummary>(
            "SELECT g.id, g.label FROM group_members m \
             INNER JOIN agenda_groups g ON g.id = m.group_id WHERE m.user_id = ?",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn replace_memberships(&self, user_id: u64, group_ids: &[u64]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM group_members WHERE user_id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        insert_memberships(&mut tx, user_id, group_ids).await?;
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl RoleStorage for MySqlStorage {
    async fn list_roles(&self) -> Result<Vec<Role>> {
        let rows = sqlx::query_as::<_, Role>("SELECT id, label, permission FROM roles ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn get_role(&self, role_id: u64) -> Result<Option<Role>> {
        let row = sqlx::query_as::<_, Role>("SELECT id, label, permission FROM roles WHERE id = ?")
            .bind(role_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn role_label_exists(&self, label: &str) -> Result<bool> {
        let row: Option<(u64,)> = sqlx::query_as("SELECT id FROM roles WHERE label = ?")
            .bind(label)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn create_role(&self, role: RoleDraft) -> Result<u64> {
        let result = sqlx::query("INSERT INTO roles (label, permission) VALUES (?, ?)")
            .bind(&role.label)
            .bind(&role.permission)
            .execute(&self.pool)
            .await?;
        Ok(result.last_insert_id())
    }

    async fn update_role(&self, role_id: u64, role: RoleDraft) -> Result<bool> {
        // Existence is checked apart: MySQL reports zero affected rows for
        // an update that changes nothing.
        if self.get_role(role_id).await?.is_none() {
            return Ok(false);
        }
        sqlx::query("UPDATE roles SET label = ?, permission = ? WHERE id = ?")
            .bind(&role.label)
            .bind(&role.permission)
            .bind(role_id)
            .execute(&self.pool)
            .await?;
        Ok(true)
    }

    async fn delete_role(&self, role_id: u64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM roles WHERE id = ?")
            .bind(role_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn role_in_use(&self, role_id: u64) -> Result<bool> {
        let row: Option<(u64,)> = sqlx::query_as("SELECT id FROM users WHERE role_id = ? LIMIT 1")
            .bind(role_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }
}

#[async_trait]
impl GroupStorage for MySqlStorage {
    async fn list_groups(&self) -> Result<Vec<Group>> {
        let rows =
            sqlx::query_as::<_, Group>("SELECT id, label, color FROM agenda_groups ORDER BY id")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows)
    }

    async fn get_group(&self, group_id: u64) -> Result<Option<Group>> {
        let row =
            sqlx::query_as::<_, Group>("SELECT id, label, color FROM agenda_groups WHERE id = ?")
                .bind(group_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row)
    }

    async fn group_label_exists(&self, label: &str) -> Result<bool> {
        let row: Option<(u64,)> = sqlx::query_as("SELECT id FROM agenda_groups WHERE label = ?")
            .bind(label)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn groups_exist(&self, group_ids: &[u64]) -> Result<bool> {
        if group_ids.is_empty() {
            return Ok(true);
        }
        let mut unique = group_ids.to_vec();
        unique.sort_unstable();
        unique.dedup();

        let mut builder: QueryBuilder<MySql> =
            QueryBuilder::new("SELECT COUNT(*) FROM agenda_groups WHERE id IN (");
        let mut separated = builder.separated(", ");
        for id in &unique {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");
        let (count,): (i64,) = builder.build_query_as().fetch_one(&self.pool).await?;
        Ok(count as usize == unique.len())
    }

    async fn create_group(&self, group: GroupDraft) -> Result<u64> {
        let result = sqlx::query("INSERT INTO agenda_groups (label, color) VALUES (?, ?)")
            .bind(&group.label)
            .bind(&group.color)
            .execute(&self.pool)
            .await?;
        Ok(result.last_insert_id())
    }

    async fn update_group(&self, group_id: u64, group: GroupDraft) -> Result<bool> {
        if self.get_group(group_id).await?.is_none() {
            return Ok(false);
        }
        sqlx::query("UPDATE agenda_groups SET label = ?, color = ? WHERE id = ?")
            .bind(&group.label)
            .bind(&group.color)
            .bind(group_id)
            .execute(&self.pool)
            .await?;
        Ok(true)
    }

    async fn delete_group(&self, group_id: u64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM agenda_groups WHERE id = ?")
            .bind(group_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn group_has_events(&self, group_id: u64) -> Result<bool> {
        let row: Option<(u64,)> = sqlx::query_as("SELECT id FROM events WHERE group_id = ? LIMIT 1")
            .bind(group_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }
}

#[async_trait]
impl EventStorage for MySqlStorage {
    async fn create_event(&self, event: EventDraft, author_id: u64) -> Result<u64> {
        let result = sqlx::query(
            "INSERT INTO events (title, group_id, starts_at, ends_at, user_id) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&event.title)
        .bind(event.group_id)
        .bind(event.start)
        .bind(event.end)
        .bind(author_id)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_id())
    }

    async fn get_event(&self, event_id: u64) -> Result<Option<CalendarEvent>> {
        let row = sqlx::query_as::<_, CalendarEvent>(&format!("{} WHERE e.id = ?", EVENT_COLUMNS))
            .bind(event_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn update_event(&self, event_id: u64, event: EventDraft) -> Result<bool> {
        if self.get_event(event_id).await?.is_none() {
            return Ok(false);
        }
        sqlx::query(
            "UPDATE events SET title = ?, group_id = ?, starts_at = ?, ends_at = ? WHERE id = ?",
        )
        .bind(&event.title)
        .bind(event.group_id)
        .bind(event.start)
        .bind(event.end)
        .bind(event_id)
        .execute(&self.pool)
        .await?;
        Ok(true)
    }

    async fn delete_event(&self, event_id: u64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM events WHERE id = ?")
            .bind(event_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn events_overlapping(
        &self,
        range_start: NaiveDateTime,
        range_end: NaiveDateTime,
        groups: Option<&[u64]>,
    ) -> Result<Vec<CalendarEvent>> {
        let mut builder: QueryBuilder<MySql> = QueryBuilder::new(EVENT_COLUMNS);
        builder.push(" WHERE e.starts_at <= ");
        builder.push_bind(range_end);
        builder.push(" AND e.ends_at >= ");
        builder.push_bind(range_start);

        if let Some(ids) = groups {
            if ids.is_empty() {
                return Ok(Vec::new());
            }
            builder.push(" AND e.group_id IN (");
            let mut separated = builder.separated(", ");
            for id in ids {
                separated.push_bind(*id);
            }
            separated.push_unseparated(")");
        }
        builder.push(" ORDER BY e.starts_at");

        let rows = builder
            .build_query_as::<CalendarEvent>()
            .fetch_all(&self.pool)
            .await?;
        log::debug!("Fetched {} events in range", rows.len());
        Ok(rows)
    }

    async fn all_events(&self) -> Result<Vec<CalendarEvent>> {
        let rows = sqlx::query_as::<_, CalendarEvent>(&format!("{} ORDER BY e.starts_at", EVENT_COLUMNS))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }
}

#[async_trait]
impl StorageProvider for MySqlStorage {
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
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        sqlx::query("INSERT IGNORE INTO roles (id, label, permission) VALUES (?, ?, ?)")
            .bind(ADMIN_ROLE_ID)
            .bind(ADMIN_ROLE_LABEL)
            .bind(ADMIN_ROLE_PERMISSION)
            .execute(&self.pool)
            .await?;
        log::info!("Schema ready, administrator role {} present", ADMIN_ROLE_ID);
        Ok(())
    }

    async fn health_check(&self) -> Result<bool> {
        let (one,): (i64,) = sqlx::query_as("SELECT 1").fetch_one(&self.pool).await?;
        Ok(one == 1)
    }
}
