//! Login, registration and user administration endpoints

use std::time::Duration;

use serde::{Deserialize, Serialize};
use warp::reply::Response;
use warp::Filter;

use super::{required, respond, with_admin, with_state, with_subject, Routes, SharedState};
use crate::auth::password::{hash_password, verify_password};
use crate::auth::Subject;
use crate::constants::MIN_LOGIN_DURATION_MS;
use crate::error::{AgendaError, Result};
use crate::response::{success, Empty, Messages};
use crate::security::AuthTimer;
use crate::security_logger::SecurityEvent;
use crate::storage::{GroupSummary, NewUser, UserProfile};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: Option<String>,
    pub password: Option<String>,
    pub role_id: Option<u64>,
    pub groups: Option<Vec<u64>>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub username: Option<String>,
    pub role_id: Option<u64>,
    pub groups: Option<Vec<u64>>,
}

#[derive(Debug, Serialize)]
pub struct MembershipRef {
    pub group_id: u64,
}

/// `GET /user/:id` payload
#[derive(Debug, Serialize)]
pub struct UserDetail {
    pub id: u64,
    pub username: String,
    pub role_label: String,
    pub role_id: u64,
    pub groups: Vec<MembershipRef>,
}

/// `GET /user` payload
#[derive(Debug, Serialize)]
pub struct CurrentUser {
    pub id: u64,
    pub username: String,
    pub role_label: String,
    pub role_id: u64,
    pub groups: Vec<GroupSummary>,
}

#[derive(Debug, Serialize)]
pub struct PermissionCheck {
    #[serde(rename = "hasPermission")]
    pub has_permission: bool,
}

pub fn routes(state: SharedState) -> Routes {
    let login_route = warp::path!("login")
        .and(warp::post())
        .and(with_state(state.clone()))
        .and(warp::body::json())
        .and_then(|state: SharedState, body: LoginRequest| respond(login(state, body)));

    let register_route = warp::path!("register")
        .and(warp::post())
        .and(with_admin(state.clone()))
        .and(with_state(state.clone()))
        .and(warp::body::json())
        .and_then(|_admin: Subject, state: SharedState, body: RegisterRequest| {
            respond(register(state, body))
        });

    let list_route = warp::path!("users")
        .and(warp::get())
        .and(with_admin(state.clone()))
        .and(with_state(state.clone()))
        .and_then(|_admin: Subject, state: SharedState| respond(list_users(state)));

    let current_route = warp::path!("user")
        .and(warp::get())
        .and(with_subject(state.clone()))
        .and(with_state(state.clone()))
        .and_then(|subject: Subject, state: SharedState| respond(current_user(state, subject)));

    let get_route = warp::path!("user" / u64)
        .and(warp::get())
        .and(with_admin(state.clone()))
        .and(with_state(state.clone()))
        .and_then(|id: u64, _admin: Subject, state: SharedState| respond(get_user(state, id)));

    let update_route = warp::path!("user" / u64)
        .and(warp::put())
        .and(with_admin(state.clone()))
        .and(with_state(state.clone()))
        .and(warp::body::json())
        .and_then(
            |id: u64, admin: Subject, state: SharedState, body: UpdateUserRequest| {
                respond(update_user(state, admin, id, body))
            },
        );

    let delete_route = warp::path!("user" / u64)
        .and(warp::delete())
        .and(with_admin(state.clone()))
        .and(with_state(state.clone()))
        .and_then(|id: u64, _admin: Subject, state: SharedState| respond(delete_user(state, id)));

    let permission_route = warp::path!("permissions" / String)
        .and(warp::get())
        .and(with_admin(state.clone()))
        .and(with_state(state))
        .and_then(|tag: String, admin: Subject, state: SharedState| {
            respond(check_permission(state, admin, tag))
        });

    login_route
        .or(register_route)
        .unify()
        .or(list_route)
        .unify()
        .or(current_route)
        .unify()
        .or(get_route)
        .unify()
        .or(update_route)
        .unify()
        .or(delete_route)
        .unify()
        .or(permission_route)
        .unify()
        .boxed()
}

/// Exchange credentials for a bearer token. Failures take at least
/// `MIN_LOGIN_DURATION_MS` whatever the cause.
pub async fn login(state: SharedState, body: LoginRequest) -> Result<Response> {
    let (username, password) = match (required(body.username), body.password) {
        (Some(username), Some(password)) if !password.is_empty() => (username, password),
        _ => {
            return Err(AgendaError::validation(
                "Nom d'utilisateur et mot de passe requis",
                "Username and password are required",
            ))
        }
    };

    let timer = AuthTimer::new(Duration::from_millis(MIN_LOGIN_DURATION_MS));

    let credentials = match state.store.users().find_credentials(&username).await? {
        Some(credentials) => credentials,
        None => {
            state
                .security
                .log_event(SecurityEvent::LoginFailed {
                    username,
                    reason: "unknown user".to_string(),
                })
                .await;
            timer.wait().await;
            return Err(AgendaError::InvalidCredentials);
        }
    };

    let stored_hash = credentials.password_hash.clone();
    let verified = tokio::task::spawn_blocking(move || verify_password(&password, &stored_hash))
        .await
        .map_err(|e| AgendaError::Internal(format!("Password verification task failed: {}", e)))?;

    if !verified {
        state
            .security
            .log_event(SecurityEvent::LoginFailed {
                username,
                reason: "password mismatch".to_string(),
            })
            .await;
        timer.wait().await;
        return Err(AgendaError::InvalidCredentials);
    }

    let token = state.tokens.issue(credentials.id)?;
    state
        .security
        .log_event(SecurityEvent::AuthenticationSuccess {
            user_id: credentials.id,
        })
        .await;

    Ok(success(
        LoginResponse { token },
        Messages::new("Connexion réussie", "Login successful"),
    ))
}

pub async fn register(state: SharedState, body: RegisterRequest) -> Result<Response> {
    let (username, password, role_id) = match (required(body.username), body.password, body.role_id) {
        (Some(username), Some(password), Some(role_id)) if !password.is_empty() => {
            (username, password, role_id)
        }
        _ => {
            return Err(AgendaError::validation(
                "Nom d'utilisateur, mot de passe et role requis",
                "Username, password and role are required",
            ))
        }
    };
    let groups = unique_groups(body.groups);

    if state.store.users().username_taken(&username).await? {
        return Err(AgendaError::validation(
            "Nom d'utilisateur déjà pris",
            "Username already taken",
        ));
    }
    ensure_role_exists(&state, role_id).await?;
    ensure_groups_exist(&state, &groups).await?;

    let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| AgendaError::Internal(format!("Password hashing task failed: {}", e)))??;

    let user_id = state
        .store
        .users()
        .create_user(NewUser {
            username,
            password_hash,
            role_id,
            groups,
        })
        .await?;
    log::info!("User {} registered with role {}", user_id, role_id);

    Ok(success(
        Empty {},
        Messages::new("Utilisateur créé avec succès", "User created successfully"),
    ))
}

pub async fn list_users(state: SharedState) -> Result<Response> {
    let users = state.store.users().list_users().await?;
    if users.is_empty() {
        return Err(AgendaError::not_found("Aucun utilisateur trouvé", "No users found"));
    }
    Ok(success(
        users,
        Messages::new(
            "Utilisateurs récupérés avec succès",
            "Users retrieved successfully",
        ),
    ))
}

pub async fn get_user(state: SharedState, user_id: u64) -> Result<Response> {
    let profile = find_profile(&state, user_id).await?;
    let detail = user_detail(&state, profile).await?;
    Ok(success(
        detail,
        Messages::new("Utilisateur récupéré avec succès", "User retrieved successfully"),
    ))
}

pub async fn update_user(
    state: SharedState,
    admin: Subject,
    user_id: u64,
    body: UpdateUserRequest,
) -> Result<Response> {
    state.guard.forbid_self_modification(&admin, user_id).await?;

    let (username, role_id) = match (required(body.username), body.role_id) {
        (Some(username), Some(role_id)) => (username, role_id),
        _ => {
            return Err(AgendaError::validation(
                "Nom d'utilisateur et role requis",
                "Username and role are required",
            ))
        }
    };

    let current = find_profile(&state, user_id).await?;
    if current.username != username && state.store.users().username_taken(&username).await? {
        return Err(AgendaError::validation(
            "Nom d'utilisateur déjà pris",
            "Username already taken",
        ));
    }
    ensure_role_exists(&state, role_id).await?;

    let groups = unique_groups(body.groups);
    ensure_groups_exist(&state, &groups).await?;

    state.store.users().update_user(user_id, &username, role_id).await?;
    if !groups.is_empty() {
        state
            .store
            .memberships()
            .replace_memberships(user_id, &groups)
            .await?;
    }

    let updated = state.store.users().get_user(user_id).await?.ok_or_else(|| {
        AgendaError::not_found(
            "Utilisateur non trouvé après mise à jour",
            "User not found after update",
        )
    })?;
    let detail = user_detail(&state, updated).await?;

    Ok(success(
        detail,
        Messages::new("Utilisateur mis à jour avec succès", "User updated successfully"),
    ))
}

/// Caller's own profile. Admins are shown every group.
pub async fn current_user(state: SharedState, subject: Subject) -> Result<Response> {
    let profile = find_profile(&state, subject.id).await?;
    let permissions = state.guard.permissions(&subject).await?;

    let groups = if permissions.is_admin() {
        state
            .store
            .groups()
            .list_groups()
            .await?
            .into_iter()
            .map(|group| GroupSummary {
                id: group.id,
                label: group.label,
            })
            .collect()
    } else {
        state.store.memberships().groups_of(subject.id).await?
    };

    Ok(success(
        CurrentUser {
            id: profile.id,
            username: profile.username,
            role_label: profile.role_label,
            role_id: profile.role_id,
            groups,
        },
        Messages::new("Utilisateur récupéré avec succès", "User retrieved successfully"),
    ))
}

pub async fn delete_user(state: SharedState, user_id: u64) -> Result<Response> {
    if !state.store.users().user_exists(user_id).await? {
        return Err(user_not_found());
    }
    state.store.users().delete_user(user_id).await?;
    log::info!("User {} deleted", user_id);

    Ok(success(
        Empty {},
        Messages::new("Utilisateur supprimé avec succès", "User deleted successfully"),
    ))
}

/// Whether the caller's role carries `tag`
pub async fn check_permission(state: SharedState, subject: Subject, tag: String) -> Result<Response> {
    let permissions = match state.guard.evaluator().resolve_permissions(subject.id).await {
        Ok(permissions) => permissions,
        Err(AgendaError::SubjectNotFound(_)) => {
            return Err(AgendaError::not_found(
                "Permission non trouvée",
                "Permission not found",
            ))
        }
        Err(e) => return Err(e),
    };

    if !permissions.has_tag(&tag) {
        return Err(AgendaError::forbidden("Permission refusée", "Permission denied"));
    }

    Ok(success(
        PermissionCheck {
            has_permission: true,
        },
        Messages::new("Permission accordée", "Permission granted"),
    ))
}

fn user_not_found() -> AgendaError {
    AgendaError::not_found("Utilisateur non trouvé", "User not found")
}

async fn find_profile(state: &SharedState, user_id: u64) -> Result<UserProfile> {
    state
        .store
        .users()
        .get_user(user_id)
        .await?
        .ok_or_else(user_not_found)
}

async fn user_detail(state: &SharedState, profile: UserProfile) -> Result<UserDetail> {
    let groups = state
        .store
        .memberships()
        .group_ids(profile.id)
        .await?
        .into_iter()
        .map(|group_id| MembershipRef { group_id })
        .collect();
    Ok(UserDetail {
        id: profile.id,
        username: profile.username,
        role_label: profile.role_label,
        role_id: profile.role_id,
        groups,
    })
}

async fn ensure_role_exists(state: &SharedState, role_id: u64) -> Result<()> {
    if state.store.roles().get_role(role_id).await?.is_none() {
        return Err(AgendaError::validation("Rôle inconnu", "Unknown role"));
    }
    Ok(())
}

/// Sorted group ids with repeats removed
fn unique_groups(groups: Option<Vec<u64>>) -> Vec<u64> {
    let mut groups = groups.unwrap_or_default();
    groups.sort_unstable();
    groups.dedup();
    groups
}

async fn ensure_groups_exist(state: &SharedState, groups: &[u64]) -> Result<()> {
    if !groups.is_empty() && !state.store.groups().groups_exist(groups).await? {
        return Err(AgendaError::validation("Groupe inconnu", "Unknown group"));
    }
    Ok(())
}
