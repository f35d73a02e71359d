//! Role administration endpoints

use serde::Deserialize;
use warp::reply::Response;
use warp::Filter;

use super::{required, respond, with_admin, with_state, Created, Routes, SharedState};
use crate::auth::Subject;
use crate::constants::ADMIN_ROLE_ID;
use crate::error::{AgendaError, Result};
use crate::response::{success, Empty, Messages};
use crate::security_logger::SecurityEvent;
use crate::storage::RoleDraft;

#[derive(Debug, Deserialize)]
pub struct RoleRequest {
    pub label: Option<String>,
    pub permission: Option<String>,
}

pub fn routes(state: SharedState) -> Routes {
    let list_route = warp::path!("roles")
        .and(warp::get())
        .and(with_admin(state.clone()))
        .and(with_state(state.clone()))
        .and_then(|_admin: Subject, state: SharedState| respond(list_roles(state)));

    let create_route = warp::path!("role")
        .and(warp::post())
        .and(with_admin(state.clone()))
        .and(with_state(state.clone()))
        .and(warp::body::json())
        .and_then(|_admin: Subject, state: SharedState, body: RoleRequest| {
            respond(create_role(state, body))
        });

    let update_route = warp::path!("role" / u64)
        .and(warp::put())
        .and(with_admin(state.clone()))
        .and(with_state(state.clone()))
        .and(warp::body::json())
        .and_then(|id: u64, _admin: Subject, state: SharedState, body: RoleRequest| {
            respond(update_role(state, id, body))
        });

    let delete_route = warp::path!("role" / u64)
        .and(warp::delete())
        .and(with_admin(state.clone()))
        .and(with_state(state.clone()))
        .and_then(|id: u64, admin: Subject, state: SharedState| {
            respond(delete_role(state, admin, id))
        });

    let get_route = warp::path!("role" / u64)
        .and(warp::get())
        .and(with_admin(state.clone()))
        .and(with_state(state))
        .and_then(|id: u64, _admin: Subject, state: SharedState| respond(get_role(state, id)));

    list_route
        .or(create_route)
        .unify()
        .or(update_route)
        .unify()
        .or(delete_route)
        .unify()
        .or(get_route)
        .unify()
        .boxed()
}

fn role_not_found() -> AgendaError {
    AgendaError::not_found("Rôle non trouvé", "Role not found")
}

fn role_draft(body: RoleRequest) -> Option<RoleDraft> {
    match (required(body.label), required(body.permission)) {
        (Some(label), Some(permission)) => Some(RoleDraft { label, permission }),
        _ => None,
    }
}

pub async fn list_roles(state: SharedState) -> Result<Response> {
    let roles = state.store.roles().list_roles().await?;
    if roles.is_empty() {
        return Err(AgendaError::not_found("Aucun rôle trouvé", "No roles found"));
    }
    Ok(success(
        roles,
        Messages::new("Rôles récupérés avec succès", "Roles retrieved successfully"),
    ))
}

pub async fn create_role(state: SharedState, body: RoleRequest) -> Result<Response> {
    let draft = role_draft(body).ok_or_else(|| {
        AgendaError::validation(
            "Le label et les permissions du rôle est requis",
            "Role label and permissions are required",
        )
    })?;

    if state.store.roles().role_label_exists(&draft.label).await? {
        return Err(AgendaError::conflict(
            "Un rôle avec ce label existe déjà",
            "A role with this label already exists",
        ));
    }

    let id = state.store.roles().create_role(draft).await?;
    log::info!("Role {} created", id);

    Ok(success(
        Created { id },
        Messages::new("Rôle créé avec succès", "Role created successfully"),
    ))
}

pub async fn update_role(state: SharedState, role_id: u64, body: RoleRequest) -> Result<Response> {
    let draft = role_draft(body).ok_or_else(|| {
        AgendaError::validation(
            "Le label et les permission du rôle est requis",
            "Role label and permission are required",
        )
    })?;

    let current = state
        .store
        .roles()
        .get_role(role_id)
        .await?
        .ok_or_else(role_not_found)?;
    if current.label != draft.label && state.store.roles().role_label_exists(&draft.label).await? {
        return Err(AgendaError::conflict(
            "Un rôle avec ce label existe déjà",
            "A role with this label already exists",
        ));
    }

    if !state.store.roles().update_role(role_id, draft).await? {
        return Err(role_not_found());
    }

    Ok(success(
        Empty {},
        Messages::new("Rôle mis à jour avec succès", "Role updated successfully"),
    ))
}

/// Role 1 is the administrator role and is never deleted. A role still
/// assigned to users is refused with a conflict.
pub async fn delete_role(state: SharedState, admin: Subject, role_id: u64) -> Result<Response> {
    if role_id == ADMIN_ROLE_ID {
        state
            .security
            .log_event(SecurityEvent::ProtectedRoleDeletion { user_id: admin.id })
            .await;
        return Err(AgendaError::forbidden(
            "Le rôle administrateur ne peut pas être supprimé",
            "The admin role cannot be deleted",
        ));
    }

    if state.store.roles().get_role(role_id).await?.is_none() {
        return Err(role_not_found());
    }
    if state.store.roles().role_in_use(role_id).await? {
        return Err(AgendaError::conflict(
            "Ce rôle est attribué à des utilisateurs",
            "This role is assigned to users",
        ));
    }

    if !state.store.roles().delete_role(role_id).await? {
        return Err(role_not_found());
    }

    Ok(success(
        Empty {},
        Messages::new("Rôle supprimé avec succès", "Role deleted successfully"),
    ))
}

pub async fn get_role(state: SharedState, role_id: u64) -> Result<Response> {
    let role = state
        .store
        .roles()
        .get_role(role_id)
        .await?
        .ok_or_else(role_not_found)?;
    Ok(success(
        role,
        Messages::new("Rôle récupéré avec succès", "Role retrieved successfully"),
    ))
}
