//! Group administration endpoints

use serde::Deserialize;
use warp::reply::Response;
use warp::Filter;

use super::{required, respond, with_admin, with_state, Created, Routes, SharedState};
use crate::auth::Subject;
use crate::error::{AgendaError, Result};
use crate::response::{success, Empty, Messages};
use crate::storage::GroupDraft;

#[derive(Debug, Deserialize)]
pub struct GroupRequest {
    pub label: Option<String>,
    pub color: Option<String>,
}

impl GroupRequest {
    fn into_draft(self) -> Option<GroupDraft> {
        match (required(self.label), required(self.color)) {
            (Some(label), Some(color)) => Some(GroupDraft { label, color }),
            _ => None,
        }
    }
}

pub fn routes(state: SharedState) -> Routes {
    let list_route = warp::path!("groups")
        .and(warp::get())
        .and(with_admin(state.clone()))
        .and(with_state(state.clone()))
        .and_then(|_admin: Subject, state: SharedState| respond(list_groups(state)));

    let create_route = warp::path!("group")
        .and(warp::post())
        .and(with_admin(state.clone()))
        .and(with_state(state.clone()))
        .and(warp::body::json())
        .and_then(|_admin: Subject, state: SharedState, body: GroupRequest| {
            respond(create_group(state, body))
        });

    let update_route = warp::path!("group" / u64)
        .and(warp::put())
        .and(with_admin(state.clone()))
        .and(with_state(state.clone()))
        .and(warp::body::json())
        .and_then(|id: u64, _admin: Subject, state: SharedState, body: GroupRequest| {
            respond(update_group(state, id, body))
        });

    let delete_route = warp::path!("group" / u64)
        .and(warp::delete())
        .and(with_admin(state.clone()))
        .and(with_state(state.clone()))
        .and_then(|id: u64, _admin: Subject, state: SharedState| respond(delete_group(state, id)));

    let get_route = warp::path!("group" / u64)
        .and(warp::get())
        .and(with_admin(state.clone()))
        .and(with_state(state))
        .and_then(|id: u64, _admin: Subject, state: SharedState| respond(get_group(state, id)));

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

fn group_not_found() -> AgendaError {
    AgendaError::not_found("Groupe non trouvé", "Group not found")
}

fn label_taken() -> AgendaError {
    AgendaError::conflict(
        "Un groupe avec ce label existe déjà",
        "A group with this label already exists",
    )
}

pub async fn list_groups(state: SharedState) -> Result<Response> {
    let groups = state.store.groups().list_groups().await?;
    if groups.is_empty() {
        return Err(AgendaError::not_found("Aucun groupe trouvé", "No groups found"));
    }
    Ok(success(
        groups,
        Messages::new("Groupes récupérés avec succès", "Groups retrieved successfully"),
    ))
}

pub async fn create_group(state: SharedState, body: GroupRequest) -> Result<Response> {
    let draft = body.into_draft().ok_or_else(|| {
        AgendaError::validation(
            "Le label et la couleur du groupe sont requis",
            "Group label and color are required",
        )
    })?;

    if state.store.groups().group_label_exists(&draft.label).await? {
        return Err(label_taken());
    }

    let id = state.store.groups().create_group(draft).await?;
    log::info!("Group {} created", id);

    Ok(success(
        Created { id },
        Messages::new("Groupe créé avec succès", "Group created successfully"),
    ))
}

pub async fn update_group(state: SharedState, group_id: u64, body: GroupRequest) -> Result<Response> {
    let draft = body.into_draft().ok_or_else(|| {
        AgendaError::validation(
            "Le label et la couleur du groupe sont requis",
            "Group label and color are required",
        )
    })?;

    let current = state
        .store
        .groups()
        .get_group(group_id)
        .await?
        .ok_or_else(group_not_found)?;
    if current.label != draft.label && state.store.groups().group_label_exists(&draft.label).await? {
        return Err(label_taken());
    }

    if !state.store.groups().update_group(group_id, draft).await? {
        return Err(group_not_found());
    }

    Ok(success(
        Empty {},
        Messages::new("Groupe mis à jour avec succès", "Group updated successfully"),
    ))
}

/// Memberships go with the group; events must be moved or deleted first.
pub async fn delete_group(state: SharedState, group_id: u64) -> Result<Response> {
    if state.store.groups().get_group(group_id).await?.is_none() {
        return Err(group_not_found());
    }
    if state.store.groups().group_has_events(group_id).await? {
        return Err(AgendaError::conflict(
            "Ce groupe contient encore des événements",
            "This group still has events",
        ));
    }

    if !state.store.groups().delete_group(group_id).await? {
        return Err(group_not_found());
    }

    Ok(success(
        Empty {},
        Messages::new("Groupe supprimé avec succès", "Group deleted successfully"),
    ))
}

pub async fn get_group(state: SharedState, group_id: u64) -> Result<Response> {
    let group = state
        .store
        .groups()
        .get_group(group_id)
        .await?
        .ok_or_else(group_not_found)?;
    Ok(success(
        group,
        Messages::new("Groupe récupéré avec succès", "Group retrieved successfully"),
    ))
}
