//! Calendar events
//!
//! Writers need the `write` capability. Anyone without `admin` is confined to
//! the groups they belong to, for reading as well as writing.

use chrono::{Months, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::Deserialize;
use warp::reply::Response;
use warp::Filter;

use super::{required, respond, with_admin, with_state, with_subject, Created, Routes, SharedState};
use crate::auth::{PermissionSet, Subject};
use crate::error::{AgendaError, Result};
use crate::response::{success, Empty, Messages};
use crate::security_logger::SecurityEvent;
use crate::storage::{CalendarEvent, EventDraft};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Deserialize)]
pub struct EventRequest {
    pub title: Option<String>,
    pub group_id: Option<u64>,
    pub start: Option<String>,
    pub end: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct EventRange {
    pub start: Option<String>,
    pub end: Option<String>,
}

pub fn routes(state: SharedState) -> Routes {
    let create_route = warp::path!("calendar" / "event")
        .and(warp::post())
        .and(with_subject(state.clone()))
        .and(with_state(state.clone()))
        .and(warp::body::json())
        .and_then(|subject: Subject, state: SharedState, body: EventRequest| {
            respond(create_event(state, subject, body))
        });

    let update_route = warp::path!("calendar" / "event" / u64)
        .and(warp::put())
        .and(with_subject(state.clone()))
        .and(with_state(state.clone()))
        .and(warp::body::json())
        .and_then(|id: u64, subject: Subject, state: SharedState, body: EventRequest| {
            respond(update_event(state, subject, id, body))
        });

    let delete_route = warp::path!("calendar" / "event" / u64)
        .and(warp::delete())
        .and(with_subject(state.clone()))
        .and(with_state(state.clone()))
        .and_then(|id: u64, subject: Subject, state: SharedState| {
            respond(delete_event(state, subject, id))
        });

    let list_route = warp::path!("calendar" / "events")
        .and(warp::get())
        .and(with_subject(state.clone()))
        .and(with_state(state.clone()))
        .and(warp::query::<EventRange>())
        .and_then(|subject: Subject, state: SharedState, range: EventRange| {
            respond(list_events(state, subject, range))
        });

    let export_route = warp::path!("calendar" / "export")
        .and(warp::get())
        .and(with_admin(state.clone()))
        .and(with_state(state))
        .and_then(|_admin: Subject, state: SharedState| respond(export_events(state)));

    create_route
        .or(update_route)
        .unify()
        .or(delete_route)
        .unify()
        .or(list_route)
        .unify()
        .or(export_route)
        .unify()
        .boxed()
}

/// Parse an ISO-8601 timestamp, dropping fractional seconds and any zone
/// suffix past the 19th character.
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    let head = value.get(..19).unwrap_or(value).replacen(' ', "T", 1);
    NaiveDateTime::parse_from_str(&head, TIMESTAMP_FORMAT).ok()
}

/// Only the date part of a range bound matters
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    let head = value.get(..10).unwrap_or(value);
    NaiveDate::parse_from_str(head, DATE_FORMAT).ok()
}

fn invalid_date() -> AgendaError {
    AgendaError::validation("Format de date invalide", "Invalid date format")
}

fn event_not_found() -> AgendaError {
    AgendaError::not_found("Événement non trouvé", "Event not found")
}

/// Resolves `[start, end]` of a listing. Query dates are taken at midnight.
/// Start defaults to `now`; end defaults to midnight one month after the
/// start date.
pub fn resolve_range(range: &EventRange, now: NaiveDateTime) -> Result<(NaiveDateTime, NaiveDateTime)> {
    let start = match range.start.as_deref().filter(|v| !v.is_empty()) {
        Some(value) => parse_date(value)
            .ok_or_else(invalid_date)?
            .and_time(NaiveTime::default()),
        None => now,
    };
    let end = match range.end.as_deref().filter(|v| !v.is_empty()) {
        Some(value) => parse_date(value).ok_or_else(invalid_date)?,
        None => start
            .date()
            .checked_add_months(Months::new(1))
            .ok_or_else(invalid_date)?,
    };
    Ok((start, end.and_time(NaiveTime::default())))
}

fn event_draft(body: EventRequest) -> Result<EventDraft> {
    let (title, group_id, start, end) = match (
        required(body.title),
        body.group_id,
        required(body.start),
        required(body.end),
    ) {
        (Some(title), Some(group_id), Some(start), Some(end)) => (title, group_id, start, end),
        _ => {
            return Err(AgendaError::validation(
                "Titre, groupe, date de début et de fin requis",
                "Title, group, start date and end date are required",
            ))
        }
    };

    let start = parse_timestamp(&start).ok_or_else(invalid_date)?;
    let end = parse_timestamp(&end).ok_or_else(invalid_date)?;
    if end < start {
        return Err(AgendaError::validation(
            "La date de fin précède la date de début",
            "End date is before start date",
        ));
    }

    Ok(EventDraft {
        title,
        group_id,
        start,
        end,
    })
}

/// Permissions of a writer; readers are refused with `message`
async fn require_writer(
    state: &SharedState,
    subject: &Subject,
    message: (&str, &str),
) -> Result<PermissionSet> {
    let permissions = state.guard.permissions(subject).await?;
    if !permissions.can_write() {
        state
            .security
            .log_event(SecurityEvent::PermissionDenied {
                user_id: subject.id,
                action: "calendar write".to_string(),
            })
            .await;
        return Err(AgendaError::forbidden(message.0, message.1));
    }
    Ok(permissions)
}

/// Non-admins may only touch events of their own groups
async fn require_group_scope(
    state: &SharedState,
    subject: &Subject,
    permissions: &PermissionSet,
    groups: &[u64],
) -> Result<()> {
    if permissions.is_admin() {
        return Ok(());
    }
    let member_of = state.store.memberships().group_ids(subject.id).await?;
    if groups.iter().all(|group| member_of.contains(group)) {
        return Ok(());
    }
    state
        .security
        .log_event(SecurityEvent::PermissionDenied {
            user_id: subject.id,
            action: format!("calendar write outside groups {:?}", groups),
        })
        .await;
    Err(AgendaError::forbidden(
        "Vous n'appartenez pas à ce groupe",
        "You do not belong to this group",
    ))
}

async fn ensure_group_exists(state: &SharedState, group_id: u64) -> Result<()> {
    if state.store.groups().get_group(group_id).await?.is_none() {
        return Err(AgendaError::validation("Groupe inconnu", "Unknown group"));
    }
    Ok(())
}

const WRITE_DENIED: (&str, &str) = ("Permissions insuffisantes", "Insufficient permissions");

pub async fn create_event(state: SharedState, subject: Subject, body: EventRequest) -> Result<Response> {
    let permissions = require_writer(&state, &subject, WRITE_DENIED).await?;
    let draft = event_draft(body)?;
    ensure_group_exists(&state, draft.group_id).await?;
    require_group_scope(&state, &subject, &permissions, &[draft.group_id]).await?;

    let id = state.store.events().create_event(draft, subject.id).await?;
    log::info!("Event {} created by user {}", id, subject.id);

    Ok(success(
        Created { id },
        Messages::new("Événement créé avec succès", "Event created successfully"),
    ))
}

pub async fn update_event(
    state: SharedState,
    subject: Subject,
    event_id: u64,
    body: EventRequest,
) -> Result<Response> {
    let permissions = require_writer(&state, &subject, WRITE_DENIED).await?;
    let draft = event_draft(body)?;

    let current = state
        .store
        .events()
        .get_event(event_id)
        .await?
        .ok_or_else(event_not_found)?;
    ensure_group_exists(&state, draft.group_id).await?;
    require_group_scope(
        &state,
        &subject,
        &permissions,
        &[current.group_id, draft.group_id],
    )
    .await?;

    if !state.store.events().update_event(event_id, draft).await? {
        return Err(event_not_found());
    }

    Ok(success(
        Empty {},
        Messages::new("Événement mis à jour avec succès", "Event updated successfully"),
    ))
}

pub async fn delete_event(state: SharedState, subject: Subject, event_id: u64) -> Result<Response> {
    let permissions = require_writer(
        &state,
        &subject,
        (
            "Permissions insuffisantes pour supprimer cet événement",
            "Insufficient permissions to delete this event",
        ),
    )
    .await?;

    let current = state
        .store
        .events()
        .get_event(event_id)
        .await?
        .ok_or_else(event_not_found)?;
    require_group_scope(&state, &subject, &permissions, &[current.group_id]).await?;

    if !state.store.events().delete_event(event_id).await? {
        return Err(event_not_found());
    }
    log::info!("Event {} deleted by user {}", event_id, subject.id);

    Ok(success(
        Empty {},
        Messages::new("Événement supprimé avec succès", "Event deleted successfully"),
    ))
}

pub async fn list_events(state: SharedState, subject: Subject, range: EventRange) -> Result<Response> {
    let (range_start, range_end) = resolve_range(&range, Utc::now().naive_utc())?;
    let permissions = state.guard.permissions(&subject).await?;

    let events = if permissions.is_admin() {
        state
            .store
            .events()
            .events_overlapping(range_start, range_end, None)
            .await?
    } else {
        let groups = state.store.memberships().group_ids(subject.id).await?;
        if groups.is_empty() {
            return Ok(success(
                Vec::<CalendarEvent>::new(),
                Messages::new("Aucun événement disponible", "No events available"),
            ));
        }
        state
            .store
            .events()
            .events_overlapping(range_start, range_end, Some(&groups))
            .await?
    };

    Ok(success(
        events,
        Messages::new(
            "Événements récupérés avec succès",
            "Events retrieved successfully",
        ),
    ))
}

pub async fn export_events(state: SharedState) -> Result<Response> {
    let events = state.store.events().all_events().await?;
    Ok(success(
        events,
        Messages::new(
            "Événements récupérés avec succès",
            "Events retrieved successfully",
        ),
    ))
}
