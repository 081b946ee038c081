use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use tracing::{info, instrument};

use crate::{
    auth::extractors::AuthUser,
    auth::handlers::is_valid_email,
    contacts::dto::{BirthdayQuery, ContactCreate, ContactFilter, ContactUpdate, SearchQuery},
    contacts::repo::{self, Contact},
    error::ApiError,
    state::AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/contacts", get(list_contacts).post(create_contact))
        .route("/contacts/search", get(search_contacts))
        .route("/contacts/birthdays", get(upcoming_birthdays))
        .route(
            "/contacts/:id",
            get(get_contact).put(update_contact).delete(delete_contact),
        )
}

#[instrument(skip(state, payload))]
pub async fn create_contact(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<ContactCreate>,
) -> Result<(StatusCode, Json<Contact>), ApiError> {
    if payload.first_name.is_empty() || payload.last_name.is_empty() {
        return Err(ApiError::Validation("Name must not be empty".into()));
    }
    if !is_valid_email(&payload.email) {
        return Err(ApiError::Validation("Invalid email".into()));
    }
    if payload.phone.len() < 3 {
        return Err(ApiError::Validation("Phone too short".into()));
    }

    let contact = repo::create(&state.db, user_id, &payload).await?;
    info!(user_id = %user_id, contact_id = %contact.id, "contact created");
    Ok((StatusCode::CREATED, Json(contact)))
}

#[instrument(skip(state))]
pub async fn list_contacts(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(filter): Query<ContactFilter>,
) -> Result<Json<Vec<Contact>>, ApiError> {
    let contacts = repo::list(&state.db, user_id, &filter).await?;
    Ok(Json(contacts))
}

#[instrument(skip(state))]
pub async fn search_contacts(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<Contact>>, ApiError> {
    let contacts = repo::search(&state.db, user_id, &query.q).await?;
    Ok(Json(contacts))
}

#[instrument(skip(state))]
pub async fn upcoming_birthdays(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(query): Query<BirthdayQuery>,
) -> Result<Json<Vec<Contact>>, ApiError> {
    let contacts = repo::upcoming_birthdays(&state.db, user_id, query.days).await?;
    Ok(Json(contacts))
}

#[instrument(skip(state))]
pub async fn get_contact(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<Contact>, ApiError> {
    let contact = repo::get(&state.db, user_id, id)
        .await?
        .ok_or(ApiError::NotFound("contact"))?;
    Ok(Json(contact))
}

#[instrument(skip(state, payload))]
pub async fn update_contact(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<i64>,
    Json(payload): Json<ContactUpdate>,
) -> Result<Json<Contact>, ApiError> {
    if let Some(email) = &payload.email {
        if !is_valid_email(email) {
            return Err(ApiError::Validation("Invalid email".into()));
        }
    }
    let contact = repo::update(&state.db, user_id, id, &payload)
        .await?
        .ok_or(ApiError::NotFound("contact"))?;
    info!(user_id = %user_id, contact_id = %id, "contact updated");
    Ok(Json(contact))
}

#[instrument(skip(state))]
pub async fn delete_contact(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    if !repo::delete(&state.db, user_id, id).await? {
        return Err(ApiError::NotFound("contact"));
    }
    info!(user_id = %user_id, contact_id = %id, "contact deleted");
    Ok(StatusCode::NO_CONTENT)
}
