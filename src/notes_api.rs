use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use tracing::{debug, info};

use crate::{
    api::non_blank,
    auth::AuthUser,
    error::ApiError,
    models::{
        MessageResponse, Note, NoteDetail, NoteRequest, Notebook, NotebookRequest, SearchHit,
        SearchQuery, Tag, TagRequest, TagWithCount,
    },
    store::{notebooks, notes, search as note_search, tags},
    upload_store::delete_stored_files,
    AppState,
};

fn notebook_name(payload: NotebookRequest) -> Result<String, ApiError> {
    non_blank(payload.name).ok_or_else(|| ApiError::BadRequest("Notebook name is required".to_string()))
}

fn note_title(payload: &NoteRequest) -> Result<String, ApiError> {
    non_blank(payload.title.clone())
        .ok_or_else(|| ApiError::BadRequest("Note title is required".to_string()))
}

pub async fn list_notebooks(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<Notebook>>, ApiError> {
    let user_id = auth.id;
    Ok(Json(state.db.call(move |conn| notebooks::list(conn, user_id)).await?))
}

pub async fn create_notebook(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<NotebookRequest>,
) -> Result<(StatusCode, Json<Notebook>), ApiError> {
    let name = notebook_name(payload)?;
    let user_id = auth.id;
    let notebook = state
        .db
        .call(move |conn| notebooks::create(conn, user_id, &name))
        .await?;
    info!(user_id, notebook_id = notebook.id, "Notebook created");
    Ok((StatusCode::CREATED, Json(notebook)))
}

pub async fn rename_notebook(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(notebook_id): Path<i64>,
    Json(payload): Json<NotebookRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let name = notebook_name(payload)?;
    let user_id = auth.id;
    state
        .db
        .call(move |conn| notebooks::rename(conn, user_id, notebook_id, &name))
        .await?;
    Ok(Json(MessageResponse::new("Notebook updated")))
}

pub async fn delete_notebook(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(notebook_id): Path<i64>,
) -> Result<Json<MessageResponse>, ApiError> {
    let user_id = auth.id;
    state
        .db
        .call(move |conn| notebooks::delete(conn, user_id, notebook_id))
        .await?;
    info!(user_id, notebook_id, "Notebook deleted");
    Ok(Json(MessageResponse::new("Notebook deleted")))
}

pub async fn list_notes(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<Note>>, ApiError> {
    let user_id = auth.id;
    Ok(Json(state.db.call(move |conn| notes::list(conn, user_id)).await?))
}

pub async fn list_notebook_notes(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(notebook_id): Path<i64>,
) -> Result<Json<Vec<Note>>, ApiError> {
    let user_id = auth.id;
    Ok(Json(
        state
            .db
            .call(move |conn| notes::list_in_notebook(conn, user_id, notebook_id))
            .await?,
    ))
}

pub async fn list_tagged_notes(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(tag_name): Path<String>,
) -> Result<Json<Vec<Note>>, ApiError> {
    let user_id = auth.id;
    Ok(Json(
        state
            .db
            .call(move |conn| notes::list_with_tag(conn, user_id, &tag_name))
            .await?,
    ))
}

pub async fn get_note(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(note_id): Path<i64>,
) -> Result<Json<NoteDetail>, ApiError> {
    let user_id = auth.id;
    Ok(Json(
        state
            .db
            .call(move |conn| notes::detail(conn, user_id, note_id))
            .await?,
    ))
}

pub async fn create_note(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<NoteRequest>,
) -> Result<(StatusCode, Json<Note>), ApiError> {
    let title = note_title(&payload)?;
    let user_id = auth.id;
    let note = state
        .db
        .call(move |conn| {
            notes::create(
                conn,
                user_id,
                &title,
                payload.content.as_deref(),
                payload.notebook_id,
            )
        })
        .await?;
    info!(user_id, note_id = note.id, "Note created");
    Ok((StatusCode::CREATED, Json(note)))
}

pub async fn update_note(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(note_id): Path<i64>,
    Json(payload): Json<NoteRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let title = note_title(&payload)?;
    let user_id = auth.id;
    state
        .db
        .call(move |conn| {
            notes::update(
                conn,
                user_id,
                note_id,
                &title,
                payload.content.as_deref(),
                payload.notebook_id,
            )
        })
        .await?;
    debug!(user_id, note_id, "Note updated");
    Ok(Json(MessageResponse::new("Note updated")))
}

pub async fn delete_note(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(note_id): Path<i64>,
) -> Result<Json<MessageResponse>, ApiError> {
    let user_id = auth.id;
    let files = state
        .db
        .call(move |conn| notes::delete(conn, user_id, note_id))
        .await?;
    delete_stored_files(&state.config.upload_dir, &files).await;
    info!(user_id, note_id, removed_files = files.len(), "Note deleted");
    Ok(Json(MessageResponse::new("Note deleted")))
}

pub async fn list_tags(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<TagWithCount>>, ApiError> {
    let user_id = auth.id;
    Ok(Json(
        state
            .db
            .call(move |conn| tags::list_for_user(conn, user_id))
            .await?,
    ))
}

pub async fn add_tag(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(note_id): Path<i64>,
    Json(payload): Json<TagRequest>,
) -> Result<(StatusCode, Json<Tag>), ApiError> {
    let name = non_blank(payload.name)
        .ok_or_else(|| ApiError::BadRequest("Tag name is required".to_string()))?;
    let user_id = auth.id;
    let tag = state
        .db
        .call(move |conn| {
            notes::get(conn, user_id, note_id)?;
            tags::attach(conn, note_id, &name)
        })
        .await?;
    Ok((StatusCode::CREATED, Json(tag)))
}

pub async fn remove_tag(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((note_id, tag_id)): Path<(i64, i64)>,
) -> Result<Json<MessageResponse>, ApiError> {
    let user_id = auth.id;
    state
        .db
        .call(move |conn| {
            notes::get(conn, user_id, note_id)?;
            tags::detach(conn, note_id, tag_id)
        })
        .await?;
    Ok(Json(MessageResponse::new("Tag removed")))
}

pub async fn search(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<SearchHit>>, ApiError> {
    let q = non_blank(query.q)
        .ok_or_else(|| ApiError::BadRequest("Search query is required".to_string()))?;
    let user_id = auth.id;
    let fts_enabled = state.db.fts_enabled();
    let hits = state
        .db
        .call(move |conn| note_search::search(conn, user_id, &q, fts_enabled))
        .await?;
    debug!(user_id, hits = hits.len(), "Search served");
    Ok(Json(hits))
}
