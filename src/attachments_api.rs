use axum::{
    extract::{multipart::MultipartError, Multipart, Path, State},
    http::{header, HeaderValue, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use tokio::fs;
use tracing::{info, warn};

use crate::{
    auth::AuthUser,
    error::ApiError,
    models::{Attachment, MessageResponse},
    store::{attachments, notes},
    upload_store::{delete_file_if_exists, stored_file_name, stored_path, write_new_file},
    AppState,
};

const FALLBACK_MIME: &str = "application/octet-stream";
const NAME_ATTEMPTS: i64 = 5;

struct UploadedFile {
    original_name: String,
    content_type: Option<String>,
    bytes: Vec<u8>,
}

fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge("Uploaded file is too large.".to_string())
    } else {
        ApiError::BadRequest(format!("Failed to read upload: {}", err.body_text()))
    }
}

async fn read_file_field(multipart: &mut Multipart) -> Result<Option<UploadedFile>, ApiError> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") {
            continue;
        }
        let original_name = field.file_name().unwrap_or("file").to_string();
        let content_type = field
            .content_type()
            .map(str::to_string)
            .filter(|ct| !ct.is_empty() && ct != FALLBACK_MIME);
        let bytes = field.bytes().await.map_err(multipart_error)?.to_vec();
        return Ok(Some(UploadedFile {
            original_name,
            content_type,
            bytes,
        }));
    }
    Ok(None)
}

/// Declared content type, else one sniffed from the magic bytes.
fn resolve_mime(declared: Option<String>, bytes: &[u8]) -> String {
    declared
        .or_else(|| infer::get(bytes).map(|kind| kind.mime_type().to_string()))
        .unwrap_or_else(|| FALLBACK_MIME.to_string())
}

/// Loads an attachment and checks that the caller owns its note.
async fn owned_attachment(state: &AppState, auth: &AuthUser, attachment_id: i64) -> Result<Attachment, ApiError> {
    let (attachment, owner) = state
        .db
        .call(move |conn| attachments::find_with_owner(conn, attachment_id))
        .await?
        .ok_or_else(|| ApiError::NotFound("Attachment not found.".to_string()))?;
    if owner != auth.id {
        return Err(ApiError::Forbidden(
            "You do not have permission to access this attachment.".to_string(),
        ));
    }
    Ok(attachment)
}

pub async fn upload_attachment(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(note_id): Path<i64>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<Attachment>), ApiError> {
    // Ownership first, so nothing is written for a note the caller can't touch.
    let owner = state
        .db
        .call(move |conn| notes::owner(conn, note_id))
        .await?
        .ok_or_else(|| ApiError::NotFound("Note not found.".to_string()))?;
    if owner != auth.id {
        return Err(ApiError::Forbidden(
            "You do not have permission to attach files to this note.".to_string(),
        ));
    }

    let upload = read_file_field(&mut multipart)
        .await?
        .ok_or_else(|| ApiError::BadRequest("No file uploaded.".to_string()))?;
    let mimetype = resolve_mime(upload.content_type, &upload.bytes);

    let root = &state.config.upload_dir;
    let millis = Utc::now().timestamp_millis();
    let mut stored = None;
    for attempt in 0..NAME_ATTEMPTS {
        let file_name = stored_file_name(&upload.original_name, millis + attempt);
        let path = root.join(&file_name);
        match write_new_file(&path, &upload.bytes).await {
            Ok(()) => {
                stored = Some((file_name, path));
                break;
            }
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(err) => {
                return Err(ApiError::Internal(format!(
                    "failed to store upload {}: {err}",
                    path.display()
                )))
            }
        }
    }
    let (file_name, path) = stored.ok_or_else(|| {
        ApiError::Internal(format!(
            "no free file name for upload {}",
            upload.original_name
        ))
    })?;

    let row_name = file_name.clone();
    let row_mime = mimetype.clone();
    let inserted = state
        .db
        .call(move |conn| attachments::insert(conn, note_id, &row_name, Some(&row_mime)))
        .await;

    match inserted {
        Ok(attachment) => {
            info!(
                user_id = auth.id,
                note_id,
                attachment_id = attachment.id,
                size = upload.bytes.len(),
                mimetype = %mimetype,
                "Attachment stored"
            );
            Ok((StatusCode::CREATED, Json(attachment)))
        }
        Err(err) => {
            if let Err(cleanup) = delete_file_if_exists(&path).await {
                warn!("Failed removing upload after insert error: {cleanup:#}");
            }
            Err(err.into())
        }
    }
}

pub async fn download_attachment(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(attachment_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let attachment = owned_attachment(&state, &auth, attachment_id).await?;
    let path = stored_path(&state.config.upload_dir, &attachment.filename)
        .ok_or_else(|| ApiError::Gone("Attachment file no longer exists.".to_string()))?;

    let bytes = match fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(ApiError::Gone("Attachment file no longer exists.".to_string()));
        }
        Err(err) => {
            return Err(ApiError::Internal(format!(
                "failed to read attachment {}: {err}",
                path.display()
            )));
        }
    };

    let content_type = attachment
        .mimetype
        .as_deref()
        .and_then(|mime| HeaderValue::from_str(mime).ok())
        .unwrap_or_else(|| HeaderValue::from_static(FALLBACK_MIME));
    let disposition =
        HeaderValue::from_str(&format!("attachment; filename=\"{}\"", attachment.filename))
            .map_err(|e| ApiError::Internal(format!("bad content disposition: {e}")))?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    ))
}

pub async fn delete_attachment(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(attachment_id): Path<i64>,
) -> Result<Json<MessageResponse>, ApiError> {
    let attachment = owned_attachment(&state, &auth, attachment_id).await?;

    match stored_path(&state.config.upload_dir, &attachment.filename) {
        Some(path) => {
            if let Err(err) = delete_file_if_exists(&path).await {
                warn!("Failed removing attachment file: {err:#}");
            }
        }
        None => warn!(file = %attachment.filename, "Attachment has unsafe stored name"),
    }

    state
        .db
        .call(move |conn| attachments::delete(conn, attachment_id))
        .await?;

    info!(user_id = auth.id, attachment_id, "Attachment deleted");
    Ok(Json(MessageResponse::new("Attachment deleted successfully.")))
}
