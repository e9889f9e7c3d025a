use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};

use crate::{
    auth::{hash_password, verify_password, AuthUser},
    error::ApiError,
    models::{
        CredentialsRequest, DashboardResponse, DashboardUser, LoginResponse, MessageResponse,
        ProfileUpdateRequest, ProfileUpdateResponse, RegisterResponse, Role,
        SignupStatusResponse, ToggleSignupRequest, ToggleSignupResponse, UserProfile,
    },
    store::{notebooks, settings, users},
    upload_store::delete_stored_files,
    AppState,
};

/// Trimmed, non-empty value or `None`.
pub fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub async fn healthz() -> impl IntoResponse {
    Json(json!({ "ok": true, "timestamp": Utc::now() }))
}

pub async fn welcome() -> Json<MessageResponse> {
    Json(MessageResponse::new("Welcome to the Notes API. Backend is running."))
}

pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<CredentialsRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), ApiError> {
    let (Some(username), Some(password)) = (
        non_blank(payload.username),
        payload.password.filter(|p| !p.is_empty()),
    ) else {
        return Err(ApiError::BadRequest(
            "Please provide username and password".to_string(),
        ));
    };

    let password_hash = hash_password(password).await?;
    let name = username.clone();
    let (user_id, role) = state
        .db
        .call(move |conn| users::register(conn, &name, &password_hash))
        .await?;

    info!(user_id, username = %username, role = role.as_str(), "User registered");

    let message = match role {
        Role::Admin => "Admin account created successfully! You are now the administrator.",
        Role::User => "User registered successfully",
    };
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: message.to_string(),
            user_id,
            role,
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<CredentialsRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let invalid = || ApiError::Unauthorized("Invalid credentials".to_string());
    let (Some(username), Some(password)) = (non_blank(payload.username), payload.password) else {
        return Err(invalid());
    };

    let limiter_key = username.to_lowercase();
    let decision = state.login_limiter.check(&limiter_key).await;
    if !decision.allowed {
        warn!(username = %username, "Login rate limit exceeded");
        return Err(ApiError::TooManyRequests(decision.headers));
    }

    let lookup = username.clone();
    let user = state
        .db
        .call(move |conn| users::find_by_username(conn, &lookup))
        .await?
        .ok_or_else(invalid)?;

    if !verify_password(password, user.password_hash.clone()).await? {
        info!(username = %username, "Failed login attempt");
        return Err(invalid());
    }
    state.login_limiter.forget(&limiter_key).await;

    let token = state
        .tokens
        .issue(user.id, &user.username, user.role)
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    info!(user_id = user.id, "User logged in");
    Ok(Json(LoginResponse {
        token,
        user: UserProfile {
            id: user.id,
            username: user.username,
            location: user.location,
            role: user.role,
        },
    }))
}

pub async fn signup_status(
    State(state): State<AppState>,
) -> Result<Json<SignupStatusResponse>, ApiError> {
    let signup_enabled = state.db.call(|conn| settings::signup_enabled(conn)).await?;
    Ok(Json(SignupStatusResponse { signup_enabled }))
}

pub async fn toggle_signup(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<ToggleSignupRequest>,
) -> Result<Json<ToggleSignupResponse>, ApiError> {
    auth.require_admin()?;

    let enabled = payload.enabled;
    state
        .db
        .call(move |conn| settings::set_signup_enabled(conn, enabled))
        .await?;

    info!(admin_id = auth.id, admin = %auth.username, enabled, "Signup setting changed");
    Ok(Json(ToggleSignupResponse {
        message: format!(
            "User registration {}",
            if enabled { "enabled" } else { "disabled" }
        ),
        signup_enabled: enabled,
    }))
}

pub async fn get_profile(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<UserProfile>, ApiError> {
    let profile = state.db.call(move |conn| users::profile(conn, auth.id)).await?;
    Ok(Json(profile))
}

pub async fn update_profile(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<ProfileUpdateRequest>,
) -> Result<Json<ProfileUpdateResponse>, ApiError> {
    let location = non_blank(payload.location);
    let stored = location.clone();
    state
        .db
        .call(move |conn| users::update_location(conn, auth.id, stored.as_deref()))
        .await?;

    Ok(Json(ProfileUpdateResponse {
        message: "Profile updated successfully".to_string(),
        location,
    }))
}

pub async fn delete_account(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<MessageResponse>, ApiError> {
    let user_id = auth.id;
    let files = state.db.call(move |conn| users::delete(conn, user_id)).await?;
    delete_stored_files(&state.config.upload_dir, &files).await;

    info!(user_id, username = %auth.username, removed_files = files.len(), "Account deleted");
    Ok(Json(MessageResponse::new("Account deleted")))
}

pub async fn dashboard(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<DashboardResponse>, ApiError> {
    let user_id = auth.id;
    let (profile, notebooks) = state
        .db
        .call(move |conn| {
            Ok((
                users::profile(conn, user_id)?,
                notebooks::list_summaries(conn, user_id)?,
            ))
        })
        .await?;

    let weather = state.weather.report_for(profile.location.as_deref()).await;

    Ok(Json(DashboardResponse {
        user: DashboardUser {
            username: profile.username,
            location: profile.location,
        },
        notebooks,
        weather,
    }))
}
