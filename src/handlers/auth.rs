// src/handlers/auth.rs

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::Utc;
use serde_json::json;
use sqlx::SqlitePool;
use validator::Validate;

use crate::{
    config::Config,
    error::{AppError, is_unique_violation},
    models::user::{CreateUserRequest, LoginRequest, ROLE_USER, User},
    utils::{
        hash::{hash_password, verify_password},
        jwt::sign_jwt,
    },
};

/// Registers a new user.
///
/// Hashes the password using Argon2 before storing it.
/// Returns 201 Created and the user object (excluding password).
pub async fn register(
    State(pool): State<SqlitePool>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let hashed_password = hash_password(&payload.password)?;

    let id = sqlx::query(
        "INSERT INTO users (username, password, role, created_at) VALUES (?, ?, ?, ?)",
    )
    .bind(&payload.username)
    .bind(&hashed_password)
    .bind(ROLE_USER)
    .bind(Utc::now())
    .execute(&pool)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict(format!("Username '{}' already exists", payload.username))
        } else {
            tracing::error!("Failed to register user: {:?}", e);
            AppError::from(e)
        }
    })?
    .last_insert_rowid();

    let user = sqlx::query_as::<_, User>(
        "SELECT id, username, password, role, created_at FROM users WHERE id = ?",
    )
    .bind(id)
    .fetch_one(&pool)
    .await?;

    tracing::info!("Registered user {} ({})", user.username, user.id);

    Ok((StatusCode::CREATED, Json(user)))
}

/// Authenticates a user and returns a JWT token.
pub async fn login(
    State(pool): State<SqlitePool>,
    State(config): State<Config>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let user = sqlx::query_as::<_, User>(
        "SELECT id, username, password, role, created_at FROM users WHERE username = ?",
    )
    .bind(&payload.username)
    .fetch_optional(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Login DB error: {:?}", e);
        AppError::from(e)
    })?;

    // Same message for unknown user and bad password
    let user = user.ok_or(AppError::AuthError("Invalid credentials".to_string()))?;

    if !verify_password(&payload.password, &user.password)? {
        return Err(AppError::AuthError("Invalid credentials".to_string()));
    }

    let token = sign_jwt(
        user.id,
        &user.role,
        &config.jwt_secret,
        config.jwt_expiration,
    )?;

    Ok(Json(json!({
        "token": token,
        "type": "Bearer",
        "role": user.role
    })))
}
