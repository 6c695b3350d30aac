// src/handlers/admin.rs

use axum::{
    Json,
    extract::{Extension, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::SqlitePool;
use validator::Validate;

use crate::{
    error::{AppError, is_unique_violation},
    handlers::posts::attach_tags,
    models::{
        post::{POST_SELECT, Post},
        tag::{CreateTagRequest, Tag, normalize_tag},
        user::{ROLE_ADMIN, UpdateRoleRequest, User},
    },
    utils::jwt::Claims,
};

/// Lists all users in the system.
/// Admin only.
pub async fn list_users(State(pool): State<SqlitePool>) -> Result<impl IntoResponse, AppError> {
    let users = sqlx::query_as::<_, User>(
        "SELECT id, username, password, role, created_at FROM users ORDER BY id ASC",
    )
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to list users: {:?}", e);
        AppError::from(e)
    })?;

    Ok(Json(users))
}

/// Changes a user's role.
/// Admin only. Admins cannot demote themselves.
pub async fn update_user_role(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateRoleRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    if claims.user_id()? == id && payload.role != ROLE_ADMIN {
        return Err(AppError::BadRequest(
            "You cannot remove your own admin role".to_string(),
        ));
    }

    let result = sqlx::query("UPDATE users SET role = ? WHERE id = ?")
        .bind(&payload.role)
        .bind(id)
        .execute(&pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("User not found".to_string()));
    }

    tracing::info!("User {} role set to {} by {}", id, payload.role, claims.sub);

    Ok(StatusCode::OK)
}

/// Deletes a user by ID, along with their posts and comments.
/// Admin only. Prevents deleting self.
pub async fn delete_user(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    if claims.user_id()? == id {
        return Err(AppError::BadRequest("You cannot delete yourself".to_string()));
    }

    let result = sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(id)
        .execute(&pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("User not found".to_string()));
    }

    tracing::info!("User {} deleted by {}", id, claims.sub);

    Ok(StatusCode::NO_CONTENT)
}

/// Lists every post in any status, newest first.
/// Admin only.
pub async fn list_all_posts(
    State(pool): State<SqlitePool>,
) -> Result<impl IntoResponse, AppError> {
    let sql = format!("{} ORDER BY p.id DESC", POST_SELECT);

    let mut conn = pool.acquire().await?;
    let mut posts = sqlx::query_as::<_, Post>(&sql)
        .fetch_all(&mut *conn)
        .await?;
    attach_tags(&mut conn, &mut posts).await?;

    Ok(Json(posts))
}

/// Creates a tag ahead of use.
/// Admin only.
pub async fn create_tag(
    State(pool): State<SqlitePool>,
    Json(payload): Json<CreateTagRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let name = normalize_tag(&payload.name)
        .ok_or(AppError::BadRequest("Tag name is empty".to_string()))?;

    let id = sqlx::query("INSERT INTO tags (name) VALUES (?)")
        .bind(&name)
        .execute(&pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict(format!("Tag '{}' already exists", name))
            } else {
                AppError::from(e)
            }
        })?
        .last_insert_rowid();

    Ok((StatusCode::CREATED, Json(Tag { id, name })))
}

/// Deletes a tag and detaches it from every post.
/// Admin only.
pub async fn delete_tag(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let result = sqlx::query("DELETE FROM tags WHERE id = ?")
        .bind(id)
        .execute(&pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Tag not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}
