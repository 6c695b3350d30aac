// src/handlers/interaction.rs

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        comment::{CommentResponse, CreateCommentRequest},
        post::is_visible,
        reaction::{ReactionKind, ReactionRequest, ReactionResponse},
    },
    sanitizer::HtmlSanitizer,
    utils::jwt::Claims,
};

const COMMENT_SELECT: &str = r#"
    SELECT c.id, c.post_id, c.author_id, u.username AS author, c.parent_id, c.content, c.created_at
    FROM comments c
    JOIN users u ON u.id = c.author_id
"#;

/// Fails with 404 unless the post exists and is publicly visible.
async fn ensure_visible_post(conn: &mut SqliteConnection, post_id: i64) -> Result<(), AppError> {
    let row: Option<(String, Option<DateTime<Utc>>)> =
        sqlx::query_as("SELECT status, publish_at FROM posts WHERE id = ?")
            .bind(post_id)
            .fetch_optional(&mut *conn)
            .await?;

    match row {
        Some((status, publish_at)) if is_visible(&status, publish_at, Utc::now()) => Ok(()),
        _ => Err(AppError::NotFound("Post not found".to_string())),
    }
}

/// Set, switch or clear the caller's like/dislike on a post.
///
/// Sending the reaction already held clears it; sending the other one switches.
pub async fn toggle_reaction(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(post_id): Path<i64>,
    Json(payload): Json<ReactionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;

    let mut tx = pool.begin().await?;

    ensure_visible_post(&mut tx, post_id).await?;

    // 1. Check current reaction
    let existing: Option<String> = sqlx::query_scalar(
        "SELECT kind FROM post_reactions WHERE user_id = ? AND post_id = ?",
    )
    .bind(user_id)
    .bind(post_id)
    .fetch_optional(&mut *tx)
    .await?;

    let current = existing.as_deref().and_then(ReactionKind::from_db);

    // 2. Apply toggle
    let reaction = if current == Some(payload.kind) {
        sqlx::query("DELETE FROM post_reactions WHERE user_id = ? AND post_id = ?")
            .bind(user_id)
            .bind(post_id)
            .execute(&mut *tx)
            .await?;
        None
    } else {
        sqlx::query(
            r#"
            INSERT INTO post_reactions (user_id, post_id, kind, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(user_id, post_id) DO UPDATE SET kind = excluded.kind
            "#,
        )
        .bind(user_id)
        .bind(post_id)
        .bind(payload.kind.as_str())
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;
        Some(payload.kind)
    };

    // 3. Fresh totals
    let (likes, dislikes): (i64, i64) = sqlx::query_as(
        r#"
        SELECT
            COALESCE(SUM(CASE WHEN kind = 'like' THEN 1 ELSE 0 END), 0),
            COALESCE(SUM(CASE WHEN kind = 'dislike' THEN 1 ELSE 0 END), 0)
        FROM post_reactions
        WHERE post_id = ?
        "#,
    )
    .bind(post_id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(Json(ReactionResponse {
        reaction,
        likes,
        dislikes,
    }))
}

/// Create a new comment.
/// Comment bodies go through the same sanitizer as posts.
pub async fn create_comment(
    State(pool): State<SqlitePool>,
    State(sanitizer): State<Arc<HtmlSanitizer>>,
    Extension(claims): Extension<Claims>,
    Path(post_id): Path<i64>,
    Json(payload): Json<CreateCommentRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let user_id = claims.user_id()?;

    let content = sanitizer.sanitize_blocking(payload.content).await?;
    if content.trim().is_empty() {
        return Err(AppError::BadRequest(
            "Comment has no content left after sanitization".to_string(),
        ));
    }

    let mut tx = pool.begin().await?;

    ensure_visible_post(&mut tx, post_id).await?;

    // Replies must stay within the same post
    if let Some(parent_id) = payload.parent_id {
        let found: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM comments WHERE id = ? AND post_id = ?")
                .bind(parent_id)
                .bind(post_id)
                .fetch_one(&mut *tx)
                .await?;
        if found == 0 {
            return Err(AppError::NotFound("Parent comment not found".to_string()));
        }
    }

    let new_id = sqlx::query(
        r#"
        INSERT INTO comments (post_id, author_id, parent_id, content, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(post_id)
    .bind(user_id)
    .bind(payload.parent_id)
    .bind(&content)
    .bind(Utc::now())
    .execute(&mut *tx)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create comment: {:?}", e);
        AppError::from(e)
    })?
    .last_insert_rowid();

    let sql = format!("{} WHERE c.id = ?", COMMENT_SELECT);
    let comment = sqlx::query_as::<_, CommentResponse>(&sql)
        .bind(new_id)
        .fetch_one(&mut *tx)
        .await?;

    tx.commit().await?;

    Ok((StatusCode::CREATED, Json(comment)))
}

/// List all comments for a visible post, oldest first.
pub async fn list_comments(
    State(pool): State<SqlitePool>,
    Path(post_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let mut conn = pool.acquire().await?;
    ensure_visible_post(&mut conn, post_id).await?;

    let sql = format!("{} WHERE c.post_id = ? ORDER BY c.id ASC", COMMENT_SELECT);
    let comments = sqlx::query_as::<_, CommentResponse>(&sql)
        .bind(post_id)
        .fetch_all(&mut *conn)
        .await?;

    Ok(Json(comments))
}

/// Delete a comment and its replies.
/// Requires: Login + (Author OR Admin).
pub async fn delete_comment(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let author_id: i64 = sqlx::query_scalar("SELECT author_id FROM comments WHERE id = ?")
        .bind(id)
        .fetch_optional(&pool)
        .await?
        .ok_or(AppError::NotFound("Comment not found".to_string()))?;

    if !claims.can_modify(author_id)? {
        return Err(AppError::Forbidden(
            "You are not authorized to delete this comment".to_string(),
        ));
    }

    sqlx::query("DELETE FROM comments WHERE id = ?")
        .bind(id)
        .execute(&pool)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}
