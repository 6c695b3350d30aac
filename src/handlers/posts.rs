// src/handlers/posts.rs

use std::{collections::HashMap, sync::Arc};

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        post::{
            CreatePostRequest, POST_SELECT, Post, PostListParams, PostStatus, UpdatePostRequest,
        },
        tag::{normalize_tag, normalize_tags},
    },
    sanitizer::HtmlSanitizer,
    utils::{
        jwt::Claims,
        slug::{slugify, unique_slug},
    },
};

/// Loads one post with its tags, regardless of status.
pub(crate) async fn load_post(
    conn: &mut SqliteConnection,
    id: i64,
) -> Result<Option<Post>, sqlx::Error> {
    let sql = format!("{} WHERE p.id = ?", POST_SELECT);
    let post = sqlx::query_as::<_, Post>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    match post {
        Some(post) => {
            let mut posts = [post];
            attach_tags(conn, &mut posts).await?;
            let [post] = posts;
            Ok(Some(post))
        }
        None => Ok(None),
    }
}

/// Fills `tags` on every post with a single query.
pub(crate) async fn attach_tags(
    conn: &mut SqliteConnection,
    posts: &mut [Post],
) -> Result<(), sqlx::Error> {
    if posts.is_empty() {
        return Ok(());
    }

    let mut qb = QueryBuilder::<Sqlite>::new(
        "SELECT pt.post_id, t.name FROM post_tags pt JOIN tags t ON t.id = pt.tag_id WHERE pt.post_id IN (",
    );
    let mut ids = qb.separated(", ");
    for post in posts.iter() {
        ids.push_bind(post.id);
    }
    ids.push_unseparated(") ORDER BY t.name");

    let rows = qb
        .build_query_as::<(i64, String)>()
        .fetch_all(&mut *conn)
        .await?;

    let mut by_post: HashMap<i64, Vec<String>> = HashMap::new();
    for (post_id, name) in rows {
        by_post.entry(post_id).or_default().push(name);
    }
    for post in posts.iter_mut() {
        post.tags = by_post.remove(&post.id).unwrap_or_default();
    }
    Ok(())
}

/// Replaces the post's tag set, creating tags on first use.
async fn set_post_tags(
    conn: &mut SqliteConnection,
    post_id: i64,
    tags: &[String],
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM post_tags WHERE post_id = ?")
        .bind(post_id)
        .execute(&mut *conn)
        .await?;

    for name in tags {
        sqlx::query("INSERT INTO tags (name) VALUES (?) ON CONFLICT(name) DO NOTHING")
            .bind(name)
            .execute(&mut *conn)
            .await?;

        let tag_id: i64 = sqlx::query_scalar("SELECT id FROM tags WHERE name = ?")
            .bind(name)
            .fetch_one(&mut *conn)
            .await?;

        sqlx::query("INSERT OR IGNORE INTO post_tags (post_id, tag_id) VALUES (?, ?)")
            .bind(post_id)
            .bind(tag_id)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

/// Works out `publish_at` for a post entering `status`.
///
/// Drafts have none; published posts keep a past time or get `now`;
/// scheduled posts need one, either requested or already stored.
fn resolve_schedule(
    status: PostStatus,
    requested: Option<DateTime<Utc>>,
    current: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<Option<DateTime<Utc>>, AppError> {
    match status {
        PostStatus::Draft => Ok(None),
        PostStatus::Published => Ok(Some(
            requested.or(current).filter(|at| *at <= now).unwrap_or(now),
        )),
        PostStatus::Scheduled => requested.or(current).map(Some).ok_or_else(|| {
            AppError::BadRequest("publish_at is required for scheduled posts".to_string())
        }),
    }
}

fn map_write_error(e: sqlx::Error) -> AppError {
    match e.as_database_error() {
        Some(db) if db.is_foreign_key_violation() => {
            AppError::AuthError("Account no longer exists".to_string())
        }
        Some(db) if db.is_unique_violation() => AppError::Conflict("Slug already in use".to_string()),
        _ => {
            tracing::error!("Failed to write post: {:?}", e);
            AppError::from(e)
        }
    }
}

/// Create a new post.
/// The editor HTML is sanitized before anything is written.
pub async fn create_post(
    State(pool): State<SqlitePool>,
    State(sanitizer): State<Arc<HtmlSanitizer>>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreatePostRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let author_id = claims.user_id()?;
    let now = Utc::now();

    let status = payload.status.unwrap_or(PostStatus::Draft);
    let publish_at = resolve_schedule(status, payload.publish_at, None, now)?;
    let content = sanitizer.sanitize_blocking(payload.content).await?;
    let tags = normalize_tags(&payload.tags);
    let base_slug = slugify(payload.slug.as_deref().unwrap_or(&payload.title));

    let mut tx = pool.begin().await?;

    let slug = unique_slug(&mut tx, &base_slug, None).await?;

    let post_id = sqlx::query(
        r#"
        INSERT INTO posts (author_id, title, slug, content, status, publish_at, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(author_id)
    .bind(&payload.title)
    .bind(&slug)
    .bind(&content)
    .bind(status.as_str())
    .bind(publish_at)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await
    .map_err(map_write_error)?
    .last_insert_rowid();

    set_post_tags(&mut tx, post_id, &tags).await?;

    let post = load_post(&mut tx, post_id)
        .await?
        .ok_or_else(|| AppError::InternalServerError("Created post vanished".to_string()))?;

    tx.commit().await?;

    tracing::info!("Post {} created by user {} ({})", post_id, author_id, status);

    Ok((StatusCode::CREATED, Json(post)))
}

/// Edit a post.
/// Requires: Login + (Author OR Admin). New content is sanitized again.
pub async fn update_post(
    State(pool): State<SqlitePool>,
    State(sanitizer): State<Arc<HtmlSanitizer>>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdatePostRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let now = Utc::now();

    let content = match payload.content {
        Some(raw) => Some(sanitizer.sanitize_blocking(raw).await?),
        None => None,
    };

    let mut tx = pool.begin().await?;

    let existing = load_post(&mut tx, id)
        .await?
        .ok_or(AppError::NotFound("Post not found".to_string()))?;

    if !claims.can_modify(existing.author_id)? {
        return Err(AppError::Forbidden(
            "You are not authorized to edit this post".to_string(),
        ));
    }

    let current_status: PostStatus = existing
        .status
        .parse()
        .map_err(AppError::InternalServerError)?;
    let status = payload.status.unwrap_or(current_status);
    let publish_at = if payload.status.is_some() || payload.publish_at.is_some() {
        resolve_schedule(status, payload.publish_at, existing.publish_at, now)?
    } else {
        existing.publish_at
    };

    let title = payload.title.unwrap_or(existing.title);
    let content = content.unwrap_or(existing.content);
    let slug = match payload.slug {
        Some(requested) => unique_slug(&mut tx, &slugify(&requested), Some(id)).await?,
        None => existing.slug,
    };

    sqlx::query(
        r#"
        UPDATE posts
        SET title = ?, slug = ?, content = ?, status = ?, publish_at = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&title)
    .bind(&slug)
    .bind(&content)
    .bind(status.as_str())
    .bind(publish_at)
    .bind(now)
    .bind(id)
    .execute(&mut *tx)
    .await
    .map_err(map_write_error)?;

    if let Some(tags) = payload.tags {
        set_post_tags(&mut tx, id, &normalize_tags(&tags)).await?;
    }

    let post = load_post(&mut tx, id)
        .await?
        .ok_or(AppError::NotFound("Post not found".to_string()))?;

    tx.commit().await?;

    Ok(Json(post))
}

/// List publicly visible posts, most recently published first.
/// Optional `?tag=` filter.
pub async fn list_posts(
    State(pool): State<SqlitePool>,
    Query(params): Query<PostListParams>,
) -> Result<impl IntoResponse, AppError> {
    let mut qb = QueryBuilder::<Sqlite>::new(POST_SELECT);
    qb.push(" WHERE p.status IN ('published', 'scheduled')");

    if let Some(tag) = params.tag.as_deref().and_then(normalize_tag) {
        qb.push(
            " AND p.id IN (SELECT pt.post_id FROM post_tags pt JOIN tags t ON t.id = pt.tag_id WHERE t.name = ",
        );
        qb.push_bind(tag);
        qb.push(")");
    }

    let mut conn = pool.acquire().await?;
    let mut posts = qb
        .build_query_as::<Post>()
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| {
            tracing::error!("Failed to list posts: {:?}", e);
            AppError::from(e)
        })?;

    let now = Utc::now();
    posts.retain(|post| post.is_visible_at(now));
    posts.sort_by(|a, b| {
        b.published_at()
            .cmp(&a.published_at())
            .then(b.id.cmp(&a.id))
    });

    attach_tags(&mut conn, &mut posts).await?;

    Ok(Json(posts))
}

/// Get a single visible post by ID.
pub async fn get_post(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let mut conn = pool.acquire().await?;
    let post = load_post(&mut conn, id)
        .await?
        .filter(|post| post.is_visible_at(Utc::now()))
        .ok_or(AppError::NotFound("Post not found".to_string()))?;

    Ok(Json(post))
}

/// Get a single visible post by slug.
pub async fn get_post_by_slug(
    State(pool): State<SqlitePool>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let id: i64 = sqlx::query_scalar("SELECT id FROM posts WHERE slug = ?")
        .bind(&slug)
        .fetch_optional(&pool)
        .await?
        .ok_or(AppError::NotFound("Post not found".to_string()))?;

    get_post(State(pool), Path(id)).await
}

/// List the caller's own posts in every status.
pub async fn my_posts(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let author_id = claims.user_id()?;
    let sql = format!("{} WHERE p.author_id = ? ORDER BY p.id DESC", POST_SELECT);

    let mut conn = pool.acquire().await?;
    let mut posts = sqlx::query_as::<_, Post>(&sql)
        .bind(author_id)
        .fetch_all(&mut *conn)
        .await?;
    attach_tags(&mut conn, &mut posts).await?;

    Ok(Json(posts))
}

/// Delete a post.
/// Requires: Login + (Author OR Admin). Comments, tags links and reactions cascade.
pub async fn delete_post(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let author_id: i64 = sqlx::query_scalar("SELECT author_id FROM posts WHERE id = ?")
        .bind(id)
        .fetch_optional(&pool)
        .await?
        .ok_or(AppError::NotFound("Post not found".to_string()))?;

    if !claims.can_modify(author_id)? {
        return Err(AppError::Forbidden(
            "You are not authorized to delete this post".to_string(),
        ));
    }

    sqlx::query("DELETE FROM posts WHERE id = ?")
        .bind(id)
        .execute(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to delete post: {:?}", e);
            AppError::from(e)
        })?;

    tracing::info!("Post {} deleted by user {}", id, claims.sub);

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn drafts_have_no_publish_time() {
        let now = Utc::now();
        assert_eq!(
            resolve_schedule(PostStatus::Draft, Some(now), Some(now), now).unwrap(),
            None
        );
    }

    #[test]
    fn published_posts_never_get_future_times() {
        let now = Utc::now();
        let past = now - Duration::days(2);
        let future = now + Duration::days(2);
        assert_eq!(
            resolve_schedule(PostStatus::Published, None, None, now).unwrap(),
            Some(now)
        );
        assert_eq!(
            resolve_schedule(PostStatus::Published, Some(past), None, now).unwrap(),
            Some(past)
        );
        assert_eq!(
            resolve_schedule(PostStatus::Published, None, Some(future), now).unwrap(),
            Some(now)
        );
    }

    #[test]
    fn scheduled_posts_need_a_time() {
        let now = Utc::now();
        let future = now + Duration::hours(3);
        assert!(resolve_schedule(PostStatus::Scheduled, None, None, now).is_err());
        assert_eq!(
            resolve_schedule(PostStatus::Scheduled, None, Some(future), now).unwrap(),
            Some(future)
        );
    }
}
