// src/handlers/tags.rs

use std::collections::BTreeMap;

use axum::{Json, extract::State, response::IntoResponse};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::{
    error::AppError,
    models::{post::is_visible, tag::TagSummary},
};

/// Lists every tag with the number of publicly visible posts using it.
pub async fn list_tags(State(pool): State<SqlitePool>) -> Result<impl IntoResponse, AppError> {
    let rows: Vec<(String, Option<String>, Option<DateTime<Utc>>)> = sqlx::query_as(
        r#"
        SELECT t.name, p.status, p.publish_at
        FROM tags t
        LEFT JOIN post_tags pt ON pt.tag_id = t.id
        LEFT JOIN posts p ON p.id = pt.post_id
        "#,
    )
    .fetch_all(&pool)
    .await?;

    let now = Utc::now();
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for (name, status, publish_at) in rows {
        let count = counts.entry(name).or_default();
        if status.is_some_and(|status| is_visible(&status, publish_at, now)) {
            *count += 1;
        }
    }

    let tags: Vec<TagSummary> = counts
        .into_iter()
        .map(|(name, posts)| TagSummary { name, posts })
        .collect();

    Ok(Json(tags))
}
