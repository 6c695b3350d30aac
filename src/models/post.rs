// src/models/post.rs

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Publication state of a post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Draft,
    Published,
    /// Published automatically once `publish_at` has passed.
    Scheduled,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Draft => "draft",
            PostStatus::Published => "published",
            PostStatus::Scheduled => "scheduled",
        }
    }
}

impl fmt::Display for PostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PostStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(PostStatus::Draft),
            "published" => Ok(PostStatus::Published),
            "scheduled" => Ok(PostStatus::Scheduled),
            other => Err(format!("unknown post status '{}'", other)),
        }
    }
}

/// Represents a row of the 'posts' table joined with its author and reaction counts.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub author_id: i64,
    pub author: String,
    pub title: String,
    pub slug: String,

    /// Sanitized HTML. Raw author input is never stored.
    pub content: String,

    pub status: String,
    pub publish_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    pub likes: i64,
    pub dislikes: i64,

    /// Populated after the row is loaded.
    #[sqlx(skip)]
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Post {
    /// Whether anonymous readers may see this post at `now`.
    pub fn is_visible_at(&self, now: DateTime<Utc>) -> bool {
        is_visible(&self.status, self.publish_at, now)
    }

    /// The moment the post became (or becomes) public, used for ordering.
    pub fn published_at(&self) -> DateTime<Utc> {
        self.publish_at.unwrap_or(self.created_at)
    }
}

/// Visibility rule shared by post queries and tag counts.
pub fn is_visible(status: &str, publish_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    match status.parse::<PostStatus>() {
        Ok(PostStatus::Published) => true,
        Ok(PostStatus::Scheduled) => publish_at.is_some_and(|at| at <= now),
        _ => false,
    }
}

/// Column list matching [`Post`], to be followed by a WHERE clause.
pub const POST_SELECT: &str = r#"
    SELECT
        p.id, p.author_id, u.username AS author, p.title, p.slug, p.content,
        p.status, p.publish_at, p.created_at, p.updated_at,
        (SELECT COUNT(*) FROM post_reactions r WHERE r.post_id = p.id AND r.kind = 'like') AS likes,
        (SELECT COUNT(*) FROM post_reactions r WHERE r.post_id = p.id AND r.kind = 'dislike') AS dislikes
    FROM posts p
    JOIN users u ON u.id = p.author_id
"#;

/// DTO for creating a new post.
#[derive(Debug, Deserialize, Validate)]
pub struct CreatePostRequest {
    #[validate(length(
        min = 1,
        max = 200,
        message = "Title length must be between 1 and 200 chars"
    ))]
    pub title: String,

    /// Raw HTML from the editor.
    #[validate(length(
        min = 1,
        max = 200000,
        message = "Content length must be between 1 and 200000 chars"
    ))]
    pub content: String,

    /// Optional custom slug; derived from the title when absent.
    #[validate(length(min = 1, max = 100))]
    pub slug: Option<String>,

    #[serde(default)]
    #[validate(length(max = 10, message = "At most 10 tags per post"))]
    pub tags: Vec<String>,

    /// Defaults to `draft`.
    pub status: Option<PostStatus>,

    /// Required when status is `scheduled`.
    pub publish_at: Option<DateTime<Utc>>,
}

/// DTO for editing a post. Absent fields are left unchanged.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdatePostRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,

    #[validate(length(min = 1, max = 200000))]
    pub content: Option<String>,

    #[validate(length(min = 1, max = 100))]
    pub slug: Option<String>,

    #[validate(length(max = 10, message = "At most 10 tags per post"))]
    pub tags: Option<Vec<String>>,

    pub status: Option<PostStatus>,

    pub publish_at: Option<DateTime<Utc>>,
}

/// Query parameters for listing posts.
#[derive(Debug, Deserialize)]
pub struct PostListParams {
    /// Only posts carrying this tag.
    pub tag: Option<String>,
}
