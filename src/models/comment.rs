// src/models/comment.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// DTO for creating a new comment.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateCommentRequest {
    #[validate(length(
        min = 1,
        max = 5000,
        message = "Comment must be between 1 and 5000 characters"
    ))]
    pub content: String,

    /// Optional: the ID of the comment being replied to.
    pub parent_id: Option<i64>,
}

/// DTO for displaying a comment with author info.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CommentResponse {
    pub id: i64,
    pub post_id: i64,
    pub author_id: i64,
    pub author: String,
    pub parent_id: Option<i64>,
    pub content: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}
