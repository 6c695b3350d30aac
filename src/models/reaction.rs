// src/models/reaction.rs

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReactionKind {
    Like,
    Dislike,
}

impl ReactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReactionKind::Like => "like",
            ReactionKind::Dislike => "dislike",
        }
    }

    pub fn from_db(kind: &str) -> Option<Self> {
        match kind {
            "like" => Some(ReactionKind::Like),
            "dislike" => Some(ReactionKind::Dislike),
            _ => None,
        }
    }
}

/// DTO for reacting to a post.
#[derive(Debug, Deserialize)]
pub struct ReactionRequest {
    pub kind: ReactionKind,
}

/// The caller's reaction after the toggle, plus the post's totals.
#[derive(Debug, Serialize)]
pub struct ReactionResponse {
    pub reaction: Option<ReactionKind>,
    pub likes: i64,
    pub dislikes: i64,
}
