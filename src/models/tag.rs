// src/models/tag.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Longest tag name accepted after normalization.
pub const MAX_TAG_LEN: usize = 32;

/// Represents the 'tags' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Tag {
    pub id: i64,
    pub name: String,
}

/// A tag with the number of publicly visible posts carrying it.
#[derive(Debug, Serialize)]
pub struct TagSummary {
    pub name: String,
    pub posts: usize,
}

/// DTO for an admin creating a tag ahead of use.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateTagRequest {
    #[validate(length(min = 1, max = 32, message = "Tag must be between 1 and 32 characters"))]
    pub name: String,
}

/// Normalizes a single tag name: trimmed, lowercased, inner whitespace
/// collapsed to `-`. Returns `None` if nothing usable is left.
pub fn normalize_tag(raw: &str) -> Option<String> {
    let name = raw
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
        .to_lowercase();

    if name.is_empty() {
        return None;
    }
    Some(name.chars().take(MAX_TAG_LEN).collect())
}

/// Normalizes a tag list, dropping blanks and duplicates while keeping order.
pub fn normalize_tags(raw: &[String]) -> Vec<String> {
    let mut tags: Vec<String> = Vec::with_capacity(raw.len());
    for name in raw.iter().filter_map(|t| normalize_tag(t)) {
        if !tags.contains(&name) {
            tags.push(name);
        }
    }
    tags
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_normalized_and_deduplicated() {
        let raw = vec![
            " Rust ".to_string(),
            "rust".to_string(),
            "".to_string(),
            "Web  Dev".to_string(),
            "   ".to_string(),
        ];
        assert_eq!(normalize_tags(&raw), vec!["rust", "web-dev"]);
    }

    #[test]
    fn long_tags_are_truncated() {
        let long = "x".repeat(100);
        assert_eq!(normalize_tag(&long).map(|t| t.len()), Some(MAX_TAG_LEN));
    }
}
