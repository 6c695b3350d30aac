// src/utils/slug.rs

use sqlx::SqliteConnection;

/// Longest slug produced from a title, before any collision suffix.
const MAX_SLUG_LEN: usize = 80;

/// Turns a title into a URL slug: ASCII alphanumerics, lowercased, runs of
/// anything else collapsed to a single `-`. Falls back to `post`.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_dash = false;

    for c in title.chars() {
        if !c.is_ascii_alphanumeric() {
            pending_dash = true;
            continue;
        }
        let dash = pending_dash && !slug.is_empty();
        if slug.len() + usize::from(dash) + 1 > MAX_SLUG_LEN {
            break;
        }
        if dash {
            slug.push('-');
        }
        pending_dash = false;
        slug.push(c.to_ascii_lowercase());
    }

    if slug.is_empty() {
        "post".to_string()
    } else {
        slug
    }
}

/// Returns `base`, or `base-2`, `base-3`, ... whichever is not yet used by a
/// post other than `exclude_id`.
pub async fn unique_slug(
    conn: &mut SqliteConnection,
    base: &str,
    exclude_id: Option<i64>,
) -> Result<String, sqlx::Error> {
    let mut candidate = base.to_string();
    let mut n = 1;

    loop {
        let taken: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM posts WHERE slug = ? AND id != ?",
        )
        .bind(&candidate)
        .bind(exclude_id.unwrap_or(-1))
        .fetch_one(&mut *conn)
        .await?;

        if taken == 0 {
            return Ok(candidate);
        }
        n += 1;
        candidate = format!("{}-{}", base, n);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn titles_become_slugs() {
        assert_eq!(slugify("Hello, World!"), "hello-world");
        assert_eq!(slugify("  Rust 2024: async & you  "), "rust-2024-async-you");
        assert_eq!(slugify("already-a-slug"), "already-a-slug");
    }

    #[test]
    fn empty_or_symbol_titles_fall_back() {
        assert_eq!(slugify(""), "post");
        assert_eq!(slugify("?!?"), "post");
        assert_eq!(slugify("日本語"), "post");
    }

    #[test]
    fn long_titles_are_capped() {
        let slug = slugify(&"word ".repeat(50));
        assert!(slug.len() <= MAX_SLUG_LEN);
        assert!(!slug.ends_with('-'));
    }
}
