// src/sanitizer/mod.rs

//! Sanitization pipeline for user-authored post HTML.
//!
//! Every post and comment body is passed through [`HtmlSanitizer::sanitize`]
//! before it is written to the database. The stored HTML is later rendered
//! without escaping, so this is the only gate against stored XSS.
//!
//! The pipeline runs three stages:
//!
//! 1. **Preserve**: blocks carrying `data-preserve-content` (code listings,
//!    formula source) are swapped for comment sentinels so their exact
//!    characters survive.
//! 2. **Sanitize**: `ammonia` removes everything outside the [`Policy`]
//!    allow-lists.
//! 3. **Restore**: sentinels are swapped back; all other comments are dropped.

pub mod policy;
pub mod preserve;

use std::{
    collections::HashMap,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};

use ammonia::Builder;
use tokio::task::JoinError;
use uuid::Uuid;

pub use policy::Policy;
use preserve::Preserver;

/// Immutable, shareable HTML sanitizer. Build once at startup.
pub struct HtmlSanitizer {
    policy: Arc<Policy>,
    cleaner: Builder<'static>,
    preserver: Preserver,
}

impl HtmlSanitizer {
    /// Builds the sanitizer from an allow-list policy.
    pub fn new(policy: Policy) -> Result<Self, regex::Error> {
        let policy = Arc::new(policy);
        let preserver = Preserver::new(&policy)?;

        let filter_policy = Arc::clone(&policy);
        let mut cleaner = Builder::default();
        cleaner
            .tags(policy.tags.clone())
            .clean_content_tags(policy.drop_content_tags.clone())
            .tag_attributes(HashMap::new())
            .generic_attributes(policy.attributes.clone())
            .url_schemes(policy.url_schemes.clone())
            .link_rel(Some("noopener noreferrer"))
            // Sentinels are comments; the restore stage drops every other one.
            .strip_comments(false)
            .attribute_filter(move |_element, attribute, value| {
                filter_policy.filter_attribute(attribute, value)
            });

        Ok(Self {
            policy,
            cleaner,
            preserver,
        })
    }

    /// Cleans author-supplied HTML for storage.
    ///
    /// Never fails: `None` and `""` yield `""`, and an engine fault yields the
    /// input fully HTML-escaped as plain text.
    pub fn sanitize<'a>(&self, raw: impl Into<Option<&'a str>>) -> String {
        let raw = match raw.into() {
            Some(raw) if !raw.is_empty() => raw,
            _ => return String::new(),
        };

        let nonce = Uuid::new_v4().simple().to_string();
        let (shielded, preserved) = self.preserver.preserve(raw, &nonce, &self.policy);
        if preserved > 0 {
            tracing::debug!("Preserved {} block(s) verbatim", preserved);
        }

        match self.clean(&shielded) {
            Some(cleaned) => self.preserver.restore(&cleaned, &nonce),
            None => ammonia::clean_text(raw),
        }
    }

    /// [`HtmlSanitizer::sanitize`] on the blocking pool, so a large post does
    /// not hold up the async workers.
    pub async fn sanitize_blocking(self: Arc<Self>, raw: String) -> Result<String, JoinError> {
        tokio::task::spawn_blocking(move || self.sanitize(raw.as_str())).await
    }

    /// Runs the allow-list engine, turning an internal panic into `None`.
    fn clean(&self, html: &str) -> Option<String> {
        match panic::catch_unwind(AssertUnwindSafe(|| self.cleaner.clean(html).to_string())) {
            Ok(cleaned) => Some(cleaned),
            Err(cause) => {
                let reason = cause
                    .downcast_ref::<String>()
                    .map(String::as_str)
                    .or_else(|| cause.downcast_ref::<&str>().copied())
                    .unwrap_or("unknown panic");
                tracing::error!(
                    "HTML sanitizer failed, storing content as escaped text: {}",
                    reason
                );
                None
            }
        }
    }
}
