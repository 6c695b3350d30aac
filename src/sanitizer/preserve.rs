// src/sanitizer/preserve.rs

use std::{cell::Cell, collections::HashMap};

use base64::{Engine as _, engine::general_purpose::STANDARD};
use html5ever::{
    tendril::StrTendril,
    tokenizer::{
        BufferQueue, Tag, TagKind, Token, TokenSink, TokenSinkResult, Tokenizer, TokenizerOpts,
    },
};
use regex::{Captures, Regex};

use super::policy::Policy;

/// Marks the start of a sentinel payload inside an HTML comment.
///
/// Inside an attribute value the serializer rewrites the quote to `&quot;`,
/// so a sentinel that ends up in attribute context never matches on restore.
const SENTINEL_PREFIX: &str = "\"preserve:";

/// Fed to the tokenizer after a block. It only comes out as its own start tag
/// when the block leaves the tokenizer in the data state.
const BLOCK_END_TAG: &str = "blogd-block-end";

/// Shields marked blocks (code listings, formula source) from the sanitizer
/// by swapping them for comment sentinels, and swaps them back afterwards.
pub struct Preserver {
    /// Opening or closing tag of any preserve-capable element.
    boundary: Regex,
    /// The marker attribute inside an opening tag's attribute text.
    marker: Regex,
    comment: Regex,
}

/// One opening or closing preserve-capable tag found in the raw input.
struct Boundary {
    start: usize,
    end: usize,
    name: String,
    closing: bool,
    marked: bool,
}

impl Preserver {
    pub fn new(policy: &Policy) -> Result<Self, regex::Error> {
        let names = policy
            .preserve_tags
            .iter()
            .map(|name| regex::escape(name))
            .collect::<Vec<_>>()
            .join("|");

        Ok(Self {
            boundary: Regex::new(&format!(r"(?i)<(/?)({})((?:\s|/)[^>]*)?>", names))?,
            marker: Regex::new(&format!(
                r"(?i)(?:^|\s){}(?:\s|=|/|$)",
                regex::escape(policy.preserve_marker)
            ))?,
            comment: Regex::new(r"(?s)<!--(.*?)-->")?,
        })
    }

    /// Replaces every admitted marked block with a sentinel comment.
    /// Returns the rewritten string and the number of blocks shielded.
    ///
    /// A marked block with no matching close tag is left in place for
    /// ordinary sanitization. So is one that fails [`Preserver::admits`],
    /// together with any marked blocks nested inside it.
    pub fn preserve(&self, raw: &str, nonce: &str, policy: &Policy) -> (String, usize) {
        let boundaries = self.boundaries(raw);
        if !boundaries.iter().any(|b| b.marked) {
            return (raw.to_string(), 0);
        }
        let block_ends = pair_blocks(&boundaries);

        let mut out = String::with_capacity(raw.len());
        let mut cursor = 0;
        let mut shielded = 0;

        for (boundary, block_end) in boundaries.iter().zip(block_ends) {
            if !boundary.marked || boundary.start < cursor {
                continue;
            }
            let Some(end) = block_end else { continue };

            let block = &raw[boundary.start..end];
            if self.admits(block, policy) {
                out.push_str(&raw[cursor..boundary.start]);
                out.push_str(&sentinel(nonce, block));
                shielded += 1;
            } else {
                tracing::debug!(
                    "Marked <{}> block at byte {} sent through the sanitizer",
                    boundary.name,
                    boundary.start
                );
                out.push_str(&raw[cursor..end]);
            }
            cursor = end;
        }

        out.push_str(&raw[cursor..]);
        (out, shielded)
    }

    /// Swaps sentinels carrying `nonce` back to their original blocks and
    /// drops every other comment. A payload that fails to decode becomes "".
    pub fn restore(&self, sanitized: &str, nonce: &str) -> String {
        self.comment
            .replace_all(sanitized, |caps: &Captures| {
                decode_sentinel(&caps[1], nonce).unwrap_or_default()
            })
            .into_owned()
    }

    /// A block may skip the sanitizer only if a browser reading it from the
    /// data state sees the marked opening tag first, stays out of comments,
    /// declarations and raw-text elements, finds no script-bearing attribute
    /// or unsafe URL or style, and is back in the data state at the end.
    ///
    /// Stray `<` in code (`Vec<u8>`, `#include <stdio.h>`, `a<b`) reads as a
    /// harmless unknown element and does not disqualify the block.
    pub fn admits(&self, block: &str, policy: &Policy) -> bool {
        let tokenizer = Tokenizer::new(BlockVetter::new(policy), TokenizerOpts::default());
        let input = BufferQueue::default();
        input.push_back(StrTendril::from_slice(block));
        input.push_back(StrTendril::from_slice(&format!("<{}>", BLOCK_END_TAG)));
        let _ = tokenizer.feed(&input);
        tokenizer.end();
        tokenizer.sink.admitted()
    }

    fn boundaries(&self, raw: &str) -> Vec<Boundary> {
        self.boundary
            .captures_iter(raw)
            .filter_map(|caps| {
                let m = caps.get(0)?;
                let closing = !caps[1].is_empty();
                let attrs = caps.get(3).map_or("", |a| a.as_str());
                Some(Boundary {
                    start: m.start(),
                    end: m.end(),
                    name: caps[2].to_ascii_lowercase(),
                    closing,
                    marked: !closing && self.marker.is_match(attrs),
                })
            })
            .collect()
    }
}

/// For each boundary, the end offset of the close tag that balances it (same
/// name, nested same-name elements counted). `None` for closing boundaries and
/// for openings left unclosed.
fn pair_blocks(boundaries: &[Boundary]) -> Vec<Option<usize>> {
    let mut ends = vec![None; boundaries.len()];
    let mut open: HashMap<&str, Vec<usize>> = HashMap::new();

    for (i, boundary) in boundaries.iter().enumerate() {
        let stack = open.entry(boundary.name.as_str()).or_default();
        if !boundary.closing {
            stack.push(i);
        } else if let Some(opening) = stack.pop() {
            ends[opening] = Some(boundary.end);
        }
    }
    ends
}

/// Token sink that watches one candidate block go by.
struct BlockVetter<'p> {
    policy: &'p Policy,
    opened: Cell<bool>,
    ended: Cell<bool>,
    rejected: Cell<bool>,
}

impl<'p> BlockVetter<'p> {
    fn new(policy: &'p Policy) -> Self {
        Self {
            policy,
            opened: Cell::new(false),
            ended: Cell::new(false),
            rejected: Cell::new(false),
        }
    }

    fn admitted(&self) -> bool {
        self.opened.get() && self.ended.get() && !self.rejected.get()
    }

    fn tag_allowed(&self, tag: &Tag) -> bool {
        if self.ended.get() {
            return false;
        }
        let name: &str = &tag.name;

        if !self.opened.get() {
            self.opened.set(true);
            let marked = tag
                .attrs
                .iter()
                .any(|attr| &*attr.name.local == self.policy.preserve_marker);
            return tag.kind == TagKind::StartTag
                && self.policy.preserve_tags.contains(&name)
                && marked
                && self.attributes_allowed(tag);
        }

        if tag.kind == TagKind::StartTag && name == BLOCK_END_TAG {
            self.ended.set(true);
            return tag.attrs.is_empty();
        }

        self.policy.allows_verbatim_tag(name) && self.attributes_allowed(tag)
    }

    fn attributes_allowed(&self, tag: &Tag) -> bool {
        tag.attrs
            .iter()
            .all(|attr| self.policy.allows_verbatim_attribute(&attr.name.local, &attr.value))
    }
}

impl TokenSink for BlockVetter<'_> {
    type Handle = ();

    fn process_token(&self, token: Token, _line_number: u64) -> TokenSinkResult<()> {
        let allowed = match token {
            Token::TagToken(ref tag) => self.tag_allowed(tag),
            Token::CharacterTokens(_) => self.opened.get() && !self.ended.get(),
            Token::ParseError(_) | Token::EOFToken => true,
            Token::CommentToken(_) | Token::DoctypeToken(_) | Token::NullCharacterToken => false,
        };
        if !allowed {
            self.rejected.set(true);
        }
        TokenSinkResult::Continue
    }
}

fn sentinel(nonce: &str, block: &str) -> String {
    format!(
        "<!--{}{}:{}\"-->",
        SENTINEL_PREFIX,
        nonce,
        STANDARD.encode(block.as_bytes())
    )
}

/// Returns the original block for a sentinel issued with `nonce`, or `None`
/// for foreign comments and corrupted payloads.
fn decode_sentinel(body: &str, nonce: &str) -> Option<String> {
    let payload = body
        .strip_prefix(SENTINEL_PREFIX)?
        .strip_prefix(nonce)?
        .strip_prefix(':')?
        .strip_suffix('"')?;

    match STANDARD.decode(payload) {
        Ok(bytes) => String::from_utf8(bytes).ok(),
        Err(e) => {
            tracing::warn!("Dropping preserved block with undecodable payload: {}", e);
            None
        }
    }
}
