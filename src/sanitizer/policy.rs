// src/sanitizer/policy.rs

use std::{borrow::Cow, collections::HashSet};

use url::Url;

/// Allow-list configuration for user-authored post HTML.
///
/// Built once at startup and shared read-only. Tests may construct
/// substituted policies by editing the public fields of `Policy::default()`.
#[derive(Debug, Clone)]
pub struct Policy {
    /// Elements kept in the output.
    pub tags: HashSet<&'static str>,

    /// Attributes kept on any allowed element.
    pub attributes: HashSet<&'static str>,

    /// Inline CSS properties kept inside `style` attributes.
    pub css_properties: HashSet<&'static str>,

    /// URL schemes accepted in `href` / `src`. Relative URLs are always accepted.
    pub url_schemes: HashSet<&'static str>,

    /// Elements removed together with their whole subtree.
    /// Must not overlap with `tags`.
    pub drop_content_tags: HashSet<&'static str>,

    /// Accepted values for `target`.
    pub link_targets: HashSet<&'static str>,

    /// Elements that may carry the preserve marker.
    pub preserve_tags: Vec<&'static str>,

    /// Boolean attribute marking an element whose content is kept verbatim.
    pub preserve_marker: &'static str,
}

/// Substrings that disqualify a CSS declaration value.
const FORBIDDEN_CSS_VALUES: &[&str] = &[
    "expression",
    "url(",
    "javascript:",
    "vbscript:",
    "behavior",
    "@import",
    "\\",
    "/*",
];

/// Attributes whose value is fetched or navigated to as a single URL.
const URL_ATTRIBUTES: &[&str] = &[
    "href",
    "src",
    "action",
    "formaction",
    "xlink:href",
    "poster",
    "background",
    "data",
    "codebase",
    "classid",
    "archive",
    "cite",
    "longdesc",
    "lowsrc",
    "dynsrc",
    "usemap",
    "manifest",
    "profile",
    "icon",
];

/// Attributes holding several URLs separated by whitespace or commas.
const URL_LIST_ATTRIBUTES: &[&str] = &["srcset", "imagesrcset", "ping"];

/// Elements never emitted verbatim, on top of `drop_content_tags`: they load
/// documents or switch how the browser reads the following text.
const VERBATIM_DENIED_TAGS: &[&str] = &["iframe"];

impl Default for Policy {
    fn default() -> Self {
        Self {
            tags: HashSet::from([
                "div", "span", "p", "h1", "h2", "h3", "h4", "h5", "h6", "strong", "em", "u", "s",
                "ul", "ol", "li", "blockquote", "code", "pre", "hr", "br", "img", "a", "iframe",
                "table", "thead", "tbody", "tr", "th", "td",
            ]),
            attributes: HashSet::from([
                "class",
                "id",
                "href",
                "target",
                "src",
                "alt",
                "title",
                "style",
                "width",
                "height",
                "frameborder",
                "allowfullscreen",
                "allow",
                "contenteditable",
                "data-preserve-content",
                "data-resizable",
                "data-filename",
            ]),
            css_properties: HashSet::from([
                "color",
                "background-color",
                "font-size",
                "font-weight",
                "font-style",
                "text-align",
                "text-decoration",
                "width",
                "height",
                "min-width",
                "max-width",
                "max-height",
                "margin",
                "padding",
                "border",
                "float",
                "position",
                "overflow",
            ]),
            url_schemes: HashSet::from(["http", "https", "mailto"]),
            drop_content_tags: HashSet::from([
                "script", "style", "object", "embed", "applet", "noscript", "template",
                "textarea", "select", "form", "svg", "math", "frame", "frameset", "noembed",
                "noframes", "xmp", "plaintext", "title", "link", "meta", "base",
            ]),
            link_targets: HashSet::from(["_blank", "_self"]),
            preserve_tags: vec!["pre", "code", "span", "div"],
            preserve_marker: "data-preserve-content",
        }
    }
}

impl Policy {
    /// Whether `value` may appear in a URL-bearing attribute.
    pub fn allows_url(&self, value: &str) -> bool {
        match Url::parse(value.trim()) {
            Ok(url) => self.url_schemes.contains(url.scheme()),
            Err(url::ParseError::RelativeUrlWithoutBase) => true,
            Err(_) => false,
        }
    }

    fn allows_declaration(&self, property: &str, value: &str) -> bool {
        if !self.css_properties.contains(property) || value.is_empty() {
            return false;
        }
        let lowered = value.to_ascii_lowercase();
        if FORBIDDEN_CSS_VALUES.iter().any(|needle| lowered.contains(needle)) {
            return false;
        }
        // Anything but in-flow positioning can escape the post container.
        property != "position" || matches!(lowered.as_str(), "static" | "relative")
    }

    /// Splits a `style` value into `(property, value)` pairs, skipping blanks.
    fn declarations(style: &str) -> impl Iterator<Item = Option<(String, &str)>> {
        style
            .split(';')
            .filter(|decl| !decl.trim().is_empty())
            .map(|decl| {
                decl.split_once(':')
                    .map(|(prop, value)| (prop.trim().to_ascii_lowercase(), value.trim()))
            })
    }

    /// Keeps only allowed declarations, normalized as `prop: value` joined by `; `.
    /// Returns `None` when nothing survives.
    pub fn filter_style(&self, style: &str) -> Option<String> {
        let kept: Vec<String> = Self::declarations(style)
            .flatten()
            .filter(|(prop, value)| self.allows_declaration(prop, value))
            .map(|(prop, value)| format!("{}: {}", prop, value))
            .collect();

        if kept.is_empty() {
            None
        } else {
            Some(kept.join("; "))
        }
    }

    /// True when every declaration in `style` is allowed as written.
    pub fn style_is_clean(&self, style: &str) -> bool {
        Self::declarations(style).all(|decl| match decl {
            Some((prop, value)) => self.allows_declaration(&prop, value),
            None => false,
        })
    }

    /// Value rewriting applied by the sanitization engine to allowed attributes.
    pub fn filter_attribute<'v>(&self, attribute: &str, value: &'v str) -> Option<Cow<'v, str>> {
        match attribute {
            "style" => self.filter_style(value).map(Cow::Owned),
            "target" if !self.link_targets.contains(value) => None,
            _ => Some(Cow::Borrowed(value)),
        }
    }

    /// Whether an element may appear inside a block emitted verbatim.
    ///
    /// Unknown names are fine (`Vec<u8>` in a listing reads as a `<u8>`
    /// element); script-bearing, embedding and parser-switching ones are not.
    pub fn allows_verbatim_tag(&self, name: &str) -> bool {
        !self.drop_content_tags.contains(name) && !VERBATIM_DENIED_TAGS.contains(&name)
    }

    /// Check for an attribute inside a block emitted verbatim, where no engine
    /// rewrites it afterwards. `value` must already have its character
    /// references decoded.
    pub fn allows_verbatim_attribute(&self, name: &str, value: &str) -> bool {
        if name.starts_with("on") || name == "srcdoc" {
            return false;
        }
        if URL_ATTRIBUTES.contains(&name) {
            return self.allows_url(value);
        }
        if URL_LIST_ATTRIBUTES.contains(&name) {
            return value
                .split(|c: char| c.is_ascii_whitespace() || c == ',')
                .filter(|part| !part.is_empty())
                .all(|part| self.allows_url(part));
        }
        match name {
            "style" => self.style_is_clean(value),
            "target" => self.link_targets.contains(value),
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_lists_do_not_overlap() {
        let policy = Policy::default();
        assert!(policy.tags.is_disjoint(&policy.drop_content_tags));
        assert!(!policy.attributes.contains("rel"));
        assert_eq!(policy.css_properties.len(), 18);
    }

    #[test]
    fn urls_are_checked_by_scheme() {
        let policy = Policy::default();
        assert!(policy.allows_url("https://example.com/a.png"));
        assert!(policy.allows_url("mailto:someone@example.com"));
        assert!(policy.allows_url("/uploads/cat.png"));
        assert!(policy.allows_url("#section-2"));
        assert!(!policy.allows_url("javascript:alert(1)"));
        assert!(!policy.allows_url("  JavaScript:alert(1)"));
        assert!(!policy.allows_url("java\tscript:alert(1)"));
        assert!(!policy.allows_url("data:text/html;base64,PHNjcmlwdD4="));
        assert!(!policy.allows_url("vbscript:msgbox(1)"));
    }

    #[test]
    fn style_filter_keeps_allowed_declarations() {
        let policy = Policy::default();
        assert_eq!(
            policy.filter_style("COLOR: red; position: fixed; width:10px"),
            Some("color: red; width: 10px".to_string())
        );
        assert_eq!(policy.filter_style("behavior: url(x.htc)"), None);
        assert_eq!(
            policy.filter_style("width: expression(alert(1)); height: 4px;"),
            Some("height: 4px".to_string())
        );
        assert_eq!(policy.filter_style("background-color: url(javascript:x)"), None);
    }

    #[test]
    fn style_filter_is_stable_on_its_own_output() {
        let policy = Policy::default();
        let once = policy.filter_style("margin:0 ;padding : 2px;;").unwrap();
        assert_eq!(policy.filter_style(&once), Some(once.clone()));
        assert!(policy.style_is_clean(&once));
    }

    #[test]
    fn only_in_flow_positioning_is_allowed() {
        let policy = Policy::default();
        assert_eq!(
            policy.filter_style("position: relative; top: 0"),
            Some("position: relative".to_string())
        );
        assert_eq!(policy.filter_style("position: absolute"), None);
        assert_eq!(policy.filter_style("position: sticky"), None);
        assert_eq!(policy.filter_style("POSITION: Fixed"), None);
    }

    #[test]
    fn verbatim_tags_exclude_active_content() {
        let policy = Policy::default();
        assert!(policy.allows_verbatim_tag("code"));
        assert!(policy.allows_verbatim_tag("u8"));
        assert!(policy.allows_verbatim_tag("stdio.h"));
        for name in ["script", "style", "iframe", "object", "svg", "textarea", "xmp", "base"] {
            assert!(!policy.allows_verbatim_tag(name), "{name}");
        }
    }

    #[test]
    fn verbatim_attributes_are_checked_by_meaning() {
        let policy = Policy::default();
        assert!(policy.allows_verbatim_attribute("class", "language-rust"));
        assert!(policy.allows_verbatim_attribute("data-line", "12"));
        assert!(policy.allows_verbatim_attribute("href", "https://x.com/?a=1&b=2"));
        assert!(policy.allows_verbatim_attribute("style", "color: #c00"));
        assert!(!policy.allows_verbatim_attribute("onclick", "alert(1)"));
        assert!(!policy.allows_verbatim_attribute("onmouseover", ""));
        assert!(!policy.allows_verbatim_attribute("href", "java\tscript:alert(1)"));
        assert!(!policy.allows_verbatim_attribute("formaction", "javascript:alert(1)"));
        assert!(!policy.allows_verbatim_attribute("srcset", "a.png 1x, javascript:alert(1) 2x"));
        assert!(!policy.allows_verbatim_attribute("srcdoc", "<p>x</p>"));
        assert!(!policy.allows_verbatim_attribute("style", "position: absolute"));
        assert!(!policy.allows_verbatim_attribute("target", "_top"));
    }
}
