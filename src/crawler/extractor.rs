//! Structural page extraction
//!
//! [`PageExtractor`] consumes html5ever tokens as the body streams in and tracks
//! everything the audit reports about a page: HTML version, title, heading
//! counts, internal and external link counts, and whether a password field
//! is present. It also collects the resolved links that the prober checks
//! once the body has been read.

use crate::url::{resolve_href, LinkKind};
use html5ever::tokenizer::states::RawKind;
use html5ever::tokenizer::{Doctype, Tag, TagKind, Token, TokenSink, TokenSinkResult};
use std::cell::RefCell;
use std::collections::HashSet;
use url::Url;

/// HTML version detected from the doctype
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HtmlVersion {
    #[default]
    Html5,
    Html401Strict,
    Html401Transitional,
    Html401,
    Xhtml10,
    Xhtml11,
}

impl HtmlVersion {
    /// Detects the version from the doctype contents
    ///
    /// Matching is case-insensitive and checked in order; anything that
    /// matches none of the known markers is HTML5.
    pub fn from_doctype(doctype: &str) -> Self {
        let lower = doctype.to_ascii_lowercase();
        if lower.contains("html5") || lower.contains("html 5") {
            Self::Html5
        } else if lower.contains("html 4.01 strict") {
            Self::Html401Strict
        } else if lower.contains("html 4.01 transitional") {
            Self::Html401Transitional
        } else if lower.contains("html 4.01") {
            Self::Html401
        } else if lower.contains("xhtml 1.0") {
            Self::Xhtml10
        } else if lower.contains("xhtml 1.1") {
            Self::Xhtml11
        } else {
            Self::Html5
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Html5 => "HTML5",
            Self::Html401Strict => "HTML 4.01 Strict",
            Self::Html401Transitional => "HTML 4.01 Transitional",
            Self::Html401 => "HTML 4.01",
            Self::Xhtml10 => "XHTML 1.0",
            Self::Xhtml11 => "XHTML 1.1",
        }
    }
}

/// Structural metadata of one page
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PageSummary {
    pub html_version: HtmlVersion,
    pub title: Option<String>,
    /// Heading counts, index 0 is `h1`
    pub headings: [u32; 6],
    pub internal_links: u32,
    pub external_links: u32,
    pub has_login_form: bool,
}

/// Output of a finished extraction
#[derive(Debug, Clone)]
pub struct Extraction {
    pub summary: PageSummary,
    /// Base for resolving links: the last `<base href>` or the target
    pub base: Url,
    /// Distinct resolved http(s) links in document order
    pub candidates: Vec<Url>,
}

/// Token consumer computing a [`PageSummary`]
///
/// html5ever hands tokens to the sink by shared reference, so the running
/// state sits behind a `RefCell`.
#[derive(Debug)]
pub struct PageExtractor {
    state: RefCell<ExtractState>,
}

#[derive(Debug)]
struct ExtractState {
    target: Url,
    base: Url,
    doctype_seen: bool,
    in_title: bool,
    title: String,
    summary: PageSummary,
    seen: HashSet<String>,
    candidates: Vec<Url>,
}

impl PageExtractor {
    /// Creates an extractor for the page at `target`
    pub fn new(target: Url) -> Self {
        Self {
            state: RefCell::new(ExtractState {
                base: target.clone(),
                target,
                doctype_seen: false,
                in_title: false,
                title: String::new(),
                summary: PageSummary::default(),
                seen: HashSet::new(),
                candidates: Vec::new(),
            }),
        }
    }

    /// Finalizes the title and returns the summary with the probe inputs
    pub fn finish(&self) -> Extraction {
        let mut state = self.state.borrow_mut();
        let title = state.title.trim();
        state.summary.title = (!title.is_empty()).then(|| title.to_string());

        Extraction {
            summary: std::mem::take(&mut state.summary),
            base: state.base.clone(),
            candidates: std::mem::take(&mut state.candidates),
        }
    }
}

impl ExtractState {
    fn doctype(&mut self, doctype: &Doctype) {
        if self.doctype_seen {
            return;
        }
        self.doctype_seen = true;

        let text = [
            doctype.name.as_deref(),
            doctype.public_id.as_deref(),
            doctype.system_id.as_deref(),
        ]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" ");
        self.summary.html_version = HtmlVersion::from_doctype(&text);
    }

    fn start_tag(&mut self, tag: &Tag) -> TokenSinkResult<()> {
        let name: &str = &tag.name;
        match name {
            "base" => {
                if let Some(href) = attr(tag, "href").map(str::trim) {
                    if !href.is_empty() {
                        if let Ok(base) = self.target.join(href) {
                            tracing::debug!("Found base href for {}: {}", self.target, base);
                            self.base = base;
                        }
                    }
                }
            }
            "title" => {
                self.title.clear();
                self.in_title = !tag.self_closing;
            }
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                let level = usize::from(name.as_bytes()[1] - b'0');
                self.summary.headings[level - 1] += 1;
            }
            "a" => {
                if let Some(href) = attr(tag, "href") {
                    self.link(href);
                }
            }
            "input" => {
                let is_password = attr(tag, "type")
                    .map(|t| t.trim().eq_ignore_ascii_case("password"))
                    .unwrap_or(false);
                if is_password {
                    self.summary.has_login_form = true;
                }
            }
            _ => {}
        }

        if tag.self_closing {
            return TokenSinkResult::Continue;
        }
        match raw_text_kind(name) {
            Some(kind) => TokenSinkResult::RawData(kind),
            None => TokenSinkResult::Continue,
        }
    }

    fn link(&mut self, href: &str) {
        let Some(resolved) = resolve_href(&self.base, href) else {
            return;
        };

        match LinkKind::of(&self.target, &resolved) {
            LinkKind::External => self.summary.external_links += 1,
            LinkKind::Internal => self.summary.internal_links += 1,
        }

        if self.seen.insert(resolved.as_str().to_string()) {
            self.candidates.push(resolved);
        }
    }
}

/// Content model of elements whose body is not markup
fn raw_text_kind(name: &str) -> Option<RawKind> {
    match name {
        "title" | "textarea" => Some(RawKind::Rcdata),
        "script" => Some(RawKind::ScriptData),
        "style" | "xmp" | "iframe" | "noembed" | "noframes" | "noscript" => Some(RawKind::Rawtext),
        _ => None,
    }
}

fn attr<'a>(tag: &'a Tag, name: &str) -> Option<&'a str> {
    tag.attrs
        .iter()
        .find(|a| &*a.name.local == name)
        .map(|a| &*a.value)
}

impl TokenSink for PageExtractor {
    type Handle = ();

    fn process_token(&self, token: Token, _line_number: u64) -> TokenSinkResult<()> {
        let mut state = self.state.borrow_mut();
        match token {
            Token::DoctypeToken(doctype) => state.doctype(&doctype),
            Token::TagToken(tag) => match tag.kind {
                TagKind::StartTag => return state.start_tag(&tag),
                TagKind::EndTag => {
                    if &*tag.name == "title" {
                        state.in_title = false;
                    }
                }
            },
            Token::CharacterTokens(text) => {
                if state.in_title {
                    state.title.push_str(&text);
                }
            }
            _ => {}
        }
        TokenSinkResult::Continue
    }
}
