//! Incremental HTML tokenizing
//!
//! Response bodies arrive as byte chunks. [`PageTokenizer`] decodes them as
//! UTF-8 (malformed sequences become U+FFFD, a character split across chunks
//! is carried over) and feeds html5ever's tokenizer, which hands each token
//! to a [`PageExtractor`] as soon as it is complete.

use crate::crawler::extractor::{Extraction, PageExtractor};
use html5ever::tendril::fmt::UTF8;
use html5ever::tendril::stream::Utf8LossyDecoder;
use html5ever::tendril::{ByteTendril, StrTendril, TendrilSink};
use html5ever::tokenizer::{BufferQueue, Tokenizer, TokenizerOpts};
use html5ever::TokenizerResult;
use std::borrow::Cow;
use url::Url;

/// Chunk-fed tokenizer driving a [`PageExtractor`]
pub struct PageTokenizer {
    decoder: Utf8LossyDecoder<Feeder>,
}

struct Feeder {
    tokenizer: Tokenizer<PageExtractor>,
    input: BufferQueue,
}

impl Feeder {
    fn drain(&self) {
        // The extractor never suspends the tokenizer; any early return is
        // resumed until the queued input is consumed.
        while !matches!(self.tokenizer.feed(&self.input), TokenizerResult::Done) {}
    }
}

impl TendrilSink<UTF8> for Feeder {
    type Output = Extraction;

    fn process(&mut self, text: StrTendril) {
        self.input.push_back(text);
        self.drain();
    }

    fn error(&mut self, desc: Cow<'static, str>) {
        tracing::debug!("Malformed UTF-8 in page body: {}", desc);
    }

    fn finish(self) -> Extraction {
        self.drain();
        self.tokenizer.end();
        self.tokenizer.sink.finish()
    }
}

impl PageTokenizer {
    /// Creates a tokenizer for the page at `target`
    pub fn new(target: Url) -> Self {
        let tokenizer = Tokenizer::new(PageExtractor::new(target), TokenizerOpts::default());
        Self {
            decoder: Utf8LossyDecoder::new(Feeder {
                tokenizer,
                input: BufferQueue::default(),
            }),
        }
    }

    /// Feeds the next chunk of the body
    pub fn feed(&mut self, chunk: &[u8]) {
        if !chunk.is_empty() {
            self.decoder.process(ByteTendril::from_slice(chunk));
        }
    }

    /// Flushes buffered input and returns the extraction
    pub fn finish(self) -> Extraction {
        self.decoder.finish()
    }
}

impl std::fmt::Debug for PageTokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageTokenizer").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::extractor::HtmlVersion;
    use std::time::{Duration, Instant};

    const PAGE: &str = r#"<!DOCTYPE html PUBLIC "-//W3C//DTD HTML 4.01 Transitional//EN">
<html><head><title>Caf&eacute; &amp; Bar</title></head>
<body>
<h1 class="big">Menu</h1>
<a title="x > y" href="/drinks">Drinks</a>
<script>if (a < b) { document.write("<a href='/hidden'>") }</script>
<a href="https://other.example.org/">Elsewhere</a>
<form><input type="password" name="pw"></form>
</body></html>"#;

    fn target() -> Url {
        Url::parse("https://example.com/").unwrap()
    }

    fn whole(html: &[u8]) -> Extraction {
        let mut tokenizer = PageTokenizer::new(target());
        tokenizer.feed(html);
        tokenizer.finish()
    }

    #[test]
    fn test_whole_document() {
        let result = whole(PAGE.as_bytes());
        let summary = &result.summary;

        assert_eq!(summary.html_version, HtmlVersion::Html401Transitional);
        assert_eq!(summary.title.as_deref(), Some("Café & Bar"));
        assert_eq!(summary.headings[0], 1);
        assert_eq!(summary.internal_links, 1);
        assert_eq!(summary.external_links, 1);
        assert!(summary.has_login_form);
    }

    #[test]
    fn test_byte_at_a_time_matches_whole() {
        let expected = whole(PAGE.as_bytes());

        let mut tokenizer = PageTokenizer::new(target());
        for byte in PAGE.as_bytes() {
            tokenizer.feed(std::slice::from_ref(byte));
        }
        let chunked = tokenizer.finish();

        assert_eq!(chunked.summary, expected.summary);
        assert_eq!(chunked.candidates, expected.candidates);
    }

    #[test]
    fn test_multibyte_character_split_across_chunks() {
        let html = "<title>naïve</title>".as_bytes();
        let split = html.iter().position(|&b| b >= 0x80).unwrap() + 1;

        let mut tokenizer = PageTokenizer::new(target());
        tokenizer.feed(&html[..split]);
        tokenizer.feed(&html[split..]);
        let result = tokenizer.finish();

        assert_eq!(result.summary.title.as_deref(), Some("naïve"));
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let result = whole(b"<title>bad \xff byte</title><h2>ok</h2>");
        assert_eq!(result.summary.title.as_deref(), Some("bad \u{fffd} byte"));
        assert_eq!(result.summary.headings[1], 1);
    }

    #[test]
    fn test_unterminated_markup_at_end() {
        let result = whole(b"<h1>a</h1><a href=\"/cut");
        assert_eq!(result.summary.headings[0], 1);
        assert_eq!(result.summary.internal_links, 0);
    }

    #[test]
    fn test_large_unterminated_comment_is_linear() {
        let chunk = vec![b'a'; 16 * 1024];
        let started = Instant::now();

        let mut tokenizer = PageTokenizer::new(target());
        tokenizer.feed(b"<!--");
        for _ in 0..128 {
            tokenizer.feed(&chunk);
        }
        let result = tokenizer.finish();

        assert!(started.elapsed() < Duration::from_secs(20));
        assert_eq!(result.summary, Default::default());
        assert!(result.candidates.is_empty());
    }
}
