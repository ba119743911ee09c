//! Incremental template tokenizer
//!
//! Turns a template byte stream into a sequence of [`TemplateEvent`]s in
//! strict source order. The parser is push-based: each call to
//! [`TemplateParser::push`] consumes one input chunk and yields every event
//! that is complete so far, buffering at most one unfinished token. Events
//! carry the raw source bytes so that non-fragment content passes through
//! byte-identically.
//!
//! A tag named `fragment` (any case) becomes a [`TemplateEvent::Fragment`]
//! placeholder. Self-closing, void and paired forms all yield exactly one
//! placeholder; `</fragment>` is swallowed, and everything enclosed
//! between a `<fragment>` open tag and its `</fragment>` — text and
//! element children alike — is dropped. Content following a void-form
//! `<fragment>` (one that never closes) is page content and passes
//! through untouched. Contents of `<script>` and `<style>` elements are
//! rawtext: a `<fragment>` inside them is ordinary text.

use crate::error::{Result, StitchError};
use bytes::{Bytes, BytesMut};

/// One attribute of a parsed tag
///
/// Names are lowercased at parse time; values keep their source spelling.
/// A boolean attribute (`primary`) has `value: None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub value: Option<String>,
}

impl Attribute {
    pub fn new(name: impl Into<String>, value: Option<&str>) -> Self {
        Attribute {
            name: name.into(),
            value: value.map(|v| v.to_string()),
        }
    }
}

/// One token of the template stream, in source order
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateEvent {
    /// An opening tag that is not a fragment placeholder
    OpenTag {
        name: String,
        attrs: Vec<Attribute>,
        raw: Bytes,
    },
    /// A closing tag that is not `</fragment>`
    CloseTag { name: String, raw: Bytes },
    /// Raw text, including comments and doctype declarations
    Text(Bytes),
    /// A `<fragment>` placeholder with its raw attributes
    Fragment { attrs: Vec<Attribute> },
}

impl TemplateEvent {
    /// The exact source bytes this event contributes to the output stream
    ///
    /// Fragment placeholders contribute nothing themselves; their slot is
    /// filled by the fragment runtime.
    pub fn raw_bytes(&self) -> Option<&Bytes> {
        match self {
            TemplateEvent::OpenTag { raw, .. } => Some(raw),
            TemplateEvent::CloseTag { raw, .. } => Some(raw),
            TemplateEvent::Text(raw) => Some(raw),
            TemplateEvent::Fragment { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum State {
    Data,
    RawText { elem: &'static str },
}

/// Push-based incremental template parser
///
/// Feed chunks with [`push`](Self::push), then call
/// [`finish`](Self::finish) once the input stream ends. The parser is
/// single-use; pushing after `finish` is an error.
#[derive(Debug)]
pub struct TemplateParser {
    buf: BytesMut,
    state: State,
    /// Events held back after a non-self-closing `<fragment>`. The
    /// matching `</fragment>` discards them (children are ignored); a new
    /// placeholder, a close tag for an enclosing element, or end of input
    /// reveals the void form and releases them unchanged.
    held: Vec<TemplateEvent>,
    /// Names of elements opened inside the held region, innermost last;
    /// a close tag matching the top stays held, anything else resolves
    /// the hold.
    held_open: Vec<String>,
    holding: bool,
    finished: bool,
}

impl Default for TemplateParser {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateParser {
    pub fn new() -> Self {
        TemplateParser {
            buf: BytesMut::new(),
            state: State::Data,
            held: Vec::new(),
            held_open: Vec::new(),
            holding: false,
            finished: false,
        }
    }

    /// Consume one input chunk, returning every event completed by it
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<TemplateEvent>> {
        if self.finished {
            return Err(StitchError::TemplateParse(
                "template stream pushed after finish".to_string(),
            ));
        }
        self.buf.extend_from_slice(chunk);
        let mut out = Vec::new();
        self.drain(&mut out)?;
        Ok(out)
    }

    /// Signal end of input, returning the final events
    ///
    /// An incomplete tag at end of input is a terminal parse error; events
    /// already returned by earlier `push` calls stand.
    pub fn finish(&mut self) -> Result<Vec<TemplateEvent>> {
        if self.finished {
            return Err(StitchError::TemplateParse(
                "template stream finished twice".to_string(),
            ));
        }
        self.finished = true;
        let mut out = Vec::new();
        match self.state {
            State::Data => {
                if !self.buf.is_empty() {
                    // Everything completable was drained by push; any
                    // leftover starts with '<' and never closed.
                    return Err(StitchError::TemplateParse(
                        "unterminated tag at end of template".to_string(),
                    ));
                }
            }
            State::RawText { .. } => {
                // Unterminated rawtext passes through as text.
                if !self.buf.is_empty() {
                    let rest = self.buf.split().freeze();
                    self.emit(TemplateEvent::Text(rest), &mut out);
                }
            }
        }
        self.flush_held(&mut out);
        Ok(out)
    }

    fn drain(&mut self, out: &mut Vec<TemplateEvent>) -> Result<()> {
        loop {
            match self.state {
                State::Data => {
                    if !self.drain_data(out)? {
                        return Ok(());
                    }
                }
                State::RawText { elem } => {
                    if !self.drain_rawtext(elem, out) {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Process one token in data state; false means more input is needed
    fn drain_data(&mut self, out: &mut Vec<TemplateEvent>) -> Result<bool> {
        if self.buf.is_empty() {
            return Ok(false);
        }

        if self.buf[0] != b'<' {
            let end = find_byte(&self.buf, b'<', 0).unwrap_or(self.buf.len());
            let text = self.buf.split_to(end).freeze();
            self.emit(TemplateEvent::Text(text), out);
            return Ok(true);
        }

        if self.buf.len() < 2 {
            return Ok(false);
        }

        match self.buf[1] {
            b'!' => self.drain_markup_declaration(out),
            b'/' => self.drain_close_tag(out),
            c if c.is_ascii_alphabetic() => self.drain_open_tag(out),
            _ => {
                // A lone '<' that opens no tag is ordinary text.
                let end = find_byte(&self.buf, b'<', 1).unwrap_or(self.buf.len());
                let text = self.buf.split_to(end).freeze();
                self.emit(TemplateEvent::Text(text), out);
                Ok(true)
            }
        }
    }

    /// Comments and doctype declarations pass through verbatim as text
    fn drain_markup_declaration(&mut self, out: &mut Vec<TemplateEvent>) -> Result<bool> {
        const COMMENT_OPEN: &[u8] = b"<!--";
        const COMMENT_CLOSE: &[u8] = b"-->";

        let prefix_len = self.buf.len().min(COMMENT_OPEN.len());
        if self.buf[..prefix_len] == COMMENT_OPEN[..prefix_len] {
            if self.buf.len() < COMMENT_OPEN.len() {
                return Ok(false);
            }
            match find_subslice(&self.buf, COMMENT_CLOSE, COMMENT_OPEN.len()) {
                Some(at) => {
                    let text = self.buf.split_to(at + COMMENT_CLOSE.len()).freeze();
                    self.emit(TemplateEvent::Text(text), out);
                    Ok(true)
                }
                None => Ok(false),
            }
        } else {
            match find_byte(&self.buf, b'>', 2) {
                Some(at) => {
                    let text = self.buf.split_to(at + 1).freeze();
                    self.emit(TemplateEvent::Text(text), out);
                    Ok(true)
                }
                None => Ok(false),
            }
        }
    }

    fn drain_close_tag(&mut self, out: &mut Vec<TemplateEvent>) -> Result<bool> {
        let Some(gt) = find_byte(&self.buf, b'>', 2) else {
            return Ok(false);
        };
        let raw = self.buf.split_to(gt + 1).freeze();
        let mut end = 2;
        while end < raw.len() && raw[end].is_ascii_alphanumeric() {
            end += 1;
        }
        let name = std::str::from_utf8(&raw[2..end])
            .map_err(|_| StitchError::TemplateParse("close tag name is not UTF-8".to_string()))?
            .to_ascii_lowercase();

        if name == "fragment" {
            // The close form of a placeholder: swallow it, together with
            // everything held since the matching open tag.
            self.drop_held();
        } else {
            self.emit(TemplateEvent::CloseTag { name, raw }, out);
        }
        Ok(true)
    }

    fn drain_open_tag(&mut self, out: &mut Vec<TemplateEvent>) -> Result<bool> {
        let Some(gt) = find_tag_end(&self.buf) else {
            return Ok(false);
        };
        let raw = self.buf.split_to(gt + 1).freeze();
        let inner = std::str::from_utf8(&raw[1..raw.len() - 1])
            .map_err(|_| StitchError::TemplateParse("tag is not valid UTF-8".to_string()))?;
        let (name, attrs, self_closing) = parse_tag(inner)?;

        if name == "fragment" {
            // A placeholder never nests inside another; a second
            // `<fragment>` while holding proves the first one was void.
            self.flush_held(out);
            out.push(TemplateEvent::Fragment { attrs });
            if !self_closing {
                self.holding = true;
            }
        } else {
            let rawtext = match name.as_str() {
                "script" => Some("script"),
                "style" => Some("style"),
                _ => None,
            };
            self.emit(TemplateEvent::OpenTag { name, attrs, raw }, out);
            if let (Some(elem), false) = (rawtext, self_closing) {
                self.state = State::RawText { elem };
            }
        }
        Ok(true)
    }

    /// Process rawtext content; false means more input is needed
    fn drain_rawtext(&mut self, elem: &'static str, out: &mut Vec<TemplateEvent>) -> bool {
        match find_rawtext_close(&self.buf, elem) {
            RawTextScan::Close { start } => {
                if start > 0 {
                    let text = self.buf.split_to(start).freeze();
                    self.emit(TemplateEvent::Text(text), out);
                }
                let Some(gt) = find_byte(&self.buf, b'>', 2) else {
                    return false;
                };
                let raw = self.buf.split_to(gt + 1).freeze();
                self.emit(
                    TemplateEvent::CloseTag {
                        name: elem.to_string(),
                        raw,
                    },
                    out,
                );
                self.state = State::Data;
                true
            }
            RawTextScan::NeedMore { safe } => {
                if safe > 0 {
                    let text = self.buf.split_to(safe).freeze();
                    self.emit(TemplateEvent::Text(text), out);
                }
                false
            }
        }
    }

    /// Route one event to the output, honoring a pending fragment hold
    ///
    /// While holding, text and nested elements are deferred; a close tag
    /// that does not match the innermost deferred element belongs to the
    /// surrounding page, so it proves the fragment was void and releases
    /// the hold.
    fn emit(&mut self, event: TemplateEvent, out: &mut Vec<TemplateEvent>) {
        if !self.holding {
            out.push(event);
            return;
        }
        match event {
            TemplateEvent::Text(_) => self.held.push(event),
            TemplateEvent::OpenTag { ref name, ref raw, .. } => {
                // Void and self-closed elements never get a close tag and
                // must not take part in close matching.
                if !is_void_element(name) && !raw.ends_with(b"/>") {
                    self.held_open.push(name.clone());
                }
                self.held.push(event);
            }
            TemplateEvent::CloseTag { ref name, .. } => {
                if self.held_open.last() == Some(name) {
                    self.held_open.pop();
                    self.held.push(event);
                } else {
                    self.flush_held(out);
                    out.push(event);
                }
            }
            TemplateEvent::Fragment { .. } => out.push(event),
        }
    }

    fn flush_held(&mut self, out: &mut Vec<TemplateEvent>) {
        self.holding = false;
        self.held_open.clear();
        out.append(&mut self.held);
    }

    fn drop_held(&mut self) {
        self.holding = false;
        self.held_open.clear();
        self.held.clear();
    }
}

enum RawTextScan {
    /// A `</elem` close tag begins at this offset
    Close { start: usize },
    /// No close tag yet; the first `safe` bytes are definitely text
    NeedMore { safe: usize },
}

/// Locate the rawtext close tag, retaining a possible partial match tail
fn find_rawtext_close(buf: &[u8], elem: &str) -> RawTextScan {
    let name = elem.as_bytes();
    let probe_len = 2 + name.len();
    let mut i = 0;
    while i < buf.len() {
        let Some(lt) = find_byte(buf, b'<', i) else {
            return RawTextScan::NeedMore { safe: buf.len() };
        };
        let avail = buf.len() - lt;
        if avail < probe_len + 1 {
            // Might still become the close tag; keep from here on buffered.
            let prefix = &buf[lt..];
            if close_tag_prefix_matches(prefix, name) {
                return RawTextScan::NeedMore { safe: lt };
            }
            i = lt + 1;
            continue;
        }
        if buf[lt + 1] == b'/'
            && buf[lt + 2..lt + probe_len].eq_ignore_ascii_case(name)
            && matches!(buf[lt + probe_len], b'>' | b'/' | b' ' | b'\t' | b'\n' | b'\r')
        {
            return RawTextScan::Close { start: lt };
        }
        i = lt + 1;
    }
    RawTextScan::NeedMore { safe: buf.len() }
}

/// Whether `prefix` could grow into `</name` + terminator
fn close_tag_prefix_matches(prefix: &[u8], name: &[u8]) -> bool {
    let mut expected = Vec::with_capacity(2 + name.len());
    expected.extend_from_slice(b"</");
    expected.extend_from_slice(name);
    let n = prefix.len().min(expected.len());
    prefix[..n].eq_ignore_ascii_case(&expected[..n])
}

fn is_void_element(name: &str) -> bool {
    matches!(
        name,
        "area"
            | "base"
            | "br"
            | "col"
            | "embed"
            | "hr"
            | "img"
            | "input"
            | "link"
            | "meta"
            | "param"
            | "source"
            | "track"
            | "wbr"
    )
}

fn find_byte(buf: &[u8], needle: u8, from: usize) -> Option<usize> {
    buf.get(from..)?
        .iter()
        .position(|&b| b == needle)
        .map(|p| p + from)
}

fn find_subslice(buf: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if buf.len() < from + needle.len() {
        return None;
    }
    (from..=buf.len() - needle.len()).find(|&i| &buf[i..i + needle.len()] == needle)
}

/// Locate the `>` ending the tag that starts at `buf[0]`, skipping over
/// quoted attribute values
fn find_tag_end(buf: &[u8]) -> Option<usize> {
    let mut quote: Option<u8> = None;
    for (i, &b) in buf.iter().enumerate().skip(1) {
        match quote {
            Some(q) => {
                if b == q {
                    quote = None;
                }
            }
            None => match b {
                b'"' | b'\'' => quote = Some(b),
                b'>' => return Some(i),
                _ => {}
            },
        }
    }
    None
}

/// Parse the inside of an open tag (`name attr=value ...`, no angle brackets)
fn parse_tag(inner: &str) -> Result<(String, Vec<Attribute>, bool)> {
    let bytes = inner.as_bytes();
    let mut i = 0;
    while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'-') {
        i += 1;
    }
    if i == 0 {
        return Err(StitchError::TemplateParse(format!(
            "tag has no name: <{}>",
            inner
        )));
    }
    let name = inner[..i].to_ascii_lowercase();

    let mut attrs = Vec::new();
    let mut self_closing = false;
    while i < bytes.len() {
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if i >= bytes.len() {
            break;
        }
        if bytes[i] == b'/' {
            if inner[i + 1..].trim().is_empty() {
                self_closing = true;
            }
            i += 1;
            continue;
        }

        let name_start = i;
        while i < bytes.len()
            && !bytes[i].is_ascii_whitespace()
            && bytes[i] != b'='
            && bytes[i] != b'/'
        {
            i += 1;
        }
        if i == name_start {
            i += 1;
            continue;
        }
        let attr_name = inner[name_start..i].to_ascii_lowercase();

        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        let value = if i < bytes.len() && bytes[i] == b'=' {
            i += 1;
            while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                i += 1;
            }
            if i < bytes.len() && (bytes[i] == b'"' || bytes[i] == b'\'') {
                let q = bytes[i];
                i += 1;
                let value_start = i;
                while i < bytes.len() && bytes[i] != q {
                    i += 1;
                }
                if i >= bytes.len() {
                    return Err(StitchError::TemplateParse(format!(
                        "unterminated quoted attribute in <{}>",
                        inner
                    )));
                }
                let value = inner[value_start..i].to_string();
                i += 1;
                Some(value)
            } else {
                let value_start = i;
                while i < bytes.len() && !bytes[i].is_ascii_whitespace() {
                    i += 1;
                }
                Some(inner[value_start..i].to_string())
            }
        } else {
            None
        };

        attrs.push(Attribute {
            name: attr_name,
            value,
        });
    }

    Ok((name, attrs, self_closing))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_all(input: &str) -> Vec<TemplateEvent> {
        let mut parser = TemplateParser::new();
        let mut out = parser.push(input.as_bytes()).unwrap();
        out.extend(parser.finish().unwrap());
        out
    }

    fn parse_chunked(input: &str, chunk: usize) -> Vec<TemplateEvent> {
        let mut parser = TemplateParser::new();
        let mut out = Vec::new();
        for piece in input.as_bytes().chunks(chunk) {
            out.extend(parser.push(piece).unwrap());
        }
        out.extend(parser.finish().unwrap());
        out
    }

    fn rendered(events: &[TemplateEvent]) -> String {
        let mut s = String::new();
        for event in events {
            if let Some(raw) = event.raw_bytes() {
                s.push_str(std::str::from_utf8(raw).unwrap());
            }
        }
        s
    }

    fn attr<'a>(attrs: &'a [Attribute], name: &str) -> Option<&'a Attribute> {
        attrs.iter().find(|a| a.name == name)
    }

    /// Merge adjacent Text events; chunked input may split one text run
    /// into several events without changing the byte stream.
    fn coalesced(events: Vec<TemplateEvent>) -> Vec<TemplateEvent> {
        let mut out: Vec<TemplateEvent> = Vec::new();
        for event in events {
            match (out.last_mut(), &event) {
                (Some(TemplateEvent::Text(acc)), TemplateEvent::Text(next)) => {
                    let mut merged = Vec::with_capacity(acc.len() + next.len());
                    merged.extend_from_slice(acc);
                    merged.extend_from_slice(next);
                    *acc = Bytes::from(merged);
                }
                _ => out.push(event),
            }
        }
        out
    }

    #[test]
    fn test_plain_html_passthrough() {
        let input = "<html><body>hello &amp; <b>world</b></body></html>";
        let events = parse_all(input);
        assert_eq!(rendered(&events), input);
        assert!(!events
            .iter()
            .any(|e| matches!(e, TemplateEvent::Fragment { .. })));
    }

    #[test]
    fn test_fragment_recognized() {
        let events = parse_all(r#"<html><fragment id="f-1" src="https://fragment/1"></html>"#);
        let frags: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                TemplateEvent::Fragment { attrs } => Some(attrs),
                _ => None,
            })
            .collect();
        assert_eq!(frags.len(), 1);
        assert_eq!(attr(frags[0], "id").unwrap().value.as_deref(), Some("f-1"));
        assert_eq!(
            attr(frags[0], "src").unwrap().value.as_deref(),
            Some("https://fragment/1")
        );
        assert_eq!(rendered(&events), "<html></html>");
    }

    #[test]
    fn test_fragment_forms_single_placeholder() {
        for input in [
            r#"<fragment src="http://x/1">"#,
            r#"<fragment src="http://x/1"/>"#,
            r#"<fragment src="http://x/1" />"#,
            r#"<fragment src="http://x/1"></fragment>"#,
        ] {
            let events = parse_all(input);
            let count = events
                .iter()
                .filter(|e| matches!(e, TemplateEvent::Fragment { .. }))
                .count();
            assert_eq!(count, 1, "input {:?}", input);
            assert_eq!(rendered(&events), "", "input {:?}", input);
        }
    }

    #[test]
    fn test_fragment_text_children_dropped() {
        let events = parse_all(r#"<p><fragment src="http://x/1">loading...</fragment>done</p>"#);
        assert_eq!(rendered(&events), "<p>done</p>");
    }

    #[test]
    fn test_fragment_element_children_dropped() {
        let events =
            parse_all(r#"<p><fragment src="http://x/1"><b>bold</b></fragment>done</p>"#);
        assert_eq!(rendered(&events), "<p>done</p>");
        let count = events
            .iter()
            .filter(|e| matches!(e, TemplateEvent::Fragment { .. }))
            .count();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_fragment_mixed_children_dropped() {
        let events =
            parse_all(r#"<fragment src="http://x/1">a<b>b</b>c</fragment><footer>"#);
        assert_eq!(rendered(&events), "<footer>");
    }

    #[test]
    fn test_fragment_nested_element_children_dropped() {
        let events = parse_all(
            r#"<fragment src="http://x/1"><div><span>deep</span><br></div></fragment>after"#,
        );
        assert_eq!(rendered(&events), "after");
    }

    #[test]
    fn test_unclosed_fragment_keeps_following_text() {
        // No </fragment> ever arrives, so the text is page content.
        let events = parse_all(r#"<fragment src="http://x/1">tail"#);
        assert_eq!(rendered(&events), "tail");
    }

    #[test]
    fn test_void_fragment_keeps_sibling_elements() {
        // No </fragment> here either: the div is a sibling of the void
        // placeholder, not a child, and must survive.
        let events = parse_all(r#"<body><fragment src="http://x/1"><div>next</div></body>"#);
        assert_eq!(rendered(&events), "<body><div>next</div></body>");
    }

    #[test]
    fn test_fragment_case_insensitive() {
        let events = parse_all(r#"<FRAGMENT SRC="http://x/1"></FRAGMENT>"#);
        let frags: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                TemplateEvent::Fragment { attrs } => Some(attrs),
                _ => None,
            })
            .collect();
        assert_eq!(frags.len(), 1);
        assert_eq!(
            attr(frags[0], "src").unwrap().value.as_deref(),
            Some("http://x/1")
        );
    }

    #[test]
    fn test_attribute_quoting_forms() {
        let events = parse_all(r#"<fragment src=http://x/1 id='f' primary async=false>"#);
        let TemplateEvent::Fragment { attrs } = &events[0] else {
            panic!("expected fragment");
        };
        assert_eq!(
            attr(attrs, "src").unwrap().value.as_deref(),
            Some("http://x/1")
        );
        assert_eq!(attr(attrs, "id").unwrap().value.as_deref(), Some("f"));
        assert_eq!(attr(attrs, "primary").unwrap().value, None);
        assert_eq!(attr(attrs, "async").unwrap().value.as_deref(), Some("false"));
    }

    #[test]
    fn test_quoted_gt_does_not_end_tag() {
        let events = parse_all(r#"<div title="a>b">x</div>"#);
        assert_eq!(rendered(&events), r#"<div title="a>b">x</div>"#);
        let TemplateEvent::OpenTag { attrs, .. } = &events[0] else {
            panic!("expected open tag");
        };
        assert_eq!(attr(attrs, "title").unwrap().value.as_deref(), Some("a>b"));
    }

    #[test]
    fn test_comment_and_doctype_passthrough() {
        let input = "<!DOCTYPE html><!-- a <fragment> in a comment --><p>x</p>";
        let events = parse_all(input);
        assert_eq!(rendered(&events), input);
        assert!(!events
            .iter()
            .any(|e| matches!(e, TemplateEvent::Fragment { .. })));
    }

    #[test]
    fn test_script_contents_are_rawtext() {
        let input = r#"<script>if (a < b) { x("<fragment src='no'>"); }</script>"#;
        let events = parse_all(input);
        assert_eq!(rendered(&events), input);
        assert!(!events
            .iter()
            .any(|e| matches!(e, TemplateEvent::Fragment { .. })));
    }

    #[test]
    fn test_events_identical_under_chunking() {
        let input = concat!(
            "<!DOCTYPE html><html><head><script>let a = 1 < 2;</script></head>",
            r#"<body><fragment id="f-1" src="http://x/1" timeout=250>"#,
            r#"<!-- note --><fragment src="http://x/2" async></body></html>"#,
        );
        let whole = coalesced(parse_all(input));
        for chunk in [1, 2, 3, 7, 16] {
            assert_eq!(
                coalesced(parse_chunked(input, chunk)),
                whole,
                "chunk size {}",
                chunk
            );
        }
    }

    #[test]
    fn test_lone_lt_is_text() {
        let input = "a < b and c<1";
        let events = parse_all(input);
        assert_eq!(rendered(&events), input);
    }

    #[test]
    fn test_unterminated_tag_is_error() {
        let mut parser = TemplateParser::new();
        parser.push(b"<html><div class=").unwrap();
        assert!(parser.finish().is_err());
    }

    #[test]
    fn test_unterminated_quote_is_error() {
        let mut parser = TemplateParser::new();
        assert!(parser.push(br#"<div class="open>"#).is_ok());
        assert!(parser.finish().is_err());
    }

    #[test]
    fn test_events_before_error_are_kept() {
        let mut parser = TemplateParser::new();
        let events = parser.push(b"<p>ok</p><div").unwrap();
        assert_eq!(rendered(&events), "<p>ok</p>");
        assert!(parser.finish().is_err());
    }

    #[test]
    fn test_unterminated_rawtext_flushes_as_text() {
        let mut parser = TemplateParser::new();
        let mut events = parser.push(b"<script>var x = 1;").unwrap();
        events.extend(parser.finish().unwrap());
        assert_eq!(rendered(&events), "<script>var x = 1;");
    }

    #[test]
    fn test_push_after_finish_is_error() {
        let mut parser = TemplateParser::new();
        parser.finish().unwrap();
        assert!(parser.push(b"<p>").is_err());
    }
}
