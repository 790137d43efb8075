//! Reply scanner: splits a model reply into file blocks and the text
//! around them.
//!
//! A single left-to-right pass with two positions, OUTSIDE and INSIDE a
//! block. Anything that looks like an open tag but does not parse stays
//! plain text; a block still open at end of input is emitted anyway;
//! open tags inside a block are content. Parsing never fails.

use std::ops::Range;

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::cli::{AppContext, CheckArgs};
use crate::core::report::{Tint, tint};
use crate::core::tags::{PATH_ATTR, TAG_NAME, unescape_xml};
use crate::infra::utils::read_input;

/// Why a block's path cannot be written under the output root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PathIssue {
    Empty,
    Absolute,
    EscapesRoot,
}

impl std::fmt::Display for PathIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathIssue::Empty => f.write_str("empty path"),
            PathIssue::Absolute => f.write_str("absolute path"),
            PathIssue::EscapesRoot => f.write_str("path escapes the output root"),
        }
    }
}

/// Path check done when a block is emitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "value", rename_all = "kebab-case")]
pub enum PathStatus {
    /// Normalized relative path, `/`-separated, no `.`/`..` segments
    Valid(String),
    Invalid(PathIssue),
}

/// One file block recovered from the reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedFile {
    /// Path exactly as the reply asserted it (attribute-unescaped)
    pub path: String,
    pub status: PathStatus,
    pub content: String,
    /// False when the reply ended before the close tag
    pub terminated: bool,
    /// Byte range of the whole block, tags included
    pub span: Range<usize>,
}

impl ParsedFile {
    pub fn is_valid(&self) -> bool {
        matches!(self.status, PathStatus::Valid(_))
    }

    pub fn target(&self) -> Option<&str> {
        match &self.status {
            PathStatus::Valid(p) => Some(p),
            PathStatus::Invalid(_) => None,
        }
    }
}

/// Reply text outside every block, verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnattributedFragment {
    pub offset: usize,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AnomalyKind {
    /// Started like an open tag but did not parse
    MalformedOpenTag,
    /// Close tag with no open block
    StrayCloseTag,
}

/// Tag-like text that was left as plain text. Recorded for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Anomaly {
    pub offset: usize,
    pub kind: AnomalyKind,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParsedReply {
    pub files: Vec<ParsedFile>,
    pub fragments: Vec<UnattributedFragment>,
    pub anomalies: Vec<Anomaly>,
}

impl ParsedReply {
    /// True when the user should look at the raw reply: nothing parsed,
    /// a block ran to end of input, a path was rejected, or tag-like text
    /// was left behind.
    pub fn is_ambiguous(&self) -> bool {
        self.files.is_empty()
            || !self.anomalies.is_empty()
            || self
                .files
                .iter()
                .any(|f| !f.terminated || !f.is_valid())
    }

    /// All unattributed text joined in order.
    pub fn unattributed_text(&self) -> String {
        self.fragments.iter().map(|f| f.text.as_str()).collect()
    }
}

enum State {
    Outside { fragment_start: usize },
    Inside { block_start: usize, path: String, content_start: usize },
}

/// Scan `reply` into file blocks and unattributed fragments.
#[instrument(skip_all, fields(bytes = reply.len()))]
pub fn parse(reply: &str) -> ParsedReply {
    let bytes = reply.as_bytes();
    let mut out = ParsedReply::default();
    let mut state = State::Outside { fragment_start: 0 };
    let mut pos = 0;

    loop {
        match state {
            State::Outside { fragment_start } => {
                let Some(lt) = memchr::memchr(b'<', &bytes[pos..]).map(|o| pos + o) else {
                    push_fragment(&mut out, reply, fragment_start, reply.len());
                    break;
                };

                match parse_open_tag(reply, lt) {
                    Some((path, tag_end)) => {
                        push_fragment(&mut out, reply, fragment_start, lt);
                        let content_start = tag_end + framing_break(&reply[tag_end..]);
                        state = State::Inside { block_start: lt, path, content_start };
                        pos = content_start;
                    }
                    None => {
                        if starts_with_tag_name(reply, lt + 1) {
                            out.anomalies.push(Anomaly { offset: lt, kind: AnomalyKind::MalformedOpenTag });
                        } else if close_tag_end(reply, lt).is_some() {
                            out.anomalies.push(Anomaly { offset: lt, kind: AnomalyKind::StrayCloseTag });
                        }
                        pos = lt + 1;
                        state = State::Outside { fragment_start };
                    }
                }
            }
            State::Inside { block_start, path, content_start } => {
                let mut search = pos;
                let close = loop {
                    match memchr::memchr(b'<', &bytes[search..]).map(|o| search + o) {
                        None => break None,
                        Some(lt) => match close_tag_end(reply, lt) {
                            Some(end) => break Some((lt, end)),
                            None => search = lt + 1,
                        },
                    }
                };

                match close {
                    Some((lt, end)) => {
                        emit_file(&mut out, path, &reply[content_start..lt], true, block_start..end);
                        pos = end;
                        state = State::Outside { fragment_start: end };
                    }
                    None => {
                        emit_file(
                            &mut out,
                            path,
                            &reply[content_start..],
                            false,
                            block_start..reply.len(),
                        );
                        break;
                    }
                }
            }
        }
    }

    debug!(
        files = out.files.len(),
        fragments = out.fragments.len(),
        anomalies = out.anomalies.len(),
        "reply parsed"
    );
    out
}

fn push_fragment(out: &mut ParsedReply, reply: &str, start: usize, end: usize) {
    if start < end {
        out.fragments.push(UnattributedFragment {
            offset: start,
            text: reply[start..end].to_string(),
        });
    }
}

fn emit_file(out: &mut ParsedReply, path: String, content: &str, terminated: bool, span: Range<usize>) {
    let status = validate_path(&path);
    out.files.push(ParsedFile {
        path,
        status,
        content: content.to_string(),
        terminated,
        span,
    });
}

/// Length of the single line break that belongs to the open tag.
fn framing_break(after_tag: &str) -> usize {
    if after_tag.starts_with("\r\n") {
        2
    } else if after_tag.starts_with('\n') {
        1
    } else {
        0
    }
}

/// `reply[at..]` starts with the tag name, any case.
fn starts_with_tag_name(reply: &str, at: usize) -> bool {
    reply
        .get(at..at + TAG_NAME.len())
        .is_some_and(|s| s.eq_ignore_ascii_case(TAG_NAME))
}

/// If a close tag starts at `lt`, return the index just past its `>`.
fn close_tag_end(reply: &str, lt: usize) -> Option<usize> {
    let bytes = reply.as_bytes();
    if bytes.get(lt + 1) != Some(&b'/') || !starts_with_tag_name(reply, lt + 2) {
        return None;
    }
    let mut j = lt + 2 + TAG_NAME.len();
    while bytes.get(j).is_some_and(u8::is_ascii_whitespace) {
        j += 1;
    }
    (bytes.get(j) == Some(&b'>')).then_some(j + 1)
}

fn is_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b':' | b'.')
}

/// Parse an open tag starting at `lt`. Returns the unescaped path and the
/// index just past `>`, or None when the text is not a usable open tag.
fn parse_open_tag(reply: &str, lt: usize) -> Option<(String, usize)> {
    let bytes = reply.as_bytes();
    if !starts_with_tag_name(reply, lt + 1) {
        return None;
    }

    let mut j = lt + 1 + TAG_NAME.len();
    // At least one space before attributes; rules out `<file>` and `<filex`
    if !bytes.get(j).is_some_and(u8::is_ascii_whitespace) {
        return None;
    }

    let mut path: Option<String> = None;
    loop {
        while bytes.get(j).is_some_and(u8::is_ascii_whitespace) {
            j += 1;
        }

        match *bytes.get(j)? {
            b'>' => {
                j += 1;
                break;
            }
            b'<' | b'/' => return None,
            _ => {}
        }

        let name_start = j;
        while bytes.get(j).copied().is_some_and(is_name_byte) {
            j += 1;
        }
        if j == name_start {
            return None;
        }
        let name = &reply[name_start..j];

        while bytes.get(j).is_some_and(u8::is_ascii_whitespace) {
            j += 1;
        }
        if bytes.get(j) != Some(&b'=') {
            return None;
        }
        j += 1;
        while bytes.get(j).is_some_and(u8::is_ascii_whitespace) {
            j += 1;
        }

        let quote = *bytes.get(j)?;
        if quote != b'"' && quote != b'\'' {
            return None;
        }
        let value_start = j + 1;
        let value_end = value_start + memchr::memchr(quote, &bytes[value_start..])?;
        let value = &reply[value_start..value_end];
        if value.contains(['<', '\n']) {
            return None;
        }
        j = value_end + 1;

        if name.eq_ignore_ascii_case(PATH_ATTR) {
            if path.is_some() {
                return None;
            }
            path = Some(unescape_xml(value));
        }
    }

    let path = path?;
    if path.trim().is_empty() {
        return None;
    }
    Some((path, j))
}

/// Normalize a model-asserted path, or say why it cannot be used.
///
/// `\` counts as a separator, `.` and empty segments are dropped and `..`
/// is resolved lexically. Climbing above the root is never allowed.
pub fn validate_path(raw: &str) -> PathStatus {
    // Whitespace is part of the name; only an all-blank path is empty
    if raw.trim().is_empty() {
        return PathStatus::Invalid(PathIssue::Empty);
    }

    let unified = raw.replace('\\', "/");
    let b = unified.as_bytes();
    let drive = b.len() >= 2 && b[0].is_ascii_alphabetic() && b[1] == b':';
    if unified.starts_with('/') || drive {
        return PathStatus::Invalid(PathIssue::Absolute);
    }

    let mut parts: Vec<&str> = Vec::new();
    for seg in unified.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                if parts.pop().is_none() {
                    return PathStatus::Invalid(PathIssue::EscapesRoot);
                }
            }
            s => parts.push(s),
        }
    }

    if parts.is_empty() {
        return PathStatus::Invalid(PathIssue::Empty);
    }
    PathStatus::Valid(parts.join("/"))
}

/// `relay check`: parse a reply and describe what would be written.
pub fn check_run(args: CheckArgs, ctx: &AppContext) -> Result<()> {
    let reply = read_input(args.input.reply.as_deref(), args.input.stdin, args.input.from_clipboard)?;
    let parsed = parse(&reply);

    if args.json {
        println!("{}", serde_json::to_string(&parsed)?);
        return Ok(());
    }
    if ctx.quiet {
        return Ok(());
    }

    println!("Files in reply: {}", parsed.files.len());
    for f in &parsed.files {
        let note = match (&f.status, f.terminated) {
            (PathStatus::Invalid(issue), _) => tint(&format!("rejected: {issue}"), Tint::Red, ctx),
            (PathStatus::Valid(_), false) => tint("unterminated, recovered", Tint::Yellow, ctx),
            (PathStatus::Valid(_), true) => tint("ok", Tint::Green, ctx),
        };
        println!("  - {} ({} bytes) {}", f.path, f.content.len(), note);
    }

    let loose: usize = parsed.fragments.iter().map(|f| f.text.len()).sum();
    println!("Unattributed text: {} bytes in {} fragments", loose, parsed.fragments.len());
    for a in &parsed.anomalies {
        let what = match a.kind {
            AnomalyKind::MalformedOpenTag => "malformed open tag",
            AnomalyKind::StrayCloseTag => "stray close tag",
        };
        println!("  {} {} at byte {}", tint("note:", Tint::Yellow, ctx), what, a.offset);
    }

    Ok(())
}
