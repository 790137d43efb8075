//! The file-block wire format shared by the packager (writer) and the
//! reply scanner (reader): `<file path="rel/path">` ... `</file>`.

/// Tag name, matched ASCII case-insensitively by the reader.
pub const TAG_NAME: &str = "file";

/// The one attribute an open tag must carry.
pub const PATH_ATTR: &str = "path";

/// Wrapper around a packaged codebase.
pub const DOCUMENT_OPEN: &str = "<codebase>\n";
pub const DOCUMENT_CLOSE: &str = "</codebase>\n";

/// Render one framed entry. The line break after the open tag belongs to
/// the framing; content follows verbatim and the close tag comes right
/// after it.
pub fn render_block(out: &mut String, path: &str, content: &str) {
    out.push('<');
    out.push_str(TAG_NAME);
    out.push(' ');
    out.push_str(PATH_ATTR);
    out.push_str("=\"");
    out.push_str(&escape_attr(path));
    out.push_str("\">\n");
    out.push_str(content);
    out.push_str("</");
    out.push_str(TAG_NAME);
    out.push_str(">\n");
}

/// Escape a value for a double-quoted XML attribute.
pub fn escape_attr(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

/// Undo the five predefined XML entities. Unknown entities and stray `&`
/// are left as they are.
pub fn unescape_xml(value: &str) -> String {
    const ENTITIES: [(&str, char); 5] = [
        ("&lt;", '<'),
        ("&gt;", '>'),
        ("&quot;", '"'),
        ("&apos;", '\''),
        ("&amp;", '&'),
    ];

    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];
        match ENTITIES
            .iter()
            .find(|(name, _)| rest.starts_with(name))
        {
            Some((name, c)) => {
                out.push(*c);
                rest = &rest[name.len()..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}
