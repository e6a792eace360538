//! Whitespace and comment minifier for the production index page.

use crate::style::minify::minify_str;

/// Elements whose content is not HTML text.
const RAW_TEXT: &[&str] = &["pre", "textarea", "script", "style"];

pub fn minify(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut rest = html;

    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix("<!--") {
            let (body, next) = match after.find("-->") {
                Some(end) => (&after[..end], &after[end + 3..]),
                None => (after, ""),
            };
            if is_conditional(body) {
                out.push_str("<!--");
                out.push_str(body);
                out.push_str("-->");
            }
            rest = next;
            continue;
        }

        if rest.starts_with('<') && starts_tag(&rest[1..]) {
            let end = tag_end(rest);
            let tag = &rest[..end];
            out.push_str(&collapse_tag(tag));
            rest = &rest[end..];

            if let Some(name) = raw_text_element(tag) {
                let close = find_close(rest, name);
                let content = &rest[..close];
                match name {
                    "style" => out.push_str(&minify_str(content)),
                    "script" => out.push_str(content.trim()),
                    _ => out.push_str(content),
                }
                rest = &rest[close..];
            }
            continue;
        }

        let first = rest.chars().next().map_or(1, char::len_utf8);
        let next = rest[first..].find('<').map(|i| i + first).unwrap_or(rest.len());
        push_text(&mut out, &rest[..next]);
        rest = &rest[next..];
    }
    out
}

/// `<!--[if IE]>`, `<![endif]-->` and friends.
fn is_conditional(body: &str) -> bool {
    let body = body.trim_start();
    body.starts_with("[if") || body.starts_with("[endif") || body.starts_with("<![endif")
}

fn starts_tag(s: &str) -> bool {
    s.chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '/' || c == '!' || c == '?')
}

/// Byte offset just past the `>` closing the tag at the start of `s`.
fn tag_end(s: &str) -> usize {
    let mut quote: Option<char> = None;
    for (i, c) in s.char_indices().skip(1) {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '"' || c == '\'' => quote = Some(c),
            None if c == '>' => return i + 1,
            None => {}
        }
    }
    s.len()
}

/// Collapse whitespace between attributes; quoted values are kept as-is.
fn collapse_tag(tag: &str) -> String {
    let mut out = String::with_capacity(tag.len());
    let mut quote: Option<char> = None;
    let mut pending_space = false;
    for c in tag.chars() {
        if let Some(q) = quote {
            out.push(c);
            if c == q {
                quote = None;
            }
            continue;
        }
        if c.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space && c != '>' {
            out.push(' ');
        }
        pending_space = false;
        if c == '"' || c == '\'' {
            quote = Some(c);
        }
        out.push(c);
    }
    out
}

fn raw_text_element(tag: &str) -> Option<&'static str> {
    if tag.starts_with("</") || tag.starts_with("<!") || tag.ends_with("/>") {
        return None;
    }
    let name: String = tag[1..]
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase();
    RAW_TEXT.iter().copied().find(|raw| *raw == name)
}

/// Offset of the closing `</name`, or the end of input.
fn find_close(s: &str, name: &str) -> usize {
    let needle = format!("</{}", name);
    s.to_ascii_lowercase().find(&needle).unwrap_or(s.len())
}

fn push_text(out: &mut String, text: &str) {
    if text.chars().all(char::is_whitespace) {
        return;
    }
    let mut in_space = false;
    for c in text.chars() {
        if c.is_whitespace() {
            if !in_space {
                out.push(' ');
            }
            in_space = true;
        } else {
            out.push(c);
            in_space = false;
        }
    }
}
