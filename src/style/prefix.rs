//! Vendor prefixing for the handful of properties current browsers still
//! need it for. Prefixed copies are inserted on the same line, ahead of
//! the standard declaration, so line origins stay intact.

use super::MappedLine;

const PROPERTY_PREFIXES: &[(&str, &[&str])] = &[
    ("user-select", &["-webkit-"]),
    ("appearance", &["-webkit-", "-moz-"]),
    ("backface-visibility", &["-webkit-"]),
    ("text-size-adjust", &["-webkit-", "-moz-"]),
    ("hyphens", &["-webkit-"]),
    ("tab-size", &["-moz-"]),
    ("mask", &["-webkit-"]),
    ("mask-image", &["-webkit-"]),
    ("mask-size", &["-webkit-"]),
    ("mask-position", &["-webkit-"]),
    ("mask-repeat", &["-webkit-"]),
    ("mask-clip", &["-webkit-"]),
    ("mask-origin", &["-webkit-"]),
    ("box-decoration-break", &["-webkit-"]),
    ("clip-path", &["-webkit-"]),
    ("backdrop-filter", &["-webkit-"]),
    ("text-emphasis", &["-webkit-"]),
    ("text-emphasis-color", &["-webkit-"]),
    ("text-emphasis-style", &["-webkit-"]),
    ("text-emphasis-position", &["-webkit-"]),
    ("print-color-adjust", &["-webkit-"]),
];

/// (property, value, prefixed value)
const VALUE_PREFIXES: &[(&str, &str, &str)] = &[("position", "sticky", "-webkit-sticky")];

pub fn autoprefix(lines: &mut [MappedLine]) {
    for line in lines.iter_mut() {
        if let Some(text) = prefix_line(&line.text) {
            line.text = text;
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Segment {
    start: usize,
    end: usize,
    terminator: Option<char>,
}

struct Declaration<'a> {
    property: &'a str,
    /// Everything after the property name: `: value !important`.
    tail: &'a str,
}

impl Declaration<'_> {
    fn value(&self) -> &str {
        let v = self.tail.trim_start().trim_start_matches(':').trim();
        v.strip_suffix("!important").unwrap_or(v).trim()
    }
}

/// Returns the rewritten line, or `None` when nothing needed a prefix.
pub fn prefix_line(text: &str) -> Option<String> {
    let mut out = String::with_capacity(text.len() + 32);
    let mut last = 0;
    let mut changed = false;

    for seg in split_segments(text) {
        if seg.terminator == Some('{') {
            continue;
        }
        let body = &text[seg.start..seg.end];
        let Some(decl) = parse_declaration(body) else { continue };
        let copies = prefixed_copies(&decl, text);
        if copies.is_empty() {
            continue;
        }
        let insert_at = seg.start + (body.len() - body.trim_start().len());
        out.push_str(&text[last..insert_at]);
        for copy in copies {
            out.push_str(&copy);
            out.push_str("; ");
        }
        last = insert_at;
        changed = true;
    }

    if !changed {
        return None;
    }
    out.push_str(&text[last..]);
    Some(out)
}

fn prefixed_copies(decl: &Declaration<'_>, line: &str) -> Vec<String> {
    let mut copies = Vec::new();
    let tail = decl.tail.trim_end();

    if let Some((_, prefixes)) = PROPERTY_PREFIXES.iter().find(|(p, _)| *p == decl.property) {
        for prefix in *prefixes {
            let name = format!("{}{}", prefix, decl.property);
            if !has_property(line, &name) {
                copies.push(format!("{}{}", name, tail));
            }
        }
    }

    for (property, value, prefixed) in VALUE_PREFIXES {
        if decl.property == *property && decl.value() == *value && !line.contains(prefixed) {
            copies.push(format!("{}{}", decl.property, tail.replacen(value, prefixed, 1)));
        }
    }
    copies
}

/// Split on `;`, `{` and `}` outside strings, parens and comments.
fn split_segments(text: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut start = 0;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut depth = 0u32;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            '/' if chars.peek().is_some_and(|(_, n)| *n == '*') => {
                chars.next();
                let mut prev = ' ';
                for (_, n) in chars.by_ref() {
                    if prev == '*' && n == '/' {
                        break;
                    }
                    prev = n;
                }
            }
            ';' | '{' | '}' if depth == 0 => {
                segments.push(Segment { start, end: i, terminator: Some(c) });
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    if start < text.len() {
        segments.push(Segment { start, end: text.len(), terminator: None });
    }
    segments
}

fn parse_declaration(body: &str) -> Option<Declaration<'_>> {
    let trimmed = body.trim_start();
    let len = trimmed
        .bytes()
        .take_while(|b| b.is_ascii_alphanumeric() || *b == b'-')
        .count();
    if len == 0 {
        return None;
    }
    let (property, tail) = trimmed.split_at(len);
    if !tail.trim_start().starts_with(':') {
        return None;
    }
    Some(Declaration { property, tail })
}

/// Whether `name` appears in `line` as a property (`name:` with optional
/// whitespace), not as a suffix of a longer identifier.
fn has_property(line: &str, name: &str) -> bool {
    let mut from = 0;
    while let Some(pos) = line[from..].find(name) {
        let at = from + pos;
        let before_ok = line[..at]
            .chars()
            .next_back()
            .is_none_or(|c| !(c.is_ascii_alphanumeric() || c == '-'));
        let after = line[at + name.len()..].trim_start();
        if before_ok && after.starts_with(':') {
            return true;
        }
        from = at + name.len();
    }
    false
}
