//! Inline SVG expansion.
//!
//! `svg-load("icon.svg", fill=#000)` becomes a `data:` URL with the
//! parameters applied as attributes on the root `<svg>`. Named loads
//! (`@svg-load name url(icon.svg) { fill: #000; }` + `svg-inline(name)`)
//! are supported for root-level declarations.

use super::{CompiledSheet, MappedLine};
use crate::config::SvgEncoding;
use anyhow::{Context, Result};
use base64::Engine;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

const LOAD_FN: &str = "svg-load(";
const INLINE_FN: &str = "svg-inline(";

#[derive(Debug, Clone)]
struct NamedSvg {
    path: PathBuf,
    attrs: Vec<(String, String)>,
}

pub fn inline_svg(sheet: &mut CompiledSheet, encoding: SvgEncoding) -> Result<()> {
    let dirs: Vec<PathBuf> = sheet
        .sources
        .iter()
        .map(|s| s.path.parent().map(Path::to_path_buf).unwrap_or_default())
        .collect();

    let named = collect_named(&mut sheet.lines, &dirs)?;

    for line in sheet.lines.iter_mut() {
        if !line.text.contains(LOAD_FN) && !line.text.contains(INLINE_FN) {
            continue;
        }
        let dir = dirs.get(line.source).cloned().unwrap_or_default();
        line.text = expand_line(&line.text, &dir, &named, encoding)
            .with_context(|| format!("inline-svg failed on line {}", line.line + 1))?;
    }
    Ok(())
}

/// Pull `@svg-load` definitions out of the sheet. Their lines are blanked
/// rather than removed so the remaining origins don't shift.
fn collect_named(lines: &mut [MappedLine], dirs: &[PathBuf]) -> Result<HashMap<String, NamedSvg>> {
    let mut named = HashMap::new();
    let mut i = 0;
    while i < lines.len() {
        let trimmed = lines[i].text.trim_start();
        let Some(rest) = trimmed.strip_prefix("@svg-load") else {
            i += 1;
            continue;
        };
        let rest = rest.trim_start();
        let name_len = rest
            .find(|c: char| c.is_whitespace())
            .context("@svg-load needs a name and a url()")?;
        let name = rest[..name_len].to_string();
        let after_name = rest[name_len..].trim_start();
        let inner = after_name
            .strip_prefix("url(")
            .and_then(|s| s.find(')').map(|end| &s[..end]))
            .with_context(|| format!("@svg-load {} needs url(...)", name))?;
        let file = inner.trim().trim_matches(|c| c == '"' || c == '\'');
        let path = dirs.get(lines[i].source).cloned().unwrap_or_default().join(file);

        // Gather the block (possibly spanning lines) that follows.
        let mut block = String::new();
        let mut depth = 0i32;
        let mut opened = false;
        let mut j = i;
        loop {
            let text = std::mem::take(&mut lines[j].text);
            let start = if j == i { text.find('{') } else { Some(0) };
            if let Some(start) = start {
                for c in text[start..].chars() {
                    match c {
                        '{' => {
                            depth += 1;
                            opened = true;
                            if depth == 2 {
                                // drop the nested selector
                                let keep = block.rfind(';').map(|p| p + 1).unwrap_or(0);
                                block.truncate(keep);
                            }
                        }
                        '}' => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                            if depth == 1 {
                                block.push(';');
                            }
                        }
                        _ if depth == 1 => block.push(c),
                        _ => {}
                    }
                }
                block.push(' ');
            }
            if !opened && j == i {
                // Single-line form without a block.
                break;
            }
            if depth <= 0 || j + 1 >= lines.len() {
                break;
            }
            j += 1;
        }

        let attrs = block
            .split(';')
            .filter_map(|decl| {
                let (k, v) = decl.split_once(':')?;
                let k = k.trim();
                // nested selectors aren't applied
                if k.is_empty() || k.contains(char::is_whitespace) {
                    return None;
                }
                Some((k.to_string(), v.trim().to_string()))
            })
            .collect();

        named.insert(name, NamedSvg { path, attrs });
        i = j + 1;
    }
    Ok(named)
}

fn expand_line(
    text: &str,
    dir: &Path,
    named: &HashMap<String, NamedSvg>,
    encoding: SvgEncoding,
) -> Result<String> {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    loop {
        let load = rest.find(LOAD_FN);
        let inline = rest.find(INLINE_FN);
        let (pos, is_load) = match (load, inline) {
            (Some(l), Some(n)) if n < l => (n, false),
            (Some(l), _) => (l, true),
            (None, Some(n)) => (n, false),
            (None, None) => break,
        };
        let fn_len = if is_load { LOAD_FN.len() } else { INLINE_FN.len() };
        out.push_str(&rest[..pos]);

        let args_start = pos + fn_len;
        let close = find_close(&rest[args_start..])
            .with_context(|| format!("unterminated {}", &rest[pos..args_start]))?;
        let args = split_args(&rest[args_start..args_start + close]);

        let (path, attrs) = if is_load {
            let (first, params) = args.split_first().context("svg-load() needs a path")?;
            let file = first.trim_matches(|c| c == '"' || c == '\'');
            let attrs = params
                .iter()
                .filter_map(|p| p.split_once('='))
                .map(|(k, v)| (k.trim().to_string(), v.trim().trim_matches(|c| c == '"' || c == '\'').to_string()))
                .collect::<Vec<_>>();
            (dir.join(file), attrs)
        } else {
            let name = args.first().map(|s| s.trim()).unwrap_or_default();
            let def = named
                .get(name)
                .with_context(|| format!("svg-inline({}) has no matching @svg-load", name))?;
            (def.path.clone(), def.attrs.clone())
        };

        let svg = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read svg {}", path.display()))?;
        let svg = apply_attrs(&svg, &attrs);
        out.push_str(&format!("url(\"{}\")", data_url(&svg, encoding)));

        rest = &rest[args_start + close + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Index of the `)` closing an argument list, honoring quotes and nesting.
fn find_close(s: &str) -> Option<usize> {
    let mut depth = 0u32;
    let mut quote: Option<char> = None;
    for (i, c) in s.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '"' | '\'' => quote = Some(c),
                '(' => depth += 1,
                ')' if depth == 0 => return Some(i),
                ')' => depth -= 1,
                _ => {}
            },
        }
    }
    None
}

fn split_args(s: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut depth = 0u32;
    for c in s.chars() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                }
                current.push(c);
            }
            None => match c {
                '"' | '\'' => {
                    quote = Some(c);
                    current.push(c);
                }
                '(' => {
                    depth += 1;
                    current.push(c);
                }
                ')' => {
                    depth = depth.saturating_sub(1);
                    current.push(c);
                }
                ',' if depth == 0 => args.push(std::mem::take(&mut current).trim().to_string()),
                _ => current.push(c),
            },
        }
    }
    if !current.trim().is_empty() {
        args.push(current.trim().to_string());
    }
    args
}

/// Set attributes on the root `<svg>` element, replacing existing values.
fn apply_attrs(svg: &str, attrs: &[(String, String)]) -> String {
    if attrs.is_empty() {
        return svg.to_string();
    }
    let Some(open) = svg.find("<svg") else {
        return svg.to_string();
    };
    let Some(close_rel) = svg[open..].find('>') else {
        return svg.to_string();
    };
    let mut end = open + close_rel;
    let self_closing = svg[..end].ends_with('/');
    if self_closing {
        end -= 1;
    }

    let mut tag = svg[open..end].to_string();
    for (name, value) in attrs {
        tag = remove_attr(&tag, name);
        tag.push_str(&format!(" {}=\"{}\"", name, value.replace('"', "'")));
    }
    format!("{}{}{}", &svg[..open], tag, &svg[end..])
}

fn remove_attr(tag: &str, name: &str) -> String {
    let needle = format!(" {}=", name);
    let Some(pos) = tag.find(&needle) else {
        return tag.to_string();
    };
    let value_start = pos + needle.len();
    let rest = &tag[value_start..];
    let value_len = match rest.chars().next() {
        Some(q @ ('"' | '\'')) => rest[1..].find(q).map(|e| e + 2).unwrap_or(rest.len()),
        _ => rest.find(char::is_whitespace).unwrap_or(rest.len()),
    };
    format!("{}{}", &tag[..pos], &tag[value_start + value_len..])
}

fn data_url(svg: &str, encoding: SvgEncoding) -> String {
    let svg = strip_xml_declaration(svg.trim());
    match encoding {
        SvgEncoding::Base64 => format!(
            "data:image/svg+xml;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(svg.as_bytes())
        ),
        SvgEncoding::Uri => {
            let collapsed = svg.split_whitespace().collect::<Vec<_>>().join(" ");
            format!("data:image/svg+xml;charset=utf-8,{}", uri_encode(&collapsed.replace('"', "'")))
        }
    }
}

fn strip_xml_declaration(svg: &str) -> &str {
    if svg.starts_with("<?xml") {
        if let Some(end) = svg.find("?>") {
            return svg[end + 2..].trim_start();
        }
    }
    svg
}

/// Escapes only the characters unsafe in a quoted CSS data URL; spaces and
/// quotes stay literal, so general percent-encoding does not fit here.
fn uri_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '%' => out.push_str("%25"),
            '<' => out.push_str("%3C"),
            '>' => out.push_str("%3E"),
            '&' => out.push_str("%26"),
            '#' => out.push_str("%23"),
            '{' => out.push_str("%7B"),
            '}' => out.push_str("%7D"),
            _ => out.push(c),
        }
    }
    out
}
