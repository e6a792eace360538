//! Conservative CSS minifier. Output is a single line; the column where
//! each input line's first surviving character lands is recorded so a
//! source map can still point back at the original files.

use super::MappedLine;

/// Characters after which whitespace is never needed.
const NO_SPACE_AFTER: &[char] = &['{', '}', ';', ',', ':', '(', '>', '/'];
/// Characters before which whitespace is never needed.
const NO_SPACE_BEFORE: &[char] = &['{', '}', ';', ',', ')', '>', '!'];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mapping {
    /// Column in the minified output.
    pub column: u32,
    pub source: usize,
    pub line: u32,
    pub source_column: u32,
}

#[derive(Debug, Clone, Default)]
pub struct Minified {
    pub css: String,
    pub mappings: Vec<Mapping>,
}

pub fn minify(lines: &[MappedLine]) -> Minified {
    let mut m = Minifier::default();
    for line in lines {
        m.feed_line(line);
    }
    Minified { css: m.out, mappings: m.mappings }
}

/// Minify plain CSS text (used for inline `<style>` blocks).
pub fn minify_str(css: &str) -> String {
    let lines: Vec<MappedLine> = css
        .lines()
        .enumerate()
        .map(|(i, text)| MappedLine { text: text.to_string(), source: 0, line: i as u32 })
        .collect();
    minify(&lines).css
}

#[derive(Default)]
struct Minifier {
    out: String,
    out_chars: u32,
    mappings: Vec<Mapping>,
    in_comment: bool,
    keep_comment: bool,
    quote: Option<char>,
    escaped: bool,
    pending_space: bool,
    /// Output offset where each open block's prelude begins.
    rule_starts: Vec<usize>,
    last_boundary: usize,
    cur_source: usize,
    cur_line: u32,
    line_mapped: bool,
}

impl Minifier {
    fn feed_line(&mut self, line: &MappedLine) {
        self.cur_source = line.source;
        self.cur_line = line.line;
        self.line_mapped = false;

        let chars: Vec<char> = line.text.chars().collect();
        let mut k = 0;
        while k < chars.len() {
            let c = chars[k];
            let next = chars.get(k + 1).copied();
            let col = k as u32;

            if self.in_comment {
                if c == '*' && next == Some('/') {
                    self.in_comment = false;
                    if self.keep_comment {
                        self.push('*', Some(col));
                        self.push('/', Some(col + 1));
                        self.last_boundary = self.out.len();
                    } else {
                        self.pending_space = true;
                    }
                    k += 2;
                    continue;
                }
                if self.keep_comment {
                    self.push(c, Some(col));
                }
                k += 1;
                continue;
            }

            if let Some(q) = self.quote {
                self.push(c, Some(col));
                if self.escaped {
                    self.escaped = false;
                } else if c == '\\' {
                    self.escaped = true;
                } else if c == q {
                    self.quote = None;
                }
                k += 1;
                continue;
            }

            if c == '/' && next == Some('*') {
                self.in_comment = true;
                self.keep_comment = chars.get(k + 2) == Some(&'!');
                if self.keep_comment {
                    self.emit_pending_space('/');
                    self.push('/', Some(col));
                    self.push('*', Some(col + 1));
                }
                k += 2;
                continue;
            }

            if c.is_whitespace() {
                self.pending_space = true;
                k += 1;
                continue;
            }

            self.emit_pending_space(c);
            match c {
                '{' => {
                    self.rule_starts.push(self.last_boundary);
                    self.push(c, Some(col));
                    self.last_boundary = self.out.len();
                }
                '}' => {
                    if self.out.ends_with(';') {
                        self.pop();
                    }
                    let start = self.rule_starts.pop().unwrap_or(self.last_boundary);
                    if self.out.ends_with('{') {
                        self.truncate(start);
                    } else {
                        self.push(c, Some(col));
                    }
                    self.last_boundary = self.out.len();
                }
                ';' => {
                    if !(self.out.ends_with(';') || self.out.ends_with('{') || self.out.is_empty()) {
                        self.push(c, Some(col));
                    }
                    self.last_boundary = self.out.len();
                }
                '"' | '\'' => {
                    self.quote = Some(c);
                    self.push(c, Some(col));
                }
                _ => self.push(c, Some(col)),
            }
            k += 1;
        }

        if self.keep_comment && self.in_comment {
            self.push('\n', None);
        } else {
            self.pending_space = true;
        }
    }

    fn emit_pending_space(&mut self, next: char) {
        if !self.pending_space {
            return;
        }
        self.pending_space = false;
        let Some(prev) = self.out.chars().next_back() else { return };
        if !NO_SPACE_AFTER.contains(&prev) && !NO_SPACE_BEFORE.contains(&next) {
            self.push(' ', None);
        }
    }

    fn push(&mut self, c: char, source_column: Option<u32>) {
        if let Some(source_column) = source_column {
            if !self.line_mapped {
                self.mappings.push(Mapping {
                    column: self.out_chars,
                    source: self.cur_source,
                    line: self.cur_line,
                    source_column,
                });
                self.line_mapped = true;
            }
        }
        self.out.push(c);
        self.out_chars += 1;
    }

    fn pop(&mut self) {
        if self.out.pop().is_some() {
            self.out_chars -= 1;
        }
    }

    /// Drop an empty rule and any mappings that pointed into it.
    fn truncate(&mut self, len: usize) {
        self.out.truncate(len);
        self.out_chars = self.out.chars().count() as u32;
        let limit = self.out_chars;
        self.mappings.retain(|m| m.column < limit);
        self.line_mapped = self
            .mappings
            .last()
            .is_some_and(|m| m.source == self.cur_source && m.line == self.cur_line);
    }
}
