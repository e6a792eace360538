//! Source map v3 writer.

use anyhow::{Context, Result};
use serde::Serialize;

const BASE64_CHARS: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";
const SOURCE_ROOT: &str = "/source/";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Segment {
    gen_line: u32,
    gen_col: u32,
    source: u32,
    src_line: u32,
    src_col: u32,
}

#[derive(Debug, Clone)]
pub struct SourceMap {
    file: String,
    sources: Vec<String>,
    sources_content: Vec<String>,
    segments: Vec<Segment>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Json<'a> {
    version: u8,
    file: &'a str,
    source_root: &'a str,
    sources: &'a [String],
    sources_content: &'a [String],
    names: [&'a str; 0],
    mappings: String,
}

impl SourceMap {
    pub fn new(file: &str) -> Self {
        Self {
            file: file.to_string(),
            sources: Vec::new(),
            sources_content: Vec::new(),
            segments: Vec::new(),
        }
    }

    pub fn add_source(&mut self, name: impl Into<String>, content: &str) -> u32 {
        self.sources.push(name.into());
        self.sources_content.push(content.to_string());
        (self.sources.len() - 1) as u32
    }

    pub fn add_mapping(&mut self, gen_line: u32, gen_col: u32, source: u32, src_line: u32, src_col: u32) {
        self.segments.push(Segment { gen_line, gen_col, source, src_line, src_col });
    }

    /// The `mappings` field: `;` between generated lines, `,` between
    /// segments, each segment relative to the previous one.
    pub fn mappings(&self) -> String {
        let mut segments = self.segments.clone();
        segments.sort_by_key(|s| (s.gen_line, s.gen_col));

        let mut out = String::new();
        let mut line = 0u32;
        let mut prev_col = 0i64;
        let mut prev_source = 0i64;
        let mut prev_src_line = 0i64;
        let mut prev_src_col = 0i64;
        let mut first_in_line = true;

        for seg in &segments {
            while line < seg.gen_line {
                out.push(';');
                line += 1;
                prev_col = 0;
                first_in_line = true;
            }
            if !first_in_line {
                out.push(',');
            }
            first_in_line = false;

            encode_vlq(&mut out, seg.gen_col as i64 - prev_col);
            encode_vlq(&mut out, seg.source as i64 - prev_source);
            encode_vlq(&mut out, seg.src_line as i64 - prev_src_line);
            encode_vlq(&mut out, seg.src_col as i64 - prev_src_col);

            prev_col = seg.gen_col as i64;
            prev_source = seg.source as i64;
            prev_src_line = seg.src_line as i64;
            prev_src_col = seg.src_col as i64;
        }
        out
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(&Json {
            version: 3,
            file: &self.file,
            source_root: SOURCE_ROOT,
            sources: &self.sources,
            sources_content: &self.sources_content,
            names: [],
            mappings: self.mappings(),
        })
        .context("failed to serialize source map")
    }
}

fn encode_vlq(out: &mut String, value: i64) {
    let signed = if value < 0 { ((-value) << 1) | 1 } else { value << 1 };
    let mut v = signed as u64;
    loop {
        let mut digit = (v & 0b11111) as u8;
        v >>= 5;
        if v > 0 {
            digit |= 0b100000;
        }
        out.push(BASE64_CHARS[digit as usize] as char);
        if v == 0 {
            break;
        }
    }
}

#[cfg(test)]
fn decode_vlq(s: &str) -> Vec<i64> {
    let mut values = Vec::new();
    let mut shift = 0;
    let mut acc: u64 = 0;
    for b in s.bytes() {
        let digit = BASE64_CHARS.iter().position(|c| *c == b).unwrap() as u64;
        acc |= (digit & 0b11111) << shift;
        if digit & 0b100000 != 0 {
            shift += 5;
        } else {
            let v = (acc >> 1) as i64;
            values.push(if acc & 1 == 1 { -v } else { v });
            acc = 0;
            shift = 0;
        }
    }
    values
}
