//! Built-in stylesheet compiler: inlines local `@import` / `@require`
//! statements and keeps every line's origin for the source map.

use super::{CompiledSheet, MappedLine, SourceFile, StyleCompiler};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

const EXTENSIONS: [&str; 2] = ["css", "styl"];

#[derive(Debug, Default, Clone, Copy)]
pub struct CssBundler;

impl CssBundler {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl StyleCompiler for CssBundler {
    async fn compile(&self, entry: &Path) -> Result<CompiledSheet> {
        let entry = entry.to_path_buf();
        tokio::task::spawn_blocking(move || bundle(&entry))
            .await
            .context("bundler task panicked")?
    }

    fn name(&self) -> &'static str {
        "bundle"
    }
}

/// Resolve the include graph rooted at `entry`.
pub fn bundle(entry: &Path) -> Result<CompiledSheet> {
    let mut state = BundleState::default();
    state.include(entry)?;
    Ok(state.sheet)
}

#[derive(Debug, Clone, PartialEq)]
struct Import {
    target: String,
    /// `@require`: skip if the file was already pulled in.
    once: bool,
    media: String,
}

impl Import {
    fn is_remote(&self) -> bool {
        ["http://", "https://", "//", "data:"]
            .iter()
            .any(|p| self.target.starts_with(p))
    }
}

#[derive(Default)]
struct BundleState {
    sheet: CompiledSheet,
    source_index: HashMap<PathBuf, usize>,
    stack: Vec<PathBuf>,
    seen: HashSet<PathBuf>,
}

impl BundleState {
    fn include(&mut self, path: &Path) -> Result<()> {
        let canonical = path
            .canonicalize()
            .with_context(|| format!("cannot resolve {}", path.display()))?;
        if self.stack.contains(&canonical) {
            let chain: Vec<String> = self
                .stack
                .iter()
                .chain(std::iter::once(&canonical))
                .map(|p| p.display().to_string())
                .collect();
            anyhow::bail!("import cycle: {}", chain.join(" -> "));
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let source = match self.source_index.get(&canonical) {
            Some(&idx) => idx,
            None => {
                let idx = self.sheet.sources.len();
                self.sheet.sources.push(SourceFile {
                    path: path.to_path_buf(),
                    content: content.clone(),
                });
                self.source_index.insert(canonical.clone(), idx);
                idx
            }
        };
        self.seen.insert(canonical.clone());
        self.stack.push(canonical);

        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        for (i, line) in content.lines().enumerate() {
            match parse_import(line) {
                Some(import) if !import.is_remote() && import.media.is_empty() => {
                    for target in resolve(dir, &import.target)? {
                        if import.once {
                            let c = target.canonicalize().with_context(|| {
                                format!("cannot resolve {}", target.display())
                            })?;
                            if self.seen.contains(&c) {
                                continue;
                            }
                        }
                        self.include(&target)?;
                    }
                }
                _ => self.sheet.lines.push(MappedLine {
                    text: line.to_string(),
                    source,
                    line: i as u32,
                }),
            }
        }

        self.stack.pop();
        Ok(())
    }
}

fn parse_import(line: &str) -> Option<Import> {
    let trimmed = line.trim();
    let (rest, once) = if let Some(r) = trimmed.strip_prefix("@import") {
        (r, false)
    } else if let Some(r) = trimmed.strip_prefix("@require") {
        (r, true)
    } else {
        return None;
    };
    if !rest.starts_with(|c: char| c.is_whitespace() || c == '"' || c == '\'') {
        return None;
    }
    let rest = rest.trim_start();

    let (target, after) = if let Some(inner) = rest.strip_prefix("url(") {
        let close = inner.find(')')?;
        (unquote(inner[..close].trim()), &inner[close + 1..])
    } else if let Some(q) = rest.chars().next().filter(|c| *c == '"' || *c == '\'') {
        let body = &rest[1..];
        let close = body.find(q)?;
        (body[..close].to_string(), &body[close + 1..])
    } else {
        let end = rest
            .find(|c: char| c.is_whitespace() || c == ';')
            .unwrap_or(rest.len());
        (rest[..end].to_string(), &rest[end..])
    };
    if target.is_empty() {
        return None;
    }
    let media = after.trim().trim_end_matches(';').trim().to_string();
    Some(Import { target, once, media })
}

fn unquote(s: &str) -> String {
    s.trim_matches(|c| c == '"' || c == '\'').to_string()
}

fn resolve(dir: &Path, target: &str) -> Result<Vec<PathBuf>> {
    if target.contains('*') {
        let pattern = dir.join(target);
        let pattern = pattern.to_string_lossy();
        let mut matches: Vec<PathBuf> = glob::glob(&pattern)
            .with_context(|| format!("invalid import glob {:?}", target))?
            .filter_map(|entry| entry.ok())
            .filter(|p| {
                p.is_file()
                    && p.extension()
                        .and_then(|e| e.to_str())
                        .is_some_and(|e| EXTENSIONS.contains(&e))
            })
            .collect();
        matches.sort();
        return Ok(matches);
    }

    let base = dir.join(target);
    if base.is_file() {
        return Ok(vec![base]);
    }
    for ext in EXTENSIONS {
        let mut name = base.clone().into_os_string();
        name.push(".");
        name.push(ext);
        let candidate = PathBuf::from(name);
        if candidate.is_file() {
            return Ok(vec![candidate]);
        }
    }
    for ext in EXTENSIONS {
        let candidate = base.join(format!("index.{}", ext));
        if candidate.is_file() {
            return Ok(vec![candidate]);
        }
    }
    anyhow::bail!("cannot find import {:?} from {}", target, dir.display())
}

#[cfg(test)]
mod tests {
    use super::*;
    use temp_dir::TempDir;

    fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_parse_import_forms() {
        let imp = parse_import("@import \"a.css\";").unwrap();
        assert_eq!(imp.target, "a.css");
        assert!(!imp.once);
        assert!(imp.media.is_empty());

        let imp = parse_import("  @import url('b.css') screen;").unwrap();
        assert_eq!(imp.target, "b.css");
        assert_eq!(imp.media, "screen");

        let imp = parse_import("@require lib/mixins").unwrap();
        assert_eq!(imp.target, "lib/mixins");
        assert!(imp.once);

        assert!(parse_import("@imports 'x'").is_none());
        assert!(parse_import(".a { color: red }").is_none());
        assert!(parse_import("@import \"//fonts.example/x.css\";").unwrap().is_remote());
    }

    #[test]
    fn test_inlines_with_origins() {
        let dir = TempDir::new().unwrap();
        let entry = write(&dir, "main.css", ".top {}\n@import \"parts/a\";\n.bottom {}\n");
        write(&dir, "parts/a.css", ".a1 {}\n.a2 {}\n");

        let sheet = bundle(&entry).unwrap();
        let texts: Vec<&str> = sheet.lines.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, vec![".top {}", ".a1 {}", ".a2 {}", ".bottom {}"]);
        assert_eq!(sheet.sources.len(), 2);
        assert_eq!((sheet.lines[2].source, sheet.lines[2].line), (1, 1));
        assert_eq!((sheet.lines[3].source, sheet.lines[3].line), (0, 2));
    }

    #[test]
    fn test_require_includes_once_import_repeats() {
        let dir = TempDir::new().unwrap();
        let entry = write(
            &dir,
            "main.styl",
            "@require 'vars'\n@require 'vars'\n@import 'rule'\n@import 'rule'\n",
        );
        write(&dir, "vars.styl", "$x = 1\n");
        write(&dir, "rule.css", ".r {}\n");

        let sheet = bundle(&entry).unwrap();
        let texts: Vec<&str> = sheet.lines.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, vec!["$x = 1", ".r {}", ".r {}"]);
        assert_eq!(sheet.sources.len(), 3);
    }

    #[test]
    fn test_cycle_is_an_error() {
        let dir = TempDir::new().unwrap();
        let entry = write(&dir, "a.css", "@import 'b.css';\n");
        write(&dir, "b.css", "@import 'a.css';\n");

        let err = bundle(&entry).unwrap_err();
        assert!(format!("{:#}", err).contains("import cycle"));
    }

    #[test]
    fn test_remote_and_media_imports_left_in_place() {
        let dir = TempDir::new().unwrap();
        let entry = write(
            &dir,
            "main.css",
            "@import url(https://fonts.example/f.css);\n@import 'print.css' print;\n",
        );
        let sheet = bundle(&entry).unwrap();
        assert_eq!(sheet.lines.len(), 2);
        assert!(sheet.lines[1].text.contains("print.css"));
    }

    #[test]
    fn test_glob_and_index_imports() {
        let dir = TempDir::new().unwrap();
        let entry = write(&dir, "main.styl", "@import 'views/*'\n@import 'lib'\n");
        write(&dir, "views/b.styl", ".b {}\n");
        write(&dir, "views/a.styl", ".a {}\n");
        write(&dir, "views/notes.txt", "ignored\n");
        write(&dir, "lib/index.css", ".lib {}\n");

        let sheet = bundle(&entry).unwrap();
        let texts: Vec<&str> = sheet.lines.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, vec![".a {}", ".b {}", ".lib {}"]);
    }

    #[test]
    fn test_missing_import() {
        let dir = TempDir::new().unwrap();
        let entry = write(&dir, "main.css", "@import 'nope';\n");
        let err = bundle(&entry).unwrap_err();
        assert!(format!("{:#}", err).contains("cannot find import"));
    }
}
