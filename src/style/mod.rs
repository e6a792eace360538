pub mod bundle;
pub mod external;
pub mod minify;
pub mod prefix;
pub mod sourcemap;
pub mod svg;
pub mod version;

use crate::config::StyleConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use sourcemap::SourceMap;
use std::path::{Path, PathBuf};

/// A source file that contributed lines to a compiled sheet.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: PathBuf,
    pub content: String,
}

/// One line of CSS and where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct MappedLine {
    pub text: String,
    /// Index into `CompiledSheet::sources`.
    pub source: usize,
    /// Zero-based line in that source.
    pub line: u32,
}

#[derive(Debug, Clone, Default)]
pub struct CompiledSheet {
    pub sources: Vec<SourceFile>,
    pub lines: Vec<MappedLine>,
}

impl CompiledSheet {
    pub fn css(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            out.push_str(&line.text);
            out.push('\n');
        }
        out
    }
}

/// Turns a stylesheet entry file into CSS lines with origins.
#[async_trait]
pub trait StyleCompiler: Send + Sync {
    async fn compile(&self, entry: &Path) -> Result<CompiledSheet>;

    fn name(&self) -> &'static str;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildMode {
    Development,
    /// Minified, with the version tag in the output filename.
    Minified { version: String },
}

#[derive(Debug, Clone)]
pub struct StyleArtifact {
    pub css_path: PathBuf,
    pub map_path: PathBuf,
    pub bytes: usize,
}

impl StyleArtifact {
    pub fn file_name(&self) -> String {
        self.css_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

pub struct StylePipeline {
    config: StyleConfig,
    compiler: Box<dyn StyleCompiler>,
}

impl StylePipeline {
    pub fn from_config(config: &StyleConfig) -> Self {
        let plain_css = config.entry.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("css"));
        let compiler: Box<dyn StyleCompiler> = if plain_css || config.compiler.is_empty() {
            Box::new(bundle::CssBundler::new())
        } else {
            Box::new(external::ExternalCompiler::new(config.compiler.clone()))
        };
        Self::with_compiler(config.clone(), compiler)
    }

    pub fn with_compiler(config: StyleConfig, compiler: Box<dyn StyleCompiler>) -> Self {
        Self { config, compiler }
    }

    pub fn config(&self) -> &StyleConfig {
        &self.config
    }

    pub fn compiler_name(&self) -> &'static str {
        self.compiler.name()
    }

    pub fn output_name(&self, mode: &BuildMode) -> String {
        match mode {
            BuildMode::Development => format!("{}.css", self.config.stem),
            BuildMode::Minified { version } => format!("{}.{}.css", self.config.stem, version),
        }
    }

    /// Compile, post-process and write `<name>.css` + `<name>.css.map`.
    /// Nothing in `out_dir` is touched unless every step succeeds.
    pub async fn build(&self, mode: &BuildMode) -> Result<StyleArtifact> {
        let entry = &self.config.entry;
        let mut sheet = self
            .compiler
            .compile(entry)
            .await
            .with_context(|| format!("failed to compile {}", entry.display()))?;

        prefix::autoprefix(&mut sheet.lines);
        svg::inline_svg(&mut sheet, self.config.svg_encoding)?;

        let file_name = self.output_name(mode);
        let map_name = format!("{}.map", file_name);

        let source_root = entry.parent().unwrap_or_else(|| Path::new(""));
        let mut map = SourceMap::new(&file_name);
        for src in &sheet.sources {
            let rel = src.path.strip_prefix(source_root).unwrap_or(&src.path);
            map.add_source(rel.to_string_lossy().replace('\\', "/"), &src.content);
        }

        let mut css = match mode {
            BuildMode::Development => {
                for (i, line) in sheet.lines.iter().enumerate() {
                    if !line.text.trim().is_empty() {
                        map.add_mapping(i as u32, 0, line.source as u32, line.line, 0);
                    }
                }
                sheet.css()
            }
            BuildMode::Minified { .. } => {
                let minified = minify::minify(&sheet.lines);
                for m in &minified.mappings {
                    map.add_mapping(0, m.column, m.source as u32, m.line, m.source_column);
                }
                let mut css = minified.css;
                css.push('\n');
                css
            }
        };
        css.push_str(&format!("/*# sourceMappingURL={} */\n", map_name));

        let map_json = map.to_json()?;
        let css_path = self.config.out_dir.join(&file_name);
        let map_path = self.config.out_dir.join(&map_name);
        write_pair(&css_path, css.as_bytes(), &map_path, map_json.as_bytes()).await?;

        Ok(StyleArtifact {
            css_path,
            map_path,
            bytes: css.len(),
        })
    }
}

/// Write both files to temporaries first, then rename into place.
async fn write_pair(css_path: &Path, css: &[u8], map_path: &Path, map: &[u8]) -> Result<()> {
    if let Some(dir) = css_path.parent() {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }
    let css_tmp = tmp_path(css_path);
    let map_tmp = tmp_path(map_path);

    let written = async {
        tokio::fs::write(&css_tmp, css)
            .await
            .with_context(|| format!("failed to write {}", css_tmp.display()))?;
        tokio::fs::write(&map_tmp, map)
            .await
            .with_context(|| format!("failed to write {}", map_tmp.display()))?;
        anyhow::Ok(())
    }
    .await;
    if let Err(e) = written {
        let _ = tokio::fs::remove_file(&css_tmp).await;
        let _ = tokio::fs::remove_file(&map_tmp).await;
        return Err(e);
    }

    tokio::fs::rename(&map_tmp, map_path)
        .await
        .with_context(|| format!("failed to replace {}", map_path.display()))?;
    tokio::fs::rename(&css_tmp, css_path)
        .await
        .with_context(|| format!("failed to replace {}", css_path.display()))?;
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
