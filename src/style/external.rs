use super::{CompiledSheet, MappedLine, SourceFile, StyleCompiler};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;

/// Runs a preprocessor CLI (e.g. `stylus --include-css --print`) with the
/// entry path appended and takes its stdout as the compiled CSS.
#[derive(Debug, Clone)]
pub struct ExternalCompiler {
    command: Vec<String>,
}

impl ExternalCompiler {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

#[async_trait]
impl StyleCompiler for ExternalCompiler {
    async fn compile(&self, entry: &Path) -> Result<CompiledSheet> {
        let (program, args) = self
            .command
            .split_first()
            .context("style compiler command is empty")?;

        let output = tokio::process::Command::new(program)
            .args(args)
            .arg(entry)
            .stdin(Stdio::null())
            .output()
            .await
            .with_context(|| format!("failed to run style compiler {:?}", program))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("style compiler exited with {}: {}", output.status, stderr.trim());
        }

        let css = String::from_utf8(output.stdout).context("style compiler produced non-UTF-8 output")?;
        let content = tokio::fs::read_to_string(entry).await.unwrap_or_default();

        // Line origins aren't available from the child; attribute to the entry.
        let lines = css
            .lines()
            .enumerate()
            .map(|(i, text)| MappedLine {
                text: text.to_string(),
                source: 0,
                line: i as u32,
            })
            .collect();

        Ok(CompiledSheet {
            sources: vec![SourceFile {
                path: entry.to_path_buf(),
                content,
            }],
            lines,
        })
    }

    fn name(&self) -> &'static str {
        "external"
    }
}
