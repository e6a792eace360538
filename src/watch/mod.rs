//! Filesystem watching: one notify watcher, glob rules mapping changed
//! paths to actions.

pub mod debounce;

pub use debounce::Debouncer;

use crate::config::WatchConfig;
use anyhow::{Context, Result};
use glob::{MatchOptions, Pattern};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher as _};
use std::path::{Component, Path, PathBuf};
use tokio::sync::mpsc;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchAction {
    /// Tell connected browsers the file changed.
    Reload,
    BuildStyles,
    Lint,
}

#[derive(Debug, Clone)]
pub struct WatchRule {
    pub globs: Vec<String>,
    pub action: WatchAction,
    patterns: Vec<Pattern>,
}

impl WatchRule {
    pub fn new(globs: &[String], action: WatchAction) -> Result<Self> {
        let patterns = globs
            .iter()
            .map(|g| Pattern::new(g).with_context(|| format!("invalid watch glob {:?}", g)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            globs: globs.to_vec(),
            action,
            patterns,
        })
    }

    /// `path` is relative to the watch root.
    pub fn matches(&self, path: &Path) -> bool {
        self.patterns
            .iter()
            .any(|p| p.matches_path_with(path, MATCH_OPTIONS))
    }
}

pub fn default_rules(config: &WatchConfig) -> Result<Vec<WatchRule>> {
    Ok(vec![
        WatchRule::new(&config.reload, WatchAction::Reload)?,
        WatchRule::new(&config.styles, WatchAction::BuildStyles)?,
        WatchRule::new(&config.lint, WatchAction::Lint)?,
    ])
}

/// A changed file and what to do about it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub action: WatchAction,
    /// Relative to the watch root.
    pub path: PathBuf,
}

/// Leading directory components of a glob that contain no wildcards.
pub fn literal_prefix(glob: &str) -> PathBuf {
    let mut prefix = PathBuf::new();
    let components: Vec<Component> = Path::new(glob).components().collect();
    // the last component names files, never a directory to watch
    let dirs = components.len().saturating_sub(1);
    for component in &components[..dirs] {
        let part = component.as_os_str().to_string_lossy();
        if part.contains(['*', '?', '[', '{']) {
            break;
        }
        prefix.push(component);
    }
    prefix
}

/// Directories to watch recursively, with nested duplicates removed.
pub fn watch_roots(rules: &[WatchRule]) -> Vec<PathBuf> {
    let mut roots: Vec<PathBuf> = rules
        .iter()
        .flat_map(|r| r.globs.iter().map(|g| literal_prefix(g)))
        .collect();
    roots.sort();
    roots.dedup();
    let mut out: Vec<PathBuf> = Vec::new();
    for root in roots {
        if !out.iter().any(|kept| root.starts_with(kept)) {
            out.push(root);
        }
    }
    out
}

/// Match raw event paths against the rules. Each path yields at most one
/// change per action.
pub fn classify(rules: &[WatchRule], root: &Path, paths: &[PathBuf]) -> Vec<Change> {
    let mut changes: Vec<Change> = Vec::new();
    for path in paths {
        let rel = path.strip_prefix(root).unwrap_or(path);
        for rule in rules {
            if rule.matches(rel) {
                let change = Change {
                    action: rule.action,
                    path: rel.to_path_buf(),
                };
                if !changes.contains(&change) {
                    changes.push(change);
                }
            }
        }
    }
    changes
}

fn relevant(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

/// Owns the notify watcher; dropping it stops watching.
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
    rx: mpsc::UnboundedReceiver<Change>,
    roots: Vec<PathBuf>,
}

impl FileWatcher {
    pub fn spawn(rules: Vec<WatchRule>, root: &Path) -> Result<Self> {
        let root = root
            .canonicalize()
            .with_context(|| format!("cannot watch {}", root.display()))?;
        let (tx, rx) = mpsc::unbounded_channel();

        let event_root = root.clone();
        let event_rules = rules.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            match res {
                Ok(event) if relevant(&event.kind) => {
                    for change in classify(&event_rules, &event_root, &event.paths) {
                        let _ = tx.send(change);
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "watch error"),
            }
        })
        .context("failed to create file watcher")?;

        let mut roots = Vec::new();
        for dir in watch_roots(&rules) {
            let abs = root.join(&dir);
            // Build outputs such as `dist/` may not exist until the first build.
            if !abs.is_dir() {
                std::fs::create_dir_all(&abs)
                    .with_context(|| format!("failed to create {}", abs.display()))?;
                tracing::info!(dir = %abs.display(), "created missing watch directory");
            }
            watcher
                .watch(&abs, RecursiveMode::Recursive)
                .with_context(|| format!("failed to watch {}", abs.display()))?;
            tracing::debug!(dir = %abs.display(), "watching");
            roots.push(abs);
        }

        Ok(Self {
            _watcher: watcher,
            rx,
            roots,
        })
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    pub async fn next(&mut self) -> Option<Change> {
        self.rx.recv().await
    }
}
