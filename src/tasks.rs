//! Named tasks exposed on the command line.

use crate::config::{BundlerConfig, Config};
use crate::html;
use crate::lint::LintRunner;
use crate::livereload::LiveReload;
use crate::server;
use crate::style::{version, BuildMode, StyleArtifact, StylePipeline};
use crate::supervisor::{RestartPolicy, Supervisor};
use crate::template::PlaceholderTable;
use crate::watch::{self as fswatch, Debouncer, FileWatcher, WatchAction};
use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Task {
    /// Compile the stylesheet once (development mode).
    BuildStyl,
    /// Compile a minified, version-tagged stylesheet.
    MinStyl,
    Lint,
    DevServer,
    LivereloadServer,
    /// Keep the bundler running in watch mode, restarting it on exit.
    BackgroundWebpack,
    /// Watch sources and rebuild, reload or lint on change.
    Watch,
    /// Print the production index page.
    MinifyIndex,
    /// Everything needed for local development, concurrently.
    #[default]
    Default,
}

pub async fn run(task: Task, config: Config) -> Result<()> {
    match task {
        Task::BuildStyl => {
            let pipeline = StylePipeline::from_config(&config.style);
            build_styl(&pipeline, &LiveReload::new()).await?;
            Ok(())
        }
        Task::MinStyl => {
            let pipeline = StylePipeline::from_config(&config.style);
            min_styl(&pipeline, &LiveReload::new()).await?;
            Ok(())
        }
        Task::Lint => {
            LintRunner::new(config.lint.command.clone()).run().await;
            Ok(())
        }
        Task::DevServer => server::serve(config).await,
        Task::LivereloadServer => LiveReload::new().serve(config.livereload.port).await,
        Task::BackgroundWebpack => background_webpack(&config.bundler, shutdown_signal()).await,
        Task::Watch => {
            let pipeline = Arc::new(StylePipeline::from_config(&config.style));
            watch_sources(&config, pipeline, LiveReload::new()).await
        }
        Task::MinifyIndex => {
            println!("{}", minify_index(&config).await?);
            Ok(())
        }
        Task::Default => run_default(config).await,
    }
}

/// Development build; browsers are told to reload only on success.
pub async fn build_styl(pipeline: &StylePipeline, live_reload: &LiveReload) -> Result<StyleArtifact> {
    let artifact = pipeline.build(&BuildMode::Development).await?;
    tracing::info!(file = %artifact.css_path.display(), bytes = artifact.bytes, "stylesheet built");
    live_reload.reload(&artifact.file_name());
    Ok(artifact)
}

pub async fn min_styl(pipeline: &StylePipeline, live_reload: &LiveReload) -> Result<StyleArtifact> {
    let style = pipeline.config();
    let version = version::describe(&style.version_command, &style.version_fallback).await;
    println!("{}", version);
    let mode = BuildMode::Minified { version };
    println!("Building {}", pipeline.output_name(&mode));

    let artifact = pipeline.build(&mode).await?;
    tracing::info!(file = %artifact.css_path.display(), bytes = artifact.bytes, "minified stylesheet built");
    live_reload.reload(&artifact.file_name());
    Ok(artifact)
}

pub async fn background_webpack(bundler: &BundlerConfig, shutdown: watch::Receiver<bool>) -> Result<()> {
    let supervisor = Supervisor::new(
        bundler.command.clone(),
        RestartPolicy::from_millis(bundler.restart_backoff_ms),
    );
    // events are already logged by the supervisor
    let (events, _) = mpsc::unbounded_channel();
    supervisor.run(events, shutdown).await
}

/// Runs until the watcher goes away. Build and lint failures are logged
/// and the loop carries on.
pub async fn watch_sources(config: &Config, pipeline: Arc<StylePipeline>, live_reload: LiveReload) -> Result<()> {
    let rules = fswatch::default_rules(&config.watch)?;
    let mut watcher = FileWatcher::spawn(rules, Path::new("."))?;
    let lint = Arc::new(LintRunner::new(config.lint.command.clone()));
    let debouncer = Debouncer::new(Duration::from_millis(config.lint.debounce_ms));
    tracing::info!(roots = watcher.roots().len(), "watching for changes");

    while let Some(change) = watcher.next().await {
        tracing::debug!(path = %change.path.display(), action = ?change.action, "change");
        match change.action {
            WatchAction::Reload => {
                let name = change
                    .path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                live_reload.reload(&name);
            }
            WatchAction::BuildStyles => {
                if let Err(e) = build_styl(&pipeline, &live_reload).await {
                    tracing::error!(error = %format!("{:#}", e), "stylesheet build failed");
                }
            }
            WatchAction::Lint => {
                let lint = lint.clone();
                debouncer.trigger(move || async move {
                    lint.run().await;
                });
            }
        }
    }
    Ok(())
}

/// Render the index with the production table and minify it.
pub async fn minify_index(config: &Config) -> Result<String> {
    let template = tokio::fs::read_to_string(&config.template.index)
        .await
        .with_context(|| format!("failed to read {}", config.template.index.display()))?;
    let rendered = PlaceholderTable::production().render(&template);
    Ok(html::minify(&rendered))
}

async fn run_default(config: Config) -> Result<()> {
    let live_reload = LiveReload::new();
    let pipeline = Arc::new(StylePipeline::from_config(&config.style));
    let mut shutdown = shutdown_signal();
    let webpack_shutdown = shutdown.clone();

    let initial_build = async {
        if let Err(e) = build_styl(&pipeline, &live_reload).await {
            tracing::error!(error = %format!("{:#}", e), "stylesheet build failed");
        }
        anyhow::Ok(())
    };

    let all = async {
        tokio::try_join!(
            server::serve(config.clone()),
            live_reload.serve(config.livereload.port),
            background_webpack(&config.bundler, webpack_shutdown),
            initial_build,
            watch_sources(&config, pipeline.clone(), live_reload.clone()),
        )
        .map(|_| ())
    };

    tokio::select! {
        result = all => result,
        _ = shutdown.wait_for(|stop| *stop) => {
            tracing::info!("shutting down");
            Ok(())
        }
    }
}

/// Flips to `true` on Ctrl-C.
pub fn shutdown_signal() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = tx.send(true);
        }
        // hold the sender until every receiver is gone
        tx.closed().await;
    });
    rx
}
