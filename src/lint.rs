use std::process::Stdio;
use std::time::Instant;

/// Outcome of one lint pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LintOutcome {
    Clean,
    /// The linter ran and reported problems (non-zero exit).
    Failed(Option<i32>),
    /// The linter could not be started.
    Unavailable,
}

#[derive(Debug, Clone)]
pub struct LintRunner {
    command: Vec<String>,
}

impl LintRunner {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }

    /// Run the linter with its report going straight to our stdout/stderr.
    /// Problems are logged, never returned as errors.
    pub async fn run(&self) -> LintOutcome {
        let Some((program, args)) = self.command.split_first() else {
            tracing::warn!("lint command is empty");
            return LintOutcome::Unavailable;
        };

        let started = Instant::now();
        let status = tokio::process::Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match status {
            Ok(s) if s.success() => {
                tracing::info!(elapsed_ms, "lint clean");
                LintOutcome::Clean
            }
            Ok(s) => {
                tracing::warn!(elapsed_ms, status = %s, "lint reported problems");
                LintOutcome::Failed(s.code())
            }
            Err(e) => {
                tracing::warn!(program = %program, error = %e, "failed to run linter");
                LintOutcome::Unavailable
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runner(parts: &[&str]) -> LintRunner {
        LintRunner::new(parts.iter().map(|s| s.to_string()).collect())
    }

    #[tokio::test]
    async fn test_missing_linter_is_not_an_error() {
        assert_eq!(runner(&["ogs-dev-no-such-linter"]).run().await, LintOutcome::Unavailable);
        assert_eq!(runner(&[]).run().await, LintOutcome::Unavailable);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exit_codes() {
        assert_eq!(runner(&["sh", "-c", "exit 0"]).run().await, LintOutcome::Clean);
        assert_eq!(runner(&["sh", "-c", "exit 2"]).run().await, LintOutcome::Failed(Some(2)));
    }
}
