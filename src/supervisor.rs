//! Keeps one long-running child process (the bundler in watch mode) alive.

use anyhow::Result;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::AsyncRead;
use tokio::process::Command;
use tokio::sync::{mpsc, watch};

/// Delay before retrying a spawn that failed and no backoff is set.
const SPAWN_RETRY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestartPolicy {
    /// Pause between an exit and the next spawn. `None` restarts at once.
    pub backoff: Option<Duration>,
}

impl RestartPolicy {
    pub fn from_millis(ms: Option<u64>) -> Self {
        Self {
            backoff: ms.map(Duration::from_millis),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorEvent {
    Spawned { generation: u64, pid: Option<u32> },
    Exited { generation: u64, status: ExitStatus },
    SpawnFailed { generation: u64, error: String },
}

pub struct Supervisor {
    command: Vec<String>,
    policy: RestartPolicy,
}

impl Supervisor {
    pub fn new(command: Vec<String>, policy: RestartPolicy) -> Self {
        Self { command, policy }
    }

    /// Spawn, relay output, wait, repeat. Only one child is alive at a
    /// time. Returns once `shutdown` turns true, killing the current child.
    pub async fn run(
        &self,
        events: mpsc::UnboundedSender<SupervisorEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        let Some((program, args)) = self.command.split_first() else {
            anyhow::bail!("supervised command is empty");
        };
        let mut generation = 0u64;

        loop {
            if *shutdown.borrow() {
                return Ok(());
            }
            generation += 1;

            let spawned = Command::new(program)
                .args(args)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .spawn();

            let mut child = match spawned {
                Ok(child) => child,
                Err(e) => {
                    tracing::warn!(program = %program, generation, error = %e, "failed to spawn");
                    let _ = events.send(SupervisorEvent::SpawnFailed {
                        generation,
                        error: e.to_string(),
                    });
                    let delay = self.policy.backoff.unwrap_or(SPAWN_RETRY);
                    if sleep_or_shutdown(delay, &mut shutdown).await {
                        return Ok(());
                    }
                    continue;
                }
            };

            let pid = child.id();
            tracing::info!(program = %program, generation, pid, "spawned");
            let _ = events.send(SupervisorEvent::Spawned { generation, pid });

            // Detached: grandchildren may hold the pipes open past the exit.
            if let Some(out) = child.stdout.take() {
                relay(out, tokio::io::stdout());
            }
            if let Some(err) = child.stderr.take() {
                relay(err, tokio::io::stderr());
            }

            let stopping = tokio::select! {
                _ = child.wait() => false,
                _ = stopped(&mut shutdown) => {
                    if let Err(e) = child.kill().await {
                        tracing::warn!(generation, error = %e, "failed to kill child");
                    }
                    true
                }
            };
            let status = child.wait().await?;

            if stopping {
                tracing::info!(generation, %status, "stopped");
            } else {
                tracing::warn!(generation, %status, "exited, restarting");
            }
            let _ = events.send(SupervisorEvent::Exited { generation, status });

            if stopping {
                return Ok(());
            }
            if let Some(backoff) = self.policy.backoff {
                if sleep_or_shutdown(backoff, &mut shutdown).await {
                    return Ok(());
                }
            }
        }
    }
}

/// Copies until the pipe closes, which may be after the child itself exits.
fn relay<R, W>(mut from: R, mut to: W)
where
    R: AsyncRead + Unpin + Send + 'static,
    W: tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let _ = tokio::io::copy(&mut from, &mut to).await;
    });
}

/// Resolves once shutdown is requested. A dropped sender never resolves.
async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    let closed = shutdown.wait_for(|stop| *stop).await.is_err();
    if closed {
        std::future::pending::<()>().await;
    }
}

/// `true` if shutdown arrived before the delay ran out.
async fn sleep_or_shutdown(delay: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(delay) => false,
        _ = stopped(shutdown) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_empty_command_rejected() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let (_stop_tx, stop_rx) = watch::channel(false);
        let sup = Supervisor::new(Vec::new(), RestartPolicy::default());
        assert!(sup.run(tx, stop_rx).await.is_err());
    }

    #[test]
    fn test_policy_from_millis() {
        assert_eq!(RestartPolicy::from_millis(None).backoff, None);
        assert_eq!(
            RestartPolicy::from_millis(Some(250)).backoff,
            Some(Duration::from_millis(250))
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_restarts_alternate_spawn_and_exit() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = watch::channel(false);
        let sup = Supervisor::new(
            cmd(&["sh", "-c", "exit 3"]),
            RestartPolicy { backoff: Some(Duration::from_millis(10)) },
        );
        let handle = tokio::spawn(async move { sup.run(tx, stop_rx).await });

        let mut events = Vec::new();
        while events.len() < 6 {
            events.push(rx.recv().await.unwrap());
        }
        stop_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();

        for (i, pair) in events.chunks(2).enumerate() {
            let expected = i as u64 + 1;
            match pair {
                [SupervisorEvent::Spawned { generation: a, pid }, SupervisorEvent::Exited { generation: b, status }] => {
                    assert_eq!(*a, expected);
                    assert_eq!(*b, expected);
                    assert!(pid.is_some());
                    assert_eq!(status.code(), Some(3));
                }
                other => panic!("unexpected events: {:?}", other),
            }
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_shutdown_kills_running_child() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = watch::channel(false);
        let sup = Supervisor::new(cmd(&["sleep", "30"]), RestartPolicy::default());
        let handle = tokio::spawn(async move { sup.run(tx, stop_rx).await });

        assert!(matches!(
            rx.recv().await.unwrap(),
            SupervisorEvent::Spawned { generation: 1, .. }
        ));
        stop_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();

        match rx.recv().await.unwrap() {
            SupervisorEvent::Exited { generation, status } => {
                assert_eq!(generation, 1);
                assert!(!status.success());
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(rx.recv().await.is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_respawn_not_held_by_background_grandchild() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = watch::channel(false);
        let sup = Supervisor::new(cmd(&["sh", "-c", "sleep 5 & exit 1"]), RestartPolicy::default());
        let handle = tokio::spawn(async move { sup.run(tx, stop_rx).await });

        let mut events = Vec::new();
        tokio::time::timeout(Duration::from_secs(2), async {
            while events.len() < 3 {
                events.push(rx.recv().await.unwrap());
            }
        })
        .await
        .expect("respawn waited on the grandchild's pipes");
        stop_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();

        assert!(matches!(events[0], SupervisorEvent::Spawned { generation: 1, .. }));
        match &events[1] {
            SupervisorEvent::Exited { generation, status } => {
                assert_eq!(*generation, 1);
                assert_eq!(status.code(), Some(1));
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(matches!(events[2], SupervisorEvent::Spawned { generation: 2, .. }));
    }

    #[tokio::test]
    async fn test_spawn_failure_retries_after_backoff() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = watch::channel(false);
        let sup = Supervisor::new(
            cmd(&["ogs-dev-no-such-bundler"]),
            RestartPolicy { backoff: Some(Duration::from_millis(10)) },
        );
        let handle = tokio::spawn(async move { sup.run(tx, stop_rx).await });

        for expected in 1..=3u64 {
            match rx.recv().await.unwrap() {
                SupervisorEvent::SpawnFailed { generation, error } => {
                    assert_eq!(generation, expected);
                    assert!(!error.is_empty());
                }
                other => panic!("unexpected event: {:?}", other),
            }
        }
        stop_tx.send(true).unwrap();
        handle.await.unwrap().unwrap();
    }
}
