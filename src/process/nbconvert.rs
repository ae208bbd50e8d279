//! Jupyter kernel driven through `jupyter nbconvert --execute`.

use std::{
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use async_trait::async_trait;
use tokio::{process::Command, time::timeout};
use tracing::debug;

use super::Kernel;
use crate::{error::KernelError, notebook::Notebook};

const EXECUTED_NAME: &str = "executed.ipynb";

#[derive(Debug, Clone)]
pub struct NbconvertKernel {
    program: String,
    scratch_dir: PathBuf,
}

impl NbconvertKernel {
    /// The kernel itself is chosen by the unit's `kernelspec` metadata.
    pub fn new(program: impl Into<String>, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            scratch_dir: scratch_dir.into(),
        }
    }

    fn command(&self, unit: &Path, out_dir: &Path, workdir: &Path, limit: Duration) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("nbconvert")
            .arg("--to")
            .arg("notebook")
            .arg("--execute")
            // cell errors come back as error records in the executed notebook
            .arg("--allow-errors")
            .arg(format!("--ExecutePreprocessor.timeout={}", limit.as_secs().max(1)))
            .arg("--output-dir")
            .arg(out_dir)
            .arg("--output")
            .arg(EXECUTED_NAME)
            .arg(unit)
            .current_dir(workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl Kernel for NbconvertKernel {
    async fn run(
        &self,
        unit: &Path,
        workdir: &Path,
        limit: Duration,
    ) -> Result<Notebook, KernelError> {
        tokio::fs::create_dir_all(&self.scratch_dir).await?;
        // Removed on drop, whichever way we leave this function.
        let out_dir = tempfile::Builder::new()
            .prefix("nbexec-out-")
            .tempdir_in(&self.scratch_dir)?;

        let child = self
            .command(unit, out_dir.path(), workdir, limit)
            .spawn()
            .map_err(|source| KernelError::Spawn {
                command: self.program.clone(),
                source,
            })?;

        debug!(unit = %unit.display(), timeout = limit.as_secs(), "kernel started");

        // Dropping the future kills the child (kill_on_drop).
        let out = timeout(limit, child.wait_with_output())
            .await
            .map_err(|_| KernelError::Timeout(limit))??;

        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr);
            if is_cell_timeout(&stderr) {
                return Err(KernelError::Timeout(limit));
            }
            return Err(KernelError::Failed {
                status: out.status.code().unwrap_or(-1),
                stderr: last_lines(&stderr, 20),
            });
        }

        let executed = tokio::fs::read(out_dir.path().join(EXECUTED_NAME)).await?;
        Ok(Notebook::from_json(&executed)?)
    }
}

/// Whether nbconvert gave up on a cell. Other timeouts, such as a kernel
/// that never started, are plain failures.
fn is_cell_timeout(stderr: &str) -> bool {
    stderr.contains("CellTimeoutError")
}

/// Tail of a noisy stderr stream, enough to show the actual exception.
fn last_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.trim_end().lines().collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_lines_keeps_tail() {
        assert_eq!(last_lines("a\nb\nc\n", 2), "b\nc");
        assert_eq!(last_lines("only", 5), "only");
        assert_eq!(last_lines("", 3), "");
    }

    #[test]
    fn command_carries_timeout() {
        let kernel = NbconvertKernel::new("jupyter", std::env::temp_dir());
        let cmd = kernel.command(
            Path::new("unit.ipynb"),
            Path::new("/tmp/out"),
            Path::new("."),
            Duration::from_secs(60),
        );
        let args: Vec<String> = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert!(args.contains(&"--execute".to_string()));
        assert!(args.contains(&"--allow-errors".to_string()));
        assert!(args.contains(&"--ExecutePreprocessor.timeout=60".to_string()));
        assert!(!args.iter().any(|a| a.contains("kernel_name")));
        assert_eq!(args.last().map(String::as_str), Some("unit.ipynb"));
    }

    #[test]
    fn only_cell_timeouts_count_as_timeouts() {
        let cell = "nbclient.exceptions.CellTimeoutError: A cell timed out while it was being executed, after 60 seconds.";
        assert!(is_cell_timeout(cell));

        let startup = "RuntimeError: Kernel didn't respond in 60 seconds\nTimeoutError: Timeout waiting for kernel_info reply";
        assert!(!is_cell_timeout(startup));
    }

    #[tokio::test]
    async fn missing_program_is_spawn_error() {
        let scratch = tempfile::tempdir().unwrap();
        let kernel = NbconvertKernel::new("nbexec-definitely-not-installed", scratch.path());
        let err = kernel
            .run(Path::new("unit.ipynb"), scratch.path(), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, KernelError::Spawn { .. }));
    }
}
