//! Execution session engine: append a snippet to a session's history, replay
//! the history through the kernel, and turn the last unit's outputs into a
//! `CanonicalResponse`.

use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::{
    normalize::normalize,
    plots::captured_images,
    python::{introspection_cell, unit_cell},
    CanonicalResponse, ImageOutput,
};
use crate::{
    error::{KernelError, Result},
    notebook::{Cell, Notebook},
    process::Kernel,
    session::SessionStore,
};

#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Wall-clock bound for one kernel invocation.
    pub timeout: Duration,
    /// Working directory of the interpreter.
    pub workdir: PathBuf,
    /// Where transient unit files are created.
    pub scratch_dir: PathBuf,
    /// Kernelspec written into every unit; the kernel runs whatever it names.
    pub kernel_name: String,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            workdir: PathBuf::from("."),
            scratch_dir: std::env::temp_dir().join("nbexec"),
            kernel_name: "python3".into(),
        }
    }
}

#[derive(Debug, Default)]
pub struct EngineMetrics {
    executions: AtomicU64,
    failures: AtomicU64,
    timeouts: AtomicU64,
    empty_requests: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub executions: u64,
    pub failures: u64,
    pub timeouts: u64,
    pub empty_requests: u64,
}

impl EngineMetrics {
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            executions: self.executions.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            empty_requests: self.empty_requests.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

pub struct ExecutionEngine {
    store: Arc<SessionStore>,
    kernel: Arc<dyn Kernel>,
    options: EngineOptions,
    metrics: EngineMetrics,
}

impl ExecutionEngine {
    pub fn new(store: Arc<SessionStore>, kernel: Arc<dyn Kernel>, options: EngineOptions) -> Self {
        Self {
            store,
            kernel,
            options,
            metrics: EngineMetrics::default(),
        }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Forget everything session `id` has executed.
    pub fn reset(&self, id: &str) -> bool {
        self.store.reset(id)
    }

    /// Like [`try_execute`](Self::try_execute), with internal faults folded
    /// into the response's `error`.
    pub async fn execute(&self, id: &str, snippet: &str) -> CanonicalResponse {
        match self.try_execute(id, snippet).await {
            Ok(response) => response,
            Err(e) => {
                error!(session = id, error = %e, "execution failed");
                CanonicalResponse::failure(e.to_string())
            }
        }
    }

    /// Run `snippet` in session `id`.
    ///
    /// Kernel failures (errors raised by the snippet, timeouts, a kernel that
    /// cannot start) are reported in `Ok(response.error)` and leave the
    /// history as it was; only the counter moves. `Err` is reserved for
    /// faults outside the snippet, such as the session being reset mid-call.
    pub async fn try_execute(&self, id: &str, snippet: &str) -> Result<CanonicalResponse> {
        if snippet.trim().is_empty() {
            EngineMetrics::bump(&self.metrics.empty_requests);
            return Ok(CanonicalResponse::empty_snippet());
        }
        EngineMetrics::bump(&self.metrics.executions);

        let session = self.store.resolve(id);
        let mut state = session.lock().await;

        // Counted before the kernel runs so a dropped request still uses up
        // its number.
        let count = state.advance();
        let mut candidate = state.history().to_vec();
        candidate.push(unit_cell(count, snippet));
        debug!(session = id, count, history = candidate.len(), "executing unit");

        let outcome = self.run_units(candidate).await;

        let cells = match outcome {
            Ok(notebook) => notebook.cells,
            Err(e) => {
                self.record_failure(Some(&e));
                warn!(session = id, count, error = %e, "kernel invocation failed");
                return Ok(CanonicalResponse::failure(e.to_string()));
            }
        };

        let (replayed, last) = cells.split_at(cells.len() - 1);
        let mut response = normalize(&last[0].outputs);
        if response.is_error() {
            self.record_failure(None);
            debug!(session = id, count, "unit raised; history rolled back");
            return Ok(response);
        }
        if let Some(message) = replay_error(replayed) {
            self.record_failure(None);
            warn!(session = id, count, "replayed unit raised; history rolled back");
            response.error = Some(message);
            return Ok(response);
        }

        response.images.extend(self.capture_figures(id, &cells).await);

        let history_len = cells.len();
        self.store.commit(&session, &mut state, cells)?;
        info!(session = id, count, history = history_len, "unit committed");
        Ok(response)
    }

    /// Follow-up run that reads back the figures captured by the last unit.
    /// Any failure here only costs the images.
    async fn capture_figures(&self, id: &str, executed: &[Cell]) -> Vec<ImageOutput> {
        let mut units = executed.to_vec();
        units.push(introspection_cell());
        match self.run_units(units).await {
            Ok(notebook) => notebook.cells.last().map(captured_images).unwrap_or_default(),
            Err(e) => {
                warn!(session = id, error = %e, "plot capture failed; continuing without images");
                Vec::new()
            }
        }
    }

    /// Serialize `cells` to a transient unit file and execute it. The file is
    /// removed when this returns, on every path.
    async fn run_units(&self, cells: Vec<Cell>) -> std::result::Result<Notebook, KernelError> {
        let expected = cells.len();
        let bytes = Notebook::new(cells, &self.options.kernel_name).to_json()?;

        tokio::fs::create_dir_all(&self.options.scratch_dir).await?;
        let unit = tempfile::Builder::new()
            .prefix("nbexec-unit-")
            .suffix(".ipynb")
            .tempfile_in(&self.options.scratch_dir)?;
        tokio::fs::write(unit.path(), &bytes).await?;

        let executed = self
            .kernel
            .run(unit.path(), &self.options.workdir, self.options.timeout)
            .await?;
        if executed.cells.len() != expected {
            return Err(KernelError::CellCountMismatch {
                expected,
                actual: executed.cells.len(),
            });
        }
        Ok(executed)
    }

    fn record_failure(&self, kernel_error: Option<&KernelError>) {
        EngineMetrics::bump(&self.metrics.failures);
        if kernel_error.is_some_and(KernelError::is_timeout) {
            EngineMetrics::bump(&self.metrics.timeouts);
        }
    }
}

/// Error text of the first replayed unit that raised, if any.
fn replay_error(cells: &[Cell]) -> Option<String> {
    cells.iter().find_map(Cell::error).map(|output| {
        let mut response = normalize(std::slice::from_ref(output));
        response.error.take().unwrap_or_default()
    })
}
