//! Kernel process seam: something that executes every cell of a unit file.

use std::{path::Path, time::Duration};

use async_trait::async_trait;

use crate::{error::KernelError, notebook::Notebook};

pub mod nbconvert;

pub use nbconvert::NbconvertKernel;

/// Out-of-process interpreter.
///
/// `run` executes every cell of the notebook at `unit` from the top, with
/// `workdir` as the interpreter's working directory, and returns the same
/// notebook with each cell's outputs attached. Errors raised *inside* a cell
/// are reported as `error` output records, not as `Err`; `Err` means the
/// invocation itself failed (could not start, timed out, produced garbage).
#[async_trait]
pub trait Kernel: Send + Sync {
    async fn run(
        &self,
        unit: &Path,
        workdir: &Path,
        timeout: Duration,
    ) -> Result<Notebook, KernelError>;
}
