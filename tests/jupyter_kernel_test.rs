//! Runs against a real Jupyter installation; every test returns early when
//! `jupyter nbconvert` is not available.

use std::{process::Command, sync::Arc, time::Duration};

use nbexec::{
    execution::{CanonicalResponse, EngineOptions, ExecutionEngine},
    process::NbconvertKernel,
    session::SessionStore,
};

fn jupyter_available() -> bool {
    Command::new("jupyter")
        .args(["nbconvert", "--version"])
        .output()
        .map(|out| out.status.success())
        .unwrap_or(false)
}

fn python_has(module: &str) -> bool {
    Command::new("python3")
        .args(["-c", &format!("import {module}")])
        .output()
        .map(|out| out.status.success())
        .unwrap_or(false)
}

fn engine(scratch: &std::path::Path, timeout: Duration) -> ExecutionEngine {
    let options = EngineOptions {
        timeout,
        workdir: scratch.to_path_buf(),
        scratch_dir: scratch.to_path_buf(),
        kernel_name: "python3".into(),
    };
    let kernel = NbconvertKernel::new("jupyter", scratch);
    ExecutionEngine::new(Arc::new(SessionStore::new()), Arc::new(kernel), options)
}

#[tokio::test]
async fn state_carries_across_snippets() {
    if !jupyter_available() {
        println!("jupyter not found; skipping");
        return;
    }
    let scratch = tempfile::tempdir().unwrap();
    let engine = engine(scratch.path(), Duration::from_secs(120));

    let first = engine.execute("s", "x = 5").await;
    assert_eq!(first.error, None);
    let second = engine.execute("s", "print(x * 2)").await;
    assert_eq!(second.error, None);
    assert_eq!(second.text_output.trim(), "10");
}

#[tokio::test]
async fn split_and_joined_snippets_agree() {
    if !jupyter_available() {
        println!("jupyter not found; skipping");
        return;
    }
    let scratch = tempfile::tempdir().unwrap();
    let engine = engine(scratch.path(), Duration::from_secs(120));

    engine.execute("split", "a = [1, 2]").await;
    engine.execute("split", "a.append(3)").await;
    let split = engine.execute("split", "print(a)").await;

    engine.execute("joined", "a = [1, 2]\na.append(3)").await;
    let joined = engine.execute("joined", "print(a)").await;

    assert_eq!(split.text_output, joined.text_output);
    assert_eq!(split.text_output.trim(), "[1, 2, 3]");
}

#[tokio::test]
async fn error_rolls_back_and_keeps_counting() {
    if !jupyter_available() {
        println!("jupyter not found; skipping");
        return;
    }
    let scratch = tempfile::tempdir().unwrap();
    let engine = engine(scratch.path(), Duration::from_secs(120));

    engine.execute("s", "y = 1").await;
    let failed = engine.execute("s", "print('before')\n1 / 0").await;
    assert!(failed.error.as_deref().unwrap_or_default().contains("ZeroDivisionError"));
    assert_eq!(failed.text_output.trim(), "before");

    let session = engine.store().resolve("s");
    let state = session.lock().await;
    assert_eq!(state.history().len(), 2);
    assert_eq!(state.execution_count(), 2);
}

#[tokio::test]
async fn timeout_is_reported() {
    if !jupyter_available() {
        println!("jupyter not found; skipping");
        return;
    }
    let scratch = tempfile::tempdir().unwrap();
    let engine = engine(scratch.path(), Duration::from_secs(5));

    let response = engine.execute("s", "import time\ntime.sleep(30)").await;
    assert!(response.error.is_some());
    assert_ne!(response, CanonicalResponse::default());
}

#[tokio::test]
async fn figures_are_captured_once() {
    if !jupyter_available() || !python_has("matplotlib") {
        println!("jupyter or matplotlib not found; skipping");
        return;
    }
    let scratch = tempfile::tempdir().unwrap();
    let engine = engine(scratch.path(), Duration::from_secs(120));

    let plotted = engine
        .execute("s", "import matplotlib.pyplot as plt\nplt.plot([1, 2, 3])")
        .await;
    assert_eq!(plotted.error, None);
    assert_eq!(plotted.images.len(), 1);
    assert_eq!(plotted.images[0].kind, "png");

    let unrelated = engine.execute("s", "print('no plot')").await;
    assert!(unrelated.images.is_empty());
}
