use std::{
    io::{self, Read},
    net::SocketAddr,
    path::PathBuf,
    sync::Arc,
};

use anyhow::{anyhow, bail, Context, Result};
use is_terminal::IsTerminal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use nbexec::{
    cli::{Cli, Command, RunArgs, ServeArgs},
    client::NbexecClient,
    config::Config,
    execution::{EngineOptions, ExecutionEngine},
    printer::{save_images, ResponsePrinter},
    process::NbconvertKernel,
    server,
    session::SessionStore,
};

const SELF_TEST_SESSION: &str = "nbexec-self-test";
const SELF_TEST_MARKER: &str = "nbexec self-test";

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    let cfg = Config::load();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(cfg.log_filter()))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    match args.command {
        None => serve(cfg, ServeArgs::default()).await,
        Some(Command::Serve(serve_args)) => serve(cfg, serve_args).await,
        Some(Command::Run(run_args)) => run(cfg, run_args).await,
    }
}

async fn serve(mut cfg: Config, args: ServeArgs) -> Result<()> {
    // CLI overrides config
    if let Some(host) = &args.host {
        cfg.set("NBEXEC_HOST", host.as_str());
    }
    if let Some(port) = args.port {
        cfg.set("NBEXEC_PORT", port.to_string());
    }
    if let Some(dir) = &args.workdir {
        cfg.set("NBEXEC_WORKDIR", dir.to_string_lossy());
    }
    if let Some(secs) = args.timeout {
        cfg.set("NBEXEC_EXECUTION_TIMEOUT", secs.to_string());
    }

    let scratch_dir = absolute(cfg.scratch_dir())?;
    let options = EngineOptions {
        timeout: cfg.execution_timeout(),
        workdir: absolute(cfg.workdir())?,
        scratch_dir: scratch_dir.clone(),
        kernel_name: cfg.kernel_name(),
    };
    let kernel = NbconvertKernel::new(cfg.kernel_command(), scratch_dir);
    let store = Arc::new(SessionStore::new());
    let engine = Arc::new(ExecutionEngine::new(store.clone(), Arc::new(kernel), options));

    info!(
        kernel = %cfg.kernel_command(),
        workdir = %engine.options().workdir.display(),
        timeout = engine.options().timeout.as_secs(),
        "engine ready"
    );

    if args.self_test {
        self_test(&engine).await?;
    }

    let sweeper = match cfg.session_idle_ttl() {
        Some(ttl) => Some(tokio::spawn(store.sweep(cfg.sweep_interval(), ttl))),
        None => {
            warn!("session eviction disabled");
            None
        }
    };

    let addr: SocketAddr = format!("{}:{}", cfg.host(), cfg.port())
        .parse()
        .with_context(|| format!("invalid bind address {}:{}", cfg.host(), cfg.port()))?;
    let result = server::serve(engine, addr, shutdown_signal()).await;

    if let Some(handle) = sweeper {
        handle.abort();
    }
    info!("nbexec stopped");
    result
}

async fn self_test(engine: &ExecutionEngine) -> Result<()> {
    info!("running self-test");
    let response = engine
        .execute(SELF_TEST_SESSION, &format!("print({SELF_TEST_MARKER:?})"))
        .await;
    engine.reset(SELF_TEST_SESSION);
    if let Some(err) = response.error {
        bail!("self-test failed: {err}");
    }
    if !response.text_output.contains(SELF_TEST_MARKER) {
        bail!("self-test failed: unexpected output {:?}", response.text_output);
    }
    info!("self-test passed");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

async fn run(cfg: Config, args: RunArgs) -> Result<()> {
    let code = if args.file == "-" {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(&args.file).with_context(|| format!("reading {}", args.file))?
    };

    let mut client = NbexecClient::from_config(&cfg, args.url.as_deref(), args.session.clone())?;
    if args.reset {
        if client.session().is_none() {
            return Err(anyhow!("--reset needs --session"));
        }
        client.reset().await?;
    }

    let response = client.execute(&code).await?;
    let printer = ResponsePrinter { color: io::stdout().is_terminal() };
    printer.print(&response);

    if let Some(dir) = &args.save_images {
        for path in save_images(&response.images, dir)? {
            eprintln!("saved {}", path.display());
        }
    }
    if let Some(id) = client.session() {
        if args.session.is_none() {
            eprintln!("session: {id}");
        }
    }

    if response.error.is_some() {
        std::process::exit(1);
    }
    Ok(())
}

fn absolute(path: PathBuf) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path);
    }
    Ok(std::env::current_dir()?.join(path))
}
