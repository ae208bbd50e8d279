use std::{
    collections::HashMap,
    env,
    fs,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
    time::Duration,
};

use directories::BaseDirs;

#[derive(Debug, Clone)]
pub struct Config {
    inner: HashMap<String, String>,
    pub config_path: PathBuf,
}

impl Config {
    pub fn load() -> Self {
        let config_path = default_config_path();
        let mut map = default_map();

        // Read nbexecrc if exists
        if config_path.exists() {
            if let Ok(file) = fs::File::open(&config_path) {
                merge_rc(&mut map, BufReader::new(file));
            }
        }

        // Overlay environment variables (take precedence)
        for (k, v) in env::vars() {
            if is_config_key(&k) {
                map.insert(k, v);
            }
        }

        Self { inner: map, config_path }
    }

    /// Defaults plus the given rc file, without consulting the environment.
    pub fn from_rc_file(path: &Path) -> std::io::Result<Self> {
        let mut map = default_map();
        let file = fs::File::open(path)?;
        merge_rc(&mut map, BufReader::new(file));
        Ok(Self { inner: map, config_path: path.to_path_buf() })
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.inner.get(key).cloned()
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.inner.insert(key.to_string(), value.into());
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(|v| v.trim().parse::<u64>().ok())
    }

    pub fn get_path(&self, key: &str) -> Option<PathBuf> {
        self.get(key).map(PathBuf::from)
    }

    pub fn host(&self) -> String {
        self.get("NBEXEC_HOST").unwrap_or_else(|| "127.0.0.1".into())
    }

    pub fn port(&self) -> u16 {
        self.get("NBEXEC_PORT")
            .and_then(|v| v.trim().parse::<u16>().ok())
            .unwrap_or(5000)
    }

    pub fn kernel_command(&self) -> String {
        self.get("NBEXEC_KERNEL_COMMAND").unwrap_or_else(|| "jupyter".into())
    }

    pub fn kernel_name(&self) -> String {
        self.get("NBEXEC_KERNEL_NAME").unwrap_or_else(|| "python3".into())
    }

    pub fn execution_timeout(&self) -> Duration {
        Duration::from_secs(self.get_u64("NBEXEC_EXECUTION_TIMEOUT").unwrap_or(60))
    }

    pub fn workdir(&self) -> PathBuf {
        self.get_path("NBEXEC_WORKDIR").unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn scratch_dir(&self) -> PathBuf {
        self.get_path("NBEXEC_SCRATCH_DIR")
            .unwrap_or_else(|| env::temp_dir().join("nbexec"))
    }

    /// `None` when eviction is disabled (ttl of zero).
    pub fn session_idle_ttl(&self) -> Option<Duration> {
        match self.get_u64("NBEXEC_SESSION_IDLE_TTL").unwrap_or(3600) {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.get_u64("NBEXEC_SWEEP_INTERVAL").unwrap_or(60).max(1))
    }

    pub fn log_filter(&self) -> String {
        self.get("NBEXEC_LOG").unwrap_or_else(|| "info".into())
    }

    pub fn server_url(&self) -> String {
        self.get("NBEXEC_SERVER_URL")
            .unwrap_or_else(|| "http://127.0.0.1:5000".into())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.get_u64("NBEXEC_REQUEST_TIMEOUT").unwrap_or(120))
    }
}

fn merge_rc(map: &mut HashMap<String, String>, reader: impl BufRead) {
    for line in reader.lines().map_while(Result::ok) {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((k, v)) = line.split_once('=') {
            map.insert(k.trim().to_string(), v.trim().to_string());
        }
    }
}

fn is_config_key(k: &str) -> bool {
    k.starts_with("NBEXEC_")
}

fn default_config_path() -> PathBuf {
    let base = BaseDirs::new()
        .map(|b| b.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("~/.config"));
    base.join("nbexec").join("nbexecrc")
}

fn default_map() -> HashMap<String, String> {
    let mut m = HashMap::new();
    let scratch = env::temp_dir().join("nbexec");

    // Server
    m.insert("NBEXEC_HOST".into(), "127.0.0.1".into());
    m.insert("NBEXEC_PORT".into(), "5000".into());
    m.insert("NBEXEC_LOG".into(), "info".into());

    // Kernel
    m.insert("NBEXEC_KERNEL_COMMAND".into(), "jupyter".into());
    m.insert("NBEXEC_KERNEL_NAME".into(), "python3".into());
    m.insert("NBEXEC_EXECUTION_TIMEOUT".into(), "60".into());
    m.insert("NBEXEC_WORKDIR".into(), ".".into());
    m.insert(
        "NBEXEC_SCRATCH_DIR".into(),
        scratch.to_string_lossy().into_owned(),
    );

    // Sessions
    m.insert("NBEXEC_SESSION_IDLE_TTL".into(), "3600".into());
    m.insert("NBEXEC_SWEEP_INTERVAL".into(), "60".into());

    // Client
    m.insert("NBEXEC_SERVER_URL".into(), "http://127.0.0.1:5000".into());
    m.insert("NBEXEC_REQUEST_TIMEOUT".into(), "120".into());

    m
}
