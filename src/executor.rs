//! Script file handling and database client invocation.

use crate::constants::{DEFAULT_EXECUTION_TIMEOUT, DEFAULT_PSQL_BINARY, SCRIPT_FILE_PREFIX};
use crate::error::GuardError;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, error, info, warn};

/// Database credentials injected by the CI secret store.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    /// Create credentials; both values must be non-empty.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Result<Self, GuardError> {
        let username = username.into();
        let password = password.into();
        if username.trim().is_empty() {
            return Err(GuardError::precondition("Database username is empty"));
        }
        if password.is_empty() {
            return Err(GuardError::precondition("Database password is empty"));
        }
        Ok(Self { username, password })
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Everything the database client needs for one run.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub script_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub credentials: Credentials,
}

/// Runs a script file against a database and reports the client's exit code.
pub trait ProcessInvoker {
    fn invoke(&self, invocation: &Invocation) -> impl Future<Output = Result<i32, GuardError>> + Send;
}

/// Invokes `psql` with `ON_ERROR_STOP` so a failing statement aborts the transaction.
#[derive(Debug, Clone)]
pub struct PsqlInvoker {
    binary: PathBuf,
    timeout: Duration,
}

impl Default for PsqlInvoker {
    fn default() -> Self {
        Self {
            binary: PathBuf::from(DEFAULT_PSQL_BINARY),
            timeout: DEFAULT_EXECUTION_TIMEOUT,
        }
    }
}

impl PsqlInvoker {
    pub fn new(binary: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }

    /// Build the client command. The password travels in `PGPASSWORD`, never in argv.
    fn command(&self, invocation: &Invocation) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("-X")
            .arg("-v")
            .arg("ON_ERROR_STOP=1")
            .arg("-h")
            .arg(&invocation.host)
            .arg("-p")
            .arg(invocation.port.to_string())
            .arg("-U")
            .arg(&invocation.credentials.username)
            .arg("-d")
            .arg(&invocation.database)
            .arg("-f")
            .arg(&invocation.script_path)
            .env("PGPASSWORD", &invocation.credentials.password)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        cmd
    }
}

impl ProcessInvoker for PsqlInvoker {
    async fn invoke(&self, invocation: &Invocation) -> Result<i32, GuardError> {
        info!(
            "Running {} against {}:{}/{}",
            self.binary.display(),
            invocation.host,
            invocation.port,
            invocation.database
        );

        let mut child = self.command(invocation).spawn().map_err(|e| {
            GuardError::io(format!("Failed to start {}", self.binary.display()), e)
        })?;

        let status = tokio::select! {
            waited = tokio::time::timeout(self.timeout, child.wait()) => match waited {
                Ok(status) => status.map_err(|e| GuardError::io("Failed to wait for database client", e))?,
                Err(_) => {
                    error!("Database client exceeded {:?}, killing it", self.timeout);
                    if let Err(e) = child.kill().await {
                        warn!("Failed to kill database client: {}", e);
                    }
                    return Err(GuardError::ExecutionTimeout {
                        timeout_seconds: self.timeout.as_secs(),
                    });
                }
            },
            _ = tokio::signal::ctrl_c() => {
                warn!("Interrupted, killing database client");
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill database client: {}", e);
                }
                return Err(GuardError::Interrupted("received Ctrl+C".to_string()));
            }
        };

        // A signal-terminated client has no exit code.
        Ok(status.code().unwrap_or(-1))
    }
}

/// Generated script on disk, removed when dropped.
#[derive(Debug)]
pub struct ScriptFile {
    path: PathBuf,
}

impl ScriptFile {
    /// Write `contents` to `<dir>/sqlguard-<run_id>.sql`.
    pub fn create(dir: &Path, run_id: &str, contents: &str) -> Result<Self, GuardError> {
        std::fs::create_dir_all(dir).map_err(|e| {
            GuardError::io(format!("Failed to create script directory {}", dir.display()), e)
        })?;
        let path = dir.join(format!("{}{}.sql", SCRIPT_FILE_PREFIX, run_id));
        std::fs::write(&path, contents)
            .map_err(|e| GuardError::io(format!("Failed to write {}", path.display()), e))?;
        debug!("Wrote script to {}", path.display());
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScriptFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed script {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove script {}: {}", self.path.display(), e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir() -> PathBuf {
        std::env::temp_dir().join(format!("sql-guard-test-{}", uuid::Uuid::new_v4().simple()))
    }

    #[test]
    fn test_credentials_required() {
        assert!(Credentials::new("app", "secret").is_ok());
        assert!(matches!(
            Credentials::new("", "secret"),
            Err(GuardError::Precondition(_))
        ));
        assert!(matches!(
            Credentials::new("app", ""),
            Err(GuardError::Precondition(_))
        ));
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let creds = Credentials::new("app", "hunter2").unwrap();
        let debug = format!("{:?}", creds);
        assert!(debug.contains("app"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_script_file_removed_on_drop() {
        let dir = scratch_dir();
        let path = {
            let file = ScriptFile::create(&dir, "abc123", "BEGIN;\nCOMMIT;\n").unwrap();
            assert_eq!(std::fs::read_to_string(file.path()).unwrap(), "BEGIN;\nCOMMIT;\n");
            assert!(file.path().ends_with("sqlguard-abc123.sql"));
            file.path().to_path_buf()
        };
        assert!(!path.exists());
        let _ = std::fs::remove_dir(&dir);
    }

    #[test]
    fn test_psql_command_keeps_password_out_of_argv() {
        let invoker = PsqlInvoker::default();
        let invocation = Invocation {
            script_path: PathBuf::from("/tmp/x.sql"),
            host: "db.acme".into(),
            port: 5432,
            database: "billing".into(),
            credentials: Credentials::new("app", "hunter2").unwrap(),
        };
        let cmd = invoker.command(&invocation);
        let std_cmd = cmd.as_std();
        let args: Vec<String> = std_cmd
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert!(args.contains(&"ON_ERROR_STOP=1".to_string()));
        assert!(args.contains(&"db.acme".to_string()));
        assert!(!args.iter().any(|a| a.contains("hunter2")));
        assert!(std_cmd
            .get_envs()
            .any(|(k, v)| k == "PGPASSWORD" && v.map(|v| v == "hunter2").unwrap_or(false)));
    }

    #[tokio::test]
    async fn test_missing_binary_is_io_error() {
        let invoker = PsqlInvoker::new("/nonexistent/psql-binary", Duration::from_secs(5));
        let invocation = Invocation {
            script_path: PathBuf::from("/tmp/x.sql"),
            host: "localhost".into(),
            port: 5432,
            database: "db".into(),
            credentials: Credentials::new("u", "p").unwrap(),
        };
        assert!(matches!(
            invoker.invoke(&invocation).await,
            Err(GuardError::Io { .. })
        ));
    }
}
