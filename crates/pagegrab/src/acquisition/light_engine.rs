//! Driver for the lightweight rendering engine.
//!
//! The engine is an external executable invoked as `<bin> fetch --dump <url>`;
//! it prints the rendered DOM on stdout. Provisioning the binary is somebody
//! else's job, we only check that it is there and runnable.

use crate::error::{FetchError, FetchResult};
use crate::process::{ProcessRunner, TerminationCause, SPAWN_FAILURE_CODE};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Added on top of the configured timeout to cover engine startup.
pub const STARTUP_BUFFER: Duration = Duration::from_millis(5000);

/// A located, runnable engine binary.
#[derive(Debug, Clone)]
pub struct LightEngine {
    binary: PathBuf,
    runner: ProcessRunner,
}

impl LightEngine {
    /// Check `binary` and wrap it. Fails with [`FetchError::BinaryMissing`]
    /// when the path is absent, not a regular file or not executable.
    pub fn locate(binary: Option<&Path>, runner: ProcessRunner) -> FetchResult<Self> {
        let binary = binary.ok_or_else(|| {
            FetchError::BinaryMissing("no light engine path configured".to_string())
        })?;
        check_binary(binary)?;
        Ok(Self {
            binary: binary.to_path_buf(),
            runner,
        })
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Render `url` and return the dumped markup.
    pub async fn fetch(&self, url: &str, timeout: Duration) -> FetchResult<String> {
        let budget = timeout + STARTUP_BUFFER;
        let out = self
            .runner
            .run(&self.binary, ["fetch", "--dump", url], budget)
            .await;

        match out.termination_cause {
            TerminationCause::SoftTimeout | TerminationCause::HardTimeout => {
                return Err(FetchError::Timeout(budget));
            }
            TerminationCause::Natural => {}
        }

        if out.exit_code == SPAWN_FAILURE_CODE {
            return Err(FetchError::Spawn(out.stderr.trim().to_string()));
        }
        if out.exit_code != 0 {
            return Err(FetchError::ProcessFailed {
                code: out.exit_code,
                stderr: out.stderr.trim().to_string(),
            });
        }

        if out.stdout.trim().is_empty() {
            return Err(FetchError::ProcessFailed {
                code: 0,
                stderr: "engine produced no output".to_string(),
            });
        }

        Ok(out.stdout)
    }
}

fn check_binary(path: &Path) -> FetchResult<()> {
    let meta = std::fs::metadata(path).map_err(|e| {
        FetchError::BinaryMissing(format!("{}: {e}", path.display()))
    })?;
    if !meta.is_file() {
        return Err(FetchError::BinaryMissing(format!(
            "{} is not a regular file",
            path.display()
        )));
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if meta.permissions().mode() & 0o111 == 0 {
            return Err(FetchError::BinaryMissing(format!(
                "{} is not executable",
                path.display()
            )));
        }
    }
    Ok(())
}
