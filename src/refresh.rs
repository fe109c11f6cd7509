use crate::config::Config;
use crate::error::Error;
use log::debug;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Rebuilds the desktop and MIME caches after launcher files changed.
pub trait CacheRefresher {
    fn refresh(&self) -> Result<(), Error>;
}

pub struct CommandRefresher {
    desktop_database_cmd: String,
    mime_database_cmd: String,
    applications: PathBuf,
    mime_database: PathBuf,
}

impl CommandRefresher {
    pub fn from_config(config: &Config) -> Self {
        Self {
            desktop_database_cmd: config.refresh.desktop_database_cmd.clone(),
            mime_database_cmd: config.refresh.mime_database_cmd.clone(),
            applications: config.user_applications.clone(),
            mime_database: config.mime_database.clone(),
        }
    }

    fn run(cmd: &str, dir: &Path) -> Result<(), Error> {
        let mut parts = cmd.split_whitespace();
        let Some(program) = parts.next() else {
            return Ok(());
        };
        debug!("Running {} {:?}", cmd, dir);
        let status = Command::new(program)
            .args(parts)
            .arg(dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|e| Error::CacheRefresh(format!("{}: {}", program, e)))?;
        if !status.success() {
            return Err(Error::CacheRefresh(format!("{} exited with {}", program, status)));
        }
        Ok(())
    }
}

impl CacheRefresher for CommandRefresher {
    fn refresh(&self) -> Result<(), Error> {
        Self::run(&self.desktop_database_cmd, &self.applications)?;
        if self.mime_database.exists() {
            Self::run(&self.mime_database_cmd, &self.mime_database)?;
        }
        Ok(())
    }
}

/// Used when refreshing is disabled in the configuration.
pub struct NoRefresh;

impl CacheRefresher for NoRefresh {
    fn refresh(&self) -> Result<(), Error> {
        Ok(())
    }
}
