use crate::error::Error;
use crate::model::Origin;
use anyhow::{Context, Result};
use directories::{BaseDirs, ProjectDirs};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// A directory the scanner reads launcher entries from.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceDir {
    pub path: PathBuf,
    pub origin: Origin,
    pub recursive: bool,
    pub writable: bool,
}

/// Every path the engine reads or writes. Built once from the home directory
/// and handed to the engine; nothing below `main` looks at the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub user_applications: PathBuf,
    pub system_applications: Vec<PathBuf>,
    pub wine: Vec<WineDir>,
    pub user_mimeapps: PathBuf,
    pub local_mimeapps: PathBuf,
    pub backup_dir: PathBuf,
    pub mime_database: PathBuf,
    pub refresh: RefreshConfig,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct WineDir {
    pub path: PathBuf,
    #[serde(default = "default_true")]
    pub recursive: bool,
    #[serde(default = "default_true")]
    pub writable: bool,
}

#[derive(Deserialize, Debug, Clone)]
pub struct RefreshConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_desktop_database_cmd")]
    pub desktop_database_cmd: String,
    #[serde(default = "default_mime_database_cmd")]
    pub mime_database_cmd: String,
}

fn default_true() -> bool { true }
fn default_desktop_database_cmd() -> String { "update-desktop-database".to_string() }
fn default_mime_database_cmd() -> String { "update-mime-database".to_string() }

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            desktop_database_cmd: default_desktop_database_cmd(),
            mime_database_cmd: default_mime_database_cmd(),
        }
    }
}

/// On-disk shape of `config.toml`. Every path is optional and may start with `~/`.
#[derive(Deserialize, Debug, Default)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub paths: PathsFile,
    pub refresh: Option<RefreshConfig>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(default, deny_unknown_fields)]
pub struct PathsFile {
    pub user_applications: Option<PathBuf>,
    pub system_applications: Option<Vec<PathBuf>>,
    pub wine: Option<Vec<WineDir>>,
    pub user_mimeapps: Option<PathBuf>,
    pub local_mimeapps: Option<PathBuf>,
    pub backup_dir: Option<PathBuf>,
    pub mime_database: Option<PathBuf>,
}

impl Config {
    /// Default XDG layout below `home`; `data_dir` is usually `~/.local/share`.
    pub fn new(home: &Path, data_dir: &Path) -> Self {
        let user_applications = data_dir.join("applications");
        Self {
            wine: vec![WineDir {
                path: user_applications.join("wine"),
                recursive: true,
                writable: true,
            }],
            user_mimeapps: home.join(".config/mimeapps.list"),
            local_mimeapps: user_applications.join("mimeapps.list"),
            backup_dir: data_dir.join("launcher-dedup/backups"),
            mime_database: data_dir.join("mime"),
            system_applications: vec![
                PathBuf::from("/usr/local/share/applications"),
                PathBuf::from("/usr/share/applications"),
            ],
            user_applications,
            refresh: RefreshConfig::default(),
        }
    }

    pub fn apply_file(&mut self, file: ConfigFile, home: &Path) -> Result<(), Error> {
        let p = file.paths;
        let expand = |raw: PathBuf| expand_home(&raw, home);

        if let Some(v) = p.user_applications { self.user_applications = expand(v)?; }
        if let Some(v) = p.system_applications {
            self.system_applications = v.into_iter().map(expand).collect::<Result<_, _>>()?;
        }
        if let Some(v) = p.wine {
            self.wine = v
                .into_iter()
                .map(|w| -> Result<WineDir, Error> { Ok(WineDir { path: expand(w.path)?, ..w }) })
                .collect::<Result<_, Error>>()?;
        }
        if let Some(v) = p.user_mimeapps { self.user_mimeapps = expand(v)?; }
        if let Some(v) = p.local_mimeapps { self.local_mimeapps = expand(v)?; }
        if let Some(v) = p.backup_dir { self.backup_dir = expand(v)?; }
        if let Some(v) = p.mime_database { self.mime_database = expand(v)?; }
        if let Some(refresh) = file.refresh { self.refresh = refresh; }
        Ok(())
    }

    /// Launcher directories in lookup order: user, wine, then system.
    pub fn source_dirs(&self) -> Vec<SourceDir> {
        let mut dirs = vec![SourceDir {
            path: self.user_applications.clone(),
            origin: Origin::User,
            recursive: false,
            writable: true,
        }];
        dirs.extend(self.wine.iter().map(|w| SourceDir {
            path: w.path.clone(),
            origin: Origin::WineGenerated,
            recursive: w.recursive,
            writable: w.writable,
        }));
        dirs.extend(self.system_applications.iter().map(|p| SourceDir {
            path: p.clone(),
            origin: Origin::System,
            recursive: false,
            writable: false,
        }));
        dirs
    }

    pub fn association_lists(&self) -> Vec<PathBuf> {
        vec![self.user_mimeapps.clone(), self.local_mimeapps.clone()]
    }
}

fn expand_home(raw: &Path, home: &Path) -> Result<PathBuf, Error> {
    let path = match raw.strip_prefix("~") {
        Ok(rest) => home.join(rest),
        Err(_) => raw.to_path_buf(),
    };
    if path.is_relative() {
        return Err(Error::Config(format!("{} is not an absolute path", raw.display())));
    }
    Ok(path)
}

pub fn parse_config(content: &str, home: &Path, data_dir: &Path) -> Result<Config, Error> {
    let file: ConfigFile = toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
    let mut config = Config::new(home, data_dir);
    config.apply_file(file, home)?;
    Ok(config)
}

/// Resolve the home directory and read `config.toml` (or `explicit`) if present.
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let base = BaseDirs::new().context("cannot determine the home directory")?;
    let home = base.home_dir();
    let data_dir = base.data_dir();

    let config_path = match explicit {
        Some(path) => path.to_path_buf(),
        None => match ProjectDirs::from("org", "launcher-dedup", "launcher-dedup") {
            Some(dirs) => dirs.config_dir().join("config.toml"),
            None => PathBuf::from("config.toml"),
        },
    };

    if !config_path.exists() {
        if explicit.is_some() {
            anyhow::bail!("config file {:?} does not exist", config_path);
        }
        return Ok(Config::new(home, data_dir));
    }

    let content = fs::read_to_string(&config_path)
        .with_context(|| format!("failed to read {:?}", config_path))?;
    let config = parse_config(&content, home, data_dir)?;
    Ok(config)
}
