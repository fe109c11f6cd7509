//! `mimeapps.list` association lists.
//!
//! Each line is kept as parsed so a rewrite only changes the mappings that
//! actually lost a repeated application id.

use crate::error::Error;
use crate::fs::FileSystem;
use crate::sources::ScanIssue;
use log::{debug, warn};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq)]
pub enum AssocLine {
    Blank,
    Comment(String),
    Section(String),
    Mapping {
        mime: String,
        apps: Vec<String>,
        /// Whether the list ended with `;` on disk.
        trailing: bool,
        raw: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssociationList {
    pub path: PathBuf,
    lines: Vec<AssocLine>,
    final_newline: bool,
}

impl AssociationList {
    pub fn parse(path: &Path, content: &str) -> Result<Self, String> {
        let mut lines = Vec::new();
        for (n, raw) in content.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() {
                lines.push(AssocLine::Blank);
            } else if line.starts_with('#') {
                lines.push(AssocLine::Comment(raw.to_string()));
            } else if line.starts_with('[') && line.ends_with(']') {
                lines.push(AssocLine::Section(line[1..line.len() - 1].to_string()));
            } else if let Some((mime, value)) = line.split_once('=') {
                let mime = mime.trim();
                if mime.is_empty() {
                    return Err(format!("line {}: empty mimetype", n + 1));
                }
                lines.push(AssocLine::Mapping {
                    mime: mime.to_string(),
                    apps: value
                        .split(';')
                        .map(str::trim)
                        .filter(|a| !a.is_empty())
                        .map(String::from)
                        .collect(),
                    trailing: value.trim_end().ends_with(';'),
                    raw: raw.to_string(),
                });
            } else {
                return Err(format!("line {}: unrecognized line {:?}", n + 1, line));
            }
        }
        Ok(Self { path: path.to_path_buf(), lines, final_newline: content.ends_with('\n') })
    }

    /// `(section, mimetype, application ids)` for every mapping, in file order.
    #[cfg(test)]
    pub fn mappings(&self) -> Vec<(&str, &str, &[String])> {
        let mut section = "";
        let mut out = Vec::new();
        for line in &self.lines {
            match line {
                AssocLine::Section(s) => section = s,
                AssocLine::Mapping { mime, apps, .. } => out.push((section, mime.as_str(), apps.as_slice())),
                _ => {}
            }
        }
        out
    }

    /// Copy with repeated ids removed from every mapping, keeping the first
    /// occurrence. Also returns how many ids were dropped.
    pub fn deduplicated(&self) -> (Self, usize) {
        let mut removed = 0;
        let lines = self
            .lines
            .iter()
            .map(|line| match line {
                AssocLine::Mapping { mime, apps, trailing, raw } => {
                    let mut seen = HashSet::new();
                    let unique: Vec<String> =
                        apps.iter().filter(|a| seen.insert(a.as_str())).cloned().collect();
                    if unique.len() == apps.len() {
                        return line.clone();
                    }
                    removed += apps.len() - unique.len();
                    let mut value = unique.join(";");
                    if *trailing {
                        value.push(';');
                    }
                    debug!("{}: {} -> {}", mime, raw.trim(), value);
                    AssocLine::Mapping {
                        raw: format!("{}={}", mime, value),
                        mime: mime.clone(),
                        apps: unique,
                        trailing: *trailing,
                    }
                }
                other => other.clone(),
            })
            .collect();
        (Self { path: self.path.clone(), lines, final_newline: self.final_newline }, removed)
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            match line {
                AssocLine::Blank => {}
                AssocLine::Comment(c) => out.push_str(c),
                AssocLine::Section(s) => {
                    out.push('[');
                    out.push_str(s);
                    out.push(']');
                }
                AssocLine::Mapping { raw, .. } => out.push_str(raw),
            }
            out.push('\n');
        }
        if !self.final_newline {
            out.pop();
        }
        out
    }
}

/// Read every existing association list. Unreadable or malformed files are
/// reported and left out.
pub fn load_lists(paths: &[PathBuf], fs: &dyn FileSystem) -> (Vec<AssociationList>, Vec<ScanIssue>) {
    let mut lists = Vec::new();
    let mut issues = Vec::new();

    for path in paths {
        if !fs.exists(path) {
            debug!("Association list {:?} does not exist, skipping", path);
            continue;
        }
        let content = match fs.read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                let err = Error::io(path, e);
                warn!("Cannot read association list: {}", err);
                issues.push(ScanIssue::new(path, &err));
                continue;
            }
        };
        match AssociationList::parse(path, &content) {
            Ok(list) => lists.push(list),
            Err(reason) => {
                let err = Error::parse(path, reason);
                warn!("Skipping association list: {}", err);
                issues.push(ScanIssue::new(path, &err));
            }
        }
    }
    (lists, issues)
}
