use crate::config::SourceDir;
use crate::error::Error;
use crate::fs::FileSystem;
use crate::model::{Entry, Origin};
use crate::sources::{Scan, ScanIssue, Source};
use log::{debug, info, warn};
use regex::Regex;
use std::ffi::OsStr;
use std::path::Path;
use std::sync::LazyLock;

const MAIN_GROUP: &str = "Desktop Entry";

static WINE_HANDLER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^wine-(extension|protocol)-(.+)\.desktop$").expect("static regex")
});

/// `wine-extension-zip.desktop` -> `("extension", "zip")`.
pub fn wine_handler(file_name: &str) -> Option<(String, String)> {
    WINE_HANDLER
        .captures(file_name)
        .map(|c| (c[1].to_string(), c[2].to_lowercase()))
}

/// One physical line of a desktop entry file. Everything is kept, including
/// keys this tool does not understand, so a file renders back unchanged.
#[derive(Debug, Clone, PartialEq)]
pub enum Line {
    Blank,
    Comment(String),
    Group(String),
    Pair { key: String, value: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct DesktopFile {
    lines: Vec<Line>,
    final_newline: bool,
}

impl DesktopFile {
    pub fn parse(content: &str) -> Result<Self, String> {
        let mut lines = Vec::new();
        let mut has_main_group = false;

        for (n, raw) in content.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() {
                lines.push(Line::Blank);
            } else if line.starts_with('#') {
                lines.push(Line::Comment(line.to_string()));
            } else if line.starts_with('[') && line.ends_with(']') {
                let group = &line[1..line.len() - 1];
                if group == MAIN_GROUP {
                    has_main_group = true;
                }
                lines.push(Line::Group(group.to_string()));
            } else if let Some((key, value)) = line.split_once('=') {
                let key = key.trim();
                if key.is_empty() {
                    return Err(format!("line {}: empty key", n + 1));
                }
                lines.push(Line::Pair { key: key.to_string(), value: value.trim().to_string() });
            } else {
                return Err(format!("line {}: unrecognized line {:?}", n + 1, line));
            }
        }

        if !has_main_group {
            return Err(format!("missing [{}] group", MAIN_GROUP));
        }
        let file = Self { lines, final_newline: content.ends_with('\n') };
        if file.get("Name").is_none() {
            return Err("missing Name key".to_string());
        }
        Ok(file)
    }

    /// Minimal record that hides the entry it shadows.
    pub fn hidden_override(name: &str, shadows: &Path) -> Self {
        Self {
            lines: vec![
                Line::Comment(format!("# Hides duplicate {}", shadows.display())),
                Line::Group(MAIN_GROUP.to_string()),
                Line::Pair { key: "Type".into(), value: "Application".into() },
                Line::Pair { key: "Name".into(), value: name.to_string() },
                Line::Pair { key: "Hidden".into(), value: "true".into() },
            ],
            final_newline: true,
        }
    }

    /// First value of `key` inside the `[Desktop Entry]` group.
    pub fn get(&self, key: &str) -> Option<&str> {
        let mut in_main = false;
        for line in &self.lines {
            match line {
                Line::Group(g) => in_main = g == MAIN_GROUP,
                Line::Pair { key: k, value } if in_main && k == key => return Some(value),
                _ => {}
            }
        }
        None
    }

    pub fn flag(&self, key: &str) -> bool {
        self.get(key).is_some_and(|v| v.eq_ignore_ascii_case("true"))
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            match line {
                Line::Blank => {}
                Line::Comment(c) => out.push_str(c),
                Line::Group(g) => {
                    out.push('[');
                    out.push_str(g);
                    out.push(']');
                }
                Line::Pair { key, value } => {
                    out.push_str(key);
                    out.push('=');
                    out.push_str(value);
                }
            }
            out.push('\n');
        }
        if !self.final_newline {
            out.pop();
        }
        out
    }
}

pub struct DesktopSource {
    pub dir: SourceDir,
    pub rank: usize,
}

impl DesktopSource {
    /// Ids are relative to the enclosing `applications` directory, so
    /// `applications/wine/Programs/Tool.desktop` is `wine-Programs-Tool.desktop`.
    fn desktop_id(&self, path: &Path) -> String {
        let root = self
            .dir
            .path
            .ancestors()
            .find(|p| p.file_name() == Some(OsStr::new("applications")))
            .unwrap_or(self.dir.path.as_path());
        let relative = path.strip_prefix(root).unwrap_or(path);
        relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("-")
    }
}

impl Source for DesktopSource {
    fn scan(&self, fs: &dyn FileSystem) -> Result<Scan, Error> {
        let mut scan = Scan::default();
        let dir = &self.dir.path;

        if !fs.exists(dir) {
            debug!("Launcher directory {:?} does not exist, skipping", dir);
            return Ok(scan);
        }

        debug!("Scanning desktop files in {:?}", dir);
        let files = fs.list(dir, self.dir.recursive).map_err(|e| Error::io(dir, e))?;
        for path in files {
            if path.extension().and_then(|s| s.to_str()) != Some("desktop") {
                continue;
            }
            let content = match fs.read_to_string(&path) {
                Ok(content) => content,
                Err(e) => {
                    let err = Error::io(&path, e);
                    warn!("Cannot read launcher: {}", err);
                    scan.issues.push(ScanIssue::new(&path, &err));
                    continue;
                }
            };
            let record = match DesktopFile::parse(&content) {
                Ok(record) => record,
                Err(reason) => {
                    let err = Error::parse(&path, reason);
                    warn!("Skipping launcher: {}", err);
                    scan.issues.push(ScanIssue::new(&path, &err));
                    continue;
                }
            };

            let file_name = path.file_name().and_then(|s| s.to_str()).unwrap_or_default();
            let origin = if self.dir.origin == Origin::User && wine_handler(file_name).is_some() {
                Origin::WineGenerated
            } else {
                self.dir.origin
            };
            scan.entries.push(Entry {
                id: self.desktop_id(&path),
                origin,
                writable: self.dir.origin != Origin::System && self.dir.writable,
                rank: self.rank,
                record,
                path,
            });
        }

        info!("{:?}: found {} entries", dir, scan.entries.len());
        Ok(scan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::fs::MemFs;
    use std::path::PathBuf;

    const VIEWER: &str = "[Desktop Entry]\n\
        # vendor comment\n\
        Type=Application\n\
        Name=Viewer\n\
        Name[de]=Betrachter\n\
        Exec=/usr/bin/viewer %U\n\
        MimeType=application/pdf;image/png;\n\
        X-Vendor-Flag=42\n\
        \n\
        [Desktop Action new-window]\n\
        Name=New Window\n\
        Exec=viewer --new\n";

    fn source(path: &str, origin: Origin, recursive: bool) -> DesktopSource {
        DesktopSource {
            dir: SourceDir { path: PathBuf::from(path), origin, recursive, writable: true },
            rank: 0,
        }
    }

    #[test]
    fn parse_reads_main_group_only() {
        let file = DesktopFile::parse(VIEWER).unwrap();
        assert_eq!(file.get("Name"), Some("Viewer"));
        assert_eq!(file.get("Exec"), Some("/usr/bin/viewer %U"));
        assert_eq!(file.get("X-Vendor-Flag"), Some("42"));
        assert!(!file.flag("Hidden"));
    }

    #[test]
    fn render_preserves_unknown_keys_and_groups() {
        let file = DesktopFile::parse(VIEWER).unwrap();
        assert_eq!(file.render(), VIEWER);
    }

    #[test]
    fn render_keeps_a_missing_final_newline() {
        let content = "[Desktop Entry]\nType=Application\nName=Viewer";
        assert_eq!(DesktopFile::parse(content).unwrap().render(), content);
    }

    #[test]
    fn parse_rejects_malformed_files() {
        assert!(DesktopFile::parse("Name=Foo\nExec=foo\n").is_err());
        assert!(DesktopFile::parse("[Desktop Entry]\nName=Foo\nthis is not a pair\n").is_err());
        assert!(DesktopFile::parse("[Desktop Entry]\nExec=foo\n").is_err());
    }

    #[test]
    fn hidden_override_is_minimal() {
        let file = DesktopFile::hidden_override("Viewer", Path::new("/usr/share/applications/viewer.desktop"));
        let reparsed = DesktopFile::parse(&file.render()).unwrap();
        assert!(reparsed.flag("Hidden"));
        assert_eq!(reparsed.get("Name"), Some("Viewer"));
        assert_eq!(reparsed.get("Exec"), None);
    }

    #[test]
    fn wine_handler_names() {
        assert_eq!(
            wine_handler("wine-extension-ZIP.desktop"),
            Some(("extension".to_string(), "zip".to_string()))
        );
        assert_eq!(
            wine_handler("wine-protocol-ms-settings.desktop"),
            Some(("protocol".to_string(), "ms-settings".to_string()))
        );
        assert_eq!(wine_handler("winecfg.desktop"), None);
    }

    #[test]
    fn scan_skips_bad_files_and_tags_wine_entries() {
        let fs = MemFs::new();
        fs.add("/home/u/apps/viewer.desktop", VIEWER);
        fs.add("/home/u/apps/broken.desktop", "garbage\n");
        fs.add("/home/u/apps/notes.txt", "not a launcher");
        fs.add("/home/u/apps/sub/nested.desktop", VIEWER);
        fs.add(
            "/home/u/apps/wine-extension-zip.desktop",
            "[Desktop Entry]\nType=Application\nName=7-Zip\nExec=wine 7z.exe\nMimeType=application/zip;\n",
        );

        let scan = source("/home/u/apps", Origin::User, false).scan(&fs).unwrap();
        assert_eq!(scan.entries.len(), 2);
        assert_eq!(scan.issues.len(), 1);
        assert_eq!(scan.issues[0].kind, ErrorKind::Parse);

        let wine = scan.entries.iter().find(|e| e.id == "wine-extension-zip.desktop").unwrap();
        assert_eq!(wine.origin, Origin::WineGenerated);
        assert!(wine.writable);
    }

    #[test]
    fn recursive_scan_builds_ids_from_the_applications_root() {
        let fs = MemFs::new();
        fs.add("/home/u/.local/share/applications/wine/Programs/Game.desktop", VIEWER);
        fs.add("/opt/menus/Programs/Game.desktop", VIEWER);

        let wine = source("/home/u/.local/share/applications/wine", Origin::WineGenerated, true);
        assert_eq!(wine.scan(&fs).unwrap().entries[0].id, "wine-Programs-Game.desktop");

        let outside = source("/opt/menus", Origin::WineGenerated, true);
        assert_eq!(outside.scan(&fs).unwrap().entries[0].id, "Programs-Game.desktop");
    }

    #[test]
    fn system_entries_are_never_writable() {
        let fs = MemFs::new();
        fs.add("/usr/share/applications/viewer.desktop", VIEWER);

        let scan = source("/usr/share/applications", Origin::System, false).scan(&fs).unwrap();
        assert!(!scan.entries[0].writable);
    }

    #[test]
    fn missing_directory_is_empty() {
        let fs = MemFs::new();
        let scan = source("/nowhere", Origin::User, false).scan(&fs).unwrap();
        assert!(scan.entries.is_empty());
    }
}
