//! Debug artifact bundle.
//!
//! When enabled, every prompt, raw response, and parsed artifact of a run
//! lands under `<project>/.loco/debug/quick/<timestamp>/`. Writes are
//! best-effort; a failed write never fails the pipeline.

use chrono::Utc;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::warn;

pub struct DebugWriter {
    dir: Option<PathBuf>,
}

impl DebugWriter {
    /// Create a writer rooted at a fresh timestamped bundle directory, or a
    /// no-op writer when debug is off.
    pub fn new(project_root: &Path, enabled: bool) -> Self {
        if !enabled {
            return Self { dir: None };
        }
        let stamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
        let dir = project_root
            .join(".loco")
            .join("debug")
            .join("quick")
            .join(stamp);
        if let Err(e) = std::fs::create_dir_all(&dir) {
            warn!("Failed to create debug directory {}: {e}", dir.display());
            return Self { dir: None };
        }
        Self { dir: Some(dir) }
    }

    pub fn disabled() -> Self {
        Self { dir: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.dir.is_some()
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// Write a text artifact into the bundle.
    pub fn write(&self, name: &str, contents: &str) {
        let Some(ref dir) = self.dir else { return };
        let path = dir.join(name);
        if let Err(e) = std::fs::write(&path, contents) {
            warn!("Failed to write debug artifact {}: {e}", path.display());
        }
    }

    /// Write a pretty-printed JSON artifact into the bundle.
    pub fn write_json<T: Serialize>(&self, name: &str, value: &T) {
        let Some(ref dir) = self.dir else { return };
        match serde_json::to_string_pretty(value) {
            Ok(json) => {
                let path = dir.join(name);
                if let Err(e) = std::fs::write(&path, json) {
                    warn!("Failed to write debug artifact {}: {e}", path.display());
                }
            }
            Err(e) => warn!("Failed to serialize debug artifact {name}: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn disabled_writer_is_silent() {
        let w = DebugWriter::disabled();
        assert!(!w.is_enabled());
        w.write("anything.txt", "ignored");
    }

    #[test]
    fn enabled_writer_creates_bundle_dir() {
        let dir = TempDir::new().unwrap();
        let w = DebugWriter::new(dir.path(), true);
        assert!(w.is_enabled());
        w.write("structure_hints.txt", "Top directories:\n");
        let bundle = w.dir().unwrap();
        assert!(bundle.starts_with(dir.path().join(".loco/debug/quick")));
        assert_eq!(
            std::fs::read_to_string(bundle.join("structure_hints.txt")).unwrap(),
            "Top directories:\n"
        );
    }

    #[test]
    fn write_json_round_trips() {
        let dir = TempDir::new().unwrap();
        let w = DebugWriter::new(dir.path(), true);
        w.write_json("adjudicated_ranking.json", &vec!["a", "b"]);
        let raw =
            std::fs::read_to_string(w.dir().unwrap().join("adjudicated_ranking.json")).unwrap();
        let parsed: Vec<String> = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed, vec!["a", "b"]);
    }
}
