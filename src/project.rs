//! Project directory layout.
//!
//! ```text
//! <projects_root>/<project_id>/
//!   config.json
//!   stats.json
//!   Videos/        raw .h264 segments, converted .mp4s, event clips
//!   logs/debug.log
//! ```

use std::path::{Path, PathBuf};

/// Rotate the debug log once it grows past this size.
pub const LOG_ROTATE_BYTES: u64 = 500_000;
/// Rotated logs kept as `debug.log.1` .. `debug.log.N`.
pub const LOG_BACKUPS: u32 = 2;

/// Paths of one project.
#[derive(Debug, Clone)]
pub struct Project {
    id: String,
    dir: PathBuf,
    models_dir: PathBuf,
}

impl Project {
    pub fn new(projects_root: &Path, models_dir: &Path, id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            dir: projects_root.join(&id),
            models_dir: models_dir.to_path_buf(),
            id,
        }
    }

    /// Resolve a project under the default data directories.
    pub fn with_defaults(id: impl Into<String>) -> Self {
        Self::new(&default_projects_root(), &default_models_dir(), id)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn config_path(&self) -> PathBuf {
        self.dir.join("config.json")
    }

    pub fn stats_path(&self) -> PathBuf {
        self.dir.join("stats.json")
    }

    pub fn video_dir(&self) -> PathBuf {
        self.dir.join("Videos")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.dir.join("logs")
    }

    pub fn log_path(&self) -> PathBuf {
        self.log_dir().join("debug.log")
    }

    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    /// A model file, as named in the config.
    pub fn model_path(&self, name: &str) -> PathBuf {
        self.models_dir.join(name)
    }

    /// Create the project, video and log directories.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(self.video_dir())?;
        std::fs::create_dir_all(self.log_dir())?;
        Ok(())
    }
}

/// Platform data directory for fieldcam.
fn data_root() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("fieldcam")
}

pub fn default_projects_root() -> PathBuf {
    data_root().join("projects")
}

pub fn default_models_dir() -> PathBuf {
    data_root().join("models")
}

/// Shift `path` to `path.1`, `path.1` to `path.2` and so on once it exceeds
/// `max_bytes`. The oldest backup beyond `backups` is dropped.
///
/// Returns whether a rotation happened.
pub fn rotate_log_file(path: &Path, max_bytes: u64, backups: u32) -> std::io::Result<bool> {
    let size = match std::fs::metadata(path) {
        Ok(meta) => meta.len(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };
    if size < max_bytes {
        return Ok(false);
    }

    let backup = |n: u32| {
        let mut name = path.as_os_str().to_owned();
        name.push(format!(".{n}"));
        PathBuf::from(name)
    };

    if backups == 0 {
        std::fs::remove_file(path)?;
        return Ok(true);
    }
    let oldest = backup(backups);
    if oldest.exists() {
        std::fs::remove_file(&oldest)?;
    }
    for n in (1..backups).rev() {
        let from = backup(n);
        if from.exists() {
            std::fs::rename(&from, backup(n + 1))?;
        }
    }
    std::fs::rename(path, backup(1))?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let project = Project::new(Path::new("/data/projects"), Path::new("/data/models"), "burrow-7");
        assert_eq!(project.dir(), Path::new("/data/projects/burrow-7"));
        assert_eq!(project.config_path(), Path::new("/data/projects/burrow-7/config.json"));
        assert_eq!(project.video_dir(), Path::new("/data/projects/burrow-7/Videos"));
        assert_eq!(project.log_path(), Path::new("/data/projects/burrow-7/logs/debug.log"));
        assert_eq!(project.model_path("roi.tflite"), Path::new("/data/models/roi.tflite"));
    }

    #[test]
    fn test_rotation_keeps_two_backups() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("debug.log");

        std::fs::write(&log, "small").unwrap();
        assert!(!rotate_log_file(&log, 100, 2).unwrap());

        for generation in ["first", "second", "third"] {
            std::fs::write(&log, generation.repeat(50)).unwrap();
            assert!(rotate_log_file(&log, 100, 2).unwrap());
        }

        assert!(!log.exists());
        let one = std::fs::read_to_string(dir.path().join("debug.log.1")).unwrap();
        let two = std::fs::read_to_string(dir.path().join("debug.log.2")).unwrap();
        assert!(one.starts_with("third"));
        assert!(two.starts_with("second"));
        assert!(!dir.path().join("debug.log.3").exists());
    }

    #[test]
    fn test_rotation_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!rotate_log_file(&dir.path().join("debug.log"), 1, 2).unwrap());
    }
}
