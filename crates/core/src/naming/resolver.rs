//! Filename resolver implementation.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::debug;

use super::NamingError;
use crate::job::JobId;

/// Most filesystems cap file names at 255 bytes.
const MAX_NAME_BYTES: usize = 255;

/// Characters rejected by at least one common target filesystem.
const ILLEGAL_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Interior state of the resolver, guarded by a single mutex.
///
/// `issued` is the authoritative record of every file name handed out (or
/// found on disk at startup). `counters` is a per-title hint so repeated
/// collisions do not rescan from `_1` every time.
#[derive(Debug, Default)]
struct NameRecord {
    issued: HashSet<String>,
    counters: HashMap<String, u32>,
}

/// Resolves desired titles to collision-free paths in the output directory.
///
/// Resolution is intentionally not idempotent: resolving the same title
/// twice yields two distinct paths, never an overwrite. A name, once
/// issued, is retired forever; cancellation does not return it to the
/// pool.
#[derive(Debug)]
pub struct FilenameResolver {
    output_dir: PathBuf,
    extension: String,
    record: Mutex<NameRecord>,
}

impl FilenameResolver {
    /// Creates a resolver issuing names under `output_dir` with the given
    /// extension (without the leading dot).
    pub fn new(output_dir: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            output_dir: output_dir.into(),
            extension: extension.into(),
            record: Mutex::new(NameRecord::default()),
        }
    }

    /// Seeds the issued-name record from the existing contents of the
    /// output directory. Returns the number of names recorded.
    ///
    /// Called once at startup, before any job runs; a missing directory is
    /// treated as empty.
    pub fn seed_from_dir(&self) -> std::io::Result<usize> {
        let entries = match std::fs::read_dir(&self.output_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };

        let mut record = self.record.lock().expect("name record poisoned");
        let mut seeded = 0;
        for entry in entries {
            let entry = entry?;
            if let Some(name) = entry.file_name().to_str() {
                if record.issued.insert(name.to_string()) {
                    seeded += 1;
                }
            }
        }
        debug!(seeded, dir = %self.output_dir.display(), "seeded filename record");
        Ok(seeded)
    }

    /// Resolves a title to an unissued path and records it atomically.
    ///
    /// The chosen name is recorded before returning, so concurrent
    /// resolutions of the same title always receive distinct paths.
    pub fn resolve(&self, title: &str, job_id: JobId) -> Result<PathBuf, NamingError> {
        let mut base = sanitize_title(title);
        if base.is_empty() {
            base = format!("untitled_{}", job_id);
        }

        let mut record = self.record.lock().expect("name record poisoned");

        let candidate = format!("{}.{}", base, self.extension);
        let name = if record.issued.contains(&candidate) {
            let mut counter = record.counters.get(&base).copied().unwrap_or(0);
            let suffixed = loop {
                counter += 1;
                let suffixed = format!("{}_{}.{}", base, counter, self.extension);
                if !record.issued.contains(&suffixed) {
                    break suffixed;
                }
            };
            record.counters.insert(base.clone(), counter);
            suffixed
        } else {
            candidate
        };

        if name.len() > MAX_NAME_BYTES {
            return Err(NamingError::FilesystemRejected {
                reason: format!("name is {} bytes, limit is {}", name.len(), MAX_NAME_BYTES),
            });
        }

        record.issued.insert(name.clone());
        Ok(self.output_dir.join(name))
    }

    /// Whether a file name has already been issued or observed on disk.
    pub fn is_issued(&self, name: &str) -> bool {
        self.record
            .lock()
            .expect("name record poisoned")
            .issued
            .contains(name)
    }

    /// Number of names in the record.
    pub fn issued_count(&self) -> usize {
        self.record.lock().expect("name record poisoned").issued.len()
    }

    /// The output directory names are issued under.
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

/// Strips illegal and control characters and normalizes whitespace while
/// preserving all other Unicode code points.
fn sanitize_title(title: &str) -> String {
    let stripped: String = title
        .chars()
        .filter(|c| !ILLEGAL_CHARS.contains(c) && !c.is_control())
        .collect();

    // Collapse internal whitespace runs to a single space.
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file_name(path: &Path) -> &str {
        path.file_name().unwrap().to_str().unwrap()
    }

    #[test]
    fn test_sanitize_strips_illegal_chars() {
        assert_eq!(sanitize_title(r#"a<b>c:d"e/f\g|h?i*j"#), "abcdefghij");
    }

    #[test]
    fn test_sanitize_preserves_unicode() {
        assert_eq!(sanitize_title("日本語タイトル"), "日本語タイトル");
        assert_eq!(sanitize_title("Füße & Bücher"), "Füße & Bücher");
    }

    #[test]
    fn test_sanitize_collapses_whitespace() {
        assert_eq!(sanitize_title("  too   many\tspaces  "), "too many spaces");
    }

    #[test]
    fn test_sanitize_strips_control_chars() {
        assert_eq!(sanitize_title("ab\u{0007}cd\u{001b}"), "abcd");
    }

    #[test]
    fn test_resolve_simple() {
        let resolver = FilenameResolver::new("/out", "mp4");
        let path = resolver.resolve("My Video", JobId::new(1)).unwrap();
        assert_eq!(path, PathBuf::from("/out/My Video.mp4"));
        assert!(resolver.is_issued("My Video.mp4"));
    }

    #[test]
    fn test_resolve_same_title_twice_yields_distinct_paths() {
        let resolver = FilenameResolver::new("/out", "mp4");
        let first = resolver.resolve("日本語タイトル", JobId::new(1)).unwrap();
        let second = resolver.resolve("日本語タイトル", JobId::new(2)).unwrap();

        assert_eq!(file_name(&first), "日本語タイトル.mp4");
        assert_eq!(file_name(&second), "日本語タイトル_1.mp4");
        assert!(resolver.is_issued("日本語タイトル.mp4"));
        assert!(resolver.is_issued("日本語タイトル_1.mp4"));
    }

    #[test]
    fn test_resolve_counter_advances() {
        let resolver = FilenameResolver::new("/out", "mp4");
        for expected in ["t.mp4", "t_1.mp4", "t_2.mp4", "t_3.mp4"] {
            let path = resolver.resolve("t", JobId::new(1)).unwrap();
            assert_eq!(file_name(&path), expected);
        }
    }

    #[test]
    fn test_resolve_empty_title_uses_placeholder() {
        let resolver = FilenameResolver::new("/out", "mp4");
        let path = resolver.resolve("???***", JobId::new(42)).unwrap();
        assert_eq!(file_name(&path), "untitled_42.mp4");
    }

    #[test]
    fn test_resolve_rejects_oversized_name() {
        let resolver = FilenameResolver::new("/out", "mp4");
        let long_title = "x".repeat(300);
        let result = resolver.resolve(&long_title, JobId::new(1));
        assert!(matches!(
            result,
            Err(NamingError::FilesystemRejected { .. })
        ));
    }

    #[test]
    fn test_seed_from_dir() {
        let temp = tempfile::TempDir::new().unwrap();
        std::fs::write(temp.path().join("existing.mp4"), b"x").unwrap();
        std::fs::write(temp.path().join("existing_1.mp4"), b"x").unwrap();

        let resolver = FilenameResolver::new(temp.path(), "mp4");
        let seeded = resolver.seed_from_dir().unwrap();
        assert_eq!(seeded, 2);

        let path = resolver.resolve("existing", JobId::new(1)).unwrap();
        assert_eq!(file_name(&path), "existing_2.mp4");
    }

    #[test]
    fn test_seed_from_missing_dir_is_empty() {
        let resolver = FilenameResolver::new("/nonexistent/surely", "mp4");
        assert_eq!(resolver.seed_from_dir().unwrap(), 0);
    }

    #[test]
    fn test_concurrent_resolution_no_lost_update() {
        use std::sync::Arc;

        let resolver = Arc::new(FilenameResolver::new("/out", "mp4"));
        let mut handles = Vec::new();
        for i in 0..8 {
            let resolver = Arc::clone(&resolver);
            handles.push(std::thread::spawn(move || {
                resolver.resolve("same title", JobId::new(i)).unwrap()
            }));
        }

        let mut names: Vec<String> = handles
            .into_iter()
            .map(|h| file_name(&h.join().unwrap()).to_string())
            .collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 8);
        assert_eq!(resolver.issued_count(), 8);
    }
}
