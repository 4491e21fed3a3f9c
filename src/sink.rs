use crate::error::ExportError;
use std::path::{Path, PathBuf};

/// Receives the finished artifact. Called once per job, as its last step.
pub trait ArtifactSink {
    fn deliver(&mut self, name: &str, bytes: &[u8]) -> Result<(), ExportError>;
}

/// Writes artifacts into a directory, creating it when missing.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
    last_written: Option<PathBuf>,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            last_written: None,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn last_written(&self) -> Option<&Path> {
        self.last_written.as_deref()
    }
}

impl ArtifactSink for DirectorySink {
    fn deliver(&mut self, name: &str, bytes: &[u8]) -> Result<(), ExportError> {
        if name.contains(['/', '\\']) || name.trim().is_empty() || name == ".." {
            return Err(ExportError::InvalidRequest(format!(
                "output name '{name}' must be a plain file name"
            )));
        }
        std::fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(name);
        std::fs::write(&path, bytes)?;
        log::info!("wrote {} ({} bytes)", path.display(), bytes.len());
        self.last_written = Some(path);
        Ok(())
    }
}

/// Keeps delivered artifacts in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    pub artifacts: Vec<(String, Vec<u8>)>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ArtifactSink for MemorySink {
    fn deliver(&mut self, name: &str, bytes: &[u8]) -> Result<(), ExportError> {
        self.artifacts.push((name.to_string(), bytes.to_vec()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_sink_creates_nested_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let mut sink = DirectorySink::new(tmp.path().join("out").join("reports"));
        sink.deliver("a.pdf", b"%PDF-1.7").unwrap();
        let written = sink.last_written().unwrap().to_path_buf();
        assert_eq!(std::fs::read(written).unwrap(), b"%PDF-1.7");
    }

    #[test]
    fn directory_sink_rejects_paths() {
        let tmp = tempfile::tempdir().unwrap();
        let mut sink = DirectorySink::new(tmp.path());
        let err = match sink.deliver("../escape.pdf", b"x") {
            Ok(_) => panic!("expected rejection"),
            Err(err) => err,
        };
        assert!(err.is_configuration_error());
    }

    #[test]
    fn memory_sink_collects_in_order() {
        let mut sink = MemorySink::new();
        sink.deliver("one.pdf", b"1").unwrap();
        sink.deliver("two.pdf", b"2").unwrap();
        let names: Vec<_> = sink.artifacts.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["one.pdf", "two.pdf"]);
    }
}
