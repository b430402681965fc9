//! Chunk timing monitor
//!
//! Records when each paced chunk left the throttle and how large it was, and
//! dumps the series as JSON when the stream ends. Useful for checking the
//! pacing against the nominal bitrate offline.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::error::Result;

/// One emitted chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChunkSample {
    /// Milliseconds since the monitor started
    pub time: u64,
    pub size: usize,
}

/// Recorder for emitted chunk timing
pub struct ChunkMonitor {
    output_path: PathBuf,
    started_at: Instant,
    samples: Vec<ChunkSample>,
}

impl ChunkMonitor {
    pub fn new(output_path: impl Into<PathBuf>) -> Self {
        Self {
            output_path: output_path.into(),
            started_at: Instant::now(),
            samples: Vec::new(),
        }
    }

    pub fn record(&mut self, size: usize) {
        self.samples.push(ChunkSample {
            time: self.started_at.elapsed().as_millis() as u64,
            size,
        });
    }

    pub fn samples(&self) -> &[ChunkSample] {
        &self.samples
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Write all samples as a JSON array
    pub fn write_results(&self) -> Result<()> {
        let json = serde_json::to_vec(&self.samples)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(&self.output_path, json)?;
        tracing::info!(
            "Stream ended. {} chunk samples written to {}",
            self.samples.len(),
            self.output_path.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monitor_writes_json() {
        let path = std::env::temp_dir().join(format!("radio-monitor-{}.json", uuid::Uuid::new_v4()));
        let mut monitor = ChunkMonitor::new(&path);
        monitor.record(2508);
        monitor.record(17);
        monitor.write_results().unwrap();

        let written: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        let entries = written.as_array().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["size"], 2508);
        assert_eq!(entries[1]["size"], 17);
        assert!(entries[0]["time"].as_u64().is_some());

        let _ = std::fs::remove_file(path);
    }
}
