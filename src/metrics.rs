use crate::orchestrator::SectionResult;
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SectionMetrics {
    pub section_id: String,
    pub succeeded: bool,
    pub strategy: Option<String>,
    pub attempts: usize,
    pub ready_wait_ms: f64,
    pub capture_ms: f64,
}

impl SectionMetrics {
    pub fn from_result(result: &SectionResult) -> Self {
        Self {
            section_id: result.section_id().to_string(),
            succeeded: result.succeeded(),
            strategy: result.strategy_used().map(str::to_string),
            attempts: result.attempts().len(),
            ready_wait_ms: millis(result.ready_wait()),
            capture_ms: millis(result.elapsed()),
        }
    }
}

/// Timings for one export job. Capture times follow the tokio clock, so they
/// read as simulated time under a paused runtime.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExportMetrics {
    pub sections: Vec<SectionMetrics>,
    pub capture_ms: f64,
    pub assemble_ms: f64,
    pub encode_ms: f64,
    pub total_bytes: usize,
    pub image_bytes: usize,
    pub page_count: usize,
}

impl ExportMetrics {
    pub fn total_attempts(&self) -> usize {
        self.sections.iter().map(|s| s.attempts).sum()
    }

    pub fn slowest_section(&self) -> Option<&SectionMetrics> {
        self.sections
            .iter()
            .max_by(|a, b| a.capture_ms.total_cmp(&b.capture_ms))
    }
}

pub(crate) fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}
