use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const SCHEMA_ID: &str = "dashcapture.export_report";
pub const SCHEMA_VERSION: &str = "1";

/// Outcome of one requested section, in request order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionSummary {
    pub section_id: String,
    pub succeeded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy_used: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_ratio: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_message: Option<String>,
    pub attempts: usize,
    /// 1-based page the section landed on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_number: Option<usize>,
}

impl SectionSummary {
    pub fn succeeded(section_id: impl Into<String>, strategy: impl Into<String>) -> Self {
        Self {
            section_id: section_id.into(),
            succeeded: true,
            strategy_used: Some(strategy.into()),
            content_ratio: None,
            failure_code: None,
            failure_message: None,
            attempts: 0,
            page_number: None,
        }
    }

    pub fn failed(
        section_id: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            section_id: section_id.into(),
            succeeded: false,
            strategy_used: None,
            content_ratio: None,
            failure_code: Some(code.into()),
            failure_message: Some(message.into()),
            attempts: 0,
            page_number: None,
        }
    }
}

/// One placed block, in milli-points, as fed to the fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlacementRecord<'a> {
    pub section_id: &'a str,
    pub page_number: usize,
    pub x_milli: i64,
    pub y_milli: i64,
    pub width_milli: i64,
    pub height_milli: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportJobReport {
    pub schema: String,
    pub version: String,
    pub output_name: String,
    pub title: String,
    pub total_sections: usize,
    pub succeeded_sections: usize,
    pub failed_section_ids: Vec<String>,
    pub page_count: usize,
    pub cancelled: bool,
    pub sections: Vec<SectionSummary>,
    pub layout_fingerprint: String,
    pub generated_at: String,
}

impl ExportJobReport {
    /// Derives the counts from `sections`, so they always agree with it.
    pub fn new(
        output_name: impl Into<String>,
        title: impl Into<String>,
        sections: Vec<SectionSummary>,
        page_count: usize,
        cancelled: bool,
        layout_fingerprint: impl Into<String>,
        generated_at: impl Into<String>,
    ) -> Self {
        let failed_section_ids = sections
            .iter()
            .filter(|s| !s.succeeded)
            .map(|s| s.section_id.clone())
            .collect::<Vec<_>>();
        Self {
            schema: SCHEMA_ID.to_string(),
            version: SCHEMA_VERSION.to_string(),
            output_name: output_name.into(),
            title: title.into(),
            total_sections: sections.len(),
            succeeded_sections: sections.len() - failed_section_ids.len(),
            failed_section_ids,
            page_count,
            cancelled,
            sections,
            layout_fingerprint: layout_fingerprint.into(),
            generated_at: generated_at.into(),
        }
    }

    pub fn failed_sections(&self) -> usize {
        self.failed_section_ids.len()
    }

    /// `N of M sections included`.
    pub fn summary_line(&self) -> String {
        format!(
            "{} of {} sections included",
            self.succeeded_sections, self.total_sections
        )
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

fn hex_sha256(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest {
        use std::fmt::Write;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// Stable digest of where every block landed. Any change in order, page or
/// geometry changes it.
pub fn layout_fingerprint_sha256(page_count: usize, placements: &[PlacementRecord<'_>]) -> String {
    let mut canonical = format!("{SCHEMA_ID}\n{SCHEMA_VERSION}\npages={page_count}\n");
    for p in placements {
        canonical.push_str(&format!(
            "{}|{}|{}|{}|{}|{}\n",
            p.section_id, p.page_number, p.x_milli, p.y_milli, p.width_milli, p.height_milli
        ));
    }
    hex_sha256(canonical.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn placements() -> Vec<PlacementRecord<'static>> {
        vec![
            PlacementRecord {
                section_id: "kpi",
                page_number: 1,
                x_milli: 42_520,
                y_milli: 160_000,
                width_milli: 510_240,
                height_milli: 127_560,
            },
            PlacementRecord {
                section_id: "costs",
                page_number: 2,
                x_milli: 42_520,
                y_milli: 90_000,
                width_milli: 510_240,
                height_milli: 300_000,
            },
        ]
    }

    fn report() -> ExportJobReport {
        let mut ok = SectionSummary::succeeded("kpi", "full-fidelity");
        ok.attempts = 1;
        ok.page_number = Some(1);
        let mut failed = SectionSummary::failed("ghost", "SECTION_NOT_FOUND", "section not found");
        failed.attempts = 0;
        ExportJobReport::new(
            "GCINFRA_360_Overview_2024-04-10.pdf",
            "Overview",
            vec![ok, failed],
            1,
            false,
            layout_fingerprint_sha256(1, &placements()),
            "2024-04-10T16:20:00",
        )
    }

    #[test]
    fn counts_follow_sections() {
        let report = report();
        assert_eq!(report.total_sections, 2);
        assert_eq!(report.succeeded_sections, 1);
        assert_eq!(report.failed_section_ids, vec!["ghost".to_string()]);
        assert_eq!(report.failed_sections(), 1);
        assert_eq!(report.summary_line(), "1 of 2 sections included");
        assert_eq!(report.schema, SCHEMA_ID);
    }

    #[test]
    fn json_round_trips() {
        let report = report();
        let raw = report.to_json_pretty().unwrap();
        assert!(raw.contains("\"schema\": \"dashcapture.export_report\""));
        assert!(!raw.contains("failure_code\": null"));
        let parsed = ExportJobReport::from_json_str(&raw).unwrap();
        assert_eq!(parsed, report);
    }

    #[test]
    fn fingerprint_is_stable_and_order_sensitive() {
        let a = layout_fingerprint_sha256(2, &placements());
        let b = layout_fingerprint_sha256(2, &placements());
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);

        let mut swapped = placements();
        swapped.swap(0, 1);
        assert_ne!(a, layout_fingerprint_sha256(2, &swapped));
        assert_ne!(a, layout_fingerprint_sha256(3, &placements()));
    }
}
