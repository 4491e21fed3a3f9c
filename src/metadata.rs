use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn format(&self, date_format: &str) -> String {
        format!(
            "{} – {}",
            self.start.format(date_format),
            self.end.format(date_format)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Text(String),
    List(Vec<String>),
    Range { start: String, end: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterEntry {
    pub label: String,
    pub value: FilterValue,
}

impl FilterEntry {
    pub fn text(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: FilterValue::Text(value.into()),
        }
    }

    pub fn list(label: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            label: label.into(),
            value: FilterValue::List(values),
        }
    }

    /// Rendered value, or `None` when the filter is empty or a wildcard.
    pub fn display_value(&self, wildcards: &[String]) -> Option<String> {
        let keep = |v: &str| {
            let v = v.trim();
            !v.is_empty() && !wildcards.iter().any(|w| w.eq_ignore_ascii_case(v))
        };
        match &self.value {
            FilterValue::Text(v) => keep(v.as_str()).then(|| v.trim().to_string()),
            FilterValue::List(values) => {
                let kept: Vec<&str> = values
                    .iter()
                    .map(|v| v.trim())
                    .filter(|v| keep(*v))
                    .collect();
                (!kept.is_empty()).then(|| kept.join(", "))
            }
            FilterValue::Range { start, end } => {
                let (start, end) = (start.trim(), end.trim());
                match (start.is_empty(), end.is_empty()) {
                    (true, true) => None,
                    _ => Some(format!("{start} – {end}")),
                }
            }
        }
    }
}

/// Optional context printed in the page-1 header.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportMetadata {
    pub subtitle: Option<String>,
    pub company: Option<String>,
    pub date_range: Option<DateRange>,
    pub filters: Vec<FilterEntry>,
}

impl ExportMetadata {
    /// `• label: value` lines for the filters that actually narrow the data.
    pub fn filter_lines(&self, wildcards: &[String]) -> Vec<String> {
        self.filters
            .iter()
            .filter_map(|f| {
                let value = f.display_value(wildcards)?;
                Some(format!("• {}: {}", f.label.trim(), value))
            })
            .collect()
    }
}
