use crate::error::ExportError;
use crate::rasterizer::CaptureStrategy;
use crate::readiness::ReadinessConfig;
use crate::types::{Color, Margins, Pt, Size};
use crate::validator::ValidatorConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Page geometry and block layout, all in PDF points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageConfig {
    pub size: Size,
    pub margins: Margins,
    /// Space reserved at the bottom of every page for the stamped footer.
    pub footer_height: Pt,
    /// Height of the compact header on continuation pages.
    pub running_header_height: Pt,
    pub caption_height: Pt,
    pub caption_font_size: Pt,
    pub max_block_height: Pt,
    pub block_spacing: Pt,
    pub frame_images: bool,
}

impl Default for PageConfig {
    fn default() -> Self {
        Self {
            size: Size::a4(),
            margins: Margins::all_mm(15.0),
            footer_height: Pt::from_f32(30.0),
            running_header_height: Pt::from_f32(28.0),
            caption_height: Pt::from_f32(20.0),
            caption_font_size: Pt::from_f32(12.0),
            max_block_height: Pt::from_f32(520.0),
            block_spacing: Pt::from_f32(16.0),
            frame_images: true,
        }
    }
}

impl PageConfig {
    pub fn usable_width(&self) -> Pt {
        self.size.width - self.margins.left - self.margins.right
    }

    /// Lowest y a block may reach before the footer reserve.
    pub fn usable_bottom(&self) -> Pt {
        self.size.height - self.margins.bottom - self.footer_height
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatermarkConfig {
    pub text: String,
    pub color: Color,
    pub font_size: Pt,
    pub angle_degrees: f32,
}

impl Default for WatermarkConfig {
    fn default() -> Self {
        Self {
            text: "GCINFRA 360º".to_string(),
            color: Color::rgb8(235, 235, 235),
            font_size: Pt::from_f32(60.0),
            angle_degrees: 45.0,
        }
    }
}

/// Texts, colors and formats that brand the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrandingConfig {
    pub system_name: String,
    pub tagline: Option<String>,
    pub primary_color: Color,
    pub text_color: Color,
    pub muted_color: Color,
    pub footer_note: Option<String>,
    /// `{page}` and `{pages}` are substituted per page.
    pub page_label: String,
    pub generated_label: String,
    pub period_label: String,
    pub filters_label: String,
    /// chrono format for dates in the header (date range).
    pub date_format: String,
    /// chrono format for generation timestamps.
    pub timestamp_format: String,
    pub watermark: Option<WatermarkConfig>,
    /// Image path or data URI drawn left of the system name on page 1.
    pub logo: Option<String>,
    pub logo_height: Pt,
}

impl Default for BrandingConfig {
    fn default() -> Self {
        Self {
            system_name: "GCINFRA 360º".to_string(),
            tagline: Some("Hospital Infrastructure Maintenance".to_string()),
            primary_color: Color::rgb8(25, 118, 210),
            text_color: Color::rgb8(33, 33, 33),
            muted_color: Color::rgb8(117, 117, 117),
            footer_note: None,
            page_label: "Page {page} of {pages}".to_string(),
            generated_label: "Generated".to_string(),
            period_label: "Period".to_string(),
            filters_label: "Active filters".to_string(),
            date_format: "%d/%m/%Y".to_string(),
            timestamp_format: "%d/%m/%Y %H:%M".to_string(),
            watermark: None,
            logo: None,
            logo_height: Pt::from_f32(30.0),
        }
    }
}

fn default_overlay_markers() -> Vec<String> {
    [
        "MuiBackdrop-root",
        "MuiModal-backdrop",
        "MuiTooltip-popper",
        "MuiSelect-nativeInput",
        "recharts-tooltip-wrapper",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_chart_markers() -> Vec<String> {
    vec!["recharts-wrapper".to_string()]
}

fn default_filter_wildcards() -> Vec<String> {
    vec!["todos".to_string(), "all".to_string()]
}

/// Everything an export job can be tuned with. Missing JSON fields take
/// their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub page: PageConfig,
    pub readiness: ReadinessConfig,
    pub validator: ValidatorConfig,
    pub branding: BrandingConfig,
    pub strategies: Vec<CaptureStrategy>,
    pub overlay_markers: Vec<String>,
    pub chart_markers: Vec<String>,
    /// Filter values that mean "no filter" and are left out of the header.
    pub filter_wildcards: Vec<String>,
    pub background: Color,
    pub max_bitmap_pixels: u64,
    /// Re-parse the encoded PDF and check its page count before delivery.
    pub verify_output: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            page: PageConfig::default(),
            readiness: ReadinessConfig::default(),
            validator: ValidatorConfig::default(),
            branding: BrandingConfig::default(),
            strategies: CaptureStrategy::default_list(),
            overlay_markers: default_overlay_markers(),
            chart_markers: default_chart_markers(),
            filter_wildcards: default_filter_wildcards(),
            background: Color::WHITE,
            max_bitmap_pixels: 50_000_000,
            verify_output: true,
        }
    }
}

impl ExportConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, ExportError> {
        serde_json::from_str(raw)
            .map_err(|e| ExportError::InvalidConfiguration(format!("config json: {e}")))
    }

    pub fn from_json_path(path: impl AsRef<Path>) -> Result<Self, ExportError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ExportError> {
        let page = &self.page;
        if page.size.width <= Pt::ZERO || page.size.height <= Pt::ZERO {
            return Err(ExportError::InvalidConfiguration(
                "page size must be positive".to_string(),
            ));
        }
        let margins = [
            page.margins.top,
            page.margins.right,
            page.margins.bottom,
            page.margins.left,
        ];
        if margins.iter().any(|m| *m < Pt::ZERO) {
            return Err(ExportError::InvalidConfiguration(
                "margins must not be negative".to_string(),
            ));
        }
        if page.usable_width() <= Pt::ZERO {
            return Err(ExportError::InvalidConfiguration(format!(
                "margins leave no usable width on a {}pt wide page",
                page.size.width.to_f32()
            )));
        }
        if page.max_block_height <= Pt::ZERO || page.caption_height < Pt::ZERO {
            return Err(ExportError::InvalidConfiguration(
                "max_block_height must be positive and caption_height non-negative".to_string(),
            ));
        }
        // The tallest block must fit below the running header of a fresh page.
        let fresh_top = page.margins.top + page.running_header_height;
        let needed = fresh_top + page.caption_height + page.max_block_height;
        if needed > page.usable_bottom() {
            return Err(ExportError::InvalidConfiguration(format!(
                "max_block_height {}pt does not fit on a page (usable bottom {}pt, needs {}pt)",
                page.max_block_height.to_f32(),
                page.usable_bottom().to_f32(),
                needed.to_f32()
            )));
        }
        let logo_height = self.branding.logo_height;
        if logo_height <= Pt::ZERO || page.margins.top + logo_height > page.usable_bottom() {
            return Err(ExportError::InvalidConfiguration(format!(
                "logo_height {}pt must be positive and fit on a page",
                logo_height.to_f32()
            )));
        }
        if self.strategies.is_empty() {
            return Err(ExportError::InvalidConfiguration(
                "at least one capture strategy is required".to_string(),
            ));
        }
        for strategy in &self.strategies {
            if strategy.name.trim().is_empty() {
                return Err(ExportError::InvalidConfiguration(
                    "capture strategies need a name".to_string(),
                ));
            }
            if !(strategy.scale.is_finite() && strategy.scale > 0.0) {
                return Err(ExportError::InvalidConfiguration(format!(
                    "strategy '{}' has invalid scale {}",
                    strategy.name, strategy.scale
                )));
            }
        }
        let ratio = self.validator.min_content_ratio;
        if !(0.0..1.0).contains(&ratio) {
            return Err(ExportError::InvalidConfiguration(format!(
                "min_content_ratio must be in [0, 1), got {ratio}"
            )));
        }
        if self.validator.sample_window == 0 {
            return Err(ExportError::InvalidConfiguration(
                "sample_window must be positive".to_string(),
            ));
        }
        if self.max_bitmap_pixels == 0 {
            return Err(ExportError::InvalidConfiguration(
                "max_bitmap_pixels must be positive".to_string(),
            ));
        }
        if self.branding.system_name.trim().is_empty() {
            return Err(ExportError::InvalidConfiguration(
                "system_name must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
