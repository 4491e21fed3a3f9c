use crate::bitmap::Bitmap;
use crate::canvas::{Canvas, Document};
use crate::config::{BrandingConfig, ExportConfig};
use crate::error::ExportError;
use crate::metadata::ExportMetadata;
use crate::orchestrator::{SectionRequest, SectionResult};
use crate::scene::load_image;
use crate::stamp::{approx_text_width, stamp_pages};
use crate::trace::CaptureTrace;
use crate::types::{Color, Margins, Pt, Rect};
use chrono::NaiveDateTime;
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

const REGULAR_FONT: &str = "Helvetica";
const BOLD_FONT: &str = "Helvetica-Bold";
const LINE_HEIGHT_FACTOR: f32 = 1.35;
const LOGO_RESOURCE: &str = "branding:logo";
const FRAME_COLOR: Color = Color {
    r: 224.0 / 255.0,
    g: 224.0 / 255.0,
    b: 224.0 / 255.0,
    a: 1.0,
};

/// Caption for a section without a display title: `kpi-metrics` -> `Kpi Metrics`.
pub fn title_from_id(id: &str) -> String {
    id.split(['-', '_', ' '])
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Where the next block may go on the current page. `cursor_y` is measured
/// from the top edge.
#[derive(Debug, Clone, PartialEq)]
pub struct PageLayoutState {
    pub page_index: usize,
    pub cursor_y: Pt,
    pub page_width: Pt,
    pub page_height: Pt,
    pub margins: Margins,
    pub footer_height: Pt,
}

impl PageLayoutState {
    fn first(config: &ExportConfig) -> Self {
        let page = &config.page;
        Self {
            page_index: 0,
            cursor_y: page.margins.top,
            page_width: page.size.width,
            page_height: page.size.height,
            margins: page.margins,
            footer_height: page.footer_height,
        }
    }

    pub fn usable_bottom(&self) -> Pt {
        self.page_height - self.margins.bottom - self.footer_height
    }

    pub fn usable_width(&self) -> Pt {
        self.page_width - self.margins.left - self.margins.right
    }

    pub fn fits(&self, height: Pt) -> bool {
        self.cursor_y + height <= self.usable_bottom()
    }

    fn advance(&mut self, height: Pt) {
        self.cursor_y += height;
    }

    fn next_page(&mut self, header_height: Pt) {
        self.page_index += 1;
        self.cursor_y = self.margins.top + header_height;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectionPlacement {
    pub section_id: String,
    /// 1-based.
    pub page_number: usize,
    /// Image rectangle in top-left page coordinates.
    pub rect: Rect,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LayoutSummary {
    pub page_count: usize,
    pub placements: Vec<SectionPlacement>,
}

pub struct AssemblyInput<'a> {
    pub title: &'a str,
    pub sections: &'a [SectionRequest],
    pub results: &'a [SectionResult],
    pub metadata: &'a ExportMetadata,
    pub generated_at: NaiveDateTime,
}

#[derive(Debug, Clone)]
pub struct AssembledDocument {
    pub document: Document,
    pub layout: LayoutSummary,
}

pub struct DocumentAssembler<'a> {
    config: &'a ExportConfig,
    trace: Option<&'a CaptureTrace>,
}

impl<'a> DocumentAssembler<'a> {
    pub fn new(config: &'a ExportConfig, trace: Option<&'a CaptureTrace>) -> Self {
        Self { config, trace }
    }

    /// Lays out the succeeded results in request order, then stamps footers
    /// once the page count is final.
    pub fn assemble(&self, input: &AssemblyInput<'_>) -> Result<AssembledDocument, ExportError> {
        let mut layout = Layout {
            config: self.config,
            trace: self.trace,
            title: input.title,
            canvas: Canvas::new(self.config.page.size),
            state: PageLayoutState::first(self.config),
            indent: Pt::ZERO,
        };
        layout.header(input)?;

        let captions: HashMap<&str, &str> = input
            .sections
            .iter()
            .map(|s| (s.id.as_str(), s.display_title.as_str()))
            .collect();
        let mut placements = Vec::new();
        for result in input.results {
            let Some(bitmap) = result.shared_bitmap() else {
                continue;
            };
            let id = result.section_id();
            let caption = match captions.get(id).map(|c| c.trim()) {
                Some(c) if !c.is_empty() => c.to_string(),
                _ => title_from_id(id),
            };
            let (page_number, rect) = layout.block(id, &caption, bitmap)?;
            placements.push(SectionPlacement {
                section_id: id.to_string(),
                page_number,
                rect,
            });
        }

        let mut document = layout.canvas.finish();
        stamp_pages(
            &mut document,
            &self.config.page,
            &self.config.branding,
            input.generated_at,
        );
        let summary = LayoutSummary {
            page_count: document.pages.len(),
            placements,
        };
        log::debug!(
            "assembled {} blocks on {} pages",
            summary.placements.len(),
            summary.page_count
        );
        Ok(AssembledDocument {
            document,
            layout: summary,
        })
    }
}

struct Layout<'a> {
    config: &'a ExportConfig,
    trace: Option<&'a CaptureTrace>,
    title: &'a str,
    canvas: Canvas,
    state: PageLayoutState,
    /// Left offset for header lines set beside the logo.
    indent: Pt,
}

impl Layout<'_> {
    fn header(&mut self, input: &AssemblyInput<'_>) -> Result<(), ExportError> {
        let config = self.config;
        let branding = &config.branding;
        let text = branding.text_color;
        let muted = branding.muted_color;

        let header_top = self.state.cursor_y;
        let logo_bottom = match load_logo(branding) {
            Some(logo) => {
                let usable = self.state.usable_width();
                let mut height = branding.logo_height;
                let mut width = height.mul_ratio(logo.width(), logo.height());
                if width > usable / 3 {
                    width = usable / 3;
                    height = width.mul_ratio(logo.height(), logo.width());
                }
                self.canvas.register_image(LOGO_RESOURCE, logo);
                self.canvas
                    .draw_image(self.state.margins.left, header_top, width, height, LOGO_RESOURCE);
                self.indent = width + Pt::from_f32(8.0);
                Some(header_top + height + Pt::from_f32(4.0))
            }
            None => None,
        };
        self.text_line(&branding.system_name, BOLD_FONT, 20.0, branding.primary_color)?;
        if let Some(tagline) = non_blank(branding.tagline.as_deref()) {
            self.text_line(tagline, REGULAR_FONT, 10.0, muted)?;
        }
        if let Some(bottom) = logo_bottom {
            self.indent = Pt::ZERO;
            self.state.cursor_y = self.state.cursor_y.max(bottom);
        }
        self.text_line(input.title, BOLD_FONT, 16.0, text)?;
        let generated = format!(
            "{}: {}",
            branding.generated_label,
            input.generated_at.format(&branding.timestamp_format)
        );
        self.text_line(&generated, REGULAR_FONT, 9.0, muted)?;

        let meta = input.metadata;
        if let Some(subtitle) = non_blank(meta.subtitle.as_deref()) {
            self.text_line(subtitle, REGULAR_FONT, 11.0, text)?;
        }
        if let Some(company) = non_blank(meta.company.as_deref()) {
            self.text_line(company, REGULAR_FONT, 10.0, text)?;
        }
        if let Some(range) = &meta.date_range {
            let line = format!(
                "{}: {}",
                branding.period_label,
                range.format(&branding.date_format)
            );
            self.text_line(&line, REGULAR_FONT, 10.0, text)?;
        }
        let filters = meta.filter_lines(&config.filter_wildcards);
        if !filters.is_empty() {
            self.text_line(&branding.filters_label, BOLD_FONT, 10.0, text)?;
            for line in &filters {
                self.text_line(line, REGULAR_FONT, 9.0, text)?;
            }
        }

        let rule_gap = Pt::from_f32(12.0);
        self.make_room(rule_gap)?;
        let y = self.state.cursor_y + Pt::from_f32(4.0);
        self.canvas.set_stroke_color(branding.primary_color);
        self.canvas.set_line_width(Pt::from_f32(1.0));
        self.rule(y);
        self.state.advance(rule_gap);
        Ok(())
    }

    /// Draws one header line, wrapping at the usable width.
    fn text_line(&mut self, text: &str, font: &str, size: f32, color: Color) -> Result<(), ExportError> {
        let size = Pt::from_f32(size);
        let line_height = size * LINE_HEIGHT_FACTOR;
        let x = self.state.margins.left + self.indent;
        for line in wrap_text(text, size, self.state.usable_width() - self.indent) {
            self.make_room(line_height)?;
            self.canvas.set_fill_color(color);
            self.canvas.set_font_name(font);
            self.canvas.set_font_size(size);
            self.canvas.draw_string(x, self.state.cursor_y, line);
            self.state.advance(line_height);
        }
        Ok(())
    }

    fn block(
        &mut self,
        id: &str,
        caption: &str,
        bitmap: Arc<Bitmap>,
    ) -> Result<(usize, Rect), ExportError> {
        let config = self.config;
        let page = &config.page;
        let (bw, bh) = (bitmap.width(), bitmap.height());
        if bw == 0 || bh == 0 {
            return Err(ExportError::Assembly(format!(
                "section '{id}' has an empty bitmap"
            )));
        }
        let usable = self.state.usable_width();
        let mut width = usable;
        let mut height = usable.mul_ratio(bh, bw);
        if height > page.max_block_height {
            height = page.max_block_height;
            width = height.mul_ratio(bw, bh).min(usable);
        }
        let needed = page.caption_height + height;
        if !self.state.fits(needed) {
            if self.on_fresh_page() {
                return Err(unplaceable(id, needed));
            }
            self.break_page(&format!("block:{id}"));
            if !self.state.fits(needed) {
                return Err(unplaceable(id, needed));
            }
        }

        let top = self.state.cursor_y;
        let caption_size = page.caption_font_size;
        let caption_y = top + (page.caption_height - caption_size * LINE_HEIGHT_FACTOR).max(Pt::ZERO) / 2;
        self.canvas.meta("section", id);
        self.canvas.set_fill_color(config.branding.primary_color);
        self.canvas.set_font_name(BOLD_FONT);
        self.canvas.set_font_size(caption_size);
        self.canvas
            .draw_string(self.state.margins.left, caption_y, caption);

        let x = self.state.margins.left + (usable - width) / 2;
        let y = top + page.caption_height;
        let resource_id = format!("section:{id}");
        self.canvas.register_image(resource_id.clone(), bitmap);
        self.canvas.draw_image(x, y, width, height, resource_id);
        if page.frame_images {
            self.canvas.set_stroke_color(FRAME_COLOR);
            self.canvas.set_line_width(Pt::from_f32(0.5));
            self.canvas.stroke_rect(x, y, width, height);
        }

        self.state.advance(needed + page.block_spacing);
        Ok((self.state.page_index + 1, Rect::new(x, y, width, height)))
    }

    /// Nothing drawn yet below the running header of a continuation page.
    fn on_fresh_page(&self) -> bool {
        self.state.page_index > 0
            && self.state.cursor_y
                == self.state.margins.top + self.config.page.running_header_height
    }

    fn make_room(&mut self, height: Pt) -> Result<(), ExportError> {
        if self.state.fits(height) {
            return Ok(());
        }
        self.break_page("header");
        if self.state.fits(height) {
            Ok(())
        } else {
            Err(ExportError::Assembly(format!(
                "a {}pt header line does not fit on a fresh page",
                height.to_f32()
            )))
        }
    }

    fn break_page(&mut self, reason: &str) {
        self.canvas.show_page();
        self.state
            .next_page(self.config.page.running_header_height);
        self.running_header();
        let page_number = self.state.page_index + 1;
        log::debug!("page break before page {page_number} ({reason})");
        if let Some(trace) = self.trace {
            trace.event(
                "layout.page_break",
                json!({ "page": page_number, "reason": reason }),
            );
            trace.increment("layout.page_breaks", 1);
        }
    }

    fn running_header(&mut self) {
        let branding = &self.config.branding;
        let size = Pt::from_f32(9.0);
        let top = self.state.margins.top;
        let text = format!("{} · {}", branding.system_name, self.title);
        let text = wrap_text(&text, size, self.state.usable_width())
            .into_iter()
            .next()
            .unwrap_or_default();
        self.canvas.set_fill_color(branding.muted_color);
        self.canvas.set_font_name(REGULAR_FONT);
        self.canvas.set_font_size(size);
        self.canvas.draw_string(self.state.margins.left, top, text);
        self.canvas.set_stroke_color(FRAME_COLOR);
        self.canvas.set_line_width(Pt::from_f32(0.5));
        self.rule(top + Pt::from_f32(14.0));
    }

    fn rule(&mut self, y: Pt) {
        let left = self.state.margins.left;
        let right = self.state.page_width - self.state.margins.right;
        self.canvas.hline(left, right, y);
    }
}

/// A logo that cannot be read or decoded is left out of the header.
fn load_logo(branding: &BrandingConfig) -> Option<Arc<Bitmap>> {
    let src = non_blank(branding.logo.as_deref())?;
    match load_image(src, None) {
        Ok(logo) if logo.width() > 0 && logo.height() > 0 => Some(Arc::new(logo)),
        Ok(_) => {
            log::warn!("logo skipped: image is empty");
            None
        }
        Err(e) => {
            log::warn!("logo skipped: {e}");
            None
        }
    }
}

fn unplaceable(id: &str, needed: Pt) -> ExportError {
    ExportError::Assembly(format!(
        "section '{id}' needs {}pt and does not fit on a fresh page",
        needed.to_f32()
    ))
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Greedy word wrap against the approximate glyph width. Words longer than a
/// line are hard-split.
fn wrap_text(text: &str, size: Pt, max_width: Pt) -> Vec<String> {
    let char_width = approx_text_width("m", size);
    let per_line = if char_width <= Pt::ZERO {
        usize::MAX
    } else {
        ((max_width.to_milli_i64() / char_width.to_milli_i64().max(1)) as usize).max(1)
    };
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        while word.len() > per_line {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            let rest = word.split_off(per_line);
            lines.push(word.into_iter().collect());
            word = rest;
        }
        let word: String = word.into_iter().collect();
        let joined = current.chars().count() + usize::from(!current.is_empty()) + word.chars().count();
        if joined > per_line && !current.is_empty() {
            lines.push(std::mem::replace(&mut current, word));
        } else {
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(&word);
        }
    }
    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Command;
    use crate::error::SectionFailure;
    use crate::metadata::FilterEntry;

    fn at() -> NaiveDateTime {
        chrono::NaiveDate::from_ymd_opt(2024, 4, 10)
            .unwrap()
            .and_hms_opt(16, 20, 0)
            .unwrap()
    }

    fn ok(id: &str, w: u32, h: u32) -> SectionResult {
        SectionResult::captured(id, Bitmap::filled(w, h, [10, 20, 30, 255]), "full-fidelity", 0.5, Vec::new())
    }

    fn requests(ids: &[&str]) -> Vec<SectionRequest> {
        ids.iter().map(|id| SectionRequest::new(*id, "")).collect()
    }

    fn assemble(
        config: &ExportConfig,
        sections: &[SectionRequest],
        results: &[SectionResult],
        metadata: &ExportMetadata,
    ) -> AssembledDocument {
        DocumentAssembler::new(config, None)
            .assemble(&AssemblyInput {
                title: "Maintenance Overview",
                sections,
                results,
                metadata,
                generated_at: at(),
            })
            .unwrap()
    }

    fn page_strings(doc: &Document, page: usize) -> Vec<String> {
        doc.pages[page]
            .commands
            .iter()
            .filter_map(|cmd| match cmd {
                Command::DrawString { text, .. } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn title_from_id_capitalizes_words() {
        assert_eq!(title_from_id("kpi-metrics"), "Kpi Metrics");
        assert_eq!(title_from_id("cost_by_unit"), "Cost By Unit");
        assert_eq!(title_from_id("--"), "");
    }

    #[test]
    fn wrap_splits_on_words_and_hard_splits_long_words() {
        let size = Pt::from_f32(10.0);
        // 6pt per char, 60pt wide: 10 chars per line.
        let lines = wrap_text("alpha beta gamma", size, Pt::from_f32(60.0));
        assert_eq!(lines, vec!["alpha beta", "gamma"]);
        let lines = wrap_text("abcdefghijklmno", size, Pt::from_f32(60.0));
        assert_eq!(lines, vec!["abcdefghij", "klmno"]);
        assert_eq!(wrap_text("", size, Pt::from_f32(60.0)), vec![String::new()]);
    }

    #[test]
    fn wide_bitmap_spans_usable_width_and_keeps_aspect() {
        let config = ExportConfig::default();
        let sections = requests(&["kpi"]);
        let out = assemble(&config, &sections, &[ok("kpi", 1000, 250)], &ExportMetadata::default());
        let rect = out.layout.placements[0].rect;
        let usable = config.page.usable_width();
        assert_eq!(rect.width, usable);
        assert_eq!(rect.height, usable.mul_ratio(250, 1000));
        assert_eq!(rect.x, config.page.margins.left);
    }

    #[test]
    fn tall_bitmap_is_capped_and_centered() {
        let config = ExportConfig::default();
        let sections = requests(&["tall"]);
        let out = assemble(&config, &sections, &[ok("tall", 200, 1000)], &ExportMetadata::default());
        let rect = out.layout.placements[0].rect;
        assert_eq!(rect.height, config.page.max_block_height);
        assert_eq!(rect.width, config.page.max_block_height.mul_ratio(200, 1000));
        let usable = config.page.usable_width();
        assert_eq!(rect.x, config.page.margins.left + (usable - rect.width) / 2);
    }

    #[test]
    fn overflowing_blocks_start_new_pages_and_never_split() {
        let config = ExportConfig::default();
        let ids = ["a", "b", "c", "d"];
        let sections = requests(&ids);
        let results: Vec<_> = ids.iter().map(|id| ok(id, 800, 600)).collect();
        let out = assemble(&config, &sections, &results, &ExportMetadata::default());

        assert!(out.layout.page_count >= 3);
        assert_eq!(out.layout.page_count, out.document.pages.len());
        let bottom = config.page.usable_bottom();
        let mut last_page = 0;
        for placement in &out.layout.placements {
            assert!(placement.rect.bottom() <= bottom);
            assert!(placement.page_number >= last_page);
            last_page = placement.page_number;
        }
        let continuation = page_strings(&out.document, 1);
        assert_eq!(continuation[0], "GCINFRA 360º · Maintenance Overview");
    }

    #[test]
    fn failed_sections_are_skipped_in_request_order() {
        let config = ExportConfig::default();
        let sections = vec![
            SectionRequest::new("kpi-metrics", ""),
            SectionRequest::new("costs", "Cost per unit"),
            SectionRequest::new("ghost", "Ghost"),
        ];
        let results = vec![
            ok("kpi-metrics", 400, 100),
            ok("costs", 400, 100),
            SectionResult::failed("ghost", SectionFailure::NotFound, Vec::new()),
        ];
        let out = assemble(&config, &sections, &results, &ExportMetadata::default());
        let ids: Vec<_> = out.layout.placements.iter().map(|p| p.section_id.as_str()).collect();
        assert_eq!(ids, vec!["kpi-metrics", "costs"]);
        let strings = page_strings(&out.document, 0);
        assert!(strings.contains(&"Kpi Metrics".to_string()));
        assert!(strings.contains(&"Cost per unit".to_string()));
        assert!(!strings.contains(&"Ghost".to_string()));
        let metas: Vec<_> = out.document.pages[0].meta_values("section").collect();
        assert_eq!(metas, vec!["kpi-metrics", "costs"]);
    }

    #[test]
    fn header_lists_metadata_and_active_filters() {
        let config = ExportConfig::default();
        let metadata = ExportMetadata {
            subtitle: Some("Monthly review".into()),
            company: Some("Hospital Central".into()),
            date_range: Some(crate::metadata::DateRange::new(
                chrono::NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
                chrono::NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
            )),
            filters: vec![FilterEntry::text("Unit", "ICU"), FilterEntry::text("Team", "todos")],
        };
        let out = assemble(&config, &[], &[], &metadata);
        let strings = page_strings(&out.document, 0);
        assert_eq!(
            &strings[..8],
            &[
                "GCINFRA 360º",
                "Hospital Infrastructure Maintenance",
                "Maintenance Overview",
                "Generated: 10/04/2024 16:20",
                "Monthly review",
                "Hospital Central",
                "Period: 01/03/2024 – 31/03/2024",
                "Active filters",
            ]
        );
        assert_eq!(strings[8], "• Unit: ICU");
        assert_eq!(out.layout.page_count, 1);
    }

    #[test]
    fn zero_successes_still_produce_one_stamped_page() {
        let config = ExportConfig::default();
        let sections = requests(&["a"]);
        let results = vec![SectionResult::failed("a", SectionFailure::ZeroSize, Vec::new())];
        let out = assemble(&config, &sections, &results, &ExportMetadata::default());
        assert_eq!(out.layout.page_count, 1);
        assert!(out.layout.placements.is_empty());
        assert!(page_strings(&out.document, 0).contains(&"Page 1 of 1".to_string()));
    }

    #[test]
    fn header_spilling_onto_page_two_still_places_blocks() {
        let config = ExportConfig::default();
        let sections = requests(&["kpi"]);
        for count in [40, 76, 120, 199] {
            let metadata = ExportMetadata {
                filters: (0..count)
                    .map(|i| FilterEntry::text(format!("Filter {i}"), "ICU"))
                    .collect(),
                ..ExportMetadata::default()
            };
            let out = assemble(&config, &sections, &[ok("kpi", 800, 600)], &metadata);
            assert!(out.layout.page_count >= 2, "{count} filters");
            let placement = &out.layout.placements[0];
            assert_eq!(placement.page_number, out.layout.page_count);
            assert!(placement.rect.bottom() <= config.page.usable_bottom());
        }
    }

    fn logo_uri(w: u32, h: u32) -> String {
        use base64::Engine;
        let png = Bitmap::filled(w, h, [200, 30, 30, 255]).encode_png().unwrap();
        format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(png)
        )
    }

    #[test]
    fn logo_is_drawn_beside_the_system_name() {
        let mut config = ExportConfig::default();
        config.branding.logo = Some(logo_uri(120, 60));
        let out = assemble(&config, &[], &[], &ExportMetadata::default());
        let page = &out.document.pages[0];
        let (x, y, width, height) = page
            .commands
            .iter()
            .find_map(|cmd| match cmd {
                Command::DrawImage {
                    x,
                    y,
                    width,
                    height,
                    resource_id,
                } if resource_id == LOGO_RESOURCE => Some((*x, *y, *width, *height)),
                _ => None,
            })
            .unwrap();
        let margins = config.page.margins;
        assert_eq!((x, y), (margins.left, margins.top));
        assert_eq!(height, config.branding.logo_height);
        assert_eq!(width, config.branding.logo_height.mul_ratio(120, 60));
        assert!(out.document.images.contains_key(LOGO_RESOURCE));

        let name_x = page
            .commands
            .iter()
            .find_map(|cmd| match cmd {
                Command::DrawString { x, text, .. } if text == "GCINFRA 360º" => Some(*x),
                _ => None,
            })
            .unwrap();
        assert_eq!(name_x, margins.left + width + Pt::from_f32(8.0));
        let title_x = page
            .commands
            .iter()
            .find_map(|cmd| match cmd {
                Command::DrawString { x, text, .. } if text == "Maintenance Overview" => Some(*x),
                _ => None,
            })
            .unwrap();
        assert_eq!(title_x, margins.left);
    }

    #[test]
    fn unreadable_logo_is_left_out() {
        for logo in ["/nonexistent/logo.png", "data:image/png;base64,bm90IGEgcG5n"] {
            let mut config = ExportConfig::default();
            config.branding.logo = Some(logo.to_string());
            let sections = requests(&["kpi"]);
            let out = assemble(&config, &sections, &[ok("kpi", 400, 100)], &ExportMetadata::default());
            assert!(!out.document.images.contains_key(LOGO_RESOURCE));
            assert_eq!(out.layout.placements.len(), 1);
            assert_eq!(page_strings(&out.document, 0)[0], "GCINFRA 360º");
        }
    }

    #[test]
    fn layout_is_identical_across_runs() {
        let config = ExportConfig::default();
        let sections = requests(&["a", "b", "c"]);
        let results = vec![ok("a", 640, 480), ok("b", 1200, 300), ok("c", 300, 900)];
        let first = assemble(&config, &sections, &results, &ExportMetadata::default());
        let second = assemble(&config, &sections, &results, &ExportMetadata::default());
        assert_eq!(first.layout, second.layout);
        assert_eq!(first.document.pages, second.document.pages);
    }
}
