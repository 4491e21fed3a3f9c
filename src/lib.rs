mod assembler;
mod bitmap;
mod canvas;
mod config;
mod error;
mod inspect;
mod metadata;
mod metrics;
mod orchestrator;
mod paint;
mod pdf;
mod rasterizer;
mod readiness;
mod scene;
mod sink;
mod stamp;
mod trace;
mod types;
mod validator;
mod visual;

pub use assembler::{
    AssembledDocument, AssemblyInput, DocumentAssembler, LayoutSummary, PageLayoutState,
    SectionPlacement, title_from_id,
};
pub use bitmap::Bitmap;
pub use canvas::{Canvas, Command, Document, Page};
pub use config::{BrandingConfig, ExportConfig, PageConfig, WatermarkConfig};
pub use dashcapture_report::{ExportJobReport, SectionSummary};
pub use error::{ExportError, SectionFailure};
pub use inspect::{InspectError, PdfInspectReport, inspect_pdf_bytes, inspect_pdf_path};
pub use metadata::{DateRange, ExportMetadata, FilterEntry, FilterValue};
pub use metrics::{ExportMetrics, SectionMetrics};
pub use orchestrator::{
    CancelToken, CaptureOrchestrator, CaptureRun, ProgressEvent, SectionRequest, SectionResult,
};
pub use pdf::{PdfInfo, PdfStats, document_to_pdf};
pub use rasterizer::{
    AcceptedCapture, AttemptOutcome, CaptureAttempt, CaptureStrategy, RasterOutcome, Rasterizer,
};
pub use readiness::{ReadinessCheck, ReadinessConfig, ReadinessReport, ReadinessWaiter};
pub use scene::{SceneContent, SceneFile, SceneNode, SceneSection, SceneSurface, SceneTransition};
pub use sink::{ArtifactSink, DirectorySink, MemorySink};
pub use stamp::substitute_placeholders;
pub use trace::CaptureTrace;
pub use types::{Color, Margins, Pt, Rect, Size};
pub use validator::{ContentValidator, SamplingMode, ValidatorConfig, Verdict};
pub use visual::{
    Bounds, ImageContent, ImageState, MountId, NodeContent, OffscreenMount, PlacedNode,
    RunningAnimation, Surface, VisualNode,
};

use chrono::{NaiveDate, NaiveDateTime};
use dashcapture_report::{PlacementRecord, layout_fingerprint_sha256};
use metrics::millis;
use std::collections::HashSet;
use std::path::PathBuf;

const PRODUCER: &str = "dashcapture";

/// What to export: a title, the sections in document order, and optional
/// header metadata.
#[derive(Debug, Clone, Default)]
pub struct ExportRequest {
    pub title: String,
    pub sections: Vec<SectionRequest>,
    pub metadata: ExportMetadata,
    /// Used verbatim (plus `.pdf` when missing) instead of the derived name.
    pub output_name: Option<String>,
    /// Defaults to the local wall clock when the job starts.
    pub generated_at: Option<NaiveDateTime>,
}

impl ExportRequest {
    pub fn new(title: impl Into<String>, sections: Vec<SectionRequest>) -> Self {
        Self {
            title: title.into(),
            sections,
            ..Self::default()
        }
    }

    pub fn metadata(mut self, metadata: ExportMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn output_name(mut self, name: impl Into<String>) -> Self {
        self.output_name = Some(name.into());
        self
    }

    pub fn generated_at(mut self, at: NaiveDateTime) -> Self {
        self.generated_at = Some(at);
        self
    }

    fn validate(&self) -> Result<(), ExportError> {
        if self.sections.is_empty() {
            return Err(ExportError::NoSectionsRequested);
        }
        if self.title.trim().is_empty() {
            return Err(ExportError::InvalidRequest(
                "document title must not be empty".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for section in &self.sections {
            if section.id.trim().is_empty() {
                return Err(ExportError::InvalidRequest(
                    "section ids must not be empty".to_string(),
                ));
            }
            if !seen.insert(section.id.as_str()) {
                return Err(ExportError::InvalidRequest(format!(
                    "duplicate section id '{}'",
                    section.id
                )));
            }
        }
        Ok(())
    }
}

/// Caller-side callbacks for one job.
#[derive(Default)]
pub struct ExportHooks<'a> {
    pub on_progress: Option<Box<dyn FnMut(&ProgressEvent) + 'a>>,
    pub cancel: Option<CancelToken>,
}

impl<'a> ExportHooks<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_progress(mut self, f: impl FnMut(&ProgressEvent) + 'a) -> Self {
        self.on_progress = Some(Box::new(f));
        self
    }

    pub fn cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

#[derive(Debug, Clone)]
pub struct ExportedDocument {
    pub name: String,
    pub bytes: Vec<u8>,
    pub page_count: usize,
}

#[derive(Debug, Clone)]
pub struct ExportOutput {
    pub document: ExportedDocument,
    pub report: ExportJobReport,
    pub metrics: ExportMetrics,
    /// Per-section outcomes, bitmaps included, in request order.
    pub results: Vec<SectionResult>,
}

pub struct Exporter {
    config: ExportConfig,
    validator: ContentValidator,
    trace: Option<CaptureTrace>,
}

#[derive(Clone)]
pub struct ExporterBuilder {
    config: ExportConfig,
    trace_path: Option<PathBuf>,
}

impl Exporter {
    pub fn builder() -> ExporterBuilder {
        ExporterBuilder::new()
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    /// Captures every requested section, lays out the ones that succeeded and
    /// hands the PDF to `sink`. Section failures never abort the job; only
    /// request, assembly and I/O errors do.
    pub async fn export<S: Surface + ?Sized>(
        &self,
        surface: &S,
        request: &ExportRequest,
        sink: &mut dyn ArtifactSink,
        mut hooks: ExportHooks<'_>,
    ) -> Result<ExportOutput, ExportError> {
        request.validate()?;
        let generated_at = request
            .generated_at
            .unwrap_or_else(|| chrono::Local::now().naive_local());
        let name = output_name(
            &self.config.branding.system_name,
            &request.title,
            generated_at.date(),
            request.output_name.as_deref(),
        );
        log::info!(
            "export '{}' started: {} section(s) -> {}",
            request.title,
            request.sections.len(),
            name
        );

        let capture_started = tokio::time::Instant::now();
        let orchestrator = CaptureOrchestrator::new(
            ReadinessWaiter::new(&self.config.readiness, &self.config.chart_markers),
            Rasterizer::new(
                &self.config.strategies,
                &self.config.overlay_markers,
                &self.config.chart_markers,
                self.config.background,
                self.config.max_bitmap_pixels,
            ),
            &self.validator,
            self.trace.as_ref(),
        );
        let mut ignore = |_: &ProgressEvent| {};
        let on_progress: &mut dyn FnMut(&ProgressEvent) = match hooks.on_progress.as_mut() {
            Some(f) => &mut **f,
            None => &mut ignore,
        };
        let run = orchestrator
            .capture_all(surface, &request.sections, on_progress, hooks.cancel.as_ref())
            .await;
        let capture_ms = millis(capture_started.elapsed());

        let assemble_started = std::time::Instant::now();
        let assembled = DocumentAssembler::new(&self.config, self.trace.as_ref()).assemble(
            &AssemblyInput {
                title: &request.title,
                sections: &request.sections,
                results: &run.results,
                metadata: &request.metadata,
                generated_at,
            },
        )?;
        let assemble_ms = millis(assemble_started.elapsed());

        let encode_started = std::time::Instant::now();
        let (bytes, stats) = document_to_pdf(
            &assembled.document,
            &PdfInfo {
                title: &request.title,
                producer: PRODUCER,
                creation_date: generated_at,
            },
        )?;
        let page_count = assembled.layout.page_count;
        if self.config.verify_output {
            inspect::verify_pdf_bytes(&bytes, page_count)
                .map_err(|err| ExportError::Assembly(err.to_string()))?;
        }
        let encode_ms = millis(encode_started.elapsed());
        if stats.replaced_chars > 0 {
            log::warn!(
                "{} character(s) outside WinAnsi were replaced with '?'",
                stats.replaced_chars
            );
        }

        let report = build_report(&name, request, &run, &assembled.layout, generated_at);
        let metrics = ExportMetrics {
            sections: run.results.iter().map(SectionMetrics::from_result).collect(),
            capture_ms,
            assemble_ms,
            encode_ms,
            total_bytes: stats.total_bytes,
            image_bytes: stats.image_bytes,
            page_count,
        };

        if let Some(trace) = &self.trace {
            trace.increment("export.pages", page_count as u64);
            trace.increment("export.bytes", stats.total_bytes as u64);
            trace.emit_summary(&name);
            trace.flush();
        }
        log::info!(
            "export '{}' finished: {} ({} page(s), {} bytes)",
            request.title,
            report.summary_line(),
            page_count,
            bytes.len()
        );

        sink.deliver(&name, &bytes)?;
        Ok(ExportOutput {
            document: ExportedDocument {
                name,
                bytes,
                page_count,
            },
            report,
            metrics,
            results: run.results,
        })
    }
}

fn build_report(
    name: &str,
    request: &ExportRequest,
    run: &CaptureRun,
    layout: &LayoutSummary,
    generated_at: NaiveDateTime,
) -> ExportJobReport {
    let sections = run
        .results
        .iter()
        .map(|result| {
            let mut summary = match result.failure() {
                Some(failure) => SectionSummary::failed(
                    result.section_id(),
                    failure.code(),
                    failure.to_string(),
                ),
                None => SectionSummary::succeeded(
                    result.section_id(),
                    result.strategy_used().unwrap_or_default(),
                ),
            };
            summary.content_ratio = result.content_ratio();
            summary.attempts = result.attempts().len();
            summary.page_number = layout
                .placements
                .iter()
                .find(|p| p.section_id == result.section_id())
                .map(|p| p.page_number);
            summary
        })
        .collect();
    let records: Vec<PlacementRecord<'_>> = layout
        .placements
        .iter()
        .map(|p| PlacementRecord {
            section_id: &p.section_id,
            page_number: p.page_number,
            x_milli: p.rect.x.to_milli_i64(),
            y_milli: p.rect.y.to_milli_i64(),
            width_milli: p.rect.width.to_milli_i64(),
            height_milli: p.rect.height.to_milli_i64(),
        })
        .collect();
    ExportJobReport::new(
        name,
        request.title.trim(),
        sections,
        layout.page_count,
        run.cancelled,
        layout_fingerprint_sha256(layout.page_count, &records),
        generated_at.format("%Y-%m-%dT%H:%M:%S").to_string(),
    )
}

/// System name reduced to ASCII alphanumerics joined by underscores:
/// `GCINFRA 360º` -> `GCINFRA_360`.
pub fn system_prefix(system_name: &str) -> String {
    system_name
        .split(|c: char| c.is_whitespace() || c == '_' || c == '-')
        .map(|word| {
            word.chars()
                .filter(|c| c.is_ascii_alphanumeric())
                .collect::<String>()
        })
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

/// `<prefix>_<title>_<YYYY-MM-DD>.pdf`, or the override with `.pdf` ensured.
pub fn output_name(
    system_name: &str,
    title: &str,
    date: NaiveDate,
    override_name: Option<&str>,
) -> String {
    if let Some(name) = override_name.map(str::trim).filter(|n| !n.is_empty()) {
        if name.to_ascii_lowercase().ends_with(".pdf") {
            return name.to_string();
        }
        return format!("{name}.pdf");
    }
    let title = title
        .split_whitespace()
        .map(|word| word.replace(['/', '\\'], "-"))
        .collect::<Vec<_>>()
        .join("_");
    let prefix = system_prefix(system_name);
    let date = date.format("%Y-%m-%d");
    if prefix.is_empty() {
        format!("{title}_{date}.pdf")
    } else {
        format!("{prefix}_{title}_{date}.pdf")
    }
}

impl ExporterBuilder {
    pub fn new() -> Self {
        Self {
            config: ExportConfig::default(),
            trace_path: None,
        }
    }

    /// Replaces the whole configuration; later setters still apply on top.
    pub fn config(mut self, config: ExportConfig) -> Self {
        self.config = config;
        self
    }

    pub fn page_size(mut self, size: Size) -> Self {
        self.config.page.size = size;
        self
    }

    pub fn margins(mut self, margins: Margins) -> Self {
        self.config.page.margins = margins;
        self
    }

    pub fn max_block_height(mut self, height: f32) -> Self {
        self.config.page.max_block_height = Pt::from_f32(height);
        self
    }

    pub fn system_name(mut self, name: impl Into<String>) -> Self {
        self.config.branding.system_name = name.into();
        self
    }

    pub fn footer_note(mut self, note: impl Into<String>) -> Self {
        self.config.branding.footer_note = Some(note.into());
        self
    }

    pub fn page_label(mut self, template: impl Into<String>) -> Self {
        self.config.branding.page_label = template.into();
        self
    }

    pub fn watermark(mut self, watermark: WatermarkConfig) -> Self {
        self.config.branding.watermark = Some(watermark);
        self
    }

    pub fn strategies(mut self, strategies: Vec<CaptureStrategy>) -> Self {
        self.config.strategies = strategies;
        self
    }

    pub fn readiness(mut self, readiness: ReadinessConfig) -> Self {
        self.config.readiness = readiness;
        self
    }

    pub fn sampling(mut self, mode: SamplingMode) -> Self {
        self.config.validator.sampling = mode;
        self
    }

    pub fn min_content_ratio(mut self, ratio: f32) -> Self {
        self.config.validator.min_content_ratio = ratio;
        self
    }

    pub fn verify_output(mut self, enabled: bool) -> Self {
        self.config.verify_output = enabled;
        self
    }

    // JSONL capture trace; see CaptureTrace for the event kinds.
    pub fn trace_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.trace_path = Some(path.into());
        self
    }

    pub fn build(self) -> Result<Exporter, ExportError> {
        self.config.validate()?;
        let trace = match self.trace_path {
            Some(path) => Some(CaptureTrace::create(path)?),
            None => None,
        };
        Ok(Exporter {
            validator: ContentValidator::new(self.config.validator.clone()),
            config: self.config,
            trace,
        })
    }
}

impl Default for ExporterBuilder {
    fn default() -> Self {
        Self::new()
    }
}
