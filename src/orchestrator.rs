use crate::bitmap::Bitmap;
use crate::error::SectionFailure;
use crate::rasterizer::{AttemptOutcome, CaptureAttempt, Rasterizer};
use crate::readiness::{ReadinessReport, ReadinessWaiter};
use crate::trace::CaptureTrace;
use crate::validator::ContentValidator;
use crate::visual::Surface;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// One section to capture, in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionRequest {
    pub id: String,
    pub display_title: String,
}

impl SectionRequest {
    pub fn new(id: impl Into<String>, display_title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_title: display_title.into(),
        }
    }
}

/// Cooperative cancellation flag, checked between sections.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressEvent {
    /// 1-based index of the section that just completed.
    pub current: usize,
    pub total: usize,
    pub section_id: String,
    pub succeeded: bool,
}

/// Outcome of capturing one section. A bitmap is present exactly when the
/// section succeeded.
#[derive(Debug, Clone)]
pub struct SectionResult {
    section_id: String,
    bitmap: Option<Arc<Bitmap>>,
    strategy_used: Option<String>,
    content_ratio: Option<f32>,
    failure: Option<SectionFailure>,
    attempts: Vec<CaptureAttempt>,
    ready_wait: Duration,
    elapsed: Duration,
}

impl SectionResult {
    pub(crate) fn captured(
        section_id: impl Into<String>,
        bitmap: Bitmap,
        strategy: impl Into<String>,
        content_ratio: f32,
        attempts: Vec<CaptureAttempt>,
    ) -> Self {
        Self {
            section_id: section_id.into(),
            bitmap: Some(Arc::new(bitmap)),
            strategy_used: Some(strategy.into()),
            content_ratio: Some(content_ratio),
            failure: None,
            attempts,
            ready_wait: Duration::ZERO,
            elapsed: Duration::ZERO,
        }
    }

    pub(crate) fn failed(
        section_id: impl Into<String>,
        failure: SectionFailure,
        attempts: Vec<CaptureAttempt>,
    ) -> Self {
        Self {
            section_id: section_id.into(),
            bitmap: None,
            strategy_used: None,
            content_ratio: None,
            failure: Some(failure),
            attempts,
            ready_wait: Duration::ZERO,
            elapsed: Duration::ZERO,
        }
    }

    fn with_timing(mut self, ready_wait: Duration, elapsed: Duration) -> Self {
        self.ready_wait = ready_wait;
        self.elapsed = elapsed;
        self
    }

    pub fn section_id(&self) -> &str {
        &self.section_id
    }

    pub fn succeeded(&self) -> bool {
        self.bitmap.is_some()
    }

    pub fn bitmap(&self) -> Option<&Bitmap> {
        self.bitmap.as_deref()
    }

    pub(crate) fn shared_bitmap(&self) -> Option<Arc<Bitmap>> {
        self.bitmap.clone()
    }

    pub fn strategy_used(&self) -> Option<&str> {
        self.strategy_used.as_deref()
    }

    pub fn content_ratio(&self) -> Option<f32> {
        self.content_ratio
    }

    pub fn failure(&self) -> Option<&SectionFailure> {
        self.failure.as_ref()
    }

    pub fn attempts(&self) -> &[CaptureAttempt] {
        &self.attempts
    }

    pub fn ready_wait(&self) -> Duration {
        self.ready_wait
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }
}

#[derive(Debug, Clone)]
pub struct CaptureRun {
    /// One entry per requested section, in request order.
    pub results: Vec<SectionResult>,
    pub cancelled: bool,
}

/// Drives every requested section through wait, rasterize and validate, one
/// at a time and in request order.
pub struct CaptureOrchestrator<'a> {
    waiter: ReadinessWaiter<'a>,
    rasterizer: Rasterizer<'a>,
    validator: &'a ContentValidator,
    trace: Option<&'a CaptureTrace>,
}

impl<'a> CaptureOrchestrator<'a> {
    pub fn new(
        waiter: ReadinessWaiter<'a>,
        rasterizer: Rasterizer<'a>,
        validator: &'a ContentValidator,
        trace: Option<&'a CaptureTrace>,
    ) -> Self {
        Self {
            waiter,
            rasterizer,
            validator,
            trace,
        }
    }

    pub async fn capture_all<S: Surface + ?Sized>(
        &self,
        surface: &S,
        sections: &[SectionRequest],
        on_progress: &mut dyn FnMut(&ProgressEvent),
        cancel: Option<&CancelToken>,
    ) -> CaptureRun {
        let total = sections.len();
        let mut results = Vec::with_capacity(total);
        let mut cancelled = false;

        for (idx, section) in sections.iter().enumerate() {
            if cancel.is_some_and(CancelToken::is_cancelled) {
                cancelled = true;
                log::info!(
                    "export cancelled; skipping {} remaining section(s)",
                    total - idx
                );
                for rest in &sections[idx..] {
                    let result = SectionResult::failed(&rest.id, SectionFailure::Cancelled, Vec::new());
                    self.trace_section(&result);
                    results.push(result);
                }
                break;
            }

            let result = self.capture_section(surface, section).await;
            self.trace_section(&result);
            on_progress(&ProgressEvent {
                current: idx + 1,
                total,
                section_id: section.id.clone(),
                succeeded: result.succeeded(),
            });
            results.push(result);
            tokio::task::yield_now().await;
        }

        CaptureRun { results, cancelled }
    }

    pub async fn capture_section<S: Surface + ?Sized>(
        &self,
        surface: &S,
        section: &SectionRequest,
    ) -> SectionResult {
        let started = Instant::now();
        let id = section.id.as_str();

        if surface.snapshot(id).is_none() {
            log::warn!("section '{id}' not found");
            return SectionResult::failed(id, SectionFailure::NotFound, Vec::new());
        }

        let readiness: ReadinessReport = self.waiter.wait(surface, id).await;
        match surface.snapshot(id) {
            None => {
                log::warn!("section '{id}' disappeared while waiting");
                return SectionResult::failed(id, SectionFailure::NotFound, Vec::new())
                    .with_timing(readiness.waited, started.elapsed());
            }
            Some(placed) if placed.node.has_zero_size() => {
                log::warn!("section '{id}' has zero size");
                return SectionResult::failed(id, SectionFailure::ZeroSize, Vec::new())
                    .with_timing(readiness.waited, started.elapsed());
            }
            Some(_) => {}
        }

        let outcome = self.rasterizer.capture(surface, id, self.validator).await;
        let result = match outcome.result {
            Ok(accepted) => {
                log::info!(
                    "section '{id}' captured with '{}' ({}x{})",
                    accepted.strategy,
                    accepted.bitmap.width(),
                    accepted.bitmap.height()
                );
                SectionResult::captured(
                    id,
                    accepted.bitmap,
                    accepted.strategy,
                    accepted.content_ratio,
                    outcome.attempts,
                )
            }
            Err(failure) => {
                log::warn!("section '{id}' skipped: {failure}");
                SectionResult::failed(id, failure, outcome.attempts)
            }
        };
        result.with_timing(readiness.waited, started.elapsed())
    }

    fn trace_section(&self, result: &SectionResult) {
        let Some(trace) = self.trace else {
            return;
        };
        for attempt in result.attempts() {
            let outcome = match &attempt.outcome {
                AttemptOutcome::Accepted { .. } => "accepted",
                AttemptOutcome::Rejected { .. } => "rejected",
                AttemptOutcome::Failed { .. } => "failed",
            };
            trace.event(
                "capture.attempt",
                json!({
                    "section_id": result.section_id(),
                    "strategy": attempt.strategy_name,
                    "detail": attempt.outcome,
                }),
            );
            trace.increment(&format!("attempts.{outcome}"), 1);
        }
        trace.event(
            "capture.section",
            json!({
                "section_id": result.section_id(),
                "succeeded": result.succeeded(),
                "strategy": result.strategy_used(),
                "failure": result.failure(),
                "ready_wait_ms": result.ready_wait().as_millis() as u64,
                "elapsed_ms": result.elapsed().as_millis() as u64,
            }),
        );
        let key = if result.succeeded() {
            "sections.succeeded"
        } else {
            "sections.failed"
        };
        trace.increment(key, 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rasterizer::CaptureStrategy;
    use crate::readiness::ReadinessConfig;
    use crate::scene::SceneSurface;
    use crate::types::Color;
    use crate::validator::ValidatorConfig;

    const SCENE: &str = r##"{
        "sections": [
            { "id": "chart", "root": { "width": 200, "height": 100, "children": [
                { "width": 200, "height": 100,
                  "content": { "type": "polyline", "points": [[0,0],[200,100]], "line_width": 6 } }
            ] } },
            { "id": "empty", "root": { "width": 200, "height": 0 } },
            { "id": "blank", "root": { "width": 50, "height": 50, "background": "#ffffff" } }
        ]
    }"##;

    struct Fixture {
        strategies: Vec<CaptureStrategy>,
        overlays: Vec<String>,
        charts: Vec<String>,
        readiness: ReadinessConfig,
        validator: ContentValidator,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                strategies: CaptureStrategy::default_list(),
                overlays: vec!["MuiBackdrop-root".to_string()],
                charts: vec!["recharts-wrapper".to_string()],
                readiness: ReadinessConfig::default(),
                validator: ContentValidator::new(ValidatorConfig::default()),
            }
        }

        fn orchestrator(&self) -> CaptureOrchestrator<'_> {
            CaptureOrchestrator::new(
                ReadinessWaiter::new(&self.readiness, &self.charts),
                Rasterizer::new(
                    &self.strategies,
                    &self.overlays,
                    &self.charts,
                    Color::WHITE,
                    50_000_000,
                ),
                &self.validator,
                None,
            )
        }
    }

    fn requests(ids: &[&str]) -> Vec<SectionRequest> {
        ids.iter().map(|id| SectionRequest::new(*id, *id)).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn failures_are_recorded_and_progress_is_ordered() {
        let surface = SceneSurface::from_json_str(SCENE, None).unwrap();
        let fixture = Fixture::new();
        let mut events = Vec::new();
        let run = fixture
            .orchestrator()
            .capture_all(
                &surface,
                &requests(&["chart", "missing", "empty", "blank"]),
                &mut |e: &ProgressEvent| events.push(e.clone()),
                None,
            )
            .await;

        assert!(!run.cancelled);
        let summary: Vec<_> = run
            .results
            .iter()
            .map(|r| (r.section_id().to_string(), r.succeeded(), r.failure().map(|f| f.code())))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("chart".to_string(), true, None),
                ("missing".to_string(), false, Some("SECTION_NOT_FOUND")),
                ("empty".to_string(), false, Some("SECTION_ZERO_SIZE")),
                ("blank".to_string(), false, Some("CONTENT_REJECTED")),
            ]
        );
        for result in &run.results {
            assert_eq!(result.succeeded(), result.bitmap().is_some());
        }
        let progress: Vec<_> = events.iter().map(|e| (e.current, e.total)).collect();
        assert_eq!(progress, vec![(1, 4), (2, 4), (3, 4), (4, 4)]);
        assert_eq!(surface.mounted_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_marks_the_rest_without_progress() {
        let surface = SceneSurface::from_json_str(SCENE, None).unwrap();
        let fixture = Fixture::new();
        let token = CancelToken::new();
        let mut events = Vec::new();
        let run = fixture
            .orchestrator()
            .capture_all(
                &surface,
                &requests(&["chart", "blank", "empty"]),
                &mut |e: &ProgressEvent| {
                    events.push(e.section_id.clone());
                    token.cancel();
                },
                Some(&token),
            )
            .await;

        assert!(run.cancelled);
        assert_eq!(events, vec!["chart".to_string()]);
        assert_eq!(run.results.len(), 3);
        assert!(run.results[0].succeeded());
        assert_eq!(run.results[1].failure(), Some(&SectionFailure::Cancelled));
        assert_eq!(run.results[2].failure(), Some(&SectionFailure::Cancelled));
    }
}
