use crate::bitmap::Bitmap;
use crate::error::SectionFailure;
use crate::paint::{PaintOptions, device_size, paint_section};
use crate::types::Color;
use crate::validator::ContentValidator;
use crate::visual::{OffscreenMount, Surface, VisualNode};
use serde::{Deserialize, Serialize};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Duration;

fn default_true() -> bool {
    true
}

/// One rasterization configuration. Strategies are tried in list order until
/// one yields a bitmap the validator accepts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureStrategy {
    pub name: String,
    /// Device pixels per CSS pixel.
    pub scale: f32,
    /// Paint cross-origin images even though that taints the capture.
    #[serde(default)]
    pub allow_taint: bool,
    /// Capture a working copy mounted outside the viewport, away from
    /// clipping ancestors and page overlays.
    #[serde(default)]
    pub offscreen: bool,
    #[serde(default = "default_true")]
    pub freeze_animations: bool,
    #[serde(default)]
    pub settle_ms: u64,
}

impl CaptureStrategy {
    pub fn new(name: impl Into<String>, scale: f32) -> Self {
        Self {
            name: name.into(),
            scale,
            allow_taint: false,
            offscreen: false,
            freeze_animations: true,
            settle_ms: 0,
        }
    }

    pub fn allow_taint(mut self, allow: bool) -> Self {
        self.allow_taint = allow;
        self
    }

    pub fn offscreen(mut self, offscreen: bool) -> Self {
        self.offscreen = offscreen;
        self
    }

    pub fn settle_ms(mut self, ms: u64) -> Self {
        self.settle_ms = ms;
        self
    }

    pub fn freeze_animations(mut self, freeze: bool) -> Self {
        self.freeze_animations = freeze;
        self
    }

    pub fn default_list() -> Vec<CaptureStrategy> {
        vec![
            CaptureStrategy::new("full-fidelity", 3.0),
            CaptureStrategy::new("allow-taint", 2.0).allow_taint(true),
            CaptureStrategy::new("offscreen-clone", 2.0)
                .allow_taint(true)
                .offscreen(true)
                .settle_ms(1000),
            CaptureStrategy::new("low-fidelity", 1.5)
                .allow_taint(true)
                .offscreen(true)
                .settle_ms(1000),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Accepted {
        width: u32,
        height: u32,
        content_ratio: f32,
    },
    Rejected {
        width: u32,
        height: u32,
        content_ratio: f32,
    },
    Failed {
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaptureAttempt {
    pub strategy_name: String,
    pub outcome: AttemptOutcome,
}

#[derive(Debug, Clone)]
pub struct AcceptedCapture {
    pub bitmap: Bitmap,
    pub strategy: String,
    pub content_ratio: f32,
}

#[derive(Debug, Clone)]
pub struct RasterOutcome {
    pub result: Result<AcceptedCapture, SectionFailure>,
    pub attempts: Vec<CaptureAttempt>,
}

/// Working-copy preparation and paint settings shared by every strategy.
#[derive(Debug, Clone)]
pub struct Rasterizer<'a> {
    strategies: &'a [CaptureStrategy],
    overlay_markers: &'a [String],
    chart_markers: &'a [String],
    background: Color,
    max_bitmap_pixels: u64,
}

impl<'a> Rasterizer<'a> {
    pub fn new(
        strategies: &'a [CaptureStrategy],
        overlay_markers: &'a [String],
        chart_markers: &'a [String],
        background: Color,
        max_bitmap_pixels: u64,
    ) -> Self {
        Self {
            strategies,
            overlay_markers,
            chart_markers,
            background,
            max_bitmap_pixels,
        }
    }

    /// Runs the strategy list against one section. Never panics and never
    /// returns early with an error; every failure lands in the outcome.
    pub async fn capture<S: Surface + ?Sized>(
        &self,
        surface: &S,
        section_id: &str,
        validator: &ContentValidator,
    ) -> RasterOutcome {
        let mut attempts = Vec::with_capacity(self.strategies.len());
        let mut rejected_ratio: Option<f32> = None;
        let mut last_strategy = String::new();

        for strategy in self.strategies {
            last_strategy = strategy.name.clone();
            match self.attempt(surface, section_id, strategy).await {
                Ok(bitmap) => {
                    let verdict = validator.validate(&bitmap);
                    let (width, height) = (bitmap.width(), bitmap.height());
                    if verdict.accepted {
                        attempts.push(CaptureAttempt {
                            strategy_name: strategy.name.clone(),
                            outcome: AttemptOutcome::Accepted {
                                width,
                                height,
                                content_ratio: verdict.content_ratio,
                            },
                        });
                        return RasterOutcome {
                            result: Ok(AcceptedCapture {
                                bitmap,
                                strategy: strategy.name.clone(),
                                content_ratio: verdict.content_ratio,
                            }),
                            attempts,
                        };
                    }
                    log::debug!(
                        "section '{}': strategy '{}' produced a blank-looking {}x{} bitmap ({:.4})",
                        section_id,
                        strategy.name,
                        width,
                        height,
                        verdict.content_ratio
                    );
                    rejected_ratio = Some(verdict.content_ratio);
                    attempts.push(CaptureAttempt {
                        strategy_name: strategy.name.clone(),
                        outcome: AttemptOutcome::Rejected {
                            width,
                            height,
                            content_ratio: verdict.content_ratio,
                        },
                    });
                }
                Err(reason) => {
                    log::warn!(
                        "section '{}': strategy '{}' failed: {}",
                        section_id,
                        strategy.name,
                        reason
                    );
                    attempts.push(CaptureAttempt {
                        strategy_name: strategy.name.clone(),
                        outcome: AttemptOutcome::Failed { reason },
                    });
                }
            }
            tokio::task::yield_now().await;
        }

        let failure = match rejected_ratio {
            Some(content_ratio) => SectionFailure::ContentRejected {
                last_strategy,
                content_ratio,
            },
            None => SectionFailure::RasterizationExhausted { last_strategy },
        };
        RasterOutcome {
            result: Err(failure),
            attempts,
        }
    }

    async fn attempt<S: Surface + ?Sized>(
        &self,
        surface: &S,
        section_id: &str,
        strategy: &CaptureStrategy,
    ) -> Result<Bitmap, String> {
        if !(strategy.scale.is_finite() && strategy.scale > 0.0) {
            return Err(format!("invalid scale {}", strategy.scale));
        }
        let placed = surface
            .snapshot(section_id)
            .ok_or_else(|| "section disappeared before capture".to_string())?;
        let mut working = placed.node;
        self.prepare_working_copy(&mut working, strategy.freeze_animations);
        self.check_pixel_budget(&working, strategy.scale)?;

        if strategy.offscreen {
            let mount = OffscreenMount::mount(surface, working);
            settle(strategy.settle_ms).await;
            let opts = PaintOptions {
                scale: strategy.scale,
                background: self.background,
                allow_taint: strategy.allow_taint,
                clip: None,
                overlays: &[],
            };
            guarded_paint(mount.node(), &opts)
        } else {
            settle(strategy.settle_ms).await;
            let overlays: Vec<VisualNode> = placed
                .overlays
                .into_iter()
                .filter(|overlay| !self.is_overlay(overlay))
                .collect();
            let opts = PaintOptions {
                scale: strategy.scale,
                background: self.background,
                allow_taint: strategy.allow_taint,
                clip: placed.ancestor_clip,
                overlays: &overlays,
            };
            guarded_paint(&working, &opts)
        }
    }

    fn is_overlay(&self, node: &VisualNode) -> bool {
        node.aria_hidden || node.has_class_marker(self.overlay_markers)
    }

    /// Strips overlays, normalizes backgrounds and optionally freezes
    /// animations. Only ever applied to an owned copy.
    pub(crate) fn prepare_working_copy(&self, root: &mut VisualNode, freeze_animations: bool) {
        strip_overlays(root, &|node: &VisualNode| self.is_overlay(node));
        let background = self.background;
        if root.background.is_none_or(|bg| !bg.is_opaque()) {
            root.background = Some(background);
        }
        let chart_markers = self.chart_markers;
        root.visit_mut(&mut |node| {
            node.shadow = false;
            if node.has_class_marker(chart_markers) {
                node.background = Some(background);
            } else if node.background.is_some_and(is_scrim) {
                node.background = None;
            }
            if freeze_animations {
                if let Some(animation) = node.animation.take() {
                    node.opacity = animation.target_opacity;
                }
            }
        });
    }

    fn check_pixel_budget(&self, node: &VisualNode, scale: f32) -> Result<(), String> {
        let (w, h) = device_size(node.width, node.height, scale)
            .ok_or_else(|| format!("cannot rasterize {}x{} css px", node.width, node.height))?;
        let pixels = w as u64 * h as u64;
        if pixels > self.max_bitmap_pixels {
            return Err(format!(
                "{w}x{h} bitmap exceeds the {} pixel budget",
                self.max_bitmap_pixels
            ));
        }
        Ok(())
    }
}

fn strip_overlays(node: &mut VisualNode, is_overlay: &dyn Fn(&VisualNode) -> bool) {
    node.children.retain(|child| !is_overlay(child));
    for child in &mut node.children {
        strip_overlays(child, is_overlay);
    }
}

/// Dark translucent fills (modal scrims, rgba(0,0,0,x) washes).
fn is_scrim(color: Color) -> bool {
    !color.is_opaque() && !color.is_transparent() && color.r < 0.2 && color.g < 0.2 && color.b < 0.2
}

async fn settle(ms: u64) {
    if ms > 0 {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}

fn guarded_paint(root: &VisualNode, opts: &PaintOptions<'_>) -> Result<Bitmap, String> {
    match catch_unwind(AssertUnwindSafe(|| paint_section(root, opts))) {
        Ok(Ok(bitmap)) => Ok(bitmap),
        Ok(Err(err)) => Err(err.to_string()),
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(format!("painter panicked: {message}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator::ValidatorConfig;
    use crate::visual::{MountId, NodeContent, PlacedNode, RunningAnimation};
    use std::cell::Cell;

    fn overlay_markers() -> Vec<String> {
        vec!["MuiBackdrop-root".to_string(), "MuiTooltip-popper".to_string()]
    }

    fn chart_markers() -> Vec<String> {
        vec!["recharts-wrapper".to_string()]
    }

    fn chart_node() -> VisualNode {
        let mut line = VisualNode::sized(200.0, 100.0);
        line.content = NodeContent::Polyline {
            points: vec![(0.0, 0.0), (200.0, 100.0)],
            stroke: Color::rgb8(25, 118, 210),
            line_width: 4.0,
        };
        VisualNode::sized(200.0, 100.0).with_child(line)
    }

    struct FixedSurface {
        placed: Option<PlacedNode>,
        mounted: Cell<usize>,
        mounts: Cell<usize>,
    }

    impl FixedSurface {
        fn new(placed: PlacedNode) -> Self {
            Self {
                placed: Some(placed),
                mounted: Cell::new(0),
                mounts: Cell::new(0),
            }
        }
    }

    impl Surface for FixedSurface {
        fn snapshot(&self, _section_id: &str) -> Option<PlacedNode> {
            self.placed.clone()
        }

        fn mount_offscreen(&self, _node: &VisualNode) -> MountId {
            self.mounted.set(self.mounted.get() + 1);
            self.mounts.set(self.mounts.get() + 1);
            MountId(self.mounts.get() as u64)
        }

        fn unmount_offscreen(&self, _mount: MountId) {
            self.mounted.set(self.mounted.get() - 1);
        }
    }

    fn rasterizer<'a>(
        strategies: &'a [CaptureStrategy],
        overlays: &'a [String],
        charts: &'a [String],
    ) -> Rasterizer<'a> {
        Rasterizer::new(strategies, overlays, charts, Color::WHITE, 50_000_000)
    }

    #[test]
    fn default_strategy_list_matches_priority_order() {
        let names: Vec<_> = CaptureStrategy::default_list()
            .into_iter()
            .map(|s| (s.name, s.scale, s.allow_taint, s.offscreen))
            .collect();
        assert_eq!(
            names,
            vec![
                ("full-fidelity".to_string(), 3.0, false, false),
                ("allow-taint".to_string(), 2.0, true, false),
                ("offscreen-clone".to_string(), 2.0, true, true),
                ("low-fidelity".to_string(), 1.5, true, true),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn first_accepted_strategy_wins() {
        let surface = FixedSurface::new(PlacedNode::new(chart_node()));
        let strategies = CaptureStrategy::default_list();
        let (overlays, charts) = (overlay_markers(), chart_markers());
        let validator = ContentValidator::new(ValidatorConfig::default());
        let outcome = rasterizer(&strategies, &overlays, &charts)
            .capture(&surface, "chart", &validator)
            .await;
        let accepted = outcome.result.unwrap();
        assert_eq!(accepted.strategy, "full-fidelity");
        assert_eq!((accepted.bitmap.width(), accepted.bitmap.height()), (600, 300));
        assert_eq!(outcome.attempts.len(), 1);
        assert_eq!(surface.mounts.get(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn in_place_capture_leaves_live_nodes_untouched() {
        let scene = r##"{"sections":[{
            "id":"orders",
            "root":{"width":200,"height":100,"background":"#ffffff","children":[
                {"width":120,"height":60,"background":"#1976d2"},
                {"classes":["MuiBackdrop-root"],"width":200,"height":100,"background":"#00000080"}
            ]},
            "overlays":[
                {"x":170,"y":70,"width":20,"height":20,"background":"#ff0000"},
                {"classes":["MuiTooltip-popper"],"x":130,"y":10,"width":40,"height":20,"background":"#000000"}
            ]
        }]}"##;
        let surface = crate::scene::SceneSurface::from_json_str(scene, None).unwrap();
        let before = surface.snapshot("orders").unwrap();
        assert_eq!(before.overlays.len(), 2);

        let strategies = CaptureStrategy::default_list();
        let (overlays, charts) = (overlay_markers(), chart_markers());
        let validator = ContentValidator::new(ValidatorConfig::default());
        let outcome = rasterizer(&strategies, &overlays, &charts)
            .capture(&surface, "orders", &validator)
            .await;
        let accepted = outcome.result.unwrap();
        assert_eq!(accepted.strategy, "full-fidelity");

        let after = surface.snapshot("orders").unwrap();
        assert_eq!(before, after);

        let bitmap = &accepted.bitmap;
        // Scale 3: block at (30, 30), bare root at (160, 50), badge at (180, 80),
        // tooltip at (150, 20).
        assert_eq!(bitmap.pixel(90, 90), Some([25, 118, 210, 255]));
        assert_eq!(bitmap.pixel(480, 150), Some([255, 255, 255, 255]));
        assert_eq!(bitmap.pixel(540, 240), Some([255, 0, 0, 255]));
        assert_eq!(bitmap.pixel(450, 60), Some([255, 255, 255, 255]));
    }

    #[tokio::test(start_paused = true)]
    async fn clipped_section_falls_through_to_offscreen_copy() {
        let mut placed = PlacedNode::new(chart_node());
        // Ancestor scrolled the section almost out of view.
        placed.ancestor_clip = Some(crate::visual::Bounds::new(199.0, 99.0, 1.0, 1.0));
        let surface = FixedSurface::new(placed);
        let strategies = CaptureStrategy::default_list();
        let (overlays, charts) = (overlay_markers(), chart_markers());
        let validator = ContentValidator::new(ValidatorConfig::default());
        let outcome = rasterizer(&strategies, &overlays, &charts)
            .capture(&surface, "chart", &validator)
            .await;
        let accepted = outcome.result.unwrap();
        assert_eq!(accepted.strategy, "offscreen-clone");
        assert!(matches!(
            outcome.attempts[0].outcome,
            AttemptOutcome::Rejected { .. }
        ));
        assert_eq!(surface.mounts.get(), 1);
        assert_eq!(surface.mounted.get(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn blank_section_reports_content_rejected_with_last_strategy() {
        let surface = FixedSurface::new(PlacedNode::new(VisualNode::sized(100.0, 100.0)));
        let strategies = CaptureStrategy::default_list();
        let (overlays, charts) = (overlay_markers(), chart_markers());
        let validator = ContentValidator::new(ValidatorConfig::default());
        let outcome = rasterizer(&strategies, &overlays, &charts)
            .capture(&surface, "blank", &validator)
            .await;
        match outcome.result {
            Err(SectionFailure::ContentRejected {
                last_strategy,
                content_ratio,
            }) => {
                assert_eq!(last_strategy, "low-fidelity");
                assert_eq!(content_ratio, 0.0);
            }
            other => panic!("unexpected result {other:?}"),
        }
        assert_eq!(outcome.attempts.len(), 4);
        assert_eq!(surface.mounted.get(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn oversized_section_exhausts_strategies() {
        let surface = FixedSurface::new(PlacedNode::new(chart_node()));
        let strategies = CaptureStrategy::default_list();
        let (overlays, charts) = (overlay_markers(), chart_markers());
        let validator = ContentValidator::new(ValidatorConfig::default());
        let outcome = Rasterizer::new(&strategies, &overlays, &charts, Color::WHITE, 100)
            .capture(&surface, "chart", &validator)
            .await;
        assert_eq!(
            outcome.result.unwrap_err(),
            SectionFailure::RasterizationExhausted {
                last_strategy: "low-fidelity".to_string()
            }
        );
        assert!(outcome
            .attempts
            .iter()
            .all(|a| matches!(a.outcome, AttemptOutcome::Failed { .. })));
    }

    #[test]
    fn working_copy_prep_strips_overlays_and_normalizes() {
        let (overlays, charts) = (overlay_markers(), chart_markers());
        let strategies = CaptureStrategy::default_list();
        let r = rasterizer(&strategies, &overlays, &charts);

        let mut scrim = VisualNode::sized(10.0, 10.0);
        scrim.background = Some(Color::rgba8(0, 0, 0, 128));
        let mut hidden = VisualNode::sized(10.0, 10.0);
        hidden.aria_hidden = true;
        let mut fading = VisualNode::sized(10.0, 10.0).with_class("recharts-wrapper");
        fading.opacity = 0.1;
        fading.shadow = true;
        fading.animation = Some(RunningAnimation { target_opacity: 1.0 });

        let mut root = VisualNode::sized(100.0, 100.0)
            .with_child(VisualNode::sized(100.0, 100.0).with_class("MuiBackdrop-root"))
            .with_child(hidden)
            .with_child(scrim)
            .with_child(fading);
        r.prepare_working_copy(&mut root, true);

        assert_eq!(root.background, Some(Color::WHITE));
        assert_eq!(root.children.len(), 2);
        assert_eq!(root.children[0].background, None);
        let chart = &root.children[1];
        assert_eq!(chart.background, Some(Color::WHITE));
        assert_eq!(chart.opacity, 1.0);
        assert!(chart.animation.is_none());
        assert!(!chart.shadow);
    }
}
