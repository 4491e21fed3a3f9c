use crate::visual::{PlacedNode, Surface};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::{Instant, sleep};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessConfig {
    pub poll_interval_ms: u64,
    pub layout_timeout_ms: u64,
    pub image_timeout_ms: u64,
    pub chart_settle_ms: u64,
    pub animation_timeout_ms: u64,
    pub final_settle_ms: u64,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 50,
            layout_timeout_ms: 2000,
            image_timeout_ms: 1000,
            chart_settle_ms: 1500,
            animation_timeout_ms: 3000,
            final_settle_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadinessCheck {
    Layout,
    Images,
    Animations,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadinessReport {
    pub waited: Duration,
    /// Checks that hit their cap. Capture goes ahead regardless.
    pub timed_out: Vec<ReadinessCheck>,
    pub chart_detected: bool,
}

/// Waits until a section looks safe to rasterize, or until each check's cap
/// runs out. Never fails and never touches the surface beyond snapshots.
pub struct ReadinessWaiter<'a> {
    config: &'a ReadinessConfig,
    chart_markers: &'a [String],
}

impl<'a> ReadinessWaiter<'a> {
    pub fn new(config: &'a ReadinessConfig, chart_markers: &'a [String]) -> Self {
        Self {
            config,
            chart_markers,
        }
    }

    pub async fn wait<S: Surface + ?Sized>(&self, surface: &S, section_id: &str) -> ReadinessReport {
        let started = Instant::now();
        let mut report = ReadinessReport::default();

        let layout = self
            .poll_until(surface, section_id, self.config.layout_timeout_ms, |p| {
                !p.node.has_zero_size()
            })
            .await;
        if !layout {
            report.timed_out.push(ReadinessCheck::Layout);
        }

        let images = self
            .poll_until(surface, section_id, self.config.image_timeout_ms, |p| {
                p.node.pending_images() == 0
            })
            .await;
        if !images {
            report.timed_out.push(ReadinessCheck::Images);
        }

        report.chart_detected = surface
            .snapshot(section_id)
            .is_some_and(|p| p.node.contains_marker(self.chart_markers));
        if report.chart_detected && self.config.chart_settle_ms > 0 {
            sleep(Duration::from_millis(self.config.chart_settle_ms)).await;
        }

        let animations = self
            .poll_until(surface, section_id, self.config.animation_timeout_ms, |p| {
                p.node.running_animations() == 0
            })
            .await;
        if !animations {
            report.timed_out.push(ReadinessCheck::Animations);
        }

        if self.config.final_settle_ms > 0 {
            sleep(Duration::from_millis(self.config.final_settle_ms)).await;
        }

        report.waited = started.elapsed();
        if !report.timed_out.is_empty() {
            log::debug!(
                "section '{}' not fully ready after {:?}: {:?}",
                section_id,
                report.waited,
                report.timed_out
            );
        }
        report
    }

    /// Polls snapshots until `done` holds. Returns false when the cap ran out.
    /// A section that disappears counts as done; the caller sees the miss on
    /// its next lookup.
    async fn poll_until<S, F>(&self, surface: &S, section_id: &str, cap_ms: u64, done: F) -> bool
    where
        S: Surface + ?Sized,
        F: Fn(&PlacedNode) -> bool,
    {
        let deadline = Instant::now() + Duration::from_millis(cap_ms);
        let interval = Duration::from_millis(self.config.poll_interval_ms.max(1));
        loop {
            match surface.snapshot(section_id) {
                None => return true,
                Some(placed) if done(&placed) => return true,
                Some(_) => {}
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            sleep(interval.min(deadline - now)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::SceneSurface;

    fn markers() -> Vec<String> {
        vec!["recharts-wrapper".to_string()]
    }

    fn assert_waited(report: &ReadinessReport, ms: u64) {
        let expected = Duration::from_millis(ms);
        assert!(
            report.waited >= expected && report.waited < expected + Duration::from_millis(25),
            "waited {:?}, expected about {:?}",
            report.waited,
            expected
        );
    }

    #[tokio::test(start_paused = true)]
    async fn ready_section_returns_without_waiting() {
        let surface = SceneSurface::from_json_str(
            r#"{"sections":[{"id":"a","root":{"width":10,"height":10}}]}"#,
            None,
        )
        .unwrap();
        let config = ReadinessConfig::default();
        let markers = markers();
        let report = ReadinessWaiter::new(&config, &markers).wait(&surface, "a").await;
        assert_eq!(report.waited, Duration::ZERO);
        assert!(report.timed_out.is_empty());
        assert!(!report.chart_detected);
    }

    #[tokio::test(start_paused = true)]
    async fn chart_marker_adds_settle_delay() {
        let surface = SceneSurface::from_json_str(
            r#"{"sections":[{"id":"c","root":{"width":10,"height":10,
                "children":[{"classes":["recharts-wrapper"],"width":5,"height":5}]}}]}"#,
            None,
        )
        .unwrap();
        let config = ReadinessConfig::default();
        let markers = markers();
        let report = ReadinessWaiter::new(&config, &markers).wait(&surface, "c").await;
        assert!(report.chart_detected);
        assert_waited(&report, 1500);
    }

    #[tokio::test(start_paused = true)]
    async fn never_laid_out_section_times_out_at_the_cap() {
        let surface = SceneSurface::from_json_str(
            r#"{"sections":[{"id":"z","root":{"width":10,"height":0}}]}"#,
            None,
        )
        .unwrap();
        let config = ReadinessConfig::default();
        let markers = markers();
        let report = ReadinessWaiter::new(&config, &markers).wait(&surface, "z").await;
        assert_eq!(report.timed_out, vec![ReadinessCheck::Layout]);
        assert_waited(&report, 2000);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_for_delayed_layout_and_slow_images() {
        let surface = SceneSurface::from_json_str(
            r#"{"sections":[{"id":"s","root":{"width":10,"height":10,"layout_delay_ms":120,
                "children":[{"width":5,"height":5,
                    "content":{"type":"image","src":"x.png","fails":true,"load_delay_ms":5000}}]}}]}"#,
            None,
        )
        .unwrap();
        let config = ReadinessConfig::default();
        let markers = markers();
        let report = ReadinessWaiter::new(&config, &markers).wait(&surface, "s").await;
        assert_eq!(report.timed_out, vec![ReadinessCheck::Images]);
        // Layout settles on the 150ms poll, then the 1s image cap runs out.
        assert_waited(&report, 1150);
    }
}
