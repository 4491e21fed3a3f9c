//! JSON scene files: a stand-in for a live dashboard.
//!
//! A scene describes each section's visual tree plus how it settles over
//! time: delayed layout, images that load (or fail) after a delay, and fade-in
//! transitions. [`SceneSurface`] replays that timeline against the tokio clock,
//! so every snapshot shows the section as it looks at that instant.

use crate::bitmap::Bitmap;
use crate::error::ExportError;
use crate::types::Color;
use crate::visual::{
    Bounds, ImageContent, ImageState, MountId, NodeContent, PlacedNode, RunningAnimation, Surface,
    VisualNode,
};
use base64::Engine;
use serde::Deserialize;
use std::cell::Cell;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::time::Instant;

#[derive(Debug, Clone, Deserialize)]
pub struct SceneFile {
    pub sections: Vec<SceneSection>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SceneSection {
    pub id: String,
    pub root: SceneNode,
    #[serde(default)]
    pub clip: Option<Bounds>,
    #[serde(default)]
    pub overlays: Vec<SceneNode>,
}

fn one() -> f32 {
    1.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct SceneNode {
    #[serde(default)]
    pub classes: Vec<String>,
    #[serde(default)]
    pub x: f32,
    #[serde(default)]
    pub y: f32,
    #[serde(default)]
    pub width: f32,
    #[serde(default)]
    pub height: f32,
    /// Width and height read as zero until this much time has passed.
    #[serde(default)]
    pub layout_delay_ms: u64,
    #[serde(default)]
    pub background: Option<Color>,
    #[serde(default = "one")]
    pub opacity: f32,
    #[serde(default)]
    pub shadow: bool,
    #[serde(default)]
    pub aria_hidden: bool,
    #[serde(default)]
    pub transition: Option<SceneTransition>,
    #[serde(default)]
    pub content: SceneContent,
    #[serde(default)]
    pub children: Vec<SceneNode>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SceneTransition {
    pub from_opacity: f32,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SceneContent {
    #[default]
    None,
    Polyline {
        points: Vec<[f32; 2]>,
        #[serde(default = "default_stroke")]
        stroke: Color,
        #[serde(default = "default_line_width")]
        line_width: f32,
    },
    Text {
        text: String,
        #[serde(default = "default_text_color")]
        color: Color,
        #[serde(default = "default_text_size")]
        size: f32,
    },
    Image {
        src: String,
        #[serde(default)]
        load_delay_ms: u64,
        #[serde(default)]
        fails: bool,
        #[serde(default)]
        cross_origin: bool,
    },
}

fn default_stroke() -> Color {
    Color::rgb8(25, 118, 210)
}

fn default_line_width() -> f32 {
    2.0
}

fn default_text_color() -> Color {
    Color::rgb8(33, 33, 33)
}

fn default_text_size() -> f32 {
    14.0
}

#[derive(Debug, Clone)]
enum LoadedContent {
    None,
    Polyline {
        points: Vec<(f32, f32)>,
        stroke: Color,
        line_width: f32,
    },
    Text {
        text: String,
        color: Color,
        size: f32,
    },
    Image {
        bitmap: Option<Arc<Bitmap>>,
        load_delay_ms: u64,
        fails: bool,
        cross_origin: bool,
    },
}

#[derive(Debug, Clone)]
struct LoadedNode {
    source: SceneNode,
    content: LoadedContent,
    children: Vec<LoadedNode>,
}

#[derive(Debug, Clone)]
struct LoadedSection {
    id: String,
    root: LoadedNode,
    clip: Option<Bounds>,
    overlays: Vec<LoadedNode>,
}

/// A [`Surface`] backed by a scene file. Timings are measured from
/// construction.
pub struct SceneSurface {
    sections: Vec<LoadedSection>,
    started: Instant,
    next_mount: Cell<u64>,
    mounted: Cell<usize>,
    total_mounts: Cell<usize>,
}

impl SceneSurface {
    pub fn from_scene(scene: SceneFile, base_dir: Option<&Path>) -> Result<Self, ExportError> {
        let mut seen = HashSet::new();
        let mut sections = Vec::with_capacity(scene.sections.len());
        for section in scene.sections {
            if section.id.trim().is_empty() {
                return Err(ExportError::Scene("section id must not be empty".to_string()));
            }
            if !seen.insert(section.id.clone()) {
                return Err(ExportError::Scene(format!(
                    "duplicate section id '{}'",
                    section.id
                )));
            }
            let root = load_node(section.root, base_dir)?;
            let overlays = section
                .overlays
                .into_iter()
                .map(|node| load_node(node, base_dir))
                .collect::<Result<Vec<_>, _>>()?;
            sections.push(LoadedSection {
                id: section.id,
                root,
                clip: section.clip,
                overlays,
            });
        }
        Ok(Self {
            sections,
            started: Instant::now(),
            next_mount: Cell::new(1),
            mounted: Cell::new(0),
            total_mounts: Cell::new(0),
        })
    }

    pub fn from_json_str(raw: &str, base_dir: Option<&Path>) -> Result<Self, ExportError> {
        let scene: SceneFile = serde_json::from_str(raw)
            .map_err(|e| ExportError::Scene(format!("invalid scene json: {e}")))?;
        Self::from_scene(scene, base_dir)
    }

    /// Image paths in the file resolve relative to its directory.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ExportError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let base = path.parent().map(PathBuf::from);
        Self::from_json_str(&raw, base.as_deref())
    }

    pub fn section_ids(&self) -> Vec<String> {
        self.sections.iter().map(|s| s.id.clone()).collect()
    }

    /// Off-screen copies currently attached.
    pub fn mounted_count(&self) -> usize {
        self.mounted.get()
    }

    pub fn total_mounts(&self) -> usize {
        self.total_mounts.get()
    }

    fn elapsed_ms(&self) -> u64 {
        let elapsed = Instant::now().saturating_duration_since(self.started);
        u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
    }
}

impl Surface for SceneSurface {
    fn snapshot(&self, section_id: &str) -> Option<PlacedNode> {
        let section = self.sections.iter().find(|s| s.id == section_id)?;
        let now = self.elapsed_ms();
        Some(PlacedNode {
            node: materialize(&section.root, now),
            ancestor_clip: section.clip,
            overlays: section
                .overlays
                .iter()
                .map(|node| materialize(node, now))
                .collect(),
        })
    }

    fn mount_offscreen(&self, _node: &VisualNode) -> MountId {
        let id = self.next_mount.get();
        self.next_mount.set(id.saturating_add(1));
        self.mounted.set(self.mounted.get().saturating_add(1));
        self.total_mounts.set(self.total_mounts.get().saturating_add(1));
        MountId(id)
    }

    fn unmount_offscreen(&self, _mount: MountId) {
        self.mounted.set(self.mounted.get().saturating_sub(1));
    }
}

fn load_node(node: SceneNode, base_dir: Option<&Path>) -> Result<LoadedNode, ExportError> {
    let content = match &node.content {
        SceneContent::None => LoadedContent::None,
        SceneContent::Polyline {
            points,
            stroke,
            line_width,
        } => LoadedContent::Polyline {
            points: points.iter().map(|p| (p[0], p[1])).collect(),
            stroke: *stroke,
            line_width: *line_width,
        },
        SceneContent::Text { text, color, size } => LoadedContent::Text {
            text: text.clone(),
            color: *color,
            size: *size,
        },
        SceneContent::Image {
            src,
            load_delay_ms,
            fails,
            cross_origin,
        } => {
            let bitmap = if *fails {
                None
            } else {
                Some(Arc::new(load_image(src, base_dir)?))
            };
            LoadedContent::Image {
                bitmap,
                load_delay_ms: *load_delay_ms,
                fails: *fails,
                cross_origin: *cross_origin,
            }
        }
    };
    let mut source = node;
    let children = std::mem::take(&mut source.children)
        .into_iter()
        .map(|child| load_node(child, base_dir))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(LoadedNode {
        source,
        content,
        children,
    })
}

pub(crate) fn load_image(src: &str, base_dir: Option<&Path>) -> Result<Bitmap, ExportError> {
    let bytes = if let Some(data) = parse_data_uri(src) {
        data
    } else {
        let path = Path::new(src);
        let path = match base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        };
        std::fs::read(&path).map_err(|e| {
            ExportError::Scene(format!("failed to read image {}: {e}", path.display()))
        })?
    };
    Bitmap::decode(&bytes).map_err(|e| ExportError::Scene(format!("failed to decode image: {e}")))
}

fn parse_data_uri(uri: &str) -> Option<Vec<u8>> {
    let rest = uri.strip_prefix("data:")?;
    let (header, payload) = rest.split_once(',')?;
    if header.contains(";base64") {
        base64::engine::general_purpose::STANDARD
            .decode(payload.trim())
            .ok()
    } else {
        Some(payload.as_bytes().to_vec())
    }
}

fn materialize(node: &LoadedNode, now_ms: u64) -> VisualNode {
    let src = &node.source;
    let laid_out = now_ms >= src.layout_delay_ms;
    let (opacity, animation) = match src.transition {
        Some(t) if now_ms < t.duration_ms => {
            let progress = now_ms as f32 / t.duration_ms.max(1) as f32;
            let current = t.from_opacity + (src.opacity - t.from_opacity) * progress;
            (
                current,
                Some(RunningAnimation {
                    target_opacity: src.opacity,
                }),
            )
        }
        _ => (src.opacity, None),
    };
    let content = match &node.content {
        LoadedContent::None => NodeContent::None,
        LoadedContent::Polyline {
            points,
            stroke,
            line_width,
        } => NodeContent::Polyline {
            points: points.clone(),
            stroke: *stroke,
            line_width: *line_width,
        },
        LoadedContent::Text { text, color, size } => NodeContent::Text {
            text: text.clone(),
            color: *color,
            size: *size,
        },
        LoadedContent::Image {
            bitmap,
            load_delay_ms,
            fails,
            cross_origin,
        } => {
            let state = if now_ms < *load_delay_ms {
                ImageState::Loading
            } else if *fails {
                ImageState::Errored
            } else {
                ImageState::Loaded
            };
            NodeContent::Image(ImageContent {
                bitmap: bitmap.clone(),
                state,
                cross_origin: *cross_origin,
            })
        }
    };
    VisualNode {
        classes: src.classes.clone(),
        x: src.x,
        y: src.y,
        width: if laid_out { src.width } else { 0.0 },
        height: if laid_out { src.height } else { 0.0 },
        background: src.background,
        opacity,
        shadow: src.shadow,
        aria_hidden: src.aria_hidden,
        animation,
        content,
        children: node
            .children
            .iter()
            .map(|child| materialize(child, now_ms))
            .collect(),
    }
}
