use crate::bitmap::Bitmap;
use crate::types::Color;
use std::sync::Arc;

/// Axis-aligned box in CSS pixels, relative to the section root.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Bounds {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Bounds {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageState {
    Loading,
    Loaded,
    Errored,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageContent {
    pub bitmap: Option<Arc<Bitmap>>,
    pub state: ImageState,
    /// Served from another origin. Painting it taints the capture unless the
    /// strategy allows that.
    pub cross_origin: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeContent {
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
    Image(ImageContent),
}

/// A fade or transition still in flight. The node's current `opacity` is the
/// mid-flight value; `target_opacity` is where it ends.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunningAnimation {
    pub target_opacity: f32,
}

/// One node of a rendered section. Positions are CSS pixels relative to the
/// parent; the root's own `x`/`y` are its page position and are ignored when
/// painting.
#[derive(Debug, Clone, PartialEq)]
pub struct VisualNode {
    pub classes: Vec<String>,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub background: Option<Color>,
    pub opacity: f32,
    pub shadow: bool,
    pub aria_hidden: bool,
    pub animation: Option<RunningAnimation>,
    pub content: NodeContent,
    pub children: Vec<VisualNode>,
}

impl Default for VisualNode {
    fn default() -> Self {
        Self {
            classes: Vec::new(),
            x: 0.0,
            y: 0.0,
            width: 0.0,
            height: 0.0,
            background: None,
            opacity: 1.0,
            shadow: false,
            aria_hidden: false,
            animation: None,
            content: NodeContent::None,
            children: Vec::new(),
        }
    }
}

impl VisualNode {
    pub fn sized(width: f32, height: f32) -> Self {
        Self {
            width,
            height,
            ..Self::default()
        }
    }

    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.classes.push(class.into());
        self
    }

    pub fn with_child(mut self, child: VisualNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn has_zero_size(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }

    /// Class names match by substring, so `MuiBackdrop-root` also hits
    /// `MuiBackdrop-root-invisible`.
    pub fn has_class_marker(&self, markers: &[String]) -> bool {
        self.classes
            .iter()
            .any(|class| markers.iter().any(|m| !m.is_empty() && class.contains(m.as_str())))
    }

    pub fn visit(&self, f: &mut impl FnMut(&VisualNode)) {
        f(self);
        for child in &self.children {
            child.visit(f);
        }
    }

    pub fn visit_mut(&mut self, f: &mut impl FnMut(&mut VisualNode)) {
        f(self);
        for child in &mut self.children {
            child.visit_mut(f);
        }
    }

    pub fn contains_marker(&self, markers: &[String]) -> bool {
        let mut found = false;
        self.visit(&mut |node| found |= node.has_class_marker(markers));
        found
    }

    pub fn pending_images(&self) -> usize {
        let mut count = 0;
        self.visit(&mut |node| {
            if let NodeContent::Image(img) = &node.content {
                if img.state == ImageState::Loading {
                    count += 1;
                }
            }
        });
        count
    }

    pub fn running_animations(&self) -> usize {
        let mut count = 0;
        self.visit(&mut |node| {
            if node.animation.is_some() {
                count += 1;
            }
        });
        count
    }

    pub fn node_count(&self) -> usize {
        let mut count = 0;
        self.visit(&mut |_| count += 1);
        count
    }
}

/// A section root as it currently sits in the live UI.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedNode {
    pub node: VisualNode,
    /// Visible window left by clipping ancestors, in root coordinates.
    pub ancestor_clip: Option<Bounds>,
    /// Page-level layers drawn above the section (modal scrims, tooltips).
    pub overlays: Vec<VisualNode>,
}

impl PlacedNode {
    pub fn new(node: VisualNode) -> Self {
        Self {
            node,
            ancestor_clip: None,
            overlays: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MountId(pub u64);

/// The rendered UI the pipeline captures from. Everything handed out is an
/// owned copy; nothing here lets a caller touch live nodes.
pub trait Surface {
    fn snapshot(&self, section_id: &str) -> Option<PlacedNode>;

    /// Attaches a working copy outside the visible viewport.
    fn mount_offscreen(&self, node: &VisualNode) -> MountId;

    fn unmount_offscreen(&self, mount: MountId);
}

/// Off-screen working copy that stays mounted for the guard's lifetime.
pub struct OffscreenMount<'a, S: Surface + ?Sized> {
    surface: &'a S,
    id: MountId,
    node: VisualNode,
}

impl<'a, S: Surface + ?Sized> OffscreenMount<'a, S> {
    pub fn mount(surface: &'a S, node: VisualNode) -> Self {
        let id = surface.mount_offscreen(&node);
        log::debug!("mounted off-screen copy {:?}", id);
        Self { surface, id, node }
    }

    pub fn node(&self) -> &VisualNode {
        &self.node
    }

    pub fn id(&self) -> MountId {
        self.id
    }
}

impl<S: Surface + ?Sized> Drop for OffscreenMount<'_, S> {
    fn drop(&mut self) {
        self.surface.unmount_offscreen(self.id);
        log::debug!("unmounted off-screen copy {:?}", self.id);
    }
}
