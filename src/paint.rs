use crate::bitmap::Bitmap;
use crate::types::Color;
use crate::visual::{Bounds, ImageState, NodeContent, VisualNode};
use tiny_skia::{
    FillRule, FilterQuality, LineCap, LineJoin, Mask, Paint, PathBuilder, Pixmap, PixmapPaint,
    Rect, Stroke, Transform,
};

const SHADOW_OFFSET: f32 = 2.0;
const GLYPH_ADVANCE: f32 = 0.6;

/// Settings for one paint pass over a section tree.
#[derive(Debug, Clone)]
pub(crate) struct PaintOptions<'a> {
    pub scale: f32,
    pub background: Color,
    pub allow_taint: bool,
    pub clip: Option<Bounds>,
    pub overlays: &'a [VisualNode],
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum PaintError {
    InvalidSize { width: f32, height: f32, scale: f32 },
}

impl std::fmt::Display for PaintError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaintError::InvalidSize {
                width,
                height,
                scale,
            } => write!(f, "cannot paint {width}x{height} css px at scale {scale}"),
        }
    }
}

/// Device pixel size of a `width` x `height` css box at `scale`.
pub(crate) fn device_size(width: f32, height: f32, scale: f32) -> Option<(u32, u32)> {
    let w = (width * scale).ceil();
    let h = (height * scale).ceil();
    if !(w.is_finite() && h.is_finite()) || w < 1.0 || h < 1.0 {
        return None;
    }
    if w > u32::MAX as f32 || h > u32::MAX as f32 {
        return None;
    }
    Some((w as u32, h as u32))
}

/// Paints `root` (at its own origin) onto a fresh pixmap filled with the
/// background color.
pub(crate) fn paint_section(root: &VisualNode, opts: &PaintOptions<'_>) -> Result<Bitmap, PaintError> {
    let invalid = || PaintError::InvalidSize {
        width: root.width,
        height: root.height,
        scale: opts.scale,
    };
    let (width_px, height_px) = device_size(root.width, root.height, opts.scale).ok_or_else(invalid)?;
    let mut pixmap = Pixmap::new(width_px, height_px).ok_or_else(invalid)?;
    pixmap.fill(opts.background.to_skia());

    let base = Transform::from_scale(opts.scale, opts.scale);
    let mask = opts
        .clip
        .and_then(|clip| clip_mask(clip, base, width_px, height_px));

    paint_node(&mut pixmap, root, base, 1.0, opts.allow_taint, mask.as_ref());
    for overlay in opts.overlays {
        let at = base.pre_translate(overlay.x, overlay.y);
        paint_node(&mut pixmap, overlay, at, 1.0, opts.allow_taint, None);
    }
    Ok(Bitmap::from_pixmap(&pixmap))
}

fn clip_mask(clip: Bounds, base: Transform, width: u32, height: u32) -> Option<Mask> {
    let rect = Rect::from_xywh(clip.x, clip.y, clip.width.max(0.0), clip.height.max(0.0))?;
    let path = PathBuilder::from_rect(rect);
    let mut mask = Mask::new(width, height)?;
    mask.fill_path(&path, FillRule::Winding, true, base);
    Some(mask)
}

fn paint_node(
    pixmap: &mut Pixmap,
    node: &VisualNode,
    transform: Transform,
    inherited_opacity: f32,
    allow_taint: bool,
    mask: Option<&Mask>,
) {
    let opacity = (inherited_opacity * node.opacity).clamp(0.0, 1.0);
    if opacity <= 0.0 || node.has_zero_size() {
        return;
    }
    let bounds = Rect::from_xywh(0.0, 0.0, node.width, node.height);

    if node.shadow {
        if let Some(rect) = Rect::from_xywh(SHADOW_OFFSET, SHADOW_OFFSET, node.width, node.height) {
            let shadow = Color::rgba8(0, 0, 0, 51);
            pixmap.fill_rect(rect, &fill_paint(shadow, opacity), transform, mask);
        }
    }
    if let (Some(bg), Some(rect)) = (node.background, bounds) {
        if !bg.is_transparent() {
            pixmap.fill_rect(rect, &fill_paint(bg, opacity), transform, mask);
        }
    }

    match &node.content {
        NodeContent::None => {}
        NodeContent::Polyline {
            points,
            stroke,
            line_width,
        } => stroke_polyline(pixmap, points, *stroke, *line_width, opacity, transform, mask),
        NodeContent::Text { text, color, size } => {
            draw_greeked_text(pixmap, text, *color, *size, opacity, transform, mask)
        }
        NodeContent::Image(img) => {
            let paintable = img.state == ImageState::Loaded && (!img.cross_origin || allow_taint);
            if let (true, Some(bitmap)) = (paintable, img.bitmap.as_ref()) {
                draw_bitmap(pixmap, bitmap, node.width, node.height, opacity, transform, mask);
            }
        }
    }

    for child in &node.children {
        let at = transform.pre_translate(child.x, child.y);
        paint_node(pixmap, child, at, opacity, allow_taint, mask);
    }
}

fn stroke_polyline(
    pixmap: &mut Pixmap,
    points: &[(f32, f32)],
    color: Color,
    line_width: f32,
    opacity: f32,
    transform: Transform,
    mask: Option<&Mask>,
) {
    let mut iter = points.iter();
    let Some(&(x0, y0)) = iter.next() else {
        return;
    };
    let mut pb = PathBuilder::new();
    pb.move_to(x0, y0);
    for &(x, y) in iter {
        pb.line_to(x, y);
    }
    let Some(path) = pb.finish() else {
        return;
    };
    let mut stroke = Stroke::default();
    stroke.width = line_width.max(0.0);
    stroke.line_cap = LineCap::Round;
    stroke.line_join = LineJoin::Round;
    pixmap.stroke_path(&path, &fill_paint(color, opacity), &stroke, transform, mask);
}

/// Text is drawn as one solid box per visible glyph. Captures only need ink
/// in the right place, not legible type.
fn draw_greeked_text(
    pixmap: &mut Pixmap,
    text: &str,
    color: Color,
    size: f32,
    opacity: f32,
    transform: Transform,
    mask: Option<&Mask>,
) {
    let paint = fill_paint(color, opacity);
    let glyph_h = size * 0.7;
    let glyph_w = size * 0.5;
    let top = size - glyph_h;
    let mut x = 0.0;
    for ch in text.chars() {
        if !ch.is_whitespace() {
            if let Some(rect) = Rect::from_xywh(x, top, glyph_w, glyph_h) {
                pixmap.fill_rect(rect, &paint, transform, mask);
            }
        }
        x += size * GLYPH_ADVANCE;
    }
}

fn draw_bitmap(
    pixmap: &mut Pixmap,
    bitmap: &Bitmap,
    width: f32,
    height: f32,
    opacity: f32,
    transform: Transform,
    mask: Option<&Mask>,
) {
    let Some(source) = bitmap.to_pixmap() else {
        return;
    };
    let sx = width / source.width() as f32;
    let sy = height / source.height() as f32;
    let paint = PixmapPaint {
        opacity,
        quality: FilterQuality::Bilinear,
        ..PixmapPaint::default()
    };
    pixmap.draw_pixmap(0, 0, source.as_ref(), &paint, transform.pre_scale(sx, sy), mask);
}

fn fill_paint(color: Color, opacity: f32) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color(color.with_alpha(color.a * opacity).to_skia());
    paint.anti_alias = true;
    paint
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::visual::ImageContent;
    use std::sync::Arc;

    fn opts(scale: f32) -> PaintOptions<'static> {
        PaintOptions {
            scale,
            background: Color::WHITE,
            allow_taint: false,
            clip: None,
            overlays: &[],
        }
    }

    #[test]
    fn output_size_follows_scale_without_clamping() {
        let root = VisualNode::sized(100.0, 40.0);
        let bitmap = paint_section(&root, &opts(3.0)).unwrap();
        assert_eq!((bitmap.width(), bitmap.height()), (300, 120));
        assert_eq!(bitmap.pixel(0, 0), Some([255, 255, 255, 255]));
    }

    #[test]
    fn zero_size_root_is_an_error() {
        let root = VisualNode::sized(0.0, 40.0);
        assert!(matches!(
            paint_section(&root, &opts(2.0)),
            Err(PaintError::InvalidSize { .. })
        ));
    }

    #[test]
    fn clip_hides_content_outside_the_window() {
        let mut root = VisualNode::sized(10.0, 10.0);
        root.background = Some(Color::BLACK);
        let options = PaintOptions {
            clip: Some(Bounds::new(0.0, 0.0, 5.0, 10.0)),
            ..opts(1.0)
        };
        let bitmap = paint_section(&root, &options).unwrap();
        assert_eq!(bitmap.pixel(1, 5), Some([0, 0, 0, 255]));
        assert_eq!(bitmap.pixel(8, 5), Some([255, 255, 255, 255]));
    }

    #[test]
    fn cross_origin_images_need_taint_permission() {
        let mut root = VisualNode::sized(4.0, 4.0);
        root.content = NodeContent::Image(ImageContent {
            bitmap: Some(Arc::new(Bitmap::filled(2, 2, [0, 0, 0, 255]))),
            state: ImageState::Loaded,
            cross_origin: true,
        });
        let blocked = paint_section(&root, &opts(1.0)).unwrap();
        assert_eq!(blocked.pixel(2, 2), Some([255, 255, 255, 255]));

        let allowed = paint_section(
            &root,
            &PaintOptions {
                allow_taint: true,
                ..opts(1.0)
            },
        )
        .unwrap();
        assert_eq!(allowed.pixel(2, 2), Some([0, 0, 0, 255]));
    }

    #[test]
    fn invisible_subtrees_are_skipped() {
        let mut root = VisualNode::sized(10.0, 10.0);
        let mut child = VisualNode::sized(10.0, 10.0);
        child.background = Some(Color::BLACK);
        root.opacity = 0.0;
        root.children.push(child);
        let bitmap = paint_section(&root, &opts(1.0)).unwrap();
        assert!(bitmap
            .pixels()
            .chunks_exact(4)
            .all(|px| px == [255, 255, 255, 255]));
    }
}
