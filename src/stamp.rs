use crate::canvas::{Command, Document};
use crate::config::{BrandingConfig, PageConfig, WatermarkConfig};
use crate::types::{Color, Pt};
use chrono::NaiveDateTime;

const FOOTER_FONT_SIZE: f32 = 8.0;
const BOLD_FONT: &str = "Helvetica-Bold";
const REGULAR_FONT: &str = "Helvetica";

/// Width estimate for the base-14 Helvetica faces: 0.6em per character.
pub(crate) fn approx_text_width(text: &str, font_size: Pt) -> Pt {
    let char_width = (font_size * 0.6).max(Pt::from_f32(1.0));
    char_width * text.chars().count() as f32
}

pub fn substitute_placeholders(template: &str, page_number: usize, page_count: usize) -> String {
    template
        .replace("{page}", &page_number.to_string())
        .replace("{pages}", &page_count.to_string())
}

/// Footer texts for one page: left, center, right.
pub fn footer_texts(
    branding: &BrandingConfig,
    generated_at: NaiveDateTime,
    page_number: usize,
    page_count: usize,
) -> [String; 3] {
    let left = match branding.footer_note.as_deref().map(str::trim) {
        Some(note) if !note.is_empty() => format!("{} · {}", branding.system_name, note),
        _ => branding.system_name.clone(),
    };
    let center = substitute_placeholders(&branding.page_label, page_number, page_count);
    let right = generated_at
        .format(&branding.timestamp_format)
        .to_string();
    [left, center, right]
}

/// Runs once the page count is final: appends the footer to every page and
/// slides the watermark underneath its content.
pub fn stamp_pages(
    document: &mut Document,
    page: &PageConfig,
    branding: &BrandingConfig,
    generated_at: NaiveDateTime,
) {
    let page_count = document.pages.len();
    for (index, target) in document.pages.iter_mut().enumerate() {
        let texts = footer_texts(branding, generated_at, index + 1, page_count);
        target
            .commands
            .extend(footer_commands(page, branding, &texts));
        if let Some(watermark) = &branding.watermark {
            let mut commands = watermark_commands(page, watermark);
            commands.append(&mut target.commands);
            target.commands = commands;
        }
    }
    log::debug!("stamped footer on {page_count} pages");
}

fn footer_commands(page: &PageConfig, branding: &BrandingConfig, texts: &[String; 3]) -> Vec<Command> {
    let size = Pt::from_f32(FOOTER_FONT_SIZE);
    let left = page.margins.left;
    let right = page.size.width - page.margins.right;
    let rule_y = page.usable_bottom() + Pt::from_f32(8.0);
    let text_y = rule_y + Pt::from_f32(6.0);
    let [left_text, center_text, right_text] = texts;

    let mut commands = vec![
        Command::SaveState,
        Command::SetStrokeColor(Color::rgb8(224, 224, 224)),
        Command::SetLineWidth(Pt::from_f32(0.5)),
        Command::MoveTo { x: left, y: rule_y },
        Command::LineTo { x: right, y: rule_y },
        Command::Stroke,
        Command::SetFillColor(branding.muted_color),
        Command::SetFontName(REGULAR_FONT.to_string()),
        Command::SetFontSize(size),
    ];
    if !left_text.is_empty() {
        commands.push(Command::DrawString {
            x: left,
            y: text_y,
            text: left_text.clone(),
        });
    }
    if !center_text.is_empty() {
        let width = approx_text_width(center_text, size);
        commands.push(Command::DrawString {
            x: (page.size.width - width) / 2,
            y: text_y,
            text: center_text.clone(),
        });
    }
    if !right_text.is_empty() {
        let width = approx_text_width(right_text, size);
        commands.push(Command::DrawString {
            x: right - width,
            y: text_y,
            text: right_text.clone(),
        });
    }
    commands.push(Command::RestoreState);
    commands
}

fn watermark_commands(page: &PageConfig, watermark: &WatermarkConfig) -> Vec<Command> {
    if watermark.text.trim().is_empty() {
        return Vec::new();
    }
    let width = approx_text_width(&watermark.text, watermark.font_size);
    // After the translate the origin is the page center; DrawString still
    // flips y against the page height, so the baseline offset goes there.
    let baseline = page.size.height - watermark.font_size * 0.65;
    vec![
        Command::SaveState,
        Command::SetFillColor(watermark.color),
        Command::SetFontName(BOLD_FONT.to_string()),
        Command::SetFontSize(watermark.font_size),
        Command::Translate(page.size.width / 2, page.size.height / 2),
        Command::Rotate(watermark.angle_degrees.to_radians()),
        Command::DrawString {
            x: Pt::ZERO - width / 2,
            y: baseline,
            text: watermark.text.clone(),
        },
        Command::RestoreState,
    ]
}
