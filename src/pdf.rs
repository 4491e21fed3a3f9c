use crate::bitmap::Bitmap;
use crate::canvas::{Command, Document, Page};
use crate::types::{Color, Pt, Size};
use chrono::NaiveDateTime;
use fixed::types::I32F32;
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, Write};
use std::sync::Arc;

const REGULAR_FONT: &str = "Helvetica";
const BOLD_FONT: &str = "Helvetica-Bold";

/// Document information dictionary entries.
#[derive(Debug, Clone)]
pub struct PdfInfo<'a> {
    pub title: &'a str,
    pub producer: &'a str,
    pub creation_date: NaiveDateTime,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PdfStats {
    pub total_bytes: usize,
    pub page_content_bytes: Vec<usize>,
    pub image_bytes: usize,
    /// Characters outside WinAnsi that were written as `?`.
    pub replaced_chars: usize,
}

struct EncodedImage {
    name: String,
    rgb: Vec<u8>,
    alpha: Option<Vec<u8>>,
    width: u32,
    height: u32,
}

/// Serializes a finished document. Images are compressed in parallel; every
/// other step is sequential so the same document always yields the same bytes.
pub fn document_to_pdf(document: &Document, info: &PdfInfo<'_>) -> io::Result<(Vec<u8>, PdfStats)> {
    let mut out = Vec::new();
    let stats = write_document(&mut out, document, info)?;
    Ok((out, stats))
}

fn write_document<W: Write>(
    writer: &mut W,
    document: &Document,
    info: &PdfInfo<'_>,
) -> io::Result<PdfStats> {
    let mut stats = PdfStats::default();
    let images = encode_images(&document.images)?;
    let image_names: BTreeMap<&str, &str> = document
        .images
        .keys()
        .zip(images.iter())
        .map(|(id, img)| (id.as_str(), img.name.as_str()))
        .collect();

    // Fixed ids: 1 catalog, 2 page tree, 3 regular font, 4 bold font, 5 info.
    let mut objects: Vec<Vec<u8>> = vec![
        Vec::new(),
        Vec::new(),
        font_object(REGULAR_FONT).into_bytes(),
        font_object(BOLD_FONT).into_bytes(),
        info_object(info, &mut stats).into_bytes(),
    ];

    let mut image_ids: BTreeMap<&str, usize> = BTreeMap::new();
    for image in &images {
        let smask_id = match &image.alpha {
            Some(alpha) => {
                let body = image_stream(
                    image.width,
                    image.height,
                    "/DeviceGray",
                    alpha,
                    None,
                );
                stats.image_bytes += alpha.len();
                objects.push(body);
                Some(objects.len())
            }
            None => None,
        };
        stats.image_bytes += image.rgb.len();
        objects.push(image_stream(
            image.width,
            image.height,
            "/DeviceRGB",
            &image.rgb,
            smask_id,
        ));
        image_ids.insert(image.name.as_str(), objects.len());
    }

    let mut page_ids = Vec::with_capacity(document.pages.len());
    for page in &document.pages {
        let (content, replaced) = render_page(page, document.page_size, &image_names);
        stats.replaced_chars += replaced;
        stats.page_content_bytes.push(content.len());
        objects.push(stream_object(content.as_bytes()));
        let content_id = objects.len();

        let used = used_images(page, &image_names);
        let xobjects = used
            .iter()
            .filter_map(|name| image_ids.get(name).map(|id| format!("/{name} {id} 0 R")))
            .collect::<Vec<_>>()
            .join(" ");
        let page_obj = format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {} {}] /Contents {} 0 R /Resources << /Font << /F1 3 0 R /F2 4 0 R >> /XObject << {} >> >> >>",
            fmt_pt(document.page_size.width),
            fmt_pt(document.page_size.height),
            content_id,
            xobjects
        );
        objects.push(page_obj.into_bytes());
        page_ids.push(objects.len());
    }

    objects[0] = b"<< /Type /Catalog /Pages 2 0 R >>".to_vec();
    let kids = page_ids
        .iter()
        .map(|id| format!("{id} 0 R"))
        .collect::<Vec<_>>()
        .join(" ");
    objects[1] = format!(
        "<< /Type /Pages /Kids [{}] /Count {} >>",
        kids,
        page_ids.len()
    )
    .into_bytes();

    stats.total_bytes = write_objects(writer, &objects)?;
    Ok(stats)
}

fn write_objects<W: Write>(writer: &mut W, objects: &[Vec<u8>]) -> io::Result<usize> {
    let mut offset = 0usize;
    write_bytes(writer, b"%PDF-1.7\n%\xE2\xE3\xCF\xD3\n", &mut offset)?;
    let mut offsets = Vec::with_capacity(objects.len());
    for (index, body) in objects.iter().enumerate() {
        offsets.push(offset);
        write_bytes(writer, format!("{} 0 obj\n", index + 1).as_bytes(), &mut offset)?;
        write_bytes(writer, body, &mut offset)?;
        write_bytes(writer, b"\nendobj\n", &mut offset)?;
    }
    let xref_start = offset;
    write_bytes(
        writer,
        format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1).as_bytes(),
        &mut offset,
    )?;
    for entry in offsets {
        write_bytes(writer, format!("{entry:010} 00000 n \n").as_bytes(), &mut offset)?;
    }
    let trailer = format!(
        "trailer\n<< /Size {} /Root 1 0 R /Info 5 0 R >>\nstartxref\n{}\n%%EOF\n",
        objects.len() + 1,
        xref_start
    );
    write_bytes(writer, trailer.as_bytes(), &mut offset)?;
    Ok(offset)
}

fn write_bytes<W: Write>(writer: &mut W, data: &[u8], offset: &mut usize) -> io::Result<()> {
    writer.write_all(data)?;
    *offset += data.len();
    Ok(())
}

fn encode_images(images: &BTreeMap<String, Arc<Bitmap>>) -> io::Result<Vec<EncodedImage>> {
    let bitmaps: Vec<&Arc<Bitmap>> = images.values().collect();
    bitmaps
        .par_iter()
        .enumerate()
        .map(|(index, bitmap)| {
            let (rgb, alpha) = bitmap.split_planes();
            let alpha = if bitmap.has_transparency() {
                Some(flate_compress(&alpha)?)
            } else {
                None
            };
            Ok(EncodedImage {
                name: format!("Im{}", index + 1),
                rgb: flate_compress(&rgb)?,
                alpha,
                width: bitmap.width(),
                height: bitmap.height(),
            })
        })
        .collect()
}

fn used_images<'a>(page: &Page, names: &BTreeMap<&str, &'a str>) -> BTreeSet<&'a str> {
    page.commands
        .iter()
        .filter_map(|cmd| match cmd {
            Command::DrawImage { resource_id, .. } => names.get(resource_id.as_str()).copied(),
            _ => None,
        })
        .collect()
}

fn render_page(page: &Page, page_size: Size, image_names: &BTreeMap<&str, &str>) -> (String, usize) {
    let page_height = page_size.height;
    let mut out = String::new();
    let mut replaced = 0usize;
    let mut font_name = REGULAR_FONT.to_string();
    let mut font_size = Pt::from_f32(12.0);
    let mut saved: Vec<(String, Pt)> = Vec::new();

    for cmd in &page.commands {
        match cmd {
            Command::SaveState => {
                saved.push((font_name.clone(), font_size));
                out.push_str("q\n");
            }
            Command::RestoreState => {
                if let Some((name, size)) = saved.pop() {
                    font_name = name;
                    font_size = size;
                }
                out.push_str("Q\n");
            }
            Command::Translate(x, y) => {
                out.push_str(&format!("1 0 0 1 {} {} cm\n", fmt_pt(*x), fmt_pt(*y)));
            }
            Command::Rotate(angle) => {
                let sin = libm::sinf(*angle);
                let cos = libm::cosf(*angle);
                out.push_str(&format!(
                    "{} {} {} {} 0 0 cm\n",
                    fmt(cos),
                    fmt(sin),
                    fmt(-sin),
                    fmt(cos)
                ));
            }
            Command::Meta { .. } => {}
            Command::SetFillColor(color) => out.push_str(&color_op(*color, "rg")),
            Command::SetStrokeColor(color) => out.push_str(&color_op(*color, "RG")),
            Command::SetLineWidth(width) => {
                out.push_str(&format!("{} w\n", fmt_pt(*width)));
            }
            Command::SetFontName(name) => font_name = name.clone(),
            Command::SetFontSize(size) => font_size = *size,
            Command::MoveTo { x, y } => {
                out.push_str(&format!("{} {} m\n", fmt_pt(*x), fmt_pt(page_height - *y)));
            }
            Command::LineTo { x, y } => {
                out.push_str(&format!("{} {} l\n", fmt_pt(*x), fmt_pt(page_height - *y)));
            }
            Command::Stroke => out.push_str("S\n"),
            Command::DrawString { x, y, text } => {
                let encoded = encode_winansi_pdf_string(text);
                replaced += encoded.replaced;
                out.push_str("BT\n");
                out.push_str(&format!(
                    "/{} {} Tf\n",
                    font_resource(&font_name),
                    fmt_pt(font_size)
                ));
                out.push_str(&format!(
                    "{} {} Td\n",
                    fmt_pt(*x),
                    fmt_pt(page_height - *y - font_size)
                ));
                out.push_str(&format!("({}) Tj\nET\n", encoded.text));
            }
            Command::DrawRect {
                x,
                y,
                width,
                height,
            } => {
                out.push_str(&format!(
                    "{} {} {} {} re\nf\n",
                    fmt_pt(*x),
                    fmt_pt(page_height - *y - *height),
                    fmt_pt(*width),
                    fmt_pt(*height)
                ));
            }
            Command::StrokeRect {
                x,
                y,
                width,
                height,
            } => {
                out.push_str(&format!(
                    "{} {} {} {} re\nS\n",
                    fmt_pt(*x),
                    fmt_pt(page_height - *y - *height),
                    fmt_pt(*width),
                    fmt_pt(*height)
                ));
            }
            Command::DrawImage {
                x,
                y,
                width,
                height,
                resource_id,
            } => {
                let Some(name) = image_names.get(resource_id.as_str()) else {
                    log::warn!("image resource '{resource_id}' missing; skipped");
                    continue;
                };
                out.push_str("q\n");
                out.push_str(&format!(
                    "{} 0 0 {} {} {} cm\n",
                    fmt_pt(*width),
                    fmt_pt(*height),
                    fmt_pt(*x),
                    fmt_pt(page_height - *y - *height)
                ));
                out.push_str(&format!("/{name} Do\nQ\n"));
            }
        }
    }
    (out, replaced)
}

fn font_resource(name: &str) -> &'static str {
    if name == BOLD_FONT { "F2" } else { "F1" }
}

fn font_object(name: &str) -> String {
    format!("<< /Type /Font /Subtype /Type1 /BaseFont /{name} /Encoding /WinAnsiEncoding >>")
}

fn info_object(info: &PdfInfo<'_>, stats: &mut PdfStats) -> String {
    let title = encode_winansi_pdf_string(info.title);
    let producer = encode_winansi_pdf_string(info.producer);
    stats.replaced_chars += title.replaced + producer.replaced;
    format!(
        "<< /Title ({}) /Producer ({}) /CreationDate (D:{}) >>",
        title.text,
        producer.text,
        info.creation_date.format("%Y%m%d%H%M%S")
    )
}

fn stream_object(content: &[u8]) -> Vec<u8> {
    let mut out = format!("<< /Length {} >>\nstream\n", content.len()).into_bytes();
    out.extend_from_slice(content);
    out.extend_from_slice(b"\nendstream");
    out
}

fn image_stream(
    width: u32,
    height: u32,
    color_space: &str,
    data: &[u8],
    smask_id: Option<usize>,
) -> Vec<u8> {
    let smask = smask_id
        .map(|id| format!(" /SMask {id} 0 R"))
        .unwrap_or_default();
    let mut out = format!(
        "<< /Type /XObject /Subtype /Image /Width {width} /Height {height} /ColorSpace {color_space} /BitsPerComponent 8 /Filter /FlateDecode /Length {}{smask} >>\nstream\n",
        data.len()
    )
    .into_bytes();
    out.extend_from_slice(data);
    out.extend_from_slice(b"\nendstream");
    out
}

fn flate_compress(data: &[u8]) -> io::Result<Vec<u8>> {
    use flate2::Compression;
    use flate2::write::ZlibEncoder;

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

fn color_op(color: Color, op: &str) -> String {
    format!(
        "{} {} {} {}\n",
        fmt(color.r.clamp(0.0, 1.0)),
        fmt(color.g.clamp(0.0, 1.0)),
        fmt(color.b.clamp(0.0, 1.0)),
        op
    )
}

struct WinAnsiEncoded {
    text: String,
    replaced: usize,
}

fn encode_winansi_pdf_string(input: &str) -> WinAnsiEncoded {
    let mut out = String::new();
    let mut replaced = 0usize;
    for ch in input.chars() {
        // Not in WinAnsi; spelled out in ASCII.
        match ch {
            '\u{2265}' => {
                out.push_str(">=");
                continue;
            }
            '\u{2264}' => {
                out.push_str("<=");
                continue;
            }
            _ => {}
        }
        let byte = match ch {
            '\u{0000}'..='\u{007F}' => ch as u8,
            '\u{00A0}'..='\u{00FF}' => ch as u8,
            // cp1252 extensions
            '\u{20AC}' => 0x80,
            '\u{201A}' => 0x82,
            '\u{0192}' => 0x83,
            '\u{201E}' => 0x84,
            '\u{2026}' => 0x85,
            '\u{2020}' => 0x86,
            '\u{2021}' => 0x87,
            '\u{02C6}' => 0x88,
            '\u{2030}' => 0x89,
            '\u{0160}' => 0x8A,
            '\u{2039}' => 0x8B,
            '\u{0152}' => 0x8C,
            '\u{017D}' => 0x8E,
            '\u{2018}' => 0x91,
            '\u{2019}' => 0x92,
            '\u{201C}' => 0x93,
            '\u{201D}' => 0x94,
            '\u{2022}' => 0x95,
            '\u{2013}' => 0x96,
            '\u{2014}' => 0x97,
            '\u{02DC}' => 0x98,
            '\u{2122}' => 0x99,
            '\u{0161}' => 0x9A,
            '\u{203A}' => 0x9B,
            '\u{0153}' => 0x9C,
            '\u{017E}' => 0x9E,
            '\u{0178}' => 0x9F,
            _ => {
                replaced += 1;
                b'?'
            }
        };
        match byte {
            b'\\' => out.push_str("\\\\"),
            b'(' => out.push_str("\\("),
            b')' => out.push_str("\\)"),
            b if !(0x20..0x7f).contains(&b) => out.push_str(&format!("\\{b:03o}")),
            b => out.push(b as char),
        }
    }
    WinAnsiEncoded {
        text: out,
        replaced,
    }
}

fn fmt(value: f32) -> String {
    if !value.is_finite() {
        return "0".to_string();
    }
    let fixed = I32F32::from_num(value);
    let scaled = (fixed * I32F32::from_num(1000)).round();
    let milli: i64 = scaled.to_num();
    format_milli(milli)
}

fn fmt_pt(value: Pt) -> String {
    format_milli(value.to_milli_i64())
}

fn format_milli(milli: i64) -> String {
    if milli == 0 {
        return "0".to_string();
    }
    let sign = if milli < 0 { "-" } else { "" };
    let abs = milli.unsigned_abs();
    let int_part = abs / 1000;
    let frac_part = abs % 1000;
    if frac_part == 0 {
        return format!("{sign}{int_part}");
    }
    let mut s = format!("{sign}{int_part}.{frac_part:03}");
    while s.ends_with('0') {
        s.pop();
    }
    s
}
