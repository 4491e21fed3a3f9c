//! dashcapture CLI - export dashboard scenes to PDF reports

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use dashcapture::{
    DateRange, DirectorySink, ExportConfig, ExportError, ExportHooks, ExportJobReport,
    ExportMetadata, ExportOutput, ExportRequest, Exporter, FilterEntry, ProgressEvent, SceneSurface,
    SectionRequest, inspect_pdf_path, title_from_id,
};

#[derive(Parser)]
#[command(name = "dashcapture")]
#[command(version)]
#[command(about = "Capture dashboard sections and assemble them into a PDF report", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture the sections of a scene file and write the PDF
    Export(ExportArgs),

    /// List the section ids of a scene file
    Sections {
        #[arg(long, value_name = "FILE")]
        scene: PathBuf,
    },

    /// Show page count and metadata of an exported PDF
    Inspect {
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },
}

#[derive(clap::Args)]
struct ExportArgs {
    /// Scene file (JSON)
    #[arg(long, value_name = "FILE")]
    scene: PathBuf,

    /// Document title
    #[arg(long)]
    title: String,

    /// Section to export, in order, as ID or ID=CAPTION (repeatable)
    #[arg(long = "section", value_name = "ID=CAPTION")]
    sections: Vec<String>,

    /// Export configuration (JSON); missing fields take defaults
    #[arg(long, value_name = "FILE", env = "DASHCAPTURE_CONFIG")]
    config: Option<PathBuf>,

    /// Output directory
    #[arg(long, value_name = "DIR", default_value = ".")]
    out_dir: PathBuf,

    /// Output file name (".pdf" is appended when missing)
    #[arg(short, long, value_name = "NAME")]
    output: Option<String>,

    /// Subtitle line under the title
    #[arg(long)]
    subtitle: Option<String>,

    /// Company line in the header
    #[arg(long)]
    company: Option<String>,

    /// Period start (YYYY-MM-DD)
    #[arg(long, value_name = "DATE", requires = "to")]
    from: Option<String>,

    /// Period end (YYYY-MM-DD)
    #[arg(long, value_name = "DATE", requires = "from")]
    to: Option<String>,

    /// Active filter as LABEL=VALUE; commas make a list (repeatable)
    #[arg(long = "filter", value_name = "LABEL=VALUE")]
    filters: Vec<String>,

    /// Write the job report as JSON
    #[arg(long, value_name = "FILE")]
    report: Option<PathBuf>,

    /// Write a JSONL capture trace
    #[arg(long, value_name = "FILE")]
    trace: Option<PathBuf>,

    /// Write each captured bitmap as PNG into this directory
    #[arg(long, value_name = "DIR")]
    captures_dir: Option<PathBuf>,
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Export(args) => cmd_export(args),
        Commands::Sections { scene } => cmd_sections(&scene),
        Commands::Inspect { input } => cmd_inspect(&input),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        let code = if e.is_configuration_error() { 2 } else { 1 };
        std::process::exit(code);
    }
}

fn cmd_export(args: ExportArgs) -> Result<(), ExportError> {
    let config = match &args.config {
        Some(path) => ExportConfig::from_json_path(path)?,
        None => ExportConfig::default(),
    };
    let mut builder = Exporter::builder().config(config);
    if let Some(path) = &args.trace {
        builder = builder.trace_path(path);
    }
    let exporter = builder.build()?;

    let surface = SceneSurface::from_path(&args.scene)?;
    let sections = if args.sections.is_empty() {
        surface
            .section_ids()
            .into_iter()
            .map(|id| {
                let caption = title_from_id(&id);
                SectionRequest::new(id, caption)
            })
            .collect()
    } else {
        args.sections
            .iter()
            .map(|raw| parse_section(raw))
            .collect::<Result<Vec<_>, _>>()?
    };

    let mut request = ExportRequest::new(args.title.clone(), sections).metadata(metadata(&args)?);
    if let Some(name) = &args.output {
        request = request.output_name(name.clone());
    }

    let pb = ProgressBar::new(request.sections.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb.enable_steady_tick(Duration::from_millis(120));
    let progress_bar = pb.clone();
    let hooks = ExportHooks::new().on_progress(move |event: &ProgressEvent| {
        let mark = if event.succeeded { "ok" } else { "skipped" };
        progress_bar.set_position(event.current as u64);
        progress_bar.set_message(format!("{} {}", event.section_id, mark));
    });

    let mut sink = DirectorySink::new(&args.out_dir);
    let runtime = tokio::runtime::Runtime::new()?;
    let output = runtime.block_on(exporter.export(&surface, &request, &mut sink, hooks));
    pb.finish_and_clear();
    let output = output?;

    if let Some(dir) = &args.captures_dir {
        write_captures(dir, &output)?;
    }
    if let Some(path) = &args.report {
        write_report(path, &output.report)?;
    }

    let written = sink
        .last_written()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| output.document.name.clone());
    log::info!(
        "exported {written}: {} section(s) in {} page(s), {} bytes",
        output.report.succeeded_sections,
        output.document.page_count,
        output.document.bytes.len()
    );
    println!("{written}");
    println!(
        "{} ({} page(s))",
        output.report.summary_line(),
        output.document.page_count
    );
    for section in output.report.sections.iter().filter(|s| !s.succeeded) {
        println!(
            "  skipped {}: {}",
            section.section_id,
            section.failure_message.as_deref().unwrap_or("unknown failure")
        );
    }
    Ok(())
}

fn cmd_sections(scene: &Path) -> Result<(), ExportError> {
    let surface = SceneSurface::from_path(scene)?;
    for id in surface.section_ids() {
        println!("{id}\t{}", title_from_id(&id));
    }
    Ok(())
}

fn cmd_inspect(input: &Path) -> Result<(), ExportError> {
    let report = inspect_pdf_path(input).map_err(|e| ExportError::Assembly(e.to_string()))?;
    println!("File:      {}", input.display());
    println!("Version:   PDF {}", report.pdf_version);
    println!("Pages:     {}", report.page_count);
    println!("Size:      {} bytes", report.file_size_bytes);
    println!("Encrypted: {}", report.encrypted);
    if let Some(title) = report.title {
        println!("Title:     {title}");
    }
    Ok(())
}

fn parse_section(raw: &str) -> Result<SectionRequest, ExportError> {
    let (id, caption) = match raw.split_once('=') {
        Some((id, caption)) => (id.trim(), caption.trim().to_string()),
        None => (raw.trim(), String::new()),
    };
    if id.is_empty() {
        return Err(ExportError::InvalidRequest(format!(
            "--section '{raw}' needs an id"
        )));
    }
    let caption = if caption.is_empty() {
        title_from_id(id)
    } else {
        caption
    };
    Ok(SectionRequest::new(id, caption))
}

fn parse_filter(raw: &str) -> Result<FilterEntry, ExportError> {
    let Some((label, value)) = raw.split_once('=') else {
        return Err(ExportError::InvalidRequest(format!(
            "--filter '{raw}' must be LABEL=VALUE"
        )));
    };
    if value.contains(',') {
        let values = value.split(',').map(|v| v.trim().to_string()).collect();
        Ok(FilterEntry::list(label.trim(), values))
    } else {
        Ok(FilterEntry::text(label.trim(), value.trim()))
    }
}

fn parse_date(raw: &str) -> Result<NaiveDate, ExportError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|e| ExportError::InvalidRequest(format!("date '{raw}': {e}")))
}

fn metadata(args: &ExportArgs) -> Result<ExportMetadata, ExportError> {
    let date_range = match (&args.from, &args.to) {
        (Some(from), Some(to)) => {
            let range = DateRange::new(parse_date(from)?, parse_date(to)?);
            if range.end < range.start {
                return Err(ExportError::InvalidRequest(format!(
                    "period ends ({to}) before it starts ({from})"
                )));
            }
            Some(range)
        }
        _ => None,
    };
    Ok(ExportMetadata {
        subtitle: args.subtitle.clone(),
        company: args.company.clone(),
        date_range,
        filters: args
            .filters
            .iter()
            .map(|raw| parse_filter(raw))
            .collect::<Result<_, _>>()?,
    })
}

fn write_report(path: &Path, report: &ExportJobReport) -> Result<(), ExportError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut writer = std::io::BufWriter::new(fs::File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, report)
        .map_err(|e| ExportError::Io(std::io::Error::other(e)))?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    log::debug!("wrote report {}", path.display());
    Ok(())
}

fn write_captures(dir: &Path, output: &ExportOutput) -> Result<(), ExportError> {
    fs::create_dir_all(dir)?;
    for result in &output.results {
        let Some(bitmap) = result.bitmap() else {
            continue;
        };
        let png = bitmap
            .encode_png()
            .map_err(|e| ExportError::Io(std::io::Error::other(e)))?;
        fs::write(dir.join(format!("{}.png", result.section_id())), png)?;
    }
    Ok(())
}
