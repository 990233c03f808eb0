use amo_report::config::{load_stage_config, parse_delimiter, AppConfig};
use amo_report::error::AppError;
use amo_report::report::views::REPORT_COLUMNS;
use amo_report::report::{
    compute_report, tag_options, DealTable, Mode, ReportBundle, ReportError, ReportPeriod,
    ReportRequest, Segment, StageGroupConfig,
};
use chrono::{Local, NaiveDate};
use clap::Args;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub(crate) struct ReportArgs {
    /// Deal export (CSV) to report on
    #[arg(long)]
    pub(crate) deals: PathBuf,
    /// Stage-group YAML (defaults to REPORT_STAGE_CONFIG)
    #[arg(long)]
    pub(crate) config: Option<PathBuf>,
    /// Market segment: RUS, ENG or ESP
    #[arg(long, default_value = "RUS")]
    pub(crate) segment: Segment,
    /// Reporting mode: basket, auto or manager
    #[arg(long, default_value = "manager")]
    pub(crate) mode: Mode,
    /// Funnel to report on (defaults to the first configured for the segment)
    #[arg(long)]
    pub(crate) funnel: Option<String>,
    /// First creation date to include (YYYY-MM-DD, basket mode only)
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) from: Option<NaiveDate>,
    /// Last creation date to include (YYYY-MM-DD, basket mode only)
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) to: Option<NaiveDate>,
    /// Tag to report on, repeatable; omit to report every tag present
    #[arg(long)]
    pub(crate) tag: Vec<String>,
    /// Tag description as TAG=TEXT, repeatable
    #[arg(long, value_parser = crate::infra::parse_description)]
    pub(crate) describe: Vec<(String, String)>,
    /// Override the reporting date (defaults to today)
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) today: Option<NaiveDate>,
    /// CSV delimiter (defaults to REPORT_CSV_DELIMITER)
    #[arg(long, value_parser = parse_delimiter)]
    pub(crate) delimiter: Option<u8>,
    /// Print the report bundle as JSON
    #[arg(long)]
    pub(crate) json: bool,
}

#[derive(Args, Debug)]
pub(crate) struct TagsArgs {
    /// Deal export (CSV) to scan
    #[arg(long)]
    pub(crate) deals: PathBuf,
    /// CSV delimiter (defaults to REPORT_CSV_DELIMITER)
    #[arg(long, value_parser = parse_delimiter)]
    pub(crate) delimiter: Option<u8>,
    /// Print the tags as a JSON array
    #[arg(long)]
    pub(crate) json: bool,
}

#[derive(Args, Debug)]
pub(crate) struct FunnelsArgs {
    /// Stage-group YAML (defaults to REPORT_STAGE_CONFIG)
    #[arg(long)]
    pub(crate) config: Option<PathBuf>,
    /// Only list this segment
    #[arg(long)]
    pub(crate) segment: Option<Segment>,
    /// Reporting mode the funnels are offered for
    #[arg(long, default_value = "manager")]
    pub(crate) mode: Mode,
}

pub(crate) fn run_report(args: ReportArgs) -> Result<(), AppError> {
    let settings = AppConfig::load()?.report;
    let stage_config = match &args.config {
        Some(path) => load_stage_config(path)?,
        None => settings.load_stage_config()?,
    };
    let delimiter = args.delimiter.unwrap_or(settings.csv_delimiter);
    let table = DealTable::from_path(&args.deals, delimiter)?;

    let json = args.json;
    let request = build_request(args, &stage_config)?;
    let bundle = compute_report(&table, &stage_config, &request)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&bundle)?);
    } else {
        println!("{}", render_bundle(&request, &bundle));
    }
    Ok(())
}

pub(crate) fn run_tags(args: TagsArgs) -> Result<(), AppError> {
    let delimiter = match args.delimiter {
        Some(delimiter) => delimiter,
        None => AppConfig::load()?.report.csv_delimiter,
    };
    let table = DealTable::from_path(&args.deals, delimiter)?;
    let tags = tag_options(&table.deals()?);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&tags)?);
    } else if tags.is_empty() {
        println!("No tags found in {}", args.deals.display());
    } else {
        for tag in tags {
            println!("{tag}");
        }
    }
    Ok(())
}

pub(crate) fn run_funnels(args: FunnelsArgs) -> Result<(), AppError> {
    let stage_config = match &args.config {
        Some(path) => load_stage_config(path)?,
        None => AppConfig::load()?.report.load_stage_config()?,
    };

    let segments: Vec<Segment> = match args.segment {
        Some(segment) => vec![segment],
        None => Segment::ordered().to_vec(),
    };

    println!("Funnels for {} reports", args.mode.label());
    for segment in segments {
        let funnels = stage_config.funnels(segment, args.mode);
        if funnels.is_empty() {
            println!("- {segment}: none configured");
        } else {
            println!("- {segment}: {}", funnels.join(", "));
        }
    }
    Ok(())
}

fn build_request(
    args: ReportArgs,
    stage_config: &StageGroupConfig,
) -> Result<ReportRequest, ReportError> {
    let funnel = match args.funnel {
        Some(funnel) => funnel,
        None => stage_config.default_funnel(args.segment, args.mode)?,
    };
    let today = args.today.unwrap_or_else(|| Local::now().date_naive());

    let mut request = ReportRequest::new(args.segment, funnel, args.mode, today)
        .with_tags(args.tag)
        .with_descriptions(args.describe.into_iter().collect());
    if let Some(period) = ReportPeriod::from_bounds(args.from, args.to)? {
        request = request.with_period(period);
    }
    Ok(request)
}

/// Plain-text rendering: header, metrics table, then reply contacts per tag.
pub(crate) fn render_bundle(request: &ReportRequest, bundle: &ReportBundle) -> String {
    let header = &bundle.header;
    let mut lines = vec![
        format!("{} ({}, {})", header.title, request.segment, request.funnel),
        format!("Period: {}", header.period),
    ];
    if !header.handed_to_sales.is_empty() {
        let elapsed = header
            .days_since_handoff
            .map(|days| format!(" ({days} days ago)"))
            .unwrap_or_default();
        lines.push(format!("Handed to sales: {}{elapsed}", header.handed_to_sales));
    }

    lines.push(String::new());
    if bundle.rows.is_empty() {
        lines.push("No deals matched the selected tags.".to_string());
    } else {
        lines.extend(render_table(bundle));
        if bundle.revenue_from_default_stages() {
            lines.push(
                "Revenue counted from the built-in stage list: no revenue group is configured."
                    .to_string(),
            );
        }
    }

    lines.push(String::new());
    lines.push("Replied contacts".to_string());
    for entry in &bundle.reply_contacts {
        lines.push(format!("{}:", entry.tag));
        if entry.contacts.is_empty() {
            lines.push("  none".to_string());
        }
        for contact in &entry.contacts {
            match &contact.id {
                Some(id) => lines.push(format!("  - {} (ID {id})", contact.primary_contact)),
                None => lines.push(format!("  - {}", contact.primary_contact)),
            }
        }
    }

    lines.join("\n")
}

fn render_table(bundle: &ReportBundle) -> Vec<String> {
    let rows: Vec<[String; 13]> = bundle.rows.iter().map(|row| row.cells()).collect();
    let with_descriptions = bundle.rows.iter().any(|row| row.description.is_some());
    let columns: Vec<usize> = (0..REPORT_COLUMNS.len())
        .filter(|&index| index != 1 || with_descriptions)
        .collect();

    let widths: Vec<usize> = columns
        .iter()
        .map(|&index| {
            rows.iter()
                .map(|cells| cells[index].chars().count())
                .chain(std::iter::once(REPORT_COLUMNS[index].chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let format_line = |cells: Vec<&str>| {
        cells
            .iter()
            .zip(&widths)
            .map(|(cell, &width)| format!("{cell:<width$}"))
            .collect::<Vec<_>>()
            .join(" | ")
            .trim_end()
            .to_string()
    };

    let mut lines = vec![format_line(
        columns.iter().map(|&index| REPORT_COLUMNS[index]).collect(),
    )];
    lines.push(
        widths
            .iter()
            .map(|&width| "-".repeat(width))
            .collect::<Vec<_>>()
            .join("-+-"),
    );
    for cells in &rows {
        lines.push(format_line(
            columns.iter().map(|&index| cells[index].as_str()).collect(),
        ));
    }
    lines
}
