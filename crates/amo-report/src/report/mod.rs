//! Funnel-conversion reporting over CRM deal exports, sliced by deal tags.
//!
//! The pipeline runs export table → normalization → stage classification →
//! tag explosion → per-slice metrics and contact lists → [`ReportBundle`].

mod assembler;
mod contacts;
pub mod deals;
pub mod metrics;
pub mod normalizer;
pub mod stages;
pub mod tags;
pub mod views;

pub use assembler::{
    build_header, compute_report, operational_cutoff, ReportPeriod, ReportRequest,
    ALL_DEALS_LABEL,
};
pub use contacts::replied_contacts;
pub use deals::{Deal, DealTable, REQUIRED_COLUMNS};
pub use metrics::{Mode, SliceMetrics};
pub use stages::{Segment, StageGroup, StageGroupConfig, StageList};
pub use tags::{parse_tags, tag_options};
pub use views::{ContactRecord, ReportBundle, ReportHeader, ReportRow, TagContacts};

/// Failures that abort a whole report. Malformed cells never end up here.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("required columns not found: {}", .0.join(", "))]
    MissingColumns(Vec<String>),
    #[error("unsupported mode '{0}', expected basket, auto or manager")]
    UnsupportedMode(String),
    #[error("unknown segment '{0}', expected RUS, ENG or ESP")]
    UnknownSegment(String),
    #[error("invalid report period: {0}")]
    InvalidPeriod(String),
    #[error("no funnel given and none configured for segment {0}")]
    MissingFunnel(Segment),
    #[error("failed to read deal export: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid deal export: {0}")]
    Csv(#[from] csv::Error),
}
