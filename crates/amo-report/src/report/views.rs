use super::metrics::{format_percent, SliceMetrics};
use serde::{Deserialize, Serialize};

/// Column captions for tabular renderings of [`ReportRow`], in field order.
pub const REPORT_COLUMNS: [&str; 13] = [
    "Tag",
    "Description",
    "Count",
    "Processed",
    "% processed",
    "Contact",
    "% contact",
    "Ignored",
    "% ignored",
    "Replied (purchase)",
    "Revenue, €",
    "CR, %",
    "Purchase conversion, %",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportHeader {
    pub title: String,
    pub period: String,
    /// Operational cutoff, when deals were handed to sales (`15.Oct`).
    pub handed_to_sales: String,
    pub days_since_handoff: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRow {
    pub tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub count: usize,
    pub processed: usize,
    pub processed_pct: String,
    pub contact: usize,
    pub contact_pct: String,
    pub ignored: usize,
    pub ignored_pct: String,
    pub replied: usize,
    pub revenue: f64,
    pub conversion_rate: String,
    pub purchase_conversion: String,
    /// Revenue was summed over the built-in stage list because no revenue
    /// group is configured.
    #[serde(default)]
    pub revenue_from_default_stages: bool,
}

impl ReportRow {
    pub fn from_metrics(tag: String, description: Option<String>, metrics: &SliceMetrics) -> Self {
        Self {
            tag,
            description,
            count: metrics.count,
            processed: metrics.processed,
            processed_pct: format_percent(metrics.processed_pct),
            contact: metrics.contact,
            contact_pct: format_percent(metrics.contact_pct),
            ignored: metrics.ignored,
            ignored_pct: format_percent(metrics.ignored_pct),
            replied: metrics.replied,
            revenue: metrics.revenue,
            conversion_rate: format_percent(metrics.conversion_rate_pct),
            purchase_conversion: format_percent(metrics.purchase_conversion_pct),
            revenue_from_default_stages: metrics.revenue_from_default_stages,
        }
    }

    /// Cell values in [`REPORT_COLUMNS`] order.
    pub fn cells(&self) -> [String; 13] {
        [
            self.tag.clone(),
            self.description.clone().unwrap_or_default(),
            self.count.to_string(),
            self.processed.to_string(),
            self.processed_pct.clone(),
            self.contact.to_string(),
            self.contact_pct.clone(),
            self.ignored.to_string(),
            self.ignored_pct.clone(),
            self.replied.to_string(),
            format!("{:.2}", self.revenue),
            self.conversion_rate.clone(),
            self.purchase_conversion.clone(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContactRecord {
    pub primary_contact: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagContacts {
    pub tag: String,
    pub contacts: Vec<ContactRecord>,
}

/// Everything a presentation or export collaborator needs from one report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportBundle {
    pub header: ReportHeader,
    pub rows: Vec<ReportRow>,
    pub reply_contacts: Vec<TagContacts>,
}

impl ReportBundle {
    /// Whether any row's revenue comes from the built-in stage list.
    pub fn revenue_from_default_stages(&self) -> bool {
        self.rows.iter().any(|row| row.revenue_from_default_stages)
    }

    pub fn row(&self, tag: &str) -> Option<&ReportRow> {
        self.rows.iter().find(|row| row.tag == tag)
    }

    pub fn contacts_for(&self, tag: &str) -> Option<&[ContactRecord]> {
        self.reply_contacts
            .iter()
            .find(|entry| entry.tag == tag)
            .map(|entry| entry.contacts.as_slice())
    }
}
