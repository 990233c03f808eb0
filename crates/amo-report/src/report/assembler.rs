use super::contacts::replied_contacts;
use super::deals::DealTable;
use super::metrics::{Mode, SliceMetrics};
use super::normalizer::{normalize_deals, normalize_text, NormalizedDeal};
use super::stages::{ResolvedGroups, Segment, StageGroupConfig};
use super::tags::{collect_unique_tags, explode_by_tags, TagKey};
use super::views::{ReportBundle, ReportHeader, ReportRow, TagContacts};
use super::ReportError;
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

/// Label of the single aggregate slice of untagged basket reports.
pub const ALL_DEALS_LABEL: &str = "All deals";

const UNDATED_PERIOD: &str = "by selected tags (no date filter)";

/// Inclusive creation-date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportPeriod {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl ReportPeriod {
    pub fn new(from: NaiveDate, to: NaiveDate) -> Self {
        Self { from, to }
    }

    /// Builds a period from optional bounds. Both bounds or neither must be
    /// given, and `from` may not come after `to`.
    pub fn from_bounds(
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Option<Self>, ReportError> {
        match (from, to) {
            (None, None) => Ok(None),
            (Some(from), Some(to)) if from > to => Err(ReportError::InvalidPeriod(format!(
                "start {from} is after end {to}"
            ))),
            (Some(from), Some(to)) => Ok(Some(Self::new(from, to))),
            (Some(_), None) => Err(ReportError::InvalidPeriod("missing end date".to_string())),
            (None, Some(_)) => Err(ReportError::InvalidPeriod(
                "missing start date".to_string(),
            )),
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from <= date && date <= self.to
    }
}

/// Parameters of one report invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRequest {
    pub segment: Segment,
    pub funnel: String,
    pub mode: Mode,
    pub period: Option<ReportPeriod>,
    /// Tags in display order; empty means every tag found in the data.
    pub tags: Vec<String>,
    /// Descriptions keyed by tag, matched on the normalized form.
    pub tag_descriptions: HashMap<String, String>,
    pub today: NaiveDate,
}

impl ReportRequest {
    pub fn new(segment: Segment, funnel: impl Into<String>, mode: Mode, today: NaiveDate) -> Self {
        Self {
            segment,
            funnel: funnel.into(),
            mode,
            period: None,
            tags: Vec::new(),
            tag_descriptions: HashMap::new(),
            today,
        }
    }

    pub fn with_period(mut self, period: ReportPeriod) -> Self {
        self.period = Some(period);
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_descriptions(mut self, descriptions: HashMap<String, String>) -> Self {
        self.tag_descriptions = descriptions;
        self
    }
}

/// Most recent Wednesday on or before `end`.
pub fn operational_cutoff(end: NaiveDate) -> NaiveDate {
    let weekday = end.weekday().num_days_from_monday();
    let wednesday = Weekday::Wed.num_days_from_monday();
    let days_back = (weekday + 7 - wednesday) % 7;
    end - Duration::days(i64::from(days_back))
}

pub fn build_header(mode: Mode, period: Option<ReportPeriod>, today: NaiveDate) -> ReportHeader {
    match period {
        Some(period) if mode.filters_by_date() => {
            let cutoff = operational_cutoff(period.to);
            ReportHeader {
                title: mode.label().to_string(),
                period: format!(
                    "from {} to {}",
                    period.from.format("%d %B"),
                    period.to.format("%d %B")
                ),
                handed_to_sales: cutoff.format("%d.%b").to_string(),
                days_since_handoff: Some((today - cutoff).num_days()),
            }
        }
        _ => ReportHeader {
            title: mode.label().to_string(),
            period: UNDATED_PERIOD.to_string(),
            handed_to_sales: String::new(),
            days_since_handoff: None,
        },
    }
}

/// Computes the tag-sliced funnel report for one export.
///
/// Missing required columns fail before anything is computed. Deals are
/// filtered by funnel and, for basket reports, by creation date; each
/// resolved tag then gets one metrics row and one contact list.
pub fn compute_report(
    table: &DealTable,
    config: &StageGroupConfig,
    request: &ReportRequest,
) -> Result<ReportBundle, ReportError> {
    let deals = table.deals()?;
    let period = request.period.filter(|_| request.mode.filters_by_date());
    let funnel = normalize_text(&request.funnel);

    let rows: Vec<NormalizedDeal> = normalize_deals(deals)
        .into_iter()
        .filter(|row| row.funnel == funnel)
        .filter(|row| match period {
            Some(period) => row.created_on.is_some_and(|date| period.contains(date)),
            None => true,
        })
        .collect();

    let header = build_header(request.mode, period, request.today);
    let groups = ResolvedGroups::resolve(config, request.segment, request.mode);
    let requested = requested_tags(&request.tags);

    let bundle = if request.mode == Mode::Basket && requested.is_empty() {
        aggregate_report(header, &rows, &groups, request.mode)
    } else {
        sliced_report(header, &rows, &groups, request, requested)
    };

    info!(
        mode = %request.mode,
        segment = %request.segment,
        funnel = %request.funnel,
        deals_in = table.len(),
        deals_kept = rows.len(),
        slices = bundle.rows.len(),
        "computed funnel report"
    );

    Ok(bundle)
}

fn requested_tags(tags: &[String]) -> Vec<TagKey> {
    let mut seen = HashSet::new();
    tags.iter()
        .filter(|tag| !tag.trim().is_empty())
        .map(|tag| TagKey::new(tag))
        .filter(|tag| seen.insert(tag.normalized.clone()))
        .collect()
}

fn aggregate_report(
    header: ReportHeader,
    rows: &[NormalizedDeal],
    groups: &ResolvedGroups,
    mode: Mode,
) -> ReportBundle {
    let metrics = SliceMetrics::compute(rows, groups, mode);
    let contacts = replied_contacts(rows, &groups.reply);

    ReportBundle {
        header,
        rows: vec![ReportRow::from_metrics(
            ALL_DEALS_LABEL.to_string(),
            None,
            &metrics,
        )],
        reply_contacts: vec![TagContacts {
            tag: ALL_DEALS_LABEL.to_string(),
            contacts,
        }],
    }
}

fn sliced_report(
    header: ReportHeader,
    rows: &[NormalizedDeal],
    groups: &ResolvedGroups,
    request: &ReportRequest,
    requested: Vec<TagKey>,
) -> ReportBundle {
    let auto_detected = requested.is_empty();
    let chosen: Vec<TagKey> = if auto_detected {
        let detected = collect_unique_tags(rows);
        debug!(tags = detected.len(), "no tags requested, using every tag present");
        detected
            .into_iter()
            .map(|normalized| TagKey {
                display: normalized.clone(),
                normalized,
            })
            .collect()
    } else {
        requested
    };

    let include: HashSet<String> = chosen.iter().map(|tag| tag.normalized.clone()).collect();
    let exploded = explode_by_tags(rows, Some(&include));

    let mut slices: HashMap<&str, Vec<&NormalizedDeal>> = HashMap::new();
    let mut displays: HashMap<&str, &str> = HashMap::new();
    for tagged in &exploded {
        slices
            .entry(tagged.tag.normalized.as_str())
            .or_default()
            .push(tagged.deal);
        displays
            .entry(tagged.tag.normalized.as_str())
            .or_insert(tagged.tag.display.as_str());
    }

    let descriptions: HashMap<String, &str> = request
        .tag_descriptions
        .iter()
        .map(|(tag, description)| (normalize_text(tag), description.as_str()))
        .collect();

    let mut entries: Vec<(ReportRow, TagContacts)> = chosen
        .iter()
        .map(|tag| {
            let slice = slices
                .get(tag.normalized.as_str())
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            let display = displays
                .get(tag.normalized.as_str())
                .map_or_else(|| tag.display.clone(), |display| display.to_string());
            let description = descriptions
                .get(&tag.normalized)
                .map(|description| description.trim())
                .filter(|description| !description.is_empty())
                .map(str::to_string);

            let metrics = SliceMetrics::compute(slice.iter().copied(), groups, request.mode);
            let contacts = replied_contacts(slice.iter().copied(), &groups.reply);

            (
                ReportRow::from_metrics(display.clone(), description, &metrics),
                TagContacts {
                    tag: display,
                    contacts,
                },
            )
        })
        .collect();

    if auto_detected {
        entries.sort_by(|(left, _), (right, _)| right.count.cmp(&left.count));
    }

    let (rows, reply_contacts) = entries.into_iter().unzip();
    ReportBundle {
        header,
        rows,
        reply_contacts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
    }

    #[test]
    fn cutoff_of_a_friday_is_the_wednesday_before() {
        let friday = date(2025, 10, 17);
        assert_eq!(friday.weekday(), Weekday::Fri);
        assert_eq!(operational_cutoff(friday), date(2025, 10, 15));
    }

    #[test]
    fn cutoff_of_a_wednesday_is_itself() {
        let wednesday = date(2025, 10, 15);
        assert_eq!(operational_cutoff(wednesday), wednesday);
    }

    #[test]
    fn cutoff_of_a_tuesday_reaches_back_six_days() {
        assert_eq!(operational_cutoff(date(2025, 10, 14)), date(2025, 10, 8));
    }

    #[test]
    fn basket_header_reports_cutoff_and_elapsed_days() {
        let period = ReportPeriod::new(date(2025, 10, 1), date(2025, 10, 17));
        let header = build_header(Mode::Basket, Some(period), date(2025, 10, 19));

        assert_eq!(header.title, "Abandoned cart");
        assert_eq!(header.period, "from 01 October to 17 October");
        assert_eq!(header.handed_to_sales, "15.Oct");
        assert_eq!(header.days_since_handoff, Some(4));
    }

    #[test]
    fn other_modes_ignore_the_period_in_the_header() {
        let period = ReportPeriod::new(date(2025, 10, 1), date(2025, 10, 17));
        let header = build_header(Mode::Manager, Some(period), date(2025, 10, 19));

        assert_eq!(header.title, "Via manager");
        assert_eq!(header.period, UNDATED_PERIOD);
        assert!(header.handed_to_sales.is_empty());
        assert!(header.days_since_handoff.is_none());
    }

    #[test]
    fn requested_tags_skip_blanks_and_duplicates() {
        let tags = requested_tags(&[
            "Promo".to_string(),
            "  ".to_string(),
            "promo ".to_string(),
            "VIP".to_string(),
        ]);
        let displays: Vec<&str> = tags.iter().map(|tag| tag.display.as_str()).collect();
        assert_eq!(displays, vec!["Promo", "VIP"]);
    }

    #[test]
    fn period_requires_ordered_pair_of_bounds() {
        let from = date(2025, 10, 1);
        let to = date(2025, 10, 17);
        assert_eq!(ReportPeriod::from_bounds(None, None).expect("no period"), None);
        assert_eq!(
            ReportPeriod::from_bounds(Some(from), Some(to)).expect("valid period"),
            Some(ReportPeriod::new(from, to))
        );
        assert!(matches!(
            ReportPeriod::from_bounds(Some(to), Some(from)),
            Err(ReportError::InvalidPeriod(_))
        ));
        assert!(matches!(
            ReportPeriod::from_bounds(Some(from), None),
            Err(ReportError::InvalidPeriod(_))
        ));
    }

    #[test]
    fn period_bounds_are_inclusive() {
        let period = ReportPeriod::new(date(2025, 10, 1), date(2025, 10, 17));
        assert!(period.contains(date(2025, 10, 1)));
        assert!(period.contains(date(2025, 10, 17)));
        assert!(!period.contains(date(2025, 10, 18)));
    }
}
