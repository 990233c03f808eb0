use super::normalizer::NormalizedDeal;
use super::stages::ResolvedGroups;
use super::ReportError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Funnel-reporting strategy. Each mode counts the funnel differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Basket,
    Auto,
    Manager,
}

impl Mode {
    pub const fn ordered() -> [Self; 3] {
        [Self::Basket, Self::Auto, Self::Manager]
    }

    pub const fn code(self) -> &'static str {
        match self {
            Self::Basket => "basket",
            Self::Auto => "auto",
            Self::Manager => "manager",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Basket => "Abandoned cart",
            Self::Auto => "Auto message",
            Self::Manager => "Via manager",
        }
    }

    /// Only abandoned-cart reports honour a date range.
    pub const fn filters_by_date(self) -> bool {
        matches!(self, Self::Basket)
    }

    /// Slice size, processed count and the "% processed" denominator.
    pub fn counts(self, totals: &StageTotals) -> FunnelCounts {
        match self {
            Self::Basket => {
                let count = totals
                    .total
                    .saturating_sub(totals.closed_not_implemented)
                    .saturating_sub(totals.already_bought);
                FunnelCounts {
                    count,
                    processed: count.saturating_sub(totals.lead_not_distributed),
                    denominator: count.max(1),
                }
            }
            Self::Auto => {
                let count = totals.total.saturating_sub(totals.no_messenger);
                FunnelCounts {
                    count,
                    processed: count,
                    denominator: count.max(1),
                }
            }
            Self::Manager => {
                let count = totals.total.saturating_sub(totals.closed_not_implemented);
                FunnelCounts {
                    count,
                    processed: count.saturating_sub(totals.lead_not_distributed),
                    denominator: count.max(1),
                }
            }
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Mode {
    type Err = ReportError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ordered()
            .into_iter()
            .find(|mode| mode.code().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| ReportError::UnsupportedMode(value.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunnelCounts {
    pub count: usize,
    pub processed: usize,
    pub denominator: usize,
}

/// Group membership counts and revenue of one slice, gathered in one pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageTotals {
    pub total: usize,
    pub already_bought: usize,
    pub closed_not_implemented: usize,
    pub lead_not_distributed: usize,
    pub no_messenger: usize,
    pub contact: usize,
    pub replied: usize,
    pub revenue: f64,
}

impl StageTotals {
    pub fn tally<'a, I>(rows: I, groups: &ResolvedGroups) -> Self
    where
        I: IntoIterator<Item = &'a NormalizedDeal>,
    {
        let mut totals = Self::default();
        for row in rows {
            let stage = row.stage.as_str();
            totals.total += 1;
            totals.already_bought += usize::from(groups.already_bought.matches(stage));
            totals.closed_not_implemented +=
                usize::from(groups.closed_not_implemented.matches(stage));
            totals.lead_not_distributed += usize::from(groups.lead_not_distributed.matches(stage));
            totals.no_messenger += usize::from(groups.no_messenger.matches(stage));
            totals.contact += usize::from(groups.contact.matches(stage));
            totals.replied += usize::from(groups.reply.matches(stage));
            if groups.revenue.matches(stage) {
                totals.revenue += row.amount.unwrap_or(0.0);
            }
        }
        totals
    }
}

/// Numeric funnel metrics for one tag slice. Percentages are scaled by 100
/// and rounded to two decimals.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SliceMetrics {
    pub count: usize,
    pub processed: usize,
    pub processed_pct: f64,
    pub contact: usize,
    pub contact_pct: f64,
    pub ignored: usize,
    pub ignored_pct: f64,
    pub replied: usize,
    pub revenue: f64,
    pub conversion_rate_pct: f64,
    pub purchase_conversion_pct: f64,
    pub revenue_from_default_stages: bool,
}

impl SliceMetrics {
    pub fn compute<'a, I>(rows: I, groups: &ResolvedGroups, mode: Mode) -> Self
    where
        I: IntoIterator<Item = &'a NormalizedDeal>,
    {
        let totals = StageTotals::tally(rows, groups);
        Self::from_totals(mode, &totals, groups.revenue_from_default_stages)
    }

    pub fn from_totals(mode: Mode, totals: &StageTotals, revenue_from_default_stages: bool) -> Self {
        let FunnelCounts {
            count,
            processed,
            denominator,
        } = mode.counts(totals);
        let contact = totals.contact;
        let ignored = processed.saturating_sub(contact);
        let replied = totals.replied;

        Self {
            count,
            processed,
            processed_pct: percentage(processed, denominator),
            contact,
            contact_pct: percentage(contact, processed),
            ignored,
            ignored_pct: percentage(ignored, processed),
            replied,
            revenue: round_cents(totals.revenue),
            conversion_rate_pct: percentage(replied, contact),
            purchase_conversion_pct: percentage(replied, processed),
            revenue_from_default_stages,
        }
    }
}

/// `numerator / denominator` as a percentage; zero when the denominator is.
pub fn percentage(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        return 0.0;
    }
    round_cents(numerator as f64 / denominator as f64 * 100.0)
}

pub fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Whole-number percentage with a trailing `%`; empty for undefined values.
/// Exact halves round to the even neighbour, so 12.5 renders as `12%`.
pub fn format_percent(value: f64) -> String {
    if value.is_nan() {
        return String::new();
    }
    format!("{:.0}%", value.round_ties_even())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn totals(total: usize) -> StageTotals {
        StageTotals {
            total,
            ..StageTotals::default()
        }
    }

    #[test]
    fn format_percent_rounds_halves_to_even() {
        assert_eq!(format_percent(percentage(1, 8)), "12%");
        assert_eq!(format_percent(percentage(5, 8)), "62%");
        assert_eq!(format_percent(percentage(3, 8)), "38%");
    }

    #[test]
    fn basket_excludes_closed_and_already_bought() {
        let totals = StageTotals {
            closed_not_implemented: 2,
            already_bought: 1,
            lead_not_distributed: 3,
            ..totals(10)
        };
        assert_eq!(
            Mode::Basket.counts(&totals),
            FunnelCounts {
                count: 7,
                processed: 4,
                denominator: 7,
            }
        );
    }

    #[test]
    fn auto_only_excludes_messenger_channel_stages() {
        let totals = StageTotals {
            no_messenger: 4,
            closed_not_implemented: 2,
            lead_not_distributed: 1,
            ..totals(10)
        };
        assert_eq!(
            Mode::Auto.counts(&totals),
            FunnelCounts {
                count: 6,
                processed: 6,
                denominator: 6,
            }
        );
    }

    #[test]
    fn manager_excludes_closed_then_undistributed() {
        let totals = StageTotals {
            closed_not_implemented: 1,
            already_bought: 5,
            lead_not_distributed: 2,
            ..totals(10)
        };
        assert_eq!(
            Mode::Manager.counts(&totals),
            FunnelCounts {
                count: 9,
                processed: 7,
                denominator: 9,
            }
        );
    }

    #[test]
    fn empty_slice_keeps_a_denominator_of_one() {
        for mode in Mode::ordered() {
            assert_eq!(mode.counts(&totals(0)).denominator, 1);
        }
    }

    #[test]
    fn ignored_never_goes_negative() {
        let totals = StageTotals {
            contact: 8,
            ..totals(5)
        };
        let metrics = SliceMetrics::from_totals(Mode::Auto, &totals, false);
        assert_eq!(metrics.processed, 5);
        assert_eq!(metrics.ignored, 0);
        assert_eq!(metrics.ignored_pct, 0.0);
        assert_eq!(metrics.contact_pct, 160.0);
    }

    #[test]
    fn zero_processed_yields_zero_percentages() {
        for mode in Mode::ordered() {
            let metrics = SliceMetrics::from_totals(mode, &totals(0), false);
            assert_eq!(metrics.processed, 0);
            for pct in [
                metrics.processed_pct,
                metrics.contact_pct,
                metrics.ignored_pct,
                metrics.conversion_rate_pct,
                metrics.purchase_conversion_pct,
            ] {
                assert_eq!(pct, 0.0);
                assert_eq!(format_percent(pct), "0%");
            }
        }
    }

    #[test]
    fn percentage_rounds_to_two_decimals() {
        assert_eq!(percentage(1, 3), 33.33);
        assert_eq!(percentage(2, 3), 66.67);
        assert_eq!(percentage(5, 0), 0.0);
    }

    #[test]
    fn format_percent_rounds_to_whole_numbers() {
        assert_eq!(format_percent(33.33), "33%");
        assert_eq!(format_percent(66.67), "67%");
        assert_eq!(format_percent(50.0), "50%");
        assert_eq!(format_percent(f64::NAN), "");
    }

    #[test]
    fn mode_parsing_rejects_unknown_values() {
        assert_eq!("Manager".parse::<Mode>().expect("mode"), Mode::Manager);
        match "weekly".parse::<Mode>() {
            Err(ReportError::UnsupportedMode(mode)) => assert_eq!(mode, "weekly"),
            other => panic!("expected unsupported mode, got {other:?}"),
        }
    }
}
