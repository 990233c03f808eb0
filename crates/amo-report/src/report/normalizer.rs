use super::deals::Deal;
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use tracing::debug;

const DATETIME_FORMATS: &[&str] = &[
    "%d.%m.%Y %H:%M:%S",
    "%d.%m.%Y %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%d-%m-%Y %H:%M:%S",
    "%d.%m.%y %H:%M:%S",
    "%d.%m.%y %H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
];

const DATE_FORMATS: &[&str] = &[
    "%d.%m.%Y", "%d/%m/%Y", "%d-%m-%Y", "%d.%m.%y", "%d/%m/%y", "%d-%m-%y", "%Y-%m-%d",
    "%Y/%m/%d",
];

/// `%Y` also accepts one- or two-digit years; those belong to the `%y` formats.
const MIN_FULL_YEAR: i32 = 1000;

/// Canonical comparison form for stage names, funnels and tags.
///
/// Trims, lowercases and folds `ё` into `е` so both spellings of the same
/// word compare equal.
pub fn normalize_text(value: &str) -> String {
    let cleaned = value.replace(['\u{feff}', '\u{200b}'], "");
    cleaned.trim().to_lowercase().replace('ё', "е")
}

/// Parses a creation date with day-first precedence.
///
/// Anything that does not look like a date yields `None`; callers treat that
/// as "no date" and exclude the row from date-range filters.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.naive_utc().date());
    }

    DATETIME_FORMATS
        .iter()
        .filter_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
        .map(|dt| dt.date())
        .find(|date| date.year() >= MIN_FULL_YEAR)
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .filter_map(|format| NaiveDate::parse_from_str(trimmed, format).ok())
                .find(|date| date.year() >= MIN_FULL_YEAR)
        })
}

/// Parses a locale-ambiguous currency amount.
///
/// Commas are decimal separators. When several dots remain after that
/// substitution only the last one separates decimals, so `1.234,56` and
/// `1234.56` both read as 1234.56. Only a leading minus is kept.
pub fn parse_amount(value: &str) -> Option<f64> {
    let substituted = value.replace(',', ".");
    let mut kept = String::with_capacity(substituted.len());
    for ch in substituted.chars() {
        match ch {
            '0'..='9' | '.' => kept.push(ch),
            '-' if kept.is_empty() => kept.push(ch),
            _ => {}
        }
    }

    let (sign, digits) = match kept.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", kept.as_str()),
    };

    let canonical = match digits.rfind('.') {
        Some(last_dot) => {
            let integer: String = digits[..last_dot].chars().filter(|c| *c != '.').collect();
            format!("{sign}{integer}.{}", &digits[last_dot + 1..])
        }
        None => format!("{sign}{digits}"),
    };

    canonical.parse::<f64>().ok().filter(|amount| amount.is_finite())
}

/// A deal together with the comparison-ready forms of its fields.
///
/// Built once per report by [`normalize_deals`]; the source deal is never
/// modified.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedDeal {
    pub deal: Deal,
    pub stage: String,
    pub funnel: String,
    pub created_on: Option<NaiveDate>,
    pub amount: Option<f64>,
}

impl NormalizedDeal {
    pub fn from_deal(deal: Deal) -> Self {
        let stage = normalize_text(&deal.stage);
        let funnel = normalize_text(&deal.funnel);
        let created_on = parse_date(&deal.created_at);
        let amount = parse_amount(&deal.budget);

        Self {
            deal,
            stage,
            funnel,
            created_on,
            amount,
        }
    }
}

pub fn normalize_deals(deals: Vec<Deal>) -> Vec<NormalizedDeal> {
    let rows: Vec<NormalizedDeal> = deals.into_iter().map(NormalizedDeal::from_deal).collect();

    let undated = rows.iter().filter(|row| row.created_on.is_none()).count();
    let unpriced = rows
        .iter()
        .filter(|row| row.amount.is_none() && !row.deal.budget.trim().is_empty())
        .count();
    debug!(
        rows = rows.len(),
        undated, unpriced, "normalized deal export"
    );

    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_text_trims_lowercases_and_folds_yo() {
        assert_eq!(normalize_text("  Ещё Не Распределён "), "еще не распределен");
        assert_eq!(normalize_text("\u{feff}Корзина"), "корзина");
        assert_eq!(normalize_text(""), "");
    }

    #[test]
    fn parse_date_prefers_day_first() {
        let expected = NaiveDate::from_ymd_opt(2025, 3, 4).expect("valid date");
        assert_eq!(parse_date("04.03.2025 14:22:10"), Some(expected));
        assert_eq!(parse_date("04/03/2025"), Some(expected));
        assert_eq!(parse_date("2025-03-04"), Some(expected));
        assert_eq!(parse_date("2025-03-04T09:00:00Z"), Some(expected));
    }

    #[test]
    fn parse_date_reads_two_digit_years_in_this_century() {
        let expected = NaiveDate::from_ymd_opt(2025, 3, 4).expect("valid date");
        assert_eq!(parse_date("04.03.25"), Some(expected));
        assert_eq!(parse_date("04/03/25"), Some(expected));
        assert_eq!(parse_date("04-03-25"), Some(expected));
        assert_eq!(parse_date("04.03.25 14:22"), Some(expected));
    }

    #[test]
    fn parse_date_degrades_to_none() {
        assert!(parse_date("").is_none());
        assert!(parse_date("   ").is_none());
        assert!(parse_date("yesterday").is_none());
        assert!(parse_date("31.02.2025").is_none());
    }

    #[test]
    fn parse_amount_accepts_both_decimal_conventions() {
        assert_eq!(parse_amount("1.234,56"), Some(1234.56));
        assert_eq!(parse_amount("1234.56"), Some(1234.56));
        assert_eq!(parse_amount("1 234,56 €"), Some(1234.56));
        assert_eq!(parse_amount("€ 500"), Some(500.0));
        assert_eq!(parse_amount("-75,5"), Some(-75.5));
    }

    #[test]
    fn parse_amount_degrades_to_none() {
        assert!(parse_amount("").is_none());
        assert!(parse_amount("n/a").is_none());
        assert!(parse_amount("-").is_none());
        assert!(parse_amount(".").is_none());
    }

    #[test]
    fn both_currency_formats_sum_to_the_same_total() {
        let european: f64 = ["1.234,56", "10,00"].iter().filter_map(|v| parse_amount(v)).sum();
        let plain: f64 = ["1234.56", "10"].iter().filter_map(|v| parse_amount(v)).sum();
        assert!((european - plain).abs() < f64::EPSILON);
    }

    #[test]
    fn from_deal_keeps_source_untouched() {
        let deal = Deal {
            stage: " Ответил ".to_string(),
            funnel: "Корзина".to_string(),
            budget: "100,50".to_string(),
            created_at: "01.10.2025".to_string(),
            ..Deal::default()
        };
        let normalized = NormalizedDeal::from_deal(deal.clone());
        assert_eq!(normalized.deal, deal);
        assert_eq!(normalized.stage, "ответил");
        assert_eq!(normalized.funnel, "корзина");
        assert_eq!(normalized.amount, Some(100.5));
        assert_eq!(
            normalized.created_on,
            NaiveDate::from_ymd_opt(2025, 10, 1)
        );
    }
}
