use amo_report::report::StageGroupConfig;
use chrono::NaiveDate;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
    pub(crate) stage_config: Arc<StageGroupConfig>,
    /// Delimiter for exports that do not name their own.
    pub(crate) csv_delimiter: u8,
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

/// Splits `TAG=TEXT` into a tag and its description.
pub(crate) fn parse_description(raw: &str) -> Result<(String, String), String> {
    let (tag, text) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected TAG=TEXT, got '{raw}'"))?;
    let tag = tag.trim();
    if tag.is_empty() {
        return Err(format!("missing tag in '{raw}'"));
    }
    Ok((tag.to_string(), text.trim().to_string()))
}

pub(crate) fn deserialize_optional_date<'de, D>(
    deserializer: D,
) -> Result<Option<NaiveDate>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    opt.filter(|value| !value.trim().is_empty())
        .map(|value| parse_date(&value).map_err(serde::de::Error::custom))
        .transpose()
}
