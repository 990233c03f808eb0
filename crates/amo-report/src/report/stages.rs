use super::metrics::Mode;
use super::normalizer::{normalize_text, NormalizedDeal};
use super::ReportError;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::io::Read;
use std::str::FromStr;
use tracing::debug;

/// Stages that imply a payment, summed when no revenue group is configured.
pub const DEFAULT_REVENUE_STAGES: [&str; 4] = [
    "аванс",
    "успешно реализовано",
    "prepayment",
    "successfully and implemented",
];

/// Market segment a configuration and a report are scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Segment {
    #[serde(rename = "RUS")]
    Rus,
    #[serde(rename = "ENG")]
    Eng,
    #[serde(rename = "ESP")]
    Esp,
}

impl Segment {
    pub const fn ordered() -> [Self; 3] {
        [Self::Rus, Self::Eng, Self::Esp]
    }

    pub const fn code(self) -> &'static str {
        match self {
            Self::Rus => "RUS",
            Self::Eng => "ENG",
            Self::Esp => "ESP",
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Segment {
    type Err = ReportError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ordered()
            .into_iter()
            .find(|segment| segment.code().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| ReportError::UnknownSegment(value.to_string()))
    }
}

/// Named classification predicates a configuration can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageGroup {
    AlreadyBought,
    #[serde(rename = "closed_not_impl")]
    ClosedNotImplemented,
    LeadNotDistributed,
    ContactGroup,
    ContactGroupAuto,
    ReplyGroup,
    RevenueGroup,
    #[serde(rename = "no_wazzap")]
    NoMessenger,
}

/// Stage literals of one group, either shared by all segments or per segment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StageList {
    #[serde(rename = "ALL", default, skip_serializing_if = "Option::is_none")]
    pub shared: Option<Vec<String>>,
    #[serde(rename = "RUS", default, skip_serializing_if = "Option::is_none")]
    pub rus: Option<Vec<String>>,
    #[serde(rename = "ENG", default, skip_serializing_if = "Option::is_none")]
    pub eng: Option<Vec<String>>,
    #[serde(rename = "ESP", default, skip_serializing_if = "Option::is_none")]
    pub esp: Option<Vec<String>>,
}

impl StageList {
    pub fn shared(stages: &[&str]) -> Self {
        Self {
            shared: Some(stages.iter().map(|stage| stage.to_string()).collect()),
            ..Self::default()
        }
    }

    /// Shared list if declared, else the segment's list, else nothing.
    pub fn resolve(&self, segment: Segment) -> &[String] {
        if let Some(shared) = &self.shared {
            return shared;
        }

        let per_segment = match segment {
            Segment::Rus => &self.rus,
            Segment::Eng => &self.eng,
            Segment::Esp => &self.esp,
        };
        per_segment.as_deref().unwrap_or(&[])
    }

    pub fn set_segment(&mut self, segment: Segment, stages: &[&str]) {
        let stages = Some(stages.iter().map(|stage| stage.to_string()).collect());
        match segment {
            Segment::Rus => self.rus = stages,
            Segment::Eng => self.eng = stages,
            Segment::Esp => self.esp = stages,
        }
    }
}

/// Typed stage-group configuration, usually loaded from YAML.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StageGroupConfig {
    #[serde(default)]
    pub stages: HashMap<StageGroup, StageList>,
    #[serde(default)]
    pub funnels: HashMap<Segment, Vec<String>>,
    #[serde(default)]
    pub cart_funnels: HashMap<Segment, String>,
}

impl StageGroupConfig {
    pub fn from_yaml_reader<R: Read>(reader: R) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_reader(reader)
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(raw)
    }

    pub fn with_shared(mut self, group: StageGroup, stages: &[&str]) -> Self {
        self.stages.insert(group, StageList::shared(stages));
        self
    }

    pub fn with_segment(mut self, group: StageGroup, segment: Segment, stages: &[&str]) -> Self {
        self.stages
            .entry(group)
            .or_default()
            .set_segment(segment, stages);
        self
    }

    pub fn has_group(&self, group: StageGroup) -> bool {
        self.stages.contains_key(&group)
    }

    /// Literals of `group` for `segment`; an absent group or segment is empty.
    pub fn stages(&self, segment: Segment, group: StageGroup) -> &[String] {
        self.stages
            .get(&group)
            .map(|list| list.resolve(segment))
            .unwrap_or(&[])
    }

    /// Funnels offered for a segment. Basket reports only run on the cart
    /// funnel, so that mode narrows the list to it when one is configured.
    pub fn funnels(&self, segment: Segment, mode: Mode) -> Vec<String> {
        if mode == Mode::Basket {
            if let Some(cart) = self.cart_funnels.get(&segment) {
                return vec![cart.clone()];
            }
        }

        self.funnels.get(&segment).cloned().unwrap_or_default()
    }

    /// First offered funnel, used when the caller names none.
    pub fn default_funnel(&self, segment: Segment, mode: Mode) -> Result<String, ReportError> {
        self.funnels(segment, mode)
            .into_iter()
            .next()
            .ok_or(ReportError::MissingFunnel(segment))
    }
}

/// Membership test for one stage group against normalized stage names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageMatcher {
    stages: HashSet<String>,
    messenger_patterns: bool,
}

impl StageMatcher {
    pub fn exact<S: AsRef<str>>(stages: &[S]) -> Self {
        Self {
            stages: stages
                .iter()
                .map(|stage| normalize_text(stage.as_ref()))
                .collect(),
            messenger_patterns: false,
        }
    }

    /// Exact literals plus any stage mentioning a missing messenger channel,
    /// since those stage names drift ("no whatsapp", "wazzup missing", ...).
    pub fn channel_exclusion<S: AsRef<str>>(stages: &[S]) -> Self {
        Self {
            messenger_patterns: true,
            ..Self::exact(stages)
        }
    }

    pub fn matches(&self, normalized_stage: &str) -> bool {
        self.stages.contains(normalized_stage)
            || (self.messenger_patterns && mentions_messenger(normalized_stage))
    }

    pub fn count<'a, I>(&self, rows: I) -> usize
    where
        I: IntoIterator<Item = &'a NormalizedDeal>,
    {
        rows.into_iter()
            .filter(|row| self.matches(&row.stage))
            .count()
    }
}

fn mentions_messenger(stage: &str) -> bool {
    if stage.contains("wazzap") || stage.contains("wazzup") {
        return true;
    }

    stage
        .match_indices("whats")
        .any(|(start, found)| stage[start + found.len()..].trim_start().starts_with("app"))
}

/// Row mask: true where the deal's stage equals one of `stages`.
pub fn stage_in<'a, I, S>(rows: I, stages: &[S]) -> Vec<bool>
where
    I: IntoIterator<Item = &'a NormalizedDeal>,
    S: AsRef<str>,
{
    let matcher = StageMatcher::exact(stages);
    rows.into_iter()
        .map(|row| matcher.matches(&row.stage))
        .collect()
}

/// Every matcher one report needs, resolved for a segment and mode.
#[derive(Debug, Clone)]
pub struct ResolvedGroups {
    pub already_bought: StageMatcher,
    pub closed_not_implemented: StageMatcher,
    pub lead_not_distributed: StageMatcher,
    pub contact: StageMatcher,
    pub reply: StageMatcher,
    pub revenue: StageMatcher,
    pub revenue_from_default_stages: bool,
    pub no_messenger: StageMatcher,
}

impl ResolvedGroups {
    pub fn resolve(config: &StageGroupConfig, segment: Segment, mode: Mode) -> Self {
        let exact = |group| StageMatcher::exact(config.stages(segment, group));

        let contact_group = if mode == Mode::Auto && config.has_group(StageGroup::ContactGroupAuto)
        {
            StageGroup::ContactGroupAuto
        } else {
            StageGroup::ContactGroup
        };

        let revenue_stages = config.stages(segment, StageGroup::RevenueGroup);
        let revenue_from_default_stages = revenue_stages.is_empty();
        let revenue = if revenue_from_default_stages {
            debug!(%segment, "no revenue group configured, using default payment stages");
            StageMatcher::exact(&DEFAULT_REVENUE_STAGES)
        } else {
            StageMatcher::exact(revenue_stages)
        };

        Self {
            already_bought: exact(StageGroup::AlreadyBought),
            closed_not_implemented: exact(StageGroup::ClosedNotImplemented),
            lead_not_distributed: exact(StageGroup::LeadNotDistributed),
            contact: exact(contact_group),
            reply: exact(StageGroup::ReplyGroup),
            revenue,
            revenue_from_default_stages,
            no_messenger: StageMatcher::channel_exclusion(
                config.stages(segment, StageGroup::NoMessenger),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::deals::Deal;

    fn deal_in_stage(stage: &str) -> NormalizedDeal {
        NormalizedDeal::from_deal(Deal {
            stage: stage.to_string(),
            funnel: "Корзина".to_string(),
            ..Deal::default()
        })
    }

    const YAML: &str = r#"
stages:
  already_bought:
    RUS: ["Уже купил"]
    ENG: ["Already bought"]
  reply_group:
    ALL: ["Ответил", "Replied"]
    RUS: ["ignored because ALL wins"]
  contact_group:
    RUS: ["Контакт"]
  contact_group_auto:
    ALL: ["Доставлено"]
funnels:
  RUS: ["Корзина", "Вебинар"]
cart_funnels:
  RUS: "Корзина"
"#;

    #[test]
    fn yaml_config_resolves_shared_then_segment_then_empty() {
        let config = StageGroupConfig::from_yaml_str(YAML).expect("config parses");

        assert_eq!(
            config.stages(Segment::Rus, StageGroup::ReplyGroup),
            ["Ответил".to_string(), "Replied".to_string()]
        );
        assert_eq!(
            config.stages(Segment::Eng, StageGroup::AlreadyBought),
            ["Already bought".to_string()]
        );
        assert!(config
            .stages(Segment::Esp, StageGroup::AlreadyBought)
            .is_empty());
        assert!(config
            .stages(Segment::Rus, StageGroup::LeadNotDistributed)
            .is_empty());
    }

    #[test]
    fn yaml_config_rejects_unknown_group_names() {
        let error = StageGroupConfig::from_yaml_str("stages:\n  reply_grup:\n    ALL: [x]\n")
            .expect_err("typo rejected");
        assert!(error.to_string().contains("reply_grup"));

        assert!(StageGroupConfig::from_yaml_str("stages:\n  reply_group:\n    DEU: [x]\n").is_err());
    }

    #[test]
    fn funnels_narrow_to_cart_in_basket_mode() {
        let config = StageGroupConfig::from_yaml_str(YAML).expect("config parses");
        assert_eq!(config.funnels(Segment::Rus, Mode::Basket), vec!["Корзина"]);
        assert_eq!(
            config.funnels(Segment::Rus, Mode::Manager),
            vec!["Корзина", "Вебинар"]
        );
        assert!(config.funnels(Segment::Esp, Mode::Auto).is_empty());

        assert_eq!(
            config
                .default_funnel(Segment::Rus, Mode::Manager)
                .expect("funnel configured"),
            "Корзина"
        );
        assert!(matches!(
            config.default_funnel(Segment::Esp, Mode::Auto),
            Err(ReportError::MissingFunnel(Segment::Esp))
        ));
    }

    #[test]
    fn segment_parses_case_insensitively() {
        assert_eq!("eng".parse::<Segment>().expect("segment"), Segment::Eng);
        assert!(matches!(
            "DEU".parse::<Segment>(),
            Err(ReportError::UnknownSegment(value)) if value == "DEU"
        ));
    }

    #[test]
    fn stage_in_matches_case_and_letter_fold_insensitively() {
        let rows = vec![
            deal_in_stage("Ещё думает"),
            deal_in_stage("ОТВЕТИЛ"),
            deal_in_stage("Новый"),
        ];
        assert_eq!(
            stage_in(&rows, &["еще думает", "Ответил"]),
            vec![true, true, false]
        );
    }

    #[test]
    fn channel_exclusion_adds_messenger_patterns() {
        let matcher = StageMatcher::channel_exclusion(&["Нет мессенджера"]);
        assert!(matcher.matches("нет мессенджера"));
        assert!(matcher.matches("no whatsapp"));
        assert!(matcher.matches("whats app missing"));
        assert!(matcher.matches("нет wazzup"));
        assert!(!matcher.matches("ответил"));

        assert!(!StageMatcher::exact(&["Нет мессенджера"]).matches("no whatsapp"));
    }

    #[test]
    fn auto_mode_prefers_its_own_contact_group() {
        let config = StageGroupConfig::from_yaml_str(YAML).expect("config parses");
        let auto = ResolvedGroups::resolve(&config, Segment::Rus, Mode::Auto);
        let manager = ResolvedGroups::resolve(&config, Segment::Rus, Mode::Manager);

        assert!(auto.contact.matches("доставлено"));
        assert!(!auto.contact.matches("контакт"));
        assert!(manager.contact.matches("контакт"));
    }

    #[test]
    fn missing_revenue_group_falls_back_to_default_stages() {
        let resolved =
            ResolvedGroups::resolve(&StageGroupConfig::default(), Segment::Eng, Mode::Basket);
        assert!(resolved.revenue_from_default_stages);
        assert!(resolved.revenue.matches("prepayment"));

        let config = StageGroupConfig::default().with_shared(StageGroup::RevenueGroup, &["Оплачено"]);
        let resolved = ResolvedGroups::resolve(&config, Segment::Eng, Mode::Basket);
        assert!(!resolved.revenue_from_default_stages);
        assert!(resolved.revenue.matches("оплачено"));
        assert!(!resolved.revenue.matches("prepayment"));
    }
}
