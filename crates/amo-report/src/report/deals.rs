use super::ReportError;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;

pub const STAGE_COLUMN: &str = "Этап сделки";
pub const FUNNEL_COLUMN: &str = "Воронка";
pub const TAGS_COLUMN: &str = "Теги сделки";
pub const BUDGET_COLUMN: &str = "Бюджет";
pub const CREATED_AT_COLUMN: &str = "Дата создания";
pub const CONTACT_COLUMN: &str = "Основной контакт";
pub const ID_COLUMN: &str = "ID";

pub const REQUIRED_COLUMNS: [&str; 6] = [
    STAGE_COLUMN,
    FUNNEL_COLUMN,
    TAGS_COLUMN,
    BUDGET_COLUMN,
    CREATED_AT_COLUMN,
    CONTACT_COLUMN,
];

/// One CRM deal as exported, every field still raw text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deal {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub stage: String,
    pub funnel: String,
    #[serde(default)]
    pub tags: String,
    #[serde(default)]
    pub budget: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_contact: Option<String>,
}

/// Record set handed over by the export loader.
///
/// Column labels are kept exactly as exported; they are only resolved into
/// [`Deal`] fields by [`DealTable::deals`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DealTable {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl DealTable {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let columns = columns
            .into_iter()
            .map(|column| column.replace('\u{feff}', "").trim().to_string())
            .collect();
        Self { columns, rows }
    }

    pub fn from_path<P: AsRef<Path>>(path: P, delimiter: u8) -> Result<Self, ReportError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file, delimiter)
    }

    pub fn from_reader<R: Read>(reader: R, delimiter: u8) -> Result<Self, ReportError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let columns = csv_reader
            .headers()?
            .iter()
            .map(str::to_string)
            .collect::<Vec<_>>();

        let mut rows = Vec::new();
        for record in csv_reader.records() {
            let record = record?;
            rows.push(record.iter().map(str::to_string).collect());
        }

        Ok(Self::new(columns, rows))
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn missing_columns(&self) -> Vec<String> {
        REQUIRED_COLUMNS
            .iter()
            .filter(|required| self.column_index(required).is_none())
            .map(|required| required.to_string())
            .collect()
    }

    /// Resolves the export columns into typed deals.
    ///
    /// Fails with [`ReportError::MissingColumns`] listing every absent
    /// required column; short rows read missing cells as blank.
    pub fn deals(&self) -> Result<Vec<Deal>, ReportError> {
        let missing = self.missing_columns();
        if !missing.is_empty() {
            return Err(ReportError::MissingColumns(missing));
        }

        let index = |name: &str| self.column_index(name);
        let stage = index(STAGE_COLUMN);
        let funnel = index(FUNNEL_COLUMN);
        let tags = index(TAGS_COLUMN);
        let budget = index(BUDGET_COLUMN);
        let created_at = index(CREATED_AT_COLUMN);
        let contact = index(CONTACT_COLUMN);
        let id = index(ID_COLUMN);

        let deals = self
            .rows
            .iter()
            .map(|row| {
                let cell = |column: Option<usize>| -> String {
                    column
                        .and_then(|position| row.get(position))
                        .cloned()
                        .unwrap_or_default()
                };
                let optional_cell = |column: Option<usize>| -> Option<String> {
                    let value = cell(column);
                    if column.is_some() && !value.trim().is_empty() {
                        Some(value)
                    } else {
                        None
                    }
                };

                Deal {
                    id: optional_cell(id),
                    stage: cell(stage),
                    funnel: cell(funnel),
                    tags: cell(tags),
                    budget: cell(budget),
                    created_at: cell(created_at),
                    primary_contact: optional_cell(contact),
                }
            })
            .collect();

        Ok(deals)
    }

    fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }
}

impl From<Vec<Deal>> for DealTable {
    fn from(deals: Vec<Deal>) -> Self {
        let mut columns: Vec<String> = REQUIRED_COLUMNS.iter().map(|c| c.to_string()).collect();
        columns.push(ID_COLUMN.to_string());

        let rows = deals
            .into_iter()
            .map(|deal| {
                vec![
                    deal.stage,
                    deal.funnel,
                    deal.tags,
                    deal.budget,
                    deal.created_at,
                    deal.primary_contact.unwrap_or_default(),
                    deal.id.unwrap_or_default(),
                ]
            })
            .collect();

        Self::new(columns, rows)
    }
}
