// src/config.rs

use std::{fs, path::Path, path::PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};

static DEFAULT_IDEB_URL: &str = "http://download.inep.gov.br/educacao_basica/portal_ideb/planilhas_para_download/2017/divulgacao_ensino_medio-escolas-2017.zip";
static DEFAULT_IDEB_ENTRY: &str = "divulgacao_ensino_medio-escolas-2017.xlsx";

/// Everything a run needs, passed explicitly to each stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    pub fetch: FetchConfig,
    pub school: SchoolColumns,
    pub students: StudentColumns,
    pub merge: MergeConfig,
    pub analysis: AnalysisConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FetchConfig {
    pub url: String,
    /// Name of the spreadsheet inside the ZIP.
    pub entry: String,
    /// Sheet rows above the header row.
    pub skip_rows: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_IDEB_URL.into(),
            entry: DEFAULT_IDEB_ENTRY.into(),
            skip_rows: 6,
        }
    }
}

/// Canonical fields of the cleaned school table.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SchoolField {
    SchoolId,
    EnrollmentIndex,
    StandardizedScore,
    OutcomeIndex,
}

impl SchoolField {
    pub const ALL: [SchoolField; 4] = [
        SchoolField::SchoolId,
        SchoolField::EnrollmentIndex,
        SchoolField::StandardizedScore,
        SchoolField::OutcomeIndex,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SchoolField::SchoolId => "school_id",
            SchoolField::EnrollmentIndex => "enrollment_index",
            SchoolField::StandardizedScore => "standardized_score",
            SchoolField::OutcomeIndex => "outcome_index",
        }
    }
}

/// A sheet column, either by its header text or by zero-based position.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum ColumnRef {
    Position(usize),
    Header(String),
}

impl std::fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ColumnRef::Position(i) => write!(f, "#{}", i),
            ColumnRef::Header(h) => write!(f, "{:?}", h),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HeaderMapping {
    pub column: ColumnRef,
    pub field: SchoolField,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchoolColumns {
    pub columns: Vec<HeaderMapping>,
    /// Cell text meaning "no value" in the numeric fields.
    pub sentinel: String,
    /// Trailing characters removed from the school code.
    pub key_suffix_len: usize,
}

impl Default for SchoolColumns {
    fn default() -> Self {
        let map = |column: &str, field| HeaderMapping {
            column: ColumnRef::Header(column.into()),
            field,
        };
        Self {
            columns: vec![
                map("Código da Escola", SchoolField::SchoolId),
                map("Unnamed: 12", SchoolField::EnrollmentIndex),
                map("Unnamed: 15", SchoolField::StandardizedScore),
                map("IDEB\n2017\n(N x P)", SchoolField::OutcomeIndex),
            ],
            sentinel: "-".into(),
            key_suffix_len: 2,
        }
    }
}

impl SchoolColumns {
    pub fn column_for(&self, field: SchoolField) -> Option<&ColumnRef> {
        self.columns
            .iter()
            .find(|m| m.field == field)
            .map(|m| &m.column)
    }
}

/// Column names of the student-level (ENEM) table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StudentColumns {
    pub school_id: String,
    pub age: String,
    pub marital_status: String,
    pub school_type: String,
    pub state_of_residence: String,
    pub total_score: String,
    pub survey_response: String,
    /// Field separator of the student CSV.
    pub delimiter: char,
}

impl Default for StudentColumns {
    fn default() -> Self {
        Self {
            school_id: "CO_ESCOLA".into(),
            age: "NU_IDADE".into(),
            marital_status: "TP_ESTADO_CIVIL".into(),
            school_type: "TP_ENSINO".into(),
            state_of_residence: "SG_UF_RESIDENCIA".into(),
            total_score: "NU_NOTA_TOT".into(),
            survey_response: "Q005".into(),
            delimiter: ',',
        }
    }
}

impl StudentColumns {
    pub fn required(&self) -> [&str; 7] {
        [
            self.school_id.as_str(),
            self.age.as_str(),
            self.marital_status.as_str(),
            self.school_type.as_str(),
            self.state_of_residence.as_str(),
            self.total_score.as_str(),
            self.survey_response.as_str(),
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MergeConfig {
    /// Columns removed after the join regardless of their actual missingness.
    pub drop_after_join: Vec<String>,
    /// When set, also drop other columns whose null fraction exceeds this.
    pub missing_threshold: Option<f64>,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            drop_after_join: vec![
                SchoolField::StandardizedScore.name().into(),
                SchoolField::OutcomeIndex.name().into(),
            ],
            missing_threshold: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnalysisConfig {
    pub alpha: f64,
    /// Numeric column compared across groups.
    pub target: String,
    /// Categorical columns to group by, one test each.
    pub group_columns: Vec<String>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            alpha: 0.05,
            target: "NU_NOTA_TOT".into(),
            group_columns: vec![
                "TP_ESTADO_CIVIL".into(),
                "TP_ENSINO".into(),
                "SG_UF_RESIDENCIA".into(),
            ],
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OutputConfig {
    pub merged_parquet: Option<PathBuf>,
    pub report_json: Option<PathBuf>,
}

impl PipelineConfig {
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let cfg: PipelineConfig = serde_yaml::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.fetch.url)
            .map_err(|e| Error::Config(format!("fetch.url `{}`: {}", self.fetch.url, e)))?;

        for field in SchoolField::ALL {
            let n = self.school.columns.iter().filter(|m| m.field == field).count();
            if n != 1 {
                return Err(Error::Config(format!(
                    "school.columns must map `{}` exactly once (found {})",
                    field.name(),
                    n
                )));
            }
        }

        check_alpha(self.analysis.alpha)?;

        if let Some(t) = self.merge.missing_threshold {
            if !(0.0..=1.0).contains(&t) {
                return Err(Error::Config(format!(
                    "merge.missing_threshold must be within [0, 1], got {}",
                    t
                )));
            }
        }
        Ok(())
    }
}

pub(crate) fn check_alpha(alpha: f64) -> Result<()> {
    if alpha > 0.0 && alpha < 1.0 {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "significance level must be within (0, 1), got {}",
            alpha
        )))
    }
}
