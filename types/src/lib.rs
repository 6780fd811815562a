use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ── Canonical report fields ──────────────────────────────────────────────

/// Every field a report message can carry, independent of how the sender
/// spelled its label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalField {
    ActivityDate,
    Location,
    Area,
    City,
    ActivityType,
    PreachersTeam,
    MessageSummary,
    ResponseMoments,
    Saved,
    Healed,
    ReporterName,
}

impl CanonicalField {
    pub const ALL: [CanonicalField; 11] = [
        Self::ActivityDate,
        Self::Location,
        Self::Area,
        Self::City,
        Self::ActivityType,
        Self::PreachersTeam,
        Self::MessageSummary,
        Self::ResponseMoments,
        Self::Saved,
        Self::Healed,
        Self::ReporterName,
    ];

    /// Human-readable label used in defect messages and prompts.
    pub fn label(&self) -> &'static str {
        match self {
            Self::ActivityDate => "Activity Date",
            Self::Location => "Location",
            Self::Area => "Area",
            Self::City => "City",
            Self::ActivityType => "Activity Type",
            Self::PreachersTeam => "Preachers Team",
            Self::MessageSummary => "Message Summary",
            Self::ResponseMoments => "Response Moments",
            Self::Saved => "Saved",
            Self::Healed => "Healed",
            Self::ReporterName => "Reporter Name",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ActivityDate => "activity_date",
            Self::Location => "location",
            Self::Area => "area",
            Self::City => "city",
            Self::ActivityType => "activity_type",
            Self::PreachersTeam => "preachers_team",
            Self::MessageSummary => "message_summary",
            Self::ResponseMoments => "response_moments",
            Self::Saved => "saved",
            Self::Healed => "healed",
            Self::ReporterName => "reporter_name",
        }
    }

    /// Fields converted to integers at extraction time.
    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Saved | Self::Healed)
    }
}

impl fmt::Display for CanonicalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ── Field values ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(u32),
    Text(String),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Number(_) => None,
        }
    }

    pub fn as_number(&self) -> Option<u32> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(_) => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<u32> for FieldValue {
    fn from(n: u32) -> Self {
        Self::Number(n)
    }
}

// ── Parsed report ────────────────────────────────────────────────────────

/// One report as recovered from a message: canonical field → value.
/// Fields the sender did not provide are simply absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParsedReport {
    fields: BTreeMap<CanonicalField, FieldValue>,
}

impl ParsedReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, field: CanonicalField, value: impl Into<FieldValue>) {
        self.fields.insert(field, value.into());
    }

    pub fn with(mut self, field: CanonicalField, value: impl Into<FieldValue>) -> Self {
        self.set(field, value);
        self
    }

    pub fn get(&self, field: CanonicalField) -> Option<&FieldValue> {
        self.fields.get(&field)
    }

    pub fn remove(&mut self, field: CanonicalField) -> Option<FieldValue> {
        self.fields.remove(&field)
    }

    pub fn contains(&self, field: CanonicalField) -> bool {
        self.fields.contains_key(&field)
    }

    /// Text value of a field; `None` when absent or numeric.
    pub fn text(&self, field: CanonicalField) -> Option<&str> {
        self.get(field).and_then(FieldValue::as_text)
    }

    /// Numeric value of a field; `None` when absent or textual.
    pub fn number(&self, field: CanonicalField) -> Option<u32> {
        self.get(field).and_then(FieldValue::as_number)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&CanonicalField, &FieldValue)> {
        self.fields.iter()
    }
}

// ── Validation ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<String>,
}

impl ValidationResult {
    pub fn from_errors(errors: Vec<String>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }

    /// Defects as "• defect" lines, the form in which they are sent back
    /// to the submitter.
    pub fn bullet_list(&self) -> String {
        self.errors
            .iter()
            .map(|e| format!("• {e}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

// ── Aggregated summary ───────────────────────────────────────────────────

/// Deduplicated totals for one grouping key over one date range.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedSummary {
    pub total_outreaches: u32,
    pub total_saved: u32,
    pub total_healed: u32,
    pub locations: Vec<String>,
    pub labourers: Vec<String>,
    pub activity_types: Vec<String>,
    pub message_summaries: Vec<String>,
}

// ── Narrative ────────────────────────────────────────────────────────────

/// Authority voice the narrative is written in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Voice {
    /// First-person eyewitness ("we went out…")
    Eyewitness,
    /// Third-person compiled testimony ("the labourers report…")
    Compiled,
    #[default]
    Neutral,
}

impl Voice {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eyewitness => "eyewitness",
            Self::Compiled => "compiled",
            Self::Neutral => "neutral",
        }
    }
}

impl FromStr for Voice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "eyewitness" | "first-person" => Ok(Self::Eyewitness),
            "compiled" | "third-person" => Ok(Self::Compiled),
            "neutral" => Ok(Self::Neutral),
            other => Err(format!("unknown voice '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Narrative {
    pub prose: String,
    pub themes: Vec<String>,
    pub closing: String,
}

// ── Period report ────────────────────────────────────────────────────────

/// Everything a document renderer needs for one group and date range.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeriodReport {
    pub group_key: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub generated_at: DateTime<Utc>,
    pub voice: Voice,
    pub summary: AggregatedSummary,
    pub narrative: Narrative,
    /// True when the narrative came from the templated fallback.
    pub fallback: bool,
}
