use std::path::PathBuf;

use report_types::Voice;

use crate::aliases::FieldTable;
use crate::error::{ReportError, Result};
use crate::narrative::NarrativeApiConfig;

const DEFAULT_STORE_DIR: &str = "output/reports";
const DEFAULT_MIN_REPORT_FIELDS: usize = 3;
const DEFAULT_NARRATIVE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_NARRATIVE_MODEL: &str = "gpt-4o-mini";

/// Process-wide settings, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub store_dir: PathBuf,
    pub field_table: FieldTable,
    pub voice: Voice,
    /// Labels a free-form message needs before it is treated as a report
    pub min_report_fields: usize,
    /// Set when a narrative API key is configured
    pub narrative_api: Option<NarrativeApiConfig>,
}

impl Config {
    /// Read settings from the environment (and `.env`, if present).
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from any key → value source.
    pub fn from_lookup<F>(get: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| get(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let store_dir = get("REPORT_STORE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE_DIR));

        let field_table = match get("REPORT_FIELD_TABLE") {
            Some(path) => FieldTable::load(&PathBuf::from(path))?,
            None => FieldTable::default(),
        };

        let voice = match get("REPORT_VOICE") {
            Some(v) => v
                .parse::<Voice>()
                .map_err(|e| ReportError::Config(format!("REPORT_VOICE: {e}")))?,
            None => Voice::default(),
        };

        let min_report_fields = match get("REPORT_MIN_FIELDS") {
            Some(v) => v
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| {
                    ReportError::Config(format!("REPORT_MIN_FIELDS must be a positive integer, got '{v}'"))
                })?,
            None => DEFAULT_MIN_REPORT_FIELDS,
        };

        let narrative_api = get("NARRATIVE_API_KEY").map(|api_key| NarrativeApiConfig {
            base_url: get("NARRATIVE_API_URL").unwrap_or_else(|| DEFAULT_NARRATIVE_URL.to_string()),
            api_key,
            model: get("NARRATIVE_MODEL").unwrap_or_else(|| DEFAULT_NARRATIVE_MODEL.to_string()),
        });

        Ok(Config {
            store_dir,
            field_table,
            voice,
            min_report_fields,
            narrative_api,
        })
    }
}
