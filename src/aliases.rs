use std::path::Path;

use regex::{Regex, RegexBuilder};
use report_types::CanonicalField;
use serde::{Deserialize, Serialize};

use crate::error::{ReportError, Result};

/// Label spellings seen in report messages, per canonical field.
/// Table order is scan precedence: when two fields match at the same
/// offset, the one listed first wins.
pub const DEFAULT_ALIASES: &[(CanonicalField, &[&str])] = &[
    (
        CanonicalField::ActivityDate,
        &["date", "activity date", "date of activity", "outreach date"],
    ),
    (CanonicalField::Location, &["location", "venue", "place"]),
    (CanonicalField::Area, &["area", "zone", "district", "branch"]),
    (CanonicalField::City, &["city", "town"]),
    (
        CanonicalField::ActivityType,
        &[
            "activity type",
            "type of activity",
            "outreach type",
            "type",
            "activity",
        ],
    ),
    (
        CanonicalField::PreachersTeam,
        &[
            "preachers/team",
            "preachers team",
            "preachers",
            "preacher",
            "team",
            "labourers",
            "laborers",
        ],
    ),
    (
        CanonicalField::MessageSummary,
        &["message summary", "summary", "message", "sermon"],
    ),
    (
        CanonicalField::ResponseMoments,
        &["response moments", "responses", "response", "testimonies"],
    ),
    (CanonicalField::Saved, &["souls saved", "saved", "salvations"]),
    (CanonicalField::Healed, &["souls healed", "healed", "healings"]),
    (
        CanonicalField::ReporterName,
        &["reporter name", "reported by", "reporter", "name"],
    ),
];

/// Values people type when they have nothing to put in a field.
pub const DEFAULT_PLACEHOLDERS: &[&str] = &["not specified", "unknown", "n/a", "none", "-", ""];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldAliases {
    pub field: CanonicalField,
    pub aliases: Vec<String>,
}

/// Alias table plus placeholder denylist, loaded once at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldTable {
    pub fields: Vec<FieldAliases>,
    #[serde(default = "default_placeholders")]
    pub placeholders: Vec<String>,
}

fn default_placeholders() -> Vec<String> {
    DEFAULT_PLACEHOLDERS.iter().map(|s| s.to_string()).collect()
}

impl Default for FieldTable {
    fn default() -> Self {
        FieldTable {
            fields: DEFAULT_ALIASES
                .iter()
                .map(|(field, aliases)| FieldAliases {
                    field: *field,
                    aliases: aliases.iter().map(|a| a.to_string()).collect(),
                })
                .collect(),
            placeholders: default_placeholders(),
        }
    }
}

impl FieldTable {
    /// Read a JSON override of the built-in table.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|source| ReportError::Store {
            path: path.to_path_buf(),
            source,
        })?;
        let table: FieldTable = serde_json::from_str(&json)?;
        if table.fields.is_empty() {
            return Err(ReportError::Config(format!(
                "{} defines no fields",
                path.display()
            )));
        }
        Ok(table)
    }
}

/// Build a regex fragment matching any alias as a label, followed by a
/// `:` or `=` separator. Longer aliases come first so "activity type"
/// wins over "activity" at the same position.
pub fn build_alias_pattern<S: AsRef<str>>(aliases: &[S]) -> String {
    let mut all: Vec<&str> = aliases
        .iter()
        .map(|a| a.as_ref().trim())
        .filter(|a| !a.is_empty())
        .collect();

    all.sort_by_key(|b| std::cmp::Reverse(b.chars().count()));
    all.dedup();

    let alts: Vec<String> = all
        .iter()
        .map(|alias| {
            let body = alias
                .split_whitespace()
                .map(regex::escape)
                .collect::<Vec<_>>()
                .join(r"\s+");
            // \b only means something before a word character
            if alias.chars().next().is_some_and(|c| c.is_alphanumeric()) {
                format!(r"\b{body}")
            } else {
                body
            }
        })
        .collect();

    format!(r"(?:{})\s*[:=]\s*", alts.join("|"))
}

/// Compile one case-insensitive label regex per field, in table order.
/// Fields without any usable alias are skipped.
pub fn compile_field_patterns(table: &FieldTable) -> Result<Vec<(CanonicalField, Regex)>> {
    let mut patterns = Vec::with_capacity(table.fields.len());
    for entry in &table.fields {
        if entry.aliases.iter().all(|a| a.trim().is_empty()) {
            continue;
        }
        let pattern = build_alias_pattern(&entry.aliases);
        let re = RegexBuilder::new(&pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| {
                ReportError::Config(format!("bad aliases for {}: {e}", entry.field.as_str()))
            })?;
        patterns.push((entry.field, re));
    }
    Ok(patterns)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(aliases: &[&str]) -> Regex {
        RegexBuilder::new(&build_alias_pattern(aliases))
            .case_insensitive(true)
            .build()
            .unwrap()
    }

    #[test]
    fn test_default_table_covers_every_field_once() {
        let table = FieldTable::default();
        assert_eq!(table.fields.len(), CanonicalField::ALL.len());
        for field in CanonicalField::ALL {
            let entries = table.fields.iter().filter(|f| f.field == field).count();
            assert_eq!(entries, 1, "{field:?}");
        }
    }

    #[test]
    fn test_longest_alias_matches_first() {
        let re = compile(&["type", "activity type"]);
        let m = re.find("Activity Type: Street").unwrap();
        assert_eq!(m.start(), 0);
    }

    #[test]
    fn test_separator_and_spacing() {
        let re = compile(&["saved"]);
        assert_eq!(re.find("Saved : 3").unwrap().as_str(), "Saved : ");
        assert_eq!(re.find("SAVED=3").unwrap().as_str(), "SAVED=");
        assert!(re.find("saved 3").is_none());
    }

    #[test]
    fn test_alias_requires_word_start() {
        let re = compile(&["date"]);
        assert!(re.find("Update: nothing").is_none());
        assert!(re.find("date: 10/02/2026").is_some());
    }

    #[test]
    fn test_multiword_alias_tolerates_whitespace_runs() {
        let re = compile(&["souls saved"]);
        assert!(re.find("Souls   saved: 4").is_some());
    }

    #[test]
    fn test_compile_skips_fields_without_aliases() {
        let table = FieldTable {
            fields: vec![
                FieldAliases {
                    field: CanonicalField::Location,
                    aliases: vec!["location".into()],
                },
                FieldAliases {
                    field: CanonicalField::City,
                    aliases: vec!["  ".into()],
                },
            ],
            placeholders: vec![],
        };
        let patterns = compile_field_patterns(&table).unwrap();
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].0, CanonicalField::Location);
    }

    #[test]
    fn test_table_json_override_defaults_placeholders() {
        let json = r#"{"fields":[{"field":"location","aliases":["venue"]}]}"#;
        let table: FieldTable = serde_json::from_str(json).unwrap();
        assert_eq!(table.fields[0].field, CanonicalField::Location);
        assert!(table.placeholders.contains(&"n/a".to_string()));
    }
}
