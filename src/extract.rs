use chrono::NaiveDate;
use regex::Regex;
use report_types::{CanonicalField, FieldValue, ParsedReport};

use crate::aliases::{FieldTable, compile_field_patterns};
use crate::date::normalize_group_date;
use crate::error::Result;

/// Stored when a report names neither a team nor a reporter.
pub const TEAM_FALLBACK: &str = "Not specified";

/// Chat markup that never belongs to a value: *bold*, _italic_,
/// ~strike~ and ```mono``` fences.
const MARKUP_CHARS: &[char] = &['*', '_', '~'];

/// One recognised label and the slice of text it governs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpan {
    pub field: CanonicalField,
    /// Byte offset where the label starts
    pub label_start: usize,
    /// Byte offset right after the separator
    pub value_start: usize,
    /// Start of the next label, or end of text
    pub value_end: usize,
}

/// Slices free-text report messages into canonical fields.
#[derive(Debug, Clone)]
pub struct FieldExtractor {
    patterns: Vec<(CanonicalField, Regex)>,
}

impl Default for FieldExtractor {
    fn default() -> Self {
        Self::new(&FieldTable::default()).expect("built-in alias table compiles")
    }
}

impl FieldExtractor {
    pub fn new(table: &FieldTable) -> Result<Self> {
        Ok(FieldExtractor {
            patterns: compile_field_patterns(table)?,
        })
    }

    /// Find the first label of every field and order them as they appear
    /// in the text. Expects markup to be stripped already.
    ///
    /// Labels are taken left to right and never overlap: a match that
    /// starts inside a label already taken (the "activity" in "Date of
    /// Activity:") is skipped and that field is searched again after it.
    /// At equal offsets the field listed first in the table wins.
    pub fn scan(&self, text: &str) -> Vec<FieldSpan> {
        let mut pending: Vec<&(CanonicalField, Regex)> = self.patterns.iter().collect();
        let mut found: Vec<(CanonicalField, usize, usize)> = Vec::with_capacity(pending.len());
        let mut cursor = 0;

        loop {
            let next = pending
                .iter()
                .enumerate()
                .filter_map(|(i, (field, re))| {
                    re.find_at(text, cursor).map(|m| (i, *field, m.start(), m.end()))
                })
                .min_by_key(|&(i, _, start, _)| (start, i));
            let Some((i, field, start, end)) = next else {
                break;
            };
            found.push((field, start, end));
            pending.remove(i);
            cursor = end;
        }

        let mut spans = Vec::with_capacity(found.len());
        for (i, &(field, label_start, value_start)) in found.iter().enumerate() {
            let next_start = found
                .get(i + 1)
                .map(|&(_, start, _)| start)
                .unwrap_or(text.len());
            spans.push(FieldSpan {
                field,
                label_start,
                value_start,
                value_end: next_start.max(value_start),
            });
        }
        spans
    }

    /// Number of distinct field labels in a raw message.
    pub fn count_labels(&self, raw: &str) -> usize {
        self.scan(&strip_markup(raw)).len()
    }

    /// Extract every field present in `raw`. Missing fields are absent
    /// from the result; nothing here is an error.
    pub fn extract(&self, raw: &str, today: NaiveDate) -> ParsedReport {
        let text = strip_markup(raw);
        let mut report = ParsedReport::new();

        for span in self.scan(&text) {
            let value = normalize_value(&text[span.value_start..span.value_end]);
            report.set(span.field, convert(span.field, value, today));
        }

        apply_team_fallback(&mut report);
        report
    }
}

/// Remove chat formatting markers.
pub fn strip_markup(raw: &str) -> String {
    raw.replace("```", "")
        .chars()
        .filter(|c| !MARKUP_CHARS.contains(c))
        .collect()
}

/// Collapse spaces inside each line, drop blank lines, trim.
pub fn normalize_value(raw: &str) -> String {
    raw.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Leading decimal digits of a count ("3 souls" → 3). Anything else is 0.
pub fn parse_count(raw: &str) -> u32 {
    let s = raw.trim();
    let s = s.strip_prefix('+').unwrap_or(s);
    let digits: String = s.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().unwrap_or(0)
}

fn convert(field: CanonicalField, value: String, today: NaiveDate) -> FieldValue {
    match field {
        CanonicalField::Saved | CanonicalField::Healed => FieldValue::Number(parse_count(&value)),
        // An unparsable date keeps its raw text so the validator can
        // report it as a format defect.
        CanonicalField::ActivityDate => match normalize_group_date(&value, today) {
            Ok(iso) => FieldValue::Text(iso),
            Err(_) => FieldValue::Text(value),
        },
        _ => FieldValue::Text(value),
    }
}

/// The store needs a team on every record: fall back to the reporter,
/// then to a fixed placeholder.
fn apply_team_fallback(report: &mut ParsedReport) {
    let team_blank = report
        .text(CanonicalField::PreachersTeam)
        .is_none_or(|t| t.trim().is_empty());
    if !team_blank {
        return;
    }

    let reporter = report
        .text(CanonicalField::ReporterName)
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(str::to_string);
    report.set(
        CanonicalField::PreachersTeam,
        reporter.unwrap_or_else(|| TEAM_FALLBACK.to_string()),
    );
}
