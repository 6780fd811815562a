use report_types::{CanonicalField, FieldValue, ParsedReport, ValidationResult};

use crate::date::is_iso_date;

/// Fields a report cannot be stored without.
pub const REQUIRED_FIELDS: &[CanonicalField] = &[
    CanonicalField::ActivityDate,
    CanonicalField::Location,
    CanonicalField::ActivityType,
    CanonicalField::MessageSummary,
];

/// Check a parsed report. Every defect is collected so the submitter can
/// fix them all in one go.
pub fn validate(report: &ParsedReport) -> ValidationResult {
    let mut errors = Vec::new();

    for &field in REQUIRED_FIELDS {
        if is_blank(report.get(field)) {
            errors.push(format!("{} is required", field.label()));
        }
    }

    let bad_date = match report.get(CanonicalField::ActivityDate) {
        Some(FieldValue::Text(date)) if !date.trim().is_empty() && !is_iso_date(date) => {
            Some(date.trim().to_string())
        }
        Some(FieldValue::Number(n)) => Some(n.to_string()),
        _ => None,
    };
    if let Some(got) = bad_date {
        errors.push(format!(
            "{} must be a valid date in YYYY-MM-DD format (got '{got}')",
            CanonicalField::ActivityDate.label(),
        ));
    }

    for field in [CanonicalField::Saved, CanonicalField::Healed] {
        if let Some(FieldValue::Text(_)) = report.get(field) {
            errors.push(format!("{} must be a number", field.label()));
        }
    }

    ValidationResult::from_errors(errors)
}

fn is_blank(value: Option<&FieldValue>) -> bool {
    match value {
        None => true,
        Some(FieldValue::Text(s)) => s.trim().is_empty(),
        Some(FieldValue::Number(_)) => false,
    }
}
