use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Datelike, Duration, NaiveDate, Utc};
use report_types::{AggregatedSummary, ParsedReport, PeriodReport, Voice};
use tracing::info;

use crate::aggregate::{Aggregator, by_area};
use crate::date::{Clock, normalize_group_date};
use crate::narrative::{NarrativeGenerator, compose_narrative};
use crate::error::Result;
use crate::store::ReportStore;

/// Group key used when a summary spans every group.
pub const ALL_GROUPS: &str = "all";

// ── Periods ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    /// Monday to Sunday of the current week
    Week,
    /// The current calendar month
    Month,
    Range(NaiveDate, NaiveDate),
}

impl Period {
    /// Parse summary arguments: nothing or "week", "month", or two dates.
    pub fn from_args(args: &[&str], today: NaiveDate) -> std::result::Result<Self, String> {
        match args {
            [] => Ok(Self::Week),
            [one] if one.eq_ignore_ascii_case("week") => Ok(Self::Week),
            [one] if one.eq_ignore_ascii_case("month") => Ok(Self::Month),
            [from, to] => {
                let from = parse_bound(from, today)?;
                let to = parse_bound(to, today)?;
                if from > to {
                    return Err(format!("{from} is after {to}"));
                }
                Ok(Self::Range(from, to))
            }
            _ => Err("use: week, month, or <from> <to>".to_string()),
        }
    }

    /// Inclusive date range this period covers on `today`.
    pub fn resolve(&self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        match self {
            Self::Week => {
                let monday =
                    today - Duration::days(today.weekday().num_days_from_monday() as i64);
                (monday, monday + Duration::days(6))
            }
            Self::Month => {
                let first = today.with_day(1).unwrap_or(today);
                let next_month = if first.month() == 12 {
                    NaiveDate::from_ymd_opt(first.year() + 1, 1, 1)
                } else {
                    NaiveDate::from_ymd_opt(first.year(), first.month() + 1, 1)
                };
                let last = next_month.map(|d| d - Duration::days(1)).unwrap_or(today);
                (first, last)
            }
            Self::Range(from, to) => (*from, *to),
        }
    }

    /// Human label used in narratives.
    pub fn label(&self, today: NaiveDate) -> String {
        let (start, end) = self.resolve(today);
        match self {
            Self::Week => format!("the week of {start} to {end}"),
            Self::Month => start.format("%B %Y").to_string(),
            Self::Range(..) => format!("{start} to {end}"),
        }
    }
}

fn parse_bound(raw: &str, today: NaiveDate) -> std::result::Result<NaiveDate, String> {
    if let Ok(date) = NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d") {
        return Ok(date);
    }
    normalize_group_date(raw, today)
        .ok()
        .and_then(|iso| NaiveDate::parse_from_str(&iso, "%Y-%m-%d").ok())
        .ok_or_else(|| format!("'{}' is not a valid date", raw.trim()))
}

// ── Service ──────────────────────────────────────────────────────────

/// Fetch → aggregate → narrate for one group and period.
#[derive(Clone)]
pub struct SummaryService {
    store: Arc<dyn ReportStore>,
    aggregator: Aggregator,
    generator: Option<Arc<dyn NarrativeGenerator>>,
    clock: Arc<dyn Clock>,
    voice: Voice,
}

impl SummaryService {
    pub fn new(
        store: Arc<dyn ReportStore>,
        aggregator: Aggregator,
        generator: Option<Arc<dyn NarrativeGenerator>>,
        clock: Arc<dyn Clock>,
        voice: Voice,
    ) -> Self {
        SummaryService {
            store,
            aggregator,
            generator,
            clock,
            voice,
        }
    }

    async fn fetch(
        &self,
        group_key: Option<&str>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<ParsedReport>> {
        let stored = self
            .store
            .fetch_reports_in_range(group_key, start, end)
            .await?;
        Ok(stored.into_iter().map(|s| s.report).collect())
    }

    /// Build the period report. Store failures propagate; narrative
    /// failures only switch to the templated narrative.
    pub async fn generate(
        &self,
        group_key: Option<&str>,
        period: &Period,
        voice: Option<Voice>,
    ) -> Result<PeriodReport> {
        let today = self.clock.today();
        let (start, end) = period.resolve(today);
        let voice = voice.unwrap_or(self.voice);

        let reports = self.fetch(group_key, start, end).await?;
        let summary = self.aggregator.aggregate(&reports);

        let label = period.label(today);
        let (narrative, fallback) =
            compose_narrative(self.generator.as_deref(), &summary, voice, &label).await;

        info!(
            group = group_key.unwrap_or(ALL_GROUPS),
            %start,
            %end,
            reports = reports.len(),
            fallback,
            "generated period report"
        );

        Ok(PeriodReport {
            group_key: group_key.unwrap_or(ALL_GROUPS).to_string(),
            start_date: start,
            end_date: end,
            generated_at: Utc::now(),
            voice,
            summary,
            narrative,
            fallback,
        })
    }

    /// Per-area summaries for the same selection.
    pub async fn area_breakdown(
        &self,
        group_key: Option<&str>,
        period: &Period,
    ) -> Result<BTreeMap<String, AggregatedSummary>> {
        let (start, end) = period.resolve(self.clock.today());
        let reports = self.fetch(group_key, start, end).await?;
        Ok(self.aggregator.aggregate_by(&reports, by_area))
    }
}

// ── Text rendering ───────────────────────────────────────────────────

fn list_or_dash(items: &[String]) -> String {
    if items.is_empty() {
        "-".to_string()
    } else {
        items.join(", ")
    }
}

/// Chat-sized rendering of a period report.
pub fn render_text(report: &PeriodReport) -> String {
    let s = &report.summary;
    let mut out = String::new();
    out.push_str(&format!(
        "OUTREACH SUMMARY: {} ({} to {})\n",
        report.group_key, report.start_date, report.end_date
    ));
    out.push_str(&format!(
        "Outreaches: {} | Saved: {} | Healed: {}\n",
        s.total_outreaches, s.total_saved, s.total_healed
    ));
    out.push_str(&format!("Locations: {}\n", list_or_dash(&s.locations)));
    out.push_str(&format!("Labourers: {}\n", list_or_dash(&s.labourers)));
    out.push_str(&format!(
        "Activity types: {}\n",
        list_or_dash(&s.activity_types)
    ));
    out.push('\n');
    out.push_str(&report.narrative.prose);
    out.push('\n');
    if !report.narrative.themes.is_empty() {
        out.push_str("\nThemes:\n");
        for theme in &report.narrative.themes {
            out.push_str(&format!("• {theme}\n"));
        }
    }
    if !report.narrative.closing.is_empty() {
        out.push('\n');
        out.push_str(&report.narrative.closing);
        out.push('\n');
    }
    out
}
