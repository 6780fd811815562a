//! Persistence for accepted reports.
//!
//! The core never queries storage itself: callers fetch a batch for a
//! group and date range and hand it to the aggregator.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use report_types::{CanonicalField, ParsedReport};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::date::is_iso_date;
use crate::error::{ReportError, Result};

/// A validated report as persisted, with its delivery metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredReport {
    pub id: Uuid,
    /// Organisational unit the report was submitted to (the chat it came from)
    pub group_key: String,
    pub sender: String,
    pub received_at: DateTime<Utc>,
    pub report: ParsedReport,
}

impl StoredReport {
    pub fn new(
        group_key: impl Into<String>,
        sender: impl Into<String>,
        received_at: DateTime<Utc>,
        report: ParsedReport,
    ) -> Self {
        StoredReport {
            id: Uuid::new_v4(),
            group_key: group_key.into(),
            sender: sender.into(),
            received_at,
            report,
        }
    }

    /// True when the activity date lies within `[start, end]`.
    /// Reports without a canonical date never match.
    pub fn in_range(&self, start: NaiveDate, end: NaiveDate) -> bool {
        let Some(date) = self.report.text(CanonicalField::ActivityDate) else {
            return false;
        };
        if !is_iso_date(date) {
            return false;
        }
        // Canonical dates compare correctly as strings.
        let start = start.format("%Y-%m-%d").to_string();
        let end = end.format("%Y-%m-%d").to_string();
        start.as_str() <= date && date <= end.as_str()
    }
}

/// Minimal CRUD surface the bot and the summary service need.
#[async_trait]
pub trait ReportStore: Send + Sync {
    async fn save(&self, report: &StoredReport) -> Result<()>;

    /// Reports whose activity date is within `[start, end]`, for one group
    /// or all groups, ordered by arrival.
    async fn fetch_reports_in_range(
        &self,
        group_key: Option<&str>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<StoredReport>>;

    /// Every group that has at least one report, sorted.
    async fn groups(&self) -> Result<Vec<String>>;
}

fn select(
    reports: impl IntoIterator<Item = StoredReport>,
    group_key: Option<&str>,
    start: NaiveDate,
    end: NaiveDate,
) -> Vec<StoredReport> {
    let mut selected: Vec<StoredReport> = reports
        .into_iter()
        .filter(|r| group_key.is_none_or(|g| r.group_key == g))
        .filter(|r| r.in_range(start, end))
        .collect();
    selected.sort_by(|a, b| (a.received_at, a.id).cmp(&(b.received_at, b.id)));
    selected
}

fn distinct_groups<'a>(reports: impl IntoIterator<Item = &'a StoredReport>) -> Vec<String> {
    let mut groups: Vec<String> = reports.into_iter().map(|r| r.group_key.clone()).collect();
    groups.sort();
    groups.dedup();
    groups
}

// ── In-memory ────────────────────────────────────────────────────────

/// Store for tests and `chat --ephemeral` runs. Data is lost on exit.
#[derive(Debug, Default)]
pub struct MemoryStore {
    reports: RwLock<Vec<StoredReport>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.reports.read().await.len()
    }

    #[cfg(test)]
    pub async fn is_empty(&self) -> bool {
        self.reports.read().await.is_empty()
    }
}

#[async_trait]
impl ReportStore for MemoryStore {
    async fn save(&self, report: &StoredReport) -> Result<()> {
        self.reports.write().await.push(report.clone());
        Ok(())
    }

    async fn fetch_reports_in_range(
        &self,
        group_key: Option<&str>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<StoredReport>> {
        let reports = self.reports.read().await.clone();
        Ok(select(reports, group_key, start, end))
    }

    async fn groups(&self) -> Result<Vec<String>> {
        Ok(distinct_groups(self.reports.read().await.iter()))
    }
}

// ── File-backed ──────────────────────────────────────────────────────

/// One JSON file per report:
///   {root}/{group}/{id}.json
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FileStore { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn group_dir(&self, group_key: &str) -> PathBuf {
        self.root.join(sanitize_group(group_key))
    }

    /// Read every report file under `dir`. Unreadable files are skipped.
    fn scan(dir: &Path) -> Vec<StoredReport> {
        if !dir.is_dir() {
            return Vec::new();
        }

        let mut reports = Vec::new();
        for entry in WalkDir::new(dir)
            .min_depth(1)
            .max_depth(2)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let parsed = std::fs::read_to_string(path)
                .map_err(ReportError::from)
                .and_then(|json| serde_json::from_str::<StoredReport>(&json).map_err(ReportError::from));
            match parsed {
                Ok(report) => reports.push(report),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable report file"),
            }
        }
        reports
    }

    async fn scan_blocking(&self, dir: PathBuf) -> Result<Vec<StoredReport>> {
        Ok(tokio::task::spawn_blocking(move || Self::scan(&dir)).await?)
    }
}

/// Directory name for a group: anything outside `[A-Za-z0-9_-]` becomes `_`.
pub fn sanitize_group(group_key: &str) -> String {
    let cleaned: String = group_key
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned
    }
}

#[async_trait]
impl ReportStore for FileStore {
    async fn save(&self, report: &StoredReport) -> Result<()> {
        let dir = self.group_dir(&report.group_key);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| ReportError::Store {
                path: dir.clone(),
                source,
            })?;

        let path = dir.join(format!("{}.json", report.id));
        let json = serde_json::to_string_pretty(report)?;
        tokio::fs::write(&path, &json)
            .await
            .map_err(|source| ReportError::Store {
                path: path.clone(),
                source,
            })?;

        info!(path = %path.display(), bytes = json.len(), "stored report");
        Ok(())
    }

    async fn fetch_reports_in_range(
        &self,
        group_key: Option<&str>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<StoredReport>> {
        let dir = match group_key {
            Some(g) => self.group_dir(g),
            None => self.root.clone(),
        };
        let reports = self.scan_blocking(dir).await?;
        let selected = select(reports, group_key, start, end);
        debug!(count = selected.len(), %start, %end, "fetched reports");
        Ok(selected)
    }

    async fn groups(&self) -> Result<Vec<String>> {
        let reports = self.scan_blocking(self.root.clone()).await?;
        Ok(distinct_groups(reports.iter()))
    }
}
