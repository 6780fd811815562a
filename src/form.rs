//! Step-by-step report entry over chat.
//!
//! The engine holds no state of its own: each user's progress lives in an
//! injected [`SessionStore`], keyed by chat and sender.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use report_types::{CanonicalField, FieldValue, ParsedReport};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::date::{Clock, normalize_form_date};
use crate::error::{DateError, Result};
use crate::extract::normalize_value;

const SKIP_WORD: &str = "skip";
const CANCEL_WORDS: &[&str] = &["cancel", "/cancel"];

// ── Steps ────────────────────────────────────────────────────────────

/// Form steps in the order they are asked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FormStep {
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

impl FormStep {
    pub const SEQUENCE: [FormStep; 11] = [
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

    pub fn first() -> Self {
        Self::SEQUENCE[0]
    }

    pub fn next(&self) -> Option<Self> {
        let i = Self::SEQUENCE.iter().position(|s| s == self)?;
        Self::SEQUENCE.get(i + 1).copied()
    }

    pub fn field(&self) -> CanonicalField {
        match self {
            Self::ActivityDate => CanonicalField::ActivityDate,
            Self::Location => CanonicalField::Location,
            Self::Area => CanonicalField::Area,
            Self::City => CanonicalField::City,
            Self::ActivityType => CanonicalField::ActivityType,
            Self::PreachersTeam => CanonicalField::PreachersTeam,
            Self::MessageSummary => CanonicalField::MessageSummary,
            Self::ResponseMoments => CanonicalField::ResponseMoments,
            Self::Saved => CanonicalField::Saved,
            Self::Healed => CanonicalField::Healed,
            Self::ReporterName => CanonicalField::ReporterName,
        }
    }

    /// Steps the user may answer with "skip".
    pub fn is_optional(&self) -> bool {
        matches!(
            self,
            Self::Area | Self::City | Self::ResponseMoments | Self::ReporterName
        )
    }

    pub fn prompt(&self) -> String {
        let question = match self {
            Self::ActivityDate => {
                "When did the outreach take place? (DD/MM/YYYY, YYYY-MM-DD, today or yesterday)"
            }
            Self::Location => "Where did it take place?",
            Self::Area => "Which area or zone is this under?",
            Self::City => "Which city or town?",
            Self::ActivityType => "What kind of outreach was it? (e.g. Street Evangelism, Door to door)",
            Self::PreachersTeam => "Who preached? Separate names with commas.",
            Self::MessageSummary => "Briefly summarise the message preached.",
            Self::ResponseMoments => "Any notable responses or testimonies?",
            Self::Saved => "How many people were saved?",
            Self::Healed => "How many people were healed?",
            Self::ReporterName => "Your name? (skip to use your chat name)",
        };
        if self.is_optional() {
            format!("{question}\nReply \"{SKIP_WORD}\" to leave it out.")
        } else {
            question.to_string()
        }
    }

    /// Check one answer. `Ok(None)` means the step was skipped.
    pub fn accept(&self, input: &str, today: NaiveDate) -> std::result::Result<Option<FieldValue>, String> {
        let trimmed = input.trim();
        if trimmed.eq_ignore_ascii_case(SKIP_WORD) {
            return if self.is_optional() {
                Ok(None)
            } else {
                Err(format!("{} is required.", self.field().label()))
            };
        }
        if trimmed.is_empty() {
            return Err(format!("{} cannot be empty.", self.field().label()));
        }

        match self {
            Self::ActivityDate => match normalize_form_date(trimmed, today) {
                Ok(date) => Ok(Some(FieldValue::Text(date.format("%Y-%m-%d").to_string()))),
                Err(DateError::Future(date)) => Err(format!(
                    "{date} is in the future. Please enter the date the outreach took place."
                )),
                Err(DateError::Invalid(_)) => {
                    Err("Please enter a valid date, e.g. 10/02/2026 or 2026-02-10.".to_string())
                }
            },
            Self::Saved | Self::Healed => trimmed
                .parse::<u32>()
                .map(|n| Some(FieldValue::Number(n)))
                .map_err(|_| "Please enter a whole number (0 or more).".to_string()),
            _ => Ok(Some(FieldValue::Text(normalize_value(trimmed)))),
        }
    }
}

// ── Sessions ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub chat_id: String,
    pub sender: String,
}

impl SessionKey {
    pub fn new(chat_id: impl Into<String>, sender: impl Into<String>) -> Self {
        SessionKey {
            chat_id: chat_id.into(),
            sender: sender.into(),
        }
    }
}

/// One user's progress through the form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormSession {
    pub step: FormStep,
    pub report: ParsedReport,
}

/// Externally owned session storage.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, key: &SessionKey) -> Result<Option<FormSession>>;
    async fn put(&self, key: &SessionKey, session: FormSession) -> Result<()>;
    async fn remove(&self, key: &SessionKey) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<SessionKey, FormSession>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, key: &SessionKey) -> Result<Option<FormSession>> {
        Ok(self.sessions.read().await.get(key).cloned())
    }

    async fn put(&self, key: &SessionKey, session: FormSession) -> Result<()> {
        self.sessions.write().await.insert(key.clone(), session);
        Ok(())
    }

    async fn remove(&self, key: &SessionKey) -> Result<()> {
        self.sessions.write().await.remove(key);
        Ok(())
    }
}

// ── Engine ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormOutcome {
    /// Answer accepted; ask the next question.
    Prompt(String),
    /// Answer rejected; ask again.
    Retry(String),
    Completed(ParsedReport),
    Cancelled,
    /// No form in progress for this key.
    Inactive,
}

#[derive(Clone)]
pub struct FormEngine {
    sessions: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
}

impl FormEngine {
    pub fn new(sessions: Arc<dyn SessionStore>, clock: Arc<dyn Clock>) -> Self {
        FormEngine { sessions, clock }
    }

    pub async fn is_active(&self, key: &SessionKey) -> Result<bool> {
        Ok(self.sessions.get(key).await?.is_some())
    }

    /// Begin (or restart) a form and return the first question.
    pub async fn start(&self, key: &SessionKey) -> Result<String> {
        let step = FormStep::first();
        self.sessions
            .put(
                key,
                FormSession {
                    step,
                    report: ParsedReport::new(),
                },
            )
            .await?;
        debug!(chat = %key.chat_id, sender = %key.sender, "form started");
        Ok(format!(
            "New outreach report. Reply \"cancel\" at any time to stop.\n\n{}",
            step.prompt()
        ))
    }

    pub async fn cancel(&self, key: &SessionKey) -> Result<()> {
        self.sessions.remove(key).await
    }

    /// Feed one answer into the user's form.
    pub async fn advance(&self, key: &SessionKey, input: &str) -> Result<FormOutcome> {
        let Some(mut session) = self.sessions.get(key).await? else {
            return Ok(FormOutcome::Inactive);
        };

        if CANCEL_WORDS.iter().any(|w| input.trim().eq_ignore_ascii_case(w)) {
            self.sessions.remove(key).await?;
            return Ok(FormOutcome::Cancelled);
        }

        let step = session.step;
        match step.accept(input, self.clock.today()) {
            Ok(Some(value)) => session.report.set(step.field(), value),
            Ok(None) if step == FormStep::ReporterName => {
                session.report.set(step.field(), key.sender.clone())
            }
            Ok(None) => {}
            Err(reason) => return Ok(FormOutcome::Retry(format!("{reason}\n{}", step.prompt()))),
        }

        match step.next() {
            Some(next) => {
                session.step = next;
                self.sessions.put(key, session).await?;
                Ok(FormOutcome::Prompt(next.prompt()))
            }
            None => {
                self.sessions.remove(key).await?;
                debug!(chat = %key.chat_id, sender = %key.sender, "form completed");
                Ok(FormOutcome::Completed(session.report))
            }
        }
    }
}
