//! Chat-facing message routing.
//!
//! Every inbound message is classified once: a command, an answer to an
//! open form, a free-form report, or noise. Replies go out through a
//! [`ChatTransport`] so the routing can run against any messenger.

use std::io::Write;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use report_types::{CanonicalField, ParsedReport};
use tracing::{debug, info, warn};

use crate::date::Clock;
use crate::error::{ReportError, Result};
use crate::extract::FieldExtractor;
use crate::form::{FormEngine, FormOutcome, SessionKey};
use crate::store::{ReportStore, StoredReport};
use crate::summary::{Period, SummaryService, render_text};
use crate::validate::validate;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub chat_id: String,
    pub sender: String,
    pub text: String,
}

impl IncomingMessage {
    pub fn new(chat_id: impl Into<String>, sender: impl Into<String>, text: impl Into<String>) -> Self {
        IncomingMessage {
            chat_id: chat_id.into(),
            sender: sender.into(),
            text: text.into(),
        }
    }

    fn session_key(&self) -> SessionKey {
        SessionKey::new(self.chat_id.clone(), self.sender.clone())
    }
}

/// Outbound side of the messenger.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send_text(&self, chat_id: &str, text: &str) -> Result<()>;
}

/// Prints replies; used by the CLI `chat` command.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdoutTransport;

#[async_trait]
impl ChatTransport for StdoutTransport {
    async fn send_text(&self, chat_id: &str, text: &str) -> Result<()> {
        let mut out = std::io::stdout().lock();
        writeln!(out, "[{chat_id}] {text}")
            .and_then(|_| out.flush())
            .map_err(|e| ReportError::Transport(format!("stdout: {e}")))
    }
}

/// What the bot did with a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Routed {
    Command,
    FormStep,
    Stored(StoredReport),
    Rejected(Vec<String>),
    Ignored,
}

// ── Commands ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command<'a> {
    Help,
    Report,
    Cancel,
    Summary(Vec<&'a str>),
    Unknown(&'a str),
}

/// Parse "/name args…". A "@botname" suffix on the command is ignored.
fn parse_command(text: &str) -> Option<Command<'_>> {
    let text = text.trim();
    let rest = text.strip_prefix('/')?;
    let mut parts = rest.split_whitespace();
    let head = parts.next()?;
    let name = head.split('@').next().unwrap_or(head);
    let command = match name.to_ascii_lowercase().as_str() {
        "help" | "start" => Command::Help,
        "report" => Command::Report,
        "cancel" => Command::Cancel,
        "summary" => Command::Summary(parts.collect()),
        _ => Command::Unknown(name),
    };
    Some(command)
}

const HELP_TEXT: &str = "\
Outreach report bot

/report  fill in a report step by step
/cancel  stop the report in progress
/summary [week|month|<from> <to>]  totals and narrative for this group
/help    show this message

You can also paste a full report, for example:
Date: 15/02/2026
Location: Sakubva
Activity Type: Street Evangelism
Preachers/Team: Br Tadiwa, Sr Ruth
Message Summary: Repentance
Saved: 4
Healed: 1";

// ── Bot ──────────────────────────────────────────────────────────────

pub struct ReportBot {
    extractor: FieldExtractor,
    forms: FormEngine,
    store: Arc<dyn ReportStore>,
    summaries: SummaryService,
    transport: Arc<dyn ChatTransport>,
    clock: Arc<dyn Clock>,
    min_report_fields: usize,
}

impl ReportBot {
    pub fn new(
        extractor: FieldExtractor,
        forms: FormEngine,
        store: Arc<dyn ReportStore>,
        summaries: SummaryService,
        transport: Arc<dyn ChatTransport>,
        clock: Arc<dyn Clock>,
        min_report_fields: usize,
    ) -> Self {
        ReportBot {
            extractor,
            forms,
            store,
            summaries,
            transport,
            clock,
            min_report_fields,
        }
    }

    async fn reply(&self, msg: &IncomingMessage, text: &str) -> Result<()> {
        self.transport.send_text(&msg.chat_id, text).await
    }

    /// Route one inbound message and send whatever reply it needs.
    pub async fn handle(&self, msg: &IncomingMessage) -> Result<Routed> {
        if let Some(command) = parse_command(&msg.text) {
            return self.handle_command(msg, command).await;
        }

        let key = msg.session_key();
        match self.forms.advance(&key, &msg.text).await? {
            FormOutcome::Inactive => {}
            FormOutcome::Prompt(text) | FormOutcome::Retry(text) => {
                self.reply(msg, &text).await?;
                return Ok(Routed::FormStep);
            }
            FormOutcome::Cancelled => {
                self.reply(msg, "Report cancelled.").await?;
                return Ok(Routed::FormStep);
            }
            FormOutcome::Completed(report) => return self.submit(msg, report).await,
        }

        let labels = self.extractor.count_labels(&msg.text);
        if labels < self.min_report_fields {
            debug!(chat = %msg.chat_id, labels, "ignoring message");
            return Ok(Routed::Ignored);
        }

        let report = self.extractor.extract(&msg.text, self.clock.today());
        self.submit(msg, report).await
    }

    async fn handle_command(&self, msg: &IncomingMessage, command: Command<'_>) -> Result<Routed> {
        let key = msg.session_key();
        match command {
            Command::Help => self.reply(msg, HELP_TEXT).await?,
            Command::Report => {
                let prompt = self.forms.start(&key).await?;
                self.reply(msg, &prompt).await?;
            }
            Command::Cancel => {
                let text = if self.forms.is_active(&key).await? {
                    self.forms.cancel(&key).await?;
                    "Report cancelled."
                } else {
                    "There is no report in progress."
                };
                self.reply(msg, text).await?;
            }
            Command::Summary(args) => {
                let text = match Period::from_args(&args, self.clock.today()) {
                    Ok(period) => {
                        let report = self
                            .summaries
                            .generate(Some(&msg.chat_id), &period, None)
                            .await?;
                        render_text(&report)
                    }
                    Err(reason) => format!("Could not read the period: {reason}"),
                };
                self.reply(msg, &text).await?;
            }
            Command::Unknown(name) => {
                self.reply(msg, &format!("Unknown command /{name}. Send /help for the list."))
                    .await?;
            }
        }
        Ok(Routed::Command)
    }

    /// Validate, then either store or send the defects back.
    async fn submit(&self, msg: &IncomingMessage, report: ParsedReport) -> Result<Routed> {
        let result = validate(&report);
        if !result.valid {
            warn!(chat = %msg.chat_id, sender = %msg.sender, errors = result.errors.len(), "rejected report");
            let text = format!(
                "Your report was not recorded. Please fix:\n{}",
                result.bullet_list()
            );
            self.reply(msg, &text).await?;
            return Ok(Routed::Rejected(result.errors));
        }

        let stored = StoredReport::new(msg.chat_id.clone(), msg.sender.clone(), Utc::now(), report);
        self.store.save(&stored).await?;
        info!(chat = %msg.chat_id, sender = %msg.sender, id = %stored.id, "accepted report");

        self.reply(msg, &confirmation(&stored.report)).await?;
        Ok(Routed::Stored(stored))
    }
}

fn confirmation(report: &ParsedReport) -> String {
    let location = report.text(CanonicalField::Location).unwrap_or("-");
    let date = report.text(CanonicalField::ActivityDate).unwrap_or("-");
    let saved = report.number(CanonicalField::Saved).unwrap_or(0);
    let healed = report.number(CanonicalField::Healed).unwrap_or(0);
    format!("Report recorded: {location} on {date}. Saved: {saved}, Healed: {healed}. Thank you!")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::Aggregator;
    use crate::date::FixedClock;
    use crate::form::MemorySessionStore;
    use crate::store::MemoryStore;
    use chrono::NaiveDate;
    use report_types::Voice;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<(String, String)>>,
    }

    impl RecordingTransport {
        async fn last(&self) -> String {
            self.sent
                .lock()
                .await
                .last()
                .map(|(_, text)| text.clone())
                .unwrap_or_default()
        }

        async fn count(&self) -> usize {
            self.sent.lock().await.len()
        }
    }

    #[async_trait]
    impl ChatTransport for RecordingTransport {
        async fn send_text(&self, chat_id: &str, text: &str) -> Result<()> {
            self.sent
                .lock()
                .await
                .push((chat_id.to_string(), text.to_string()));
            Ok(())
        }
    }

    struct Harness {
        bot: ReportBot,
        store: Arc<MemoryStore>,
        transport: Arc<RecordingTransport>,
    }

    fn harness() -> Harness {
        let today = NaiveDate::from_ymd_opt(2026, 2, 15).unwrap();
        let clock: Arc<dyn Clock> = Arc::new(FixedClock(today));
        let store = Arc::new(MemoryStore::new());
        let transport = Arc::new(RecordingTransport::default());
        let summaries = SummaryService::new(
            store.clone(),
            Aggregator::default(),
            None,
            clock.clone(),
            Voice::Neutral,
        );
        let bot = ReportBot::new(
            FieldExtractor::default(),
            FormEngine::new(Arc::new(MemorySessionStore::new()), clock.clone()),
            store.clone(),
            summaries,
            transport.clone(),
            clock,
            3,
        );
        Harness {
            bot,
            store,
            transport,
        }
    }

    const GOOD: &str = "*OUTREACH REPORT*\n\
        Date: 14/02/2026\n\
        Location: Sakubva\n\
        Activity Type: Street Evangelism\n\
        Preachers/Team: Br Tadiwa and Sr Ruth\n\
        Message Summary: Repentance\n\
        Saved: 4\n\
        Healed: 1";

    #[tokio::test]
    async fn test_stdout_transport_writes() {
        StdoutTransport.send_text("cli", "hello").await.unwrap();
    }

    #[test]
    fn test_parse_command() {
        assert_eq!(parse_command("/help"), Some(Command::Help));
        assert_eq!(parse_command("  /Report@outreach_bot "), Some(Command::Report));
        assert_eq!(
            parse_command("/summary 01/02/2026 2026-02-10"),
            Some(Command::Summary(vec!["01/02/2026", "2026-02-10"]))
        );
        assert_eq!(parse_command("/dance"), Some(Command::Unknown("dance")));
        assert_eq!(parse_command("hello /help"), None);
        assert_eq!(parse_command("/"), None);
    }

    #[tokio::test]
    async fn test_full_report_is_stored() {
        let h = harness();
        let routed = h
            .bot
            .handle(&IncomingMessage::new("group-1", "+263771", GOOD))
            .await
            .unwrap();
        let Routed::Stored(stored) = routed else {
            panic!("expected stored, got {routed:?}");
        };
        assert_eq!(stored.group_key, "group-1");
        assert_eq!(stored.sender, "+263771");
        assert_eq!(stored.report.text(CanonicalField::ActivityDate), Some("2026-02-14"));
        assert_eq!(h.store.len().await, 1);
        assert_eq!(
            h.transport.last().await,
            "Report recorded: Sakubva on 2026-02-14. Saved: 4, Healed: 1. Thank you!"
        );
    }

    #[tokio::test]
    async fn test_invalid_report_gets_defect_list() {
        let h = harness();
        let text = "Date: 45/13/2026\nLocation: Dangamvura\nSaved: 2";
        let routed = h
            .bot
            .handle(&IncomingMessage::new("group-1", "+263771", text))
            .await
            .unwrap();
        let Routed::Rejected(errors) = routed else {
            panic!("expected rejection, got {routed:?}");
        };
        assert!(errors.iter().any(|e| e.starts_with("Activity Date must be a valid date")));
        assert!(errors.contains(&"Activity Type is required".to_string()));
        assert!(h.store.is_empty().await);
        let reply = h.transport.last().await;
        assert!(reply.starts_with("Your report was not recorded."));
        assert!(reply.contains("• Message Summary is required"));
    }

    #[tokio::test]
    async fn test_chatter_is_ignored() {
        let h = harness();
        let routed = h
            .bot
            .handle(&IncomingMessage::new("group-1", "+263771", "Amen! Location: Sakubva"))
            .await
            .unwrap();
        assert_eq!(routed, Routed::Ignored);
        assert_eq!(h.transport.count().await, 0);
    }

    #[tokio::test]
    async fn test_form_flow_stores_report() {
        let h = harness();
        let chat = |text: &str| IncomingMessage::new("group-1", "Tadiwa", text);

        assert_eq!(h.bot.handle(&chat("/report")).await.unwrap(), Routed::Command);
        let answers = [
            "yesterday",
            "Sakubva",
            "skip",
            "skip",
            "Door to door",
            "Br Tadiwa",
            "Grace",
            "skip",
            "3",
            "0",
        ];
        for answer in answers {
            assert_eq!(h.bot.handle(&chat(answer)).await.unwrap(), Routed::FormStep);
        }
        let routed = h.bot.handle(&chat("skip")).await.unwrap();
        let Routed::Stored(stored) = routed else {
            panic!("expected stored, got {routed:?}");
        };
        assert_eq!(stored.report.text(CanonicalField::ActivityDate), Some("2026-02-14"));
        assert_eq!(stored.report.text(CanonicalField::ReporterName), Some("Tadiwa"));
        assert_eq!(h.store.len().await, 1);
    }

    #[tokio::test]
    async fn test_cancel_command() {
        let h = harness();
        let chat = |text: &str| IncomingMessage::new("group-1", "Tadiwa", text);

        h.bot.handle(&chat("/cancel")).await.unwrap();
        assert_eq!(h.transport.last().await, "There is no report in progress.");

        h.bot.handle(&chat("/report")).await.unwrap();
        h.bot.handle(&chat("/cancel")).await.unwrap();
        assert_eq!(h.transport.last().await, "Report cancelled.");
        assert_eq!(h.bot.handle(&chat("yesterday")).await.unwrap(), Routed::Ignored);
    }

    #[tokio::test]
    async fn test_summary_command_covers_chat_group() {
        let h = harness();
        h.bot
            .handle(&IncomingMessage::new("group-1", "+263771", GOOD))
            .await
            .unwrap();
        h.bot
            .handle(&IncomingMessage::new("group-2", "+263772", GOOD))
            .await
            .unwrap();

        h.bot
            .handle(&IncomingMessage::new("group-1", "+263771", "/summary month"))
            .await
            .unwrap();
        let reply = h.transport.last().await;
        assert!(reply.starts_with("OUTREACH SUMMARY: group-1 (2026-02-01 to 2026-02-28)"));
        assert!(reply.contains("Outreaches: 1 | Saved: 4 | Healed: 1"));

        h.bot
            .handle(&IncomingMessage::new("group-1", "+263771", "/summary fortnight"))
            .await
            .unwrap();
        assert!(h.transport.last().await.starts_with("Could not read the period"));
    }
}
