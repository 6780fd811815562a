//! Narrative prose for period reports.
//!
//! Generation is delegated to an external text-generation service when one
//! is configured. Whatever happens there, callers always get a narrative:
//! failures fall back to a deterministic template built from the summary.

use async_trait::async_trait;
use report_types::{AggregatedSummary, Narrative, Voice};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::error::{ReportError, Result};

/// Locations named in full before the list is cut short.
const MAX_LISTED_LOCATIONS: usize = 6;
const MAX_THEMES: usize = 3;
const MAX_THEME_CHARS: usize = 80;

/// What the generation service is asked to write about.
#[derive(Debug, Clone)]
pub struct NarrativeRequest<'a> {
    pub summary: &'a AggregatedSummary,
    pub voice: Voice,
    pub period_label: &'a str,
    pub prompt: String,
}

impl<'a> NarrativeRequest<'a> {
    pub fn new(summary: &'a AggregatedSummary, voice: Voice, period_label: &'a str) -> Self {
        NarrativeRequest {
            summary,
            voice,
            period_label,
            prompt: build_prompt(summary, voice, period_label),
        }
    }
}

/// External text-generation collaborator.
#[async_trait]
pub trait NarrativeGenerator: Send + Sync {
    async fn generate(&self, request: &NarrativeRequest<'_>) -> Result<Narrative>;
}

// ── Prompt ───────────────────────────────────────────────────────────

fn voice_instruction(voice: Voice) -> &'static str {
    match voice {
        Voice::Eyewitness => {
            "Write in the first person plural as the labourers who went out (\"we preached…\")."
        }
        Voice::Compiled => {
            "Write in the third person as a compiler of testimonies received from the labourers (\"the team reports…\")."
        }
        Voice::Neutral => "Write in a neutral, factual reporting tone.",
    }
}

/// Prompt for the generation service, built only from aggregated data.
pub fn build_prompt(summary: &AggregatedSummary, voice: Voice, period_label: &str) -> String {
    let mut prompt = String::new();
    prompt.push_str(&format!(
        "Summarise the evangelism outreach reports for {period_label}.\n"
    ));
    prompt.push_str(voice_instruction(voice));
    prompt.push_str("\n\n");
    prompt.push_str(&format!("Outreaches: {}\n", summary.total_outreaches));
    prompt.push_str(&format!("Souls saved: {}\n", summary.total_saved));
    prompt.push_str(&format!("Healings: {}\n", summary.total_healed));
    prompt.push_str(&format!("Locations: {}\n", or_none(&summary.locations)));
    prompt.push_str(&format!("Labourers: {}\n", or_none(&summary.labourers)));
    prompt.push_str(&format!(
        "Activity types: {}\n",
        or_none(&summary.activity_types)
    ));
    if !summary.message_summaries.is_empty() {
        prompt.push_str("Messages preached:\n");
        for message in &summary.message_summaries {
            prompt.push_str(&format!("- {}\n", message.replace('\n', " ")));
        }
    }
    prompt.push_str(
        "\nRespond with a JSON object: {\"narrative\": string, \"themes\": [up to 3 short strings], \"closing\": string}.",
    );
    prompt
}

fn or_none(items: &[String]) -> String {
    if items.is_empty() {
        "none recorded".to_string()
    } else {
        items.join(", ")
    }
}

// ── Fallback ─────────────────────────────────────────────────────────

/// Deterministic narrative from the summary alone.
pub fn fallback_narrative(
    summary: &AggregatedSummary,
    voice: Voice,
    period_label: &str,
) -> Narrative {
    Narrative {
        prose: fallback_prose(summary, voice, period_label),
        themes: fallback_themes(summary),
        closing: fallback_closing(voice).to_string(),
    }
}

fn fallback_prose(summary: &AggregatedSummary, voice: Voice, period_label: &str) -> String {
    if summary.total_outreaches == 0 {
        return format!("No outreach reports were submitted for {period_label}.");
    }

    let outreaches = plural(summary.total_outreaches, "outreach", "outreaches");
    let places = match summary.locations.len() {
        0 => "unrecorded locations".to_string(),
        n => format!(
            "{} ({})",
            plural(n as u32, "location", "locations"),
            join_locations(&summary.locations)
        ),
    };
    let saved = plural(summary.total_saved, "soul", "souls");
    let healed = plural(summary.total_healed, "healing", "healings");

    match voice {
        Voice::Eyewitness => format!(
            "During {period_label} we went out on {outreaches} across {places}. \
             By God's grace {saved} gave their lives to Christ and we witnessed {healed}."
        ),
        Voice::Compiled => format!(
            "Compiled from the reports of {}, {outreaches} were conducted during {period_label} across {places}. \
             The labourers report {saved} saved and {healed}.",
            plural(summary.labourers.len() as u32, "labourer", "labourers")
        ),
        Voice::Neutral => format!(
            "{} conducted during {period_label} across {places}. \
             A total of {saved} saved and {healed} were reported.",
            capitalize(&format!(
                "{outreaches} {}",
                if summary.total_outreaches == 1 { "was" } else { "were" }
            ))
        ),
    }
}

fn fallback_themes(summary: &AggregatedSummary) -> Vec<String> {
    let from_messages = summary.message_summaries.iter().map(|m| {
        let first_line = m.lines().next().unwrap_or_default();
        truncate_chars(first_line, MAX_THEME_CHARS)
    });

    let mut themes: Vec<String> = Vec::new();
    for theme in summary.activity_types.iter().cloned().chain(from_messages) {
        if themes.len() == MAX_THEMES {
            break;
        }
        if !theme.is_empty() && !themes.contains(&theme) {
            themes.push(theme);
        }
    }
    themes
}

fn fallback_closing(voice: Voice) -> &'static str {
    match voice {
        Voice::Eyewitness => "We give thanks for every labourer who went out, and we press on.",
        Voice::Compiled => "These testimonies are compiled as submitted by the labourers in the field.",
        Voice::Neutral => "End of summary.",
    }
}

fn plural(n: u32, one: &str, many: &str) -> String {
    if n == 1 {
        format!("{n} {one}")
    } else {
        format!("{n} {many}")
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// "A", "A and B", "A, B and C", "A, B, … and 4 more".
fn join_locations(locations: &[String]) -> String {
    let (shown, rest) = if locations.len() > MAX_LISTED_LOCATIONS {
        (
            &locations[..MAX_LISTED_LOCATIONS],
            locations.len() - MAX_LISTED_LOCATIONS,
        )
    } else {
        (locations, 0)
    };

    let mut parts: Vec<String> = shown.to_vec();
    if rest > 0 {
        parts.push(format!("{rest} more"));
    }
    match parts.len() {
        0 => String::new(),
        1 => parts.remove(0),
        n => format!("{} and {}", parts[..n - 1].join(", "), parts[n - 1]),
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max - 1).collect();
        format!("{}…", cut.trim_end())
    }
}

// ── Composition ──────────────────────────────────────────────────────

/// Ask the generator if there is one; otherwise, or on any failure, use
/// the fallback. The flag is true when the fallback was used.
pub async fn compose_narrative(
    generator: Option<&dyn NarrativeGenerator>,
    summary: &AggregatedSummary,
    voice: Voice,
    period_label: &str,
) -> (Narrative, bool) {
    let Some(generator) = generator else {
        debug!("no narrative generator configured, using template");
        return (fallback_narrative(summary, voice, period_label), true);
    };

    let request = NarrativeRequest::new(summary, voice, period_label);
    match generator.generate(&request).await {
        Ok(narrative) if !narrative.prose.trim().is_empty() => (narrative, false),
        Ok(_) => {
            warn!("narrative generator returned empty prose, using template");
            (fallback_narrative(summary, voice, period_label), true)
        }
        Err(e) => {
            warn!(error = %e, "narrative generation failed, using template");
            (fallback_narrative(summary, voice, period_label), true)
        }
    }
}

// ── HTTP collaborator ────────────────────────────────────────────────

/// Connection settings for an OpenAI-compatible chat-completions API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NarrativeApiConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
}

/// Narrative generator backed by a chat-completions endpoint.
#[derive(Clone)]
pub struct HttpNarrativeGenerator {
    http_client: reqwest::Client,
    config: NarrativeApiConfig,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct GeneratedNarrative {
    narrative: String,
    #[serde(default)]
    themes: Vec<String>,
    #[serde(default)]
    closing: String,
}

impl HttpNarrativeGenerator {
    pub fn new(config: NarrativeApiConfig) -> Self {
        HttpNarrativeGenerator {
            http_client: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl NarrativeGenerator for HttpNarrativeGenerator {
    async fn generate(&self, request: &NarrativeRequest<'_>) -> Result<Narrative> {
        debug!(
            model = %self.config.model,
            voice = request.voice.as_str(),
            period = request.period_label,
            outreaches = request.summary.total_outreaches,
            "requesting narrative"
        );
        let body = json!({
            "model": self.config.model,
            "response_format": { "type": "json_object" },
            "messages": [
                {
                    "role": "system",
                    "content": "You write concise ministry outreach reports from structured data. Never invent numbers or places."
                },
                { "role": "user", "content": request.prompt },
            ],
        });

        let response = self
            .http_client
            .post(format!(
                "{}/chat/completions",
                self.config.base_url.trim_end_matches('/')
            ))
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ReportError::Narrative(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ReportError::Narrative(format!("{status}: {error_text}")));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| ReportError::Narrative(format!("bad response body: {e}")))?;
        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ReportError::Narrative("response had no content".into()))?;

        let generated: GeneratedNarrative = serde_json::from_str(&content)?;
        Ok(Narrative {
            prose: generated.narrative,
            themes: generated.themes.into_iter().take(MAX_THEMES).collect(),
            closing: generated.closing,
        })
    }
}
