use chrono::{Local, NaiveDate};
use std::sync::Arc;
use std::time::Duration;

use crate::auth::Credential;
use crate::config::{BriefingConfig, Config};
use crate::decision::{Decision, DecisionProcess, ModelDecider, RuleDecider};
use crate::error::BriefError;
use crate::llm;
use crate::registry::ToolRegistry;
use crate::tools::{ToolId, ToolResult};

/// The day a briefing is wanted for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BriefRequest {
    pub date: NaiveDate,
}

impl BriefRequest {
    pub fn new(date: NaiveDate) -> Self {
        Self { date }
    }

    /// Today in the host's local time zone.
    pub fn today() -> Self {
        Self::new(Local::now().date_naive())
    }

    /// The task handed to the decision process.
    pub fn instruction(&self, registry: &ToolRegistry) -> String {
        let mut prompt = format!(
            "Generate a friendly daily briefing for {}, citing birthdays, calendar events and unread messages as evidence.\n\n",
            self.date.format("%Y-%m-%d")
        );
        for tool in registry.list() {
            let label = ToolId::from_name(&tool.name)
                .map(ToolId::label)
                .unwrap_or(tool.name.as_str());
            prompt.push_str(&format!("- {}: use {}\n", label, tool.name));
        }
        prompt.push_str(
            "Then summarize all findings in 3-4 sentences.\n\
             Only mention birthdays, events and messages that appear in the tool observations. \
             If a tool was UNAVAILABLE, say that this source could not be checked.",
        );
        prompt
    }
}

/// One tool call and what it returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptEntry {
    pub tool: String,
    pub argument: NaiveDate,
    pub result: ToolResult,
}

/// Ordered record of the tool calls made during one briefing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcript {
    pub date: NaiveDate,
    entries: Vec<TranscriptEntry>,
}

impl Transcript {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            entries: Vec::new(),
        }
    }

    pub fn push(&mut self, entry: TranscriptEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn has_called(&self, tool: &str) -> bool {
        self.entries.iter().any(|e| e.tool == tool)
    }

    /// Most recent result per tool, in first-call order.
    pub fn latest_results(&self) -> Vec<(&str, &ToolResult)> {
        let mut latest: Vec<(&str, &ToolResult)> = Vec::new();
        for entry in &self.entries {
            match latest.iter_mut().find(|(tool, _)| *tool == entry.tool) {
                Some(slot) => slot.1 = &entry.result,
                None => latest.push((entry.tool.as_str(), &entry.result)),
            }
        }
        latest
    }

    /// Plain-text account of the gathered evidence, one line per tool.
    pub fn evidence_summary(&self) -> String {
        if self.is_empty() {
            return no_information(self.date);
        }

        let mut summary = format!(
            "Here is your briefing for {}:",
            self.date.format("%A, %-d %B %Y")
        );
        for (tool, result) in self.latest_results() {
            let label = ToolId::from_name(tool).map(ToolId::label).unwrap_or(tool);
            let line = match result {
                ToolResult::Items(items) if items.is_empty() => "none found".to_string(),
                ToolResult::Items(items) => items.join("; "),
                ToolResult::Unavailable(_) => "could not be checked right now".to_string(),
            };
            summary.push_str(&format!("\n• {}: {}.", label, line));
        }
        summary
    }
}

fn no_information(date: NaiveDate) -> String {
    format!(
        "No information was retrieved for {}, so there is nothing to report yet.",
        date.format("%A, %-d %B %Y")
    )
}

/// The finished briefing.
#[derive(Debug)]
pub struct Brief {
    pub text: String,
    /// Why the loop stopped before a final answer; the text was then
    /// composed locally from the transcript.
    pub cut_short: Option<BriefError>,
    pub transcript: Transcript,
}

impl Brief {
    pub fn is_partial(&self) -> bool {
        self.cut_short.is_some()
    }
}

enum LoopState {
    AwaitingDecision,
    ToolCallPending(String),
    Terminated {
        text: String,
        cut_short: Option<BriefError>,
    },
}

/// Drives the decision process through tool calls until it produces a
/// briefing or runs out of steps.
pub struct BriefingAgent {
    registry: ToolRegistry,
    decider: Arc<dyn DecisionProcess>,
    max_steps: usize,
    tool_timeout: Duration,
}

impl BriefingAgent {
    pub fn new(
        registry: ToolRegistry,
        decider: Arc<dyn DecisionProcess>,
        config: &BriefingConfig,
    ) -> Self {
        let max_steps = config.max_steps.unwrap_or(registry.len() * 2);
        Self::with_limits(registry, decider, max_steps, config.tool_timeout())
    }

    /// A fresh agent for one briefing, backed by `credential`.
    pub fn from_config(config: &Config, credential: &Credential) -> Result<Self, BriefError> {
        let registry = ToolRegistry::for_session(credential, &config.google, &config.briefing)?;
        let decider: Arc<dyn DecisionProcess> = match llm::chat_model_from_config(&config.ai_model)
        {
            Some(model) => Arc::new(ModelDecider::new(model, config.ai_model.temperature)),
            None => Arc::new(RuleDecider),
        };
        Ok(Self::new(registry, decider, &config.briefing))
    }

    pub fn with_limits(
        registry: ToolRegistry,
        decider: Arc<dyn DecisionProcess>,
        max_steps: usize,
        tool_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            decider,
            max_steps,
            tool_timeout,
        }
    }

    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    /// Run the decide/invoke loop for `request`.
    ///
    /// Provider failures and the step cap never surface as errors. A broken
    /// decision process is fatal only before any evidence was gathered; an
    /// expired credential always is.
    pub async fn get_brief(&self, request: &BriefRequest) -> Result<Brief, BriefError> {
        let instruction = request.instruction(&self.registry);
        let mut transcript = Transcript::new(request.date);
        let mut state = LoopState::AwaitingDecision;
        let mut steps = 0;

        log::info!(
            "Agent: briefing for {} ({} tools, step cap {})",
            request.date,
            self.registry.len(),
            self.max_steps
        );

        let (text, cut_short) = loop {
            state = match state {
                LoopState::Terminated { text, cut_short } => break (text, cut_short),

                LoopState::AwaitingDecision if steps >= self.max_steps => {
                    let reason = BriefError::LoopExceeded(self.max_steps);
                    log::warn!(
                        "Agent: {}, composing from {} observation(s)",
                        reason,
                        transcript.len()
                    );
                    LoopState::Terminated {
                        text: partial_text(&transcript),
                        cut_short: Some(reason),
                    }
                }

                LoopState::AwaitingDecision => {
                    steps += 1;
                    let decision = match self
                        .decider
                        .decide(&instruction, self.registry.list(), &transcript)
                        .await
                    {
                        Ok(decision) => decision,
                        Err(e) if !transcript.is_empty() && !e.clears_session() => {
                            log::error!(
                                "Agent: {}, composing from {} observation(s)",
                                e,
                                transcript.len()
                            );
                            break (partial_text(&transcript), Some(e));
                        }
                        Err(e) => return Err(e),
                    };

                    match decision {
                        Decision::Invoke { tool, argument } => {
                            log::info!("Agent: Step {} - invoking {}", steps, tool);
                            if let Some(arg) = argument.filter(|d| *d != request.date) {
                                log::warn!(
                                    "Agent: {} requested for {}, using {} instead",
                                    tool,
                                    arg,
                                    request.date
                                );
                            }
                            LoopState::ToolCallPending(tool)
                        }
                        Decision::Finish(text) => {
                            log::info!("Agent: Step {} - final answer", steps);
                            let text = if text.trim().is_empty() {
                                transcript.evidence_summary()
                            } else {
                                text.trim().to_string()
                            };
                            LoopState::Terminated {
                                text,
                                cut_short: None,
                            }
                        }
                    }
                }

                LoopState::ToolCallPending(tool) => {
                    let result = self
                        .registry
                        .invoke(&tool, request.date, self.tool_timeout)
                        .await?;
                    match &result {
                        ToolResult::Items(items) => {
                            log::info!("Agent: {} returned {} item(s)", tool, items.len())
                        }
                        ToolResult::Unavailable(reason) => {
                            log::warn!("Agent: {} unavailable: {}", tool, reason)
                        }
                    }
                    transcript.push(TranscriptEntry {
                        tool,
                        argument: request.date,
                        result,
                    });
                    LoopState::AwaitingDecision
                }
            };
        };

        Ok(Brief {
            text,
            cut_short,
            transcript,
        })
    }
}

fn partial_text(transcript: &Transcript) -> String {
    if transcript.is_empty() {
        return no_information(transcript.date);
    }
    format!(
        "(Partial briefing: the assistant stopped before finishing.)\n{}",
        transcript.evidence_summary()
    )
}
