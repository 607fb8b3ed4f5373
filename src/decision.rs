use chrono::NaiveDate;
use serde::Deserialize;
use std::sync::Arc;

use crate::agent::Transcript;
use crate::error::BriefError;
use crate::llm::{ChatModel, ChatRequest};
use crate::registry::ToolDescriptor;

/// What the decision process wants to do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Call a tool. The argument is always the request date; a different
    /// date from the decision process is overridden by the loop.
    Invoke {
        tool: String,
        argument: Option<NaiveDate>,
    },
    /// Stop and use this text as the briefing.
    Finish(String),
}

/// Chooses between calling another tool and finishing.
#[async_trait::async_trait]
pub trait DecisionProcess: Send + Sync {
    async fn decide(
        &self,
        instruction: &str,
        tools: &[ToolDescriptor],
        transcript: &Transcript,
    ) -> Result<Decision, BriefError>;
}

/// Deterministic fallback: call every tool once, in registry order, then
/// write the evidence out as a short briefing.
pub struct RuleDecider;

#[async_trait::async_trait]
impl DecisionProcess for RuleDecider {
    async fn decide(
        &self,
        _instruction: &str,
        tools: &[ToolDescriptor],
        transcript: &Transcript,
    ) -> Result<Decision, BriefError> {
        match tools.iter().find(|t| !transcript.has_called(&t.name)) {
            Some(next) => Ok(Decision::Invoke {
                tool: next.name.clone(),
                argument: Some(transcript.date),
            }),
            None => Ok(Decision::Finish(transcript.evidence_summary())),
        }
    }
}

/// Reply shape requested from the model.
#[derive(Debug, Deserialize)]
struct ModelReply {
    action: Option<String>,
    input: Option<serde_json::Value>,
    final_answer: Option<String>,
}

/// Language-model-driven decisions, one JSON reply per step.
pub struct ModelDecider {
    model: Arc<dyn ChatModel>,
    temperature: f32,
}

impl ModelDecider {
    pub fn new(model: Arc<dyn ChatModel>, temperature: f32) -> Self {
        Self { model, temperature }
    }

    fn system_prompt(tools: &[ToolDescriptor]) -> String {
        let mut prompt = String::from(
            "You are a personal assistant preparing a short morning briefing.\n\n\
             You can call these tools. Each takes a single date (YYYY-MM-DD) and returns a list of lines:\n",
        );
        for tool in tools {
            prompt.push_str(&format!("- {}: {}\n", tool.name, tool.description));
        }
        prompt.push_str(
            r#"
Reply with exactly ONE JSON object and nothing else:
- to call a tool: {"action": "<tool name>", "input": "<YYYY-MM-DD>"}
- to finish: {"final_answer": "<the briefing>"}

Rules:
- Call each tool at most once; do not repeat a tool that already has an observation.
- Use only tool names from the list above.
- The briefing must only mention birthdays, events and emails that appear in the observations. Never invent any.
- If an observation says UNAVAILABLE, say that this source could not be checked.
- If an observation says "nothing found", you may say there is nothing of that kind today."#,
        );
        prompt
    }

    fn user_prompt(instruction: &str, transcript: &Transcript) -> String {
        let mut prompt = format!("{}\n\n", instruction);
        if transcript.is_empty() {
            prompt.push_str("No tools have been called yet.\n");
        } else {
            prompt.push_str("Tool calls so far:\n");
            for entry in transcript.entries() {
                prompt.push_str(&format!(
                    "\nAction: {}\nInput: {}\nObservation:\n{}\n",
                    entry.tool,
                    entry.argument.format("%Y-%m-%d"),
                    entry.result.render()
                ));
            }
        }
        prompt.push_str("\nReply with your next JSON object.");
        prompt
    }

    fn parse_reply(output: &str) -> Result<Decision, BriefError> {
        let reply = first_json_object(output)?;

        if let Some(answer) = reply.final_answer {
            return Ok(Decision::Finish(answer));
        }

        match reply.action {
            Some(tool) if !tool.trim().is_empty() => {
                let argument = reply
                    .input
                    .as_ref()
                    .and_then(|v| v.as_str())
                    .and_then(|s| NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok());
                Ok(Decision::Invoke {
                    tool: tool.trim().to_string(),
                    argument,
                })
            }
            _ => Err(BriefError::Decision(
                "model reply had neither action nor final_answer".to_string(),
            )),
        }
    }
}

#[async_trait::async_trait]
impl DecisionProcess for ModelDecider {
    async fn decide(
        &self,
        instruction: &str,
        tools: &[ToolDescriptor],
        transcript: &Transcript,
    ) -> Result<Decision, BriefError> {
        let request = ChatRequest {
            system_prompt: Self::system_prompt(tools),
            user_prompt: Self::user_prompt(instruction, transcript),
            temperature: self.temperature,
            json_format: true,
        };

        let output = self.model.chat(request).await.map_err(|e| {
            log::error!("ModelDecider: {} request failed: {:#}", self.model.name(), e);
            BriefError::Decision(e.to_string())
        })?;
        log::debug!("ModelDecider: raw reply: {}", output);

        Self::parse_reply(&output)
    }
}

/// The first complete JSON object in `text`; anything after it is ignored.
fn first_json_object(text: &str) -> Result<ModelReply, BriefError> {
    let mut last_error = None;
    for (start, _) in text.match_indices('{') {
        match serde_json::Deserializer::from_str(&text[start..])
            .into_iter::<ModelReply>()
            .next()
        {
            Some(Ok(reply)) => return Ok(reply),
            Some(Err(e)) => last_error = Some(e),
            None => {}
        }
    }
    Err(BriefError::Decision(match last_error {
        Some(e) => format!("invalid decision JSON: {}", e),
        None => format!(
            "model reply contained no JSON: {}",
            text.chars().take(200).collect::<String>()
        ),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::TranscriptEntry;
    use crate::registry::test_support::StaticSource;
    use crate::registry::ToolRegistry;
    use crate::tools::{ToolId, ToolResult};
    use std::sync::Mutex;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()
    }

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        for id in ToolId::ALL {
            registry
                .register(id.name(), id.description(), StaticSource::items(&[]))
                .unwrap();
        }
        registry
    }

    /// Returns queued replies and keeps the prompts it was sent.
    struct QueuedChat {
        replies: Mutex<Vec<anyhow::Result<String>>>,
        prompts: Mutex<Vec<(String, String)>>,
    }

    impl QueuedChat {
        fn new(mut replies: Vec<anyhow::Result<String>>) -> Arc<Self> {
            replies.reverse();
            Arc::new(Self {
                replies: Mutex::new(replies),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait::async_trait]
    impl ChatModel for QueuedChat {
        fn name(&self) -> &str {
            "queued"
        }

        async fn chat(&self, request: ChatRequest) -> anyhow::Result<String> {
            self.prompts
                .lock()
                .unwrap()
                .push((request.system_prompt, request.user_prompt));
            self.replies
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(anyhow::anyhow!("no reply queued")))
        }
    }

    #[test]
    fn test_parse_action() {
        let decision =
            ModelDecider::parse_reply(r#"{"action": "get_events", "input": "2024-03-15"}"#)
                .unwrap();
        assert_eq!(
            decision,
            Decision::Invoke {
                tool: "get_events".into(),
                argument: Some(date()),
            }
        );
    }

    #[test]
    fn test_parse_final_answer_inside_prose() {
        let decision = ModelDecider::parse_reply(
            "Sure! {\"final_answer\": \"Busy day: dentist at 10.\"} Hope that helps.",
        )
        .unwrap();
        assert_eq!(decision, Decision::Finish("Busy day: dentist at 10.".into()));
    }

    #[test]
    fn test_parse_takes_first_of_several_objects() {
        let decision = ModelDecider::parse_reply(
            "{\"action\": \"get_events\", \"input\": \"2024-03-15\"}\n\
             {\"action\": \"get_birthdays\", \"input\": \"2024-03-15\"}",
        )
        .unwrap();
        assert_eq!(
            decision,
            Decision::Invoke {
                tool: "get_events".into(),
                argument: Some(date()),
            }
        );
    }

    #[test]
    fn test_parse_ignores_braces_around_the_object() {
        let decision = ModelDecider::parse_reply(
            "{\"final_answer\": \"Dentist at 10.\"} (format was {json})",
        )
        .unwrap();
        assert_eq!(decision, Decision::Finish("Dentist at 10.".into()));

        let decision = ModelDecider::parse_reply(
            "Using the {json} format: {\"final_answer\": \"Quiet day.\"}",
        )
        .unwrap();
        assert_eq!(decision, Decision::Finish("Quiet day.".into()));
    }

    #[test]
    fn test_parse_action_with_odd_input() {
        let decision =
            ModelDecider::parse_reply(r#"{"action": "get_emails", "input": "today"}"#).unwrap();
        assert_eq!(
            decision,
            Decision::Invoke {
                tool: "get_emails".into(),
                argument: None,
            }
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            ModelDecider::parse_reply("I think you should check the calendar."),
            Err(BriefError::Decision(_))
        ));
        assert!(matches!(
            ModelDecider::parse_reply(r#"{"thought": "hmm"}"#),
            Err(BriefError::Decision(_))
        ));
    }

    #[test]
    fn test_system_prompt_lists_tools() {
        let registry = registry();
        let prompt = ModelDecider::system_prompt(registry.list());
        for id in ToolId::ALL {
            assert!(prompt.contains(&format!("- {}: {}", id.name(), id.description())));
        }
        assert!(prompt.contains("Never invent"));
    }

    #[test]
    fn test_user_prompt_renders_transcript() {
        let mut transcript = Transcript::new(date());
        assert!(ModelDecider::user_prompt("brief me", &transcript).contains("No tools have been called"));

        transcript.push(TranscriptEntry {
            tool: "get_events".into(),
            argument: date(),
            result: ToolResult::Items(vec!["Dentist".into()]),
        });
        transcript.push(TranscriptEntry {
            tool: "get_emails".into(),
            argument: date(),
            result: ToolResult::Unavailable("timed out".into()),
        });
        let prompt = ModelDecider::user_prompt("brief me", &transcript);
        assert!(prompt.starts_with("brief me"));
        assert!(prompt.contains("Action: get_events\nInput: 2024-03-15\nObservation:\n- Dentist"));
        assert!(prompt.contains("UNAVAILABLE (timed out)"));
    }

    #[tokio::test]
    async fn test_model_decider_round() {
        let chat = QueuedChat::new(vec![Ok(r#"{"action":"get_birthdays","input":"2024-03-15"}"#.into())]);
        let decider = ModelDecider::new(chat.clone(), 0.2);
        let registry = registry();
        let decision = decider
            .decide("brief me", registry.list(), &Transcript::new(date()))
            .await
            .unwrap();
        assert!(matches!(decision, Decision::Invoke { ref tool, .. } if tool == "get_birthdays"));
        assert_eq!(chat.prompts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_model_failure_is_decision_error() {
        let chat = QueuedChat::new(vec![Err(anyhow::anyhow!("connection refused"))]);
        let decider = ModelDecider::new(chat, 0.2);
        let registry = registry();
        let err = decider
            .decide("brief me", registry.list(), &Transcript::new(date()))
            .await
            .unwrap_err();
        assert!(matches!(err, BriefError::Decision(ref m) if m.contains("connection refused")));
    }

    #[tokio::test]
    async fn test_rule_decider_calls_each_tool_once() {
        let registry = registry();
        let mut transcript = Transcript::new(date());
        let mut called = Vec::new();
        loop {
            match RuleDecider
                .decide("", registry.list(), &transcript)
                .await
                .unwrap()
            {
                Decision::Invoke { tool, argument } => {
                    assert_eq!(argument, Some(date()));
                    called.push(tool.clone());
                    transcript.push(TranscriptEntry {
                        tool,
                        argument: date(),
                        result: ToolResult::Items(vec![]),
                    });
                }
                Decision::Finish(text) => {
                    assert!(text.contains("none found"));
                    break;
                }
            }
        }
        assert_eq!(called, vec!["get_events", "get_birthdays", "get_emails"]);
    }
}
