use chrono::NaiveDate;
use serde::Deserialize;
use std::sync::Arc;

use super::SourceAdapter;
use crate::config::MAX_UNREAD;
use crate::error::BriefError;
use crate::google::GoogleApi;

const NO_SUBJECT: &str = "<no subject>";

#[derive(Debug, Deserialize)]
struct MessageList {
    #[serde(default)]
    messages: Vec<MessageRef>,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct MessageMeta {
    #[serde(default)]
    payload: Payload,
}

#[derive(Debug, Default, Deserialize)]
struct Payload {
    #[serde(default)]
    headers: Vec<Header>,
}

#[derive(Debug, Deserialize)]
struct Header {
    name: String,
    value: String,
}

impl MessageMeta {
    fn header(&self, name: &str) -> Option<&str> {
        self.payload
            .headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    /// "{subject} from {sender}"
    fn synopsis(&self) -> String {
        format!(
            "{} from {}",
            self.header("Subject").unwrap_or(NO_SUBJECT),
            self.header("From").unwrap_or("")
        )
    }
}

/// One-line synopses of the most recent unread Gmail messages.
///
/// The inbox is not filtered by date: "unread" is the user's current state.
pub struct GmailTool {
    api: Arc<GoogleApi>,
    cap: u32,
}

impl GmailTool {
    pub fn new(api: Arc<GoogleApi>, cap: u32) -> Self {
        Self {
            api,
            cap: cap.min(MAX_UNREAD),
        }
    }
}

#[async_trait::async_trait]
impl SourceAdapter for GmailTool {
    async fn fetch(&self, _date: NaiveDate) -> Result<Vec<String>, BriefError> {
        let list_url = format!("{}/users/me/messages", self.api.gmail_api);
        let list: MessageList = self
            .api
            .get_json(
                &list_url,
                &[
                    ("labelIds", "UNREAD".to_string()),
                    ("maxResults", self.cap.to_string()),
                ],
            )
            .await?;

        let mut summaries = Vec::new();
        for message in list.messages.iter().take(self.cap as usize) {
            let meta: MessageMeta = self
                .api
                .get_json(
                    &format!("{}/{}", list_url, message.id),
                    &[
                        ("format", "metadata".to_string()),
                        ("metadataHeaders", "Subject".to_string()),
                        ("metadataHeaders", "From".to_string()),
                    ],
                )
                .await?;
            summaries.push(meta.synopsis());
        }

        log::info!("GmailTool: {} unread message(s)", summaries.len());
        Ok(summaries)
    }
}
