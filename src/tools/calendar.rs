use chrono::NaiveDate;
use serde::Deserialize;
use std::sync::Arc;

use super::{next_page_token, SourceAdapter};
use crate::error::BriefError;
use crate::google::GoogleApi;

const NO_TITLE: &str = "No title";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventsPage {
    #[serde(default)]
    items: Vec<Event>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Event {
    summary: Option<String>,
}

/// Titles of the events on the primary calendar for one day.
pub struct CalendarTool {
    api: Arc<GoogleApi>,
}

impl CalendarTool {
    pub fn new(api: Arc<GoogleApi>) -> Self {
        Self { api }
    }

    /// UTC bounds of `date`, as the calendar API expects them.
    fn day_bounds(date: NaiveDate) -> (String, String) {
        let iso = date.format("%Y-%m-%d");
        (format!("{}T00:00:00Z", iso), format!("{}T23:59:59Z", iso))
    }
}

#[async_trait::async_trait]
impl SourceAdapter for CalendarTool {
    async fn fetch(&self, date: NaiveDate) -> Result<Vec<String>, BriefError> {
        let url = format!("{}/calendars/primary/events", self.api.calendar_api);
        let (time_min, time_max) = Self::day_bounds(date);

        let mut titles = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut query = vec![
                ("timeMin", time_min.clone()),
                ("timeMax", time_max.clone()),
                ("singleEvents", "true".to_string()),
                ("orderBy", "startTime".to_string()),
            ];
            if let Some(token) = &page_token {
                query.push(("pageToken", token.clone()));
            }

            let page: EventsPage = self.api.get_json(&url, &query).await?;
            titles.extend(
                page.items
                    .into_iter()
                    .map(|e| e.summary.unwrap_or_else(|| NO_TITLE.to_string())),
            );

            match next_page_token(page_token.as_deref(), page.next_page_token) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        log::info!("CalendarTool: {} event(s) on {}", titles.len(), date);
        Ok(titles)
    }
}
