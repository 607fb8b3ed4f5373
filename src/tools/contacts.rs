use chrono::{Datelike, NaiveDate};
use serde::Deserialize;
use std::sync::Arc;

use super::{next_page_token, SourceAdapter};
use crate::config::MissingNamePolicy;
use crate::error::BriefError;
use crate::google::GoogleApi;

const UNKNOWN_NAME: &str = "Unknown";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConnectionsPage {
    #[serde(default)]
    connections: Vec<Person>,
    next_page_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    #[serde(default)]
    pub names: Vec<PersonName>,
    #[serde(default)]
    pub birthdays: Vec<Birthday>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonName {
    pub display_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Birthday {
    pub date: Option<BirthdayDate>,
}

/// Month/day of a birthday; the year is often withheld.
#[derive(Debug, Default, Deserialize)]
pub struct BirthdayDate {
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub day: Option<u32>,
}

impl Person {
    fn has_birthday_on(&self, date: NaiveDate) -> bool {
        self.birthdays.iter().any(|b| {
            b.date
                .as_ref()
                .is_some_and(|d| d.month == Some(date.month()) && d.day == Some(date.day()))
        })
    }

    fn display_name(&self) -> Option<&str> {
        self.names
            .first()
            .and_then(|n| n.display_name.as_deref())
            .filter(|n| !n.trim().is_empty())
    }
}

/// Names of everyone whose birthday (month and day, any year) is `date`.
pub fn birthdays_on(people: &[Person], date: NaiveDate, policy: MissingNamePolicy) -> Vec<String> {
    people
        .iter()
        .filter(|p| p.has_birthday_on(date))
        .filter_map(|p| match (p.display_name(), policy) {
            (Some(name), _) => Some(name.to_string()),
            (None, MissingNamePolicy::Unknown) => Some(UNKNOWN_NAME.to_string()),
            (None, MissingNamePolicy::Skip) => {
                log::debug!("ContactsTool: skipping unnamed contact with a matching birthday");
                None
            }
        })
        .collect()
}

/// Birthdays from the user's Google contacts.
pub struct ContactsTool {
    api: Arc<GoogleApi>,
    page_size: u32,
    missing_name: MissingNamePolicy,
}

impl ContactsTool {
    pub fn new(api: Arc<GoogleApi>, page_size: u32, missing_name: MissingNamePolicy) -> Self {
        Self {
            api,
            page_size,
            missing_name,
        }
    }
}

#[async_trait::async_trait]
impl SourceAdapter for ContactsTool {
    async fn fetch(&self, date: NaiveDate) -> Result<Vec<String>, BriefError> {
        let url = format!("{}/people/me/connections", self.api.people_api);

        let mut people = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut query = vec![
                ("personFields", "names,birthdays".to_string()),
                ("pageSize", self.page_size.to_string()),
            ];
            if let Some(token) = &page_token {
                query.push(("pageToken", token.clone()));
            }

            let page: ConnectionsPage = self.api.get_json(&url, &query).await?;
            people.extend(page.connections);

            match next_page_token(page_token.as_deref(), page.next_page_token) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        let names = birthdays_on(&people, date, self.missing_name);
        log::info!(
            "ContactsTool: {} birthday(s) on {} among {} contacts",
            names.len(),
            date,
            people.len()
        );
        Ok(names)
    }
}
