pub mod calendar;
pub mod contacts;
pub mod gmail;

pub use calendar::CalendarTool;
pub use contacts::ContactsTool;
pub use gmail::GmailTool;

use chrono::NaiveDate;

use crate::error::BriefError;

/// A source of evidence for a briefing: one external provider, normalised to
/// short human-readable lines for a given day.
///
/// Implementations return `Err(BriefError::Provider)` on a downstream
/// failure; the registry turns that into an unavailable [`ToolResult`].
#[async_trait::async_trait]
pub trait SourceAdapter: Send + Sync {
    async fn fetch(&self, date: NaiveDate) -> Result<Vec<String>, BriefError>;
}

/// What one tool invocation produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolResult {
    /// Evidence lines; empty means "nothing found".
    Items(Vec<String>),
    /// The source could not be queried.
    Unavailable(String),
}

impl ToolResult {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, ToolResult::Unavailable(_))
    }

    /// Observation text shown to the decision process.
    pub fn render(&self) -> String {
        match self {
            ToolResult::Items(items) if items.is_empty() => "nothing found".to_string(),
            ToolResult::Items(items) => items
                .iter()
                .map(|item| format!("- {}", item))
                .collect::<Vec<_>>()
                .join("\n"),
            ToolResult::Unavailable(reason) => format!("UNAVAILABLE ({})", reason),
        }
    }
}

/// The page token to request next, or `None` when paging should stop.
///
/// Stops on an absent or empty token and on a token the server already sent,
/// which would otherwise loop forever.
pub(crate) fn next_page_token(current: Option<&str>, next: Option<String>) -> Option<String> {
    let next = next.filter(|token| !token.is_empty())?;
    if current == Some(next.as_str()) {
        log::warn!("Pagination: server repeated page token, stopping");
        return None;
    }
    Some(next)
}

/// The built-in tools, each backed by one Google source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolId {
    Events,
    Birthdays,
    Emails,
}

impl ToolId {
    pub const ALL: [ToolId; 3] = [ToolId::Events, ToolId::Birthdays, ToolId::Emails];

    pub fn name(self) -> &'static str {
        match self {
            ToolId::Events => "get_events",
            ToolId::Birthdays => "get_birthdays",
            ToolId::Emails => "get_emails",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            ToolId::Events => "Fetch today's calendar events (one event title per line)",
            ToolId::Birthdays => "Fetch today's birthdays (one contact name per line)",
            ToolId::Emails => {
                "Fetch unread or important emails from Gmail (up to 10, as 'subject from sender')"
            }
        }
    }

    /// Heading used when evidence from this tool is written out as text.
    pub fn label(self) -> &'static str {
        match self {
            ToolId::Events => "Calendar events",
            ToolId::Birthdays => "Birthdays",
            ToolId::Emails => "Unread emails",
        }
    }

    pub fn from_name(name: &str) -> Option<ToolId> {
        ToolId::ALL.into_iter().find(|id| id.name() == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_names_are_unique() {
        let mut names: Vec<&str> = ToolId::ALL.iter().map(|id| id.name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), ToolId::ALL.len());
    }

    #[test]
    fn test_from_name() {
        assert_eq!(ToolId::from_name("get_events"), Some(ToolId::Events));
        assert_eq!(ToolId::from_name("get_weather"), None);
    }

    #[test]
    fn test_next_page_token_stops_on_empty_or_repeat() {
        assert_eq!(next_page_token(None, Some("p2".into())).as_deref(), Some("p2"));
        assert_eq!(next_page_token(Some("p1"), Some("p2".into())).as_deref(), Some("p2"));
        assert_eq!(next_page_token(Some("p1"), None), None);
        assert_eq!(next_page_token(None, Some(String::new())), None);
        assert_eq!(next_page_token(Some("p2"), Some("p2".into())), None);
    }

    #[test]
    fn test_render() {
        assert_eq!(ToolResult::Items(vec![]).render(), "nothing found");
        assert_eq!(
            ToolResult::Items(vec!["Dentist".into(), "Gym".into()]).render(),
            "- Dentist\n- Gym"
        );
        let unavailable = ToolResult::Unavailable("timeout".into());
        assert!(unavailable.render().starts_with("UNAVAILABLE"));
        assert!(unavailable.is_unavailable());
    }
}
