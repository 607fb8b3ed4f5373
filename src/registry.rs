use chrono::NaiveDate;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::Credential;
use crate::config::{BriefingConfig, GoogleConfig};
use crate::error::BriefError;
use crate::google::GoogleApi;
use crate::tools::{CalendarTool, ContactsTool, GmailTool, SourceAdapter, ToolId, ToolResult};

/// A named capability the decision process may call.
#[derive(Clone)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    source: Arc<dyn SourceAdapter>,
}

impl std::fmt::Debug for ToolDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDescriptor")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// Tools available to one briefing run. Built fresh per run and dropped with it.
#[derive(Debug, Default)]
pub struct ToolRegistry {
    tools: Vec<ToolDescriptor>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The three Google-backed tools, sharing one API client for `credential`.
    pub fn for_session(
        credential: &Credential,
        google: &GoogleConfig,
        briefing: &BriefingConfig,
    ) -> Result<Self, BriefError> {
        let api = Arc::new(GoogleApi::new(credential, google));
        let mut registry = Self::new();
        for id in ToolId::ALL {
            let source: Arc<dyn SourceAdapter> = match id {
                ToolId::Events => Arc::new(CalendarTool::new(api.clone())),
                ToolId::Birthdays => Arc::new(ContactsTool::new(
                    api.clone(),
                    briefing.contacts_page_size,
                    briefing.missing_name,
                )),
                ToolId::Emails => Arc::new(GmailTool::new(api.clone(), briefing.unread_cap())),
            };
            registry.register(id.name(), id.description(), source)?;
        }
        Ok(registry)
    }

    /// Add a tool; names must be unique.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        source: Arc<dyn SourceAdapter>,
    ) -> Result<(), BriefError> {
        let name = name.into();
        if self.get(&name).is_some() {
            return Err(BriefError::Configuration(format!(
                "duplicate tool name: {}",
                name
            )));
        }
        self.tools.push(ToolDescriptor {
            name,
            description: description.into(),
            source,
        });
        Ok(())
    }

    /// Registered tools in registration order.
    pub fn list(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.iter().find(|t| t.name == name)
    }

    /// Call the named tool for `date`, bounded by `timeout`.
    ///
    /// Provider failures, timeouts and unknown names come back as
    /// [`ToolResult::Unavailable`]; only errors that invalidate the whole run
    /// (e.g. an expired credential) are returned as `Err`.
    pub async fn invoke(
        &self,
        name: &str,
        date: NaiveDate,
        timeout: Duration,
    ) -> Result<ToolResult, BriefError> {
        let Some(tool) = self.get(name) else {
            log::warn!("Registry: unknown tool requested: {}", name);
            return Ok(ToolResult::Unavailable(format!("unknown tool '{}'", name)));
        };

        match tokio::time::timeout(timeout, tool.source.fetch(date)).await {
            Ok(Ok(items)) => Ok(ToolResult::Items(items)),
            Ok(Err(e)) if e.is_recoverable() => {
                log::warn!("Registry: {} failed: {}", name, e);
                Ok(ToolResult::Unavailable(e.to_string()))
            }
            Ok(Err(e)) => {
                log::error!("Registry: {} failed fatally: {}", name, e);
                Err(e)
            }
            Err(_) => {
                log::warn!("Registry: {} timed out after {:?}", name, timeout);
                Ok(ToolResult::Unavailable(format!("timed out after {:?}", timeout)))
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// In-memory source returning a fixed answer.
    pub struct StaticSource(pub Result<Vec<String>, fn() -> BriefError>);

    impl StaticSource {
        pub fn items(items: &[&str]) -> Arc<dyn SourceAdapter> {
            Arc::new(Self(Ok(items.iter().map(|s| s.to_string()).collect())))
        }

        pub fn failing(err: fn() -> BriefError) -> Arc<dyn SourceAdapter> {
            Arc::new(Self(Err(err)))
        }
    }

    #[async_trait::async_trait]
    impl SourceAdapter for StaticSource {
        async fn fetch(&self, _date: NaiveDate) -> Result<Vec<String>, BriefError> {
            match &self.0 {
                Ok(items) => Ok(items.clone()),
                Err(make) => Err(make()),
            }
        }
    }

    /// Source that never answers in time.
    pub struct SlowSource;

    #[async_trait::async_trait]
    impl SourceAdapter for SlowSource {
        async fn fetch(&self, _date: NaiveDate) -> Result<Vec<String>, BriefError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(vec![])
        }
    }
}
