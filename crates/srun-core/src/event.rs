//! Lifecycle events
//!
//! Every supervised login attempt produces a small, closed set of events:
//! a `ProcessBegin`, one terminal `ActionSuccess`/`ActionFailure` for the
//! login, optional DNS update results, and a `ProcessFinish`. All events of
//! one attempt share the same `context` string.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// What happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    ProcessBegin,
    ProcessFinish,
    ActionSuccess,
    ActionFailure,
}

/// Which action the event belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Login,
    DnsUpdate,
}

/// Name/value pair attached to an event
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Property {
    pub name: String,
    pub value: String,
}

impl Property {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// A lifecycle event delivered to the webhook sink
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub kind: EventKind,
    pub category: Category,
    /// Correlates every event of one login attempt
    pub context: String,
    pub properties: Vec<Property>,
    /// Success value or failure reason
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    fn new(
        kind: EventKind,
        category: Category,
        context: impl Into<String>,
        properties: Vec<Property>,
        message: Option<String>,
    ) -> Self {
        Self {
            kind,
            category,
            context: context.into(),
            properties,
            message,
            timestamp: Utc::now(),
        }
    }

    /// Start of a login process
    pub fn process_begin(context: impl Into<String>) -> Self {
        Self::new(EventKind::ProcessBegin, Category::Login, context, Vec::new(), None)
    }

    /// End of a login process, emitted regardless of outcome
    pub fn process_finish(context: impl Into<String>) -> Self {
        Self::new(EventKind::ProcessFinish, Category::Login, context, Vec::new(), None)
    }

    /// An action completed
    pub fn success(
        category: Category,
        context: impl Into<String>,
        properties: Vec<Property>,
        value: impl Into<String>,
    ) -> Self {
        Self::new(
            EventKind::ActionSuccess,
            category,
            context,
            properties,
            Some(value.into()),
        )
    }

    /// An action failed
    pub fn failure(
        category: Category,
        context: impl Into<String>,
        properties: Vec<Property>,
        reason: impl Into<String>,
    ) -> Self {
        Self::new(
            EventKind::ActionFailure,
            category,
            context,
            properties,
            Some(reason.into()),
        )
    }

    /// Look up a property value by name
    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.value.as_str())
    }
}
