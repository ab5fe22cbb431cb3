//! Task value type and the ordered priority scale.

use std::collections::HashSet;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Task priority on an ordered scale.
///
/// Lower index = higher urgency, so priority distance can be computed from
/// the discriminant. `"critical"` parses as `Urgent` for compatibility with
/// older rule definitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    /// Drop-everything urgency
    Urgent,
    High,
    #[default]
    Medium,
    Low,
}

impl TaskPriority {
    /// Index on the ordered scale (0 = most urgent).
    pub fn index(&self) -> usize {
        match self {
            TaskPriority::Urgent => 0,
            TaskPriority::High => 1,
            TaskPriority::Medium => 2,
            TaskPriority::Low => 3,
        }
    }

    /// All priorities, most urgent first.
    pub fn all() -> [TaskPriority; 4] {
        [
            TaskPriority::Urgent,
            TaskPriority::High,
            TaskPriority::Medium,
            TaskPriority::Low,
        ]
    }
}

impl FromStr for TaskPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "urgent" | "critical" => Ok(TaskPriority::Urgent),
            "high" => Ok(TaskPriority::High),
            "medium" => Ok(TaskPriority::Medium),
            "low" => Ok(TaskPriority::Low),
            _ => Err(format!("Unknown task priority: {}", s)),
        }
    }
}

impl std::fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskPriority::Urgent => write!(f, "urgent"),
            TaskPriority::High => write!(f, "high"),
            TaskPriority::Medium => write!(f, "medium"),
            TaskPriority::Low => write!(f, "low"),
        }
    }
}

/// A unit of work moving through the destination hierarchy.
///
/// Tasks are created by external collaborators; the delegation protocol is
/// the only component in this crate that mutates one (custody transfer via
/// `instance_id`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier
    pub id: String,
    /// Short human-readable title
    pub title: String,
    /// Longer free-form description
    pub description: String,
    /// Classification tags
    pub tags: HashSet<String>,
    /// Priority on the ordered scale
    pub priority: TaskPriority,
    /// Id of the instance that currently owns the task, if assigned
    pub instance_id: Option<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Task {
    /// Create a new unassigned task.
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
        tags: impl IntoIterator<Item = String>,
        priority: TaskPriority,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: description.into(),
            tags: tags.into_iter().collect(),
            priority,
            instance_id: None,
            created_at: Utc::now(),
        }
    }

    /// Title and description joined for text matching.
    pub fn matchable_text(&self) -> String {
        format!("{} {}", self.title, self.description)
    }
}
