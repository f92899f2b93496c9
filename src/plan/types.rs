use serde::{Deserialize, Serialize};

/// Assignee recorded when a task carries no assignment cue.
pub const UNASSIGNED: &str = "Unassigned";

fn default_assignee() -> String {
    UNASSIGNED.to_string()
}

/// One unit of work recovered from a plan document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_assignee")]
    pub assignee: String,
}

impl TaskRecord {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            assignee: default_assignee(),
        }
    }

    pub fn with_assignee(mut self, assignee: impl Into<String>) -> Self {
        self.assignee = assignee.into();
        self
    }

    pub fn is_assigned(&self) -> bool {
        self.assignee != UNASSIGNED
    }
}

/// Which plan-authoring convention produced a task set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStrategy {
    /// `Task N: title` headers.
    TaskHeaders,
    /// Top-level numbered or bulleted list items.
    ListItems,
    /// `Milestone N:` / `Phase N:` headers.
    MilestoneHeaders,
    /// Blank-line or markdown-header separated paragraphs.
    Paragraphs,
}

impl ExtractionStrategy {
    /// Strategies in the order they are tried.
    pub const ORDERED: [ExtractionStrategy; 4] = [
        ExtractionStrategy::TaskHeaders,
        ExtractionStrategy::ListItems,
        ExtractionStrategy::MilestoneHeaders,
        ExtractionStrategy::Paragraphs,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TaskHeaders => "task_headers",
            Self::ListItems => "list_items",
            Self::MilestoneHeaders => "milestone_headers",
            Self::Paragraphs => "paragraphs",
        }
    }
}

impl std::fmt::Display for ExtractionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of running a single strategy over a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrategyOutcome {
    Matched(Vec<TaskRecord>),
    NoMatch,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_task_is_unassigned() {
        let task = TaskRecord::new("Set up CI", "");
        assert_eq!(task.assignee, UNASSIGNED);
        assert!(!task.is_assigned());
    }

    #[test]
    fn deserialize_fills_default_assignee() {
        let task: TaskRecord = serde_json::from_str(r#"{"title": "Write docs"}"#).unwrap();
        assert_eq!(task.assignee, "Unassigned");
        assert_eq!(task.description, "");
    }

    #[test]
    fn strategy_order_ends_with_paragraph_fallback() {
        assert_eq!(
            ExtractionStrategy::ORDERED.last(),
            Some(&ExtractionStrategy::Paragraphs)
        );
        assert_eq!(ExtractionStrategy::ORDERED[0], ExtractionStrategy::TaskHeaders);
    }
}
