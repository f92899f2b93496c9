//! Positional alignment of a prompt document to extracted tasks.

use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::LazyLock;
use tracing::debug;

use super::types::TaskRecord;

static NUMBERED_MARKER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^[ \t]*(?:#{1,6}[ \t]*)?(?:\*\*|__)?[ \t]*(?:task|prompt)[ \t]+\d+\b").unwrap()
});

static HEADER_MARKER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*#{1,6}[ \t]+\S").unwrap());

/// How fragments were distributed over tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlignmentMode {
    /// Fragment `i` went to task `i`.
    Positional,
    /// Too few fragments; every task received the whole prompt text.
    WholeText,
}

/// Title-keyed prompt fragments for one pipeline run.
///
/// Keyed by task title, so a later task with a duplicate title replaces the
/// fragment of an earlier one.
#[derive(Debug, Clone, Serialize)]
pub struct PromptAssignment {
    pub mode: AlignmentMode,
    by_title: HashMap<String, String>,
}

impl PromptAssignment {
    pub fn empty() -> Self {
        Self {
            mode: AlignmentMode::WholeText,
            by_title: HashMap::new(),
        }
    }

    pub fn get(&self, title: &str) -> Option<&str> {
        self.by_title.get(title).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_title.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_title.is_empty()
    }

    pub fn as_map(&self) -> &HashMap<String, String> {
        &self.by_title
    }
}

/// Maps each task to a best-effort slice of the prompt document.
#[derive(Debug, Default, Clone, Copy)]
pub struct PromptAligner;

impl PromptAligner {
    pub fn new() -> Self {
        Self
    }

    pub fn align(&self, prompt_text: &str, tasks: &[TaskRecord]) -> PromptAssignment {
        let fragments = split_fragments(prompt_text);
        let mut by_title = HashMap::with_capacity(tasks.len());

        let mode = if !tasks.is_empty() && fragments.len() >= tasks.len() {
            for (task, fragment) in tasks.iter().zip(fragments.iter()) {
                by_title.insert(task.title.clone(), fragment.clone());
            }
            AlignmentMode::Positional
        } else {
            for task in tasks {
                by_title.insert(task.title.clone(), prompt_text.to_string());
            }
            AlignmentMode::WholeText
        };

        debug!(
            fragments = fragments.len(),
            tasks = tasks.len(),
            mode = ?mode,
            "aligned prompts to tasks"
        );
        PromptAssignment { mode, by_title }
    }
}

/// Split a prompt document into ordered fragments.
///
/// `Task N` / `Prompt N` markers take precedence; markdown headers are only
/// used as split points when no numbered marker exists. Text before the first
/// marker is dropped.
pub fn split_fragments(prompt_text: &str) -> Vec<String> {
    let starts: Vec<usize> = if NUMBERED_MARKER_REGEX.is_match(prompt_text) {
        NUMBERED_MARKER_REGEX
            .find_iter(prompt_text)
            .map(|m| m.start())
            .collect()
    } else {
        HEADER_MARKER_REGEX
            .find_iter(prompt_text)
            .map(|m| m.start())
            .collect()
    };

    starts
        .iter()
        .enumerate()
        .map(|(i, start)| {
            let end = starts.get(i + 1).copied().unwrap_or(prompt_text.len());
            prompt_text[*start..end].trim().to_string()
        })
        .filter(|fragment| !fragment.is_empty())
        .collect()
}
