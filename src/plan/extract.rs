//! Task extraction from free-form plan text.
//!
//! Strategies are tried in `ExtractionStrategy::ORDERED` order and the first
//! one that yields at least one task wins. Results are never merged across
//! strategies.

use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

use super::types::{ExtractionStrategy, StrategyOutcome, TaskRecord};

/// Paragraphs at or below this trimmed length are dropped by the fallback.
const MIN_PARAGRAPH_CHARS: usize = 10;

static TASK_HEADER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?im)^[ \t]*(?:#{1,6}[ \t]*)?(?:\*\*|__)?[ \t]*task[ \t]+\d+(?:\.\d+)*[ \t]*(?:\*\*|__)?[ \t]*[:.)\-–][ \t]*(.*)$",
    )
    .unwrap()
});

static LIST_ITEM_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^(?:\d+[.)]|[-*+])[ \t]+(\S.*)$").unwrap());

static MILESTONE_HEADER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?im)^[ \t]*(?:#{1,6}[ \t]*)?(?:\*\*|__)?[ \t]*((?:milestone|phase)[ \t]+\d+\b.*)$",
    )
    .unwrap()
});

static MARKDOWN_HEADER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*#{1,6}[ \t]").unwrap());

static ASSIGNEE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:assigned[ \t]+to|assignee|responsible)\**[ \t]*[:\-][ \t]*\**[ \t]*([^\n]+)")
        .unwrap()
});

/// A matched region of the plan: where it starts and ends, and its title.
struct Span {
    start: usize,
    end: usize,
    title: String,
}

/// Turns plan text into an ordered list of task records.
#[derive(Debug, Default, Clone, Copy)]
pub struct TaskExtractor;

impl TaskExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract tasks, returning an empty list only when nothing in the text
    /// qualifies as a task (callers must check for that explicitly).
    pub fn extract(&self, plan_text: &str) -> Vec<TaskRecord> {
        self.extract_with_strategy(plan_text)
            .map(|(_, tasks)| tasks)
            .unwrap_or_default()
    }

    /// Like `extract`, but also reports which strategy produced the tasks.
    pub fn extract_with_strategy(
        &self,
        plan_text: &str,
    ) -> Option<(ExtractionStrategy, Vec<TaskRecord>)> {
        for strategy in ExtractionStrategy::ORDERED {
            match apply_strategy(strategy, plan_text) {
                StrategyOutcome::Matched(tasks) => {
                    debug!(strategy = %strategy, count = tasks.len(), "plan strategy matched");
                    return Some((strategy, tasks));
                }
                StrategyOutcome::NoMatch => {
                    debug!(strategy = %strategy, "plan strategy found no tasks");
                }
            }
        }
        None
    }
}

/// Run one strategy in isolation.
pub fn apply_strategy(strategy: ExtractionStrategy, text: &str) -> StrategyOutcome {
    let tasks = match strategy {
        ExtractionStrategy::TaskHeaders => spans_to_tasks(text, header_spans(text, &TASK_HEADER_REGEX, &[])),
        ExtractionStrategy::ListItems => spans_to_tasks(
            text,
            header_spans(text, &LIST_ITEM_REGEX, &[&MARKDOWN_HEADER_REGEX]),
        ),
        ExtractionStrategy::MilestoneHeaders => {
            spans_to_tasks(text, header_spans(text, &MILESTONE_HEADER_REGEX, &[]))
        }
        ExtractionStrategy::Paragraphs => paragraph_tasks(text),
    };

    if tasks.is_empty() {
        StrategyOutcome::NoMatch
    } else {
        StrategyOutcome::Matched(tasks)
    }
}

/// Locate every line matching `start`; each span runs until the next start
/// or the next line matching one of `stops`, whichever comes first.
fn header_spans(text: &str, start: &Regex, stops: &[&Regex]) -> Vec<Span> {
    let starts: Vec<(usize, String)> = start
        .captures_iter(text)
        .filter_map(|cap| {
            let whole = cap.get(0)?;
            let title = cap.get(1).map(|m| m.as_str()).unwrap_or_default();
            Some((whole.start(), title.to_string()))
        })
        .collect();

    let mut boundaries: Vec<usize> = starts.iter().map(|(pos, _)| *pos).collect();
    for stop in stops {
        boundaries.extend(stop.find_iter(text).map(|m| line_start(text, m.start())));
    }
    boundaries.sort_unstable();
    boundaries.dedup();

    starts
        .into_iter()
        .map(|(pos, title)| {
            let end = boundaries
                .iter()
                .copied()
                .find(|b| *b > pos)
                .unwrap_or(text.len());
            Span {
                start: pos,
                end,
                title,
            }
        })
        .collect()
}

fn line_start(text: &str, pos: usize) -> usize {
    text[..pos].rfind('\n').map(|i| i + 1).unwrap_or(0)
}

fn spans_to_tasks(text: &str, spans: Vec<Span>) -> Vec<TaskRecord> {
    spans
        .into_iter()
        .enumerate()
        .map(|(idx, span)| {
            let body = &text[span.start..span.end];
            let description = body
                .split_once('\n')
                .map(|(_, rest)| rest.trim())
                .unwrap_or_default();
            let mut title = clean_title(&span.title);
            if title.is_empty() {
                title = description
                    .lines()
                    .map(clean_title)
                    .find(|l| !l.is_empty())
                    .unwrap_or_else(|| format!("Task {}", idx + 1));
            }
            let task = TaskRecord::new(title, description);
            match find_assignee(body) {
                Some(assignee) => task.with_assignee(assignee),
                None => task,
            }
        })
        .collect()
}

/// Fallback: split on blank-line runs and markdown headers.
fn paragraph_tasks(text: &str) -> Vec<TaskRecord> {
    let mut segments: Vec<Vec<&str>> = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in text.lines() {
        let is_blank = line.trim().is_empty();
        let is_header = MARKDOWN_HEADER_REGEX.is_match(line);
        if (is_blank || is_header) && !current.is_empty() {
            segments.push(std::mem::take(&mut current));
        }
        if !is_blank {
            current.push(line);
        }
    }
    if !current.is_empty() {
        segments.push(current);
    }

    segments
        .into_iter()
        .map(|lines| lines.join("\n"))
        .filter(|segment| segment.trim().chars().count() > MIN_PARAGRAPH_CHARS)
        .map(|segment| {
            let segment = segment.trim();
            let (first, rest) = segment.split_once('\n').unwrap_or((segment, ""));
            TaskRecord::new(clean_title(first), rest.trim())
        })
        .collect()
}

/// Search a span for an `Assigned to:` / `Assignee:` / `Responsible:` cue.
pub fn find_assignee(span: &str) -> Option<String> {
    let cap = ASSIGNEE_REGEX.captures(span)?;
    let value = cap
        .get(1)?
        .as_str()
        .trim_start_matches(|c: char| c == '*' || c == '_' || c.is_whitespace())
        .trim_end_matches(|c: char| matches!(c, '*' | '_' | '.' | ',' | ';') || c.is_whitespace());
    (!value.is_empty()).then(|| value.to_string())
}

fn clean_title(raw: &str) -> String {
    raw.replace("**", "")
        .replace("__", "")
        .trim()
        .trim_start_matches('#')
        .trim()
        .to_string()
}
