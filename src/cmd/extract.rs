//! Offline plan parsing for `issueforge extract`.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;

use issueforge::plan::{
    AlignmentMode, ExtractionStrategy, PromptAligner, TaskExtractor, TaskRecord,
};

const WRAP_WIDTH: usize = 88;

#[derive(Serialize)]
struct ExtractedTask<'a> {
    #[serde(flatten)]
    task: &'a TaskRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    prompt: Option<&'a str>,
}

#[derive(Serialize)]
struct ExtractReport<'a> {
    strategy: Option<ExtractionStrategy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    alignment: Option<AlignmentMode>,
    task_count: usize,
    tasks: Vec<ExtractedTask<'a>>,
}

pub fn cmd_extract(plan_file: &Path, prompts_file: Option<&Path>, json: bool) -> Result<()> {
    let plan = std::fs::read_to_string(plan_file)
        .with_context(|| format!("Failed to read plan file: {}", plan_file.display()))?;
    let prompts = prompts_file
        .map(|p| {
            std::fs::read_to_string(p)
                .with_context(|| format!("Failed to read prompts file: {}", p.display()))
        })
        .transpose()?;

    let (strategy, tasks) = match TaskExtractor::new().extract_with_strategy(&plan) {
        Some((strategy, tasks)) => (Some(strategy), tasks),
        None => (None, Vec::new()),
    };
    let assignment = prompts
        .as_deref()
        .map(|text| PromptAligner::new().align(text, &tasks));

    let report = ExtractReport {
        strategy,
        alignment: assignment.as_ref().map(|a| a.mode),
        task_count: tasks.len(),
        tasks: tasks
            .iter()
            .map(|task| ExtractedTask {
                task,
                prompt: assignment.as_ref().and_then(|a| a.get(&task.title)),
            })
            .collect(),
    };

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialize tasks")?
        );
    } else {
        print_report(&report);
    }
    Ok(())
}

fn print_report(report: &ExtractReport<'_>) {
    println!();
    let Some(strategy) = report.strategy else {
        println!(
            "{}",
            console::style("No tasks found in the plan.").yellow()
        );
        println!();
        return;
    };

    println!(
        "{} {} (strategy: {})",
        console::style(report.task_count).bold().cyan(),
        if report.task_count == 1 { "task" } else { "tasks" },
        strategy
    );
    if let Some(mode) = report.alignment {
        let label = match mode {
            AlignmentMode::Positional => "prompts aligned by position",
            AlignmentMode::WholeText => "too few prompt sections; full prompt text attached to every task",
        };
        println!("{}", console::style(label).dim());
    }
    println!();

    let wrap = textwrap::Options::new(WRAP_WIDTH)
        .initial_indent("    ")
        .subsequent_indent("    ");

    for (i, entry) in report.tasks.iter().enumerate() {
        let task = entry.task;
        println!(
            "{:>2}. {}  {}",
            i + 1,
            console::style(&task.title).bold(),
            if task.is_assigned() {
                console::style(format!("[{}]", task.assignee)).green()
            } else {
                console::style(format!("[{}]", task.assignee)).dim()
            }
        );
        if !task.description.is_empty() {
            println!("{}", textwrap::fill(&task.description, &wrap));
        }
        if let Some(prompt) = entry.prompt {
            println!("    {}", console::style("Prompt:").cyan());
            println!("{}", textwrap::fill(prompt, &wrap));
        }
        println!();
    }
}
