use std::fmt::Write;

use comfy_table::Cell;

use crate::verdict::Verdict;

use super::styling::{bright, bright_green, bright_red, cyan, dim};
use super::tables::{create_table, flag_cell, header, status_cell};

/// Prints a human-readable report of a verdict to stderr, keeping stdout
/// free for the JSON verdict.
///
/// Sections are only rendered when the verdict carries data for them:
/// - Overview: provider, check, target, result and message
/// - Pipeline: the pipeline or PipelineRun the check waited for
/// - Tasks: what ran and whether it was scheduled
/// - Mismatches: every discrepancy found by verification
pub fn print_summary(verdict: &Verdict) {
    eprintln!("{}", render_summary(verdict));
}

fn add_section_header(output: &mut String, emoji: &str, title: &str) {
    let _ = writeln!(output, "{} {}", bright(emoji), bright(title).underlined());
}

fn short_sha(sha: &str) -> &str {
    sha.get(..8).unwrap_or(sha)
}

fn render_summary(verdict: &Verdict) -> String {
    let mut output = String::new();

    add_section_header(&mut output, "📋", "Overview");
    let result = if verdict.passed {
        bright_green("PASSED")
    } else {
        bright_red("FAILED")
    };
    let _ = writeln!(
        output,
        "  {} {}\n  {} {}\n  {} {}\n  {} {}\n  {} {}\n",
        dim("Provider:"),
        cyan(&verdict.provider),
        dim("Check:"),
        cyan(&verdict.check),
        dim("Target:"),
        cyan(&verdict.target),
        dim("Result:"),
        result,
        dim("Details:"),
        verdict.message
    );

    if let Some(pipeline) = &verdict.pipeline {
        add_section_header(&mut output, "🚀", "Pipeline");
        let mut table = create_table();
        table.set_header(header(&["ID", "Ref", "SHA", "Status", "URL"]));
        table.add_row(vec![
            Cell::new(pipeline.id),
            Cell::new(&pipeline.ref_),
            Cell::new(short_sha(&pipeline.sha)),
            status_cell(pipeline.status),
            Cell::new(pipeline.web_url.as_deref().unwrap_or("-")),
        ]);
        let _ = writeln!(output, "{table}\n");
    }

    if let Some(run) = &verdict.pipeline_run {
        add_section_header(&mut output, "🚀", "PipelineRun");
        let mut table = create_table();
        table.set_header(header(&["Name", "Namespace", "Status"]));
        table.add_row(vec![
            Cell::new(&run.name),
            Cell::new(&run.namespace),
            status_cell(run.status),
        ]);
        let _ = writeln!(output, "{table}\n");
    }

    if !verdict.tasks.is_empty() {
        add_section_header(&mut output, "🧩", "Tasks");
        let mut table = create_table();
        table.set_header(header(&["Run", "Task", "Scheduled"]));
        for task in &verdict.tasks {
            table.add_row(vec![
                Cell::new(&task.name),
                Cell::new(task.task.as_deref().unwrap_or("-")),
                flag_cell(task.scheduled),
            ]);
        }
        let _ = writeln!(output, "{table}\n");
    }

    if !verdict.mismatches.is_empty() {
        add_section_header(&mut output, "❌", "Mismatches");
        let mut table = create_table();
        table.set_header(header(&["#", "Problem"]));
        for (index, mismatch) in verdict.mismatches.iter().enumerate() {
            table.add_row(vec![Cell::new(index + 1), Cell::new(mismatch)]);
        }
        let _ = writeln!(output, "{table}\n");
    }

    output
}
