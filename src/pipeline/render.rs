//! Per-category aggregation of generation outcomes.

use super::plan::GenerationTask;
use crate::model::{ContentField, ERROR_PREFIX, NO_CONTENT_MARKER};

/// Separates item blocks inside a category field.
pub const ITEM_DIVIDER: &str = "\n\n---\n\n";

/// Result of one generation task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// The agent replied with text.
    Text(String),
    /// The channel answered but held no agent reply.
    NoContent,
    Failed(String),
}

impl TaskOutcome {
    /// Whether the collaborator calls went through, with or without a reply.
    pub fn succeeded(&self) -> bool {
        !matches!(self, TaskOutcome::Failed(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            TaskOutcome::Text(_) => "success",
            TaskOutcome::NoContent => "empty",
            TaskOutcome::Failed(_) => "failed",
        }
    }
}

fn render_block(task: &GenerationTask, outcome: &TaskOutcome) -> String {
    let body = match outcome {
        TaskOutcome::Text(text) => text.trim().to_string(),
        TaskOutcome::NoContent => NO_CONTENT_MARKER.to_string(),
        TaskOutcome::Failed(reason) => {
            format!("{} {}: {}", ERROR_PREFIX, task.subject(), reason)
        }
    };
    match &task.item {
        Some(item) => format!("### {}\n\n{}", item, body),
        None => body,
    }
}

/// Folds the outcomes of one category/source pair into a content field.
///
/// Blocks keep task order. When every task failed the field is an error
/// sentinel instead of a run of error blocks.
pub fn aggregate(results: &[(&GenerationTask, &TaskOutcome)]) -> Option<ContentField> {
    let (first, _) = results.first()?;

    if results.iter().all(|(_, outcome)| !outcome.succeeded()) {
        return Some(ContentField::error(format!(
            "{} {}: all items failed",
            first.category.update_key(),
            first.source.as_str()
        )));
    }

    let blocks: Vec<String> = results
        .iter()
        .map(|(task, outcome)| render_block(task, outcome))
        .collect();
    Some(ContentField::Content(blocks.join(ITEM_DIVIDER)))
}
