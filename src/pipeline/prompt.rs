//! Text sent to the agents.

use crate::model::{Category, ContentSource};

const DIGEST_TITLE: &str = "Degen Times - Daily Digest";

fn source_focus(source: ContentSource) -> &'static str {
    match source {
        ContentSource::Intel => "the latest news and on-chain intel",
        ContentSource::Social => "what crypto Twitter is saying",
    }
}

pub fn item_prompt(category: Category, source: ContentSource, item: &str) -> String {
    format!(
        "Give me {} for {} ({} preference). Keep it factual and concise.",
        source_focus(source),
        item,
        category.label().to_lowercase()
    )
}

pub fn category_prompt(category: Category, source: ContentSource, items: &[String]) -> String {
    format!(
        "Give me {} for each of the following {} preferences: {}. Keep it factual and concise.",
        source_focus(source),
        category.label().to_lowercase(),
        items.join(", ")
    )
}

/// Instruction for the messaging agent to deliver one category's content.
pub fn digest_message(recipient: &str, category: Category, content: &str) -> String {
    format!(
        "this is the {} news for today {{{}}} form a concise message from this and send it to user id {{{}}} , title it as {} - {}",
        category.label(),
        content.trim(),
        recipient,
        DIGEST_TITLE,
        category.label()
    )
}
