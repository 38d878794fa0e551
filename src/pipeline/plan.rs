//! Turns a user's preferences into the list of generation tasks.

use super::prompt;
use crate::clients::ChannelRef;
use crate::model::{Category, ContentSource, Preferences};
use std::fmt;
use std::str::FromStr;

/// How finely a category is split into generation requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Granularity {
    /// One request per preference item.
    #[default]
    PerItem,
    /// One request covering the whole item list.
    PerCategory,
}

impl FromStr for Granularity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "per-item" | "item" => Ok(Granularity::PerItem),
            "per-category" | "category" => Ok(Granularity::PerCategory),
            other => Err(format!(
                "Unknown granularity '{}', expected per-item or per-category",
                other
            )),
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Granularity::PerItem => f.write_str("per-item"),
            Granularity::PerCategory => f.write_str("per-category"),
        }
    }
}

/// Generation channels serving one category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryChannels {
    pub intel: ChannelRef,
    pub social: Option<ChannelRef>,
}

impl CategoryChannels {
    pub fn intel_only(intel: ChannelRef) -> Self {
        Self {
            intel,
            social: None,
        }
    }

    pub fn channel(&self, source: ContentSource) -> Option<&ChannelRef> {
        match source {
            ContentSource::Intel => Some(&self.intel),
            ContentSource::Social => self.social.as_ref(),
        }
    }

    /// Sources this category dispatches to, intel first.
    pub fn sources(&self) -> Vec<ContentSource> {
        let mut sources = vec![ContentSource::Intel];
        if self.social.is_some() {
            sources.push(ContentSource::Social);
        }
        sources
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelMap {
    pub watchlist: CategoryChannels,
    pub sector: CategoryChannels,
    pub narrative: CategoryChannels,
}

impl ChannelMap {
    pub fn get(&self, category: Category) -> &CategoryChannels {
        match category {
            Category::Watchlist => &self.watchlist,
            Category::Sector => &self.sector,
            Category::Narrative => &self.narrative,
        }
    }
}

/// One submit/settle/collect round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationTask {
    pub category: Category,
    pub source: ContentSource,
    /// `None` in per-category mode.
    pub item: Option<String>,
    pub channel: ChannelRef,
    pub prompt: String,
}

impl GenerationTask {
    /// Human-readable subject, used in logs and error blocks.
    pub fn subject(&self) -> &str {
        self.item.as_deref().unwrap_or(self.category.label())
    }
}

/// What a pipeline run will dispatch, split by whether a category has items.
#[derive(Debug, Clone, Default)]
pub struct GenerationPlan {
    pub tasks: Vec<GenerationTask>,
    /// Categories with items, in category order.
    pub active: Vec<Category>,
    /// Categories with no items; they resolve to the placeholder.
    pub empty: Vec<Category>,
}

impl GenerationPlan {
    pub fn build(
        preferences: &Preferences,
        channels: &ChannelMap,
        granularity: Granularity,
    ) -> Self {
        let mut plan = GenerationPlan::default();

        for category in Category::ALL {
            let items = preferences.items(category);
            if items.is_empty() {
                plan.empty.push(category);
                continue;
            }
            plan.active.push(category);

            let category_channels = channels.get(category);
            for source in category_channels.sources() {
                let Some(channel) = category_channels.channel(source) else {
                    continue;
                };
                match granularity {
                    Granularity::PerItem => {
                        for item in items {
                            plan.tasks.push(GenerationTask {
                                category,
                                source,
                                item: Some(item.clone()),
                                channel: channel.clone(),
                                prompt: prompt::item_prompt(category, source, item),
                            });
                        }
                    }
                    Granularity::PerCategory => {
                        plan.tasks.push(GenerationTask {
                            category,
                            source,
                            item: None,
                            channel: channel.clone(),
                            prompt: prompt::category_prompt(category, source, items),
                        });
                    }
                }
            }
        }

        plan
    }

    pub fn has_social(&self, category: Category) -> bool {
        self.tasks
            .iter()
            .any(|t| t.category == category && t.source == ContentSource::Social)
    }
}
