use serde::Serialize;
use std::fmt;

/// One of the three content groupings a user subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Watchlist,
    Sector,
    Narrative,
}

/// Which of a category's stored fields a value belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ContentSlot {
    /// The field users actually see.
    Exposed,
    Intel,
    Social,
}

/// Raw material a generation task produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ContentSource {
    Intel,
    Social,
}

impl ContentSource {
    pub fn slot(self) -> ContentSlot {
        match self {
            ContentSource::Intel => ContentSlot::Intel,
            ContentSource::Social => ContentSlot::Social,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ContentSource::Intel => "intel",
            ContentSource::Social => "social",
        }
    }
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Watchlist, Category::Sector, Category::Narrative];

    /// Column the exposed content is written to.
    pub fn update_key(self) -> &'static str {
        self.column(ContentSlot::Exposed)
    }

    pub fn label(self) -> &'static str {
        match self {
            Category::Watchlist => "Watchlist",
            Category::Sector => "Sector",
            Category::Narrative => "Narrative",
        }
    }

    pub fn column(self, slot: ContentSlot) -> &'static str {
        match (self, slot) {
            (Category::Watchlist, ContentSlot::Exposed) => "watchlist",
            (Category::Watchlist, ContentSlot::Intel) => "watchlist_intel",
            (Category::Watchlist, ContentSlot::Social) => "watchlist_social",
            (Category::Sector, ContentSlot::Exposed) => "sector",
            (Category::Sector, ContentSlot::Intel) => "sector_intel",
            (Category::Sector, ContentSlot::Social) => "sector_social",
            (Category::Narrative, ContentSlot::Exposed) => "narrative",
            (Category::Narrative, ContentSlot::Intel) => "narrative_intel",
            (Category::Narrative, ContentSlot::Social) => "narrative_social",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.update_key())
    }
}
