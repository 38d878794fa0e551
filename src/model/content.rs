//! Tagged content values.
//!
//! Storage keeps the legacy marker strings so existing rows and the
//! front-end keep working; everything inside the worker uses
//! [`ContentField`] and only [`ContentField::to_storage`] /
//! [`ContentField::from_storage`] know about the markers.

/// Stored text meaning "no preferences set for this category".
pub const PLACEHOLDER_TEXT: &str = "Please Select A Preference To View Personalized News Here";

/// Prefix of every stored error marker.
pub const ERROR_PREFIX: &str = "Error fetching";

/// Rendered in place of an item whose channel produced no agent message.
pub const NO_CONTENT_MARKER: &str = "No content found for this item yet.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentField {
    Placeholder,
    Error(String),
    Content(String),
}

impl ContentField {
    pub fn error(reason: impl Into<String>) -> Self {
        ContentField::Error(reason.into())
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, ContentField::Placeholder)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ContentField::Error(_))
    }

    /// Substantive text, if any.
    pub fn text(&self) -> Option<&str> {
        match self {
            ContentField::Content(text) if !text.trim().is_empty() => Some(text),
            _ => None,
        }
    }

    pub fn to_storage(&self) -> String {
        match self {
            ContentField::Placeholder => PLACEHOLDER_TEXT.to_string(),
            ContentField::Error(reason) => format!("{} {}", ERROR_PREFIX, reason),
            ContentField::Content(text) => text.clone(),
        }
    }

    /// Decodes a stored column. Missing or blank columns decode to `None`.
    pub fn from_storage(raw: Option<&str>) -> Option<Self> {
        let raw = raw?;
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        if trimmed == PLACEHOLDER_TEXT {
            return Some(ContentField::Placeholder);
        }
        if let Some(reason) = trimmed.strip_prefix(ERROR_PREFIX) {
            let reason = reason.trim_start_matches(':').trim();
            return Some(ContentField::Error(reason.to_string()));
        }
        Some(ContentField::Content(raw.to_string()))
    }
}
