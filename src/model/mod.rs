//! Domain types shared by the decision engine, the pipeline and the stores.

mod category;
mod content;
mod user;

pub use category::{Category, ContentSlot, ContentSource};
pub use content::{ContentField, ERROR_PREFIX, NO_CONTENT_MARKER, PLACEHOLDER_TEXT};
pub use user::{
    format_timestamp, parse_timestamp, CategoryContent, Preferences, UserContent, UserRecord,
    UserUpdate,
};
