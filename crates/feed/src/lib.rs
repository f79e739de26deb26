//! Feed formatting for the serving layer.
//!
//! - [`ReadResultAdapter`] turns a completed read into a [`FeedOutput`]
//! - [`FeedCache`] decides between `NotModified` and re-rendering
//! - [`EmbedLevel`] controls how much of each event an entry carries

pub mod adapter;
pub mod cache;
pub mod document;
pub mod embed;
pub mod error;

pub use adapter::{FeedUrls, PageCursor, ReadResultAdapter, parse_direction};
pub use cache::{CacheControl, CacheDecision, FeedCache, Validator};
pub use document::{EmptyReason, FeedDocument, FeedEntry, FeedOutput, Link, Relation};
pub use embed::EmbedLevel;
pub use error::{FeedError, Result};
