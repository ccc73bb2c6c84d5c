pub mod client;
pub mod types;

pub use client::{LogService, LogServiceClient, RequestError};
pub use types::{Event, EventPage, SearchResult, Tag, TagResult};
