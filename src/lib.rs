//! PowerTrack Reports: ingest the activity stream, categorize reports, reply to authors.

pub mod channels;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod store;
pub mod stream;
