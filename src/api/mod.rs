//! Remote news source.

mod client;
mod types;

pub use client::{NewsApi, HEADLINES_PAGE_SIZE};
pub use types::{ApiError, ArticleDto};
