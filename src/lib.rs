//! Offline-first news synchronization: cached breaking news, paginated
//! search with a durable cursor, and bookmarks, all served from SQLite.

pub mod api;
pub mod config;
pub mod feeds;
pub mod repository;
pub mod resource;
pub mod storage;
pub mod sync;
