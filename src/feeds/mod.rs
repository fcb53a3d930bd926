//! Feed controllers: the state holders a presentation layer binds to.

mod bookmarks;
mod breaking;
mod search;

pub use bookmarks::BookmarksFeed;
pub use breaking::BreakingNewsFeed;
pub use search::{SearchFeed, CURRENT_QUERY_KEY};
