//! SQLite article store with change notification.

mod articles;
mod breaking;
mod live;
mod schema;
mod search;
mod session;
mod types;

pub use live::LiveQuery;
pub use schema::Database;
pub use types::{Article, DatabaseError, NewArticle, Table};
