pub mod changes;
pub mod manager;
pub mod models;
pub mod query_builder;
pub mod repository;

pub use changes::Changeset;
pub use manager::{Database, DatabaseError};
pub use query_builder::{Page, QueryBuilder};
pub use repository::{Repository, Resource};
