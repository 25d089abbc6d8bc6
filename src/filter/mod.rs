pub mod error;
pub mod filter;
pub mod filter_order;
pub mod filter_where;
pub mod list;
pub mod types;

pub use error::FilterError;
pub use filter::{Filter, LimitPolicy, TableSpec};
pub use list::ListQuery;
pub use types::*;
