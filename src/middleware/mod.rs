pub mod auth;
pub mod firm_context;
pub mod idempotency;
pub mod response;
pub mod soft_delete;
pub mod transaction;
pub mod validate_user;

pub use auth::{jwt_auth_middleware, require_superadmin_middleware};
pub use firm_context::{firm_context_middleware, FirmContext};
pub use idempotency::idempotency_middleware;
pub use response::ApiResponse;
pub use soft_delete::{DeleteMode, DeletedFlags, ListParams};
pub use transaction::{transaction_middleware, Tx};
pub use validate_user::{validate_user_middleware, CurrentUser};
