// handlers/public/mod.rs - unauthenticated endpoints

pub mod health;
pub mod login;

pub use health::{health, root};
pub use login::login;
