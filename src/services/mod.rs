pub mod case_service;
pub mod firm_service;
pub mod user_service;
pub mod validation;
