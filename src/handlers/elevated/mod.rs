// handlers/elevated/mod.rs - SuperAdmin console under /api/admin/*
//
// Guarded by `require_superadmin_middleware`: the token must carry
// `super_admin` and must not be an impersonation token. User validation then
// confirms the flag against the users row.

pub mod audit;
pub mod firms;
pub mod stats;
