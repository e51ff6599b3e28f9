//! REST API endpoint modules.

pub mod auth;
pub mod change_requests;
pub mod extract;
pub mod status;
