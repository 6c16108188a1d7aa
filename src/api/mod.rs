pub mod attendance;
pub mod auth;
pub mod dashboard;
pub mod students;
