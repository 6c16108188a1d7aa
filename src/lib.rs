pub mod api;
pub mod attendance;
pub mod auth;
pub mod config;
pub mod dashboard;
pub mod docs;
pub mod error;
pub mod gateway;
pub mod model;
pub mod report;
pub mod retry;
pub mod roster;
pub mod routes;
pub mod utils;
pub mod view;
