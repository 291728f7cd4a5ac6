//! HTTP interface of the charter dispatch service.

pub mod error;
pub mod rest;

pub use rest::{router, AppState};
