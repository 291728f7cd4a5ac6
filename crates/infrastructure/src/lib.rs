//! Storage implementations for the charter dispatch service.
//!
//! [`persistence::postgres::PostgresDispatchStore`] is the production store;
//! [`persistence::memory::InMemoryDispatchStore`] backs tests.

pub mod persistence;

pub use persistence::memory::InMemoryDispatchStore;
pub use persistence::postgres::PostgresDispatchStore;
pub use persistence::DatabaseConfig;
