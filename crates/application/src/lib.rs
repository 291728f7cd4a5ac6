//! Application layer of the charter dispatch service.
//!
//! [`DispatchService`] is the transactional facade transport adapters call;
//! [`CommitmentReaper`] is the optional background loop that errors out
//! contracts whose workers went silent.

pub mod reaper;
pub mod service;

pub use reaper::{CommitmentReaper, ReaperConfig};
pub use service::DispatchService;
