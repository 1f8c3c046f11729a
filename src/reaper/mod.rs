//! Reaper Module
//!
//! Background removal of expired sessions.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐   start-up + per tick   ┌───────────────────┐
//! │  ElectionGuard  │ ──────────────────────> │   Reaper timer    │
//! └─────────────────┘      is_eligible()      │ (Background Task) │
//!                                             └─────────┬─────────┘
//!                                                       │ sweep()
//!                                                       ▼
//!                                     index_range_query + delete per id
//! ```
//!
//! ## Modules
//!
//! - `election`: [`ElectionGuard`] and the stock guards
//! - `sweep`: [`Reaper`], [`SweepWindow`] and the timer task

pub mod election;
pub mod sweep;

// Re-export commonly used types
pub use election::{Always, ElectionGuard, EnvRole, Never, StaticRole};
pub use sweep::{
    ReapError, ReapStats, Reaper, ReaperHandle, ReaperState, SweepWindow, DEFAULT_CONCURRENCY,
};
