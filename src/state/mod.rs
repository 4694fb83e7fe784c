//! Resumable task state.
//!
//! [`TaskState`] is everything the wait operator needs to resume after the
//! process is gone: one [`PhaseProgress`] per phase key, holding the
//! polling waiter's progress, the retry executor's per-key progress and,
//! once the phase is satisfied, its memoised result.
//!
//! [`StateStore`] is a file-backed store hosts can use to keep that state
//! between invocations.

pub mod progress;
pub mod store;

pub use progress::{PhaseProgress, RetryProgress, TaskState, WaitProgress};
pub use store::StateStore;
