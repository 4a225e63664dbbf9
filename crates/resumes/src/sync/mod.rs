//! Sync orchestration
//!
//! A run resolves its window, reconciles it with the download log, walks the
//! matching threads and persists state exactly once at the end.

mod prompt;
mod run;
mod timing;
mod window;

pub use prompt::{Prompt, ScriptedPrompt, StdinPrompt, is_yes};
pub use run::{AbortReason, RunOptions, RunOutcome, RunReport, SyncContext, run_sync};
pub use timing::PolitenessDelay;
pub use window::resolve_window;
