//! Context window management: token estimation, budgets, pruning,
//! compaction, and project-context files.
//!
//! The context window is the scarcest resource in the agent loop. This
//! module provides layered strategies for keeping usage under control:
//!
//! 1. **[`estimator`]** — a cheap chars-per-token heuristic over messages,
//!    tool calls, tool results, and images. Pluggable via the
//!    [`TokenEstimator`] trait.
//! 2. **[`budget`]** — effective-limit math, session token/cost
//!    accounting, and warn/compact threshold checks.
//! 3. **[`pruner`]** — replaces stale tool-result bodies with a fixed
//!    placeholder, preserving identity. No LLM call needed.
//! 4. **[`compactor`]** — replaces the oldest conversation prefix with an
//!    LLM-generated summary, preserving a recent suffix verbatim.
//! 5. **[`project_files`]** — discovers project-context documents
//!    (`POTUS.md` and friends) walking upward from the working directory.
//!
//! [`Manager`] combines all of the above into the single policy surface
//! the agent calls once per iteration.

pub mod budget;
pub mod compactor;
pub mod estimator;
pub mod events;
pub mod manager;
pub mod project_files;
pub mod pruner;

// Re-export commonly used items at the module level.
pub use budget::{Budget, BudgetConfig, BudgetSnapshot};
pub use compactor::{CompactResult, Compactor, CompactorConfig};
pub use estimator::{estimate_system_prompt, SimpleEstimator, TokenEstimator, TokenInfo};
pub use events::{ContextEvent, ContextEventKind};
pub use manager::{ContextAction, Manager, ManagerConfig};
pub use project_files::{ContextFile, ProjectContext, ProjectFiles, ProjectFilesConfig};
pub use pruner::{PruneResult, Pruner, PrunerConfig};
