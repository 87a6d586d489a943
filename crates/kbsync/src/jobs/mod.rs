//! Job tracking: the store, its single writer, and the flows that feed it.

pub mod duplicate;
pub mod file;
pub mod poll_scheduler;
pub mod reconciler;
pub mod record;
pub mod store;
pub mod upload;

pub use duplicate::{
    Decision, DecisionHandle, DuplicateConflict, DuplicateResolution, DuplicateResolver,
    FixedResolver, PendingDecision, PromptResolver, ResolutionState,
};
pub use file::{UploadConstraints, UploadFile};
pub use poll_scheduler::PollScheduler;
pub use reconciler::{promote, reconcile, Reconciler};
pub use record::{JobRecord, JobStatus, OPTIMISTIC_SEED_PROGRESS};
pub use store::{JobCounts, JobSnapshot, JobStore};
pub use upload::{UploadOrchestrator, UploadOutcome};
