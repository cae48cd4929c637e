pub mod clock;
pub mod coordinator;
pub mod failure;
pub mod options;
pub mod review;
pub mod state;

pub use clock::{Clock, ManualClock, SystemClock};
pub use coordinator::{
    AgentOutcome, AgentStatus, AutoExecutionCoordinator, CoordinatorConfig, DEFAULT_MAX_CONCURRENT,
    DEFAULT_TIMEOUT_MS, MAX_REVIEW_ROUNDS,
};
pub use options::{ApprovalStatus, ExecutionOptions, ReviewFlag, ValidationOptions};
pub use review::InspectionResult;
pub use state::{ExecutionRecord, ExecutionStatus, StateStore};
