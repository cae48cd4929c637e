//! Event stream shared by the UI bridge, remote broadcaster and audit sink.

pub mod bridge;
pub mod bus;
pub mod types;

pub use bridge::{BroadcastBridge, ChannelSubscriber};
pub use bus::{EventBus, EventLog, EventSubscriber, SubscriptionId};
pub use types::{ExecutionEvent, FileChangeKind, PhaseContext, WorkflowError};
