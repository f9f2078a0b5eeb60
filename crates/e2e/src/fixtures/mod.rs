//! Setup and teardown around scenarios
//!
//! Run scope ([`SharedScope`]) owns the browser, the test data and the
//! container book. Class scope ([`ClassScope`]) carries what the scenarios
//! of one class share. Test scope is a stack of [`Finalizer`]s that run
//! after the test whatever its outcome.

pub mod finalizer;
pub mod shared;
pub mod tool_state;

pub use finalizer::{
    Finalizer, Finalizers, Outcome, ReconcileSessions, ScreenshotOnFailure, VideoOnFailure,
};
pub use shared::{BrowserFactory, ClassScope, SharedResources, SharedScope};
pub use tool_state::{
    ApprovalConfirmation, FinalizeToolState, StateConfirmation, ToolAdmin, ToolStateManager,
    WebToolAdmin,
};
