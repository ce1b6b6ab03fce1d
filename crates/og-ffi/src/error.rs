use std::cell::RefCell;
use std::ffi::CString;

use og_graph::GraphError;

use crate::types::OgStatus;

thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

/// Store an error message for later retrieval via `og_last_error`.
pub fn set_last_error(msg: String) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

/// Take the last error message, leaving `None` in its place.
pub fn take_last_error() -> Option<CString> {
    LAST_ERROR.with(|e| e.borrow_mut().take())
}

/// Record the error message and pick the status code for a graph failure.
pub fn graph_error_status(err: &GraphError) -> OgStatus {
    set_last_error(err.to_string());
    match err {
        GraphError::Topology(_) => OgStatus::ErrorTopology,
        GraphError::NodeSetup { .. }
        | GraphError::StaleWorkspaceSize { .. }
        | GraphError::BindingCount { .. }
        | GraphError::SetupRequired => OgStatus::ErrorSetup,
        GraphError::NodeExecutionFailed { .. }
        | GraphError::UnboundSlot { .. }
        | GraphError::Device(_) => OgStatus::ErrorExecute,
        GraphError::AllocationFailure { .. } => OgStatus::ErrorOutOfMemory,
        GraphError::Tensor(_) => OgStatus::ErrorInvalidArgument,
    }
}
