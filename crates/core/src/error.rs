use thiserror::Error;

use crate::state::StateId;

/// A broken contract between the executor and the scheduler.
///
/// These are bugs, not conditions: bookkeeping is already corrupt by the
/// time one is detected, so they are raised through [`invariant_violation`]
/// which aborts instead of returning.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invariant violation in {component} (state {state}): {detail}")]
pub struct InvariantViolation {
    pub component: &'static str,
    pub state: String,
    pub detail: String,
}

impl InvariantViolation {
    pub fn new(component: &'static str, state: Option<StateId>, detail: impl Into<String>) -> Self {
        Self {
            component,
            state: state.map_or_else(|| "-".to_string(), |s| s.to_string()),
            detail: detail.into(),
        }
    }
}

/// Log the violation and abort the current execution.
#[track_caller]
pub fn invariant_violation(
    component: &'static str,
    state: Option<StateId>,
    detail: impl Into<String>,
) -> ! {
    let violation = InvariantViolation::new(component, state, detail);
    tracing::error!(
        component = violation.component,
        state = %violation.state,
        "{}",
        violation.detail
    );
    panic!("{violation}");
}
