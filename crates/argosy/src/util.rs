//! Small internal helpers.

use std::panic::{AssertUnwindSafe, catch_unwind};

/// Runs user code with panic containment.
///
/// Returns the closure's value, or a description of the panic payload. No
/// core lock may be held by the caller.
pub(crate) fn contain<R>(f: impl FnOnce() -> R) -> Result<R, String> {
	match catch_unwind(AssertUnwindSafe(f)) {
		Ok(value) => Ok(value),
		Err(payload) => Err(panic_message(payload.as_ref())),
	}
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
	if let Some(s) = payload.downcast_ref::<&str>() {
		(*s).to_owned()
	} else if let Some(s) = payload.downcast_ref::<String>() {
		s.clone()
	} else {
		"panic with non-string payload".to_owned()
	}
}
