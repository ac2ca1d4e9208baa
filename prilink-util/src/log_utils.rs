//! Logging helpers.
//!
//! Both state machines trace their transitions in one format so that a
//! D-channel capture can be read next to the SDL diagrams. All output goes
//! through the `log` facade; with no logger installed the macros cost a
//! branch.

/// Log a state-machine transition at debug level.
///
/// ```ignore
/// log_state_transition!(module_path!(), "sabme", old_state, new_state);
/// ```
#[macro_export]
macro_rules! log_state_transition {
    ($module:expr, $context:expr, $from:expr, $to:expr) => {
        log::debug!(
            "[{}] {}: {:?} -> {:?}",
            $module,
            $context,
            $from,
            $to
        );
    };
}

/// Log an event that a state machine dropped because it is not handled in
/// the current state.
#[macro_export]
macro_rules! log_unexpected_event {
    ($module:expr, $context:expr, $state:expr) => {
        log::warn!(
            "[{}] unexpected {} in state {:?}",
            $module,
            $context,
            $state
        );
    };
}

/// Log a Q.921 MDL-ERROR with its single-letter code from the SDL charts.
#[macro_export]
macro_rules! log_mdl_error {
    ($code:expr, $($arg:tt)*) => {
        log::error!("MDL-ERROR ({}): {}", $code, core::format_args!($($arg)*));
    };
}
