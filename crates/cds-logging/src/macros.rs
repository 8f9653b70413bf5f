//! ---
//! cds_section: "02-observability"
//! cds_subsection: "module"
//! cds_type: "source"
//! cds_scope: "code"
//! cds_description: "Structured logging macros for lifecycle code."
//! cds_version: "v0.0.0-prealpha"
//! cds_owner: "tbd"
//! ---
#[doc(hidden)]
#[macro_export]
macro_rules! __cds_event {
    ($level:expr, $ctx:expr, $($arg:tt)+) => {{
        let ctx: &$crate::LogContext<'_> = $ctx;
        tracing::event!(
            $level,
            module = ctx.module.unwrap_or(""),
            transition = ctx.transition.unwrap_or(""),
            state = ctx.state.unwrap_or(""),
            cycle = ctx.cycle.unwrap_or_default(),
            message = %format_args!($($arg)+)
        );
    }};
}

/// Emit an informational log carrying the lifecycle context fields.
#[macro_export]
macro_rules! cds_info {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__cds_event!(tracing::Level::INFO, &$ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__cds_event!(tracing::Level::INFO, &$crate::LogContext::default(), $($arg)+)
    };
}

/// Emit a debug log carrying the lifecycle context fields.
#[macro_export]
macro_rules! cds_debug {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__cds_event!(tracing::Level::DEBUG, &$ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__cds_event!(tracing::Level::DEBUG, &$crate::LogContext::default(), $($arg)+)
    };
}

/// Emit an error log carrying the lifecycle context fields.
#[macro_export]
macro_rules! cds_error {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__cds_event!(tracing::Level::ERROR, &$ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__cds_event!(tracing::Level::ERROR, &$crate::LogContext::default(), $($arg)+)
    };
}
