//! Metric events.
//!
//! Counters go through the `metrics` facade. Nothing here installs a
//! recorder; a host process that wants them exported installs its own.

pub mod events;

/// Emit an [`InternalEvent`](events::InternalEvent).
///
/// ```ignore
/// use ferry_core::metrics::events::RecordsEmitted;
///
/// emit!(RecordsEmitted { count: 100, table: "orders".to_string() });
/// ```
#[macro_export]
macro_rules! emit {
    ($event:expr) => {
        $crate::metrics::events::InternalEvent::emit($event)
    };
}

pub use emit;
