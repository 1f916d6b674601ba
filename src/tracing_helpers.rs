//! Feature-gated instrumentation for index events.
//!
//! Two event classes are emitted when the crate is built with the
//! `tracing` feature:
//!
//! - `trace_log!` - one event per committed delta publish (insert,
//!   update, delete-key, delete-pair) and per query, keyed by PID.
//! - `debug_log!` - structural changes only: root bootstrap and growth,
//!   leaf and inner splits, separator installs, consolidations.
//!
//! Without the feature the `tracing` crate is not even linked: the
//! macro body is stripped by `cfg` before name resolution, so every
//! call site compiles to nothing and the argument expressions are never
//! evaluated.
//!
//! ```bash
//! # Watch a split cascade propagate
//! RUST_LOG=bwtree::tree::split=debug cargo test --features tracing split_cascade
//!
//! # Per-operation firehose
//! RUST_LOG=bwtree=trace cargo test --features tracing
//! ```

/// Per-operation event (delta publishes, queries). No-op without the
/// `tracing` feature.
macro_rules! trace_log {
    ($($arg:tt)*) => {{
        #[cfg(feature = "tracing")]
        tracing::trace!($($arg)*);
    }};
}

/// Structural-change event (bootstrap, splits, separators,
/// consolidations). No-op without the `tracing` feature.
macro_rules! debug_log {
    ($($arg:tt)*) => {{
        #[cfg(feature = "tracing")]
        tracing::debug!($($arg)*);
    }};
}

pub(crate) use {debug_log, trace_log};
