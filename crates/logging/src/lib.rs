#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `logging` centralises how the offload workspace emits diagnostics. All
//! crates instrument with the standard [`tracing`] macros; this crate fixes
//! the *targets* those events use and maps a coarse [`Verbosity`] onto a
//! `tracing-subscriber` filter.
//!
//! # Design
//!
//! - [`Verbosity`] is a five-step scale. [`Verbosity::directive`] renders it
//!   as an `EnvFilter` directive scoped to the `offload` target prefix.
//! - [`init_tracing`] installs a formatting subscriber. `RUST_LOG` wins over
//!   the verbosity when it is set.
//! - The `trace_*!` macros in [`tracing_macros`] pin each subsystem to one
//!   target so filters such as `offload::submit=trace` work predictably.
//!
//! # Invariants
//!
//! - Library crates never install a subscriber themselves.
//! - Installing twice returns [`InitError`] instead of panicking.
//!
//! # Examples
//!
//! ```
//! use logging::Verbosity;
//!
//! assert_eq!(Verbosity::from_verbose_level(0), Verbosity::Normal);
//! assert_eq!(Verbosity::Debug.directive(), "offload=debug");
//! ```

mod config;
mod tracing_bridge;
pub mod tracing_macros;

pub use config::{TARGET_PREFIX, Verbosity};
pub use tracing_bridge::{InitError, init_tracing, init_tracing_with_filter};
