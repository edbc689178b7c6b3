//! crates/logging/src/tracing_macros.rs
//! Convenience macros for offload-specific tracing.
//!
//! These macros wrap the standard tracing macros with a fixed target per
//! subsystem. Callers must depend on `tracing` directly.

/// Emit a Huffman table construction trace.
///
/// # Example
/// ```ignore
/// trace_huffman!(symbols = 30, max_len = 15, "built distance codes");
/// ```
#[macro_export]
macro_rules! trace_huffman {
    ($($arg:tt)*) => {
        ::tracing::trace!(target: "offload::huffman", $($arg)*);
    };
}

/// Emit a descriptor submission trace.
///
/// # Example
/// ```ignore
/// trace_submit!(queue = 1, "descriptor accepted");
/// ```
#[macro_export]
macro_rules! trace_submit {
    ($($arg:tt)*) => {
        ::tracing::debug!(target: "offload::submit", $($arg)*);
    };
}

/// Emit an AECS slot trace.
///
/// # Example
/// ```ignore
/// trace_aecs!(read = 0, "toggled compress slots");
/// ```
#[macro_export]
macro_rules! trace_aecs {
    ($($arg:tt)*) => {
        ::tracing::trace!(target: "offload::aecs", $($arg)*);
    };
}

/// Emit a fallback trace (stored blocks or hardware to software).
///
/// # Example
/// ```ignore
/// trace_fallback!(bytes = 4096, "emitting stored blocks");
/// ```
#[macro_export]
macro_rules! trace_fallback {
    ($($arg:tt)*) => {
        ::tracing::info!(target: "offload::fallback", $($arg)*);
    };
}

/// Emit a verification trace.
///
/// # Example
/// ```ignore
/// trace_verify!(crc = 0x1234, "verification passed");
/// ```
#[macro_export]
macro_rules! trace_verify {
    ($($arg:tt)*) => {
        ::tracing::debug!(target: "offload::verify", $($arg)*);
    };
}

/// Emit a job lifecycle trace.
///
/// # Example
/// ```ignore
/// trace_job!(step = ?step, "chunk completed");
/// ```
#[macro_export]
macro_rules! trace_job {
    ($($arg:tt)*) => {
        ::tracing::debug!(target: "offload::job", $($arg)*);
    };
}

#[cfg(test)]
mod tests {
    #[test]
    fn macros_expand_without_subscriber() {
        trace_huffman!(symbols = 3, "huffman");
        trace_submit!(queue = 0, "submit");
        trace_aecs!(index = 1, "aecs");
        trace_fallback!("fallback");
        trace_verify!(ok = true, "verify");
        trace_job!("job");
    }
}
