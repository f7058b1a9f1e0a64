//! Diagnostic output for the consistency checker (§4.7).
//!
//! The checker is the only part of this allocator that is allowed to produce human-readable
//! output, and only on request. Rather than writing to a global sink the way this codebase's
//! kernel-side `println!`/`eprintln!` macros write to the shared framebuffer, the checker takes
//! an explicit `core::fmt::Write` sink — there is no display device to own in a library that may
//! be linked into a hosted test binary, a bootloader stage, or a kernel alike.

/// Writes a line to a `core::fmt::Write` sink, formatted like [`core::format_args`].
///
/// Mirrors this codebase's `println!` in shape, but takes the sink as its first argument instead
/// of writing through a crate-wide global.
#[macro_export]
macro_rules! chk_println {
    ($sink:expr) => {{
        let _ = core::fmt::Write::write_str($sink, "\n");
    }};
    ($sink:expr, $($arg:tt)*) => {{
        let _ = core::fmt::Write::write_fmt($sink, format_args!($($arg)*));
        let _ = core::fmt::Write::write_str($sink, "\n");
    }};
}

/// Like [`chk_println`], prefixed with `warn: `, used when a check fails.
#[macro_export]
macro_rules! chk_warn {
    ($sink:expr, $($arg:tt)*) => {{
        let _ = core::fmt::Write::write_str($sink, "warn: ");
        let _ = core::fmt::Write::write_fmt($sink, format_args!($($arg)*));
        let _ = core::fmt::Write::write_str($sink, "\n");
    }};
}

/// A sink that discards everything written to it.
///
/// Used when a caller wants to run `check` purely for its `Result` and has no diagnostic
/// surface to write to (e.g. an invariant assertion in a test).
pub struct NullSink;

impl core::fmt::Write for NullSink {
    fn write_str(&mut self, _s: &str) -> core::fmt::Result {
        Ok(())
    }
}
