//! Diagnostic CLI wrapper (§1 "test driver" / "command-line wrapper" collaborators, §4.7).
//!
//! Drives a hosted [`segfit::mem::provider::VecHeapProvider`]-backed allocator through a small
//! scripted trace and runs every `check` mode after each step, printing the allocator's own
//! diagnostic output plus a pass/fail summary. Stands in for the external test driver named in
//! the specification's scope section, reduced to a minimal concrete binary so this crate builds
//! and is exercisable end-to-end on its own.

use std::process::ExitCode;

use argh::FromArgs;
use segfit::mem::check::{self, Mode};
use segfit::mem::heap::Allocator;
use segfit::mem::provider::VecHeapProvider;

#[derive(FromArgs)]
#[argh(description = "drive the segfit allocator through a scripted trace and check invariants")]
struct Args {
    /// byte capacity handed to the hosted heap provider
    #[argh(option, short = 'c', default = "1 << 20", description = "heap provider byte capacity")]
    capacity: usize,

    /// print every check's diagnostic output, not just failures
    #[argh(switch, short = 'v', description = "print every check's diagnostic output")]
    verbose: bool,
}

struct StdoutSink;

impl core::fmt::Write for StdoutSink {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        print!("{s}");
        Ok(())
    }
}

/// A discard sink used when `--verbose` is not passed, so only failures print.
struct CapturingSink {
    buf: String,
}

impl core::fmt::Write for CapturingSink {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        self.buf.push_str(s);
        Ok(())
    }
}

fn run_all_checks(allocator: &Allocator<VecHeapProvider>, verbose: bool, label: &str) -> bool {
    let mut ok = true;
    for raw in 0..=8u8 {
        let mode = Mode::from_u8(raw);
        let mut sink = CapturingSink { buf: String::new() };
        match check::check(allocator, mode, &mut sink) {
            Ok(()) => {
                if verbose {
                    print!("{}", sink.buf);
                }
            }
            Err(e) => {
                ok = false;
                eprintln!("[{label}] check mode {raw} FAILED: {e}");
                print!("{}", sink.buf);
            }
        }
    }
    ok
}

fn main() -> ExitCode {
    let args: Args = argh::from_env();

    let provider = VecHeapProvider::with_capacity(args.capacity);
    let mut allocator = match Allocator::new(provider) {
        Ok(a) => a,
        Err(e) => {
            eprintln!("init failed: {e}");
            return ExitCode::FAILURE;
        }
    };

    println!("segfit heapcheck: capacity={} bytes", args.capacity);
    let mut all_ok = run_all_checks(&allocator, args.verbose, "init");

    // A small scripted trace exercising split, free, coalesce, first-fit-across-classes and
    // both reallocate paths, mirroring the concrete scenarios in §8.
    let a = allocator.allocate(32);
    let b = allocator.allocate(32);
    all_ok &= run_all_checks(&allocator, args.verbose, "after a,b = allocate(32), allocate(32)");

    allocator.free(a);
    allocator.free(b);
    all_ok &= run_all_checks(&allocator, args.verbose, "after free(a), free(b)");

    let first = allocator.allocate(48);
    let middle = allocator.allocate(200);
    let last = allocator.allocate(48);
    allocator.free(middle);
    all_ok &= run_all_checks(&allocator, args.verbose, "after freeing the middle block");

    let fit = allocator.allocate(180);
    all_ok &= run_all_checks(&allocator, args.verbose, "after first-fit allocate(180)");

    let grown = allocator.reallocate(first, 40);
    all_ok &= run_all_checks(&allocator, args.verbose, "after reallocate-grow(first, 40)");

    let moved = allocator.reallocate(grown, 512);
    all_ok &= run_all_checks(&allocator, args.verbose, "after reallocate-grow-by-copy(..., 512)");

    allocator.free(moved);
    allocator.free(last);
    allocator.free(fit);
    all_ok &= run_all_checks(&allocator, args.verbose, "after final free pass");

    let mut sink = StdoutSink;
    check::check(&allocator, Mode::ForwardWalk, &mut sink).ok();

    if all_ok {
        println!("all checks passed");
        ExitCode::SUCCESS
    } else {
        println!("one or more checks FAILED");
        ExitCode::FAILURE
    }
}
