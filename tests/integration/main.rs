//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises one subsystem through the
//! public API.  Threaded tests use the real clock with generous jitter
//! bounds; deterministic ones step a `ManualClock`.

mod fixtures;
mod queue_tests;
mod service_tests;
