//! Adapters: concrete implementations of the port traits.
//!
//! | Adapter | Implements | Connects to                          |
//! |---------|------------|--------------------------------------|
//! | `time`  | Clock      | std monotonic/wall clock, or a manual |
//! |         |            | clock stepped by tests and the sim   |

pub mod time;
