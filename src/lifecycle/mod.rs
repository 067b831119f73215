//! Registry lifecycle
//!
//! ```text
//! 1. Registry creation
//!    ↓
//! 2. Component registration          ← registrators queued
//!    ↓
//! 3. run_registrators()              ← async setup, once
//!    ↓
//! 4. Workers started
//!    ↓
//! [Serving: containers created and reset per request/invocation]
//!    ↓
//! 5. Workers stopped
//! ```
//!
//! Teardown never fails: destroy hooks that error or panic are logged,
//! counted and broadcast as [`TeardownFailure`]s, and the reset carries on.

mod registrator;
mod teardown;

pub use registrator::{Registrator, RegistratorFuture, registrator};
pub use teardown::TeardownFailure;

pub(crate) use registrator::RegistratorQueue;
pub(crate) use teardown::TeardownChannel;
