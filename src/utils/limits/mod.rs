// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Helpers for cooperative execution time limits and cancellation.

mod error;
mod time;

pub use error::LimitError;
pub use time::{monotonic_now, ExecutionTimer, ExecutionTimerConfig};
