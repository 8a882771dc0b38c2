// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use core::time::Duration;

use thiserror::Error;

/// Reasons an evaluation was interrupted before completing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LimitError {
    #[error("execution exceeded time limit (elapsed={}ns, limit={}ns)", .elapsed.as_nanos(), .limit.as_nanos())]
    TimeLimitExceeded { elapsed: Duration, limit: Duration },
    /// The host raised the cancellation flag.
    #[error("evaluation cancelled")]
    Cancelled,
}
