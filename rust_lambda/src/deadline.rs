use lambda_runtime::Context;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Time left before the platform kills the invocation.
pub trait Deadline {
    fn remaining(&self) -> Duration;
}

#[derive(Debug, Clone, Copy)]
pub struct InvocationDeadline {
    at: SystemTime,
}

impl InvocationDeadline {
    pub fn new(at: SystemTime) -> Self {
        Self { at }
    }

    /// `Context::deadline` is in milliseconds since the epoch.
    pub fn from_context(context: &Context) -> Self {
        Self::new(UNIX_EPOCH + Duration::from_millis(context.deadline))
    }
}

impl Deadline for InvocationDeadline {
    fn remaining(&self) -> Duration {
        self.at
            .duration_since(SystemTime::now())
            .unwrap_or(Duration::ZERO)
    }
}
