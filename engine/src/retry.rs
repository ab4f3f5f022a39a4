//! Retry-and-report loop around fallible filesystem operations.

use std::io;
use std::path::Path;

use tracing::{debug, warn};

use crate::decision::{DecisionProvider, ErrorContext, ErrorDecision, OperationKind};

/// Result of running an operation under the retry policy.
#[derive(Debug)]
pub enum Attempt<T> {
    /// The operation eventually succeeded
    Done(T),
    /// The provider chose to skip; carries the last error
    Skipped(io::Error),
    /// The provider chose to cancel, or the job was stopped meanwhile
    Cancelled(io::Error),
}

/// Runs operations and asks the decision provider whenever one fails.
///
/// Retry re-runs the identical operation immediately, with no attempt limit.
pub struct RetryPolicy<'a> {
    decisions: &'a dyn DecisionProvider,
    title: &'a str,
    stopped: &'a dyn Fn() -> bool,
}

impl<'a> RetryPolicy<'a> {
    pub fn new(
        decisions: &'a dyn DecisionProvider,
        title: &'a str,
        stopped: &'a dyn Fn() -> bool,
    ) -> Self {
        RetryPolicy {
            decisions,
            title,
            stopped,
        }
    }

    pub fn run<T, F>(&self, operation: OperationKind, path: &Path, mut op: F) -> Attempt<T>
    where
        F: FnMut() -> io::Result<T>,
    {
        let mut attempt = 1u32;
        loop {
            let err = match op() {
                Ok(value) => return Attempt::Done(value),
                Err(err) => err,
            };

            // A stopped job unwinds without bothering anyone.
            if (self.stopped)() {
                return Attempt::Cancelled(err);
            }

            match self.report(operation, path, &err) {
                ErrorDecision::Retry => {
                    attempt += 1;
                    debug!(%operation, path = %path.display(), attempt, "retrying");
                }
                ErrorDecision::Skip => return Attempt::Skipped(err),
                ErrorDecision::Cancel => return Attempt::Cancelled(err),
            }
        }
    }

    /// Show one failure to the provider and return its decision.
    pub fn report(&self, operation: OperationKind, path: &Path, err: &io::Error) -> ErrorDecision {
        warn!(%operation, path = %path.display(), error = %err, "operation failed");
        let context = ErrorContext {
            title: self.title.to_string(),
            operation,
            path: path.to_path_buf(),
            message: err.to_string(),
        };
        self.decisions.ask_retry_skip_cancel(&context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::{FixedDecisions, ScriptedDecisions};
    use std::cell::Cell;

    fn never() -> bool {
        false
    }

    #[test]
    fn test_success_does_not_ask() {
        let decisions = ScriptedDecisions::new();
        let policy = RetryPolicy::new(&decisions, "Copy error", &never);
        let result = policy.run(OperationKind::CopyBytes, Path::new("a"), || Ok(5));
        assert!(matches!(result, Attempt::Done(5)));
        assert!(decisions.asked_errors().is_empty());
    }

    #[test]
    fn test_retry_until_success() {
        let decisions = ScriptedDecisions::new()
            .push_error(ErrorDecision::Retry)
            .push_error(ErrorDecision::Retry);
        let policy = RetryPolicy::new(&decisions, "Copy error", &never);
        let calls = Cell::new(0);

        let result = policy.run(OperationKind::ListDirectory, Path::new("dir"), || {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err(io::Error::other("flaky"))
            } else {
                Ok(())
            }
        });

        assert!(matches!(result, Attempt::Done(())));
        assert_eq!(calls.get(), 3);
        let asked = decisions.asked_errors();
        assert_eq!(asked.len(), 2);
        assert_eq!(asked[0].operation, OperationKind::ListDirectory);
        assert_eq!(asked[0].title, "Copy error");
    }

    #[test]
    fn test_skip_and_cancel() {
        let policy_skip = FixedDecisions::skip_all();
        let policy = RetryPolicy::new(&policy_skip, "t", &never);
        let result: Attempt<()> =
            policy.run(OperationKind::CreateDirectory, Path::new("d"), || Err(io::Error::other("x")));
        assert!(matches!(result, Attempt::Skipped(_)));

        let cancel = FixedDecisions {
            on_error: ErrorDecision::Cancel,
            on_collision: None,
        };
        let policy = RetryPolicy::new(&cancel, "t", &never);
        let result: Attempt<()> =
            policy.run(OperationKind::CreateDirectory, Path::new("d"), || Err(io::Error::other("x")));
        assert!(matches!(result, Attempt::Cancelled(_)));
    }

    #[test]
    fn test_stopped_job_is_not_prompted() {
        let decisions = ScriptedDecisions::new();
        let stopped = || true;
        let policy = RetryPolicy::new(&decisions, "t", &stopped);
        let result: Attempt<()> =
            policy.run(OperationKind::CopyBytes, Path::new("f"), || Err(io::Error::other("x")));
        assert!(matches!(result, Attempt::Cancelled(_)));
        assert!(decisions.asked_errors().is_empty());
    }
}
