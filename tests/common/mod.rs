#![allow(dead_code)]

pub use workerbridge_test_utils::builders;
pub use workerbridge_test_utils::{init_tracing, with_timeout};

use workerbridge::outcome::{FailureKind, Outcome};

/// The diagnostic of a failed outcome; panics on success.
pub fn expect_failure(outcome: &Outcome, kind: FailureKind) -> String {
    match outcome {
        Outcome::Failure { kind: k, diagnostic } if *k == kind => diagnostic.clone(),
        other => panic!("expected {kind} failure, got {other:?}"),
    }
}
