#![cfg(unix)]

mod common;
use crate::common::{expect_failure, init_tracing, with_timeout};

use std::error::Error;
use std::time::{Duration, Instant};

use workerbridge::engine::{Bridge, RunRequest};
use workerbridge::exec::StagedInputs;
use workerbridge::outcome::{FailureKind, Outcome, Payload};
use workerbridge::protocol::{OutputEvent, Progress, ResultShape};
use workerbridge::session::{
    PendingSession, SessionSettings, SessionState, StreamItem, Subscription,
};
use workerbridge::types::PayloadEncoding;
use workerbridge_test_utils::builders::{
    ConfigFileBuilder, WorkerConfigBuilder, sh_worker, sh_worker_with,
};

type TestResult = Result<(), Box<dyn Error>>;

async fn drain(sub: &mut Subscription) -> Vec<StreamItem> {
    let mut seen = Vec::new();
    while let Some(item) = sub.next().await {
        seen.push(item);
    }
    seen
}

fn fast_settings() -> SessionSettings {
    SessionSettings {
        grace_period: Duration::from_millis(300),
        event_buffer: 16,
    }
}

#[tokio::test]
async fn streaming_run_delivers_progress_result_then_outcome() -> TestResult {
    with_timeout(async {
        init_tracing();

        let bridge = Bridge::new(fast_settings());
        let spec = sh_worker(
            "echo PROGRESS:50; echo 'loading model'; echo PROGRESS:90; echo http://x/img.png",
        );
        let mut run = bridge.run_streaming(RunRequest::new(spec)).await?;

        let mut items = Vec::new();
        while let Some(item) = run.events.next().await {
            items.push(item);
        }

        let expected_outcome = Outcome::success(Payload::Text("http://x/img.png".to_string()));
        assert_eq!(
            items,
            vec![
                StreamItem::Event {
                    event: OutputEvent::Progress(Progress::Percent(50))
                },
                StreamItem::Event {
                    event: OutputEvent::Progress(Progress::Percent(90))
                },
                StreamItem::Event {
                    event: OutputEvent::ResultLine("http://x/img.png".to_string())
                },
                StreamItem::Finished {
                    outcome: expected_outcome.clone()
                },
            ]
        );

        assert_eq!(run.session.wait().await, expected_outcome);
        assert_eq!(run.session.state(), SessionState::Completed);
        Ok(())
    })
    .await
}

#[tokio::test]
async fn error_line_and_non_zero_exit_fail_with_diagnostic() -> TestResult {
    with_timeout(async {
        init_tracing();

        let bridge = Bridge::new(fast_settings());
        let spec = sh_worker("echo 'ERROR: disk full' >&2; exit 1");
        let outcome = bridge.run_to_completion(RunRequest::new(spec)).await?;

        let diagnostic = expect_failure(&outcome, FailureKind::NonZeroExit);
        assert!(diagnostic.contains("ERROR: disk full"));
        Ok(())
    })
    .await
}

#[tokio::test]
async fn configured_environment_reaches_the_worker() -> TestResult {
    with_timeout(async {
        init_tracing();

        let cfg = ConfigFileBuilder::new()
            .with_worker(
                "greet",
                WorkerConfigBuilder::new("sh")
                    .arg("-c")
                    .arg(r#"echo "http://host/$STYLE.png""#)
                    .env("STYLE", "casual")
                    .build(),
            )
            .build();
        let spec = cfg
            .worker("greet")?
            .to_spec::<&str, std::path::PathBuf>(&[], &[]);

        let bridge = Bridge::new(cfg.settings);
        let outcome = bridge.run_to_completion(RunRequest::new(spec)).await?;
        assert_eq!(
            outcome,
            Outcome::success(Payload::Text("http://host/casual.png".to_string()))
        );
        Ok(())
    })
    .await
}

#[tokio::test]
async fn last_result_line_wins() -> TestResult {
    with_timeout(async {
        init_tracing();

        let bridge = Bridge::new(fast_settings());
        let spec = sh_worker("echo http://a/1.png; echo http://a/2.png");
        let outcome = bridge.run_to_completion(RunRequest::new(spec)).await?;

        assert_eq!(
            outcome,
            Outcome::success(Payload::Text("http://a/2.png".to_string()))
        );
        Ok(())
    })
    .await
}

#[tokio::test]
async fn clean_exit_without_result_is_no_result() -> TestResult {
    with_timeout(async {
        init_tracing();

        let bridge = Bridge::new(fast_settings());
        let spec = sh_worker("echo PROGRESS:100; echo 'all done'");
        let outcome = bridge.run_to_completion(RunRequest::new(spec)).await?;

        let diagnostic = expect_failure(&outcome, FailureKind::NoResult);
        assert!(diagnostic.contains("all done"));
        Ok(())
    })
    .await
}

#[tokio::test]
async fn non_zero_exit_dominates_printed_result() -> TestResult {
    with_timeout(async {
        init_tracing();

        let bridge = Bridge::new(fast_settings());
        let spec = sh_worker("echo http://a/ok.png; exit 3");
        let outcome = bridge.run_to_completion(RunRequest::new(spec)).await?;

        expect_failure(&outcome, FailureKind::NonZeroExit);
        Ok(())
    })
    .await
}

#[tokio::test]
async fn stderr_and_stdout_are_classified_together() -> TestResult {
    with_timeout(async {
        init_tracing();

        let bridge = Bridge::new(fast_settings());
        let spec = sh_worker("echo PROGRESS:10 >&2; echo http://a/x.png");
        let mut run = bridge.run_streaming(RunRequest::new(spec)).await?;

        let first = run.events.next().await;
        assert_eq!(
            first,
            Some(StreamItem::Event {
                event: OutputEvent::Progress(Progress::Percent(10))
            })
        );
        let outcome = run.events.outcome().await;
        assert!(matches!(outcome, Some(Outcome::Success { .. })));
        Ok(())
    })
    .await
}

#[tokio::test]
async fn timeout_terminates_worker_within_budget() -> TestResult {
    with_timeout(async {
        init_tracing();

        let bridge = Bridge::new(fast_settings());
        let spec = sh_worker("echo PROGRESS:1; sleep 10").with_max_duration(Duration::from_secs(1));

        let started = Instant::now();
        let session = bridge.start(RunRequest::new(spec)).await?;
        let outcome = session.wait().await;

        expect_failure(&outcome, FailureKind::Timeout);
        assert_eq!(session.state(), SessionState::TimedOut);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(1), "timed out early: {elapsed:?}");
        assert!(elapsed < Duration::from_secs(5));
        Ok(())
    })
    .await
}

#[tokio::test]
async fn cancel_stops_worker_and_deletes_staged_inputs() -> TestResult {
    with_timeout(async {
        init_tracing();

        let scratch = tempfile::tempdir()?;
        let mut inputs = StagedInputs::in_dir(scratch.path());
        let staged = inputs.stage_bytes("person_", ".png", b"fake image bytes")?;
        assert!(staged.exists());

        let bridge = Bridge::new(fast_settings());
        let spec = sh_worker("echo PROGRESS:5; sleep 10");
        let mut run = bridge
            .run_streaming(RunRequest::new(spec).with_inputs(inputs))
            .await?;

        // Wait until the worker is demonstrably running.
        let first = run.events.next().await;
        assert!(matches!(first, Some(StreamItem::Event { .. })));

        assert!(run.session.cancel());
        let outcome = run.session.wait().await;

        expect_failure(&outcome, FailureKind::Cancelled);
        assert_eq!(run.session.state(), SessionState::Cancelled);
        assert!(!staged.exists());

        // Cancelling a terminal session is a no-op.
        assert!(!run.session.cancel());
        assert_eq!(run.session.outcome(), Some(outcome));
        Ok(())
    })
    .await
}

#[tokio::test]
async fn stubborn_worker_is_killed_after_grace_period() -> TestResult {
    with_timeout(async {
        init_tracing();

        let bridge = Bridge::new(fast_settings());
        let spec = sh_worker("trap '' TERM; echo PROGRESS:1; while true; do sleep 0.1; done");
        let mut run = bridge.run_streaming(RunRequest::new(spec)).await?;
        run.events.next().await;

        run.session.cancel();
        let outcome = run.session.wait().await;
        expect_failure(&outcome, FailureKind::Cancelled);
        Ok(())
    })
    .await
}

#[tokio::test]
async fn staged_inputs_are_deleted_after_success() -> TestResult {
    with_timeout(async {
        init_tracing();

        let scratch = tempfile::tempdir()?;
        let mut inputs = StagedInputs::in_dir(scratch.path());
        let staged = inputs.stage_bytes("cloth_", ".png", b"abc")?;

        let bridge = Bridge::new(fast_settings());
        let spec = sh_worker_with(
            r#"test -f "$0" && echo "SUCCESS:$0.out""#,
            ResultShape::Prefix("SUCCESS:".to_string()),
            PayloadEncoding::Text,
        )
        .arg(staged.to_string_lossy());
        let outcome = bridge
            .run_to_completion(RunRequest::new(spec).with_inputs(inputs))
            .await?;

        let expected = format!("{}.out", staged.display());
        assert_eq!(outcome, Outcome::success(Payload::Text(expected)));
        assert!(!staged.exists());
        Ok(())
    })
    .await
}

#[tokio::test]
async fn base64_payload_is_decoded_to_bytes() -> TestResult {
    with_timeout(async {
        init_tracing();

        let bridge = Bridge::new(fast_settings());
        let spec = sh_worker_with(
            "echo PROGRESS:50; echo aGVsbG8=",
            ResultShape::LastLine,
            PayloadEncoding::Base64,
        );
        let outcome = bridge.run_to_completion(RunRequest::new(spec)).await?;

        assert_eq!(outcome, Outcome::success(Payload::Bytes(b"hello".to_vec())));
        Ok(())
    })
    .await
}

#[tokio::test]
async fn json_status_error_is_worker_reported() -> TestResult {
    with_timeout(async {
        init_tracing();

        let bridge = Bridge::new(fast_settings());
        let spec = sh_worker_with(
            r#"echo '{"status": "error", "message": "no face detected"}'"#,
            ResultShape::Json,
            PayloadEncoding::Json,
        );
        let outcome = bridge.run_to_completion(RunRequest::new(spec)).await?;

        let diagnostic = expect_failure(&outcome, FailureKind::WorkerReported);
        assert_eq!(diagnostic, "no face detected");
        Ok(())
    })
    .await
}

#[tokio::test]
async fn subscriber_before_start_sees_everything_late_one_sees_outcome() -> TestResult {
    with_timeout(async {
        init_tracing();

        let pending = PendingSession::new(
            sh_worker("echo PROGRESS:1; echo http://a/b.png"),
            fast_settings(),
        );
        assert_eq!(pending.spec().program().to_string_lossy(), "sh");
        let mut early = pending.subscribe();

        let session = pending.start(StagedInputs::none())?;
        let outcome = session.wait().await;
        assert!(outcome.is_success());

        let mut seen = Vec::new();
        while let Some(item) = early.next().await {
            seen.push(item);
        }
        assert_eq!(seen.len(), 3);

        let mut late = session.subscribe();
        assert_eq!(late.next().await, Some(StreamItem::Finished { outcome }));
        assert_eq!(late.next().await, None);
        Ok(())
    })
    .await
}

#[tokio::test]
async fn launch_failure_is_an_error_not_a_session() -> TestResult {
    with_timeout(async {
        init_tracing();

        let scratch = tempfile::tempdir()?;
        let mut inputs = StagedInputs::in_dir(scratch.path());
        let staged = inputs.stage_bytes("in_", ".txt", b"x")?;

        let pending = PendingSession::new(
            workerbridge::exec::WorkerSpec::new("/definitely/not/a/worker"),
            fast_settings(),
        );
        let mut early = pending.subscribe();

        let err = pending.start(inputs).expect_err("launch must fail");
        assert!(matches!(err, workerbridge::errors::BridgeError::Launch { .. }));
        assert!(!staged.exists());
        assert_eq!(early.next().await, None);
        Ok(())
    })
    .await
}

#[tokio::test]
async fn cancel_while_subscriber_is_full_still_delivers_every_event() -> TestResult {
    with_timeout(async {
        init_tracing();

        let settings = SessionSettings {
            grace_period: Duration::from_millis(300),
            event_buffer: 1,
        };
        let pending = PendingSession::new(
            sh_worker("echo PROGRESS:1; echo PROGRESS:2; sleep 10"),
            settings,
        );
        let mut slow = pending.subscribe();
        let mut other = pending.subscribe();
        let session = pending.start(StagedInputs::none())?;

        // Let the driver read both lines; the second one is stuck on `slow`.
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(session.cancel());
        let outcome = session.wait().await;
        expect_failure(&outcome, FailureKind::Cancelled);

        let (slow_seen, other_seen) = tokio::join!(drain(&mut slow), drain(&mut other));
        for seen in [slow_seen, other_seen] {
            assert_eq!(
                seen,
                vec![
                    StreamItem::Event {
                        event: OutputEvent::Progress(Progress::Percent(1))
                    },
                    StreamItem::Event {
                        event: OutputEvent::Progress(Progress::Percent(2))
                    },
                    StreamItem::Finished {
                        outcome: outcome.clone()
                    },
                ]
            );
        }
        Ok(())
    })
    .await
}
