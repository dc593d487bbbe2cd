//! Behavioural properties of `Retrier::run` across configurations.

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tryagain::{
    config, ActionError, CancelError, CancelToken, Constant, Retrier, RetryError,
    RetryErrorKind,
};

fn fail(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::Other, msg.to_string())
}

struct Counters {
    calls: AtomicUsize,
    errors: Arc<AtomicUsize>,
}

impl Counters {
    fn new() -> Self {
        Counters {
            calls: AtomicUsize::new(0),
            errors: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn retrier(&self, max_attempts: u32) -> Retrier {
        let seen = Arc::clone(&self.errors);
        Retrier::builder()
            .max_attempts(max_attempts)
            .backoff(Constant::none())
            .on_error(move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
            })
            .build()
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn errors(&self) -> usize {
        self.errors.load(Ordering::SeqCst)
    }
}

#[test]
fn never_failing_action_runs_once_for_any_budget() {
    for max in 1..=6 {
        let c = Counters::new();
        let out = c.retrier(max).run(&CancelToken::never(), || {
            c.calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, ActionError<io::Error>>(())
        });
        assert!(out.is_ok());
        assert_eq!(c.calls(), 1, "max_attempts = {max}");
        assert_eq!(c.errors(), 0);
    }
}

#[test]
fn always_retriable_failure_uses_whole_budget() {
    for max in 1..=6u32 {
        let c = Counters::new();
        let out: Result<(), _> = c.retrier(max).run(&CancelToken::never(), || {
            c.calls.fetch_add(1, Ordering::SeqCst);
            Err(ActionError::retriable(fail("flaky")))
        });
        match out.unwrap_err() {
            RetryError::Exhausted { attempts, last } => {
                assert_eq!(attempts, max);
                assert_eq!(last.unwrap().to_string(), "flaky");
            }
            other => panic!("expected Exhausted, got {other:?}"),
        }
        assert_eq!(c.calls(), max as usize);
        assert_eq!(c.errors(), max as usize);
    }
}

#[test]
fn permanent_failure_stops_for_any_budget() {
    for max in 1..=4 {
        let c = Counters::new();
        let out: Result<(), _> = c.retrier(max).run(&CancelToken::never(), || {
            c.calls.fetch_add(1, Ordering::SeqCst);
            Err(ActionError::permanent(fail("bad input")))
        });
        assert_eq!(out.unwrap_err().kind(), RetryErrorKind::NotRetriable);
        assert_eq!(c.calls(), 1);
        assert_eq!(c.errors(), 1);
    }
}

#[test]
fn cancelled_by_action_with_default_retrier() {
    let errors = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&errors);
    // Default backoff: the second attempt would wait 10ms before noticing.
    let retrier = Retrier::builder()
        .on_error(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        })
        .build();
    let token = CancelToken::new();
    let calls = AtomicUsize::new(0);
    let out: Result<(), _> = retrier.run(&token, || {
        calls.fetch_add(1, Ordering::SeqCst);
        token.cancel();
        Err(ActionError::retriable(fail("something went wrong")))
    });
    match out.unwrap_err() {
        RetryError::Cancelled { cause, .. } => {
            assert_eq!(cause, Some(CancelError::Canceled { reason: None }))
        }
        other => panic!("expected Cancelled, got {other:?}"),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(errors.load(Ordering::SeqCst), 1);
}

#[test]
fn expired_deadline_cancels_before_first_attempt() {
    let c = Counters::new();
    let token = CancelToken::with_timeout(Duration::ZERO);
    let out: Result<(), _> = c.retrier(3).run(&token, || {
        c.calls.fetch_add(1, Ordering::SeqCst);
        Err(ActionError::retriable(fail("unreachable")))
    });
    match out.unwrap_err() {
        RetryError::Cancelled { cause, last } => {
            assert_eq!(cause, Some(CancelError::DeadlineExceeded));
            assert!(last.is_none());
        }
        other => panic!("expected Cancelled, got {other:?}"),
    }
    assert_eq!(c.calls(), 0);
}

#[test]
fn parent_cancellation_reaches_child_token() {
    let c = Counters::new();
    let parent = CancelToken::new();
    let child = parent.child();
    let out: Result<(), _> = c.retrier(5).run(&child, || {
        c.calls.fetch_add(1, Ordering::SeqCst);
        parent.cancel_with_reason("shutdown");
        Err(ActionError::retriable(fail("try again")))
    });
    assert!(out.unwrap_err().is_cancelled());
    assert_eq!(c.calls(), 1);
}

#[test]
fn identical_configurations_give_identical_outcomes() {
    let run = || {
        let c = Counters::new();
        let out: Result<u32, _> = c.retrier(5).run(&CancelToken::never(), || {
            let n = c.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n < 4 {
                Err(ActionError::retriable(fail("not yet")))
            } else {
                Ok(n as u32)
            }
        });
        (out.ok(), c.calls(), c.errors())
    };
    let first = run();
    assert_eq!(first, (Some(4), 4, 3));
    assert_eq!(run(), first);
}

#[test]
fn retrier_from_toml_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("retry.toml");
    std::fs::write(
        &path,
        "max_attempts = 2\n\n[backoff]\nkind = \"constant\"\ndelay_ms = 1\n",
    )
    .unwrap();
    let cfg = config::load_from_path(&path).unwrap();
    let retrier = Retrier::from_config(&cfg);
    let calls = AtomicUsize::new(0);
    let out: Result<(), _> = retrier.run(&CancelToken::never(), || {
        calls.fetch_add(1, Ordering::SeqCst);
        Err(ActionError::retriable(fail("down")))
    });
    assert!(out.unwrap_err().is_exhausted());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn missing_config_file_names_the_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.toml");
    let err = config::load_from_path(&path).unwrap_err();
    assert!(format!("{err:#}").contains("absent.toml"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_runs_do_not_share_state() {
    let errors = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&errors);
    let retrier = Retrier::builder()
        .max_attempts(3)
        .backoff(Constant(Duration::from_millis(1)))
        .on_error(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        })
        .build();

    let mut handles = Vec::new();
    for task in 0..8usize {
        let retrier = retrier.clone();
        handles.push(tokio::task::spawn_blocking(move || {
            let mut calls = 0usize;
            // Even tasks succeed on their second attempt, odd tasks never do.
            let out: Result<usize, _> = retrier.run(&CancelToken::never(), || {
                calls += 1;
                if task % 2 == 0 && calls == 2 {
                    Ok(task)
                } else {
                    Err(ActionError::retriable(fail("busy")))
                }
            });
            (task, out.map_err(|e| e.kind()), calls)
        }));
    }

    for handle in handles {
        let (task, out, calls) = handle.await.unwrap();
        if task % 2 == 0 {
            assert_eq!(out, Ok(task));
            assert_eq!(calls, 2);
        } else {
            assert_eq!(out, Err(RetryErrorKind::Exhausted));
            assert_eq!(calls, 3);
        }
    }
    // 4 tasks x 1 failure + 4 tasks x 3 failures
    assert_eq!(errors.load(Ordering::SeqCst), 16);
}
