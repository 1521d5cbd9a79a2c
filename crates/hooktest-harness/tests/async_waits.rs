#![forbid(unsafe_code)]

//! Async wait utilities against hooks that update from timers.
//!
//! All tests run on a paused current-thread clock inside a `LocalSet`, so
//! hooks can `spawn_local` their delayed updates and timeouts are exact.
//!
//! Run:
//!   cargo test -p hooktest-harness --test async_waits

use std::future::Future;
use std::rc::Rc;
use std::time::Duration;

use hooktest_harness::{HarnessError, WaitOptions, act_async, render_hook, render_hook_with};
use hooktest_runtime::{Observable, use_effect, use_observable, use_state};
use tokio::task::{LocalSet, spawn_local};
use tokio::time::{Instant, sleep};

async fn local<F: Future>(body: F) -> F::Output {
    LocalSet::new().run_until(body).await
}

/// State that flips to `"updated"` `delay` after mount.
fn use_delayed_update(delay: Duration) -> &'static str {
    let (value, set_value) = use_state(|| "initial");
    use_effect((), move || {
        spawn_local(async move {
            sleep(delay).await;
            set_value.set("updated");
        });
    });
    value
}

// =========================================================================
// wait_for_next_update
// =========================================================================

#[tokio::test(start_paused = true)]
async fn next_update_resolves_within_timeout() {
    local(async {
        let harness = render_hook(|| use_delayed_update(Duration::from_millis(500)));
        assert_eq!(harness.result.current(), Ok("initial"));

        let start = Instant::now();
        harness
            .wait_for_next_update(WaitOptions::new().timeout(Duration::from_millis(1000)))
            .await
            .expect("update arrives at 500ms");
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(500) && elapsed < Duration::from_millis(1000));
        assert_eq!(harness.result.current(), Ok("updated"));
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn next_update_times_out_before_delayed_update() {
    local(async {
        let harness = render_hook(|| use_delayed_update(Duration::from_millis(500)));
        let err = harness
            .wait_for_next_update(WaitOptions::new().timeout(Duration::from_millis(100)))
            .await
            .expect_err("update is later than the timeout");
        assert_eq!(
            err.to_string(),
            "Timed out in wait_for_next_update after 100ms."
        );
        assert_eq!(harness.result.current(), Ok("initial"));
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn concurrent_waiters_all_observe_one_update() {
    local(async {
        let harness = render_hook(|| use_delayed_update(Duration::from_millis(30)));
        let options = WaitOptions::new().timeout(Duration::from_millis(100));
        let (a, b) = tokio::join!(
            harness.wait_for_next_update(options),
            harness.wait_for_next_update(options)
        );
        assert_eq!(a, Ok(()));
        assert_eq!(b, Ok(()));
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn next_update_reraises_hook_failure() {
    local(async {
        let store = Observable::new(1);
        let source = store.clone();
        let harness = render_hook(move || {
            let value = use_observable(&source);
            assert_ne!(value, 2, "two is not allowed");
            value
        });
        spawn_local(async move {
            sleep(Duration::from_millis(10)).await;
            store.set(2);
        });

        let err = harness
            .wait_for_next_update(WaitOptions::new())
            .await
            .expect_err("hook failed");
        match err {
            HarnessError::Render(err) => {
                assert!(err.message().contains("two is not allowed"));
                assert_eq!(err.cycle(), 2);
            }
            other => panic!("expected render error, got {other:?}"),
        }
        assert_eq!(harness.result.current(), Ok(1));
    })
    .await;
}

// =========================================================================
// wait_for
// =========================================================================

#[tokio::test(start_paused = true)]
async fn wait_for_resolves_from_external_timer() {
    local(async {
        let ticks = Observable::new(0);
        let source = ticks.clone();
        let harness = render_hook(move || use_observable(&source));
        spawn_local(async move {
            for n in 1..=5 {
                sleep(Duration::from_millis(10)).await;
                ticks.set(n);
            }
        });

        let result = harness.result.clone();
        harness
            .wait_for(move || result.current() == Ok(5), WaitOptions::new().no_interval())
            .await
            .expect("reaches five");
        assert_eq!(harness.result.current(), Ok(5));
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn wait_for_times_out_with_its_own_name() {
    local(async {
        let harness = render_hook(|| 0);
        let result = harness.result.clone();
        let err = harness
            .wait_for(
                move || result.current() == Ok(1),
                WaitOptions::new().timeout(Duration::from_millis(75)),
            )
            .await
            .expect_err("never becomes one");
        assert_eq!(
            err,
            HarnessError::Timeout {
                operation: "wait_for",
                timeout: Duration::from_millis(75)
            }
        );
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn unmount_while_waiting_fails_fast() {
    local(async {
        let harness = Rc::new(render_hook(|| ()));
        let h = Rc::clone(&harness);
        spawn_local(async move {
            sleep(Duration::from_millis(10)).await;
            h.unmount();
        });

        let start = Instant::now();
        let err = harness
            .wait_for(|| false, WaitOptions::new().timeout(Duration::from_secs(5)))
            .await
            .expect_err("unmounted");
        assert_eq!(
            err,
            HarnessError::Unmounted {
                operation: "wait_for"
            }
        );
        assert!(start.elapsed() < Duration::from_secs(5));
    })
    .await;
}

fn failing_cleanup() {
    panic!("cleanup failed")
}

#[tokio::test(start_paused = true)]
async fn unmount_with_panicking_cleanup_still_fails_pending_wait() {
    local(async {
        let harness = Rc::new(render_hook(|| {
            hooktest_runtime::use_effect_with_cleanup((), || failing_cleanup);
        }));
        let h = Rc::clone(&harness);
        spawn_local(async move {
            sleep(Duration::from_millis(10)).await;
            h.unmount();
        });

        let err = harness
            .wait_for_next_update(WaitOptions::new().timeout(Duration::from_millis(500)))
            .await
            .expect_err("unmounted");
        assert_eq!(
            err,
            HarnessError::Unmounted {
                operation: "wait_for_next_update"
            }
        );
        assert!(!harness.is_mounted());
        assert!(harness.result.error().is_some());
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn dropping_the_harness_signals_unmount_to_receivers() {
    local(async {
        let harness = render_hook(|| {
            hooktest_runtime::use_effect_with_cleanup((), || failing_cleanup);
        });
        let mut updates = harness.updates();
        spawn_local(async move {
            sleep(Duration::from_millis(10)).await;
            drop(harness);
        });

        updates.changed().await.expect("close is observed");
        assert!(updates.borrow_and_update().unmounted);
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn wait_inside_act_async_only_sees_the_update_after_the_boundary() {
    local(async {
        let harness = render_hook(|| use_delayed_update(Duration::from_millis(20)));
        let err = act_async(
            harness.wait_for_next_update(WaitOptions::new().timeout(Duration::from_millis(100))),
        )
        .await
        .expect_err("renders are deferred while the boundary is open");
        assert!(err.is_timeout());
        assert_eq!(harness.result.current(), Ok("updated"));
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn timed_out_wait_does_not_fire_later() {
    local(async {
        let harness = render_hook(|| use_delayed_update(Duration::from_millis(50)));
        let checks = Rc::new(std::cell::Cell::new(0u32));
        let c = Rc::clone(&checks);
        let err = harness
            .wait_for(
                move || {
                    c.set(c.get() + 1);
                    false
                },
                WaitOptions::new()
                    .timeout(Duration::from_millis(20))
                    .no_interval(),
            )
            .await
            .expect_err("times out");
        assert!(err.is_timeout());
        let after_timeout = checks.get();

        harness
            .wait_for_next_update(WaitOptions::new())
            .await
            .expect("delayed update still lands");
        assert_eq!(checks.get(), after_timeout);
    })
    .await;
}

// =========================================================================
// wait_for_value_to_change
// =========================================================================

#[tokio::test(start_paused = true)]
async fn value_change_is_detected() {
    local(async {
        let harness = render_hook(|| use_delayed_update(Duration::from_millis(40)));
        let result = harness.result.clone();
        harness
            .wait_for_value_to_change(move || result.current(), WaitOptions::new())
            .await
            .expect("value changes");
        assert_eq!(harness.result.current(), Ok("updated"));
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn equal_values_do_not_count_as_change_unless_compared_by_identity() {
    local(async {
        let harness = Rc::new(render_hook_with(
            |_: &()| Rc::new(String::from("same")),
            hooktest_harness::RenderHookOptions::new(()),
        ));
        let rerender_soon = |harness: &Rc<hooktest_harness::RenderHookHarness<(), Rc<String>>>| {
            let h = Rc::clone(harness);
            spawn_local(async move {
                sleep(Duration::from_millis(10)).await;
                h.rerender().expect("rerender");
            });
        };

        rerender_soon(&harness);
        let result = harness.result.clone();
        let err = harness
            .wait_for_value_to_change(
                move || result.current().expect("value"),
                WaitOptions::new().timeout(Duration::from_millis(100)),
            )
            .await
            .expect_err("content never changes");
        assert!(err.is_timeout());

        rerender_soon(&harness);
        let result = harness.result.clone();
        harness
            .wait_for_value_to_change_by(
                move || result.current().expect("value"),
                |before, now| !Rc::ptr_eq(before, now),
                WaitOptions::new().timeout(Duration::from_millis(100)),
            )
            .await
            .expect("a new Rc is a change by identity");
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn panicking_selector_is_reported() {
    local(async {
        let harness = render_hook(|| -> u8 { panic!("no value yet") });
        let result = harness.result.clone();
        let _quiet = hooktest_harness::suppress_error_output();
        let err = harness
            .wait_for_value_to_change(move || result.current().expect("value"), WaitOptions::new())
            .await
            .expect_err("selector panics");
        assert_eq!(err.error_type(), "callback");
    })
    .await;
}
