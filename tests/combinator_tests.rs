//! End-to-end combinator behavior across real threads.

use std::thread;
use std::time::{Duration, Instant};

use rstest::rstest;
use yakusoku::{Error, Future, Promise};

/// Resolves to `value` on a background thread after `delay`.
fn resolves_in(delay: Duration, value: i32) -> Future<i32> {
    let promise = Promise::new();
    let writer = promise.clone();
    thread::spawn(move || {
        thread::sleep(delay);
        writer
            .set_value(value)
            .expect("background resolution is the only writer");
    });
    promise.future()
}

fn fails_in(delay: Duration, error: Error) -> Future<i32> {
    let promise = Promise::new();
    let writer = promise.clone();
    thread::spawn(move || {
        thread::sleep(delay);
        writer
            .set_exception(error)
            .expect("background resolution is the only writer");
    });
    promise.future()
}

#[rstest]
fn within_times_out_a_pending_future() {
    let pending = Promise::<i32>::new();
    let bounded = pending.future().within(Duration::from_millis(50));

    assert_eq!(bounded.get(), Err(Error::Timeout(Duration::from_millis(50))));
    // The timeout failed the derived future only; the source stays pending.
    assert!(!pending.is_defined());
}

#[rstest]
fn within_zero_times_out_immediately() {
    let pending = Promise::<i32>::new();
    let bounded = pending.future().within(Duration::ZERO);
    assert_eq!(
        bounded.get_for(Duration::from_secs(5)),
        Err(Error::Timeout(Duration::ZERO))
    );
    assert!(!pending.is_defined());
}

#[rstest]
fn within_passes_a_fast_resolution_through() {
    let bounded = resolves_in(Duration::from_millis(10), 7).within(Duration::from_secs(5));
    assert_eq!(bounded.get(), Ok(7));
}

#[rstest]
fn or_yields_the_fastest_of_three() {
    let raced = resolves_in(Duration::from_millis(50), 1).or([
        resolves_in(Duration::from_millis(250), 2),
        resolves_in(Duration::from_millis(500), 3),
    ]);
    assert_eq!(raced.get_for(Duration::from_secs(5)), Ok(1));
}

#[rstest]
fn or_propagates_a_fast_failure() {
    let raced = resolves_in(Duration::from_millis(300), 1)
        .or([fails_in(Duration::from_millis(20), Error::SelectOnEmpty)]);
    assert_eq!(raced.get_for(Duration::from_secs(5)), Err(Error::SelectOnEmpty));
}

#[rstest]
fn select_reports_winner_and_stragglers() {
    let selected = Promise::select(vec![
        Promise::<i32>::new().future(),
        resolves_in(Duration::from_millis(30), 9),
    ]);

    let (winner, remaining) = selected.get_for(Duration::from_secs(5)).unwrap();
    assert_eq!(winner.get(), Ok(9));
    assert_eq!(remaining.len(), 1);
    assert!(!remaining[0].is_defined());
}

#[rstest]
fn collect_fails_as_soon_as_any_input_fails() {
    let started = Instant::now();
    let collected = Promise::collect(vec![
        resolves_in(Duration::from_millis(400), 1),
        fails_in(Duration::from_millis(20), Error::SelectOnEmpty),
    ]);

    assert_eq!(
        collected.get_for(Duration::from_secs(5)),
        Err(Error::SelectOnEmpty)
    );
    // The failure must not wait for the slow success.
    assert!(started.elapsed() < Duration::from_millis(300));
}

#[rstest]
fn collect_over_threads_preserves_input_order() {
    let collected = Promise::collect(vec![
        resolves_in(Duration::from_millis(60), 1),
        resolves_in(Duration::from_millis(30), 2),
        resolves_in(Duration::from_millis(10), 3),
    ]);
    assert_eq!(collected.get_for(Duration::from_secs(5)), Ok(vec![1, 2, 3]));
}

#[rstest]
fn a_pipeline_composes_across_threads() {
    let pipeline = resolves_in(Duration::from_millis(20), 4)
        .map(|n| n * 10)
        .flat_map(|n| resolves_in(Duration::from_millis(10), n + 2))
        .filter(|n| *n == 42)
        .within(Duration::from_secs(5));
    assert_eq!(pipeline.get(), Ok(42));
}

#[rstest]
fn rescue_recovers_a_threaded_failure() {
    let recovered = fails_in(Duration::from_millis(20), Error::SelectOnEmpty)
        .rescue(|_| resolves_in(Duration::from_millis(10), 8));
    assert_eq!(recovered.get_for(Duration::from_secs(5)), Ok(8));
}

#[rstest]
fn wait_sleeps_then_resolves() {
    let started = Instant::now();
    let slept = Promise::wait(Duration::from_millis(40));
    assert_eq!(slept.get_for(Duration::from_secs(5)), Ok(()));
    assert!(started.elapsed() >= Duration::from_millis(40));
}
