//! Monotonic embassy-time driver backed by the host clock.
//!
//! Ticks count from the first time query in this process. Wakeups are kept in
//! a deadline-ordered queue served by one `node-timer` thread, started lazily
//! on the first scheduled wake.

use core::task::Waker;
use embassy_time_driver::{Driver, TICK_HZ, time_driver_impl};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::{Duration, Instant};

static ORIGIN: OnceLock<Instant> = OnceLock::new();
static QUEUE: Mutex<BTreeMap<u64, Vec<Waker>>> = Mutex::new(BTreeMap::new());
static CV: Condvar = Condvar::new();
static TIMER_STARTED: AtomicBool = AtomicBool::new(false);

fn origin() -> Instant {
    *ORIGIN.get_or_init(Instant::now)
}

// A panicking waker must not take the timer down with it.
fn queue() -> MutexGuard<'static, BTreeMap<u64, Vec<Waker>>> {
    QUEUE.lock().unwrap_or_else(PoisonError::into_inner)
}

fn instant_to_ticks(at: Instant) -> u64 {
    let elapsed = at.saturating_duration_since(origin());
    (elapsed.as_nanos() * TICK_HZ as u128 / 1_000_000_000u128).min(u64::MAX as u128) as u64
}

fn ticks_to_instant(ticks: u64) -> Instant {
    let nanos = (ticks as u128 * 1_000_000_000u128 / TICK_HZ as u128).min(u64::MAX as u128) as u64;
    origin() + Duration::from_nanos(nanos)
}

fn ensure_timer_thread() {
    if TIMER_STARTED.swap(true, Ordering::SeqCst) {
        return;
    }
    let spawned = std::thread::Builder::new().name("node-timer".into()).spawn(timer_thread);
    if let Err(e) = spawned {
        log::error!("Failed to start timer thread: {}", e);
        // Retried on the next scheduled wake.
        TIMER_STARTED.store(false, Ordering::SeqCst);
    }
}

fn timer_thread() {
    let mut guard = queue();
    loop {
        let Some(&next_at) = guard.keys().next() else {
            guard = CV.wait(guard).unwrap_or_else(PoisonError::into_inner);
            continue;
        };

        let now = Instant::now();
        let due = ticks_to_instant(next_at);
        if due > now {
            guard = CV.wait_timeout(guard, due - now).unwrap_or_else(PoisonError::into_inner).0;
            continue;
        }

        let now_ticks = instant_to_ticks(now);
        let later = guard.split_off(&now_ticks.saturating_add(1));
        let ready = std::mem::replace(&mut *guard, later);
        drop(guard);

        for waker in ready.into_values().flatten() {
            waker.wake();
        }
        guard = queue();
    }
}

struct MonotonicDriver;

impl Driver for MonotonicDriver {
    fn now(&self) -> u64 {
        instant_to_ticks(Instant::now())
    }

    fn schedule_wake(&self, at: u64, waker: &Waker) {
        ensure_timer_thread();
        let mut guard = queue();
        let wakers = guard.entry(at).or_default();
        if !wakers.iter().any(|w| w.will_wake(waker)) {
            wakers.push(waker.clone());
        }
        drop(guard);
        CV.notify_all();
    }
}

time_driver_impl!(static DRIVER: MonotonicDriver = MonotonicDriver);
