use std::time::Duration;

/// Sleep abstraction injected into polling loops so tests can run them
/// without real delays.
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

/// Default sleeper backed by `std::thread::sleep`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdSleeper;

impl Sleeper for StdSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Poll a condition a bounded number of times.
///
/// Calls `condition` up to `max_attempts` times, sleeping `interval` between
/// attempts. Returns `Ok(true)` as soon as the condition holds, `Ok(false)`
/// when the attempts are exhausted, and the condition's error unchanged. The
/// bound keeps a non-responding instrument from turning a poll into an
/// indefinite hang.
pub fn poll_bounded<F, E>(
    mut condition: F,
    max_attempts: u32,
    interval: Duration,
    sleeper: &dyn Sleeper,
) -> Result<bool, E>
where
    F: FnMut() -> Result<bool, E>,
{
    for attempt in 0..max_attempts {
        if condition()? {
            return Ok(true);
        }
        if attempt + 1 < max_attempts {
            sleeper.sleep(interval);
        }
    }
    Ok(false)
}
