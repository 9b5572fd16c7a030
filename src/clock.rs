use std::sync::Mutex;
use std::time::Instant;

pub trait Clock: Send + Sync {
    // non-decreasing across calls from any thread
    fn now(&self) -> f64;
}

// real-time clock backed by Instant, used by the binary
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

// time only moves when the test tells it to
pub struct VirtualClock {
    now: Mutex<f64>,
}

impl VirtualClock {
    pub fn new(start_s: f64) -> Self {
        Self {
            now: Mutex::new(start_s),
        }
    }

    pub fn advance(&self, delta_s: f64) {
        let mut guard = self.now.lock().unwrap();
        *guard += delta_s;
    }

    pub fn set(&self, t_s: f64) {
        let mut guard = self.now.lock().unwrap();
        *guard = t_s;
    }
}

impl Clock for VirtualClock {
    fn now(&self) -> f64 {
        *self.now.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn virtual_clock_advances_monotonically() {
        let clock = VirtualClock::new(0.0);
        assert_eq!(clock.now(), 0.0);
        clock.advance(1.5);
        assert_eq!(clock.now(), 1.5);
        clock.set(10.0);
        assert_eq!(clock.now(), 10.0);
    }
}
