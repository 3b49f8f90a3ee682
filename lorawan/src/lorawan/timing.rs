use embedded_hal::blocking::delay::DelayMs;

/// Receive window timing, all relative to the end of the uplink transmission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingParams {
    /// RX1 opens this long after TX done (ms)
    pub rx1_delay_ms: u32,
    /// RX2 opens this long after TX done (ms)
    pub rx2_delay_ms: u32,
    /// How long each window stays open (ms)
    pub rx_window_ms: u32,
    /// Radio polling period while a window is open (ms)
    pub poll_interval_ms: u32,
}

impl Default for TimingParams {
    fn default() -> Self {
        Self {
            rx1_delay_ms: 1000,
            rx2_delay_ms: 2000,
            rx_window_ms: 1000,
            poll_interval_ms: 10,
        }
    }
}

/// Monotonic millisecond time source that can also wait
pub trait Timer {
    /// Milliseconds since an arbitrary epoch
    fn now_ms(&self) -> u64;

    /// Block for `ms` milliseconds
    fn delay_ms(&mut self, ms: u32);

    /// Block until `deadline`, returning at once if it has passed
    fn delay_until(&mut self, deadline: u64) {
        let now = self.now_ms();
        if deadline > now {
            self.delay_ms((deadline - now).min(u32::MAX as u64) as u32);
        }
    }
}

/// Clock that only moves when someone waits on it
///
/// Makes window scheduling deterministic in tests and simulations.
#[derive(Debug, Default, Clone)]
pub struct VirtualClock {
    now: u64,
}

impl VirtualClock {
    /// Clock starting at 0 ms
    pub fn new() -> Self {
        Self::default()
    }

    /// Move time forward without waiting
    pub fn advance(&mut self, ms: u64) {
        self.now += ms;
    }
}

impl Timer for VirtualClock {
    fn now_ms(&self) -> u64 {
        self.now
    }

    fn delay_ms(&mut self, ms: u32) {
        self.now += ms as u64;
    }
}

/// Timer built from an embedded-hal delay provider
///
/// Time is the sum of the delays performed, which is accurate enough for receive
/// windows when the MAC is the only thing using the core.
pub struct DelayTimer<D> {
    delay: D,
    elapsed: u64,
}

impl<D: DelayMs<u32>> DelayTimer<D> {
    /// Wrap a delay provider
    pub fn new(delay: D) -> Self {
        Self { delay, elapsed: 0 }
    }

    /// Give the delay provider back
    pub fn release(self) -> D {
        self.delay
    }
}

impl<D: DelayMs<u32>> Timer for DelayTimer<D> {
    fn now_ms(&self) -> u64 {
        self.elapsed
    }

    fn delay_ms(&mut self, ms: u32) {
        self.delay.delay_ms(ms);
        self.elapsed += ms as u64;
    }
}

/// Wall-clock timer for hosted builds
#[cfg(feature = "std")]
pub struct StdTimer {
    start: std::time::Instant,
}

#[cfg(feature = "std")]
impl StdTimer {
    /// Timer whose epoch is now
    pub fn new() -> Self {
        Self {
            start: std::time::Instant::now(),
        }
    }
}

#[cfg(feature = "std")]
impl Default for StdTimer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "std")]
impl Timer for StdTimer {
    fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    fn delay_ms(&mut self, ms: u32) {
        std::thread::sleep(std::time::Duration::from_millis(ms as u64));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingDelay(u32);

    impl DelayMs<u32> for CountingDelay {
        fn delay_ms(&mut self, ms: u32) {
            self.0 += ms;
        }
    }

    #[test]
    fn test_virtual_clock_moves_on_delay() {
        let mut clock = VirtualClock::new();
        clock.delay_until(1000);
        assert_eq!(clock.now_ms(), 1000);
        clock.delay_until(500);
        assert_eq!(clock.now_ms(), 1000);
        clock.advance(5);
        assert_eq!(clock.now_ms(), 1005);
    }

    #[test]
    fn test_delay_timer_accumulates() {
        let mut timer = DelayTimer::new(CountingDelay(0));
        timer.delay_ms(10);
        timer.delay_until(25);
        assert_eq!(timer.now_ms(), 25);
        assert_eq!(timer.release().0, 25);
    }
}
