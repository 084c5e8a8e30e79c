//! Bounded busy-wait polling
//!
//! Every wait in the driver (FIFO reset, TX drain, device ready) is a
//! blocking poll with a fixed interval and a fixed total budget. The helper
//! here knows nothing about registers; callers supply the predicate.

/// Something that can block the caller for a number of microseconds
pub trait Delay {
    /// Delay for the specified number of microseconds
    fn delay_us(&mut self, us: u32);
}

/// Poll interval and total budget for one busy-wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollBudget {
    /// Delay between polls in microseconds
    pub interval_us: u32,
    /// Total wait budget in microseconds
    pub timeout_us: u32,
}

impl PollBudget {
    /// Create a new budget
    pub const fn new(interval_us: u32, timeout_us: u32) -> Self {
        Self {
            interval_us,
            timeout_us,
        }
    }

    /// Number of delays the budget allows
    pub const fn max_polls(&self) -> u32 {
        if self.interval_us > 0 {
            self.timeout_us / self.interval_us
        } else {
            // Fall back to polling once per microsecond
            self.timeout_us
        }
    }

    /// Poll `cond` until it holds or the budget runs out
    ///
    /// Returns the number of delays spent before the condition held, or
    /// `None` if it never did.
    pub fn wait<T, F>(&self, target: &mut T, mut cond: F) -> Option<u32>
    where
        T: Delay + ?Sized,
        F: FnMut(&mut T) -> bool,
    {
        let max_polls = self.max_polls();
        let mut polls = 0;
        loop {
            if cond(target) {
                return Some(polls);
            }
            if polls == max_polls {
                return None;
            }
            target.delay_us(self.interval_us);
            polls += 1;
        }
    }
}
