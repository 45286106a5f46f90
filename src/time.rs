//! Timeout budgets for blocking operations.
use fugit::{TimerDurationU32, TimerInstantU32};
use fugit_timer::Timer;

/// Remaining time of one logical operation in milliseconds.
///
/// A budget is passed through every blocking stage of an operation (clearing buffers,
/// writing the command, flushing, waiting for the response). Each stage subtracts the
/// time it waited, so later stages only get what is left over. A budget stops at zero.
///
/// The remainder can be inspected after a call returned:
/// ````
/// use esp_at_link::time::Budget;
///
/// let mut budget = Budget::millis(5_000);
/// assert_eq!(5_000, budget.remaining_millis());
/// assert!(!budget.is_exhausted());
/// ````
#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Budget {
    remaining_ms: u32,
}

impl Budget {
    /// A fresh budget of the given number of milliseconds.
    pub const fn millis(ms: u32) -> Self {
        Self { remaining_ms: ms }
    }

    /// Time left for the rest of the operation.
    pub const fn remaining_millis(&self) -> u32 {
        self.remaining_ms
    }

    /// True once the entire budget has been consumed.
    pub const fn is_exhausted(&self) -> bool {
        self.remaining_ms == 0
    }

    pub(crate) fn consume(&mut self, elapsed_ms: u32) {
        self.remaining_ms = self.remaining_ms.saturating_sub(elapsed_ms);
    }
}

/// Measures wall time between polls and charges it to a [`Budget`].
pub(crate) struct Checkpoint<const TIMER_HZ: u32> {
    last: TimerInstantU32<TIMER_HZ>,
}

impl<const TIMER_HZ: u32> Checkpoint<TIMER_HZ> {
    pub fn new<T: Timer<TIMER_HZ>>(timer: &mut T) -> Self {
        Self { last: timer.now() }
    }

    /// Charges the time elapsed since the previous charge.
    ///
    /// Sub-millisecond remainders stay uncharged and accumulate, so tight poll
    /// loops drain the budget at wall time speed and not faster.
    pub fn tick<T: Timer<TIMER_HZ>>(&mut self, timer: &mut T, budget: &mut Budget) {
        let now = timer.now();
        match now.checked_duration_since(self.last) {
            Some(elapsed) => {
                let elapsed_ms = elapsed.to_millis();
                if elapsed_ms > 0 {
                    budget.consume(elapsed_ms);
                    self.last += TimerDurationU32::<TIMER_HZ>::millis(elapsed_ms);
                }
            }
            // Timer wrapped around, resync without charging
            None => self.last = now,
        }
    }
}

/// Fixed settle times in milliseconds the modem needs after certain commands before
/// it reliably accepts the next one.
///
/// The defaults match the timing of common ESP-AT firmware. Individual fields may be
/// overridden for faster or slower modems.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SettleDelays {
    /// After switching command echo
    pub echo: u32,
    /// After switching the WiFi mode
    pub wifi_mode: u32,
    /// After switching connection multiplexing
    pub multiplexing: u32,
    /// After leaving an access point
    pub leave_ap: u32,
    /// After a software restart
    pub restart: u32,
}

impl Default for SettleDelays {
    fn default() -> Self {
        Self {
            echo: 100,
            wifi_mode: 100,
            multiplexing: 100,
            leave_ap: 500,
            restart: 2_000,
        }
    }
}
