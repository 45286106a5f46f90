use std::collections::VecDeque;

use fugit::{TimerDurationU32, TimerInstantU32};
use fugit_timer::Timer as FugitTimer;
use mockall::mock;

use crate::io::SerialHardware;
use crate::state::{AtIsr, AtState};

/// State sizing shared by most tests.
pub type TestState = AtState<512, 512, 512, 2, 128>;

/// Matching interrupt handle.
pub type TestIsr<'a> = AtIsr<'a, 512, 512, 512, 2, 128>;

/// Serial device mock wired to the interrupt handle of a [`TestState`].
///
/// Transmissions complete instantly: every byte is recorded and acknowledged
/// through [`AtIsr::tx_complete`], which chains the remaining queue before
/// `transmit` returns. Scripted exchanges inject their response bytes as soon
/// as the recorded stream ends with the trigger bytes.
pub struct MockSerial<'a> {
    isr: TestIsr<'a>,

    /// Complete recorded outbound byte stream
    sent: Vec<u8>,

    /// Scripted exchanges, only the front one is armed
    script: VecDeque<(&'static [u8], &'static [u8])>,

    /// If false, transmitted bytes are not acknowledged and the queue stalls
    ack_transmits: bool,

    /// If true, every transmit call fails
    fail_transmits: bool,

    /// reset() call count
    reset_count: usize,
}

impl<'a> MockSerial<'a> {
    pub fn new(isr: TestIsr<'a>) -> Self {
        Self {
            isr,
            sent: Vec::new(),
            script: VecDeque::new(),
            ack_transmits: true,
            fail_transmits: false,
            reset_count: 0,
        }
    }

    /// Injects `response` once the outbound stream ends with `trigger`
    pub fn add_exchange(&mut self, trigger: &'static [u8], response: &'static [u8]) {
        self.script.push_back((trigger, response));
    }

    /// Scripts a plain OK acknowledgement for the given command line
    pub fn add_ok_exchange(&mut self, trigger: &'static [u8]) {
        self.add_exchange(trigger, b"\r\nOK\r\n");
    }

    /// Keeps transmitted bytes unacknowledged, so the outgoing queue stalls
    pub fn stall_transmits(&mut self) {
        self.ack_transmits = false;
    }

    /// Makes every transmit call fail
    pub fn fail_transmits(&mut self) {
        self.fail_transmits = true;
    }

    /// Complete outbound stream as text
    pub fn sent_as_string(&self) -> String {
        String::from_utf8(self.sent.clone()).unwrap()
    }

    pub fn reset_count(&self) -> usize {
        self.reset_count
    }

    fn check_script(&mut self) {
        if let Some((trigger, response)) = self.script.front() {
            if !self.sent.ends_with(trigger) {
                return;
            }
            let response: &'static [u8] = response;
            self.script.pop_front();
            for &byte in response {
                self.isr.rx_byte(byte);
            }
        }
    }
}

impl SerialHardware for MockSerial<'_> {
    type Error = u32;

    fn transmit(&mut self, byte: u8) -> Result<(), Self::Error> {
        if self.fail_transmits {
            return Err(1);
        }

        let mut current = byte;
        loop {
            self.sent.push(current);
            self.check_script();

            if !self.ack_transmits {
                return Ok(());
            }
            match self.isr.tx_complete() {
                Some(next) => current = next,
                None => return Ok(()),
            }
        }
    }

    fn reset(&mut self) -> Result<(), Self::Error> {
        self.reset_count += 1;
        Ok(())
    }
}

/// Feeds a byte sequence into the classifier of `state`.
pub fn feed(state: &TestState, bytes: &[u8]) {
    let isr = state.isr();
    for &byte in bytes {
        isr.rx_byte(byte);
    }
}

/// Drains the buffered response bytes of `state`.
pub fn drain_resp(state: &TestState) -> Vec<u8> {
    let mut buffer = [0u8; 512];
    let count = state.rx.lock(|rx| rx.borrow_mut().ring.drain(&mut buffer));
    buffer[..count].to_vec()
}

/// Drains the buffered TCP payload bytes of `state`.
pub fn drain_data(state: &TestState) -> Vec<u8> {
    let mut buffer = [0u8; 512];
    let count = state.data.lock(|data| data.borrow_mut().ring.drain(&mut buffer));
    buffer[..count].to_vec()
}

mock! {
    pub Timer{}

    impl FugitTimer<1_000_000> for Timer {
        type Error = u32;

        fn now(&mut self) -> TimerInstantU32<1000000>;
        fn start(&mut self, duration: TimerDurationU32<1000000>) -> Result<(), u32>;
        fn cancel(&mut self) -> Result<(), u32>;
        fn wait(&mut self) -> nb::Result<(), u32>;
    }
}

impl MockTimer {
    /// Short hand helper for returning a milliseconds duration
    pub fn duration_ms(duration: u32) -> TimerDurationU32<1_000_000> {
        TimerDurationU32::millis(duration)
    }

    /// Short hand helper for a timer reading in milliseconds
    pub fn instant_ms(at: u32) -> TimerInstantU32<1_000_000> {
        TimerInstantU32::from_ticks(at.wrapping_mul(1_000))
    }

    /// Timer whose clock stands still and whose delays complete immediately
    pub fn frozen() -> Self {
        let mut timer = Self::new();
        timer.expect_now().returning(|| MockTimer::instant_ms(0));
        timer.expect_start().returning(|_| Ok(()));
        timer.expect_wait().returning(|| Ok(()));
        timer
    }

    /// Timer advancing `step_ms` per query, delays complete immediately
    pub fn stepping(step_ms: u32) -> Self {
        let mut timer = Self::new();
        let mut now: u32 = 0;
        timer.expect_now().returning(move || {
            now = now.wrapping_add(step_ms);
            MockTimer::instant_ms(now)
        });
        timer.expect_start().returning(|_| Ok(()));
        timer.expect_wait().returning(|| Ok(()));
        timer
    }
}
