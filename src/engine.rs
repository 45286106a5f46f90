//! Command transaction engine.
//!
//! [`Esp8266At`] owns the serial device and a timer and runs one command at a
//! time: clear stale response bytes, write the command line, flush it out and
//! scan the response stream for the terminator of the command. Every stage
//! charges the time it waited to the [`Budget`] of the call, so a caller knows
//! exactly how much patience is left afterwards.
//!
//! The engine claims its [`AtState`] on construction. A second engine on the
//! same state is refused until [`Esp8266At::release`] gave the claim back.
//!
//! ````
//! use esp_at_link::engine::Esp8266At;
//! use esp_at_link::example::{ExampleSerial, ExampleState, ExampleTimer};
//! use esp_at_link::time::Budget;
//!
//! let state = ExampleState::new();
//! let serial = ExampleSerial::new(state.isr());
//! let mut link = Esp8266At::new(&state, serial, ExampleTimer::default()).unwrap();
//! link.start().unwrap();
//!
//! // Basic communication check
//! let mut budget = Budget::millis(1_000);
//! link.at_test(&mut budget).unwrap();
//! ````
use fugit::TimerDurationU32;
use fugit_timer::Timer;
use heapless::Vec;

use crate::commands::AtCommand;
use crate::error::AtError;
use crate::ingress::RxMode;
use crate::io::SerialHardware;
use crate::mqtt::MqttCredentials;
use crate::state::AtState;
use crate::time::{Budget, SettleDelays};

/// Driver for one ESP-AT modem.
///
/// Generic over the serial device `S`, the timer `T` with its `TIMER_HZ` tick
/// rate, and the buffer sizes of the backing [`AtState`].
pub struct Esp8266At<
    'a,
    S: SerialHardware,
    T: Timer<TIMER_HZ>,
    const TIMER_HZ: u32,
    const RESP_SIZE: usize,
    const TX_SIZE: usize,
    const DATA_SIZE: usize,
    const SLOTS: usize,
    const SLOT_SIZE: usize,
> {
    pub(crate) state: &'a AtState<RESP_SIZE, TX_SIZE, DATA_SIZE, SLOTS, SLOT_SIZE>,
    pub(crate) serial: S,
    pub(crate) timer: T,
    /// Response bytes of the last transaction, terminator included.
    pub(crate) scratch: Vec<u8, RESP_SIZE>,
    pub(crate) delays: SettleDelays,
    pub(crate) mqtt_credentials: Option<MqttCredentials>,
}

impl<
        'a,
        S: SerialHardware,
        T: Timer<TIMER_HZ>,
        const TIMER_HZ: u32,
        const RESP_SIZE: usize,
        const TX_SIZE: usize,
        const DATA_SIZE: usize,
        const SLOTS: usize,
        const SLOT_SIZE: usize,
    > Esp8266At<'a, S, T, TIMER_HZ, RESP_SIZE, TX_SIZE, DATA_SIZE, SLOTS, SLOT_SIZE>
{
    /// Claims the state and takes ownership of the serial device and the timer.
    ///
    /// Fails with [`AtError::Busy`] while another engine holds the same state.
    pub fn new(
        state: &'a AtState<RESP_SIZE, TX_SIZE, DATA_SIZE, SLOTS, SLOT_SIZE>,
        serial: S,
        timer: T,
    ) -> Result<Self, AtError> {
        if state.claimed.lock(|claimed| claimed.replace(true)) {
            return Err(AtError::Busy);
        }

        Ok(Self {
            state,
            serial,
            timer,
            scratch: Vec::new(),
            delays: SettleDelays::default(),
            mqtt_credentials: None,
        })
    }

    /// Releases the state claim and hands the hardware back.
    pub fn release(self) -> (S, T) {
        self.state.claimed.lock(|claimed| claimed.set(false));
        (self.serial, self.timer)
    }

    /// Resets the modem hardware and drops all queued traffic.
    pub fn start(&mut self) -> Result<(), AtError> {
        debug!("starting engine, resetting the modem");
        self.serial.reset().map_err(|_| AtError::Io)?;
        self.state.reset_traffic();
        Ok(())
    }

    /// Raw bytes of the last command response, terminator included.
    pub fn response(&self) -> &[u8] {
        self.scratch.as_slice()
    }

    /// Currently configured settle delays.
    pub fn settle_delays(&self) -> SettleDelays {
        self.delays
    }

    /// Overrides the settle delays, e.g. for modems that restart faster.
    pub fn set_settle_delays(&mut self, delays: SettleDelays) {
        self.delays = delays;
    }

    /// Renders a command and runs the full transaction for it.
    pub(crate) fn run<C: AtCommand>(&mut self, command: &C, budget: &mut Budget) -> Result<(), AtError> {
        let line = command.render()?;
        self.transact(line.as_bytes(), C::TERMINATOR, budget)
    }

    /// Sends one raw line and waits for the given terminator.
    pub(crate) fn transact(
        &mut self,
        line: &[u8],
        terminator: &[u8],
        budget: &mut Budget,
    ) -> Result<(), AtError> {
        debug!(
            "command: {}",
            core::str::from_utf8(line).unwrap_or("<binary>").trim_end()
        );
        self.clear();
        self.write_all(line, budget)?;
        self.flush(budget)?;
        self.wait_terminator(terminator, budget)
    }

    /// Collects response bytes until `terminator` appeared in sequence.
    ///
    /// The collected bytes stay available through [`Esp8266At::response`]. The
    /// scan restarts at the pattern head on every mismatching byte.
    pub(crate) fn wait_terminator(
        &mut self,
        terminator: &[u8],
        budget: &mut Budget,
    ) -> Result<(), AtError> {
        self.scratch.clear();
        let mut matched = 0;

        loop {
            let mut byte = [0u8; 1];
            if self.read(&mut byte, budget)? == 0 {
                debug!("response timed out, {} bytes collected", self.scratch.len());
                return Err(AtError::Timeout);
            }
            let byte = byte[0];

            if self.scratch.push(byte).is_err() {
                warn!("response exceeded the {} byte scratch buffer", RESP_SIZE);
                return Err(AtError::InvalidResponse);
            }

            if terminator[matched] == byte {
                matched += 1;
                if matched == terminator.len() {
                    trace!("terminator found after {} bytes", self.scratch.len());
                    return Ok(());
                }
            } else {
                // The mismatching byte may itself start a new match
                matched = usize::from(terminator[0] == byte);
            }
        }
    }

    /// Blocks for a fixed delay the modem needs before accepting new commands,
    /// charging it to the budget.
    pub(crate) fn settle(&mut self, delay_ms: u32, budget: &mut Budget) -> Result<(), AtError> {
        if delay_ms == 0 {
            return Ok(());
        }
        self.timer
            .start(TimerDurationU32::<TIMER_HZ>::millis(delay_ms))
            .map_err(|_| AtError::Io)?;

        loop {
            match self.timer.wait() {
                Ok(()) => break,
                Err(nb::Error::WouldBlock) => {}
                Err(nb::Error::Other(_)) => return Err(AtError::Io),
            }
        }
        budget.consume(delay_ms);
        Ok(())
    }

    /// Resyncs the classifier to response mode without touching buffered bytes.
    pub(crate) fn resync(&mut self) {
        self.state.rx.lock(|rx| rx.borrow_mut().mode = RxMode::resp());
    }
}
