//! Buffered serial I/O between the engine and the UART.
//!
//! Task context only ever touches the byte queues. The actual device is driven
//! one byte at a time through [`SerialHardware::transmit`] and acknowledged from
//! the transmit interrupt via [`crate::state::AtIsr::tx_complete`], which chains
//! the next byte without involving task context.
use fugit_timer::Timer;

use crate::engine::Esp8266At;
use crate::error::AtError;
use crate::time::{Budget, Checkpoint};

/// Low level serial device driven by the engine.
///
/// Received bytes are expected to be fed into [`crate::state::AtIsr::rx_byte`]
/// from the receive interrupt, completed transmissions acknowledged through
/// [`crate::state::AtIsr::tx_complete`].
pub trait SerialHardware {
    type Error: core::fmt::Debug;

    /// Starts the transmission of one byte.
    ///
    /// The next byte is handed out once the transmit interrupt acknowledged the
    /// current one.
    fn transmit(&mut self, byte: u8) -> Result<(), Self::Error>;

    /// Hardware reset of the modem, e.g. by pulsing its reset line.
    fn reset(&mut self) -> Result<(), Self::Error>;
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
    /// Hands the queue front to the serial device unless a byte is in flight.
    fn pump(&mut self) -> Result<(), AtError> {
        let next = self.state.tx.lock(|tx| {
            let mut tx = tx.borrow_mut();
            if tx.in_flight {
                None
            } else {
                let next = tx.ring.peek();
                tx.in_flight = next.is_some();
                next
            }
        });

        if let Some(byte) = next {
            if self.serial.transmit(byte).is_err() {
                self.state.tx.lock(|tx| tx.borrow_mut().in_flight = false);
                warn!("serial device rejected a byte");
                return Err(AtError::Io);
            }
        }
        Ok(())
    }

    /// Queues as much of `data` as currently fits and kicks transmission.
    ///
    /// Returns the number of bytes taken. Fails with [`AtError::Io`] if the
    /// outgoing queue could not take a single byte.
    pub fn write(&mut self, data: &[u8]) -> Result<usize, AtError> {
        let taken = self.state.tx.lock(|tx| tx.borrow_mut().ring.extend(data));
        if taken == 0 && !data.is_empty() {
            return Err(AtError::Io);
        }
        self.pump()?;
        Ok(taken)
    }

    /// Queues all of `data`, waiting for queue space within the budget.
    pub fn write_all(&mut self, data: &[u8], budget: &mut Budget) -> Result<(), AtError> {
        let mut offset = 0;
        let mut checkpoint = Checkpoint::new(&mut self.timer);

        while offset < data.len() {
            offset += self
                .state
                .tx
                .lock(|tx| tx.borrow_mut().ring.extend(&data[offset..]));
            self.pump()?;

            if offset == data.len() {
                break;
            }
            checkpoint.tick(&mut self.timer, budget);
            if budget.is_exhausted() {
                return Err(AtError::Timeout);
            }
        }
        Ok(())
    }

    /// Blocks until the outgoing queue is fully drained.
    pub fn flush(&mut self, budget: &mut Budget) -> Result<(), AtError> {
        let mut checkpoint = Checkpoint::new(&mut self.timer);
        loop {
            self.pump()?;
            if self.state.tx.lock(|tx| tx.borrow().ring.is_empty()) {
                return Ok(());
            }
            checkpoint.tick(&mut self.timer, budget);
            if budget.is_exhausted() {
                return Err(AtError::Timeout);
            }
        }
    }

    /// Collects received response bytes until `buffer` is filled.
    ///
    /// Waits within the budget and returns the number of bytes collected. An
    /// exhausted budget reports the partial count instead of a silent short
    /// read.
    pub fn read(&mut self, buffer: &mut [u8], budget: &mut Budget) -> Result<usize, AtError> {
        let mut collected = 0;
        let mut checkpoint = Checkpoint::new(&mut self.timer);

        loop {
            collected += self
                .state
                .rx
                .lock(|rx| rx.borrow_mut().ring.drain(&mut buffer[collected..]));
            if collected == buffer.len() {
                return Ok(collected);
            }
            checkpoint.tick(&mut self.timer, budget);
            if budget.is_exhausted() {
                return Ok(collected);
            }
        }
    }

    /// Drops all buffered response bytes.
    pub fn clear(&mut self) {
        self.state.rx.lock(|rx| {
            let mut rx = rx.borrow_mut();
            let dropped = rx.ring.len();
            rx.ring.clear();
            trace!("dropped {} stale response bytes", dropped);
        });
    }
}
