//! # TCP/UDP client
//!
//! Connection management and payload transfer over the single shared link.
//! Outbound payload runs through the two phase `AT+CIPSEND` handshake. Inbound
//! payload is announced by `+IPD` frames, buffered by the classifier and drained
//! through a claimed [`TcpReceiver`], independently of command traffic.
//!
//! ## Example
//!
//! ````
//! # use esp_at_link::engine::Esp8266At;
//! # use esp_at_link::example::{ExampleSerial, ExampleState, ExampleTimer};
//! # use esp_at_link::tcp::{TcpReceiver, TransportProtocol};
//! # use esp_at_link::time::Budget;
//! #
//! let state = ExampleState::new();
//! let serial = ExampleSerial::new(state.isr());
//! let mut link = Esp8266At::new(&state, serial, ExampleTimer::default()).unwrap();
//! link.start().unwrap();
//!
//! // The example serial answers payload uploads with an echo frame
//! let mut budget = Budget::millis(10_000);
//! link.connect(TransportProtocol::Tcp, "10.0.0.1", 5000, &mut budget).unwrap();
//! link.send(b"hallo!", &mut budget).unwrap();
//!
//! let mut receiver = TcpReceiver::claim(&state, ExampleTimer::default()).unwrap();
//! let mut buffer = [0; 32];
//! let count = receiver.receive(&mut buffer, &mut budget).unwrap();
//! assert_eq!(b"hallo!", &buffer[..count]);
//! ````
use fugit::TimerDurationU32;
use fugit_timer::Timer;

use crate::commands::{CloseCommand, ConnectCommand, SendPrepareCommand, SEND_OK_TERMINATOR};
use crate::engine::Esp8266At;
use crate::error::AtError;
use crate::ingress::DATA_LENGTH_MAX;
use crate::io::SerialHardware;
use crate::state::{AtState, DataCore, Shared};
use crate::time::{Budget, Checkpoint};

/// Highest link id `AT+CIPSTART` accepts in multiplexed mode.
const LINK_ID_MAX: u8 = 4;

/// Transport protocol of a connection
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransportProtocol {
    Tcp,
    Udp,
}

impl TransportProtocol {
    pub(crate) fn token(&self) -> &'static str {
        match self {
            TransportProtocol::Tcp => "TCP",
            TransportProtocol::Udp => "UDP",
        }
    }
}

impl<
        S: SerialHardware,
        T: Timer<TIMER_HZ>,
        const TIMER_HZ: u32,
        const RESP_SIZE: usize,
        const TX_SIZE: usize,
        const DATA_SIZE: usize,
        const SLOTS: usize,
        const SLOT_SIZE: usize,
    > Esp8266At<'_, S, T, TIMER_HZ, RESP_SIZE, TX_SIZE, DATA_SIZE, SLOTS, SLOT_SIZE>
{
    /// Opens a connection on the single shared link.
    pub fn connect(
        &mut self,
        protocol: TransportProtocol,
        host: &str,
        port: u16,
        budget: &mut Budget,
    ) -> Result<(), AtError> {
        self.run(
            &ConnectCommand {
                link_id: None,
                protocol,
                host,
                port,
            },
            budget,
        )
    }

    /// Opens a connection on a numbered link, 0 to 4.
    ///
    /// Requires multiplexing, see [`Esp8266At::set_multiplexing`].
    pub fn connect_indexed(
        &mut self,
        link_id: u8,
        protocol: TransportProtocol,
        host: &str,
        port: u16,
        budget: &mut Budget,
    ) -> Result<(), AtError> {
        if link_id > LINK_ID_MAX {
            return Err(AtError::InvalidArgument);
        }
        self.run(
            &ConnectCommand {
                link_id: Some(link_id),
                protocol,
                host,
                port,
            },
            budget,
        )
    }

    /// Closes the current connection.
    pub fn close(&mut self, budget: &mut Budget) -> Result<(), AtError> {
        self.run(&CloseCommand, budget)
    }

    /// Sends a payload over the open connection.
    ///
    /// Announces the length, waits for the `>` prompt, uploads the bytes and
    /// waits for the `SEND OK` confirmation. At most 2048 bytes per call.
    pub fn send(&mut self, data: &[u8], budget: &mut Budget) -> Result<(), AtError> {
        if data.is_empty() {
            return Ok(());
        }
        if data.len() > DATA_LENGTH_MAX {
            return Err(AtError::InvalidArgument);
        }

        self.run(&SendPrepareCommand { length: data.len() }, budget)?;
        self.transact(data, SEND_OK_TERMINATOR, budget)
    }
}

/// Exclusive access to the inbound TCP payload buffer.
///
/// Claiming hands the payload side of the state to exactly one owner, typically
/// a different task than the one driving the engine. [`TcpReceiver::release`]
/// gives the claim back.
pub struct TcpReceiver<'a, T: Timer<TIMER_HZ>, const TIMER_HZ: u32, const DATA_SIZE: usize> {
    cell: &'a Shared<DataCore<DATA_SIZE>>,
    timer: T,
    read_timeout: TimerDurationU32<TIMER_HZ>,
}

impl<'a, T: Timer<TIMER_HZ>, const TIMER_HZ: u32, const DATA_SIZE: usize>
    TcpReceiver<'a, T, TIMER_HZ, DATA_SIZE>
{
    /// Claims the TCP payload buffer of `state`.
    ///
    /// Fails with [`AtError::Busy`] while another receiver holds the claim.
    pub fn claim<
        const RESP_SIZE: usize,
        const TX_SIZE: usize,
        const SLOTS: usize,
        const SLOT_SIZE: usize,
    >(
        state: &'a AtState<RESP_SIZE, TX_SIZE, DATA_SIZE, SLOTS, SLOT_SIZE>,
        timer: T,
    ) -> Result<Self, AtError> {
        state.data.lock(|data| {
            let mut data = data.borrow_mut();
            if data.claimed {
                return Err(AtError::Busy);
            }
            data.claimed = true;
            Ok(())
        })?;

        Ok(Self {
            cell: &state.data,
            timer,
            read_timeout: TimerDurationU32::millis(5_000),
        })
    }

    /// Releases the claim and returns the timer.
    pub fn release(self) -> T {
        self.cell.lock(|data| data.borrow_mut().claimed = false);
        self.timer
    }

    /// Reads buffered payload bytes.
    ///
    /// Returns once the buffer is filled or the budget ran out, whichever comes
    /// first, with the number of bytes read. Already buffered bytes are drained
    /// without waiting.
    pub fn receive(&mut self, buffer: &mut [u8], budget: &mut Budget) -> Result<usize, AtError> {
        let mut collected = 0;
        let mut checkpoint = Checkpoint::new(&mut self.timer);

        loop {
            collected += self
                .cell
                .lock(|data| data.borrow_mut().ring.drain(&mut buffer[collected..]));
            if collected == buffer.len() {
                return Ok(collected);
            }
            checkpoint.tick(&mut self.timer, budget);
            if budget.is_exhausted() {
                return Ok(collected);
            }
        }
    }

    /// Sets the timeout in ms used by the [`embedded_io::Read`] implementation.
    pub fn set_read_timeout_ms(&mut self, timeout: u32) {
        self.read_timeout = TimerDurationU32::millis(timeout);
    }
}

impl<T: Timer<TIMER_HZ>, const TIMER_HZ: u32, const DATA_SIZE: usize> embedded_io::ErrorType
    for TcpReceiver<'_, T, TIMER_HZ, DATA_SIZE>
{
    type Error = AtError;
}

impl<T: Timer<TIMER_HZ>, const TIMER_HZ: u32, const DATA_SIZE: usize> embedded_io::Read
    for TcpReceiver<'_, T, TIMER_HZ, DATA_SIZE>
{
    /// Blocking read with the configured timeout, see
    /// [`TcpReceiver::set_read_timeout_ms`].
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize, Self::Error> {
        let mut budget = Budget::millis(self.read_timeout.to_millis());
        let count = self.receive(buffer, &mut budget)?;
        if count == 0 && !buffer.is_empty() {
            return Err(AtError::Timeout);
        }
        Ok(count)
    }
}
