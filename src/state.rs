//! Shared engine state and its interrupt handle.
//!
//! [`AtState`] owns every buffer the engine and the UART interrupt exchange data
//! through. It is expected to live in a `static` (all constructors are `const`),
//! but a stack allocation outliving engine and receivers works just as well.
//!
//! The state hands out two kinds of access:
//!
//! * [`AtState::isr`] returns the [`AtIsr`] handle for interrupt context
//! * [`crate::engine::Esp8266At::new`] and the receiver constructors claim their
//!   parts of the state for task context
use core::cell::{Cell, RefCell};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use heapless::{Deque, String};

use crate::buffer::ByteRing;
use crate::ingress;
use crate::ingress::RxMode;

/// Longest MQTT topic the engine accepts for subscriptions.
pub const TOPIC_LENGTH_MAX: usize = 64;

/// Number of complete MQTT messages a subscription slot queues before further
/// deliveries for its topic are dropped.
pub const PENDING_MESSAGES_MAX: usize = 8;

/// Interior mutable cell shared between task and interrupt context.
pub(crate) type Shared<T> = Mutex<CriticalSectionRawMutex, RefCell<T>>;

/// Outgoing byte queue.
pub(crate) struct TxCore<const N: usize> {
    pub ring: ByteRing<N>,
    /// True while the serial device owns a byte. The owned byte stays at the
    /// queue front until [`AtIsr::tx_complete`] pops it.
    pub in_flight: bool,
}

impl<const N: usize> TxCore<N> {
    pub const fn new() -> Self {
        Self {
            ring: ByteRing::new(),
            in_flight: false,
        }
    }
}

/// Response byte queue plus the classifier position.
pub(crate) struct RxCore<const N: usize> {
    pub ring: ByteRing<N>,
    pub mode: RxMode,
    /// Dropped bytes across response, TCP and MQTT traffic. Saturating.
    pub overflow: u32,
}

impl<const N: usize> RxCore<N> {
    pub const fn new() -> Self {
        Self {
            ring: ByteRing::new(),
            mode: RxMode::resp(),
            overflow: 0,
        }
    }
}

/// Inline TCP payload queue.
pub(crate) struct DataCore<const N: usize> {
    pub ring: ByteRing<N>,
    pub claimed: bool,
}

impl<const N: usize> DataCore<N> {
    pub const fn new() -> Self {
        Self {
            ring: ByteRing::new(),
            claimed: false,
        }
    }
}

/// One MQTT subscription: its topic, buffered payload bytes and the lengths of
/// the complete messages contained in them.
pub(crate) struct SubSlot<const N: usize> {
    pub topic: String<TOPIC_LENGTH_MAX>,
    pub ring: ByteRing<N>,
    pub pending: Deque<usize, PENDING_MESSAGES_MAX>,
    pub claimed: bool,
}

impl<const N: usize> SubSlot<N> {
    pub const fn new() -> Self {
        Self {
            topic: String::new(),
            ring: ByteRing::new(),
            pending: Deque::new(),
            claimed: false,
        }
    }

    /// Drops the subscription topic and all buffered traffic. Claims are untouched.
    pub fn reset(&mut self) {
        self.topic.clear();
        self.ring.clear();
        self.pending.clear();
    }
}

/// All buffers shared between the engine, the receivers and the UART interrupt.
///
/// Generic parameters size the individual buffers in bytes:
///
/// * `RESP_SIZE`: command responses
/// * `TX_SIZE`: outgoing bytes
/// * `DATA_SIZE`: inline TCP payload
/// * `SLOTS` / `SLOT_SIZE`: number and payload capacity of MQTT subscription slots
pub struct AtState<
    const RESP_SIZE: usize,
    const TX_SIZE: usize,
    const DATA_SIZE: usize,
    const SLOTS: usize,
    const SLOT_SIZE: usize,
> {
    pub(crate) rx: Shared<RxCore<RESP_SIZE>>,
    pub(crate) tx: Shared<TxCore<TX_SIZE>>,
    pub(crate) data: Shared<DataCore<DATA_SIZE>>,
    pub(crate) slots: [Shared<SubSlot<SLOT_SIZE>>; SLOTS],
    pub(crate) claimed: Mutex<CriticalSectionRawMutex, Cell<bool>>,
}

impl<
        const RESP_SIZE: usize,
        const TX_SIZE: usize,
        const DATA_SIZE: usize,
        const SLOTS: usize,
        const SLOT_SIZE: usize,
    > AtState<RESP_SIZE, TX_SIZE, DATA_SIZE, SLOTS, SLOT_SIZE>
{
    pub const fn new() -> Self {
        Self {
            rx: Mutex::new(RefCell::new(RxCore::new())),
            tx: Mutex::new(RefCell::new(TxCore::new())),
            data: Mutex::new(RefCell::new(DataCore::new())),
            slots: [const { Mutex::new(RefCell::new(SubSlot::new())) }; SLOTS],
            claimed: Mutex::new(Cell::new(false)),
        }
    }

    /// Interrupt handle of this state.
    ///
    /// The handle is `Copy` and meant to be stored wherever the UART interrupt
    /// routine can reach it.
    pub fn isr(&self) -> AtIsr<'_, RESP_SIZE, TX_SIZE, DATA_SIZE, SLOTS, SLOT_SIZE> {
        AtIsr { state: self }
    }

    /// Number of received bytes dropped so far because a buffer was full.
    ///
    /// One shared counter covers response, TCP and MQTT traffic. It saturates
    /// at `u32::MAX` and is reset by [`crate::engine::Esp8266At::start`].
    pub fn overflow_count(&self) -> u32 {
        self.rx.lock(|rx| rx.borrow().overflow)
    }

    /// Clears all queued traffic and resyncs the classifier. Claims survive.
    pub(crate) fn reset_traffic(&self) {
        self.rx.lock(|rx| {
            let mut rx = rx.borrow_mut();
            rx.ring.clear();
            rx.mode = RxMode::resp();
            rx.overflow = 0;
        });
        self.tx.lock(|tx| {
            let mut tx = tx.borrow_mut();
            tx.ring.clear();
            tx.in_flight = false;
        });
        self.data.lock(|data| data.borrow_mut().ring.clear());
        for slot in &self.slots {
            slot.lock(|slot| slot.borrow_mut().reset());
        }
    }
}

impl<
        const RESP_SIZE: usize,
        const TX_SIZE: usize,
        const DATA_SIZE: usize,
        const SLOTS: usize,
        const SLOT_SIZE: usize,
    > Default for AtState<RESP_SIZE, TX_SIZE, DATA_SIZE, SLOTS, SLOT_SIZE>
{
    fn default() -> Self {
        Self::new()
    }
}

/// Handle for feeding the engine from interrupt context.
///
/// Obtained from [`AtState::isr`]. Both methods move single bytes under a short
/// critical section and never block, so they are safe to call from interrupt
/// handlers.
pub struct AtIsr<
    'a,
    const RESP_SIZE: usize,
    const TX_SIZE: usize,
    const DATA_SIZE: usize,
    const SLOTS: usize,
    const SLOT_SIZE: usize,
> {
    state: &'a AtState<RESP_SIZE, TX_SIZE, DATA_SIZE, SLOTS, SLOT_SIZE>,
}

impl<
        const RESP_SIZE: usize,
        const TX_SIZE: usize,
        const DATA_SIZE: usize,
        const SLOTS: usize,
        const SLOT_SIZE: usize,
    > Clone for AtIsr<'_, RESP_SIZE, TX_SIZE, DATA_SIZE, SLOTS, SLOT_SIZE>
{
    fn clone(&self) -> Self {
        *self
    }
}

impl<
        const RESP_SIZE: usize,
        const TX_SIZE: usize,
        const DATA_SIZE: usize,
        const SLOTS: usize,
        const SLOT_SIZE: usize,
    > Copy for AtIsr<'_, RESP_SIZE, TX_SIZE, DATA_SIZE, SLOTS, SLOT_SIZE>
{
}

impl<
        const RESP_SIZE: usize,
        const TX_SIZE: usize,
        const DATA_SIZE: usize,
        const SLOTS: usize,
        const SLOT_SIZE: usize,
    > AtIsr<'_, RESP_SIZE, TX_SIZE, DATA_SIZE, SLOTS, SLOT_SIZE>
{
    /// Feeds one received byte into the classifier.
    ///
    /// Never fails. Bytes that do not fit anywhere are dropped and counted in
    /// [`AtState::overflow_count`].
    pub fn rx_byte(&self, byte: u8) {
        ingress::feed(self.state, byte);
    }

    /// Acknowledges that the serial device finished sending the current byte.
    ///
    /// Returns the next queued byte, which the caller must hand to the device
    /// to keep the transmission chain going. `None` ends the chain.
    pub fn tx_complete(&self) -> Option<u8> {
        self.state.tx.lock(|tx| {
            let mut tx = tx.borrow_mut();
            tx.ring.pop();
            match tx.ring.peek() {
                Some(next) => Some(next),
                None => {
                    tx.in_flight = false;
                    None
                }
            }
        })
    }
}
