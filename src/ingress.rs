//! Receive path classifier.
//!
//! Every received byte runs through [`feed`], which splits the raw UART stream into
//! three kinds of traffic:
//!
//! * command responses, queued for the engine
//! * inline TCP payload announced by `+IPD,<len>:`, queued for the TCP receiver
//! * MQTT deliveries announced by `+MQTTSUBRECV:0,"<topic>",<len>,`, queued on the
//!   subscription slot whose topic matches
//!
//! Marker detection is incremental. Bytes that match a prefix of one of the two
//! markers are withheld until the marker either completes (the marker bytes are
//! consumed) or mismatches (the withheld prefix is revealed to the response queue
//! and the mismatching byte is classified again). Response bytes therefore never
//! contain fragments of a completed marker and payload bytes never reach the
//! response queue.
use heapless::Vec;

use crate::state::{AtState, RxCore, TOPIC_LENGTH_MAX};

const IPD_MARKER: &[u8] = b"+IPD,";
const MQTT_MARKER: &[u8] = b"+MQTTSUBRECV:0,";

/// Longest frame length field the classifier accepts. Larger announcements are
/// treated as response noise.
pub(crate) const DATA_LENGTH_MAX: usize = 2048;

const LENGTH_DIGITS_MAX: usize = 10;

/// Where the payload bytes of the current frame go.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum PayloadDest {
    /// Inline TCP payload.
    Tcp,
    /// MQTT delivery. `None` means no subscription slot took the topic and the
    /// payload is discarded.
    Mqtt(Option<usize>),
}

/// Classifier position within the receive stream.
pub(crate) enum RxMode {
    /// Response traffic. `ipd` and `mqtt` count the marker bytes matched so far,
    /// which are exactly the withheld bytes.
    Resp { ipd: usize, mqtt: usize },
    /// Between the MQTT marker and the length field, collecting the quoted topic.
    MqttTopic { topic: Vec<u8, { TOPIC_LENGTH_MAX + 2 }> },
    /// Collecting the decimal length field of a frame.
    DataLen {
        dest: PayloadDest,
        digits: Vec<u8, LENGTH_DIGITS_MAX>,
    },
    /// Consuming the announced payload bytes.
    Data {
        dest: PayloadDest,
        declared: usize,
        consumed: usize,
        stored: usize,
    },
}

impl RxMode {
    pub(crate) const fn resp() -> Self {
        RxMode::Resp { ipd: 0, mqtt: 0 }
    }
}

/// Classifies one received byte. Never blocks, never fails.
pub(crate) fn feed<
    const RESP_SIZE: usize,
    const TX_SIZE: usize,
    const DATA_SIZE: usize,
    const SLOTS: usize,
    const SLOT_SIZE: usize,
>(
    state: &AtState<RESP_SIZE, TX_SIZE, DATA_SIZE, SLOTS, SLOT_SIZE>,
    byte: u8,
) {
    state.rx.lock(|rx| {
        let mut rx = rx.borrow_mut();
        let rx = &mut *rx;

        // A mode change may hand the byte back for classification under the new
        // mode. This settles after at most one extra round.
        let mut reprocess = Some(byte);
        while let Some(byte) = reprocess.take() {
            reprocess = step(rx, state, byte);
        }
    });
}

fn step<
    const RESP_SIZE: usize,
    const TX_SIZE: usize,
    const DATA_SIZE: usize,
    const SLOTS: usize,
    const SLOT_SIZE: usize,
>(
    rx: &mut RxCore<RESP_SIZE>,
    state: &AtState<RESP_SIZE, TX_SIZE, DATA_SIZE, SLOTS, SLOT_SIZE>,
    byte: u8,
) -> Option<u8> {
    match &mut rx.mode {
        RxMode::Resp { ipd, mqtt } => {
            let (matched_ipd, matched_mqtt) = (*ipd, *mqtt);
            let armed = matched_ipd > 0 || matched_mqtt > 0;

            // While a marker prefix is withheld, only the already armed automata
            // may advance. A fresh arm in that situation must first reveal the
            // withheld prefix, which the mismatch path below takes care of.
            let ipd_hit = (matched_ipd > 0 || !armed)
                && matched_ipd < IPD_MARKER.len()
                && IPD_MARKER[matched_ipd] == byte;
            let mqtt_hit = (matched_mqtt > 0 || !armed)
                && matched_mqtt < MQTT_MARKER.len()
                && MQTT_MARKER[matched_mqtt] == byte;

            if ipd_hit || mqtt_hit {
                let next_ipd = if ipd_hit { matched_ipd + 1 } else { 0 };
                let next_mqtt = if mqtt_hit { matched_mqtt + 1 } else { 0 };

                if next_ipd == IPD_MARKER.len() {
                    rx.mode = RxMode::DataLen {
                        dest: PayloadDest::Tcp,
                        digits: Vec::new(),
                    };
                } else if next_mqtt == MQTT_MARKER.len() {
                    rx.mode = RxMode::MqttTopic { topic: Vec::new() };
                } else {
                    rx.mode = RxMode::Resp {
                        ipd: next_ipd,
                        mqtt: next_mqtt,
                    };
                }
                None
            } else if armed {
                // Mismatch. Reveal the withheld prefix, then classify the byte
                // again from a clean position.
                let withheld = if matched_ipd >= matched_mqtt {
                    &IPD_MARKER[..matched_ipd]
                } else {
                    &MQTT_MARKER[..matched_mqtt]
                };
                for &withheld_byte in withheld {
                    push_resp(rx, withheld_byte);
                }
                rx.mode = RxMode::resp();
                Some(byte)
            } else {
                push_resp(rx, byte);
                None
            }
        }
        RxMode::MqttTopic { topic } => {
            if byte == b',' {
                let slot = select_slot(state, trim_quotes(topic));
                rx.mode = RxMode::DataLen {
                    dest: PayloadDest::Mqtt(slot),
                    digits: Vec::new(),
                };
                None
            } else if topic.push(byte).is_err() {
                // Longer than any topic a slot can hold, so this cannot be a
                // delivery for us. Drop the frame and resync.
                rx.mode = RxMode::resp();
                Some(byte)
            } else {
                None
            }
        }
        RxMode::DataLen { dest, digits } => {
            let dest = *dest;
            let terminator = match dest {
                PayloadDest::Tcp => b':',
                PayloadDest::Mqtt(_) => b',',
            };

            if byte == terminator {
                match parse_length(digits) {
                    Some(0) => {
                        finish_frame(state, dest, 0);
                        rx.mode = RxMode::resp();
                        None
                    }
                    Some(declared) => {
                        rx.mode = RxMode::Data {
                            dest,
                            declared,
                            consumed: 0,
                            stored: 0,
                        };
                        None
                    }
                    None => {
                        rx.mode = RxMode::resp();
                        Some(byte)
                    }
                }
            } else if byte.is_ascii_digit() && digits.push(byte).is_ok() {
                None
            } else {
                // Not a plausible length field, treat the frame start as noise.
                rx.mode = RxMode::resp();
                Some(byte)
            }
        }
        RxMode::Data {
            dest,
            declared,
            consumed,
            stored,
        } => {
            let dest = *dest;
            let declared = *declared;
            *consumed += 1;

            let fits = match dest {
                PayloadDest::Tcp => state.data.lock(|data| data.borrow_mut().ring.push(byte).is_ok()),
                PayloadDest::Mqtt(Some(index)) => {
                    state.slots[index].lock(|slot| slot.borrow_mut().ring.push(byte).is_ok())
                }
                PayloadDest::Mqtt(None) => false,
            };

            if fits {
                *stored += 1;
            } else if dest != PayloadDest::Mqtt(None) {
                rx.overflow = rx.overflow.saturating_add(1);
            }

            // Consumed counting continues across dropped bytes, so the stream
            // resyncs at the announced frame end even after an overflow.
            if *consumed == declared {
                let stored = *stored;
                finish_frame(state, dest, stored);
                rx.mode = RxMode::resp();
            }
            None
        }
    }
}

fn push_resp<const N: usize>(rx: &mut RxCore<N>, byte: u8) {
    if rx.ring.push(byte).is_err() {
        rx.overflow = rx.overflow.saturating_add(1);
    }
}

fn trim_quotes(topic: &[u8]) -> &[u8] {
    topic
        .strip_prefix(b"\"")
        .and_then(|inner| inner.strip_suffix(b"\""))
        .unwrap_or(topic)
}

/// First slot subscribed to `topic` that can still queue a message.
fn select_slot<
    const RESP_SIZE: usize,
    const TX_SIZE: usize,
    const DATA_SIZE: usize,
    const SLOTS: usize,
    const SLOT_SIZE: usize,
>(
    state: &AtState<RESP_SIZE, TX_SIZE, DATA_SIZE, SLOTS, SLOT_SIZE>,
    topic: &[u8],
) -> Option<usize> {
    for (index, cell) in state.slots.iter().enumerate() {
        let hit = cell.lock(|slot| {
            let slot = slot.borrow();
            !slot.topic.is_empty() && slot.topic.as_bytes() == topic && !slot.pending.is_full()
        });
        if hit {
            return Some(index);
        }
    }
    None
}

/// Completes a frame by queueing the stored byte count on the MQTT slot.
fn finish_frame<
    const RESP_SIZE: usize,
    const TX_SIZE: usize,
    const DATA_SIZE: usize,
    const SLOTS: usize,
    const SLOT_SIZE: usize,
>(
    state: &AtState<RESP_SIZE, TX_SIZE, DATA_SIZE, SLOTS, SLOT_SIZE>,
    dest: PayloadDest,
    stored: usize,
) {
    if let PayloadDest::Mqtt(Some(index)) = dest {
        state.slots[index].lock(|slot| {
            let mut slot = slot.borrow_mut();
            if slot.ring.len() < stored {
                // The slot was re-armed while this frame was inbound. The bytes
                // left in the ring are a fragment of it, drop them.
                slot.ring.clear();
            } else {
                // Queue space was checked when the slot was picked and only the
                // classifier adds entries, so this cannot fail.
                let _ = slot.pending.push_back(stored);
            }
        });
    }
}

fn parse_length(digits: &[u8]) -> Option<usize> {
    if digits.is_empty() {
        return None;
    }
    let mut value: usize = 0;
    for &digit in digits {
        value = value * 10 + usize::from(digit - b'0');
        if value > DATA_LENGTH_MAX {
            return None;
        }
    }
    Some(value)
}
