//! # MQTT client
//!
//! The command side wraps the `AT+MQTT...` family of recent ESP-AT firmware:
//! client identity, broker connection, publishing and subscription management.
//!
//! Deliveries arrive interleaved with everything else as `+MQTTSUBRECV` frames.
//! The classifier routes each delivery to the subscription slot matching its
//! topic, where complete messages queue up until the [`MqttReceiver`] holding
//! the slot drains them. Message boundaries are preserved, one [`MqttReceiver::receive`]
//! call yields exactly one message.
//!
//! ## Example
//!
//! ````
//! # use esp_at_link::engine::Esp8266At;
//! # use esp_at_link::example::{ExampleSerial, ExampleState, ExampleTimer};
//! # use esp_at_link::mqtt::{MqttQos, MqttReceiver, MqttScheme};
//! # use esp_at_link::time::Budget;
//! #
//! let state = ExampleState::new();
//! let serial = ExampleSerial::new(state.isr());
//! let mut link = Esp8266At::new(&state, serial, ExampleTimer::default()).unwrap();
//! link.start().unwrap();
//!
//! let mut budget = Budget::millis(10_000);
//! link.set_mqtt_credentials(MqttScheme::Tcp, "client1", "user", "secret").unwrap();
//! link.mqtt_connect("10.0.0.2", 1883, false, &mut budget).unwrap();
//! link.mqtt_subscribe(0, "t1", MqttQos::AtMostOnce, &mut budget).unwrap();
//!
//! // The example serial delivers one message for t1 right after subscribing
//! let mut receiver = MqttReceiver::claim(&state, 0, ExampleTimer::default()).unwrap();
//! let mut buffer = [0; 16];
//! let length = receiver.receive(&mut buffer, &mut budget).unwrap();
//! assert_eq!(b"abc", &buffer[..length]);
//! ````
use fugit_timer::Timer;
use heapless::String;

use crate::commands::{
    MqttConnectCommand, MqttDisconnectCommand, MqttPublishCommand, MqttPublishRawCommand,
    MqttSubscribeCommand, MqttSubscriptionListCommand, MqttUnsubscribeCommand,
    MqttUserConfigCommand, MQTT_PUBLISH_TERMINATOR,
};
use crate::engine::Esp8266At;
use crate::error::AtError;
use crate::ingress::DATA_LENGTH_MAX;
use crate::io::SerialHardware;
use crate::state::{AtState, Shared, SubSlot, TOPIC_LENGTH_MAX};
use crate::time::{Budget, Checkpoint};

/// Longest MQTT client id accepted by [`Esp8266At::set_mqtt_credentials`].
pub const CLIENT_ID_LENGTH_MAX: usize = 64;

/// Longest MQTT username or password accepted by [`Esp8266At::set_mqtt_credentials`].
pub const CREDENTIAL_LENGTH_MAX: usize = 64;

/// Connection scheme between modem and broker
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MqttScheme {
    /// Plain MQTT over TCP
    Tcp = 1,
}

/// Quality of service of a publish or subscription
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MqttQos {
    AtMostOnce = 0,
    AtLeastOnce = 1,
    ExactlyOnce = 2,
}

/// Client identity sent ahead of the broker connection.
#[derive(Clone)]
pub(crate) struct MqttCredentials {
    pub scheme: MqttScheme,
    pub client_id: String<CLIENT_ID_LENGTH_MAX>,
    pub username: String<CREDENTIAL_LENGTH_MAX>,
    pub password: String<CREDENTIAL_LENGTH_MAX>,
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
    /// Stores the client identity used by the next [`Esp8266At::mqtt_connect`].
    ///
    /// Nothing is sent yet, the identity travels with the connect call.
    pub fn set_mqtt_credentials(
        &mut self,
        scheme: MqttScheme,
        client_id: &str,
        username: &str,
        password: &str,
    ) -> Result<(), AtError> {
        self.mqtt_credentials = Some(MqttCredentials {
            scheme,
            client_id: String::try_from(client_id).map_err(|_| AtError::InvalidArgument)?,
            username: String::try_from(username).map_err(|_| AtError::InvalidArgument)?,
            password: String::try_from(password).map_err(|_| AtError::InvalidArgument)?,
        });
        Ok(())
    }

    /// Connects to an MQTT broker.
    ///
    /// Requires credentials, see [`Esp8266At::set_mqtt_credentials`]. With
    /// `reconnect` the modem re-establishes a lost connection on its own.
    pub fn mqtt_connect(
        &mut self,
        host: &str,
        port: u16,
        reconnect: bool,
        budget: &mut Budget,
    ) -> Result<(), AtError> {
        let credentials = self
            .mqtt_credentials
            .clone()
            .ok_or(AtError::InvalidArgument)?;

        self.run(
            &MqttUserConfigCommand {
                scheme: credentials.scheme,
                client_id: credentials.client_id.as_str(),
                username: credentials.username.as_str(),
                password: credentials.password.as_str(),
            },
            budget,
        )?;
        self.run(&MqttConnectCommand { host, port, reconnect }, budget)
    }

    /// Releases the MQTT connection.
    pub fn mqtt_disconnect(&mut self, budget: &mut Budget) -> Result<(), AtError> {
        self.run(&MqttDisconnectCommand, budget)
    }

    /// Publishes a string payload carried in the command line itself.
    ///
    /// For binary or longer payloads use [`Esp8266At::mqtt_publish_raw`].
    pub fn mqtt_publish(
        &mut self,
        topic: &str,
        payload: &str,
        qos: MqttQos,
        retain: bool,
        budget: &mut Budget,
    ) -> Result<(), AtError> {
        if topic.is_empty() || topic.len() > TOPIC_LENGTH_MAX {
            return Err(AtError::InvalidArgument);
        }
        self.run(
            &MqttPublishCommand {
                topic,
                payload,
                qos,
                retain,
            },
            budget,
        )
    }

    /// Publishes a binary payload through the two phase upload handshake.
    ///
    /// At most 2048 bytes per call.
    pub fn mqtt_publish_raw(
        &mut self,
        topic: &str,
        payload: &[u8],
        qos: MqttQos,
        retain: bool,
        budget: &mut Budget,
    ) -> Result<(), AtError> {
        if topic.is_empty() || topic.len() > TOPIC_LENGTH_MAX || payload.is_empty() {
            return Err(AtError::InvalidArgument);
        }
        if payload.len() > DATA_LENGTH_MAX {
            return Err(AtError::InvalidArgument);
        }

        self.run(
            &MqttPublishRawCommand {
                topic,
                length: payload.len(),
                qos,
                retain,
            },
            budget,
        )?;
        self.transact(payload, MQTT_PUBLISH_TERMINATOR, budget)
    }

    /// Subscribes a slot to a topic.
    ///
    /// The slot is armed before the command goes out: previously buffered
    /// traffic is dropped and deliveries matching the topic queue up on the
    /// slot. Deliveries racing the confirmation, e.g. retained messages, are
    /// therefore not lost. A slot holds one subscription, re-subscribing
    /// replaces it.
    pub fn mqtt_subscribe(
        &mut self,
        slot: usize,
        topic: &str,
        qos: MqttQos,
        budget: &mut Budget,
    ) -> Result<(), AtError> {
        let state = self.state;
        let cell = state.slots.get(slot).ok_or(AtError::InvalidArgument)?;
        if topic.is_empty() {
            return Err(AtError::InvalidArgument);
        }
        let stored: String<TOPIC_LENGTH_MAX> =
            String::try_from(topic).map_err(|_| AtError::InvalidArgument)?;

        let previous = cell.lock(|sub| {
            let mut sub = sub.borrow_mut();
            let previous = sub.topic.clone();
            sub.topic = stored;
            sub.ring.clear();
            sub.pending.clear();
            previous
        });

        if let Err(error) = self.run(&MqttSubscribeCommand { topic, qos }, budget) {
            // The modem kept its old subscription, put the slot back to match
            cell.lock(|sub| {
                let mut sub = sub.borrow_mut();
                sub.topic = previous;
                sub.ring.clear();
                sub.pending.clear();
            });
            return Err(error);
        }

        debug!("slot {} subscribed to {}", slot, topic);
        Ok(())
    }

    /// Drops the subscription of a slot and clears its buffered messages.
    pub fn mqtt_unsubscribe(&mut self, slot: usize, budget: &mut Budget) -> Result<(), AtError> {
        let state = self.state;
        let cell = state.slots.get(slot).ok_or(AtError::InvalidArgument)?;
        let topic: String<TOPIC_LENGTH_MAX> = cell.lock(|sub| sub.borrow().topic.clone());
        if topic.is_empty() {
            return Err(AtError::InvalidArgument);
        }

        self.run(&MqttUnsubscribeCommand { topic: topic.as_str() }, budget)?;

        cell.lock(|sub| sub.borrow_mut().reset());
        debug!("slot {} unsubscribed from {}", slot, topic.as_str());
        Ok(())
    }

    /// Queries the subscription list from the modem and copies the raw report.
    ///
    /// Returns the copied length, or [`AtError::Overflow`] if `out` was too
    /// small. The full report stays available via [`Esp8266At::response`].
    pub fn mqtt_subscription_list(
        &mut self,
        out: &mut [u8],
        budget: &mut Budget,
    ) -> Result<usize, AtError> {
        self.run(&MqttSubscriptionListCommand, budget)?;

        let response = self.response();
        let count = response.len().min(out.len());
        out[..count].copy_from_slice(&response[..count]);
        if response.len() > out.len() {
            return Err(AtError::Overflow);
        }
        Ok(count)
    }

    /// Topic a slot is subscribed to, `None` for an idle slot.
    pub fn subscription_topic(
        &self,
        slot: usize,
    ) -> Result<Option<String<TOPIC_LENGTH_MAX>>, AtError> {
        let cell = self.state.slots.get(slot).ok_or(AtError::InvalidArgument)?;
        let topic = cell.lock(|sub| sub.borrow().topic.clone());
        Ok((!topic.is_empty()).then_some(topic))
    }
}

/// Exclusive access to the message queue of one subscription slot.
///
/// Claim order is free: a slot may be claimed before or after subscribing its
/// topic. [`MqttReceiver::release`] gives the claim back.
pub struct MqttReceiver<'a, T: Timer<TIMER_HZ>, const TIMER_HZ: u32, const SLOT_SIZE: usize> {
    cell: &'a Shared<SubSlot<SLOT_SIZE>>,
    timer: T,
}

impl<'a, T: Timer<TIMER_HZ>, const TIMER_HZ: u32, const SLOT_SIZE: usize>
    MqttReceiver<'a, T, TIMER_HZ, SLOT_SIZE>
{
    /// Claims the subscription slot with the given index.
    ///
    /// Fails with [`AtError::Busy`] while another receiver holds the slot and
    /// with [`AtError::InvalidArgument`] for an index out of range.
    pub fn claim<
        const RESP_SIZE: usize,
        const TX_SIZE: usize,
        const DATA_SIZE: usize,
        const SLOTS: usize,
    >(
        state: &'a AtState<RESP_SIZE, TX_SIZE, DATA_SIZE, SLOTS, SLOT_SIZE>,
        slot: usize,
        timer: T,
    ) -> Result<Self, AtError> {
        let cell = state.slots.get(slot).ok_or(AtError::InvalidArgument)?;
        cell.lock(|sub| {
            let mut sub = sub.borrow_mut();
            if sub.claimed {
                return Err(AtError::Busy);
            }
            sub.claimed = true;
            Ok(())
        })?;

        Ok(Self { cell, timer })
    }

    /// Releases the claim and returns the timer.
    pub fn release(self) -> T {
        self.cell.lock(|sub| sub.borrow_mut().claimed = false);
        self.timer
    }

    /// Topic the slot is currently subscribed to, empty for an idle slot.
    pub fn topic(&self) -> String<TOPIC_LENGTH_MAX> {
        self.cell.lock(|sub| sub.borrow().topic.clone())
    }

    /// Waits for the next complete message and copies it into `buffer`.
    ///
    /// Returns the message length, which preserves the original message
    /// boundary. A message longer than `buffer` is truncated to the buffer, the
    /// rest is discarded and [`AtError::Overflow`] raised. No message within the
    /// budget raises [`AtError::Timeout`].
    ///
    /// A re-subscription racing this call may clear the slot after the message
    /// was announced but before its bytes were drained; the lost message
    /// surfaces as [`AtError::InvalidResponse`], never as stale buffer content.
    pub fn receive(&mut self, buffer: &mut [u8], budget: &mut Budget) -> Result<usize, AtError> {
        let mut checkpoint = Checkpoint::new(&mut self.timer);
        let length = loop {
            if let Some(length) = self.cell.lock(|sub| sub.borrow_mut().pending.pop_front()) {
                break length;
            }
            checkpoint.tick(&mut self.timer, budget);
            if budget.is_exhausted() {
                return Err(AtError::Timeout);
            }
        };

        let take = length.min(buffer.len());
        let drained = self.cell.lock(|sub| {
            let mut sub = sub.borrow_mut();
            let drained = sub.ring.drain(&mut buffer[..take]);
            for _ in take..length {
                sub.ring.pop();
            }
            drained
        });

        if drained < take {
            // The slot was re-armed between dequeue and drain
            return Err(AtError::InvalidResponse);
        }
        if length > buffer.len() {
            return Err(AtError::Overflow);
        }
        Ok(length)
    }
}
