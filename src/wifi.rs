//! # Modem management and WiFi access point client
//!
//! Bring-up commands, joining a network and obtaining address information.
//!
//! Note: If the connection was not successful or is lost, the ESP-AT firmware will
//! retry independently from time to time (by default every second). A successful
//! `join` therefore only confirms that the modem accepted the credentials.
//!
//! ## Example
//!
//! ````
//! # use esp_at_link::engine::Esp8266At;
//! # use esp_at_link::example::{ExampleSerial, ExampleState, ExampleTimer};
//! # use esp_at_link::time::Budget;
//! # use esp_at_link::wifi::WifiMode;
//! #
//! let state = ExampleState::new();
//! let serial = ExampleSerial::new(state.isr());
//! let mut link = Esp8266At::new(&state, serial, ExampleTimer::default()).unwrap();
//! link.start().unwrap();
//!
//! let mut budget = Budget::millis(10_000);
//! link.set_wifi_mode(WifiMode::Station, &mut budget).unwrap();
//! link.join("test_wifi", "secret", &mut budget).unwrap();
//!
//! let address = link.local_address(&mut budget).unwrap();
//! assert_eq!("10:fe:ed:05:ba:50", address.mac.unwrap().as_str());
//! assert_eq!("10.0.0.181", address.ipv4.unwrap().to_string());
//! ````
use fugit_timer::Timer;
use heapless::String;

use crate::commands::{
    AccessPointJoinCommand, AccessPointQuitCommand, DnsQueryCommand, EchoCommand,
    FirmwareVersionCommand, LocalAddressCommand, MultiplexingCommand, RestartCommand,
    SetDnsCommand, SetSntpCommand, SntpQueryCommand, SntpTimeCommand, TestCommand,
    WifiModeCommand,
};
use crate::engine::Esp8266At;
use crate::error::AtError;
use crate::io::SerialHardware;
use crate::responses::{
    version_from_response, DnsConfig, LocalAddress, SntpConfig, SntpTime, VERSION_LENGTH_MAX,
};
use crate::time::Budget;

const SSID_LENGTH_MAX: usize = 32;
const PASSWORD_LENGTH_MAX: usize = 63;
const TIMEZONE_RANGE: core::ops::RangeInclusive<i16> = -12..=14;

/// WiFi operating mode
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WifiMode {
    /// WiFi RF disabled
    Null = 0,
    Station = 1,
    SoftAp = 2,
    /// SoftAP and station at the same time
    SoftApStation = 3,
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
    /// Basic communication check, `AT` answered with `OK`.
    pub fn at_test(&mut self, budget: &mut Budget) -> Result<(), AtError> {
        self.run(&TestCommand, budget)
    }

    /// Software restart of the modem.
    ///
    /// The classifier is resynced first in case the previous session died in the
    /// middle of a payload frame. After the response, the boot time of the modem
    /// is charged to the budget.
    pub fn restart(&mut self, budget: &mut Budget) -> Result<(), AtError> {
        self.resync();
        self.run(&RestartCommand, budget)?;
        let delay = self.delays.restart;
        self.settle(delay, budget)
    }

    /// The version reported by `AT+GMR`, e.g. `1.2.0.0`.
    ///
    /// `None` if the report had an unexpected shape.
    pub fn firmware_version(
        &mut self,
        budget: &mut Budget,
    ) -> Result<Option<String<VERSION_LENGTH_MAX>>, AtError> {
        self.run(&FirmwareVersionCommand, budget)?;
        Ok(version_from_response(self.response()))
    }

    /// Switches command echo on or off.
    pub fn set_echo(&mut self, enabled: bool, budget: &mut Budget) -> Result<(), AtError> {
        self.run(&EchoCommand { enabled }, budget)?;
        let delay = self.delays.echo;
        self.settle(delay, budget)
    }

    /// Sets the WiFi operating mode.
    pub fn set_wifi_mode(&mut self, mode: WifiMode, budget: &mut Budget) -> Result<(), AtError> {
        self.run(&WifiModeCommand { mode }, budget)?;
        let delay = self.delays.wifi_mode;
        self.settle(delay, budget)
    }

    /// Switches connection multiplexing. The engine itself drives a single
    /// connection, numbered links are only useful with [`Esp8266At::connect_indexed`].
    pub fn set_multiplexing(&mut self, enabled: bool, budget: &mut Budget) -> Result<(), AtError> {
        self.run(&MultiplexingCommand { enabled }, budget)?;
        let delay = self.delays.multiplexing;
        self.settle(delay, budget)
    }

    /// Joins a WiFi access point.
    ///
    /// The SSID is limited to 32 and the password to 63 characters.
    pub fn join(&mut self, ssid: &str, password: &str, budget: &mut Budget) -> Result<(), AtError> {
        if ssid.len() > SSID_LENGTH_MAX || password.len() > PASSWORD_LENGTH_MAX {
            return Err(AtError::InvalidArgument);
        }
        self.run(&AccessPointJoinCommand { ssid, password }, budget)
    }

    /// Leaves the current access point.
    pub fn quit_access_point(&mut self, budget: &mut Budget) -> Result<(), AtError> {
        self.run(&AccessPointQuitCommand, budget)?;
        let delay = self.delays.leave_ap;
        self.settle(delay, budget)
    }

    /// Local IP and MAC addresses. Fields the modem did not report are `None`.
    pub fn local_address(&mut self, budget: &mut Budget) -> Result<LocalAddress, AtError> {
        self.run(&LocalAddressCommand, budget)?;
        Ok(LocalAddress::from_response(self.response()))
    }

    /// DNS resolver configuration of the modem.
    pub fn dns_config(&mut self, budget: &mut Budget) -> Result<Option<DnsConfig>, AtError> {
        self.run(&DnsQueryCommand, budget)?;
        Ok(DnsConfig::from_response(self.response()))
    }

    /// Sets up to three manual DNS resolvers, or falls back to the defaults when
    /// `enabled` is false.
    pub fn set_dns_config(
        &mut self,
        enabled: bool,
        servers: &[&str],
        budget: &mut Budget,
    ) -> Result<(), AtError> {
        if servers.len() > 3 {
            return Err(AtError::InvalidArgument);
        }
        self.run(&SetDnsCommand { enabled, servers }, budget)
    }

    /// SNTP configuration of the modem.
    pub fn sntp_config(&mut self, budget: &mut Budget) -> Result<Option<SntpConfig>, AtError> {
        self.run(&SntpQueryCommand, budget)?;
        Ok(SntpConfig::from_response(self.response()))
    }

    /// Configures SNTP time synchronization.
    ///
    /// The timezone is an hour offset between -12 and 14, servers are optional
    /// and limited to three.
    pub fn set_sntp_config(
        &mut self,
        enabled: bool,
        timezone: i16,
        servers: &[&str],
        budget: &mut Budget,
    ) -> Result<(), AtError> {
        if !TIMEZONE_RANGE.contains(&timezone) || servers.len() > 3 {
            return Err(AtError::InvalidArgument);
        }
        self.run(
            &SetSntpCommand {
                enabled,
                timezone,
                servers,
            },
            budget,
        )
    }

    /// SNTP synchronized wall time, `None` while the modem has no time yet.
    pub fn sntp_time(&mut self, budget: &mut Budget) -> Result<Option<SntpTime>, AtError> {
        self.run(&SntpTimeCommand, budget)?;
        Ok(SntpTime::from_response(self.response()))
    }
}
