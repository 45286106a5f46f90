//! AT command set of the engine.
//!
//! Each command renders its own line and names the response fragment that
//! completes it. Almost everything ends in `OK`, the two data upload commands
//! instead wait for the `>` prompt and get their payload acknowledged
//! separately.
use core::fmt::Write;
use heapless::String;

use crate::error::AtError;
use crate::mqtt::{MqttQos, MqttScheme};
use crate::tcp::TransportProtocol;
use crate::wifi::WifiMode;

/// Longest rendered command line the engine sends.
pub(crate) const COMMAND_LENGTH_MAX: usize = 256;

pub(crate) const OK_TERMINATOR: &[u8] = b"OK\r\n";
pub(crate) const PROMPT_TERMINATOR: &[u8] = b">";
pub(crate) const SEND_OK_TERMINATOR: &[u8] = b"SEND OK\r\n";
pub(crate) const MQTT_PUBLISH_TERMINATOR: &[u8] = b"+MQTTPUB:OK\r\n";

/// One renderable modem command.
pub(crate) trait AtCommand {
    /// Response fragment that completes the command.
    const TERMINATOR: &'static [u8] = OK_TERMINATOR;

    /// Renders the full command line including the trailing CRLF.
    fn render(&self) -> Result<String<COMMAND_LENGTH_MAX>, AtError>;
}

/// Arguments exceeding the line capacity surface as [`AtError::InvalidArgument`].
fn rendered(arguments: core::fmt::Arguments) -> Result<String<COMMAND_LENGTH_MAX>, AtError> {
    let mut line = String::new();
    line.write_fmt(arguments).map_err(|_| AtError::InvalidArgument)?;
    Ok(line)
}

/// Basic communication check
pub(crate) struct TestCommand;

impl AtCommand for TestCommand {
    fn render(&self) -> Result<String<COMMAND_LENGTH_MAX>, AtError> {
        rendered(format_args!("AT\r\n"))
    }
}

/// Software restart of the modem
pub(crate) struct RestartCommand;

impl AtCommand for RestartCommand {
    fn render(&self) -> Result<String<COMMAND_LENGTH_MAX>, AtError> {
        rendered(format_args!("AT+RST\r\n"))
    }
}

/// Queries the firmware version report
pub(crate) struct FirmwareVersionCommand;

impl AtCommand for FirmwareVersionCommand {
    fn render(&self) -> Result<String<COMMAND_LENGTH_MAX>, AtError> {
        rendered(format_args!("AT+GMR\r\n"))
    }
}

/// Switches command echo on or off
pub(crate) struct EchoCommand {
    pub enabled: bool,
}

impl AtCommand for EchoCommand {
    fn render(&self) -> Result<String<COMMAND_LENGTH_MAX>, AtError> {
        rendered(format_args!("ATE{}\r\n", u8::from(self.enabled)))
    }
}

/// Sets the WiFi mode
pub(crate) struct WifiModeCommand {
    pub mode: WifiMode,
}

impl AtCommand for WifiModeCommand {
    fn render(&self) -> Result<String<COMMAND_LENGTH_MAX>, AtError> {
        rendered(format_args!("AT+CWMODE={}\r\n", self.mode as u8))
    }
}

/// Joins an access point
pub(crate) struct AccessPointJoinCommand<'a> {
    pub ssid: &'a str,
    pub password: &'a str,
}

impl AtCommand for AccessPointJoinCommand<'_> {
    fn render(&self) -> Result<String<COMMAND_LENGTH_MAX>, AtError> {
        rendered(format_args!("AT+CWJAP=\"{}\",\"{}\"\r\n", self.ssid, self.password))
    }
}

/// Leaves the current access point
pub(crate) struct AccessPointQuitCommand;

impl AtCommand for AccessPointQuitCommand {
    fn render(&self) -> Result<String<COMMAND_LENGTH_MAX>, AtError> {
        rendered(format_args!("AT+CWQAP\r\n"))
    }
}

/// Queries the local IP and MAC addresses
pub(crate) struct LocalAddressCommand;

impl AtCommand for LocalAddressCommand {
    fn render(&self) -> Result<String<COMMAND_LENGTH_MAX>, AtError> {
        rendered(format_args!("AT+CIFSR\r\n"))
    }
}

/// Switches connection multiplexing
pub(crate) struct MultiplexingCommand {
    pub enabled: bool,
}

impl AtCommand for MultiplexingCommand {
    fn render(&self) -> Result<String<COMMAND_LENGTH_MAX>, AtError> {
        rendered(format_args!("AT+CIPMUX={}\r\n", u8::from(self.enabled)))
    }
}

/// Opens a TCP or UDP connection, optionally on a numbered link
pub(crate) struct ConnectCommand<'a> {
    pub link_id: Option<u8>,
    pub protocol: TransportProtocol,
    pub host: &'a str,
    pub port: u16,
}

impl AtCommand for ConnectCommand<'_> {
    fn render(&self) -> Result<String<COMMAND_LENGTH_MAX>, AtError> {
        match self.link_id {
            Some(link_id) => rendered(format_args!(
                "AT+CIPSTART={},\"{}\",\"{}\",{}\r\n",
                link_id,
                self.protocol.token(),
                self.host,
                self.port
            )),
            None => rendered(format_args!(
                "AT+CIPSTART=\"{}\",\"{}\",{}\r\n",
                self.protocol.token(),
                self.host,
                self.port
            )),
        }
    }
}

/// Closes the current connection
pub(crate) struct CloseCommand;

impl AtCommand for CloseCommand {
    fn render(&self) -> Result<String<COMMAND_LENGTH_MAX>, AtError> {
        rendered(format_args!("AT+CIPCLOSE\r\n"))
    }
}

/// Announces a payload upload and waits for the `>` prompt
pub(crate) struct SendPrepareCommand {
    pub length: usize,
}

impl AtCommand for SendPrepareCommand {
    const TERMINATOR: &'static [u8] = PROMPT_TERMINATOR;

    fn render(&self) -> Result<String<COMMAND_LENGTH_MAX>, AtError> {
        rendered(format_args!("AT+CIPSEND={}\r\n", self.length))
    }
}

/// Queries the DNS configuration
pub(crate) struct DnsQueryCommand;

impl AtCommand for DnsQueryCommand {
    fn render(&self) -> Result<String<COMMAND_LENGTH_MAX>, AtError> {
        rendered(format_args!("AT+CIPDNS?\r\n"))
    }
}

/// Sets the DNS configuration with up to three servers
pub(crate) struct SetDnsCommand<'a> {
    pub enabled: bool,
    pub servers: &'a [&'a str],
}

impl AtCommand for SetDnsCommand<'_> {
    fn render(&self) -> Result<String<COMMAND_LENGTH_MAX>, AtError> {
        let mut line = rendered(format_args!("AT+CIPDNS={}", u8::from(self.enabled)))?;
        for server in self.servers {
            write!(line, ",\"{}\"", server).map_err(|_| AtError::InvalidArgument)?;
        }
        line.push_str("\r\n").map_err(|_| AtError::InvalidArgument)?;
        Ok(line)
    }
}

/// Queries the SNTP configuration
pub(crate) struct SntpQueryCommand;

impl AtCommand for SntpQueryCommand {
    fn render(&self) -> Result<String<COMMAND_LENGTH_MAX>, AtError> {
        rendered(format_args!("AT+CIPSNTPCFG?\r\n"))
    }
}

/// Sets the SNTP configuration
pub(crate) struct SetSntpCommand<'a> {
    pub enabled: bool,
    pub timezone: i16,
    pub servers: &'a [&'a str],
}

impl AtCommand for SetSntpCommand<'_> {
    fn render(&self) -> Result<String<COMMAND_LENGTH_MAX>, AtError> {
        let mut line = rendered(format_args!(
            "AT+CIPSNTPCFG={},{}",
            u8::from(self.enabled),
            self.timezone
        ))?;
        for server in self.servers {
            write!(line, ",\"{}\"", server).map_err(|_| AtError::InvalidArgument)?;
        }
        line.push_str("\r\n").map_err(|_| AtError::InvalidArgument)?;
        Ok(line)
    }
}

/// Queries the SNTP synchronized wall time
pub(crate) struct SntpTimeCommand;

impl AtCommand for SntpTimeCommand {
    fn render(&self) -> Result<String<COMMAND_LENGTH_MAX>, AtError> {
        rendered(format_args!("AT+CIPSNTPTIME?\r\n"))
    }
}

/// Stores the MQTT client identity on the modem
pub(crate) struct MqttUserConfigCommand<'a> {
    pub scheme: MqttScheme,
    pub client_id: &'a str,
    pub username: &'a str,
    pub password: &'a str,
}

impl AtCommand for MqttUserConfigCommand<'_> {
    fn render(&self) -> Result<String<COMMAND_LENGTH_MAX>, AtError> {
        rendered(format_args!(
            "AT+MQTTUSERCFG=0,{},\"{}\",\"{}\",\"{}\",0,0,\"\"\r\n",
            self.scheme as u8,
            self.client_id,
            self.username,
            self.password
        ))
    }
}

/// Connects to an MQTT broker
pub(crate) struct MqttConnectCommand<'a> {
    pub host: &'a str,
    pub port: u16,
    pub reconnect: bool,
}

impl AtCommand for MqttConnectCommand<'_> {
    fn render(&self) -> Result<String<COMMAND_LENGTH_MAX>, AtError> {
        rendered(format_args!(
            "AT+MQTTCONN=0,\"{}\",{},{}\r\n",
            self.host,
            self.port,
            u8::from(self.reconnect)
        ))
    }
}

/// Releases the MQTT connection
pub(crate) struct MqttDisconnectCommand;

impl AtCommand for MqttDisconnectCommand {
    fn render(&self) -> Result<String<COMMAND_LENGTH_MAX>, AtError> {
        rendered(format_args!("AT+MQTTCLEAN=0\r\n"))
    }
}

/// Publishes a short string payload in the command line itself
pub(crate) struct MqttPublishCommand<'a> {
    pub topic: &'a str,
    pub payload: &'a str,
    pub qos: MqttQos,
    pub retain: bool,
}

impl AtCommand for MqttPublishCommand<'_> {
    fn render(&self) -> Result<String<COMMAND_LENGTH_MAX>, AtError> {
        rendered(format_args!(
            "AT+MQTTPUB=0,\"{}\",\"{}\",{},{}\r\n",
            self.topic,
            self.payload,
            self.qos as u8,
            u8::from(self.retain)
        ))
    }
}

/// Announces a binary publish and waits for the `>` prompt
pub(crate) struct MqttPublishRawCommand<'a> {
    pub topic: &'a str,
    pub length: usize,
    pub qos: MqttQos,
    pub retain: bool,
}

impl AtCommand for MqttPublishRawCommand<'_> {
    const TERMINATOR: &'static [u8] = PROMPT_TERMINATOR;

    fn render(&self) -> Result<String<COMMAND_LENGTH_MAX>, AtError> {
        rendered(format_args!(
            "AT+MQTTPUBRAW=0,\"{}\",{},{},{}\r\n",
            self.topic,
            self.length,
            self.qos as u8,
            u8::from(self.retain)
        ))
    }
}

/// Subscribes to a topic
pub(crate) struct MqttSubscribeCommand<'a> {
    pub topic: &'a str,
    pub qos: MqttQos,
}

impl AtCommand for MqttSubscribeCommand<'_> {
    fn render(&self) -> Result<String<COMMAND_LENGTH_MAX>, AtError> {
        rendered(format_args!(
            "AT+MQTTSUB=0,\"{}\",{}\r\n",
            self.topic,
            self.qos as u8
        ))
    }
}

/// Drops a subscription
pub(crate) struct MqttUnsubscribeCommand<'a> {
    pub topic: &'a str,
}

impl AtCommand for MqttUnsubscribeCommand<'_> {
    fn render(&self) -> Result<String<COMMAND_LENGTH_MAX>, AtError> {
        rendered(format_args!("AT+MQTTUNSUB=0,\"{}\"\r\n", self.topic))
    }
}

/// Queries the subscription list from the modem
pub(crate) struct MqttSubscriptionListCommand;

impl AtCommand for MqttSubscriptionListCommand {
    fn render(&self) -> Result<String<COMMAND_LENGTH_MAX>, AtError> {
        rendered(format_args!("AT+MQTTSUB?\r\n"))
    }
}
