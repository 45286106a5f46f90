//! Structured views on raw command responses.
//!
//! The modem answers with loosely formatted text. Extraction here is
//! deliberately forgiving: a key string is located, the value runs up to the
//! next delimiter, and anything that does not parse simply yields `None`. A
//! response with a missing field is still a successful transaction.
use core::net::Ipv4Addr;
use core::str::FromStr;

use heapless::{String, Vec};

/// Longest firmware version string that is retained.
pub const VERSION_LENGTH_MAX: usize = 32;

/// String length of a MAC address, `aa:bb:cc:dd:ee:ff`.
pub const MAC_LENGTH: usize = 17;

/// Longest DNS or SNTP server name that is retained.
pub const SERVER_LENGTH_MAX: usize = 64;

const WEEKDAYS: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];
const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Position of `token` in a name table, `None` for unknown names.
fn table_index(table: &[&str], token: &str) -> Option<u8> {
    table.iter().position(|&name| name == token).map(|index| index as u8)
}

/// Local addresses reported by `AT+CIFSR`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LocalAddress {
    /// Local IPv4 address, if the station got one
    pub ipv4: Option<Ipv4Addr>,
    /// Local MAC address
    pub mac: Option<String<MAC_LENGTH>>,
}

impl LocalAddress {
    pub(crate) fn from_response(response: &[u8]) -> Self {
        Self {
            ipv4: extract(response, b"STAIP,\"", b"\"")
                .and_then(|span| core::str::from_utf8(span).ok())
                .and_then(|text| Ipv4Addr::from_str(text).ok()),
            mac: extract(response, b"STAMAC,\"", b"\"").and_then(copy_str),
        }
    }
}

/// DNS resolver configuration reported by `AT+CIPDNS?`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DnsConfig {
    /// True if manually configured servers are in use
    pub enabled: bool,
    /// Configured resolver addresses
    pub servers: Vec<String<SERVER_LENGTH_MAX>, 3>,
}

impl DnsConfig {
    pub(crate) fn from_response(response: &[u8]) -> Option<Self> {
        let line = extract(response, b"+CIPDNS:", b"\r")?;
        Some(Self {
            enabled: line.first() == Some(&b'1'),
            servers: quoted_values(line),
        })
    }
}

/// SNTP configuration reported by `AT+CIPSNTPCFG?`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SntpConfig {
    /// True if SNTP synchronization is enabled
    pub enabled: bool,
    /// Timezone offset in hours, -12 to 14
    pub timezone: i16,
    /// Configured time servers
    pub servers: Vec<String<SERVER_LENGTH_MAX>, 3>,
}

impl SntpConfig {
    pub(crate) fn from_response(response: &[u8]) -> Option<Self> {
        let line = extract(response, b"+CIPSNTPCFG:", b"\r")?;
        let mut fields = line.splitn(3, |&byte| byte == b',');

        let enabled = fields.next()? == b"1";
        let timezone = fields
            .next()
            .and_then(|span| core::str::from_utf8(span).ok())
            .and_then(|text| i16::from_str(text).ok())?;

        Some(Self {
            enabled,
            timezone,
            servers: quoted_values(fields.next().unwrap_or_default()),
        })
    }
}

/// Wall time reported by `AT+CIPSNTPTIME?`, broken into calendar fields.
///
/// The modem reports `asctime` style text like `Thu Aug  4 14:31:40 2022`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SntpTime {
    /// Day of the week, 0 is Sunday
    pub weekday: u8,
    /// Month, 1 to 12
    pub month: u8,
    /// Day of the month
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub year: u16,
}

impl SntpTime {
    pub(crate) fn from_response(response: &[u8]) -> Option<Self> {
        let line = extract(response, b"+CIPSNTPTIME:", b"\r")?;
        let text = core::str::from_utf8(line).ok()?;
        let mut tokens = text.split_ascii_whitespace();

        let weekday = table_index(&WEEKDAYS, tokens.next()?)?;
        let month = table_index(&MONTHS, tokens.next()?)? + 1;
        let day = u8::from_str(tokens.next()?).ok()?;

        let mut clock = tokens.next()?.split(':');
        let hour = u8::from_str(clock.next()?).ok()?;
        let minute = u8::from_str(clock.next()?).ok()?;
        let second = u8::from_str(clock.next()?).ok()?;

        let year = u16::from_str(tokens.next()?).ok()?;

        Some(Self {
            weekday,
            month,
            day,
            hour,
            minute,
            second,
            year,
        })
    }
}

/// Firmware version from the `AT+GMR` report, e.g. `1.2.0.0`.
pub(crate) fn version_from_response(response: &[u8]) -> Option<String<VERSION_LENGTH_MAX>> {
    extract(response, b"AT version:", b"(").and_then(copy_str)
}

/// Locates `key` and returns the span up to the first following delimiter byte.
pub(crate) fn extract<'a>(response: &'a [u8], key: &[u8], delimiters: &[u8]) -> Option<&'a [u8]> {
    let start = find(response, key)? + key.len();
    let tail = &response[start..];
    let end = tail
        .iter()
        .position(|byte| delimiters.contains(byte))
        .unwrap_or(tail.len());
    Some(&tail[..end])
}

pub(crate) fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    (0..=haystack.len() - needle.len()).find(|&offset| &haystack[offset..offset + needle.len()] == needle)
}

/// Collects all `"..."` quoted values of a line, truncated to the target capacity.
fn quoted_values(line: &[u8]) -> Vec<String<SERVER_LENGTH_MAX>, 3> {
    let mut values = Vec::new();
    let mut cursor = line;

    while let Some(open) = cursor.iter().position(|&byte| byte == b'"') {
        let tail = &cursor[open + 1..];
        let Some(close) = tail.iter().position(|&byte| byte == b'"') else {
            break;
        };
        if let Some(value) = copy_str(&tail[..close]) {
            if values.push(value).is_err() {
                break;
            }
        }
        cursor = &tail[close + 1..];
    }
    values
}

/// Copies a byte span into a string, truncated to the capacity.
fn copy_str<const N: usize>(span: &[u8]) -> Option<String<N>> {
    let span = &span[..span.len().min(N)];
    let text = core::str::from_utf8(span).ok()?;
    let mut copy = String::new();
    // Cannot fail, the span was cut to the capacity
    let _ = copy.push_str(text);
    Some(copy)
}
