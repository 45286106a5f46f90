//! Mocks for doc examples
//!
//! [`ExampleSerial`] plays a canned modem: every completed command line is
//! answered with a plausible ESP-AT response, payload uploads are echoed back
//! as an inbound `+IPD` frame and a subscribe is followed by one `+MQTTSUBRECV`
//! delivery. [`ExampleTimer`] completes every delay immediately and advances
//! its clock by one millisecond per query.
use core::fmt::Write;

use fugit::{TimerDurationU32, TimerInstantU32};
use fugit_timer::Timer;
use heapless::{String, Vec};

use crate::ingress::DATA_LENGTH_MAX;
use crate::io::SerialHardware;
use crate::state::{AtIsr, AtState};

/// State sizing used by the doc examples.
pub type ExampleState = AtState<2048, 512, 2048, 4, 512>;

/// Matching interrupt handle.
pub type ExampleIsr<'a> = AtIsr<'a, 2048, 512, 2048, 4, 512>;

enum Upload {
    Idle,
    /// Collecting `AT+CIPSEND` payload, echoed back as an `+IPD` frame
    Tcp,
    /// Collecting `AT+MQTTPUBRAW` payload
    Mqtt,
}

/// Serial device mock wired directly to the interrupt handle.
///
/// Transmissions complete instantly and chain through
/// [`AtIsr::tx_complete`], responses are injected through [`AtIsr::rx_byte`]
/// before the call returns.
pub struct ExampleSerial<'a> {
    isr: ExampleIsr<'a>,
    line: Vec<u8, 300>,
    upload: Upload,
    upload_remaining: usize,
    upload_data: Vec<u8, DATA_LENGTH_MAX>,
}

impl<'a> ExampleSerial<'a> {
    pub fn new(isr: ExampleIsr<'a>) -> Self {
        Self {
            isr,
            line: Vec::new(),
            upload: Upload::Idle,
            upload_remaining: 0,
            upload_data: Vec::new(),
        }
    }

    fn inject(&self, response: &[u8]) {
        for &byte in response {
            self.isr.rx_byte(byte);
        }
    }

    fn consume(&mut self, byte: u8) {
        if self.upload_remaining > 0 {
            self.upload_remaining -= 1;
            let _ = self.upload_data.push(byte);
            if self.upload_remaining == 0 {
                self.finish_upload();
            }
            return;
        }

        let _ = self.line.push(byte);
        if self.line.ends_with(b"\r\n") {
            let line = core::mem::take(&mut self.line);
            self.respond(line.as_slice());
        }
    }

    fn finish_upload(&mut self) {
        match self.upload {
            Upload::Idle => {}
            Upload::Tcp => {
                self.inject(b"\r\nSEND OK\r\n");
                let mut header: String<16> = String::new();
                let _ = write!(header, "+IPD,{}:", self.upload_data.len());
                self.inject(header.as_bytes());
                let echo = core::mem::take(&mut self.upload_data);
                self.inject(echo.as_slice());
            }
            Upload::Mqtt => self.inject(b"\r\n+MQTTPUB:OK\r\n"),
        }
        self.upload = Upload::Idle;
        self.upload_data.clear();
    }

    fn respond(&mut self, line: &[u8]) {
        if line.starts_with(b"AT+CIPSEND=") {
            self.upload = Upload::Tcp;
            self.upload_remaining = digits_after(line, b"=");
            self.upload_data.clear();
            self.inject(b"\r\nOK\r\n>");
            return;
        }
        if line.starts_with(b"AT+MQTTPUBRAW=") {
            self.upload = Upload::Mqtt;
            self.upload_remaining = digits_after(line, b"\",");
            self.upload_data.clear();
            self.inject(b"\r\nOK\r\n>");
            return;
        }
        if line.starts_with(b"AT+MQTTSUB=") {
            self.inject(b"\r\nOK\r\n");

            // One delivery for the topic that was just subscribed
            let topic = core::str::from_utf8(quoted(line)).unwrap_or("t1");
            let mut delivery: String<96> = String::new();
            let _ = write!(delivery, "+MQTTSUBRECV:0,\"{}\",3,", topic);
            self.inject(delivery.as_bytes());
            self.inject(b"abc");
            return;
        }

        match line {
            b"AT+GMR\r\n" => self.inject(
                b"AT version:1.2.0.0(Jul  1 2016 20:04:45)\r\nSDK version:1.5.4.1(39cb9a32)\r\n\r\nOK\r\n",
            ),
            b"AT+CIFSR\r\n" => self.inject(
                b"+CIFSR:STAIP,\"10.0.0.181\"\r\n+CIFSR:STAMAC,\"10:fe:ed:05:ba:50\"\r\n\r\nOK\r\n",
            ),
            b"AT+CIPDNS?\r\n" => self.inject(b"+CIPDNS:1,\"8.8.8.8\"\r\n\r\nOK\r\n"),
            b"AT+CIPSNTPCFG?\r\n" => self.inject(b"+CIPSNTPCFG:1,8,\"cn.ntp.org.cn\"\r\n\r\nOK\r\n"),
            b"AT+CIPSNTPTIME?\r\n" => self.inject(b"+CIPSNTPTIME:Thu Aug  4 14:31:40 2022\r\n\r\nOK\r\n"),
            b"AT+MQTTSUB?\r\n" => self.inject(b"+MQTTSUB:0,\"t1\",0\r\n\r\nOK\r\n"),
            line if line.starts_with(b"AT+CWJAP=") => {
                self.inject(b"WIFI CONNECTED\r\nWIFI GOT IP\r\n\r\nOK\r\n")
            }
            line if line.starts_with(b"AT+CIPSTART=") => self.inject(b"CONNECT\r\n\r\nOK\r\n"),
            b"AT+CIPCLOSE\r\n" => self.inject(b"CLOSED\r\n\r\nOK\r\n"),
            line if line.starts_with(b"AT+MQTTCONN=") => {
                self.inject(b"+MQTTCONNECTED:0\r\n\r\nOK\r\n")
            }
            // Everything else is acknowledged without further ceremony
            _ => self.inject(b"\r\nOK\r\n"),
        }
    }
}

impl SerialHardware for ExampleSerial<'_> {
    type Error = u32;

    fn transmit(&mut self, byte: u8) -> Result<(), Self::Error> {
        let mut current = byte;
        loop {
            self.consume(current);
            match self.isr.tx_complete() {
                Some(next) => current = next,
                None => return Ok(()),
            }
        }
    }

    fn reset(&mut self) -> Result<(), Self::Error> {
        self.line.clear();
        self.upload = Upload::Idle;
        self.upload_remaining = 0;
        self.upload_data.clear();
        Ok(())
    }
}

/// First decimal number after `key`.
fn digits_after(line: &[u8], key: &[u8]) -> usize {
    let Some(position) = line.windows(key.len()).position(|window| window == key) else {
        return 0;
    };
    let mut value = 0;
    for &byte in &line[position + key.len()..] {
        if !byte.is_ascii_digit() {
            break;
        }
        value = value * 10 + usize::from(byte - b'0');
    }
    value
}

/// First `"..."` quoted span.
fn quoted(line: &[u8]) -> &[u8] {
    let Some(open) = line.iter().position(|&byte| byte == b'"') else {
        return b"";
    };
    let tail = &line[open + 1..];
    match tail.iter().position(|&byte| byte == b'"') {
        Some(close) => &tail[..close],
        None => b"",
    }
}

/// Timer mock advancing one millisecond per query, completing delays instantly.
#[derive(Default)]
pub struct ExampleTimer {
    now_ms: u32,
}

impl Timer<1_000_000> for ExampleTimer {
    type Error = u32;

    fn now(&mut self) -> TimerInstantU32<1_000_000> {
        self.now_ms = self.now_ms.wrapping_add(1);
        TimerInstantU32::from_ticks(self.now_ms.wrapping_mul(1_000))
    }

    fn start(&mut self, _duration: TimerDurationU32<1_000_000>) -> Result<(), Self::Error> {
        Ok(())
    }

    fn cancel(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn wait(&mut self) -> nb::Result<(), Self::Error> {
        Ok(())
    }
}
