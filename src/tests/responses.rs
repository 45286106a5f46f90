use crate::responses::{
    extract, find, version_from_response, DnsConfig, LocalAddress, SntpConfig, SntpTime,
};

const GMR_RESPONSE: &[u8] =
    b"AT version:1.2.0.0(Jul  1 2016 20:04:45)\r\nSDK version:1.5.4.1(39cb9a32)\r\n\r\nOK\r\n";

const CIFSR_RESPONSE: &[u8] =
    b"+CIFSR:STAIP,\"10.0.0.181\"\r\n+CIFSR:STAMAC,\"10:fe:ed:05:ba:50\"\r\n\r\nOK\r\n";

#[test]
fn test_version_extraction() {
    assert_eq!(
        "1.2.0.0",
        version_from_response(GMR_RESPONSE).unwrap().as_str()
    );
}

#[test]
fn test_version_missing_key() {
    assert!(version_from_response(b"ERROR\r\n").is_none());
}

#[test]
fn test_local_address() {
    let address = LocalAddress::from_response(CIFSR_RESPONSE);

    assert_eq!("10.0.0.181", address.ipv4.unwrap().to_string());
    assert_eq!("10:fe:ed:05:ba:50", address.mac.unwrap().as_str());
}

#[test]
fn test_local_address_without_ip() {
    let address =
        LocalAddress::from_response(b"+CIFSR:STAMAC,\"10:fe:ed:05:ba:50\"\r\n\r\nOK\r\n");

    assert!(address.ipv4.is_none());
    assert_eq!("10:fe:ed:05:ba:50", address.mac.unwrap().as_str());
}

#[test]
fn test_local_address_with_malformed_ip() {
    let address = LocalAddress::from_response(b"+CIFSR:STAIP,\"not an ip\"\r\n\r\nOK\r\n");
    assert!(address.ipv4.is_none());
}

#[test]
fn test_dns_config() {
    let config =
        DnsConfig::from_response(b"+CIPDNS:1,\"8.8.8.8\",\"1.1.1.1\"\r\n\r\nOK\r\n").unwrap();

    assert!(config.enabled);
    assert_eq!(2, config.servers.len());
    assert_eq!("8.8.8.8", config.servers[0].as_str());
    assert_eq!("1.1.1.1", config.servers[1].as_str());
}

#[test]
fn test_dns_config_defaults() {
    let config = DnsConfig::from_response(b"+CIPDNS:0\r\n\r\nOK\r\n").unwrap();

    assert!(!config.enabled);
    assert!(config.servers.is_empty());
}

#[test]
fn test_dns_config_missing_report() {
    assert!(DnsConfig::from_response(b"\r\nOK\r\n").is_none());
}

#[test]
fn test_sntp_config() {
    let config =
        SntpConfig::from_response(b"+CIPSNTPCFG:1,8,\"cn.ntp.org.cn\"\r\n\r\nOK\r\n").unwrap();

    assert!(config.enabled);
    assert_eq!(8, config.timezone);
    assert_eq!(1, config.servers.len());
    assert_eq!("cn.ntp.org.cn", config.servers[0].as_str());
}

#[test]
fn test_sntp_config_negative_timezone() {
    let config = SntpConfig::from_response(b"+CIPSNTPCFG:0,-11\r\n\r\nOK\r\n").unwrap();

    assert!(!config.enabled);
    assert_eq!(-11, config.timezone);
    assert!(config.servers.is_empty());
}

#[test]
fn test_sntp_time() {
    let time =
        SntpTime::from_response(b"+CIPSNTPTIME:Thu Aug  4 14:31:40 2022\r\n\r\nOK\r\n").unwrap();

    assert_eq!(4, time.weekday);
    assert_eq!(8, time.month);
    assert_eq!(4, time.day);
    assert_eq!(14, time.hour);
    assert_eq!(31, time.minute);
    assert_eq!(40, time.second);
    assert_eq!(2022, time.year);
}

#[test]
fn test_sntp_time_unknown_weekday() {
    assert!(SntpTime::from_response(b"+CIPSNTPTIME:Xxx Aug  4 14:31:40 2022\r\n").is_none());
}

#[test]
fn test_sntp_time_truncated() {
    assert!(SntpTime::from_response(b"+CIPSNTPTIME:Thu Aug  4\r\n").is_none());
}

#[test]
fn test_extract_brackets() {
    assert_eq!(
        Some(b"value".as_slice()),
        extract(b"key:value,rest", b"key:", b",")
    );

    // Runs to the end when no delimiter follows
    assert_eq!(Some(b"value".as_slice()), extract(b"key:value", b"key:", b","));

    // Any of the delimiter bytes closes the span
    assert_eq!(
        Some(b"value".as_slice()),
        extract(b"key:value(detail)", b"key:", b"(,")
    );

    assert_eq!(None, extract(b"other:value", b"key:", b","));
}

#[test]
fn test_find_subslice() {
    assert_eq!(Some(0), find(b"abc", b"abc"));
    assert_eq!(Some(3), find(b"xyzabc", b"abc"));
    assert_eq!(None, find(b"ab", b"abc"));
    assert_eq!(None, find(b"abc", b""));
}
