use crate::engine::Esp8266At;
use crate::error::AtError;
use crate::mqtt::{MqttQos, MqttReceiver, MqttScheme};
use crate::tests::mock::{feed, MockSerial, MockTimer, TestState};
use crate::time::Budget;

#[test]
fn test_connect_sends_identity_and_connects() {
    let state = TestState::new();
    let mut serial = MockSerial::new(state.isr());
    serial.add_ok_exchange(b"AT+MQTTUSERCFG=0,1,\"client1\",\"user\",\"secret\",0,0,\"\"\r\n");
    serial.add_exchange(
        b"AT+MQTTCONN=0,\"10.0.0.2\",1883,0\r\n",
        b"+MQTTCONNECTED:0\r\n\r\nOK\r\n",
    );
    let mut link = Esp8266At::new(&state, serial, MockTimer::frozen()).unwrap();

    link.set_mqtt_credentials(MqttScheme::Tcp, "client1", "user", "secret")
        .unwrap();

    let mut budget = Budget::millis(10_000);
    link.mqtt_connect("10.0.0.2", 1883, false, &mut budget).unwrap();

    assert_eq!(
        "AT+MQTTUSERCFG=0,1,\"client1\",\"user\",\"secret\",0,0,\"\"\r\nAT+MQTTCONN=0,\"10.0.0.2\",1883,0\r\n",
        link.serial.sent_as_string()
    );
}

#[test]
fn test_connect_without_credentials_is_refused() {
    let state = TestState::new();
    let serial = MockSerial::new(state.isr());
    let mut link = Esp8266At::new(&state, serial, MockTimer::frozen()).unwrap();

    let mut budget = Budget::millis(10_000);
    assert_eq!(
        Err(AtError::InvalidArgument),
        link.mqtt_connect("10.0.0.2", 1883, false, &mut budget)
    );
    assert_eq!("", link.serial.sent_as_string());
}

#[test]
fn test_oversize_credentials_are_refused() {
    let state = TestState::new();
    let serial = MockSerial::new(state.isr());
    let mut link = Esp8266At::new(&state, serial, MockTimer::frozen()).unwrap();

    let long_id = "i".repeat(65);
    assert_eq!(
        Err(AtError::InvalidArgument),
        link.set_mqtt_credentials(MqttScheme::Tcp, &long_id, "user", "secret")
    );
}

#[test]
fn test_disconnect() {
    let state = TestState::new();
    let mut serial = MockSerial::new(state.isr());
    serial.add_ok_exchange(b"AT+MQTTCLEAN=0\r\n");
    let mut link = Esp8266At::new(&state, serial, MockTimer::frozen()).unwrap();

    let mut budget = Budget::millis(5_000);
    link.mqtt_disconnect(&mut budget).unwrap();
}

#[test]
fn test_publish() {
    let state = TestState::new();
    let mut serial = MockSerial::new(state.isr());
    serial.add_ok_exchange(b"AT+MQTTPUB=0,\"t1\",\"hello\",0,0\r\n");
    let mut link = Esp8266At::new(&state, serial, MockTimer::frozen()).unwrap();

    let mut budget = Budget::millis(5_000);
    link.mqtt_publish("t1", "hello", MqttQos::AtMostOnce, false, &mut budget)
        .unwrap();
}

#[test]
fn test_publish_rejects_an_empty_topic() {
    let state = TestState::new();
    let serial = MockSerial::new(state.isr());
    let mut link = Esp8266At::new(&state, serial, MockTimer::frozen()).unwrap();

    let mut budget = Budget::millis(5_000);
    assert_eq!(
        Err(AtError::InvalidArgument),
        link.mqtt_publish("", "hello", MqttQos::AtMostOnce, false, &mut budget)
    );
}

#[test]
fn test_publish_raw_runs_both_phases() {
    let state = TestState::new();
    let mut serial = MockSerial::new(state.isr());
    serial.add_exchange(b"AT+MQTTPUBRAW=0,\"t1\",3,1,0\r\n", b"\r\nOK\r\n>");
    serial.add_exchange(b"\x01\x02\x03", b"\r\n+MQTTPUB:OK\r\n");
    let mut link = Esp8266At::new(&state, serial, MockTimer::frozen()).unwrap();

    let mut budget = Budget::millis(5_000);
    link.mqtt_publish_raw("t1", &[1, 2, 3], MqttQos::AtLeastOnce, false, &mut budget)
        .unwrap();
}

#[test]
fn test_subscribe_arms_the_slot_before_the_command() {
    let state = TestState::new();
    let mut serial = MockSerial::new(state.isr());
    // A retained message races the subscription acknowledgement
    serial.add_exchange(
        b"AT+MQTTSUB=0,\"t1\",0\r\n",
        b"\r\nOK\r\n+MQTTSUBRECV:0,\"t1\",3,abc",
    );
    let mut link = Esp8266At::new(&state, serial, MockTimer::frozen()).unwrap();

    let mut budget = Budget::millis(5_000);
    link.mqtt_subscribe(0, "t1", MqttQos::AtMostOnce, &mut budget)
        .unwrap();

    assert_eq!("t1", link.subscription_topic(0).unwrap().unwrap().as_str());

    let mut receiver = MqttReceiver::claim(&state, 0, MockTimer::frozen()).unwrap();
    let mut buffer = [0u8; 16];
    assert_eq!(Ok(3), receiver.receive(&mut buffer, &mut budget));
    assert_eq!(b"abc", &buffer[..3]);
}

#[test]
fn test_subscribe_failure_restores_the_slot() {
    let state = TestState::new();
    let serial = MockSerial::new(state.isr());
    let mut link = Esp8266At::new(&state, serial, MockTimer::stepping(10)).unwrap();

    let mut budget = Budget::millis(50);
    assert_eq!(
        Err(AtError::Timeout),
        link.mqtt_subscribe(0, "t1", MqttQos::AtMostOnce, &mut budget)
    );

    // The modem never confirmed, the slot stays idle
    assert!(link.subscription_topic(0).unwrap().is_none());
}

#[test]
fn test_subscribe_rejects_invalid_arguments() {
    let state = TestState::new();
    let serial = MockSerial::new(state.isr());
    let mut link = Esp8266At::new(&state, serial, MockTimer::frozen()).unwrap();

    let mut budget = Budget::millis(5_000);
    assert_eq!(
        Err(AtError::InvalidArgument),
        link.mqtt_subscribe(2, "t1", MqttQos::AtMostOnce, &mut budget)
    );
    assert_eq!(
        Err(AtError::InvalidArgument),
        link.mqtt_subscribe(0, "", MqttQos::AtMostOnce, &mut budget)
    );
}

#[test]
fn test_unsubscribe_clears_the_slot() {
    let state = TestState::new();
    let mut serial = MockSerial::new(state.isr());
    serial.add_ok_exchange(b"AT+MQTTSUB=0,\"t1\",0\r\n");
    serial.add_ok_exchange(b"AT+MQTTUNSUB=0,\"t1\"\r\n");
    let mut link = Esp8266At::new(&state, serial, MockTimer::frozen()).unwrap();

    let mut budget = Budget::millis(5_000);
    link.mqtt_subscribe(0, "t1", MqttQos::AtMostOnce, &mut budget)
        .unwrap();
    feed(&state, b"+MQTTSUBRECV:0,\"t1\",3,abc");

    link.mqtt_unsubscribe(0, &mut budget).unwrap();

    assert!(link.subscription_topic(0).unwrap().is_none());

    // Buffered messages went with the subscription
    let mut receiver = MqttReceiver::claim(&state, 0, MockTimer::frozen()).unwrap();
    let mut buffer = [0u8; 16];
    let mut empty_budget = Budget::millis(0);
    assert_eq!(
        Err(AtError::Timeout),
        receiver.receive(&mut buffer, &mut empty_budget)
    );
}

#[test]
fn test_unsubscribe_idle_slot_is_refused() {
    let state = TestState::new();
    let serial = MockSerial::new(state.isr());
    let mut link = Esp8266At::new(&state, serial, MockTimer::frozen()).unwrap();

    let mut budget = Budget::millis(5_000);
    assert_eq!(
        Err(AtError::InvalidArgument),
        link.mqtt_unsubscribe(0, &mut budget)
    );
}

#[test]
fn test_subscription_list() {
    let state = TestState::new();
    let mut serial = MockSerial::new(state.isr());
    serial.add_exchange(b"AT+MQTTSUB?\r\n", b"+MQTTSUB:0,\"t1\",0\r\n\r\nOK\r\n");
    let mut link = Esp8266At::new(&state, serial, MockTimer::frozen()).unwrap();

    let mut budget = Budget::millis(5_000);
    let mut report = [0u8; 64];
    let length = link.mqtt_subscription_list(&mut report, &mut budget).unwrap();

    assert_eq!(b"+MQTTSUB:0,\"t1\",0\r\n\r\nOK\r\n", &report[..length]);
}

#[test]
fn test_subscription_list_overflow() {
    let state = TestState::new();
    let mut serial = MockSerial::new(state.isr());
    serial.add_exchange(b"AT+MQTTSUB?\r\n", b"+MQTTSUB:0,\"t1\",0\r\n\r\nOK\r\n");
    let mut link = Esp8266At::new(&state, serial, MockTimer::frozen()).unwrap();

    let mut budget = Budget::millis(5_000);
    let mut report = [0u8; 4];
    assert_eq!(
        Err(AtError::Overflow),
        link.mqtt_subscription_list(&mut report, &mut budget)
    );

    // What fit was still copied
    assert_eq!(b"+MQT", &report);
}

#[test]
fn test_receive_preserves_message_boundaries() {
    let state = TestState::new();
    state.slots[0].lock(|sub| {
        sub.borrow_mut().topic = heapless::String::try_from("t1").unwrap();
    });
    feed(&state, b"+MQTTSUBRECV:0,\"t1\",3,abc+MQTTSUBRECV:0,\"t1\",2,de");

    let mut receiver = MqttReceiver::claim(&state, 0, MockTimer::frozen()).unwrap();
    let mut buffer = [0u8; 16];
    let mut budget = Budget::millis(1_000);

    assert_eq!(Ok(3), receiver.receive(&mut buffer, &mut budget));
    assert_eq!(b"abc", &buffer[..3]);
    assert_eq!(Ok(2), receiver.receive(&mut buffer, &mut budget));
    assert_eq!(b"de", &buffer[..2]);
}

#[test]
fn test_receive_truncates_oversize_messages() {
    let state = TestState::new();
    state.slots[0].lock(|sub| {
        sub.borrow_mut().topic = heapless::String::try_from("t1").unwrap();
    });
    feed(&state, b"+MQTTSUBRECV:0,\"t1\",5,hello+MQTTSUBRECV:0,\"t1\",2,ok");

    let mut receiver = MqttReceiver::claim(&state, 0, MockTimer::frozen()).unwrap();
    let mut buffer = [0u8; 3];
    let mut budget = Budget::millis(1_000);

    assert_eq!(
        Err(AtError::Overflow),
        receiver.receive(&mut buffer, &mut budget)
    );
    assert_eq!(b"hel", &buffer);

    // The truncated remainder was discarded, the next message is intact
    assert_eq!(Ok(2), receiver.receive(&mut buffer, &mut budget));
    assert_eq!(b"ok", &buffer[..2]);
}

#[test]
fn test_receive_rejects_a_message_lost_to_a_resubscribe() {
    let state = TestState::new();
    state.slots[0].lock(|sub| {
        sub.borrow_mut().topic = heapless::String::try_from("t1").unwrap();
    });
    feed(&state, b"+MQTTSUBRECV:0,\"t1\",5,hello");

    // A re-subscription clears the ring while the announcement stays queued
    state.slots[0].lock(|sub| sub.borrow_mut().ring.clear());

    let mut receiver = MqttReceiver::claim(&state, 0, MockTimer::frozen()).unwrap();
    let mut buffer = [0xaa; 16];
    let mut budget = Budget::millis(1_000);

    assert_eq!(
        Err(AtError::InvalidResponse),
        receiver.receive(&mut buffer, &mut budget)
    );
}

#[test]
fn test_receive_times_out_without_a_message() {
    let state = TestState::new();

    let mut receiver = MqttReceiver::claim(&state, 0, MockTimer::stepping(10)).unwrap();
    let mut buffer = [0u8; 16];
    let mut budget = Budget::millis(50);

    assert_eq!(
        Err(AtError::Timeout),
        receiver.receive(&mut buffer, &mut budget)
    );
    assert!(budget.is_exhausted());
}

#[test]
fn test_receiver_claim_is_exclusive_per_slot() {
    let state = TestState::new();

    let receiver = MqttReceiver::claim(&state, 0, MockTimer::frozen()).unwrap();
    assert!(matches!(
        MqttReceiver::claim(&state, 0, MockTimer::frozen()),
        Err(AtError::Busy)
    ));

    // A different slot is unaffected
    MqttReceiver::claim(&state, 1, MockTimer::frozen()).unwrap();

    receiver.release();
    MqttReceiver::claim(&state, 0, MockTimer::frozen()).unwrap();
}

#[test]
fn test_receiver_claim_rejects_invalid_slots() {
    let state = TestState::new();
    assert!(matches!(
        MqttReceiver::claim(&state, 2, MockTimer::frozen()),
        Err(AtError::InvalidArgument)
    ));
}
