//! Transactions from many threads never interleave on the wire.

mod common;

use common::{Recorder, mock_bus, wait_until};
use grove_io::devices::generic::{AnalogueRead, DigitalRead, DigitalWrite, Level};
use grove_io::devices::{actuators, sensors};
use grove_io::transport::TransportEvent;
use grove_io::{Error, PortKind, PortLabel, Unit};
use std::sync::Barrier;
use std::thread;
use std::time::Duration;

#[test]
fn test_transactions_are_atomic() {
    let (bus, mock) = mock_bus();
    mock.set_response(3, 0, &[0x01, 0x00]);
    mock.set_response(3, 1, &[0x02, 0x00]);
    mock.set_latency(Duration::from_micros(200));

    let dial_unit = Unit::input("Dial", &[PortKind::Analogue], Duration::from_millis(20));
    let a0 = bus
        .connect_input(PortLabel::A0, dial_unit.clone(), AnalogueRead::default())
        .unwrap();
    let a1 = bus
        .connect_input(PortLabel::A1, dial_unit, AnalogueRead::default())
        .unwrap();
    let switch = bus
        .connect_input(
            PortLabel::D2,
            Unit::input("Switch", &[PortKind::Digital], Duration::from_millis(2)),
            DigitalRead,
        )
        .unwrap();
    let relay = bus
        .connect_output(PortLabel::D3, Unit::output("Relay", &[PortKind::Digital]), DigitalWrite)
        .unwrap();

    // Background scanning runs alongside the callers below
    let recorder = Recorder::<Level>::new();
    switch.add_listener(&recorder).unwrap();
    assert!(wait_until(|| recorder.count() == 1));

    thread::scope(|s| {
        s.spawn(|| {
            for _ in 0..20 {
                assert_eq!(a0.read_value().unwrap(), 256);
            }
        });
        s.spawn(|| {
            for _ in 0..20 {
                assert_eq!(a1.read_value().unwrap(), 512);
            }
        });
        s.spawn(|| {
            for i in 0..20 {
                relay.write_value(&Level::from(i % 2 == 0)).unwrap();
            }
        });
    });
    switch.remove_listener(&recorder).unwrap();

    let events = mock.events();
    let mut frames = 0;
    for (i, event) in events.iter().enumerate() {
        let TransportEvent::Frame(frame) = event else {
            continue;
        };
        frames += 1;
        assert_eq!(
            i.checked_sub(1).map(|p| events[p]),
            Some(TransportEvent::Address(0x04)),
            "frame {:?} at {} not preceded by address selection",
            frame,
            i
        );
        let rest = &events[i + 1..];
        match frame[0] {
            1 => assert_eq!(rest.first(), Some(&TransportEvent::ReadByte)),
            3 => assert_eq!(
                rest.get(..2),
                Some(&[TransportEvent::ReadByte, TransportEvent::ReadBlock][..])
            ),
            _ => assert!(matches!(rest.first(), None | Some(TransportEvent::Address(_)))),
        }
    }
    assert!(frames >= 60);
    assert_eq!(mock.frame_count(2, 3), 20);
}

#[test]
fn test_concurrent_subscriptions_share_one_scan_item() {
    let (bus, mock) = mock_bus();
    mock.set_response(1, 7, &[1]);
    let switch = bus
        .connect_input(
            PortLabel::D7,
            Unit::input("Switch", &[PortKind::Digital], Duration::from_millis(5)),
            DigitalRead,
        )
        .unwrap();

    let recorders: Vec<_> = (0..8).map(|_| Recorder::<Level>::new()).collect();
    thread::scope(|s| {
        for recorder in &recorders {
            let switch = switch.clone();
            s.spawn(move || switch.add_listener(recorder).unwrap());
        }
    });

    assert_eq!(switch.listener_count(), 8);
    assert_eq!(bus.scanner().item_count(), 1);
    assert!(wait_until(|| recorders.iter().all(|r| r.count() >= 1)));

    thread::scope(|s| {
        for recorder in &recorders {
            let switch = switch.clone();
            s.spawn(move || switch.remove_listener(recorder).unwrap());
        }
    });
    assert_eq!(switch.listener_count(), 0);
    assert_eq!(bus.scanner().item_count(), 0);
}

#[test]
fn test_racing_connects_set_pin_mode_once() {
    for _ in 0..10 {
        let (bus, mock) = mock_bus();
        mock.set_latency(Duration::from_millis(5));
        let barrier = Barrier::new(2);

        let (input, output) = thread::scope(|s| {
            let input = s.spawn(|| {
                barrier.wait();
                let (unit, protocol) = sensors::momentary_button(sensors::BUTTON_SAMPLE_INTERVAL);
                bus.connect_input(PortLabel::D4, unit, protocol)
            });
            let output = s.spawn(|| {
                barrier.wait();
                let (unit, protocol) = actuators::buzzer();
                bus.connect_output(PortLabel::D4, unit, protocol)
            });
            (input.join().unwrap(), output.join().unwrap())
        });

        // Exactly one caller owns the port and its mode is the only one sent
        assert_ne!(input.is_ok(), output.is_ok());
        let loser_err = match (&input, &output) {
            (Err(e), _) | (_, Err(e)) => e,
            _ => unreachable!(),
        };
        assert!(matches!(loser_err, Error::PortOccupied(_)));

        let expected_mode = if input.is_ok() { 0 } else { 1 };
        let modes: Vec<u8> = mock
            .frames()
            .iter()
            .filter(|f| f[0] == 5 && f[1] == 4)
            .map(|f| f[2])
            .collect();
        assert_eq!(modes, vec![expected_mode]);
        assert_eq!(bus.connected_ports(), vec![PortLabel::D4.port_id()]);
    }
}
