//! End-to-end conversations over the in-memory transport.

use chainhost::frame;
use chainhost::message::{self, HandshakeStatus};
use chainhost::{
    Actuator, ActuatorGroup, Assignment, AssignmentKey, Command, DataUpdate, DescriptorInfo,
    DeviceFilter, DeviceStatus, DeviceStatusEvent, Error, HandshakeInfo, Host, HostConfig, Item,
    MemoryTransport, Mode, SetValue, UpdateItem, Version, VirtualDevice, CC_MAX_DEVICES,
};
use std::sync::{Arc, Mutex};

const URI: &str = "https://example.org/footex";

fn footswitch(random: u16, uri: Option<&str>) -> VirtualDevice {
    let actuator = |id: u8| Actuator {
        id,
        name: format!("Foot #{}", id + 1),
        supported_modes: Mode::TOGGLE | Mode::TRIGGER | Mode::OPTIONS,
        max_assignments: 1,
        assignments_count: 0,
    };
    VirtualDevice::new(
        HandshakeInfo {
            random,
            protocol: Version::new(0, 6, 0),
            firmware: Version::new(1, 0, 2),
            uri: uri.map(str::to_string),
        },
        DescriptorInfo {
            label: "Footex".into(),
            actuators: vec![actuator(0), actuator(1)],
            actuator_groups: vec![ActuatorGroup {
                id: 0,
                name: "Foot #1 + #2".into(),
                actuators_in_group: [0, 1],
            }],
            amount_of_pages: 1,
            enumeration_frame_item_count: 3,
            uri: None,
        },
    )
}

fn setup() -> (Host, MemoryTransport) {
    let probe = MemoryTransport::new();
    let host = Host::init(HostConfig::default(), probe.clone()).unwrap();
    (host, probe)
}

/// Run a device through handshake and descriptor; returns its id.
fn connect(host: &Host, probe: &MemoryTransport, device: &mut VirtualDevice) -> u8 {
    probe.inject(&device.handshake().unwrap());
    assert_eq!(host.poll().unwrap(), 1);

    let written = probe.take_written();
    assert_eq!(written.len(), 2, "ack and descriptor request");
    let id = device.accept_ack(&written[0]).unwrap().expect("handshake accepted");

    let (request, _) = frame::decode(&written[1]).unwrap();
    assert_eq!(request.command, Command::DevDescriptor);
    assert_eq!(request.address, id);
    assert!(request.payload.is_empty());

    probe.inject(&device.descriptor().unwrap());
    host.poll().unwrap();
    id
}

fn list_assignment(device_id: u8, items: usize) -> Assignment {
    Assignment {
        device_id,
        actuator_id: 0,
        label: "Preset".into(),
        value: 0.0,
        min: 0.0,
        max: items as f32 - 1.0,
        mode: Mode::OPTIONS,
        unit: "-".into(),
        list_items: (0..items).map(|i| Item::new(format!("preset {i}"), i as f32 * 10.0)).collect(),
        ..Assignment::default()
    }
}

#[test]
fn device_connects_and_is_reported() {
    let (host, probe) = setup();
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    host.on_device_status(move |e: &DeviceStatusEvent| sink.lock().unwrap().push(e.clone()));

    let mut device = footswitch(0x0101, None);
    let id = connect(&host, &probe, &mut device);

    let events = events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].device_id, id);
    assert_eq!(events[0].status, DeviceStatus::Connected);
    let descriptor = events[0].descriptor.as_ref().unwrap();
    assert_eq!(descriptor.label.as_deref(), Some("Footex"));
    assert_eq!(descriptor.actuators.len(), 2);

    assert_eq!(host.device_list(DeviceFilter::Registered), vec![id]);
    assert!(host.device_list(DeviceFilter::Unregistered).is_empty());
    let json = host.device_descriptor(id).unwrap();
    assert!(json.contains("\"label\":\"Footex\""));
    assert!(host.device_descriptor(id + 1).is_none());
}

#[test]
fn unregistered_until_descriptor_arrives() {
    let (host, probe) = setup();
    let device = footswitch(7, None);
    probe.inject(&device.handshake().unwrap());
    host.poll().unwrap();

    assert_eq!(host.device_list(DeviceFilter::Unregistered), vec![1]);
    assert!(host.device_list(DeviceFilter::Registered).is_empty());
    let status = host.with_registry(|r| r.get(1).map(|d| d.status));
    assert_eq!(status, Some(DeviceStatus::WaitingDescriptor));
}

#[test]
fn assign_emits_one_frame() {
    let (host, probe) = setup();
    let mut device = footswitch(1, None);
    let id = connect(&host, &probe, &mut device);
    probe.take_written();

    let assignment_id = host.assign(&list_assignment(id, 10)).unwrap();
    let written = probe.take_written();
    assert_eq!(written.len(), 1);

    let (frame, _) = frame::decode(&written[0]).unwrap();
    assert_eq!(frame.address, id);
    assert_eq!(frame.command, Command::Assignment);
    let header = message::parse_assignment(&frame.payload).unwrap();
    assert_eq!(header.id, assignment_id);
    assert_eq!(header.list_count, 10);
    assert_eq!(header.window, Some((0, 0, 3)));
    assert_eq!(header.visible_items.len(), 3);
}

#[test]
fn failed_assign_leaves_no_state_and_sends_nothing() {
    let (host, probe) = setup();
    let mut device = footswitch(1, None);
    let id = connect(&host, &probe, &mut device);
    probe.take_written();

    host.assign(&Assignment::new(id, 1, "Bypass")).unwrap();
    probe.take_written();

    let err = host.assign(&Assignment::new(id, 1, "Again")).unwrap_err();
    assert!(matches!(err, Error::Assignment(_)));
    assert!(probe.take_written().is_empty());

    let count = host.with_registry(|r| r.get(id).unwrap().actuators[1].assignments_count);
    assert_eq!(count, 1);
    assert!(host.assign(&Assignment::new(id, 9, "Nope")).is_err());
    assert!(host.assign(&Assignment::new(5, 0, "Nope")).is_err());
}

#[test]
fn assign_rolls_back_when_transport_fails() {
    let (host, probe) = setup();
    let mut device = footswitch(1, None);
    let id = connect(&host, &probe, &mut device);

    let mut closer = probe.clone();
    chainhost::Transport::close(&mut closer);

    assert!(matches!(
        host.assign(&Assignment::new(id, 0, "Bypass")),
        Err(Error::Transport(_))
    ));
    let live = host.with_registry(|r| r.get(id).unwrap().assignments().map_or(0, |t| t.len()));
    assert_eq!(live, 0);
    let count = host.with_registry(|r| r.get(id).unwrap().actuators[0].assignments_count);
    assert_eq!(count, 0);
}

#[test]
fn unassign_round_trip() {
    let (host, probe) = setup();
    let mut device = footswitch(1, None);
    let id = connect(&host, &probe, &mut device);

    let assignment_id = host.assign(&Assignment::new(id, 0, "Bypass")).unwrap();
    probe.take_written();

    let key = AssignmentKey {
        id: assignment_id,
        device_id: id,
    };
    assert_eq!(host.unassign(key).unwrap(), assignment_id);
    let written = probe.take_written();
    let (frame, _) = frame::decode(&written[0]).unwrap();
    assert_eq!(frame.command, Command::Unassignment);
    assert_eq!(frame.payload, vec![assignment_id]);

    assert!(!host.with_registry(|r| r.check_assignment(id, assignment_id)));
    assert!(host.unassign(key).is_err());
    assert!(probe.take_written().is_empty());
}

#[test]
fn unassign_keeps_assignment_when_transport_fails() {
    let (host, probe) = setup();
    let mut device = footswitch(1, None);
    let id = connect(&host, &probe, &mut device);
    let assignment_id = host.assign(&Assignment::new(id, 0, "Bypass")).unwrap();

    let mut closer = probe.clone();
    chainhost::Transport::close(&mut closer);

    let key = AssignmentKey {
        id: assignment_id,
        device_id: id,
    };
    assert!(matches!(host.unassign(key), Err(Error::Transport(_))));
    assert!(host.with_registry(|r| r.check_assignment(id, assignment_id)));
    let count = host.with_registry(|r| r.get(id).unwrap().actuators[0].assignments_count);
    assert_eq!(count, 1);
}

#[test]
fn long_list_is_refused_before_anything_is_sent() {
    let (host, probe) = setup();
    let mut device = footswitch(1, None);
    let id = connect(&host, &probe, &mut device);
    probe.take_written();

    let mut long = list_assignment(id, 300);
    long.value = 2800.0;
    assert!(matches!(
        host.assign(&long),
        Err(Error::Assignment(chainhost::AssignmentError::ListTooLong { count: 300, .. }))
    ));
    assert!(probe.take_written().is_empty());

    let mut fits = list_assignment(id, 255);
    fits.value = 2540.0;
    let assignment_id = host.assign(&fits).unwrap();
    let written = probe.take_written();
    let (frame, _) = frame::decode(&written[0]).unwrap();
    let header = message::parse_assignment(&frame.payload).unwrap();
    assert_eq!(header.id, assignment_id);
    assert_eq!(header.list_count, 255);
    assert_eq!(header.window, Some((254, 252, 255)));
    assert_eq!(header.visible_items[2].0, "preset 254");
}

#[test]
fn data_update_batch_is_delivered_whole_and_in_order() {
    let (host, probe) = setup();
    let batches = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&batches);
    host.on_data_update(move |u: &DataUpdate| sink.lock().unwrap().push(u.clone()));

    let mut device = footswitch(1, None);
    let id = connect(&host, &probe, &mut device);
    let toggle = host.assign(&Assignment::new(id, 1, "Bypass")).unwrap();
    let list = host.assign(&list_assignment(id, 10)).unwrap();

    let updates = [
        UpdateItem { assignment_id: toggle, value: 1.0 },
        UpdateItem { assignment_id: list, value: 9.0 },
        UpdateItem { assignment_id: toggle, value: 0.0 },
    ];
    probe.inject(&device.data_update(&updates));
    host.poll().unwrap();

    let batches = batches.lock().unwrap();
    assert_eq!(batches.len(), 1);
    let batch = &batches[0];
    assert_eq!(batch.device_id, id);
    let ids: Vec<_> = batch.updates.iter().map(|u| u.assignment_id).collect();
    assert_eq!(ids, vec![toggle, list, toggle]);
    // list index 9 resolves to that item's value
    assert_eq!(batch.updates[1].value, 90.0);

    host.with_registry(|r| {
        let stored = r.assignment(id, list).unwrap();
        assert_eq!(stored.list_index, 9);
        assert_eq!((stored.enumeration_frame_min, stored.enumeration_frame_max), (7, 10));
        assert_eq!(r.assignment(id, toggle).unwrap().value, 0.0);
    });
}

#[test]
fn set_value_moves_list_window() {
    let (host, probe) = setup();
    let mut device = footswitch(1, None);
    let id = connect(&host, &probe, &mut device);
    let list = host.assign(&list_assignment(id, 10)).unwrap();
    probe.take_written();

    let update = SetValue {
        device_id: id,
        assignment_id: list,
        actuator_id: 0,
        value: 50.0,
    };
    assert_eq!(host.set_value(&update).unwrap(), list);

    let written = probe.take_written();
    assert_eq!(written.len(), 1);
    let (frame, _) = frame::decode(&written[0]).unwrap();
    assert_eq!(frame.command, Command::SetValue);
    assert_eq!(frame.payload[0], list);

    host.with_registry(|r| {
        let stored = r.assignment(id, list).unwrap();
        assert_eq!(stored.list_index, 5);
        assert_eq!(stored.value, 50.0);
        assert_eq!((stored.enumeration_frame_min, stored.enumeration_frame_max), (4, 7));
    });

    let wrong_actuator = SetValue { actuator_id: 1, ..update };
    assert!(host.set_value(&wrong_actuator).is_err());
    let missing = SetValue { assignment_id: 40, ..update };
    assert!(host.set_value(&missing).is_err());
}

#[test]
fn corrupted_frame_is_counted_and_ignored() {
    let (host, probe) = setup();
    let device = footswitch(1, None);

    let mut bytes = device.handshake().unwrap();
    bytes[5] ^= 0x01;
    probe.inject(&bytes);
    probe.inject(&device.handshake().unwrap());

    assert_eq!(host.poll().unwrap(), 1);
    let stats = host.stats();
    assert_eq!(stats.wire_errors, 1);
    assert_eq!(host.device_list(DeviceFilter::All), vec![1]);
}

#[test]
fn frames_for_unknown_devices_are_dropped() {
    let (host, probe) = setup();
    let mut ghost = footswitch(1, None);
    let mut other = footswitch(2, None);
    let id = connect(&host, &probe, &mut other);

    let fake_ack = frame::encode(
        0,
        Command::Handshake,
        &[1, 0, HandshakeStatus::Ok as u8, id + 3],
    )
    .unwrap();
    ghost.accept_ack(&fake_ack).unwrap();

    probe.inject(&ghost.data_update(&[UpdateItem { assignment_id: 0, value: 1.0 }]));
    probe.inject(&ghost.descriptor().unwrap());
    host.poll().unwrap();

    assert_eq!(host.stats().dropped, 2);
    assert_eq!(host.device_list(DeviceFilter::All), vec![id]);
}

#[test]
fn device_table_capacity() {
    let (host, probe) = setup();
    for i in 0..CC_MAX_DEVICES {
        probe.inject(&footswitch(i as u16, None).handshake().unwrap());
    }
    let mut extra = footswitch(0xAAAA, None);
    probe.inject(&extra.handshake().unwrap());
    host.poll().unwrap();

    let written = probe.take_written();
    // ack + descriptor request per accepted device, one refusal
    assert_eq!(written.len(), CC_MAX_DEVICES * 2 + 1);
    let (refusal, _) = frame::decode(written.last().unwrap()).unwrap();
    let ack = message::parse_handshake_ack(&refusal.payload).unwrap();
    assert_eq!(ack.status, HandshakeStatus::Refused);
    assert_eq!(extra.accept_ack(written.last().unwrap()).unwrap(), None);

    assert_eq!(host.device_list(DeviceFilter::All).len(), CC_MAX_DEVICES);
    assert_eq!(host.stats().handshakes_refused, 1);
}

#[test]
fn per_uri_limit_refuses_extra_instances() {
    let probe = MemoryTransport::new();
    let config = HostConfig {
        max_devices_per_uri: Some(1),
        ..HostConfig::default()
    };
    let host = Host::init(config, probe.clone()).unwrap();

    let mut first = footswitch(1, Some(URI));
    connect(&host, &probe, &mut first);
    probe.take_written();

    probe.inject(&footswitch(2, Some(URI)).handshake().unwrap());
    probe.inject(&footswitch(3, Some("https://example.org/other")).handshake().unwrap());
    host.poll().unwrap();

    assert_eq!(host.device_list(DeviceFilter::All).len(), 2);
    assert_eq!(host.stats().handshakes_refused, 1);
}

#[test]
fn disconnect_releases_everything() {
    let (host, probe) = setup();
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    host.on_device_status(move |e: &DeviceStatusEvent| sink.lock().unwrap().push(e.status));

    let mut device = footswitch(1, None);
    let id = connect(&host, &probe, &mut device);
    let a = host.assign(&Assignment::new(id, 0, "A")).unwrap();
    let b = host.assign(&Assignment::new(id, 1, "B")).unwrap();

    assert!(host.disconnect(id));
    assert!(!host.disconnect(id));
    assert!(!host.with_registry(|r| r.check_assignment(id, a) || r.check_assignment(id, b)));
    assert_eq!(
        *events.lock().unwrap(),
        vec![DeviceStatus::Connected, DeviceStatus::Disconnected]
    );

    // reconnecting gets a fresh device in the freed slot
    let mut again = footswitch(2, None);
    let new_id = connect(&host, &probe, &mut again);
    assert_eq!(new_id, id);
    assert!(!host.with_registry(|r| r.check_assignment(new_id, a)));
}

#[test]
fn chain_sync_updates_chain_id() {
    let (host, probe) = setup();
    let mut device = footswitch(1, None);
    let id = connect(&host, &probe, &mut device);

    probe.inject(&device.chain_sync(3));
    host.poll().unwrap();
    let chain_id = host.with_registry(|r| r.get(id).unwrap().chain_id);
    assert_eq!(chain_id, 3);

    host.sync(chainhost::SyncCycle::Handshake).unwrap();
    let written = probe.take_written();
    let (sync, _) = frame::decode(written.last().unwrap()).unwrap();
    assert_eq!(sync.command, Command::ChainSync);
    assert_eq!(sync.payload, vec![1]);
}

#[test]
fn finish_disconnects_and_closes() {
    let (host, probe) = setup();
    let events = Arc::new(Mutex::new(0));
    let sink = Arc::clone(&events);

    let mut device = footswitch(1, None);
    connect(&host, &probe, &mut device);
    host.on_device_status(move |e: &DeviceStatusEvent| {
        if e.status == DeviceStatus::Disconnected {
            *sink.lock().unwrap() += 1;
        }
    });

    host.finish();
    assert_eq!(*events.lock().unwrap(), 1);
    assert!(probe.is_closed());
}
