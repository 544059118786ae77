use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use ble_central::{
    AdvertisementData, AdvertisementReport, BluetoothUuidExt, CharacteristicProperties, Command,
    ConnectionState, ErrorKind, Event, PeripheralEvent, PeripheralId, Radio, RadioCallback,
    RadioError, RadioEvent, Reply, ServiceLayout, Session, SessionConfig, Uuid,
};
use futures_lite::future::block_on;

const HEART_RATE: u16 = 0x180d;
const MEASUREMENT: u16 = 0x2a37;
const SENSOR_LOCATION: u16 = 0x2a38;
const CONTROL_POINT: u16 = 0x2a39;

enum Request {
    Connect(PeripheralId),
    Disconnect(PeripheralId),
    Discover(PeripheralId),
    Read(PeripheralId, Uuid, Uuid),
    Write(PeripheralId, Uuid, Uuid),
    SetNotify(PeripheralId, Uuid, Uuid),
}

#[derive(Default)]
struct Log {
    writes: Vec<Vec<u8>>,
    outstanding: usize,
    max_outstanding: usize,
}

/// Stands in for a platform stack: submissions are answered from a separate thread, the way
/// platform callbacks arrive.
struct ScriptedRadio {
    requests: async_channel::Sender<Request>,
    log: Arc<Mutex<Log>>,
}

impl ScriptedRadio {
    fn submit(&self, request: Request, gatt: bool) -> Result<(), RadioError> {
        if gatt {
            let mut log = self.log.lock().unwrap();
            log.outstanding += 1;
            log.max_outstanding = log.max_outstanding.max(log.outstanding);
        }
        self.requests.try_send(request).map_err(|_| RadioError::Rejected)
    }
}

impl Radio for ScriptedRadio {
    fn adapter_state(&self) -> Option<i32> {
        Some(12)
    }

    fn start_scan(&self, _service_uuids: &[Uuid], _allow_duplicates: bool) -> Result<(), RadioError> {
        Ok(())
    }

    fn stop_scan(&self) -> Result<(), RadioError> {
        Ok(())
    }

    fn connect(&self, id: &PeripheralId) -> Result<(), RadioError> {
        self.submit(Request::Connect(id.clone()), false)
    }

    fn disconnect(&self, id: &PeripheralId) -> Result<(), RadioError> {
        self.submit(Request::Disconnect(id.clone()), false)
    }

    fn discover_services(&self, id: &PeripheralId) -> Result<(), RadioError> {
        self.submit(Request::Discover(id.clone()), false)
    }

    fn read(&self, id: &PeripheralId, service: Uuid, characteristic: Uuid) -> Result<(), RadioError> {
        self.submit(Request::Read(id.clone(), service, characteristic), true)
    }

    fn write(
        &self,
        id: &PeripheralId,
        service: Uuid,
        characteristic: Uuid,
        value: &[u8],
        with_response: bool,
    ) -> Result<(), RadioError> {
        self.log.lock().unwrap().writes.push(value.to_vec());
        if !with_response {
            return Ok(());
        }
        self.submit(Request::Write(id.clone(), service, characteristic), true)
    }

    fn set_notify(
        &self,
        id: &PeripheralId,
        service: Uuid,
        characteristic: Uuid,
        _enabled: bool,
    ) -> Result<(), RadioError> {
        self.submit(Request::SetNotify(id.clone(), service, characteristic), true)
    }
}

struct Harness {
    session: Session,
    callback: RadioCallback,
    log: Arc<Mutex<Log>>,
}

/// Builds a session whose radio answers everything, except reads from `silent` peripherals.
fn harness(silent: &[&str]) -> Harness {
    let _ = env_logger::builder().is_test(true).try_init();

    let (requests, inbox) = async_channel::unbounded();
    let log = Arc::new(Mutex::new(Log::default()));
    let radio = ScriptedRadio {
        requests,
        log: log.clone(),
    };
    let session = Session::new(Arc::new(radio), SessionConfig::default());
    let callback = session.radio_callback();

    let silent: HashSet<PeripheralId> = silent.iter().map(|&s| s.into()).collect();
    let responder = callback.clone();
    let responder_log = log.clone();
    thread::spawn(move || {
        while let Ok(request) = inbox.recv_blocking() {
            thread::sleep(Duration::from_millis(1));
            let (id, event) = match request {
                Request::Connect(id) => (id, PeripheralEvent::Connected),
                Request::Disconnect(id) => (id, PeripheralEvent::Disconnected { status: 0 }),
                Request::Discover(id) => (id, PeripheralEvent::ServicesDiscovered(Ok(vec![heart_rate()]))),
                Request::Read(id, _, _) if silent.contains(&id) => continue,
                Request::Read(id, service, characteristic) => (
                    id,
                    PeripheralEvent::Read {
                        service,
                        characteristic,
                        result: Ok(vec![0x01]),
                    },
                ),
                Request::Write(id, service, characteristic) => (
                    id,
                    PeripheralEvent::Written {
                        service,
                        characteristic,
                        result: Ok(()),
                    },
                ),
                Request::SetNotify(id, service, characteristic) => (
                    id,
                    PeripheralEvent::NotifySet {
                        service,
                        characteristic,
                        result: Ok(()),
                    },
                ),
            };
            if matches!(
                event,
                PeripheralEvent::Read { .. } | PeripheralEvent::Written { .. } | PeripheralEvent::NotifySet { .. }
            ) {
                responder_log.lock().unwrap().outstanding -= 1;
            }
            responder.deliver(RadioEvent::Peripheral(id, event));
        }
    });

    Harness { session, callback, log }
}

fn heart_rate() -> ServiceLayout {
    ServiceLayout::new(Uuid::from_u16(HEART_RATE))
        .with_characteristic(Uuid::from_u16(MEASUREMENT), CharacteristicProperties::NOTIFY)
        .with_characteristic(Uuid::from_u16(SENSOR_LOCATION), CharacteristicProperties::READ)
        .with_characteristic(Uuid::from_u16(CONTROL_POINT), CharacteristicProperties::WRITE)
}

fn advertise(callback: &RadioCallback, address: &str, services: &[u16]) {
    callback.deliver(RadioEvent::Advertisement(AdvertisementReport {
        id: address.into(),
        rssi: -60,
        connectable: true,
        advertisement: AdvertisementData {
            local_name: Some("HRM".into()),
            service_uuids: services.iter().map(|&s| Uuid::from_u16(s)).collect(),
            ..Default::default()
        },
    }));
}

fn run(session: &Session, command: Command) -> ble_central::Result<Reply> {
    block_on(session.execute(command)?)
}

#[test]
fn heart_rate_monitor_end_to_end() {
    let Harness { session, callback, .. } = harness(&[]);
    let mut events = session.events();

    let reply = run(
        &session,
        Command::StartScan {
            service_uuids: vec!["180D".into()],
            allow_duplicates: false,
        },
    )
    .unwrap();
    assert_eq!(reply, Reply::Done);
    advertise(&callback, "11:11", &[0x180f]);
    advertise(&callback, "AA:BB", &[HEART_RATE]);
    advertise(&callback, "AA:BB", &[HEART_RATE]);

    let Ok(Event::Discover(found)) = events.try_recv() else {
        panic!("expected a discover event");
    };
    assert_eq!(found.address, "AA:BB");
    assert_eq!(found.advertisement.service_uuids, ["180d"]);
    assert!(events.try_recv().is_err());
    run(&session, Command::StopScan).unwrap();

    let connect = Command::Connect {
        peripheral_id: "AA:BB".into(),
    };
    assert_eq!(run(&session, connect).unwrap(), Reply::Done);
    let reply = run(
        &session,
        Command::DiscoverServices {
            peripheral_id: "AA:BB".into(),
        },
    )
    .unwrap();
    assert_eq!(reply, Reply::Services(vec!["180d".into()]));

    let reply = run(
        &session,
        Command::Read {
            peripheral_id: "AA:BB".into(),
            service_uuid: "180d".into(),
            characteristic_uuid: "2a38".into(),
        },
    )
    .unwrap();
    assert_eq!(reply, Reply::Value("AQ==".into()));
}

#[test]
fn write_to_read_only_characteristic_is_unsupported() {
    let Harness { session, log, .. } = harness(&[]);
    let id = session.declare_peripheral("AA:BB").id().clone();
    block_on(session.connect(&id)).unwrap();

    let err = run(
        &session,
        Command::Write {
            peripheral_id: "AA:BB".into(),
            service_uuid: "180d".into(),
            characteristic_uuid: "2a38".into(),
            data: "AQ==".into(),
            without_response: false,
        },
    )
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedOperation);
    assert!(log.lock().unwrap().writes.is_empty());
}

#[test]
fn operations_run_one_at_a_time_in_submission_order() {
    let Harness { session, log, .. } = harness(&[]);
    let id = session.declare_peripheral("AA:BB").id().clone();
    block_on(session.connect(&id)).unwrap();

    let service = Uuid::from_u16(HEART_RATE);
    let pending: Vec<_> = (0u8..16)
        .map(|i| match i % 3 {
            0 => session
                .write(&id, service, Uuid::from_u16(CONTROL_POINT), vec![i], true)
                .map(|()| Vec::new()),
            1 => session.read(&id, service, Uuid::from_u16(SENSOR_LOCATION)),
            _ => session
                .set_notify(&id, service, Uuid::from_u16(MEASUREMENT), true)
                .map(|()| Vec::new()),
        })
        .collect();
    for op in pending {
        block_on(op).unwrap();
    }

    let log = log.lock().unwrap();
    assert_eq!(log.max_outstanding, 1);
    let expected: Vec<Vec<u8>> = (0u8..16).filter(|i| i % 3 == 0).map(|i| vec![i]).collect();
    assert_eq!(log.writes, expected);
}

#[test]
fn concurrent_callers_keep_their_own_order() {
    let Harness { session, log, .. } = harness(&[]);
    let id = session.declare_peripheral("AA:BB").id().clone();
    block_on(session.connect(&id)).unwrap();

    let service = Uuid::from_u16(HEART_RATE);
    let control = Uuid::from_u16(CONTROL_POINT);
    thread::scope(|scope| {
        for caller in 0u8..4 {
            let session = session.clone();
            let id = id.clone();
            scope.spawn(move || {
                let pending: Vec<_> = (0u8..8)
                    .map(|seq| session.write(&id, service, control, vec![caller, seq], true))
                    .collect();
                for write in pending {
                    block_on(write).unwrap();
                }
            });
        }
    });

    let log = log.lock().unwrap();
    assert_eq!(log.max_outstanding, 1);
    assert_eq!(log.writes.len(), 32);
    for caller in 0u8..4 {
        let seqs: Vec<u8> = log
            .writes
            .iter()
            .filter(|w| w[0] == caller)
            .map(|w| w[1])
            .collect();
        assert_eq!(seqs, (0u8..8).collect::<Vec<_>>());
    }
}

#[test]
fn disconnect_only_affects_its_own_peripheral() {
    let Harness { session, callback, .. } = harness(&["BB:BB"]);
    let a = session.declare_peripheral("AA:AA").id().clone();
    let b = session.declare_peripheral("BB:BB").id().clone();
    block_on(session.connect(&a)).unwrap();
    block_on(session.connect(&b)).unwrap();

    let service = Uuid::from_u16(HEART_RATE);
    let location = Uuid::from_u16(SENSOR_LOCATION);
    let in_flight = session.read(&b, service, location);
    let queued = session.read(&b, service, location);

    block_on(session.disconnect(&a)).unwrap();
    assert_eq!(session.connection_state(&a), Some(ConnectionState::Disconnected));

    for value in [0x07, 0x08] {
        callback.deliver(RadioEvent::Peripheral(
            b.clone(),
            PeripheralEvent::Read {
                service,
                characteristic: location,
                result: Ok(vec![value]),
            },
        ));
    }
    assert_eq!(block_on(in_flight).unwrap(), [0x07]);
    assert_eq!(block_on(queued).unwrap(), [0x08]);
    assert_eq!(session.connection_state(&b), Some(ConnectionState::ServicesDiscovered));
}

#[test]
fn link_loss_only_affects_its_own_peripheral() {
    let Harness { session, callback, .. } = harness(&["AA:AA"]);
    let a = session.declare_peripheral("AA:AA").id().clone();
    let b = session.declare_peripheral("BB:BB").id().clone();
    block_on(session.connect(&a)).unwrap();
    block_on(session.connect(&b)).unwrap();

    let service = Uuid::from_u16(HEART_RATE);
    let location = Uuid::from_u16(SENSOR_LOCATION);
    let stuck = session.read(&a, service, location);
    let queued = session.read(&a, service, location);

    callback.deliver(RadioEvent::Peripheral(a.clone(), PeripheralEvent::Disconnected { status: 8 }));
    assert_eq!(block_on(stuck).unwrap_err().kind(), ErrorKind::Disconnected);
    assert_eq!(block_on(queued).unwrap_err().kind(), ErrorKind::Disconnected);

    assert_eq!(block_on(session.read(&b, service, location)).unwrap(), [0x01]);
    assert_eq!(session.connection_state(&b), Some(ConnectionState::ServicesDiscovered));
}
