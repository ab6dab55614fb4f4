use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch};

use registry::codec::ScaleContext;
use registry::{
    Category, DerivedExpr, DiscoveryMeta, Point, PointSource, ReadOp, RefreshPolicy, Registry,
    WriteOp,
};
use scheduler::{Scheduler, SchedulerConfig};
use types::{BusError, Publication, RegisterBus, Value, WriteCommand};

const BATTERY_VOLTAGE_REG: u16 = 0x101;
const BATTERY_CURRENT_REG: u16 = 0x102;
const SERIAL_REG: u16 = 0x035;
const CURRENT_LIMIT_REG: u16 = 0xE001;
const RESET_REG: u16 = 0xDF01;
const POWER_REG: u16 = 0xDF00;
const DISABLED_REG: u16 = 0x777;

#[derive(Default)]
struct FakeBusInner {
    registers: HashMap<u16, u16>,
    reads: Vec<u16>,
    writes: Vec<(u16, u16)>,
    failing: HashSet<u16>,
}

#[derive(Clone, Default)]
struct FakeBus {
    inner: Arc<Mutex<FakeBusInner>>,
}

impl FakeBus {
    fn set_register(&self, address: u16, value: u16) {
        self.inner.lock().unwrap().registers.insert(address, value);
    }

    fn fail_reads_of(&self, address: u16) {
        self.inner.lock().unwrap().failing.insert(address);
    }

    fn reads_of(&self, address: u16) -> usize {
        self.inner
            .lock()
            .unwrap()
            .reads
            .iter()
            .filter(|read| **read == address)
            .count()
    }

    fn writes(&self) -> Vec<(u16, u16)> {
        self.inner.lock().unwrap().writes.clone()
    }
}

impl RegisterBus for FakeBus {
    async fn read_registers(&mut self, address: u16, count: u16) -> Result<Vec<u16>, BusError> {
        let mut inner = self.inner.lock().unwrap();
        inner.reads.push(address);
        if inner.failing.contains(&address) {
            return Err(BusError::Timeout { timeout_ms: 1 });
        }
        Ok((0..count)
            .map(|offset| *inner.registers.get(&(address + offset)).unwrap_or(&0))
            .collect())
    }

    async fn write_register(&mut self, address: u16, value: u16) -> Result<(), BusError> {
        let mut inner = self.inner.lock().unwrap();
        inner.writes.push((address, value));
        inner.registers.insert(address, value);
        Ok(())
    }
}

fn test_registry() -> Registry {
    let second = RefreshPolicy::Every(Duration::from_secs(1));
    let points = vec![
        Point::sensor(
            "battery/voltage",
            ReadOp::scaled(BATTERY_VOLTAGE_REG, 0.1),
            second,
            DiscoveryMeta::named("Battery Voltage"),
        ),
        Point::sensor(
            "battery/current",
            ReadOp::scaled_signed(BATTERY_CURRENT_REG, 0.1),
            second,
            DiscoveryMeta::named("Battery Current"),
        ),
        Point::derived(
            "battery/power",
            DerivedExpr::product("battery/current", "battery/voltage"),
            second,
            DiscoveryMeta::named("Battery Power"),
        ),
        Point::sensor(
            "system/serial_number",
            ReadOp::text(SERIAL_REG, 2),
            RefreshPolicy::Once,
            DiscoveryMeta::named("Serial Number"),
        ),
        Point::new(
            "charging/current_limit",
            Category::Number,
            PointSource::Register(ReadOp::scaled(CURRENT_LIMIT_REG, 0.1)),
            RefreshPolicy::Every(Duration::from_secs(5)),
            DiscoveryMeta::named("Charging Current Limit"),
        )
        .writable(WriteOp::Number {
            register: CURRENT_LIMIT_REG,
            scale: 0.1,
            rate_scaled: false,
            min: 0.0,
            max: 200.0,
        })
        .with_full_refresh(),
        Point::new(
            "settings/write_guard",
            Category::Select,
            PointSource::Command { default: Some(Value::Text("disarmed".to_string())) },
            RefreshPolicy::Never,
            DiscoveryMeta::named("Write Guard").options(&["armed", "disarmed"]),
        )
        .writable(WriteOp::Arm {
            options: vec!["armed".to_string(), "disarmed".to_string()],
            armed: "armed".to_string(),
        }),
        Point::new(
            "inverter/power",
            Category::Switch,
            PointSource::Command { default: None },
            RefreshPolicy::Never,
            DiscoveryMeta::named("Inverter Power"),
        )
        .writable(WriteOp::Switch { register: POWER_REG })
        .dangerous(),
        Point::new(
            "device/reset",
            Category::Button,
            PointSource::Command { default: None },
            RefreshPolicy::Never,
            DiscoveryMeta::named("Reset"),
        )
        .writable(WriteOp::Trigger { register: RESET_REG, value: 1 })
        .dangerous(),
        Point::sensor(
            "hidden/reading",
            ReadOp::scaled(DISABLED_REG, 0.1),
            second,
            DiscoveryMeta::named("Hidden"),
        )
        .enabled(false),
    ];
    Registry::build(points).expect("test registry")
}

struct Harness {
    scheduler: Scheduler<FakeBus>,
    bus: FakeBus,
    commands: mpsc::Sender<WriteCommand>,
    outbound: mpsc::Receiver<Publication>,
    _shutdown: watch::Sender<bool>,
}

fn harness() -> Harness {
    let bus = FakeBus::default();
    bus.set_register(BATTERY_VOLTAGE_REG, 512); // 51.2 V
    bus.set_register(BATTERY_CURRENT_REG, 100); // 10.0 A
    bus.set_register(SERIAL_REG, 0x4142); // "AB"
    bus.set_register(CURRENT_LIMIT_REG, 200); // 20.0 A

    let (commands_tx, commands_rx) = mpsc::channel(16);
    let (outbound_tx, outbound_rx) = mpsc::channel(64);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let config = SchedulerConfig {
        tick_interval: Duration::from_millis(200),
        write_settle: Duration::ZERO,
        error_backoff: Duration::from_millis(10),
        refresh_grace: Duration::from_millis(500),
    };
    let scheduler = Scheduler::new(
        Arc::new(test_registry()),
        bus.clone(),
        ScaleContext::default(),
        "inverter",
        commands_rx,
        outbound_tx,
        shutdown_rx,
        config,
    );

    Harness {
        scheduler,
        bus,
        commands: commands_tx,
        outbound: outbound_rx,
        _shutdown: shutdown_tx,
    }
}

fn drain(outbound: &mut mpsc::Receiver<Publication>) -> Vec<Publication> {
    let mut drained = Vec::new();
    while let Ok(publication) = outbound.try_recv() {
        drained.push(publication);
    }
    drained
}

#[tokio::test]
async fn interval_gating_respects_refresh_interval() {
    let mut h = harness();
    let t0 = Instant::now();

    h.scheduler.run_tick(t0).await.expect("tick");
    assert_eq!(h.bus.reads_of(BATTERY_VOLTAGE_REG), 1);

    h.scheduler
        .run_tick(t0 + Duration::from_millis(990))
        .await
        .expect("tick");
    assert_eq!(h.bus.reads_of(BATTERY_VOLTAGE_REG), 1, "not due before the interval");

    h.scheduler
        .run_tick(t0 + Duration::from_millis(1_010))
        .await
        .expect("tick");
    assert_eq!(h.bus.reads_of(BATTERY_VOLTAGE_REG), 2, "due after the interval");
}

#[tokio::test]
async fn once_points_read_a_single_time() {
    let mut h = harness();
    let t0 = Instant::now();

    for offset in [0u64, 2_000, 10_000, 60_000] {
        h.scheduler
            .run_tick(t0 + Duration::from_millis(offset))
            .await
            .expect("tick");
    }
    assert_eq!(h.bus.reads_of(SERIAL_REG), 1);
}

#[tokio::test]
async fn read_failure_preserves_last_known_value() {
    let mut h = harness();
    let t0 = Instant::now();

    h.scheduler.run_tick(t0).await.expect("tick");
    let before = h
        .scheduler
        .point_state("battery/voltage")
        .expect("state")
        .clone();
    assert_eq!(before.last_value, Some(Value::Float(51.2)));
    drain(&mut h.outbound);

    h.bus.fail_reads_of(BATTERY_VOLTAGE_REG);
    h.scheduler
        .run_tick(t0 + Duration::from_secs(2))
        .await
        .expect("tick");

    let after = h.scheduler.point_state("battery/voltage").expect("state");
    assert_eq!(after.last_value, before.last_value);
    assert_eq!(after.last_update, before.last_update);

    let published = drain(&mut h.outbound);
    assert!(
        !published
            .iter()
            .any(|publication| publication.topic.contains("battery/voltage")),
        "failed read must not publish"
    );
}

#[tokio::test]
async fn dangerous_write_requires_armed_guard() {
    let mut h = harness();
    let t0 = Instant::now();

    h.commands
        .send(WriteCommand { point: "device/reset".to_string(), payload: "PRESS".to_string() })
        .await
        .expect("send");
    h.scheduler.run_tick(t0).await.expect("tick");
    assert!(h.bus.writes().is_empty(), "guard disarmed, no transaction");

    // arming and pressing in the same batch works because writes apply
    // in arrival order
    h.commands
        .send(WriteCommand {
            point: "settings/write_guard".to_string(),
            payload: "armed".to_string(),
        })
        .await
        .expect("send");
    h.commands
        .send(WriteCommand { point: "device/reset".to_string(), payload: "PRESS".to_string() })
        .await
        .expect("send");
    h.scheduler
        .run_tick(t0 + Duration::from_millis(200))
        .await
        .expect("tick");

    assert_eq!(h.bus.writes(), vec![(RESET_REG, 1)]);
}

#[tokio::test]
async fn full_refresh_write_rereads_everything_once() {
    let mut h = harness();
    let t0 = Instant::now();

    h.scheduler.run_tick(t0).await.expect("tick");
    assert_eq!(h.bus.reads_of(BATTERY_VOLTAGE_REG), 1);
    assert_eq!(h.bus.reads_of(CURRENT_LIMIT_REG), 1);

    h.commands
        .send(WriteCommand {
            point: "charging/current_limit".to_string(),
            payload: "25.5".to_string(),
        })
        .await
        .expect("send");
    let t_write = t0 + Duration::from_millis(100);
    h.scheduler.run_tick(t_write).await.expect("tick");

    assert_eq!(h.bus.writes(), vec![(CURRENT_LIMIT_REG, 255)]);
    // force_refresh makes every enabled point due in the same tick
    assert_eq!(h.bus.reads_of(BATTERY_VOLTAGE_REG), 2);
    assert_eq!(h.bus.reads_of(CURRENT_LIMIT_REG), 2);
    // the write's effect is visible to the same tick's read pass
    let state = h.scheduler.point_state("charging/current_limit").expect("state");
    assert_eq!(state.last_value, Some(Value::Float(25.5)));

    // flags clear after one pass: nothing due shortly after
    h.scheduler
        .run_tick(t0 + Duration::from_millis(200))
        .await
        .expect("tick");
    assert_eq!(h.bus.reads_of(BATTERY_VOLTAGE_REG), 2);
    assert_eq!(h.bus.reads_of(CURRENT_LIMIT_REG), 2);

    // the written point re-reads after the grace period instead of a
    // full five second interval
    h.scheduler
        .run_tick(t0 + Duration::from_millis(900))
        .await
        .expect("tick");
    assert_eq!(h.bus.reads_of(CURRENT_LIMIT_REG), 3);
}

#[tokio::test]
async fn derived_point_resolves_without_bus_traffic() {
    let mut h = harness();
    let t0 = Instant::now();

    h.scheduler.run_tick(t0).await.expect("tick");

    let power = h.scheduler.point_state("battery/power").expect("state");
    assert_eq!(power.last_value, Some(Value::Float(512.0)));

    let published = drain(&mut h.outbound);
    let power_publication = published
        .iter()
        .find(|publication| publication.topic == "inverter/sensor/battery/power/state")
        .expect("power published");
    assert_eq!(power_publication.payload, "512");
}

#[tokio::test]
async fn queued_writes_apply_in_arrival_order() {
    let mut h = harness();
    let t0 = Instant::now();

    for payload in ["1", "2"] {
        h.commands
            .send(WriteCommand {
                point: "charging/current_limit".to_string(),
                payload: payload.to_string(),
            })
            .await
            .expect("send");
    }
    h.scheduler.run_tick(t0).await.expect("tick");

    assert_eq!(h.bus.writes(), vec![(CURRENT_LIMIT_REG, 10), (CURRENT_LIMIT_REG, 20)]);
}

#[tokio::test]
async fn disabled_points_are_inert() {
    let mut h = harness();
    let t0 = Instant::now();

    h.commands
        .send(WriteCommand { point: "hidden/reading".to_string(), payload: "1".to_string() })
        .await
        .expect("send");
    h.scheduler.run_tick(t0).await.expect("tick");
    h.scheduler
        .run_tick(t0 + Duration::from_secs(5))
        .await
        .expect("tick");

    assert_eq!(h.bus.reads_of(DISABLED_REG), 0);
    assert!(h.bus.writes().is_empty());
    let published = drain(&mut h.outbound);
    assert!(!published.iter().any(|publication| publication.topic.contains("hidden")));
}

#[tokio::test]
async fn unknown_point_write_is_discarded() {
    let mut h = harness();

    h.commands
        .send(WriteCommand { point: "no/such/point".to_string(), payload: "1".to_string() })
        .await
        .expect("send");
    let summary = h.scheduler.run_tick(Instant::now()).await.expect("tick");

    assert_eq!(summary.writes_discarded, 1);
    assert!(h.bus.writes().is_empty());
}

#[tokio::test]
async fn command_switch_write_publishes_state() {
    let mut h = harness();
    let t0 = Instant::now();
    h.scheduler.run_tick(t0).await.expect("tick");
    drain(&mut h.outbound);

    h.commands
        .send(WriteCommand {
            point: "settings/write_guard".to_string(),
            payload: "armed".to_string(),
        })
        .await
        .expect("send");
    h.commands
        .send(WriteCommand { point: "inverter/power".to_string(), payload: "1".to_string() })
        .await
        .expect("send");
    h.scheduler
        .run_tick(t0 + Duration::from_millis(100))
        .await
        .expect("tick");

    assert_eq!(h.bus.writes(), vec![(POWER_REG, 1)]);
    // the register is never read back, so the accepted write is the
    // only source of state for this point
    let state = h.scheduler.point_state("inverter/power").expect("state");
    assert_eq!(state.last_value, Some(Value::Int(1)));
    assert!(state.last_update.is_some());
    let published = drain(&mut h.outbound);
    let power = published
        .iter()
        .find(|publication| publication.topic == "inverter/switch/inverter/power/state")
        .expect("switch state published");
    assert_eq!(power.payload, "1");
}

#[tokio::test]
async fn full_refresh_write_keeps_typed_value_when_reread_fails() {
    let mut h = harness();
    let t0 = Instant::now();
    h.bus.fail_reads_of(CURRENT_LIMIT_REG);
    h.scheduler.run_tick(t0).await.expect("tick");

    h.commands
        .send(WriteCommand {
            point: "charging/current_limit".to_string(),
            payload: "25".to_string(),
        })
        .await
        .expect("send");
    h.scheduler
        .run_tick(t0 + Duration::from_millis(100))
        .await
        .expect("tick");

    assert_eq!(h.bus.writes(), vec![(CURRENT_LIMIT_REG, 250)]);
    // the forced re-read failed; the accepted payload stands in as a
    // typed value, not raw command text
    let state = h.scheduler.point_state("charging/current_limit").expect("state");
    assert_eq!(state.last_value, Some(Value::Float(25.0)));
}

#[tokio::test]
async fn guard_updates_publish_without_bus_traffic() {
    let mut h = harness();
    let t0 = Instant::now();
    h.scheduler.run_tick(t0).await.expect("tick");
    drain(&mut h.outbound);

    h.commands
        .send(WriteCommand {
            point: "settings/write_guard".to_string(),
            payload: "armed".to_string(),
        })
        .await
        .expect("send");
    h.scheduler
        .run_tick(t0 + Duration::from_millis(100))
        .await
        .expect("tick");

    assert!(h.bus.writes().is_empty());
    let published = drain(&mut h.outbound);
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].topic, "inverter/select/settings/write_guard/state");
    assert_eq!(published[0].payload, "armed");
}
