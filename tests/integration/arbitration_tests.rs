//! Integration tests for the enable → tick → OutputPort pipeline.
//!
//! Each test builds a small plant in an [`AppService`], takes activation
//! handles, and asserts on the recorded output calls and events.

use std::cell::RefCell;
use std::rc::Rc;

use hydroctl::app::commands::LinkSlot;
use hydroctl::app::service::AppService;
use hydroctl::config::{MAX_OBSERVERS, SystemConfig};
use hydroctl::identity::{Identity, Key, ObjectKind};
use hydroctl::objects::Object;
use hydroctl::objects::actuator::{Actuator, ActuatorEvent, EnableMode};
use hydroctl::objects::handle::HandleState;
use hydroctl::objects::rail::{Rail, RailLimit};
use hydroctl::objects::reservoir::Reservoir;

use crate::mock_hw::{OutputCall, RecordingOutput, RecordingSink};

struct Plant {
    app: AppService,
    sink: RecordingSink,
    now: u32,
}

impl Plant {
    fn new() -> Self {
        Self {
            app: AppService::new(SystemConfig::default()),
            sink: RecordingSink::new(),
            now: 0,
        }
    }

    fn actuator(&mut self, kind: ObjectKind, index: u8, mode: EnableMode) -> (Key, RecordingOutput) {
        let out = RecordingOutput::new();
        let act = Actuator::new(Identity::new(kind, index), out.boxed()).with_enable_mode(mode);
        let key = act.key();
        self.app.add(Object::Actuator(act), &mut self.sink).unwrap();
        (key, out)
    }

    fn reservoir(&mut self, kind: ObjectKind, litres: f32) -> Key {
        let mut r = Reservoir::new(Identity::new(kind, 0), 20.0);
        r.set_volume(litres);
        let key = r.key();
        self.app.add(Object::Reservoir(r), &mut self.sink).unwrap();
        key
    }

    fn tick(&mut self) {
        self.now += 100;
        self.app.tick(self.now, &mut self.sink);
    }

    fn drive(&self, key: Key) -> f32 {
        self.app.actuator(key).unwrap().drive_intensity()
    }
}

// ── Enable modes ──────────────────────────────────────────────

#[test]
fn highest_of_three_requests_drives() {
    let mut plant = Plant::new();
    let (light, out) = plant.actuator(ObjectKind::GrowLight, 0, EnableMode::Highest);

    let _a = plant.app.enable(light, 0.3, None).unwrap();
    let _b = plant.app.enable(light, 0.7, None).unwrap();
    let _c = plant.app.enable(light, 0.5, None).unwrap();
    plant.tick();

    assert_eq!(plant.drive(light), 0.7);
    assert_eq!(out.level(), Some(0.7));
    assert!(plant.app.is_enabled(light));
}

#[test]
fn multiply_combines_requests() {
    let mut plant = Plant::new();
    let (light, out) = plant.actuator(ObjectKind::GrowLight, 0, EnableMode::Multiply);

    let _a = plant.app.enable(light, 0.5, None).unwrap();
    let _b = plant.app.enable(light, 0.5, None).unwrap();
    plant.tick();

    assert_eq!(out.level(), Some(0.25));
}

#[test]
fn in_order_stamps_only_the_first_request() {
    let mut plant = Plant::new();
    let (pump, _out) = plant.actuator(ObjectKind::WaterPump, 0, EnableMode::InOrder);

    let a = plant.app.enable(pump, 0.9, None).unwrap();
    let b = plant.app.enable(pump, 0.4, None).unwrap();
    let c = plant.app.enable(pump, 0.6, None).unwrap();
    plant.tick();

    assert!(a.is_selected());
    assert!(!b.is_selected());
    assert!(!c.is_selected());
    assert_eq!(plant.drive(pump), 0.9);
}

#[test]
fn rev_order_follows_newest_request() {
    let mut plant = Plant::new();
    let (pump, _out) = plant.actuator(ObjectKind::WaterPump, 0, EnableMode::RevOrder);

    let _a = plant.app.enable(pump, 0.9, None).unwrap();
    plant.tick();
    assert_eq!(plant.drive(pump), 0.9);

    let b = plant.app.enable(pump, 0.2, None).unwrap();
    plant.tick();
    assert_eq!(plant.drive(pump), 0.2);
    assert!(b.is_selected());
}

#[test]
fn mode_change_rearbitrates_without_new_requests() {
    let mut plant = Plant::new();
    let (light, out) = plant.actuator(ObjectKind::GrowLight, 0, EnableMode::Highest);
    let _a = plant.app.enable(light, 0.2, None).unwrap();
    let _b = plant.app.enable(light, 0.8, None).unwrap();
    plant.tick();
    assert_eq!(out.level(), Some(0.8));

    plant.app.set_enable_mode(light, EnableMode::Lowest).unwrap();
    plant.tick();
    assert_eq!(out.level(), Some(0.2));
    assert!(plant.app.is_config_dirty());
}

// ── Lifecycle of requests ─────────────────────────────────────

#[test]
fn removing_last_handle_fires_one_deactivation() {
    let mut plant = Plant::new();
    let (pump, out) = plant.actuator(ObjectKind::WaterPump, 0, EnableMode::Highest);

    let first = plant.app.enable(pump, 1.0, None).unwrap();
    let second = plant.app.enable(pump, 0.5, None).unwrap();
    plant.tick();
    assert_eq!(plant.sink.activations(pump), 1);

    drop(first);
    plant.tick();
    assert_eq!(plant.drive(pump), 0.5);
    assert_eq!(plant.sink.deactivations(pump), 0);

    drop(second);
    plant.tick();
    plant.tick();
    assert_eq!(plant.sink.deactivations(pump), 1);
    assert_eq!(out.calls().last(), Some(&OutputCall::Disable));
    assert!(!plant.app.is_enabled(pump));
}

#[test]
fn timed_request_finishes_and_switches_off() {
    let mut plant = Plant::new();
    let (pump, out) = plant.actuator(ObjectKind::WaterPump, 0, EnableMode::Highest);
    let h = plant.app.enable(pump, 1.0, Some(300)).unwrap();

    plant.tick(); // t=100, activates
    plant.tick(); // 100 ms elapsed
    plant.tick(); // 200 ms
    assert_eq!(h.state(), HandleState::Active);
    assert_eq!(h.remaining_ms(), Some(100));
    plant.tick(); // 300 ms, done
    assert!(h.is_done());
    assert!(!out.is_on());
    assert_eq!(plant.sink.deactivations(pump), 1);
}

#[test]
fn two_unchanged_ticks_write_nothing_new() {
    let mut plant = Plant::new();
    let (light, out) = plant.actuator(ObjectKind::GrowLight, 0, EnableMode::Average);
    let _a = plant.app.enable(light, 0.4, None).unwrap();
    let _b = plant.app.enable(light, 0.6, None).unwrap();
    plant.tick();
    let level = out.level();
    let writes = out.calls().len();

    plant.tick();
    plant.tick();
    assert_eq!(out.level(), level);
    assert_eq!(out.calls().len(), writes);
}

#[test]
fn subscribers_see_edges_after_the_tick() {
    let mut plant = Plant::new();
    let (fan, _out) = plant.actuator(ObjectKind::FanExhaust, 0, EnableMode::Highest);
    let seen = Rc::new(RefCell::new(Vec::new()));
    let log = Rc::clone(&seen);
    plant
        .app
        .subscribe(fan, move |e| log.borrow_mut().push(*e))
        .unwrap()
        .unwrap();

    let h = plant.app.enable(fan, 0.5, None).unwrap();
    assert!(seen.borrow().is_empty());
    plant.tick();
    drop(h);
    plant.tick();

    assert_eq!(
        *seen.borrow(),
        [
            ActuatorEvent::Activated { key: fan, intensity: 0.5 },
            ActuatorEvent::Deactivated { key: fan },
        ]
    );
}

// ── Admission gates ───────────────────────────────────────────

#[test]
fn empty_reservoir_holds_pump_until_refilled() {
    let mut plant = Plant::new();
    let feed = plant.reservoir(ObjectKind::FeedWater, 0.0);
    let (pump, out) = plant.actuator(ObjectKind::WaterPump, 0, EnableMode::Highest);
    plant.app.link(pump, LinkSlot::Container, feed).unwrap();

    let _h = plant.app.enable(pump, 1.0, None).unwrap();
    plant.tick();
    plant.tick();
    assert!(!plant.app.is_enabled(pump));
    assert!(!out.is_on());

    plant.app.set_reservoir_volume(feed, 15.0).unwrap();
    plant.tick();
    assert!(plant.app.is_enabled(pump));
    assert_eq!(out.level(), Some(1.0));
    assert_eq!(plant.sink.activations(pump), 1);
}

#[test]
fn draining_reservoir_switches_pump_off() {
    let mut plant = Plant::new();
    let feed = plant.reservoir(ObjectKind::FeedWater, 10.0);
    let (pump, _out) = plant.actuator(ObjectKind::WaterPump, 0, EnableMode::Highest);
    plant.app.link(pump, LinkSlot::Container, feed).unwrap();
    let h = plant.app.enable(pump, 1.0, None).unwrap();
    plant.tick();
    assert!(plant.app.is_enabled(pump));

    plant.app.set_reservoir_volume(feed, 0.5).unwrap();
    plant.tick();
    assert!(!plant.app.is_enabled(pump));
    assert!(h.is_valid(), "request survives while held back");
    assert_eq!(plant.sink.deactivations(pump), 1);
}

#[test]
fn fill_valve_stops_at_full() {
    let mut plant = Plant::new();
    let feed = plant.reservoir(ObjectKind::FeedWater, 19.5);
    let (valve, _out) = plant.actuator(ObjectKind::FillValve, 0, EnableMode::Highest);
    plant.app.link(valve, LinkSlot::Container, feed).unwrap();
    let _h = plant.app.enable(valve, 1.0, None).unwrap();
    plant.tick();
    assert!(!plant.app.is_enabled(valve));

    plant.app.set_reservoir_volume(feed, 10.0).unwrap();
    plant.tick();
    assert!(plant.app.is_enabled(valve));
}

#[test]
fn forced_request_bypasses_gate() {
    let mut plant = Plant::new();
    let feed = plant.reservoir(ObjectKind::FeedWater, 0.0);
    let (pump, _out) = plant.actuator(ObjectKind::WaterPump, 0, EnableMode::Highest);
    plant.app.link(pump, LinkSlot::Container, feed).unwrap();

    let h = plant.app.enable_forced(pump, 0.3, None).unwrap();
    assert!(h.is_forced());
    plant.tick();
    assert!(plant.app.is_enabled(pump));
}

#[test]
fn rail_budget_admits_one_load_at_a_time() {
    let mut plant = Plant::new();
    let rail = Rail::new(Identity::new(ObjectKind::AcPower, 0), RailLimit::Simple { max_active: 1 });
    let rail_key = rail.key();
    plant.app.add(Object::Rail(rail), &mut RecordingSink::new()).unwrap();
    let (heater, _) = plant.actuator(ObjectKind::WaterHeater, 0, EnableMode::Highest);
    let (aerator, _) = plant.actuator(ObjectKind::WaterAerator, 0, EnableMode::Highest);
    plant.app.link(heater, LinkSlot::Rail, rail_key).unwrap();
    plant.app.link(aerator, LinkSlot::Rail, rail_key).unwrap();

    let heat = plant.app.enable(heater, 1.0, None).unwrap();
    let _air = plant.app.enable(aerator, 1.0, None).unwrap();
    plant.tick();
    assert!(plant.app.is_enabled(heater));
    assert!(!plant.app.is_enabled(aerator));

    drop(heat);
    plant.tick();
    assert!(!plant.app.is_enabled(heater));
    assert!(plant.app.is_enabled(aerator));
}

#[test]
fn rail_budget_covers_loads_beyond_the_list() {
    let mut plant = Plant::new();
    let rail = Rail::new(Identity::new(ObjectKind::AcPower, 0), RailLimit::Simple { max_active: 1 });
    let rail_key = rail.key();
    plant.app.add(Object::Rail(rail), &mut RecordingSink::new()).unwrap();

    let mut keys = Vec::new();
    for i in 0..(MAX_OBSERVERS as u8 + 2) {
        let (key, _) = plant.actuator(ObjectKind::GrowLight, i, EnableMode::Highest);
        plant.app.link(key, LinkSlot::Rail, rail_key).unwrap();
        keys.push(key);
    }
    let rail_loads = plant.app.registry().get_as::<Rail>(rail_key).unwrap().loads().len();
    assert_eq!(rail_loads, MAX_OBSERVERS);

    let late = &keys[MAX_OBSERVERS..];
    let _held: Vec<_> = late.iter().map(|k| plant.app.enable(*k, 1.0, None).unwrap()).collect();
    plant.tick();
    plant.tick();

    let on = keys.iter().filter(|k| plant.app.is_enabled(**k)).count();
    assert_eq!(on, 1);
}

#[test]
fn regulated_rail_sums_power_draw() {
    let mut plant = Plant::new();
    let rail = Rail::new(Identity::new(ObjectKind::DcPower, 0), RailLimit::Regulated { max_watts: 250.0 });
    let rail_key = rail.key();
    plant.app.add(Object::Rail(rail), &mut RecordingSink::new()).unwrap();

    let mut keys = Vec::new();
    for i in 0..3 {
        let light = Actuator::new(Identity::new(ObjectKind::GrowLight, i), RecordingOutput::new().boxed())
            .with_power_draw(100.0);
        let key = light.key();
        plant.app.add(Object::Actuator(light), &mut RecordingSink::new()).unwrap();
        plant.app.link(key, LinkSlot::Rail, rail_key).unwrap();
        keys.push(key);
    }
    let _held: Vec<_> = keys.iter().map(|k| plant.app.enable(*k, 1.0, None).unwrap()).collect();
    plant.tick();

    let on = keys.iter().filter(|k| plant.app.is_enabled(**k)).count();
    assert_eq!(on, 2);
}

#[test]
fn durations_pause_while_gate_is_closed() {
    let mut plant = Plant::new();
    let feed = plant.reservoir(ObjectKind::FeedWater, 10.0);
    let (pump, _out) = plant.actuator(ObjectKind::WaterPump, 0, EnableMode::Highest);
    plant.app.link(pump, LinkSlot::Container, feed).unwrap();
    let h = plant.app.enable(pump, 1.0, Some(1_000)).unwrap();

    plant.tick();
    plant.tick();
    assert_eq!(h.elapsed_ms(), 100);

    plant.app.set_reservoir_volume(feed, 0.0).unwrap();
    plant.tick(); // still accrues the interval it was driving
    let paused_at = h.elapsed_ms();
    plant.tick();
    plant.tick();
    assert_eq!(h.elapsed_ms(), paused_at);
    assert!(h.is_valid());
}
