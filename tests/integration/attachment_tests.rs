//! Integration tests for deferred attachment across object lifetimes.
//!
//! Links are set before their targets exist, targets are destroyed and
//! re-created, and actuators are removed while callers still hold
//! handles.

use hydroctl::app::commands::{AppCommand, LinkSlot};
use hydroctl::app::service::AppService;
use hydroctl::config::SystemConfig;
use hydroctl::error::{Error, RegistryError};
use hydroctl::identity::{Identity, Key, KeyString, ObjectKind};
use hydroctl::objects::Object;
use hydroctl::objects::actuator::Actuator;
use hydroctl::objects::handle::HandleState;
use hydroctl::objects::reservoir::Reservoir;

use crate::mock_hw::{RecordingOutput, RecordingSink};

fn feed(volume: f32) -> Object {
    let mut r = Reservoir::new(Identity::new(ObjectKind::FeedWater, 0), 20.0);
    r.set_volume(volume);
    Object::Reservoir(r)
}

fn feed_key() -> Key {
    Identity::new(ObjectKind::FeedWater, 0).key()
}

fn add_pump(app: &mut AppService, sink: &mut RecordingSink, index: u8) -> Key {
    let pump = Actuator::new(Identity::new(ObjectKind::WaterPump, index), RecordingOutput::new().boxed())
        .with_flow_rate(2.0);
    let key = pump.key();
    app.add(Object::Actuator(pump), sink).unwrap();
    key
}

fn observers(app: &AppService) -> usize {
    app.reservoir(feed_key()).map_or(0, |r| r.observers().len())
}

#[test]
fn link_set_before_target_exists_resolves_on_tick() {
    let mut app = AppService::new(SystemConfig::default());
    let mut sink = RecordingSink::new();
    let pump = add_pump(&mut app, &mut sink, 0);

    assert!(app.link(pump, LinkSlot::Container, "FeedWater1").unwrap());
    assert!(!app.actuator(pump).unwrap().container().is_resolved());

    app.add(feed(10.0), &mut sink).unwrap();
    assert!(!app.actuator(pump).unwrap().container().is_resolved());
    app.tick(100, &mut sink);
    assert!(app.actuator(pump).unwrap().container().is_resolved());
    assert_eq!(observers(&app), 1);

    // Resolution on later ticks does not attach again.
    app.tick(200, &mut sink);
    app.tick(300, &mut sink);
    assert_eq!(observers(&app), 1);
}

#[test]
fn destroying_target_unresolves_every_link() {
    let mut app = AppService::new(SystemConfig::default());
    let mut sink = RecordingSink::new();
    app.add(feed(10.0), &mut sink).unwrap();
    let pumps: Vec<Key> = (0..4).map(|i| add_pump(&mut app, &mut sink, i)).collect();
    for pump in &pumps {
        app.link(*pump, LinkSlot::Container, feed_key()).unwrap();
    }
    assert_eq!(observers(&app), 4);

    app.remove(feed_key(), &mut sink).unwrap();
    for pump in &pumps {
        let link = app.actuator(*pump).unwrap().container();
        assert!(!link.is_resolved());
        assert_eq!(link.key(), Some(feed_key()), "key is kept for re-binding");
    }
}

#[test]
fn recreated_target_is_rebound() {
    let mut app = AppService::new(SystemConfig::default());
    let mut sink = RecordingSink::new();
    app.add(feed(10.0), &mut sink).unwrap();
    let pump = add_pump(&mut app, &mut sink, 0);
    app.link(pump, LinkSlot::Container, feed_key()).unwrap();
    let _h = app.enable(pump, 1.0, None).unwrap();
    app.tick(100, &mut sink);
    assert!(app.is_enabled(pump));

    app.remove(feed_key(), &mut sink).unwrap();
    app.tick(200, &mut sink);
    assert!(!app.is_enabled(pump), "unresolved container denies");

    app.add(feed(10.0), &mut sink).unwrap();
    app.tick(300, &mut sink);
    assert!(app.actuator(pump).unwrap().container().is_resolved());
    assert!(app.is_enabled(pump));
    assert_eq!(observers(&app), 1);
}

#[test]
fn removing_actuator_invalidates_handles_and_detaches() {
    let mut app = AppService::new(SystemConfig::default());
    let mut sink = RecordingSink::new();
    app.add(feed(10.0), &mut sink).unwrap();
    let pump = add_pump(&mut app, &mut sink, 0);
    app.link(pump, LinkSlot::Container, feed_key()).unwrap();
    let h = app.enable(pump, 1.0, None).unwrap();
    app.tick(100, &mut sink);
    assert_eq!(h.state(), HandleState::Active);

    app.remove(pump, &mut sink).unwrap();
    assert_eq!(sink.deactivations(pump), 1);
    assert_eq!(h.state(), HandleState::Invalid);
    assert!(h.actuator_key().is_none());
    assert_eq!(observers(&app), 0);
    assert_eq!(
        app.enable(pump, 1.0, None).unwrap_err(),
        Error::Registry(RegistryError::NotFound(pump))
    );
}

#[test]
fn retargeting_moves_the_observer() {
    let mut app = AppService::new(SystemConfig::default());
    let mut sink = RecordingSink::new();
    app.add(feed(10.0), &mut sink).unwrap();
    let mains = Reservoir::new(Identity::new(ObjectKind::MainsWater, 0), 0.0);
    let mains_key = mains.key();
    app.add(Object::Reservoir(mains), &mut sink).unwrap();
    let pump = add_pump(&mut app, &mut sink, 0);

    app.link(pump, LinkSlot::Container, feed_key()).unwrap();
    assert!(!app.link(pump, LinkSlot::Container, feed_key()).unwrap());
    app.link(pump, LinkSlot::Container, mains_key).unwrap();

    assert_eq!(observers(&app), 0);
    assert_eq!(app.reservoir(mains_key).unwrap().observers(), [pump]);
}

#[test]
fn link_command_with_empty_target_clears() {
    let mut app = AppService::new(SystemConfig::default());
    let mut sink = RecordingSink::new();
    app.add(feed(10.0), &mut sink).unwrap();
    let pump = add_pump(&mut app, &mut sink, 0);

    let mut target = KeyString::new();
    target.push_str("FeedWater1").unwrap();
    app.handle_command(
        AppCommand::Link {
            key: pump,
            slot: LinkSlot::Container,
            target,
        },
        &mut sink,
    )
    .unwrap();
    assert_eq!(observers(&app), 1);

    app.handle_command(
        AppCommand::Link {
            key: pump,
            slot: LinkSlot::Container,
            target: KeyString::new(),
        },
        &mut sink,
    )
    .unwrap();
    assert_eq!(observers(&app), 0);
    assert!(!app.actuator(pump).unwrap().container().is_set());
}

#[test]
fn linking_a_reservoir_is_wrong_kind() {
    let mut app = AppService::new(SystemConfig::default());
    let mut sink = RecordingSink::new();
    app.add(feed(10.0), &mut sink).unwrap();
    assert_eq!(
        app.link(feed_key(), LinkSlot::Rail, "AcPower1").unwrap_err(),
        Error::Registry(RegistryError::WrongKind(feed_key()))
    );
}

#[test]
fn pump_volume_times_from_flow_rate() {
    let mut app = AppService::new(SystemConfig::default());
    let mut sink = RecordingSink::new();
    let pump = add_pump(&mut app, &mut sink, 0);
    assert!(!app.pump_volume(pump, 1.0).unwrap().is_valid());

    app.add(feed(10.0), &mut sink).unwrap();
    app.link(pump, LinkSlot::Container, feed_key()).unwrap();
    let h = app.pump_volume(pump, 0.5).unwrap();
    assert_eq!(h.duration_ms(), Some(15_000));
}
