//! End-to-end dispatch: MIDI bytes in, joystick reports out

use midi_vjoy_gw::commands::{CommandStore, JsonFileRepository};
use midi_vjoy_gw::joystick::{
    FeederOptions, JoyManager, JoystickStatus, PollSchedule, SharedDriver, SimulatedDriver,
};
use midi_vjoy_gw::midi::LoopbackSource;
use midi_vjoy_gw::model::{
    AxisAction, AxisName, ButtonAction, ButtonNumber, ButtonSubtype, CommandKey, JoystickAction,
    MidiEvent,
};
use midi_vjoy_gw::tower::{DispatchOutcome, DispatchTower};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const DEVICE: &str = "nanoKONTROL2";

struct Rig {
    sim: SimulatedDriver,
    source: LoopbackSource,
    tower: Arc<DispatchTower>,
}

async fn build_rig(store: CommandStore) -> Rig {
    let sim = SimulatedDriver::with_devices(2);
    let joysticks = Arc::new(JoyManager::new(
        SharedDriver::new(sim.clone()),
        2,
        FeederOptions {
            click_hold: Duration::from_millis(20),
        },
        PollSchedule::default(),
    ));
    assert!(joysticks.acquire(1).await);

    let tower = Arc::new(DispatchTower::new(Arc::new(store), joysticks));
    let source = LoopbackSource::new(vec![DEVICE.to_string()]);
    assert_eq!(tower.attach(&source).unwrap(), 1);

    Rig { sim, source, tower }
}

/// Learn a control from the wire, then bind the learned command
fn bind_learned(rig: &Rig, key: &CommandKey, low: i32, high: i32, action: JoystickAction) {
    let learned = rig.tower.store().unbound_command(key).unwrap();
    let bound = learned.with_range(low, high).bind(action);
    assert!(rig.tower.store().add_command(bound));
}

#[tokio::test]
async fn test_learn_bind_and_feed_axis() {
    let rig = build_rig(CommandStore::in_memory()).await;
    let key = CommandKey::new(DEVICE, "Ctrl 0");

    assert!(rig.source.send_raw(DEVICE, &[0xB0, 0, 10]));
    assert_eq!(rig.tower.store().unbound_count(), 1);

    bind_learned(
        &rig,
        &key,
        0,
        127,
        JoystickAction::axis(1, AxisAction::absolute(AxisName::Y, 0.0)),
    );

    rig.source.send_raw(DEVICE, &[0xB0, 0, 127]);
    assert_eq!(rig.sim.report(1).unwrap().axis(AxisName::Y), 32767);

    rig.source.send_raw(DEVICE, &[0xB0, 0, 0]);
    assert_eq!(rig.sim.report(1).unwrap().axis(AxisName::Y), 0);
}

#[tokio::test]
async fn test_split_range_drives_two_buttons() {
    let rig = build_rig(CommandStore::in_memory()).await;
    let key = CommandKey::new(DEVICE, "Note C4");
    rig.source.send_raw(DEVICE, &[0x90, 60, 1]);

    let button = |n| ButtonAction::new(ButtonNumber::new(n).unwrap(), ButtonSubtype::Auto);
    bind_learned(&rig, &key, 0, 63, JoystickAction::button(1, button(1)));
    bind_learned(&rig, &key, 64, 127, JoystickAction::button(1, button(2)));

    let outcome = rig
        .tower
        .on_midi_event(MidiEvent::new(DEVICE, "Note C4", 100, 0, 127));
    assert_eq!(outcome, DispatchOutcome::Applied);
    assert_eq!(rig.sim.report(1).unwrap().buttons, 0b10);

    rig.source.send_raw(DEVICE, &[0x90, 60, 30]);
    assert_eq!(rig.sim.report(1).unwrap().buttons, 0b11);

    // Note off reads 0: button 1 drops, button 2 holds its last state
    rig.source.send_raw(DEVICE, &[0x80, 60, 0]);
    assert_eq!(rig.sim.report(1).unwrap().buttons, 0b10);
}

#[tokio::test]
async fn test_click_rejects_overlap_then_recovers() {
    let rig = build_rig(CommandStore::in_memory()).await;
    let key = CommandKey::new(DEVICE, "Ctrl 45");
    rig.source.send_raw(DEVICE, &[0xB0, 45, 127]);

    let click = ButtonAction::new(ButtonNumber::new(5).unwrap(), ButtonSubtype::Click);
    bind_learned(&rig, &key, 1, 127, JoystickAction::button(1, click));

    let outcomes = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&outcomes);
    rig.tower.subscribe(move |received| sink.lock().push(received.resolved));

    let press = MidiEvent::new(DEVICE, "Ctrl 45", 127, 0, 127);
    assert_eq!(rig.tower.on_midi_event(press.clone()), DispatchOutcome::Applied);
    assert_eq!(rig.tower.on_midi_event(press.clone()), DispatchOutcome::Rejected);

    tokio::time::sleep(Duration::from_millis(120)).await;
    assert_eq!(rig.sim.report(1).unwrap().buttons, 0);
    assert_eq!(rig.tower.on_midi_event(press), DispatchOutcome::Applied);

    assert_eq!(*outcomes.lock(), vec![true, true, true]);
}

#[tokio::test]
async fn test_bindings_survive_restart() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("commands.json");

    {
        let rig = build_rig(CommandStore::new(Arc::new(JsonFileRepository::new(&path)))).await;
        let key = CommandKey::new(DEVICE, "Pitch 1");
        rig.source.send_raw(DEVICE, &[0xE0, 0x00, 0x40]);
        bind_learned(
            &rig,
            &key,
            0,
            16384,
            JoystickAction::axis(2, AxisAction::absolute(AxisName::Steering, 0.0)),
        );
        assert_eq!(rig.tower.store().save_commands().await.unwrap(), 1);
        rig.tower.joysticks().shutdown().await;
    }

    let store = CommandStore::new(Arc::new(JsonFileRepository::new(&path)));
    assert_eq!(store.load_commands().await.unwrap(), 1);
    let rig = build_rig(store).await;

    assert!(rig.tower.joysticks().acquire(2).await);
    assert_eq!(
        rig.tower.joysticks().joystick(2).unwrap().status(),
        JoystickStatus::Engaged
    );

    rig.source.send_raw(DEVICE, &[0xE0, 0x7F, 0x7F]);
    let steering = rig.sim.report(2).unwrap().axis(AxisName::Steering);
    assert_eq!(steering, (16383.0_f64 / 16384.0 * 32767.0).round() as i32);
}
