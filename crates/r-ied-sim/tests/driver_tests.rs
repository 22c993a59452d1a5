//! ---
//! ied_section: "03-simulation"
//! ied_subsection: "tests"
//! ied_type: "test"
//! ied_scope: "code"
//! ied_description: "Tick behaviour of the relay simulation driver."
//! ied_version: "v0.0.0-prealpha"
//! ied_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Duration;

use r_ied_common::config::SimulationConfig;
use r_ied_model::{ModelStore, Value, Vector};
use r_ied_sim::{
    relay_model, relay_path, spawn_relay_simulation, RelaySimulator, ALARM_PERIOD,
    MEASUREMENT_PERIOD, RELAY_NODES,
};

fn store() -> ModelStore {
    relay_model().build().expect("relay model builds")
}

fn config(seed: u64) -> SimulationConfig {
    SimulationConfig {
        random_seed: seed,
        ..SimulationConfig::default()
    }
}

fn vector(store: &ModelStore, node: &str, suffix: &str) -> Vector {
    store
        .get(&relay_path(node, suffix))
        .unwrap()
        .value
        .as_vector()
        .expect("vector leaf")
}

#[test]
fn measurements_refresh_every_fifth_tick() {
    let store = store();
    let mut sim = RelaySimulator::new(&store, &config(7)).unwrap();

    for _ in 1..MEASUREMENT_PERIOD {
        let outcome = sim.tick();
        assert!(!outcome.measurements_written);
    }
    let hz = relay_path(RELAY_NODES[0], "Hz.mag");
    assert_eq!(store.get(&hz).unwrap().value, Value::Float32(0.0));

    let outcome = sim.tick();
    assert!(outcome.measurements_written);
    assert_eq!(outcome.failed_writes, 0);

    let phase_voltage = (11_000.0 / 3f64.sqrt()) as f32;
    for node in RELAY_NODES {
        assert_eq!(
            store.get(&relay_path(node, "Hz.mag")).unwrap().value,
            Value::Float32(50.0)
        );
        assert_eq!(
            vector(&store, node, "PhV.phsB.cVal"),
            Vector::new(phase_voltage, -120.0)
        );
        assert_eq!(vector(&store, node, "SeqV.phsB.cVal"), Vector::new(0.0, -120.0));
        assert_eq!(vector(&store, node, "V1.phsA.cVal"), Vector::new(phase_voltage, 0.0));

        let current = vector(&store, node, "SeqA.phsA.cVal");
        assert!((100.0..600.0).contains(&current.mag));
        assert!((-30.0..=0.0).contains(&current.ang));
        let a1 = vector(&store, node, "A1.phsA.cVal");
        assert_eq!(a1, current);
        let a1_c = vector(&store, node, "A1.phsC.cVal");
        assert_eq!(a1_c, Vector::new(current.mag, current.ang + 120.0));

        assert_eq!(
            store.get(&relay_path(node, "Ind.Trip")).unwrap().value,
            Value::Boolean(true)
        );
    }
}

#[test]
fn first_trip_resets_alarm_counter_and_timer() {
    let store = store();
    let alarms = relay_path(RELAY_NODES[0], "Ind.NumOfAlarms");
    store.set(&alarms, "9").unwrap();

    let mut sim = RelaySimulator::new(&store, &config(1)).unwrap();
    let mut tripped_at = None;
    for _ in 0..MEASUREMENT_PERIOD {
        let outcome = sim.tick();
        if outcome.trip_changed {
            tripped_at = Some(outcome.tick);
        }
    }
    assert_eq!(tripped_at, Some(u64::from(MEASUREMENT_PERIOD)));
    assert_eq!(store.get(&alarms).unwrap().value, Value::Int32(0));

    // The reset restarts the alarm period from the trip tick.
    let mut raised = Vec::new();
    for _ in 0..ALARM_PERIOD {
        let outcome = sim.tick();
        if outcome.alarm_raised {
            raised.push(outcome.tick);
        }
    }
    assert_eq!(raised, vec![u64::from(MEASUREMENT_PERIOD + ALARM_PERIOD)]);
    assert_eq!(store.get(&alarms).unwrap().value, Value::Int32(1));
}

#[test]
fn alarm_increment_builds_on_operator_value() {
    let store = store();
    let alarms = relay_path(RELAY_NODES[0], "Ind.NumOfAlarms");
    let mut sim = RelaySimulator::new(&store, &config(5)).unwrap();
    for _ in 0..MEASUREMENT_PERIOD {
        sim.tick();
    }
    store.set(&alarms, "40").unwrap();

    let mut raised = 0;
    for _ in 0..ALARM_PERIOD {
        let outcome = sim.tick();
        assert_eq!(outcome.failed_writes, 0);
        raised += usize::from(outcome.alarm_raised);
    }
    assert_eq!(raised, 1);
    assert_eq!(store.get(&alarms).unwrap().value, Value::Int32(41));
}

#[test]
fn operator_trip_reset_clears_alarms() {
    let store = store();
    let mut sim = RelaySimulator::new(&store, &config(3)).unwrap();
    for _ in 0..MEASUREMENT_PERIOD {
        sim.tick();
    }
    let trip = relay_path(RELAY_NODES[0], "Ind.Trip");
    let alarms = relay_path(RELAY_NODES[0], "Ind.NumOfAlarms");
    store.set(&alarms, "4").unwrap();
    store.set(&trip, "false").unwrap();

    let outcome = sim.tick();
    assert!(outcome.trip_changed);
    assert_eq!(store.get(&alarms).unwrap().value, Value::Int32(0));
}

#[test]
fn led_test_change_is_detected_once() {
    let store = store();
    let mut sim = RelaySimulator::new(&store, &config(3)).unwrap();
    assert!(!sim.tick().led_test_changed);
    store
        .set(&relay_path(RELAY_NODES[0], "Ind.LEDTest"), "1")
        .unwrap();
    assert!(sim.tick().led_test_changed);
    assert!(!sim.tick().led_test_changed);
}

#[test]
fn seeded_runs_are_reproducible() {
    let sample = |seed: u64| {
        let store = store();
        let mut sim = RelaySimulator::new(&store, &config(seed)).unwrap();
        for _ in 0..MEASUREMENT_PERIOD {
            sim.tick();
        }
        RELAY_NODES
            .iter()
            .map(|node| vector(&store, node, "SeqA.phsA.cVal"))
            .collect::<Vec<_>>()
    };
    assert_eq!(sample(42), sample(42));
}

#[test]
fn noise_perturbs_voltage_magnitudes() {
    let store = store();
    let noisy = SimulationConfig {
        noise_sigma: 25.0,
        ..config(11)
    };
    let mut sim = RelaySimulator::new(&store, &noisy).unwrap();
    for _ in 0..MEASUREMENT_PERIOD {
        sim.tick();
    }
    let nominal = (11_000.0 / 3f64.sqrt()) as f32;
    let magnitudes: Vec<f32> = RELAY_NODES
        .iter()
        .map(|node| vector(&store, node, "PhV.phsA.cVal").mag)
        .collect();
    assert!(magnitudes.iter().any(|mag| *mag != nominal));
    assert!(magnitudes.iter().all(|mag| (mag - nominal).abs() < 500.0));
}

#[tokio::test]
async fn spawned_loop_ticks_until_shutdown() {
    let store = Arc::new(store());
    let config = SimulationConfig {
        tick_interval: Duration::from_millis(2),
        ..config(5)
    };
    let handle = spawn_relay_simulation(Arc::clone(&store), &config).unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;
    let ticks = handle.shutdown().await.unwrap();
    assert!(ticks >= u64::from(MEASUREMENT_PERIOD));
    assert_eq!(
        store
            .get(&relay_path(RELAY_NODES[3], "Hz.mag"))
            .unwrap()
            .value,
        Value::Float32(50.0)
    );
}

#[tokio::test]
async fn bounded_run_stops_on_its_own() {
    let store = Arc::new(store());
    let config = SimulationConfig {
        tick_interval: Duration::from_millis(1),
        run_for: Some(Duration::from_millis(20)),
        ..config(5)
    };
    let handle = spawn_relay_simulation(store, &config).unwrap();
    let ticks = tokio::time::timeout(Duration::from_secs(5), handle.join())
        .await
        .expect("bounded run finishes")
        .unwrap();
    assert!(ticks > 0);
}
