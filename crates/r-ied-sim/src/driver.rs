//! ---
//! ied_section: "03-simulation"
//! ied_subsection: "module"
//! ied_type: "source"
//! ied_scope: "code"
//! ied_description: "Periodic relay simulation writing through cached leaf handles."
//! ied_version: "v0.0.0-prealpha"
//! ied_owner: "tbd"
//! ---
use std::sync::Arc;

use anyhow::{Context, Result};
use r_ied_common::config::SimulationConfig;
use r_ied_model::{LeafHandle, ModelStore, QualityHint, Value, Vector};
use rand::prelude::*;
use rand_distr::Normal;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::relay::{relay_path, PHASES, RELAY_NODES};

/// Ticks between measurement refreshes.
pub const MEASUREMENT_PERIOD: u32 = 5;
/// Ticks between alarm counter increments on the first relay.
pub const ALARM_PERIOD: u32 = 100;

const NOMINAL_FREQUENCY_HZ: f32 = 50.0;
const LINE_VOLTAGE_V: f64 = 11_000.0;
const PHASE_SHIFT_DEG: f32 = 120.0;

/// One WYE data object: `phsA`, `phsB`, `phsC`, `neut` complex values.
#[derive(Debug, Clone)]
struct Wye {
    phases: [LeafHandle; 4],
}

impl Wye {
    fn resolve(store: &ModelStore, node: &str, object: &str) -> Result<Self> {
        let [a, b, c, n] = PHASES;
        let handle = |phase: &str| {
            let path = relay_path(node, &format!("{object}.{phase}.cVal"));
            store
                .handle(&path)
                .with_context(|| format!("relay model lacks {path}"))
        };
        Ok(Self {
            phases: [handle(a)?, handle(b)?, handle(c)?, handle(n)?],
        })
    }
}

/// Cached handles for one protection relay logical node.
#[derive(Debug, Clone)]
struct RelayHandles {
    name: &'static str,
    hz: LeafHandle,
    phv: Wye,
    seqv: Wye,
    v1: Wye,
    seqa: Wye,
    a1: Wye,
    trip: LeafHandle,
    led_test: LeafHandle,
    alarms: LeafHandle,
}

impl RelayHandles {
    fn resolve(store: &ModelStore, name: &'static str) -> Result<Self> {
        let leaf = |suffix: &str| {
            let path = relay_path(name, suffix);
            store
                .handle(&path)
                .with_context(|| format!("relay model lacks {path}"))
        };
        Ok(Self {
            name,
            hz: leaf("Hz.mag")?,
            phv: Wye::resolve(store, name, "PhV")?,
            seqv: Wye::resolve(store, name, "SeqV")?,
            v1: Wye::resolve(store, name, "V1")?,
            seqa: Wye::resolve(store, name, "SeqA")?,
            a1: Wye::resolve(store, name, "A1")?,
            trip: leaf("Ind.Trip")?,
            led_test: leaf("Ind.LEDTest")?,
            alarms: leaf("Ind.NumOfAlarms")?,
        })
    }
}

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickOutcome {
    pub tick: u64,
    pub measurements_written: bool,
    pub alarm_raised: bool,
    pub trip_changed: bool,
    pub led_test_changed: bool,
    pub failed_writes: usize,
}

/// Drives the demonstration relays. All writes go through handles resolved
/// once in [`RelaySimulator::new`].
#[derive(Debug)]
pub struct RelaySimulator {
    relays: Vec<RelayHandles>,
    rng: StdRng,
    noise: Option<Normal<f64>>,
    tick_count: u64,
    measurement_timer: u32,
    alarm_timer: u32,
    led_test_monitor: bool,
    trip_monitor: bool,
}

impl RelaySimulator {
    pub fn new(store: &ModelStore, config: &SimulationConfig) -> Result<Self> {
        let relays = RELAY_NODES
            .into_iter()
            .map(|name| RelayHandles::resolve(store, name))
            .collect::<Result<Vec<_>>>()?;
        let noise = if config.noise_sigma > 0.0 {
            Some(
                Normal::new(0.0, config.noise_sigma)
                    .with_context(|| format!("invalid noise sigma {}", config.noise_sigma))?,
            )
        } else {
            None
        };
        let led_test_monitor = relays.first().is_some_and(|r| read_bool(&r.led_test));
        let trip_monitor = relays.first().is_some_and(|r| read_bool(&r.trip));
        debug!(
            relays = relays.len(),
            seed = config.random_seed,
            noise_sigma = config.noise_sigma,
            "relay simulator prepared"
        );
        Ok(Self {
            relays,
            rng: StdRng::seed_from_u64(config.random_seed),
            noise,
            tick_count: 0,
            measurement_timer: 0,
            alarm_timer: 0,
            led_test_monitor,
            trip_monitor,
        })
    }

    pub fn ticks(&self) -> u64 {
        self.tick_count
    }

    /// Advance one period. Failed writes are logged and counted; they never
    /// abort the tick.
    pub fn tick(&mut self) -> TickOutcome {
        self.tick_count += 1;
        let mut outcome = TickOutcome {
            tick: self.tick_count,
            ..TickOutcome::default()
        };

        self.measurement_timer += 1;
        if self.measurement_timer == MEASUREMENT_PERIOD {
            self.measurement_timer = 0;
            outcome.failed_writes += self.write_measurements();
            outcome.measurements_written = true;
        }

        let Some(first) = self.relays.first() else {
            return outcome;
        };

        self.alarm_timer += 1;
        if self.alarm_timer == ALARM_PERIOD {
            self.alarm_timer = 0;
            let raised = first.alarms.update(
                |count| Value::Int32(count.as_i32().unwrap_or_default().saturating_add(1)),
                QualityHint::Fresh,
            );
            outcome.failed_writes += record(&first.alarms, raised.map(drop));
            outcome.alarm_raised = true;
        }

        let led_test = read_bool(&first.led_test);
        if led_test != self.led_test_monitor {
            self.led_test_monitor = led_test;
            outcome.led_test_changed = true;
            info!(relay = first.name, led_test, "LED lamp test");
        }

        let trip = read_bool(&first.trip);
        if trip != self.trip_monitor {
            self.trip_monitor = trip;
            self.alarm_timer = 0;
            outcome.trip_changed = true;
            outcome.failed_writes += record(
                &first.alarms,
                first.alarms.write(Value::Int32(0), QualityHint::Fresh),
            );
            info!(relay = first.name, trip, "trip state changed; alarms reset");
        }

        outcome
    }

    fn write_measurements(&mut self) -> usize {
        let phase_voltage = (LINE_VOLTAGE_V / 3f64.sqrt()) as f32;
        let mut failed = 0;
        for relay in &self.relays {
            let current_mag = self.rng.gen_range(100.0f32..600.0);
            let current_ang = self.rng.gen_range(-30.0f32..=0.0);
            let noise = match &self.noise {
                Some(noise) => noise.sample(&mut self.rng) as f32,
                None => 0.0,
            };
            let voltage = phase_voltage + noise;

            failed += record(
                &relay.hz,
                relay.hz.write(Value::Float32(NOMINAL_FREQUENCY_HZ), QualityHint::Fresh),
            );
            failed += write_wye(
                &relay.phv,
                [
                    (voltage, 0.0),
                    (voltage, -PHASE_SHIFT_DEG),
                    (voltage, PHASE_SHIFT_DEG),
                    (0.0, 0.0),
                ],
            );
            // Positive-sequence style objects only carry magnitude on phsA.
            let sequence = [
                (voltage, 0.0),
                (0.0, -PHASE_SHIFT_DEG),
                (0.0, PHASE_SHIFT_DEG),
                (0.0, 0.0),
            ];
            failed += write_wye(&relay.seqv, sequence);
            failed += write_wye(&relay.v1, sequence);
            failed += write_wye(
                &relay.seqa,
                [
                    (current_mag, current_ang),
                    (0.0, -PHASE_SHIFT_DEG),
                    (0.0, PHASE_SHIFT_DEG),
                    (0.0, 0.0),
                ],
            );
            failed += write_wye(
                &relay.a1,
                [
                    (current_mag, current_ang),
                    (current_mag, current_ang - PHASE_SHIFT_DEG),
                    (current_mag, current_ang + PHASE_SHIFT_DEG),
                    (0.0, 0.0),
                ],
            );
            failed += record(
                &relay.trip,
                relay.trip.write(Value::Boolean(true), QualityHint::Fresh),
            );
        }
        failed
    }

    /// Run on a tokio interval until `shutdown` flips or `run_for` elapses.
    pub fn spawn(mut self, config: &SimulationConfig) -> SimulatorHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let period = config.tick_interval;
        let deadline = config.run_for.map(|limit| Instant::now() + limit);
        let task = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first interval tick completes immediately.
            ticker.tick().await;
            info!(period_ms = period.as_millis() as u64, "relay simulation started");
            loop {
                tokio::select! {
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            debug!(ticks = self.tick_count, "relay simulation shutdown received");
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        let outcome = self.tick();
                        if outcome.failed_writes > 0 {
                            warn!(tick = outcome.tick, failed = outcome.failed_writes, "tick completed with failed writes");
                        }
                        if deadline.is_some_and(|at| Instant::now() >= at) {
                            info!(ticks = self.tick_count, "relay simulation reached its run limit");
                            break;
                        }
                    }
                }
            }
            self.tick_count
        });
        SimulatorHandle {
            shutdown: shutdown_tx,
            task,
        }
    }
}

/// Background simulation task plus its stop switch.
#[derive(Debug)]
pub struct SimulatorHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<u64>,
}

impl SimulatorHandle {
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Signal the loop and wait for it; returns the number of ticks run.
    pub async fn shutdown(self) -> Result<u64> {
        let _ = self.shutdown.send(true);
        self.task.await.context("relay simulation task failed")
    }

    /// Wait for a loop bounded by `run_for` to end on its own.
    pub async fn join(self) -> Result<u64> {
        self.task.await.context("relay simulation task failed")
    }
}

/// Convenience used by the daemon: build handles and spawn in one go.
pub fn spawn_relay_simulation(
    store: Arc<ModelStore>,
    config: &SimulationConfig,
) -> Result<SimulatorHandle> {
    let simulator = RelaySimulator::new(&store, config)?;
    Ok(simulator.spawn(config))
}

fn write_wye(wye: &Wye, values: [(f32, f32); 4]) -> usize {
    wye.phases
        .iter()
        .zip(values)
        .map(|(handle, (mag, ang))| {
            record(
                handle,
                handle.write(Value::Vector(Vector::new(mag, ang)), QualityHint::Fresh),
            )
        })
        .sum()
}

fn read_bool(handle: &LeafHandle) -> bool {
    handle.read().value.as_bool().unwrap_or_default()
}

fn record(handle: &LeafHandle, result: r_ied_model::Result<()>) -> usize {
    match result {
        Ok(()) => 0,
        Err(err) => {
            warn!(path = handle.path(), error = %err, "simulated write rejected");
            1
        }
    }
}
