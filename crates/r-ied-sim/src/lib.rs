//! ---
//! ied_section: "03-simulation"
//! ied_subsection: "module"
//! ied_type: "source"
//! ied_scope: "code"
//! ied_description: "Relay demonstration model and periodic simulation driver."
//! ied_version: "v0.0.0-prealpha"
//! ied_owner: "tbd"
//! ---
//! Stand-in for the protection logic of a real relay: a built-in model and a
//! loop that refreshes measurements, raises alarms and watches the
//! operator-controlled indications.

pub mod driver;
pub mod relay;

pub use driver::{
    spawn_relay_simulation, RelaySimulator, SimulatorHandle, TickOutcome, ALARM_PERIOD,
    MEASUREMENT_PERIOD,
};
pub use relay::{relay_model, relay_path, IED, LOGICAL_DEVICE, MEASUREMENT_NODE, RELAY_NODES};
