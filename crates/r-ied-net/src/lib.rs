//! ---
//! ied_section: "05-networking-external-interfaces"
//! ied_subsection: "module"
//! ied_type: "source"
//! ied_scope: "code"
//! ied_description: "External surfaces of the relay runtime."
//! ied_version: "v0.0.0-prealpha"
//! ied_owner: "tbd"
//! ---
pub mod capture;
pub mod metrics;
pub mod rest;

pub use capture::{frame_channel, FrameDecoder, FrameError, FrameListener, JsonFrameDecoder};
pub use metrics::{new_registry, IedMetrics, SharedRegistry};
pub use rest::{status_for, RestApiBuilder, RestApiHandle};
