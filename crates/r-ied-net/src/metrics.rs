//! ---
//! ied_section: "05-networking-external-interfaces"
//! ied_subsection: "module"
//! ied_type: "source"
//! ied_scope: "code"
//! ied_description: "Prometheus counters for frame ingestion and query traffic."
//! ied_version: "v0.0.0-prealpha"
//! ied_owner: "tbd"
//! ---
use std::sync::Arc;

use anyhow::Result;
use prometheus::{IntCounterVec, Opts, Registry};
use r_ied_model::{BatchReport, ErrorCode};

/// Shared registry type used across the runtime.
pub type SharedRegistry = Arc<Registry>;

/// Produce a new shared registry.
pub fn new_registry() -> SharedRegistry {
    Arc::new(Registry::new())
}

/// Counters recorded by the frame listener and the REST transport.
#[derive(Clone, Debug)]
pub struct IedMetrics {
    registry: SharedRegistry,
    frames: IntCounterVec,
    frame_updates: IntCounterVec,
    queries: IntCounterVec,
}

impl IedMetrics {
    pub fn new(registry: SharedRegistry) -> Result<Self> {
        let frames = IntCounterVec::new(
            Opts::new("r_ied_frames_total", "Captured frames handed to the decoder"),
            &["outcome"],
        )?;
        registry.register(Box::new(frames.clone()))?;

        let frame_updates = IntCounterVec::new(
            Opts::new(
                "r_ied_frame_updates_total",
                "Attribute updates carried by decoded frames",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(frame_updates.clone()))?;

        let queries = IntCounterVec::new(
            Opts::new("r_ied_queries_total", "Query port requests by operation"),
            &["op", "outcome"],
        )?;
        registry.register(Box::new(queries.clone()))?;

        Ok(Self {
            registry,
            frames,
            frame_updates,
            queries,
        })
    }

    pub fn registry(&self) -> SharedRegistry {
        self.registry.clone()
    }

    pub fn record_frame(&self, report: BatchReport) {
        self.frames.with_label_values(&["decoded"]).inc();
        self.frame_updates
            .with_label_values(&["applied"])
            .inc_by(report.applied as u64);
        self.frame_updates
            .with_label_values(&["skipped"])
            .inc_by(report.skipped as u64);
    }

    pub fn record_rejected_frame(&self) {
        self.frames.with_label_values(&["rejected"]).inc();
    }

    /// `code` is `None` for a successful request.
    pub fn record_query(&self, op: &str, code: Option<ErrorCode>) {
        let outcome = code.map_or_else(|| "ok".to_owned(), |code| code.to_string());
        self.queries.with_label_values(&[op, &outcome]).inc();
    }
}
