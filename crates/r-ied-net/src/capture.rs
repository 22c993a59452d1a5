//! ---
//! ied_section: "05-networking-external-interfaces"
//! ied_subsection: "module"
//! ied_type: "source"
//! ied_scope: "code"
//! ied_description: "Frame hand-off from the capture collaborator into the model store."
//! ied_version: "v0.0.0-prealpha"
//! ied_owner: "tbd"
//! ---
//! The capture side pushes raw frames into a bounded channel; a listener task
//! decodes each one and applies the resulting batch through
//! [`ModelStore::apply_frame_update`].

use std::sync::Arc;

use bytes::Bytes;
use r_ied_model::{BatchReport, FrameUpdate, ModelStore, Quality, QualityHint, Value};
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::metrics::IedMetrics;

/// Errors raised while turning a captured frame into updates.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame is empty")]
    Empty,
    #[error("malformed frame: {0}")]
    Malformed(String),
}

/// Turns one captured frame into typed attribute updates.
pub trait FrameDecoder: Send + Sync + 'static {
    fn decode(&self, frame: &[u8]) -> Result<Vec<FrameUpdate>, FrameError>;
}

/// Decodes JSON batches, used to replay recorded frames:
///
/// ```json
/// [{ "path": "S1/C1.exampleMMXU_1.A.phsA.cVal.mag.f",
///    "value": { "type": "float32", "value": 42.5 },
///    "quality": "suspect" }]
/// ```
///
/// `quality` is optional (`fresh`), and may also be an explicit quality word
/// (`"questionable|oldData"`, `"0x0083"` or a number).
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFrameDecoder;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct WireUpdate {
    path: String,
    value: Value,
    #[serde(default)]
    quality: Option<WireQuality>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireQuality {
    Bits(u16),
    Text(String),
}

impl WireQuality {
    fn into_hint(self) -> Result<QualityHint, FrameError> {
        match self {
            WireQuality::Bits(bits) => Quality::try_from(bits)
                .map(QualityHint::Explicit)
                .map_err(|err| FrameError::Malformed(err.to_string())),
            WireQuality::Text(text) => match text.trim() {
                t if t.eq_ignore_ascii_case("fresh") => Ok(QualityHint::Fresh),
                t if t.eq_ignore_ascii_case("suspect") => Ok(QualityHint::Suspect),
                t => Quality::parse(t)
                    .map(QualityHint::Explicit)
                    .map_err(|err| FrameError::Malformed(err.to_string())),
            },
        }
    }
}

impl FrameDecoder for JsonFrameDecoder {
    fn decode(&self, frame: &[u8]) -> Result<Vec<FrameUpdate>, FrameError> {
        if frame.iter().all(u8::is_ascii_whitespace) {
            return Err(FrameError::Empty);
        }
        let wire: Vec<WireUpdate> =
            serde_json::from_slice(frame).map_err(|err| FrameError::Malformed(err.to_string()))?;
        wire.into_iter()
            .map(|entry| -> Result<FrameUpdate, FrameError> {
                let quality = match entry.quality {
                    Some(quality) => quality.into_hint()?,
                    None => QualityHint::Fresh,
                };
                Ok(FrameUpdate::at_path(entry.path, entry.value).with_quality(quality))
            })
            .collect()
    }
}

/// Bounded hand-off between the capture collaborator and the listener.
pub fn frame_channel(capacity: usize) -> (mpsc::Sender<Bytes>, mpsc::Receiver<Bytes>) {
    mpsc::channel(capacity.max(1))
}

/// Builder for the frame listener task.
#[derive(Clone)]
pub struct FrameListener {
    store: Arc<ModelStore>,
    decoder: Arc<dyn FrameDecoder>,
    metrics: Option<IedMetrics>,
}

impl FrameListener {
    pub fn new(store: Arc<ModelStore>, decoder: Arc<dyn FrameDecoder>) -> Self {
        Self {
            store,
            decoder,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: IedMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Decode and apply one frame. Undecodable frames are dropped whole.
    pub fn process(&self, frame: &[u8]) -> Result<BatchReport, FrameError> {
        let updates = match self.decoder.decode(frame) {
            Ok(updates) => updates,
            Err(err) => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_rejected_frame();
                }
                return Err(err);
            }
        };
        let report = self.store.apply_frame_update(updates);
        if let Some(metrics) = &self.metrics {
            metrics.record_frame(report);
        }
        Ok(report)
    }

    /// Consume frames until every sender is dropped; returns the running totals.
    pub fn spawn(self, mut frames: mpsc::Receiver<Bytes>) -> JoinHandle<BatchReport> {
        tokio::spawn(async move {
            info!("frame listener started");
            let mut totals = BatchReport::default();
            let mut rejected = 0usize;
            while let Some(frame) = frames.recv().await {
                match self.process(&frame) {
                    Ok(report) => {
                        if !report.is_complete() {
                            debug!(
                                applied = report.applied,
                                skipped = report.skipped,
                                "frame partially applied"
                            );
                        }
                        totals += report;
                    }
                    Err(err) => {
                        rejected += 1;
                        warn!(error = %err, len = frame.len(), "dropping undecodable frame");
                    }
                }
            }
            info!(
                applied = totals.applied,
                skipped = totals.skipped,
                rejected,
                "frame listener stopped"
            );
            totals
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use r_ied_model::{ModelBuilder, TypeDecl, Validity, Vector};

    fn store() -> Arc<ModelStore> {
        let store = ModelBuilder::new()
            .ied("R1", |ied| {
                ied.logical_device("C1", |ld| {
                    ld.logical_node("MMXU1", |ln| {
                        ln.data_object("A", |a| {
                            a.data_object("phsA", |phs| {
                                phs.attribute("cVal", TypeDecl::Vector);
                            });
                        })
                        .data_object("Hz", |d| {
                            d.attribute("mag", TypeDecl::Float32);
                        });
                    });
                });
            })
            .build()
            .unwrap();
        Arc::new(store)
    }

    #[test]
    fn json_decoder_reads_typed_values_and_quality() {
        let updates = JsonFrameDecoder
            .decode(
                br#"[
                    {"path": "R1/C1.MMXU1.Hz.mag", "value": {"type": "float32", "value": 49.9}},
                    {"path": "R1/C1.MMXU1.A.phsA.cVal", "value": {"type": "vector", "value": {"mag": 2.0, "ang": -10.0}}, "quality": "suspect"},
                    {"path": "R1/C1.MMXU1.Hz.mag", "value": {"type": "float32", "value": 50.0}, "quality": "questionable|oldData"}
                ]"#,
            )
            .unwrap();
        assert_eq!(updates.len(), 3);
        assert_eq!(updates[0].quality, QualityHint::Fresh);
        assert_eq!(updates[1].value, Value::Vector(Vector::new(2.0, -10.0)));
        assert_eq!(updates[1].quality, QualityHint::Suspect);
        let QualityHint::Explicit(quality) = updates[2].quality else {
            panic!("expected explicit quality");
        };
        assert!(quality.contains(Quality::OLD_DATA));
    }

    #[test]
    fn json_decoder_rejects_garbage() {
        assert!(matches!(JsonFrameDecoder.decode(b"  "), Err(FrameError::Empty)));
        assert!(matches!(
            JsonFrameDecoder.decode(b"{not json"),
            Err(FrameError::Malformed(_))
        ));
        assert!(matches!(
            JsonFrameDecoder.decode(br#"[{"path": "x", "value": {"type": "float32", "value": 1.0}, "quality": "sideways"}]"#),
            Err(FrameError::Malformed(_))
        ));
        assert!(matches!(
            JsonFrameDecoder.decode(br#"[{"path": "x", "value": {"type": "float32", "value": 1.0}, "quality": 57344}]"#),
            Err(FrameError::Malformed(_))
        ));
    }

    #[test]
    fn process_applies_valid_entries_and_counts_the_rest() {
        let store = store();
        let listener = FrameListener::new(store.clone(), Arc::new(JsonFrameDecoder));
        let report = listener
            .process(
                br#"[
                    {"path": "R1/C1.MMXU1.Hz.mag", "value": {"type": "float32", "value": 50.1}, "quality": "suspect"},
                    {"path": "R1/C1.MMXU1.Hz.nope", "value": {"type": "float32", "value": 1.0}},
                    {"path": "R1/C1.MMXU1.Hz.mag", "value": {"type": "int32", "value": 3}}
                ]"#,
            )
            .unwrap();
        assert_eq!(report, BatchReport { applied: 1, skipped: 2 });
        let hz = store.get("R1/C1.MMXU1.Hz.mag").unwrap();
        assert_eq!(hz.value, Value::Float32(50.1));
        assert_eq!(hz.quality.validity(), Validity::Questionable);
    }

    #[tokio::test]
    async fn listener_drains_channel_until_closed() {
        let store = store();
        let (tx, rx) = frame_channel(4);
        let task = FrameListener::new(store.clone(), Arc::new(JsonFrameDecoder)).spawn(rx);

        for i in 0..10 {
            let frame = format!(
                r#"[{{"path": "R1.C1.MMXU1.A.phsA.cVal.mag.f", "value": {{"type": "float32", "value": {i}.0}}}}]"#
            );
            tx.send(Bytes::from(frame)).await.unwrap();
        }
        tx.send(Bytes::from_static(b"garbage")).await.unwrap();
        drop(tx);

        let totals = task.await.unwrap();
        assert_eq!(totals, BatchReport { applied: 10, skipped: 0 });
        let vector = store
            .get("R1/C1.MMXU1.A.phsA.cVal")
            .unwrap()
            .value
            .as_vector()
            .unwrap();
        assert_eq!(vector.mag, 9.0);
    }
}
