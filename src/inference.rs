//! Segmentation hand-off.
//!
//! Segmenters are plain synchronous functions over sample buffers. The
//! [`InferenceQueue`] runs them on worker threads and sends results back over
//! a channel; only [`InferenceQueue::drain`], called on the model thread,
//! touches records and layers.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use ndarray::{ArrayD, Axis, Ix3};
use uuid::Uuid;

use crate::error::{Result, VisionError};
use crate::image::{DType, Image, ImageKind, PixelData, normalized_u8};
use crate::journal::Journal;
use crate::layer::ImageLayer;
use crate::layered::LayeredImage;
use crate::palette::Palette;
use crate::{log_err, log_info, log_warn};

/// `segment(samples) -> mask` on the grid of the input.
pub trait Segmenter: Send + Sync {
    fn segment(&self, samples: &PixelData) -> Result<PixelData>;

    fn name(&self) -> &str {
        "segmenter"
    }
}

/// Marks every pixel whose intensity is at least `threshold` with 1.
/// Color pixels use the mean of their channels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ThresholdSegmenter {
    pub threshold: f32,
}

impl ThresholdSegmenter {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }
}

impl Segmenter for ThresholdSegmenter {
    fn segment(&self, samples: &PixelData) -> Result<PixelData> {
        let values: ArrayD<f32> = match samples {
            PixelData::U8(a) => a.mapv(f32::from),
            PixelData::U16(a) => a.mapv(f32::from),
            PixelData::F32(a) => a.clone(),
        };
        let intensity = match values.ndim() {
            2 => values,
            3 if matches!(values.shape()[2], 3 | 4) => {
                let color = values
                    .into_dimensionality::<Ix3>()
                    .map_err(|e| VisionError::Inference(e.to_string()))?;
                let channels = color.shape()[2].min(3);
                let rgb = color.slice_axis(Axis(2), ndarray::Slice::from(0..channels));
                rgb.mean_axis(Axis(2))
                    .ok_or_else(|| VisionError::Inference("empty color axis".into()))?
                    .into_dyn()
            }
            _ => {
                return Err(VisionError::Inference(format!(
                    "threshold segmenter expects a 2D plane or color image, got {:?}",
                    samples.shape()
                )));
            }
        };
        let threshold = self.threshold;
        Ok(PixelData::U8(intensity.mapv(|v| u8::from(v >= threshold))))
    }

    fn name(&self) -> &str {
        "threshold"
    }
}

/// Wrap `samples` as a palette-indexed image on the base layer's kind and
/// install it as layer `name` (created or replaced in place).
///
/// Float output (soft probabilities) is stretched to `0..=255` first, so it
/// can be shown through a 256-entry transfer function.
pub fn install_segmentation(
    layered: &LayeredImage,
    name: &str,
    samples: PixelData,
    palette: Arc<Palette>,
) -> Result<ImageLayer> {
    let base = layered.base_layer().and_then(|l| l.image());
    let kind = base.as_ref().map(|i| i.kind()).unwrap_or(ImageKind::Flat);
    let spatial = base.as_ref().and_then(|i| i.spatial().cloned());
    let samples = if samples.dtype() == DType::F32 {
        normalized_u8(&samples)
    } else {
        samples
    };
    let image = Image::new(kind, samples, Some(palette), spatial)?;
    let layer = layered.add_layer_or_modify_image(name, image)?;
    log_info!("Installed segmentation into layer '{}'", name);
    Ok(layer)
}

struct InferenceOutcome {
    record_id: Uuid,
    layer_name: String,
    result: Result<PixelData>,
}

/// What one [`InferenceQueue::drain`] call did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub installed: usize,
    /// Results for records no longer in the journal.
    pub dropped: usize,
    pub failed: usize,
}

impl DrainReport {
    fn absorb(&mut self, other: DrainReport) {
        self.installed += other.installed;
        self.dropped += other.dropped;
        self.failed += other.failed;
    }
}

/// How long [`InferenceQueue::wait_all`] blocks before checking for workers
/// that exited without reporting.
const WAIT_POLL: Duration = Duration::from_millis(50);

/// Background segmentation with results delivered to the model thread.
pub struct InferenceQueue {
    segmenter: Arc<dyn Segmenter>,
    palette: Arc<Palette>,
    tx: Sender<InferenceOutcome>,
    rx: Receiver<InferenceOutcome>,
    pending: usize,
    workers: Vec<JoinHandle<()>>,
}

impl InferenceQueue {
    pub fn new(segmenter: Arc<dyn Segmenter>, palette: Arc<Palette>) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            segmenter,
            palette,
            tx,
            rx,
            pending: 0,
            workers: Vec::new(),
        }
    }

    pub fn pending(&self) -> usize {
        self.pending
    }

    /// Segment the base image of `record_id` off-thread; the result goes to
    /// layer `layer_name`.
    pub fn submit(&mut self, journal: &Journal, record_id: Uuid, layer_name: &str) -> Result<()> {
        let record = journal
            .record_by_id(record_id)
            .ok_or_else(|| VisionError::NotFound(format!("record {} is not in the journal", record_id)))?;
        let image = record
            .layered_image()
            .base_layer()
            .and_then(|l| l.image())
            .ok_or_else(|| VisionError::NotFound(format!("record {} has no base image", record_id)))?;
        let samples = image.pixels_snapshot();

        let segmenter = Arc::clone(&self.segmenter);
        let tx = self.tx.clone();
        let layer_name = layer_name.to_owned();
        let handle = thread::Builder::new()
            .name(format!("segment-{}", record_id))
            .spawn(move || {
                let result = panic::catch_unwind(AssertUnwindSafe(|| segmenter.segment(&samples)))
                    .unwrap_or_else(|payload| {
                        Err(VisionError::Inference(format!(
                            "{} panicked: {}",
                            segmenter.name(),
                            panic_message(payload.as_ref())
                        )))
                    });
                // The queue may already be gone; nothing to deliver to then.
                let _ = tx.send(InferenceOutcome {
                    record_id,
                    layer_name,
                    result,
                });
            })?;
        self.workers.push(handle);
        self.pending += 1;
        Ok(())
    }

    /// Install every result that has arrived, without blocking.
    pub fn drain(&mut self, journal: &Journal) -> DrainReport {
        let mut report = DrainReport::default();
        loop {
            match self.rx.try_recv() {
                Ok(outcome) => report.absorb(self.install(journal, outcome)),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        self.reap_workers();
        report
    }

    /// Block until every submitted job has been installed or has failed.
    ///
    /// A worker that dies without sending counts as one failure.
    pub fn wait_all(&mut self, journal: &Journal) -> DrainReport {
        let mut report = DrainReport::default();
        while self.pending > 0 {
            match self.rx.recv_timeout(WAIT_POLL) {
                Ok(outcome) => report.absorb(self.install(journal, outcome)),
                Err(RecvTimeoutError::Timeout) => {
                    self.reap_workers();
                    if self.workers.is_empty() {
                        // Everything still queued was sent before the last
                        // worker exited.
                        while let Ok(outcome) = self.rx.try_recv() {
                            report.absorb(self.install(journal, outcome));
                        }
                        if self.pending > 0 {
                            log_err!("{} segmentation job(s) exited without a result", self.pending);
                            report.failed += self.pending;
                            self.pending = 0;
                        }
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        self.reap_workers();
        report
    }

    fn install(&mut self, journal: &Journal, outcome: InferenceOutcome) -> DrainReport {
        self.pending = self.pending.saturating_sub(1);
        let mut report = DrainReport::default();
        let Some(record) = journal.record_by_id(outcome.record_id) else {
            log_warn!(
                "Dropping {} result for removed record {}",
                self.segmenter.name(),
                outcome.record_id
            );
            report.dropped = 1;
            return report;
        };
        let installed = outcome.result.and_then(|samples| {
            install_segmentation(
                record.layered_image(),
                &outcome.layer_name,
                samples,
                Arc::clone(&self.palette),
            )
        });
        match installed {
            Ok(_) => report.installed = 1,
            Err(e) => {
                log_err!("Segmentation of {} failed: {}", record.name(), e);
                report.failed = 1;
            }
        }
        report
    }

    fn reap_workers(&mut self) {
        let (finished, running): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.workers).into_iter().partition(|h| h.is_finished());
        for handle in finished {
            if handle.join().is_err() {
                log_err!("A segmentation worker panicked");
            }
        }
        self.workers = running;
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_owned()
    }
}
