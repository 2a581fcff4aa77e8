pub mod annotate;
pub mod bbox;
pub mod detection;
pub mod detector;
pub mod error;
pub mod history;
pub mod perspective;
pub mod pipeline;
pub mod records;
pub mod replay;
pub mod speed;

pub use detection::{Detection, TrackedDetection};
pub use error::Error;
pub use pipeline::{Pipeline, PipelineConfig, RunSummary};

use opencv::core::Mat;

/// The external detector/tracker pair, consumed as one capability so the
/// pipeline can run against a real model or a deterministic fixture.
///
/// `detect` is called once per frame; `update` once per frame with the
/// filtered detection set, and must reuse identities for the same physical
/// object across consecutive frames when its association succeeds. Any error
/// from either call aborts the run: a silently skipped frame would corrupt
/// the frame-index speed windows of every live track.
pub trait Perception {
    fn detect(&mut self, frame: &Mat, frame_idx: u64) -> Result<Vec<Detection>, Error>;

    fn update(&mut self, detections: &[Detection]) -> Result<Vec<TrackedDetection>, Error>;
}
