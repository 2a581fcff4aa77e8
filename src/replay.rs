use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;

use opencv::core::Mat;

use crate::detection::{Detection, TrackedDetection};
use crate::detector::IOU_THRESHOLD;
use crate::error::Error;
use crate::Perception;

/// Replays recorded tracker output as the pipeline's perception collaborator.
///
/// The log holds one line per frame, `<frame index>: <JSON array>`, each
/// array element a tracked detection. Frames without observations may be
/// omitted. `detect` yields the recorded detections for the frame; `update`
/// re-attaches the recorded identities to whatever survived filtering, by
/// best overlap, so an identity is never minted here.
pub struct TrackLog {
    lines: Lines<BufReader<File>>,
    current: Vec<TrackedDetection>,
    pending: Option<(u64, Vec<TrackedDetection>)>,
    iou_threshold: f32,
}

impl TrackLog {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let file = File::open(path)?;

        Ok(Self {
            lines: BufReader::new(file).lines(),
            current: Vec::new(),
            pending: None,
            iou_threshold: IOU_THRESHOLD,
        })
    }

    fn advance(&mut self, frame_idx: u64) -> Result<Vec<TrackedDetection>, Error> {
        if let Some((recorded_idx, _)) = self.pending {
            if recorded_idx > frame_idx {
                return Ok(Vec::new());
            }

            if let Some((_, tracked)) = self.pending.take() {
                if recorded_idx == frame_idx {
                    return Ok(tracked);
                }
            }
        }

        loop {
            let line = match self.lines.next() {
                Some(line) => line?,
                // log exhausted: the rest of the video has no observations
                None => return Ok(Vec::new()),
            };

            if line.trim().is_empty() {
                continue;
            }

            let (head, tail) = match line.find(':') {
                Some(idx) => line.split_at(idx),
                None => {
                    return Err(Error::Replay(format!(
                        "expected `<frame>: <json>`, got `{}`",
                        line
                    )))
                }
            };

            let recorded_idx: u64 = head
                .trim()
                .parse()
                .map_err(|_| Error::Replay(format!("bad frame index `{}`", head.trim())))?;

            let tracked: Vec<TrackedDetection> = serde_json::from_str(&tail[1..])
                .map_err(|err| Error::Replay(format!("frame {}: {}", recorded_idx, err)))?;

            match recorded_idx.cmp(&frame_idx) {
                std::cmp::Ordering::Less => continue,
                std::cmp::Ordering::Equal => return Ok(tracked),
                std::cmp::Ordering::Greater => {
                    self.pending = Some((recorded_idx, tracked));
                    return Ok(Vec::new());
                }
            }
        }
    }
}

impl Perception for TrackLog {
    fn detect(&mut self, _frame: &Mat, frame_idx: u64) -> Result<Vec<Detection>, Error> {
        self.current = self.advance(frame_idx)?;

        Ok(self.current.iter().map(|t| t.detection).collect())
    }

    fn update(&mut self, detections: &[Detection]) -> Result<Vec<TrackedDetection>, Error> {
        let mut taken = vec![false; self.current.len()];
        let mut tracked = Vec::with_capacity(detections.len());

        for det in detections {
            let mut best = None;
            let mut best_iou = self.iou_threshold;

            for (idx, recorded) in self.current.iter().enumerate() {
                if taken[idx] {
                    continue;
                }

                let iou = det.iou(&recorded.detection);
                if iou > best_iou {
                    best_iou = iou;
                    best = Some(idx);
                }
            }

            // A detection without a recorded identity was never confirmed by
            // the tracker and carries no track this frame.
            if let Some(idx) = best {
                taken[idx] = true;
                tracked.push(TrackedDetection {
                    detection: *det,
                    track_id: self.current[idx].track_id,
                });
            }
        }

        Ok(tracked)
    }
}
