use log::info;
use nalgebra as na;
use opencv::core::{self, Mat};
use opencv::prelude::*;
use opencv::videoio;

use crate::annotate::FrameAnnotator;
use crate::detection::class_name;
use crate::detector::DetectionFilter;
use crate::error::Error;
use crate::history::{HistoryConfig, TrackHistoryStore};
use crate::perspective::{Calibration, PerspectiveMapper};
use crate::records::RecordAggregator;
use crate::speed::{SpeedEstimator, SpeedMeasurement, MIN_SAMPLES_FOR_SPEED};
use crate::Perception;

pub struct PipelineConfig {
    pub calibration: Calibration,
    pub filter: DetectionFilter,
    pub history: HistoryConfig,
    pub min_speed_samples: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            calibration: Calibration::default(),
            filter: DetectionFilter::default(),
            history: HistoryConfig::default(),
            min_speed_samples: MIN_SAMPLES_FOR_SPEED,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RunSummary {
    pub frames: u64,
    pub records: usize,
}

/// Output writer pinned to the input's frame rate and resolution.
struct OutputVideo {
    writer: videoio::VideoWriter,
}

impl OutputVideo {
    fn open(path: &str, fps: f64, size: core::Size) -> Result<Self, Error> {
        // avc1 so the result plays in a browser
        let fourcc = videoio::VideoWriter::fourcc(b'a' as _, b'v' as _, b'c' as _, b'1' as _)?;
        let writer = videoio::VideoWriter::new(path, fourcc, fps, size, true)?;

        if !writer.is_opened()? {
            return Err(Error::OpenOutput(path.to_string()));
        }

        Ok(Self { writer })
    }

    fn write(&mut self, frame: &Mat) -> Result<(), Error> {
        self.writer.write(frame)?;

        Ok(())
    }

    fn release(&mut self) -> Result<(), Error> {
        self.writer.release()?;

        Ok(())
    }
}

/// Drives the per-frame loop over one video: detect, filter, track, map to
/// ground coordinates, update histories, estimate speeds, annotate, record,
/// write out. One instance per video; nothing is shared across files.
pub struct Pipeline<P: Perception> {
    perception: P,
    mapper: PerspectiveMapper,
    filter: DetectionFilter,
    histories: TrackHistoryStore,
    estimator: SpeedEstimator,
    annotator: FrameAnnotator,
    records: RecordAggregator,
    min_speed_samples: usize,
}

impl<P: Perception> Pipeline<P> {
    pub fn new(config: PipelineConfig, perception: P) -> Result<Self, Error> {
        let mapper = PerspectiveMapper::new(&config.calibration)?;

        Ok(Self {
            perception,
            mapper,
            filter: config.filter,
            histories: TrackHistoryStore::new(config.history),
            estimator: SpeedEstimator::with_min_samples(0.0, config.min_speed_samples),
            annotator: FrameAnnotator::default(),
            records: RecordAggregator::new(),
            min_speed_samples: config.min_speed_samples,
        })
    }

    /// Frame rate is read from the input's metadata at run time; until it is
    /// set all speeds come out zero.
    pub fn set_frame_rate(&mut self, frame_rate: f64) {
        self.estimator = SpeedEstimator::with_min_samples(frame_rate, self.min_speed_samples);
    }

    #[inline]
    pub fn records(&self) -> &RecordAggregator {
        &self.records
    }

    /// One pass of the per-frame loop body. Frames must arrive in increasing
    /// index order; the speed window arithmetic assumes it.
    pub fn process_frame(&mut self, frame: &mut Mat, frame_idx: u64) -> Result<(), Error> {
        let raw = self.perception.detect(frame, frame_idx)?;
        let filtered = self.filter.apply(raw);
        let tracked = self.perception.update(&filtered)?;

        let anchors: Vec<na::Point2<f32>> = tracked.iter().map(|t| t.detection.anchor()).collect();
        let ground = self.mapper.transform(&anchors);

        let mut measurements = Vec::with_capacity(tracked.len());
        for (t, point) in tracked.iter().zip(&ground) {
            self.histories.update(t.track_id, frame_idx, point.y);

            let measurement = match self.histories.history(t.track_id) {
                Some(history) => self.estimator.estimate(t.track_id, history),
                None => SpeedMeasurement {
                    track_id: t.track_id,
                    speed: 0.0,
                    distance: 0.0,
                },
            };

            measurements.push(measurement);
        }

        self.histories.retire_stale(frame_idx);

        self.annotator.annotate(frame, &tracked, &measurements)?;

        for (t, m) in tracked.iter().zip(&measurements) {
            self.records.record(
                frame_idx,
                t.track_id,
                class_name(t.detection.class),
                m.speed,
                m.distance,
            );
        }

        Ok(())
    }

    /// Processes the whole video: annotated frames go to `output_video`, the
    /// accumulated records to `output_records` once the stream is drained.
    ///
    /// A frame that cannot be read ends the stream; a collaborator failure
    /// aborts the run before anything is exported. Export failure is
    /// reported after the output video is finalized and leaves it valid.
    pub fn run(
        &mut self,
        input: &str,
        output_video: &str,
        output_records: &str,
    ) -> Result<RunSummary, Error> {
        let mut capture = videoio::VideoCapture::from_file(input, videoio::CAP_ANY)?;
        if !videoio::VideoCapture::is_opened(&capture)? {
            return Err(Error::OpenInput(input.to_string()));
        }

        let fps = capture.get(videoio::CAP_PROP_FPS)?;
        let width = capture.get(videoio::CAP_PROP_FRAME_WIDTH)? as i32;
        let height = capture.get(videoio::CAP_PROP_FRAME_HEIGHT)? as i32;
        let total = capture.get(videoio::CAP_PROP_FRAME_COUNT)? as u64;

        info!(
            "input {}: {}x{} at {} fps, {} frames",
            input, width, height, fps, total
        );

        self.set_frame_rate(fps);

        let mut output = OutputVideo::open(output_video, fps, core::Size::new(width, height))?;

        let mut frame = Mat::default();
        let mut frame_idx: u64 = 0;

        loop {
            match capture.read(&mut frame) {
                Ok(true) => {}
                // a failed read is the natural end of the stream
                Ok(false) | Err(_) => break,
            }

            if frame.cols() == 0 || frame.rows() == 0 {
                break;
            }

            print!("\rprogress {}/{}...", frame_idx + 1, total);

            self.process_frame(&mut frame, frame_idx)?;
            output.write(&frame)?;

            frame_idx += 1;
        }
        println!();

        output.release()?;
        capture.release()?;

        info!(
            "exporting {} records to {}",
            self.records.len(),
            output_records
        );
        self.records.export(output_records)?;

        Ok(RunSummary {
            frames: frame_idx,
            records: self.records.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::{Detection, TrackedDetection};

    /// Scripted stand-in for the detector/tracker pair.
    struct ScriptedPerception {
        frames: Vec<Vec<TrackedDetection>>,
        fail_at: Option<u64>,
    }

    impl ScriptedPerception {
        fn new(frames: Vec<Vec<TrackedDetection>>) -> Self {
            Self {
                frames,
                fail_at: None,
            }
        }
    }

    impl Perception for ScriptedPerception {
        fn detect(&mut self, _frame: &Mat, frame_idx: u64) -> Result<Vec<Detection>, Error> {
            if self.fail_at == Some(frame_idx) {
                return Err(Error::Detector("inference failed".into()));
            }

            Ok(self
                .frames
                .get(frame_idx as usize)
                .map(|tracked| tracked.iter().map(|t| t.detection).collect())
                .unwrap_or_default())
        }

        fn update(&mut self, detections: &[Detection]) -> Result<Vec<TrackedDetection>, Error> {
            // re-attach the scripted identity by overlap
            let frame = self.frames.iter().find(|tracked| {
                tracked.len() >= detections.len()
                    && detections
                        .iter()
                        .all(|d| tracked.iter().any(|t| t.detection.iou(d) > 0.99))
            });

            Ok(frame
                .map(|tracked| {
                    detections
                        .iter()
                        .filter_map(|d| {
                            tracked
                                .iter()
                                .find(|t| t.detection.iou(d) > 0.99)
                                .map(|t| TrackedDetection {
                                    detection: *d,
                                    track_id: t.track_id,
                                })
                        })
                        .collect()
                })
                .unwrap_or_default())
        }
    }

    fn identity_calibration() -> Calibration {
        Calibration {
            source: [[0., 0.], [100., 0.], [100., 100.], [0., 100.]],
            target: [[0., 0.], [100., 0.], [100., 100.], [0., 100.]],
        }
    }

    fn tracked(y2: f32, track_id: u32) -> TrackedDetection {
        TrackedDetection {
            detection: Detection {
                x1: 10.0,
                y1: y2 - 10.0,
                x2: 20.0,
                y2,
                confidence: 0.9,
                class: 2,
            },
            track_id,
        }
    }

    fn test_frame() -> Mat {
        Mat::new_rows_cols_with_default(200, 200, core::CV_8UC3, core::Scalar::all(0.0)).unwrap()
    }

    fn config() -> PipelineConfig {
        PipelineConfig {
            calibration: identity_calibration(),
            ..Default::default()
        }
    }

    #[test]
    fn measures_a_vehicle_after_enough_history() {
        // one track moving 10 ground meters per frame at 10 fps: 360 km/h
        let frames: Vec<Vec<TrackedDetection>> =
            (0..6).map(|i| vec![tracked(i as f32 * 10.0, 1)]).collect();

        let mut pipeline = Pipeline::new(config(), ScriptedPerception::new(frames)).unwrap();
        pipeline.set_frame_rate(10.0);

        let mut frame = test_frame();
        for frame_idx in 0..6 {
            pipeline.process_frame(&mut frame, frame_idx).unwrap();
        }

        let records = pipeline.records().records();
        assert_eq!(records.len(), 6);

        // fewer than five samples: defined zero measurement
        assert_eq!(records[3].speed, 0.0);
        assert_eq!(records[3].distance, 0.0);

        // five samples at frame 4: 40 units over 0.4 s
        assert!((records[4].speed - 360.0).abs() < 1e-2);
        assert!((records[4].distance - 40.0).abs() < 1e-4);

        // six samples at frame 5: 50 units over 0.5 s
        assert!((records[5].speed - 360.0).abs() < 1e-2);
        assert!((records[5].distance - 50.0).abs() < 1e-4);

        assert_eq!(records[5].vehicle_type, "car");
        assert_eq!(records[5].tracker_id, 1);
    }

    #[test]
    fn low_confidence_detections_never_reach_the_records() {
        let mut weak = tracked(50.0, 99);
        weak.detection.confidence = 0.29;
        weak.detection.x1 = 150.0;
        weak.detection.x2 = 160.0;

        let frames = vec![vec![tracked(10.0, 1), weak]];

        let mut pipeline = Pipeline::new(config(), ScriptedPerception::new(frames)).unwrap();
        pipeline.set_frame_rate(10.0);

        let mut frame = test_frame();
        pipeline.process_frame(&mut frame, 0).unwrap();

        let records = pipeline.records().records();
        assert_eq!(records.len(), 1);
        assert!(records.iter().all(|r| r.tracker_id != 99));
    }

    #[test]
    fn collaborator_failure_aborts_the_frame() {
        let frames: Vec<Vec<TrackedDetection>> =
            (0..6).map(|i| vec![tracked(i as f32 * 10.0, 1)]).collect();

        let mut perception = ScriptedPerception::new(frames);
        perception.fail_at = Some(3);

        let mut pipeline = Pipeline::new(config(), perception).unwrap();
        pipeline.set_frame_rate(10.0);

        let mut frame = test_frame();
        for frame_idx in 0..3 {
            pipeline.process_frame(&mut frame, frame_idx).unwrap();
        }

        let result = pipeline.process_frame(&mut frame, 3);
        assert!(matches!(result, Err(Error::Detector(_))));

        // records from completed frames stay put, nothing was exported
        assert_eq!(pipeline.records().len(), 3);
    }

    #[test]
    fn tracks_reacquire_history_after_identity_change() {
        // the tracker drops id 1 and mints id 2 for the same physical object
        let mut frames: Vec<Vec<TrackedDetection>> =
            (0..5).map(|i| vec![tracked(i as f32 * 10.0, 1)]).collect();
        frames.extend((5..10).map(|i| vec![tracked(i as f32 * 10.0, 2)]));

        let mut pipeline = Pipeline::new(config(), ScriptedPerception::new(frames)).unwrap();
        pipeline.set_frame_rate(10.0);

        let mut frame = test_frame();
        for frame_idx in 0..10 {
            pipeline.process_frame(&mut frame, frame_idx).unwrap();
        }

        let records = pipeline.records().records();

        // id 2 starts from scratch: its first four frames report zero speed
        let id2: Vec<_> = records.iter().filter(|r| r.tracker_id == 2).collect();
        assert_eq!(id2.len(), 5);
        assert!(id2[..4].iter().all(|r| r.speed == 0.0));
        assert!(id2[4].speed > 0.0);
    }
}
