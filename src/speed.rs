use crate::history::TrackHistory;

/// Ground units per second to km/h. Only physically meaningful when the
/// calibration target is specified in meters.
pub const MPS_TO_KMH: f64 = 3.6;

/// Samples a track must have accumulated before a speed is reported.
pub const MIN_SAMPLES_FOR_SPEED: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedMeasurement {
    pub track_id: u32,
    /// km/h, >= 0
    pub speed: f32,
    /// Ground-plane displacement over the window, >= 0
    pub distance: f32,
}

impl SpeedMeasurement {
    fn none(track_id: u32) -> Self {
        Self {
            track_id,
            speed: 0.0,
            distance: 0.0,
        }
    }
}

/// Derives displacement and speed from the oldest and newest samples a track
/// currently retains.
///
/// The window widens as the buffer fills toward capacity: a newly seen track
/// is measured over few frames (responsive, noisy), a long-lived one over the
/// full buffer (smooth, lagged). Intermediate samples never enter the math.
pub struct SpeedEstimator {
    frame_rate: f64,
    min_samples: usize,
}

impl SpeedEstimator {
    pub fn new(frame_rate: f64) -> Self {
        Self::with_min_samples(frame_rate, MIN_SAMPLES_FOR_SPEED)
    }

    pub fn with_min_samples(frame_rate: f64, min_samples: usize) -> Self {
        Self {
            frame_rate,
            min_samples,
        }
    }

    pub fn estimate(&self, track_id: u32, history: &TrackHistory) -> SpeedMeasurement {
        if history.len() < self.min_samples {
            return SpeedMeasurement::none(track_id);
        }

        let ((oldest_frame, oldest_y), (newest_frame, newest_y)) =
            match (history.oldest(), history.newest()) {
                (Some(oldest), Some(newest)) => (oldest, newest),
                _ => return SpeedMeasurement::none(track_id),
            };

        let distance = (newest_y - oldest_y).abs();
        let frames_passed = newest_frame.saturating_sub(oldest_frame);

        // Duplicate frame indices or an unknown frame rate yield a defined
        // zero speed, not an error; the displacement is still reported.
        let mut speed = 0.0;
        if frames_passed > 0 && self.frame_rate > 0.0 {
            let time_elapsed = frames_passed as f64 / self.frame_rate;
            speed = (distance as f64 / time_elapsed * MPS_TO_KMH) as f32;
        }

        SpeedMeasurement {
            track_id,
            speed,
            distance,
        }
    }
}
