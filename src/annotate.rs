use opencv::core::{self, Mat};
use opencv::imgproc;

use crate::detection::{class_name, TrackedDetection};
use crate::error::Error;
use crate::speed::SpeedMeasurement;

fn class_color(class: i32) -> core::Scalar {
    match class {
        2 => core::Scalar::new(0.0, 255.0, 0.0, 0.0),   // car
        3 => core::Scalar::new(255.0, 0.0, 0.0, 0.0),   // motorcycle
        5 => core::Scalar::new(0.0, 0.0, 255.0, 0.0),   // bus
        7 => core::Scalar::new(0.0, 255.0, 255.0, 0.0), // truck
        _ => core::Scalar::new(255.0, 255.0, 255.0, 0.0),
    }
}

/// Rasterizes per-object overlays onto the frame: a label above the box and
/// a class-colored box outline.
pub struct FrameAnnotator {
    pub font_scale: f64,
    pub thickness: i32,
}

impl Default for FrameAnnotator {
    fn default() -> Self {
        Self {
            font_scale: 0.8,
            thickness: 2,
        }
    }
}

impl FrameAnnotator {
    /// Draws one overlay per (tracked detection, measurement) pair. A
    /// degenerate zero-size box skips its overlay without failing the frame.
    pub fn annotate(
        &self,
        frame: &mut Mat,
        tracked: &[TrackedDetection],
        measurements: &[SpeedMeasurement],
    ) -> Result<(), Error> {
        for (t, m) in tracked.iter().zip(measurements) {
            let det = &t.detection;
            let bbox = det.bbox().as_ltwh();

            if bbox.width() <= 0.0 || bbox.height() <= 0.0 {
                continue;
            }

            let label = format!(
                "{} ID:{}, spd:{} km/h, dis:{:.1} m",
                class_name(det.class),
                t.track_id,
                m.speed as i32,
                m.distance
            );

            imgproc::put_text(
                frame,
                &label,
                core::Point::new(det.x1 as i32, (det.y1 - 10.0) as i32),
                imgproc::FONT_HERSHEY_SIMPLEX,
                self.font_scale,
                core::Scalar::new(0.0, 255.0, 0.0, 0.0),
                self.thickness,
                imgproc::LINE_AA,
                false,
            )?;

            imgproc::rectangle(
                frame,
                core::Rect::new(
                    bbox.left() as i32,
                    bbox.top() as i32,
                    bbox.width() as i32,
                    bbox.height() as i32,
                ),
                class_color(det.class),
                self.thickness,
                imgproc::LINE_8,
                0,
            )?;
        }

        Ok(())
    }
}
