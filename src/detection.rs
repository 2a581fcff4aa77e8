use nalgebra as na;
use serde_derive::{Deserialize, Serialize};

use crate::bbox::{BBox, Ltrb};

/// COCO class names up to the last vehicle class this pipeline cares about.
pub const NAMES: [&str; 8] = [
    "person",
    "bicycle",
    "car",
    "motorcycle",
    "airplane",
    "bus",
    "train",
    "truck",
];

#[inline]
pub fn class_name(class: i32) -> &'static str {
    NAMES.get(class as usize).copied().unwrap_or("object")
}

/// Contains (x1,y1) left-top and (x2,y2) right-bottom corners of bbox
#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
pub struct Detection {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    #[serde(rename = "p")]
    pub confidence: f32,
    #[serde(rename = "c")]
    pub class: i32,
}

impl Detection {
    pub fn iou(&self, other: &Detection) -> f32 {
        let b1_area = (self.x2 - self.x1 + 1.) * (self.y2 - self.y1 + 1.);
        let b2_area = (other.x2 - other.x1 + 1.) * (other.y2 - other.y1 + 1.);

        let i_xmin = self.x1.max(other.x1);
        let i_xmax = self.x2.min(other.x2);
        let i_ymin = self.y1.max(other.y1);
        let i_ymax = self.y2.min(other.y2);
        let i_area = (i_xmax - i_xmin + 1.).max(0.) * (i_ymax - i_ymin + 1.).max(0.);

        i_area / (b1_area + b2_area - i_area)
    }

    #[inline(always)]
    pub fn bbox(&self) -> BBox<Ltrb> {
        BBox::ltrb(self.x1, self.y1, self.x2, self.y2)
    }

    /// Bottom-center of the box, the point where the object meets the ground
    #[inline(always)]
    pub fn anchor(&self) -> na::Point2<f32> {
        na::Point2::new((self.x1 + self.x2) / 2., self.y2)
    }

    #[inline(always)]
    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    #[inline(always)]
    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }
}

/// A detection with the stable identity the external tracker assigned to it.
///
/// The identity is unique among simultaneously visible objects but may be
/// reused by the tracker for a different physical object after a gap; the
/// pipeline cannot tell reuse from continuity and does not try.
#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
pub struct TrackedDetection {
    #[serde(flatten)]
    pub detection: Detection,
    #[serde(rename = "id")]
    pub track_id: u32,
}
