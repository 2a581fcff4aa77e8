use crate::detection::Detection;

pub const CONFIDENCE_THRESHOLD: f32 = 0.3;
pub const IOU_THRESHOLD: f32 = 0.5;

/// COCO ids of the classes that count as vehicles: car, motorcycle, bus, truck.
pub const VEHICLE_CLASSES: [i32; 4] = [2, 3, 5, 7];

const NUM_CLASSES: usize = 80;

/// Filters applied to the raw detector output before it reaches the tracker:
/// confidence threshold, class allow-list and per-class non-maximum
/// suppression.
pub struct DetectionFilter {
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub classes: Vec<i32>,
}

impl DetectionFilter {
    pub fn new(confidence_threshold: f32, classes: Vec<i32>) -> Self {
        Self {
            confidence_threshold,
            iou_threshold: IOU_THRESHOLD,
            classes,
        }
    }

    pub fn apply(&self, detections: Vec<Detection>) -> Vec<Detection> {
        // The bounding boxes grouped by class index.
        let mut bboxes: Vec<Vec<Detection>> = (0..NUM_CLASSES).map(|_| vec![]).collect();

        for det in detections {
            if det.confidence <= self.confidence_threshold {
                continue;
            }

            if !self.classes.contains(&det.class) {
                continue;
            }

            if det.class < 0 || det.class >= NUM_CLASSES as i32 {
                continue;
            }

            bboxes[det.class as usize].push(det);
        }

        let mut results = Vec::new();

        for mut dets in bboxes.into_iter() {
            if dets.is_empty() {
                continue;
            }

            if dets.len() == 1 {
                results.append(&mut dets);
                continue;
            }

            let indices = non_maximum_supression(&mut dets, self.iou_threshold);

            results.extend(dets.drain(..).enumerate().filter_map(|(idx, item)| {
                if indices.contains(&(idx as i32)) {
                    Some(item)
                } else {
                    None
                }
            }));
        }

        results
    }
}

impl Default for DetectionFilter {
    fn default() -> Self {
        Self::new(CONFIDENCE_THRESHOLD, VEHICLE_CLASSES.to_vec())
    }
}

fn non_maximum_supression(dets: &mut [Detection], iou_threshold: f32) -> Vec<i32> {
    dets.sort_unstable_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut retain: Vec<_> = (0..dets.len() as i32).collect();
    for idx in 0..dets.len() - 1 {
        if retain[idx] != -1 {
            for r in retain[idx + 1..].iter_mut() {
                if *r != -1 {
                    let iou = dets[idx].iou(&dets[*r as usize]);
                    if iou > iou_threshold {
                        *r = -1;
                    }
                }
            }
        }
    }

    retain.retain(|&x| x > -1);
    retain
}
