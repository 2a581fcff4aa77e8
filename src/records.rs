use std::path::Path;

use serde_derive::Serialize;

use crate::error::Error;

/// One (frame, visible track) observation, immutable once created.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct VehicleRecord {
    pub frame_id: u64,
    pub tracker_id: u32,
    pub vehicle_type: String,
    pub speed: f32,
    pub distance: f32,
    pub timestamp: String,
}

/// Append-only collection of vehicle records, exported once at end of
/// stream. Insertion order is chronological and is preserved by the export.
#[derive(Debug, Default)]
pub struct RecordAggregator {
    records: Vec<VehicleRecord>,
}

impl RecordAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(
        &mut self,
        frame_id: u64,
        tracker_id: u32,
        vehicle_type: &str,
        speed: f32,
        distance: f32,
    ) {
        self.records.push(VehicleRecord {
            frame_id,
            tracker_id,
            vehicle_type: vehicle_type.to_string(),
            speed,
            distance,
            timestamp: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        });
    }

    #[inline]
    pub fn records(&self) -> &[VehicleRecord] {
        &self.records
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Writes all accumulated records as CSV, one row per record in
    /// insertion order. An unwritable destination fails loudly with
    /// `Error::Export`; records stay intact either way.
    pub fn export<P: AsRef<Path>>(&self, path: P) -> Result<(), Error> {
        let mut writer = csv::Writer::from_path(path)?;

        for record in &self.records {
            writer.serialize(record)?;
        }

        writer
            .flush()
            .map_err(|err| Error::Export(csv::Error::from(err)))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("speedcam-{}-{}.csv", name, std::process::id()))
    }

    #[test]
    fn export_preserves_insertion_order() {
        let mut aggregator = RecordAggregator::new();
        aggregator.record(3, 1, "car", 50.0, 10.0);
        aggregator.record(1, 2, "bus", 40.0, 8.0);
        aggregator.record(2, 1, "car", 55.0, 11.0);

        let path = temp_path("order");
        aggregator.export(&path).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();

        assert_eq!(
            lines[0],
            "frame_id,tracker_id,vehicle_type,speed,distance,timestamp"
        );
        assert!(lines[1].starts_with("3,1,car,"));
        assert!(lines[2].starts_with("1,2,bus,"));
        assert!(lines[3].starts_with("2,1,car,"));
        assert_eq!(lines.len(), 4);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn unwritable_destination_fails_with_export_error() {
        let mut aggregator = RecordAggregator::new();
        aggregator.record(0, 1, "car", 0.0, 0.0);

        let result = aggregator.export("/nonexistent-dir/records.csv");

        assert!(matches!(result, Err(Error::Export(_))));
        assert_eq!(aggregator.len(), 1);
    }

    #[test]
    fn records_are_stamped_with_wall_clock_time() {
        let mut aggregator = RecordAggregator::new();
        aggregator.record(0, 1, "truck", 12.0, 3.0);

        let record = &aggregator.records()[0];
        assert_eq!(record.vehicle_type, "truck");
        // %Y-%m-%d %H:%M:%S
        assert_eq!(record.timestamp.len(), 19);
    }
}
