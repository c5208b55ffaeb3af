//! Spatio-temporal envelopes.

use serde::{Deserialize, Serialize};

use crate::bbox::BoundingBox;
use crate::time::{TemporalCrs, TimeRange};

/// A geographic box combined with a time range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub bbox: BoundingBox,
    pub time: TimeRange,
}

impl Envelope {
    pub fn new(bbox: BoundingBox, time: TimeRange) -> Self {
        Self { bbox, time }
    }

    pub fn intersects(&self, other: &Envelope) -> bool {
        self.bbox.intersection(&other.bbox).is_some() && self.time.intersects(&other.time)
    }

    pub fn union(&self, other: &Envelope) -> Envelope {
        Envelope::new(self.bbox.union(&other.bbox), self.time.union(&other.time))
    }

    /// Ordinates as `[min_x, min_y, min_t, max_x, max_y, max_t]`, time
    /// expressed in the given temporal CRS.
    pub fn to_ordinates(&self, temporal: &TemporalCrs) -> [f64; 6] {
        [
            self.bbox.min_x,
            self.bbox.min_y,
            temporal.to_value(self.time.start),
            self.bbox.max_x,
            self.bbox.max_y,
            temporal.to_value(self.time.end),
        ]
    }

    /// Inverse of `to_ordinates`.
    pub fn from_ordinates(ordinates: [f64; 6], temporal: &TemporalCrs) -> Envelope {
        Envelope::new(
            BoundingBox::new(ordinates[0], ordinates[1], ordinates[3], ordinates[4]),
            TimeRange::new(
                temporal.to_datetime(ordinates[2]),
                temporal.to_datetime(ordinates[5]),
            ),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_ordinates_round_trip() {
        let temporal = TemporalCrs::default();
        let envelope = Envelope::new(
            BoundingBox::new(-10.0, 30.0, 20.0, 50.0),
            TimeRange::new(
                Utc.with_ymd_and_hms(2003, 6, 1, 0, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2003, 6, 9, 0, 0, 0).unwrap(),
            ),
        );
        let ordinates = envelope.to_ordinates(&temporal);
        assert_eq!(ordinates[5] - ordinates[2], 8.0);
        assert_eq!(Envelope::from_ordinates(ordinates, &temporal), envelope);
    }
}
