//! Ranking of entries against a requested envelope.

use std::cmp::Ordering;
use std::sync::Arc;

use coverage_common::{BoundingBox, Envelope, TimeRange};

use crate::entry::CoverageEntry;

/// Orders entries by how well they fill the requested envelope.
///
/// The rank is the fraction of the requested time × area volume an entry
/// leaves uncovered, then the distance between the time centres. Lower is
/// better.
#[derive(Debug, Clone, Copy)]
pub struct CoverageComparator {
    requested: Envelope,
}

impl CoverageComparator {
    pub fn new(requested: Envelope) -> Self {
        Self { requested }
    }

    pub fn requested(&self) -> &Envelope {
        &self.requested
    }

    /// Uncovered fraction in `[0, 1]` and time-centre distance in seconds.
    pub fn rank(&self, entry: &CoverageEntry) -> (f64, f64) {
        let spatial = spatial_fraction(&self.requested.bbox, &entry.geographic_bounding_box());
        let temporal = temporal_fraction(&self.requested.time, &entry.time_range());
        let distance = (entry.time_range().center() - self.requested.time.center())
            .num_milliseconds()
            .abs() as f64
            / 1000.0;
        (1.0 - spatial * temporal, distance)
    }

    pub fn compare(&self, a: &CoverageEntry, b: &CoverageEntry) -> Ordering {
        let (ua, da) = self.rank(a);
        let (ub, db) = self.rank(b);
        ua.total_cmp(&ub).then(da.total_cmp(&db))
    }

    /// The best entry. The first one wins ties.
    pub fn best<'a, I>(&self, entries: I) -> Option<&'a Arc<CoverageEntry>>
    where
        I: IntoIterator<Item = &'a Arc<CoverageEntry>>,
    {
        entries.into_iter().fold(None, |best, entry| match best {
            Some(current) if self.compare(entry, current) != Ordering::Less => Some(current),
            _ => Some(entry),
        })
    }
}

/// Share of the requested area covered by `other`. A requested point or
/// line counts as fully covered when touched.
fn spatial_fraction(requested: &BoundingBox, other: &BoundingBox) -> f64 {
    let Some(overlap) = requested.intersection(other) else {
        return 0.0;
    };
    let area = requested.area();
    if area > 0.0 {
        overlap.area() / area
    } else {
        1.0
    }
}

fn temporal_fraction(requested: &TimeRange, other: &TimeRange) -> f64 {
    if !requested.intersects(other) {
        return 0.0;
    }
    let span = requested.duration().num_milliseconds();
    if span > 0 {
        requested.overlap(other).num_milliseconds() as f64 / span as f64
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn range(d0: u32, d1: u32) -> TimeRange {
        TimeRange::new(
            Utc.with_ymd_and_hms(2000, 1, d0, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2000, 1, d1, 0, 0, 0).unwrap(),
        )
    }

    #[test]
    fn test_spatial_fraction() {
        let requested = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        assert_eq!(spatial_fraction(&requested, &BoundingBox::new(0.0, 0.0, 5.0, 10.0)), 0.5);
        assert_eq!(spatial_fraction(&requested, &BoundingBox::new(20.0, 20.0, 30.0, 30.0)), 0.0);
        let point = BoundingBox::new(5.0, 5.0, 5.0, 5.0);
        assert_eq!(spatial_fraction(&point, &requested), 1.0);
    }

    #[test]
    fn test_temporal_fraction() {
        assert_eq!(temporal_fraction(&range(1, 11), &range(1, 6)), 0.5);
        assert_eq!(temporal_fraction(&range(1, 11), &range(20, 21)), 0.0);
        let instant = TimeRange::instant(Utc.with_ymd_and_hms(2000, 1, 3, 0, 0, 0).unwrap());
        assert_eq!(temporal_fraction(&instant, &range(1, 6)), 1.0);
    }
}
