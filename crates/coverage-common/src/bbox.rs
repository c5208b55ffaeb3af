//! Bounding box types and operations.

use serde::{Deserialize, Serialize};

/// An axis-aligned box in the units of some CRS: degrees for the catalog's
/// geographic boxes, meters once transformed to Web Mercator.
///
/// A box whose minimum equals its maximum along an axis is a point or a
/// line. It is a legal query area and is not considered empty.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// The whole world in geographic coordinates.
    pub fn world() -> Self {
        Self::new(-180.0, -90.0, 180.0, 90.0)
    }

    /// Parse a "minx,miny,maxx,maxy" string.
    pub fn parse(s: &str) -> Result<Self, BboxParseError> {
        let parts: Vec<&str> = s.split(',').collect();
        if parts.len() != 4 {
            return Err(BboxParseError::InvalidFormat(s.to_string()));
        }

        let mut values = [0.0; 4];
        for (value, part) in values.iter_mut().zip(&parts) {
            *value = part
                .trim()
                .parse()
                .map_err(|_| BboxParseError::InvalidNumber(part.to_string()))?;
        }

        Ok(Self::new(values[0], values[1], values[2], values[3]))
    }

    /// Extent along x. Zero for a vertical line or a point.
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Area in squared coordinate units. Zero for points and lines.
    pub fn area(&self) -> f64 {
        if self.is_empty() {
            0.0
        } else {
            self.width() * self.height()
        }
    }

    /// True if the box is inverted along either axis or contains NaN.
    pub fn is_empty(&self) -> bool {
        !(self.min_x <= self.max_x && self.min_y <= self.max_y)
    }

    /// Strict overlap: boxes that only touch do not intersect.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_x < other.max_x
            && self.max_x > other.min_x
            && self.min_y < other.max_y
            && self.max_y > other.min_y
    }

    /// Common part of two boxes.
    ///
    /// Touching boxes, points and lines yield a degenerate (zero width or
    /// height) intersection. Only disjoint ranges yield `None`.
    pub fn intersection(&self, other: &BoundingBox) -> Option<BoundingBox> {
        let result = BoundingBox {
            min_x: self.min_x.max(other.min_x),
            min_y: self.min_y.max(other.min_y),
            max_x: self.max_x.min(other.max_x),
            max_y: self.max_y.min(other.max_y),
        };
        if result.is_empty() {
            None
        } else {
            Some(result)
        }
    }

    /// Smallest box containing both boxes.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }

    /// Closed containment, edges included.
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    /// Check if another box lies entirely inside this one.
    pub fn contains(&self, other: &BoundingBox) -> bool {
        self.contains_point(other.min_x, other.min_y) && self.contains_point(other.max_x, other.max_y)
    }

    /// Center of the box.
    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_x + self.max_x) / 2.0,
            (self.min_y + self.max_y) / 2.0,
        )
    }

    /// Bit patterns of the corners, for hashing and exact equality.
    pub fn to_bits(&self) -> [u64; 4] {
        [
            self.min_x.to_bits(),
            self.min_y.to_bits(),
            self.max_x.to_bits(),
            self.max_y.to_bits(),
        ]
    }
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::world()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BboxParseError {
    #[error("bounding box '{0}' does not have four comma-separated values")]
    InvalidFormat(String),

    #[error("'{0}' is not a coordinate")]
    InvalidNumber(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rejects_short_lists() {
        assert!(matches!(BoundingBox::parse("0,0,10"), Err(BboxParseError::InvalidFormat(_))));
        assert!(matches!(BoundingBox::parse("0,0,ten,10"), Err(BboxParseError::InvalidNumber(_))));
        assert_eq!(BoundingBox::parse("0,0,10,5").unwrap().area(), 50.0);
    }

    #[test]
    fn test_intersection() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(5.0, 5.0, 15.0, 15.0);
        let c = BoundingBox::new(20.0, 20.0, 30.0, 30.0);

        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
        assert!(a.intersection(&c).is_none());

        let intersection = a.intersection(&b).unwrap();
        assert_eq!(intersection, BoundingBox::new(5.0, 5.0, 10.0, 10.0));
    }

    #[test]
    fn test_point_intersection_is_kept() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let point = BoundingBox::new(3.0, 4.0, 3.0, 4.0);

        let intersection = a.intersection(&point).unwrap();
        assert_eq!(intersection.width(), 0.0);
        assert_eq!(intersection.height(), 0.0);
        assert!(!intersection.is_empty());
    }
}
