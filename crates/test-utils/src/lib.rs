//! Fixtures for catalog tests.
//!
//! `sst_catalog()` gives an in-memory catalog with one sea surface
//! temperature series stored as 8-bit PNGs. Coverage rows are added with
//! `coverage(..)`, and the matching image files are written into a
//! `SourceTree` with the PNG generators:
//!
//! ```ignore
//! let tree = SourceTree::new()?;
//! tree.write(SST_PATH, "a.png", &gradient_png(100, 100))?;
//! let store = sst_catalog().with_coverage(coverage("a", 1, bbox::SQUARE, 100, 100));
//! ```

pub mod fixtures;
pub mod generators;
pub mod paths;

pub use fixtures::*;
pub use generators::*;
pub use paths::*;

/// Assert that two numbers differ by at most `epsilon` (default `1e-9`).
///
/// Both sides are compared as `f64`, so `f32` coverage values can be checked
/// against `f64` expectations.
#[macro_export]
macro_rules! assert_approx_eq {
    ($actual:expr, $expected:expr) => {
        $crate::assert_approx_eq!($actual, $expected, 1e-9)
    };
    ($actual:expr, $expected:expr, $epsilon:expr) => {{
        let (actual, expected, epsilon) = ($actual as f64, $expected as f64, $epsilon as f64);
        assert!(
            (actual - expected).abs() <= epsilon,
            "values differ: {} vs {} (tolerance {})",
            actual,
            expected,
            epsilon
        );
    }};
}
