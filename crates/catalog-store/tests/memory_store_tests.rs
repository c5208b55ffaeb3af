//! The in-memory store behind the `CatalogStore` trait object.

use std::sync::Arc;

use chrono::{TimeZone, Utc};

use catalog_store::{
    CatalogStore, CoverageQuery, CoverageRecord, DescriptorRecord, LinearModelRecord, MemoryCatalogStore,
};
use coverage_common::{BoundingBox, CatalogError, TimeRange};

fn coverage(filename: &str, day: u32, bbox: BoundingBox) -> CoverageRecord {
    CoverageRecord {
        series: "SST".to_string(),
        subseries: "daily".to_string(),
        filename: filename.to_string(),
        index: 0,
        start_time: Utc.with_ymd_and_hms(2000, 1, day, 0, 0, 0).unwrap(),
        end_time: Utc.with_ymd_and_hms(2000, 1, day + 1, 0, 0, 0).unwrap(),
        bbox,
        width: 10,
        height: 10,
        crs: "WGS84".to_string(),
        format: "PNG".to_string(),
    }
}

fn query(series: Option<&str>, bbox: BoundingBox) -> CoverageQuery {
    CoverageQuery {
        series: series.map(str::to_string),
        time_range: TimeRange::unbounded(),
        bbox,
    }
}

#[test]
fn test_store_is_usable_as_trait_object() {
    let store: Arc<dyn CatalogStore> = Arc::new(
        MemoryCatalogStore::new()
            .with_coverage(coverage("a", 1, BoundingBox::new(0.0, 0.0, 10.0, 10.0)))
            .with_coverage(coverage("b", 2, BoundingBox::new(20.0, 20.0, 30.0, 30.0))),
    );

    let found = tokio_test::block_on(store.find_coverages(&query(None, BoundingBox::new(5.0, 5.0, 6.0, 6.0)))).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].filename, "a");

    let other_series = tokio_test::block_on(store.find_coverages(&query(Some("CHL"), BoundingBox::world()))).unwrap();
    assert!(other_series.is_empty());
}

#[test]
fn test_coverages_added_after_sharing_are_visible() {
    let store = Arc::new(MemoryCatalogStore::new());
    tokio_test::block_on(async {
        assert_eq!(store.coverage_count().await, 0);
        store.add_coverage(coverage("late", 3, BoundingBox::world())).await;
        assert_eq!(store.coverage_count().await, 1);

        let named = store.find_coverages_named(Some("SST"), "late").await.unwrap();
        assert_eq!(named.len(), 1);
    });
}

#[test]
fn test_linear_terms_keep_insertion_order() {
    let term = |coefficient: f64, names: &[&str]| LinearModelRecord {
        target: "PP".to_string(),
        coefficient,
        descriptors: names.iter().map(|n| n.to_string()).collect(),
    };
    let store = MemoryCatalogStore::new()
        .with_linear_term(term(2.0, &["sst"]))
        .with_linear_term(term(1.0, &[]))
        .with_linear_term(term(0.5, &["sst", "chl"]));

    let terms = tokio_test::block_on(store.linear_model("PP")).unwrap();
    let coefficients: Vec<f64> = terms.iter().map(|t| t.coefficient).collect();
    assert_eq!(coefficients, vec![2.0, 1.0, 0.5]);
    assert!(tokio_test::block_on(store.linear_model("CHL")).unwrap().is_empty());
}

#[test]
fn test_descriptor_lookups() {
    let store = MemoryCatalogStore::new().with_descriptor(DescriptorRecord {
        id: 7,
        name: "sst".to_string(),
        phenomenon: "temperature".to_string(),
        procedure: "mean".to_string(),
        band: 1,
        dt: -1.0,
        dx: 0.0,
        dy: 0.0,
        dz: 0.0,
        distribution: "normal".to_string(),
    });

    tokio_test::block_on(async {
        assert_eq!(store.descriptor_by_id(7).await.unwrap().unwrap().name, "sst");
        assert!(store.descriptor_by_id(8).await.unwrap().is_none());
        assert_eq!(store.descriptors_named("sst").await.unwrap().len(), 1);
        assert!(matches!(store.series("SST").await, Err(CatalogError::NotFound { .. })));
    });
}
