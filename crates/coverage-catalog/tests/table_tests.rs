//! Coverage table queries: filtering, pooling, lookups.

mod common;

use std::sync::Arc;

use catalog_store::CoverageRecord;
use common::counting_services;
use coverage_catalog::{CoverageReference, CoverageTable, Operation};
use coverage_common::{BoundingBox, CatalogError, TimeRange};
use test_utils::{band, bbox, coverage, crs, day, sst_catalog, sst_series, SourceTree, PNG_FORMAT, WGS84};

fn table_over(records: Vec<CoverageRecord>) -> (CoverageTable, SourceTree) {
    let tree = SourceTree::new().unwrap();
    let store = records.into_iter().fold(sst_catalog(), |store, r| store.with_coverage(r));
    let (services, _) = counting_services(store, &tree);
    (CoverageTable::for_series(services, "SST"), tree)
}

fn names(entries: &[Arc<coverage_catalog::CoverageEntry>]) -> Vec<&str> {
    entries.iter().map(|e| e.name()).collect()
}

// ============================================================================
// Canonicalization
// ============================================================================

#[tokio::test]
async fn test_equal_references_share_one_entry() {
    let (table, _tree) = table_over(vec![coverage("a", 1, bbox::SQUARE, 100, 100)]);
    let view = table.view().await;

    let first = table.entries().await.unwrap();
    let second = view.entries().await.unwrap();
    let named = table.entry_named(Some("a")).await.unwrap().unwrap();

    assert!(Arc::ptr_eq(&first[0], &second[0]));
    assert!(Arc::ptr_eq(&first[0], &named));
    assert!(Arc::ptr_eq(first[0].parameters(), second[0].parameters()));
}

#[tokio::test]
async fn test_different_operations_give_different_entries() {
    let (table, _tree) = table_over(vec![coverage("a", 1, bbox::SQUARE, 100, 100)]);
    let view = table.view().await;
    view.set_operation(Some(Operation::GradientMagnitude)).await;

    let plain = table.entry().await.unwrap().unwrap();
    let gradient = view.entry().await.unwrap().unwrap();
    assert!(!Arc::ptr_eq(&plain, &gradient));
    assert_eq!(plain.reference(), gradient.reference());
    assert_eq!(table.operation().await, None);
}

#[test]
fn test_reference_round_trip() {
    let record = coverage("a", 3, bbox::SQUARE, 640, 480);
    let reference = CoverageReference::try_from(record.clone()).unwrap();
    assert_eq!(reference.to_record(), record);
    assert_eq!(reference.width, 640);
    assert_eq!(reference.time_range, TimeRange::new(day(3), day(4)));
}

// ============================================================================
// Resolution filtering
// ============================================================================

#[tokio::test]
async fn test_resolution_filter_keeps_sufficient_coarsest() {
    let (table, _tree) = table_over(vec![
        coverage("coarse", 1, bbox::SQUARE, 100, 100),
        coverage("fine", 1, bbox::SQUARE, 400, 400),
    ]);
    table.set_preferred_resolution(Some((0.1, 0.1))).await;

    let entries = table.entries().await.unwrap();
    assert_eq!(names(&entries), vec!["coarse"]);
}

#[tokio::test]
async fn test_resolution_filter_falls_back_to_finest() {
    let (table, _tree) = table_over(vec![
        coverage("coarse", 1, bbox::SQUARE, 100, 100),
        coverage("fine", 1, bbox::SQUARE, 400, 400),
    ]);

    table.set_preferred_resolution(Some((0.001, 0.001))).await;
    assert_eq!(names(&table.entries().await.unwrap()), vec!["fine"]);

    table.set_preferred_resolution(None).await;
    assert_eq!(names(&table.entries().await.unwrap()), vec!["fine"]);
}

#[tokio::test]
async fn test_resolution_filter_keeps_distinct_times() {
    let (table, _tree) = table_over(vec![
        coverage("day1", 1, bbox::SQUARE, 100, 100),
        coverage("day2", 2, bbox::SQUARE, 100, 100),
    ]);
    assert_eq!(names(&table.entries().await.unwrap()), vec!["day1", "day2"]);
}

// ============================================================================
// Configuration
// ============================================================================

#[tokio::test]
async fn test_time_range_and_box_filter_entries() {
    let (table, _tree) = table_over(vec![
        coverage("day1", 1, bbox::SQUARE, 100, 100),
        coverage("day5", 5, bbox::SQUARE, 100, 100),
        coverage("elsewhere", 5, bbox::DISJOINT, 100, 100),
    ]);

    table.set_time_range(TimeRange::new(day(4), day(8))).await;
    assert_eq!(names(&table.entries().await.unwrap()), vec!["day5", "elsewhere"]);

    table.set_geographic_bounding_box(bbox::SQUARE).await;
    assert_eq!(names(&table.entries().await.unwrap()), vec!["day5"]);
    assert_eq!(table.geographic_bounding_box().await, bbox::SQUARE);
    assert_eq!(table.time_range().await, TimeRange::new(day(4), day(8)));
}

#[tokio::test]
async fn test_best_entry_is_closest_in_time() {
    let (table, _tree) = table_over(vec![
        coverage("day1", 1, bbox::SQUARE, 100, 100),
        coverage("day5", 5, bbox::SQUARE, 100, 100),
        coverage("day6", 6, bbox::SQUARE, 100, 100),
    ]);
    table.set_time_range(TimeRange::instant(day(5) + chrono::Duration::hours(6))).await;

    let best = table.entry().await.unwrap().unwrap();
    assert_eq!(best.name(), "day5");
}

#[tokio::test]
async fn test_best_entry_prefers_full_spatial_cover() {
    let (table, _tree) = table_over(vec![
        coverage("corner", 1, BoundingBox::new(0.0, 0.0, 5.0, 5.0), 50, 50),
        coverage("whole", 1, bbox::SQUARE, 100, 100),
    ]);
    table.set_geographic_bounding_box(bbox::SQUARE).await;

    let best = table.entry().await.unwrap().unwrap();
    assert_eq!(best.name(), "whole");
}

#[tokio::test]
async fn test_envelope_and_available_times() {
    let (table, _tree) = table_over(vec![
        coverage("day2", 2, BoundingBox::new(0.0, 0.0, 5.0, 5.0), 50, 50),
        coverage("day1", 1, bbox::SQUARE, 100, 100),
        coverage("day1-bis", 1, bbox::SQUARE, 100, 100),
    ]);

    let envelope = table.envelope().await.unwrap().unwrap();
    assert_eq!(envelope.bbox, bbox::SQUARE);
    assert_eq!(envelope.time, TimeRange::new(day(1), day(3)));

    let times = table.available_times().await.unwrap();
    assert_eq!(times, vec![TimeRange::new(day(1), day(2)), TimeRange::new(day(2), day(3))]);

    table.set_time_range(TimeRange::new(day(10), day(11))).await;
    assert_eq!(table.envelope().await.unwrap(), None);
}

// ============================================================================
// Lookups by name
// ============================================================================

#[tokio::test]
async fn test_entry_named_semantics() {
    let tree = SourceTree::new().unwrap();
    let mut other = coverage("a", 1, bbox::SQUARE, 100, 100);
    other.series = "SST2".to_string();
    let mut series2 = sst_series();
    series2.name = "SST2".to_string();
    let store = sst_catalog()
        .with_series(series2)
        .with_coverage(coverage("a", 1, bbox::SQUARE, 100, 100))
        .with_coverage(other);
    let (services, _) = counting_services(store, &tree);

    let table = CoverageTable::for_series(services.clone(), "SST");
    assert!(table.entry_named(None).await.unwrap().is_none());
    assert_eq!(table.entry_named(Some("a")).await.unwrap().unwrap().reference().series, "SST");
    assert!(matches!(
        table.entry_named(Some("missing")).await,
        Err(CatalogError::NotFound { .. })
    ));

    let all_series = CoverageTable::new(services);
    assert!(matches!(
        all_series.entry_named(Some("a")).await,
        Err(CatalogError::InvalidRecord { .. })
    ));
}

// ============================================================================
// Invalid records
// ============================================================================

#[tokio::test]
async fn test_band_gap_is_invalid_record() {
    let tree = SourceTree::new().unwrap();
    let store = sst_catalog()
        .with_band(band(2, PNG_FORMAT, 2, "second"))
        .with_band(band(4, PNG_FORMAT, 4, "fourth"))
        .with_coverage(coverage("a", 1, bbox::SQUARE, 100, 100));
    let (services, _) = counting_services(store, &tree);

    let result = services.formats.bands(PNG_FORMAT).await;
    match result {
        Err(CatalogError::InvalidRecord { message, .. }) => assert!(message.contains("non-consecutive bands")),
        other => panic!("expected InvalidRecord, got {:?}", other.map(|b| b.len())),
    }

    let table = CoverageTable::for_series(services, "SST");
    assert!(matches!(table.entries().await, Err(CatalogError::InvalidRecord { .. })));
}

#[tokio::test]
async fn test_duplicate_crs_is_invalid_record() {
    let tree = SourceTree::new().unwrap();
    let store = sst_catalog()
        .with_crs(crs(WGS84, "EPSG:4326"))
        .with_coverage(coverage("a", 1, bbox::SQUARE, 100, 100));
    let (services, _) = counting_services(store, &tree);
    let table = CoverageTable::for_series(services, "SST");

    assert!(matches!(table.entries().await, Err(CatalogError::InvalidRecord { .. })));
}

#[tokio::test]
async fn test_unknown_crs_is_not_found() {
    let mut record = coverage("a", 1, bbox::SQUARE, 100, 100);
    record.crs = "Lambert".to_string();
    let (table, _tree) = table_over(vec![record]);

    assert!(matches!(table.entries().await, Err(CatalogError::NotFound { .. })));
}

#[tokio::test]
async fn test_invalid_size_is_rejected() {
    let (table, _tree) = table_over(vec![coverage("a", 1, bbox::SQUARE, 0, 100)]);
    assert!(matches!(table.entries().await, Err(CatalogError::InvalidRecord { .. })));
}
