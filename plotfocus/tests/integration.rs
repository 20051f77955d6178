//! Tests d'intégration sur un petit parcellaire en mémoire

use std::collections::HashMap;
use std::sync::Arc;

use geo::{polygon, Coord, Geometry, Polygon};
use plotfocus::address;
use plotfocus::camera::ViewportCommand;
use plotfocus::{
    BoundaryResolver, BoundarySettings, CameraController, CameraSettings, Feature, FieldNames,
    FocusSession, HeadlessViewport, MemoryRenderer, OutlinePresenter, OutlineStrategy,
    OutlineStyle, PaneSpec, SessionSettings, SpatialIndex, Viewport,
};

fn parcel(locality: &str, block: &str, plot: &str, poly: Polygon) -> Feature {
    let properties: HashMap<String, String> = [
        ("Locality", locality),
        ("Block", block),
        ("Plot_No", plot),
        ("Type", "Residential"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    Feature::new(Some(Geometry::Polygon(poly)), properties)
}

/// 3 parcelles contiguës pour "Alpha" (en L), 2 disjointes pour "Beta"
fn dataset() -> Vec<Feature> {
    vec![
        parcel(
            "Alpha",
            "B1",
            "12",
            polygon![(x: 73.000, y: 33.600), (x: 73.001, y: 33.600), (x: 73.001, y: 33.601), (x: 73.000, y: 33.601), (x: 73.000, y: 33.600)],
        ),
        parcel(
            "Alpha",
            "B1",
            "13",
            polygon![(x: 73.001, y: 33.600), (x: 73.002, y: 33.600), (x: 73.002, y: 33.601), (x: 73.001, y: 33.601), (x: 73.001, y: 33.600)],
        ),
        parcel(
            "Alpha",
            "B2",
            "1",
            polygon![(x: 73.000, y: 33.601), (x: 73.001, y: 33.601), (x: 73.0005, y: 33.602), (x: 73.000, y: 33.601)],
        ),
        parcel(
            "Beta",
            "A",
            "1",
            polygon![(x: 73.100, y: 33.700), (x: 73.101, y: 33.700), (x: 73.101, y: 33.701), (x: 73.100, y: 33.701), (x: 73.100, y: 33.700)],
        ),
        parcel(
            "Beta",
            "A",
            "2",
            polygon![(x: 73.110, y: 33.710), (x: 73.111, y: 33.710), (x: 73.111, y: 33.711), (x: 73.110, y: 33.711), (x: 73.110, y: 33.710)],
        ),
    ]
}

fn session() -> FocusSession<HeadlessViewport, MemoryRenderer> {
    let index = Arc::new(SpatialIndex::build(dataset(), &FieldNames::default()));
    let viewport = HeadlessViewport::new(Coord { x: 67.0, y: 24.8 }, 9.0, 1024.0, 768.0);
    FocusSession::new(
        Arc::clone(&index),
        BoundaryResolver::new(index, BoundarySettings::default()),
        CameraController::new(viewport, CameraSettings::default()),
        OutlinePresenter::new(MemoryRenderer::new(), OutlineStyle::default(), PaneSpec::default()),
        SessionSettings::default(),
    )
}

#[test]
fn test_index_statistics() {
    let index = SpatialIndex::build(dataset(), &FieldNames::default());
    assert_eq!(index.locality_count(), 2);
    assert_eq!(index.parcel_count(), 5);

    let alpha = index.locality("Alpha").unwrap();
    assert_eq!(alpha.count, 3);
    assert_eq!(alpha.bounding_box.min(), Coord { x: 73.000, y: 33.600 });
    assert_eq!(alpha.bounding_box.max(), Coord { x: 73.002, y: 33.602 });
}

#[test]
fn test_reference_key() {
    let features = dataset();
    let key = address::encode(&features[0], &FieldNames::default());
    assert_eq!(key.as_str(), "alpha__b1__12");
}

#[tokio::test]
async fn test_alpha_dissolves_beta_falls_back() {
    let index = Arc::new(SpatialIndex::build(dataset(), &FieldNames::default()));
    let resolver = BoundaryResolver::new(index, BoundarySettings::default());

    let alpha = resolver.resolve("Alpha").await.expect("alpha outline");
    assert_eq!(alpha.strategy, OutlineStrategy::Dissolve);
    assert_eq!(alpha.ring_count(), 1);

    let beta = resolver.resolve("Beta").await.expect("beta outline");
    assert_ne!(beta.strategy, OutlineStrategy::Dissolve);

    // Deuxième appel : cache, aucun nouveau calcul
    resolver.resolve("Alpha").await;
    assert_eq!(resolver.computations(), 2);
}

#[tokio::test]
async fn test_concurrent_resolution_runs_once() {
    let index = Arc::new(SpatialIndex::build(dataset(), &FieldNames::default()));
    let resolver = BoundaryResolver::new(index, BoundarySettings::default());

    let (a, b, c) = tokio::join!(
        resolver.resolve("Alpha"),
        resolver.resolve("Alpha"),
        resolver.resolve("Alpha")
    );
    assert!(a.is_some() && b.is_some() && c.is_some());
    assert_eq!(resolver.computations(), 1);
}

#[tokio::test]
async fn test_shared_link_round_trip() {
    let session = session();
    let features = dataset();
    let key = address::encode(&features[0], &FieldNames::default());
    let expected = features[0].bounding_box().unwrap();

    let selection = session.decode_and_focus(key.as_str()).await.expect("known plot");
    assert_eq!(selection.summary.key, key);
    assert_eq!(selection.summary.plot, "12");

    session.camera().with_viewport(|v| {
        let fits: Vec<_> = v
            .history()
            .iter()
            .filter_map(|cmd| match cmd {
                ViewportCommand::FitBounds { target, .. } => Some(*target),
                _ => None,
            })
            .collect();
        assert_eq!(v.history().len(), 1);
        assert_eq!(fits, vec![expected]);
        assert!(v.bounds().contains(&expected));
    });
}

#[tokio::test]
async fn test_present_same_outline_twice() {
    let session = session();
    let outline = session.resolver().resolve("Alpha").await.unwrap();

    session.presenter().present(Arc::clone(&outline), std::time::Duration::from_secs(5));
    session.presenter().present(Arc::clone(&outline), std::time::Duration::from_secs(5));

    session.presenter().with_renderer(|r| {
        assert_eq!(r.layers().len(), 1);
        assert_eq!(r.added(), 1);
    });
}

#[tokio::test]
async fn test_unknown_link_is_silent() {
    let session = session();
    assert!(session.decode_and_focus("gamma__z__9").await.is_none());
    assert!(session.camera().with_viewport(|v| v.history().is_empty()));
}
