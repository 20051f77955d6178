//! Parcours complet : fichier GeoJSON, index, contours, export, lien partagé

use std::sync::Arc;

use plotfocus::{
    BoundaryResolver, CameraController, FocusSession, HeadlessViewport, MemoryRenderer,
    OutlinePresenter, OutlineStrategy, SpatialIndex,
};
use plotmap::{
    export_outlines, load_dataset, plot_key_from_url, share_url, Config, LocalityOutline,
    OutlineReport, OutlineStatus,
};

fn square(x: f64, y: f64, locality: &str, block: &str, plot: &str) -> String {
    let s = 0.001;
    format!(
        r#"{{"type":"Feature","properties":{{"Locality":"{locality}","Block":"{block}","Plot_No":"{plot}","Type":"Residential"}},"geometry":{{"type":"Polygon","coordinates":[[[{x0:.3},{y0:.3}],[{x1:.3},{y0:.3}],[{x1:.3},{y1:.3}],[{x0:.3},{y1:.3}],[{x0:.3},{y0:.3}]]]}}}}"#,
        x0 = x,
        y0 = y,
        x1 = x + s,
        y1 = y + s,
    )
}

fn sample_collection() -> String {
    let features = [
        square(73.000, 33.600, "Alpha", "B1", "1"),
        square(73.001, 33.600, "Alpha", "B1", "2"),
        square(73.000, 33.601, "Alpha", "B2", "3"),
        square(73.100, 33.700, "Beta", "C", "1"),
        square(73.104, 33.700, "Beta", "C", "2"),
    ];
    format!(
        r#"{{"type":"FeatureCollection","features":[{}]}}"#,
        features.join(",")
    )
}

async fn load_index(name: &str) -> Arc<SpatialIndex> {
    let path = std::env::temp_dir().join(name);
    tokio::fs::write(&path, sample_collection()).await.unwrap();
    let dataset = load_dataset(&path).await.unwrap();
    tokio::fs::remove_file(&path).await.ok();

    assert_eq!(dataset.features.len(), 5);
    Arc::new(SpatialIndex::build(dataset.features, &Config::default().fields))
}

#[tokio::test]
async fn test_resolve_and_export_all_localities() {
    let index = load_index("plotmap_flow_export.geojson").await;
    assert_eq!(index.locality_count(), 2);
    assert_eq!(index.parcel_count(), 5);

    let config = Config::default();
    let resolver = BoundaryResolver::new(Arc::clone(&index), config.boundary);

    let mut report = OutlineReport::new("test");
    let mut outlines = Vec::new();
    for entry in index.catalogue() {
        let outline = resolver.resolve(&entry.name).await.unwrap();
        report.record_outline(outline.strategy, entry.count);
        outlines.push(LocalityOutline {
            locality: entry.name.clone(),
            parcels: entry.count,
            outline,
        });
    }
    report.finalize();

    assert_eq!(outlines[0].outline.strategy, OutlineStrategy::Dissolve);
    assert_ne!(outlines[1].outline.strategy, OutlineStrategy::Dissolve);
    assert_eq!(report.status, OutlineStatus::Approximate);

    let output = std::env::temp_dir().join("plotmap_flow_outlines.geojson");
    export_outlines(&outlines, &output).unwrap();
    let content = std::fs::read_to_string(&output).unwrap();
    std::fs::remove_file(&output).ok();

    let value: serde_json::Value = serde_json::from_str(&content).unwrap();
    let features = value["features"].as_array().unwrap();
    assert_eq!(features.len(), 2);
    assert_eq!(features[0]["properties"]["locality"], "Alpha");
    assert_eq!(features[0]["properties"]["parcels"], 3);
}

#[tokio::test]
async fn test_shared_link_focuses_plot() {
    let index = load_index("plotmap_flow_focus.geojson").await;
    let config = Config::default();

    let session = FocusSession::new(
        Arc::clone(&index),
        BoundaryResolver::new(Arc::clone(&index), config.boundary),
        CameraController::new(
            HeadlessViewport::new(config.viewport.center(), config.viewport.zoom, 1280.0, 800.0),
            config.camera.clone(),
        ),
        OutlinePresenter::new(
            MemoryRenderer::new(),
            config.outline.style.clone(),
            config.outline.pane.clone(),
        ),
        config.session_settings(),
    );

    let key = plotfocus::address::encode_parts("Alpha", "B1", "2");
    let link = share_url(&config.share.base_url, &config.share.param, &key).unwrap();
    let decoded = plot_key_from_url(link.as_str(), &config.share.param).unwrap();
    assert_eq!(decoded, key);

    let selection = session.decode_and_focus(decoded.as_str()).await.unwrap();
    assert!(selection.moved);
    assert_eq!(selection.summary.plot, "2");
    assert_eq!(selection.summary.block, "B1");
    assert_eq!(selection.summary.locality, "Alpha");

    assert_eq!(
        session.presenter().current_strategy(),
        Some(OutlineStrategy::Parcel)
    );
}

#[tokio::test]
async fn test_unknown_link_leaves_map_unchanged() {
    let index = load_index("plotmap_flow_unknown.geojson").await;
    let config = Config::default();

    let session = FocusSession::new(
        Arc::clone(&index),
        BoundaryResolver::new(Arc::clone(&index), config.boundary),
        CameraController::new(
            HeadlessViewport::new(config.viewport.center(), config.viewport.zoom, 1280.0, 800.0),
            config.camera.clone(),
        ),
        OutlinePresenter::new(
            MemoryRenderer::new(),
            config.outline.style.clone(),
            config.outline.pane.clone(),
        ),
        config.session_settings(),
    );

    assert!(session.decode_and_focus("gamma__x__9").await.is_none());
    assert!(session.presenter().current().is_none());
    assert!(session.camera().with_viewport(|v| v.history().is_empty()));
}
