//! Chargement du parcellaire GeoJSON
//!
//! Formes acceptées : `FeatureCollection`, tableau de features, ou tout
//! objet portant un tableau `features`. Les features illisibles sont
//! comptées puis ignorées.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{debug, info, warn};

use plotfocus::Feature;

/// Jeu de données chargé
#[derive(Debug, Clone)]
pub struct Dataset {
    pub features: Vec<Feature>,

    /// Empreinte blake3 (hex) du fichier source, sert de version
    pub fingerprint: String,

    /// Features ignorées (JSON ou géométrie invalide)
    pub rejected: usize,
}

impl Dataset {
    /// Version courte pour les logs
    pub fn short_fingerprint(&self) -> &str {
        &self.fingerprint[..self.fingerprint.len().min(12)]
    }
}

/// Lit et décode un fichier GeoJSON (décodage hors de l'exécuteur async)
pub async fn load_dataset(path: &Path) -> Result<Dataset> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read dataset: {}", path.display()))?;

    let size = bytes.len();
    let dataset = tokio::task::spawn_blocking(move || parse_dataset(&bytes))
        .await
        .context("Dataset parse task failed")??;

    info!(
        path = %path.display(),
        bytes = size,
        features = dataset.features.len(),
        rejected = dataset.rejected,
        version = dataset.short_fingerprint(),
        "Dataset loaded"
    );
    Ok(dataset)
}

/// Décode un document GeoJSON déjà en mémoire
pub fn parse_dataset(bytes: &[u8]) -> Result<Dataset> {
    let fingerprint = hex::encode(blake3::hash(bytes).as_bytes());
    let document: Value = serde_json::from_slice(bytes).context("Dataset is not valid JSON")?;

    let raw = match document {
        Value::Array(items) => items,
        Value::Object(mut object) => match object.remove("features") {
            Some(Value::Array(items)) => items,
            _ => anyhow::bail!("Dataset has no features array"),
        },
        _ => anyhow::bail!("Dataset must be a FeatureCollection or an array of features"),
    };

    let mut features = Vec::with_capacity(raw.len());
    let mut rejected = 0;
    for (idx, value) in raw.into_iter().enumerate() {
        match convert_feature(value) {
            Ok(feature) => features.push(feature),
            Err(e) => {
                debug!(index = idx, error = %e, "Feature rejected");
                rejected += 1;
            }
        }
    }

    if rejected > 0 {
        warn!(rejected, "Some features could not be read");
    }

    Ok(Dataset {
        features,
        fingerprint,
        rejected,
    })
}

/// GeoJSON -> feature du moteur (attributs aplatis en texte)
fn convert_feature(value: Value) -> Result<Feature> {
    let feature = geojson::Feature::from_json_value(value).context("Invalid GeoJSON feature")?;

    let geometry = match feature.geometry {
        Some(geometry) => Some(
            geo::Geometry::<f64>::try_from(geometry).context("Unsupported GeoJSON geometry")?,
        ),
        None => None,
    };

    let properties: HashMap<String, String> = feature
        .properties
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(key, value)| property_text(value).map(|text| (key, text)))
        .collect();

    Ok(Feature::new(geometry, properties))
}

fn property_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::Geometry;

    const COLLECTION: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "properties": {"Locality": "Alpha", "Block": "B1", "Plot_No": 12, "Type": "Residential", "Corner": true, "Note": null},
                "geometry": {"type": "Polygon", "coordinates": [[[73.0, 33.6], [73.001, 33.6], [73.001, 33.601], [73.0, 33.6]]]}
            },
            {
                "type": "Feature",
                "properties": {"Locality": "Beta"},
                "geometry": null
            }
        ]
    }"#;

    #[test]
    fn test_parse_feature_collection() {
        let dataset = parse_dataset(COLLECTION.as_bytes()).unwrap();
        assert_eq!(dataset.features.len(), 2);
        assert_eq!(dataset.rejected, 0);
        assert_eq!(dataset.fingerprint.len(), 64);

        let first = &dataset.features[0];
        assert_eq!(first.property("Plot_No"), "12");
        assert_eq!(first.property("Corner"), "true");
        assert!(!first.properties.contains_key("Note"));
        assert!(matches!(first.geometry, Some(Geometry::Polygon(_))));
        assert!(dataset.features[1].geometry.is_none());
    }

    #[test]
    fn test_parse_bare_array() {
        let array = r#"[{"type": "Feature", "properties": {"Locality": "Alpha"}, "geometry": {"type": "Point", "coordinates": [73.0, 33.6]}}]"#;
        let dataset = parse_dataset(array.as_bytes()).unwrap();
        assert_eq!(dataset.features.len(), 1);
    }

    #[test]
    fn test_invalid_feature_rejected() {
        let doc = r#"{"features": [{"type": "Feature", "properties": {}, "geometry": {"type": "Polygon", "coordinates": "oops"}}, {"type": "Feature", "properties": {}, "geometry": null}]}"#;
        let dataset = parse_dataset(doc.as_bytes()).unwrap();
        assert_eq!(dataset.features.len(), 1);
        assert_eq!(dataset.rejected, 1);
    }

    #[test]
    fn test_not_a_collection() {
        assert!(parse_dataset(b"42").is_err());
        assert!(parse_dataset(br#"{"type": "Feature"}"#).is_err());
        assert!(parse_dataset(b"not json").is_err());
    }

    #[test]
    fn test_fingerprint_tracks_content() {
        let a = parse_dataset(b"[]").unwrap();
        let b = parse_dataset(b"[ ]").unwrap();
        assert_ne!(a.fingerprint, b.fingerprint);
        assert_eq!(a.short_fingerprint().len(), 12);
    }

    #[tokio::test]
    async fn test_load_from_disk() {
        let path = std::env::temp_dir().join("plotmap_loader_test.geojson");
        tokio::fs::write(&path, COLLECTION).await.unwrap();

        let dataset = load_dataset(&path).await.unwrap();
        assert_eq!(dataset.features.len(), 2);

        tokio::fs::remove_file(&path).await.ok();
        assert!(load_dataset(&path).await.is_err());
    }
}
