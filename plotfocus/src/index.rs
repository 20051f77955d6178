//! Index spatial : localités et parcelles, reconstruit à chaque chargement

use std::collections::HashMap;
use std::sync::Arc;

use geo::Coord;
use rayon::prelude::*;
use tracing::debug;

use crate::address::{self, PlotKey};
use crate::types::{BoundingBox, Feature, FieldNames};

/// Entrée de l'index des localités
#[derive(Debug, Clone)]
pub struct LocalityEntry {
    /// Nom d'affichage (première occurrence, espaces retirés)
    pub name: String,

    /// Union des emprises des parcelles membres
    pub bounding_box: BoundingBox,

    /// Nombre de parcelles membres
    pub count: usize,

    features: Vec<Arc<Feature>>,
}

impl LocalityEntry {
    pub fn features(&self) -> &[Arc<Feature>] {
        &self.features
    }
}

/// Entrée de l'index des parcelles
#[derive(Debug, Clone)]
pub struct ParcelEntry {
    pub feature: Arc<Feature>,
    pub bounding_box: BoundingBox,
}

/// Repère d'une localité sur la carte
#[derive(Debug, Clone, PartialEq)]
pub struct LocalityPin {
    pub name: String,
    pub position: Coord,
    pub count: usize,
}

/// Index des localités (nom normalisé) et des parcelles (clé canonique)
#[derive(Debug, Default)]
pub struct SpatialIndex {
    fields: FieldNames,
    localities: HashMap<String, LocalityEntry>,
    parcels: HashMap<PlotKey, ParcelEntry>,
    skipped: usize,
}

impl SpatialIndex {
    /// Construit les deux index en une passe.
    ///
    /// Les features sans localité sont ignorées. Sur collision de clé, la
    /// première parcelle vue est conservée ; la localité compte toujours
    /// toutes ses features.
    pub fn build(features: Vec<Feature>, fields: &FieldNames) -> Self {
        // Le calcul des emprises domine, on le parallélise en gardant l'ordre
        let boxes: Vec<Option<BoundingBox>> =
            features.par_iter().map(Feature::bounding_box).collect();

        let mut localities: HashMap<String, LocalityEntry> = HashMap::new();
        let mut parcels: HashMap<PlotKey, ParcelEntry> = HashMap::new();
        let mut skipped = 0;

        for (feature, bbox) in features.into_iter().zip(boxes) {
            let display = feature.property(&fields.locality).trim().to_string();
            let key = address::normalize(&display);
            if key.is_empty() {
                skipped += 1;
                continue;
            }

            let feature = Arc::new(feature);
            let entry = localities.entry(key).or_insert_with(|| LocalityEntry {
                name: display,
                bounding_box: BoundingBox::EMPTY,
                count: 0,
                features: Vec::new(),
            });
            if let Some(bbox) = &bbox {
                entry.bounding_box.extend(bbox);
            }
            entry.count += 1;
            entry.features.push(Arc::clone(&feature));

            // Sans emprise la parcelle n'est pas focalisable
            if let Some(bounding_box) = bbox {
                let plot_key = address::encode(&feature, fields);
                parcels.entry(plot_key).or_insert(ParcelEntry {
                    feature,
                    bounding_box,
                });
            }
        }

        debug!(
            localities = localities.len(),
            parcels = parcels.len(),
            skipped,
            "Spatial index built"
        );

        Self {
            fields: fields.clone(),
            localities,
            parcels,
            skipped,
        }
    }

    pub fn fields(&self) -> &FieldNames {
        &self.fields
    }

    /// Recherche une localité (le nom est normalisé)
    pub fn locality(&self, name: &str) -> Option<&LocalityEntry> {
        self.localities.get(&address::normalize(name))
    }

    /// Parcelles d'une localité (vide si inconnue)
    pub fn features_of(&self, name: &str) -> &[Arc<Feature>] {
        self.locality(name).map(LocalityEntry::features).unwrap_or(&[])
    }

    pub fn parcel(&self, key: &PlotKey) -> Option<&ParcelEntry> {
        self.parcels.get(key)
    }

    pub fn localities(&self) -> impl Iterator<Item = &LocalityEntry> {
        self.localities.values()
    }

    pub fn locality_count(&self) -> usize {
        self.localities.len()
    }

    pub fn parcel_count(&self) -> usize {
        self.parcels.len()
    }

    /// Features ignorées faute de localité
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Localités triées par nom d'affichage
    pub fn catalogue(&self) -> Vec<&LocalityEntry> {
        let mut entries: Vec<&LocalityEntry> = self.localities.values().collect();
        entries.sort_by(|a, b| {
            a.name
                .to_lowercase()
                .cmp(&b.name.to_lowercase())
                .then_with(|| a.name.cmp(&b.name))
        });
        entries
    }

    /// Filtre du catalogue (sous-chaîne, insensible à la casse)
    pub fn search(&self, query: &str) -> Vec<&LocalityEntry> {
        let query = address::normalize(query);
        self.catalogue()
            .into_iter()
            .filter(|e| query.is_empty() || e.name.to_lowercase().contains(&query))
            .collect()
    }

    /// Un repère par localité, au centre de son emprise
    pub fn pins(&self) -> Vec<LocalityPin> {
        self.catalogue()
            .into_iter()
            .filter(|e| e.bounding_box.is_valid())
            .map(|e| LocalityPin {
                name: e.name.clone(),
                position: e.bounding_box.center(),
                count: e.count,
            })
            .collect()
    }
}
