//! Rapport de résolution des contours
//!
//! Collecte, pour un lot de localités, la stratégie qui a produit chaque
//! contour et les localités restées sans contour.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use serde::Serialize;

use plotfocus::OutlineStrategy;

/// Statut global du lot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OutlineStatus {
    /// Toutes les localités ont un contour exact
    Exact,
    /// Certaines localités ont un contour approché (enveloppe)
    Approximate,
    /// Au moins une localité n'a aucun contour
    Incomplete,
}

/// Localité sans contour
#[derive(Debug, Clone, Serialize)]
pub struct MissingOutline {
    pub locality: String,
    pub parcels: usize,
}

/// Rapport complet
#[derive(Debug, Clone, Serialize)]
pub struct OutlineReport {
    /// Version du jeu de données (empreinte blake3)
    pub dataset: String,
    pub duration_secs: f64,
    pub status: OutlineStatus,

    pub localities: usize,
    pub parcels: usize,

    /// Nombre de contours par stratégie
    pub by_strategy: BTreeMap<String, usize>,

    pub missing: Vec<MissingOutline>,
}

impl Default for OutlineReport {
    fn default() -> Self {
        Self {
            dataset: String::new(),
            duration_secs: 0.0,
            status: OutlineStatus::Exact,
            localities: 0,
            parcels: 0,
            by_strategy: BTreeMap::new(),
            missing: Vec::new(),
        }
    }
}

impl OutlineReport {
    pub fn new(dataset: &str) -> Self {
        Self {
            dataset: dataset.to_string(),
            ..Default::default()
        }
    }

    /// Enregistre un contour résolu
    pub fn record_outline(&mut self, strategy: OutlineStrategy, parcels: usize) {
        self.localities += 1;
        self.parcels += parcels;
        *self.by_strategy.entry(strategy.to_string()).or_default() += 1;
    }

    /// Enregistre une localité sans contour
    pub fn record_missing(&mut self, locality: &str, parcels: usize) {
        self.localities += 1;
        self.parcels += parcels;
        self.missing.push(MissingOutline {
            locality: locality.to_string(),
            parcels,
        });
    }

    pub fn set_duration(&mut self, duration: Duration) {
        self.duration_secs = duration.as_secs_f64();
    }

    pub fn count(&self, strategy: OutlineStrategy) -> usize {
        self.by_strategy
            .get(&strategy.to_string())
            .copied()
            .unwrap_or(0)
    }

    /// Détermine le statut final
    pub fn finalize(&mut self) {
        let approximate = self.count(OutlineStrategy::ConcaveHull) + self.count(OutlineStrategy::ConvexHull);
        self.status = if !self.missing.is_empty() {
            OutlineStatus::Incomplete
        } else if approximate > 0 {
            OutlineStatus::Approximate
        } else {
            OutlineStatus::Exact
        };
    }

    /// Affiche le rapport sur la console
    pub fn display(&self) {
        println!("\n{}", "=".repeat(60));
        println!("OUTLINE REPORT - Dataset {}", self.dataset);
        println!("{}", "=".repeat(60));

        println!("\nStatus: {:?}", self.status);
        println!("Duration: {:.2}s", self.duration_secs);

        println!("\n--- SUMMARY ---");
        println!(
            "Localities: {} ({} parcels), {} without outline",
            self.localities,
            self.parcels,
            self.missing.len()
        );

        if !self.by_strategy.is_empty() {
            println!("\n--- BY STRATEGY ---");
            for (strategy, count) in &self.by_strategy {
                println!("  {}: {}", strategy, count);
            }
        }

        if !self.missing.is_empty() {
            println!("\n--- MISSING ({}) ---", self.missing.len());
            for m in self.missing.iter().take(20) {
                println!("  {} ({} parcels)", m.locality, m.parcels);
            }
            if self.missing.len() > 20 {
                println!("  ... and {} more", self.missing.len() - 20);
            }
        }

        println!("\n{}", "=".repeat(60));
    }

    /// Sauvegarde le rapport en JSON
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Affichage compact pour le résumé
    pub fn summary(&self) -> String {
        format!(
            "{} localities: {} dissolve, {} concave, {} convex, {} missing",
            self.localities,
            self.count(OutlineStrategy::Dissolve),
            self.count(OutlineStrategy::ConcaveHull),
            self.count(OutlineStrategy::ConvexHull),
            self.missing.len()
        )
    }
}
