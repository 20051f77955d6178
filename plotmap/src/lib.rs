//! # plotmap
//!
//! Consultation d'un parcellaire GeoJSON par localité, au-dessus du moteur
//! `plotfocus`.
//!
//! ## Features
//!
//! - Chargement GeoJSON avec empreinte blake3 du fichier
//! - Configuration JSON (presets embarqués ou fichier) et `.env`
//! - Liens partagés portant la clé de parcelle
//! - Export des contours de localité en GeoJSON, avec rapport
//!
//! ## Usage CLI
//!
//! ```bash
//! # Localités du jeu de données
//! plotmap localities --data ./plots.geojson --search kohistan
//!
//! # Contour d'une localité
//! plotmap outline "Kohistan Enclave" --data ./plots.geojson
//!
//! # Ouvrir un lien partagé
//! plotmap focus "https://example.org/map?plot=alpha__b1__12"
//!
//! # Export de tous les contours
//! plotmap export-outlines --output ./outlines.geojson --report ./report.json
//! ```

pub mod config;
pub mod export;
pub mod loader;
pub mod report;
pub mod share;

pub use config::Config;
pub use export::{export_outlines, LocalityOutline};
pub use loader::{load_dataset, parse_dataset, Dataset};
pub use report::{OutlineReport, OutlineStatus};
pub use share::{plot_key_from_url, share_url};
