//! Configuration de la carte

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use geo::Coord;
use serde::{Deserialize, Serialize};

use plotfocus::{BoundarySettings, CameraSettings, FieldNames, OutlineStyle, PaneSpec, SessionSettings};

/// Variable d'environnement : jeu de données par défaut
pub const ENV_DATA: &str = "PLOTMAP_DATA";

/// Variable d'environnement : base des liens partagés
pub const ENV_BASE_URL: &str = "PLOTMAP_BASE_URL";

/// Configuration principale
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Noms des attributs des parcelles
    pub fields: FieldNames,

    /// Seuils et durées du focus caméra
    pub camera: CameraSettings,

    /// Affichage des contours
    pub outline: OutlineConfig,

    /// Chaîne de repli des contours de localité
    pub boundary: BoundarySettings,

    /// Repères de localité
    pub pins: PinsConfig,

    /// Verrous anti double-clic
    pub interaction: InteractionConfig,

    /// Viewport sans rendu utilisé par la ligne de commande
    pub viewport: ViewportConfig,

    /// Liens partagés
    pub share: ShareConfig,
}

/// Affichage des contours
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct OutlineConfig {
    /// Durée d'affichage (ms)
    pub ttl_ms: u64,
    pub pane: PaneSpec,
    pub style: OutlineStyle,
}

impl Default for OutlineConfig {
    fn default() -> Self {
        Self {
            ttl_ms: 1600,
            pane: PaneSpec::default(),
            style: OutlineStyle::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PinsConfig {
    /// Les repères disparaissent à partir de ce zoom
    pub hide_at_zoom: f64,
}

impl Default for PinsConfig {
    fn default() -> Self {
        Self { hide_at_zoom: 16.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct InteractionConfig {
    pub plot_click_lock_ms: u64,
    pub locality_click_lock_ms: u64,
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self {
            plot_click_lock_ms: 600,
            locality_click_lock_ms: 500,
        }
    }
}

/// Vue initiale du viewport sans rendu
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ViewportConfig {
    /// Centre initial `[lon, lat]`
    pub center: [f64; 2],
    pub zoom: f64,
    pub width: f64,
    pub height: f64,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            center: [73.0479, 33.6844],
            zoom: 11.0,
            width: 1280.0,
            height: 800.0,
        }
    }
}

impl ViewportConfig {
    pub fn center(&self) -> Coord {
        Coord {
            x: self.center[0],
            y: self.center[1],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ShareConfig {
    /// Base des liens (surchargée par `PLOTMAP_BASE_URL`)
    pub base_url: String,

    /// Paramètre de requête portant la clé de parcelle
    pub param: String,
}

impl Default for ShareConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5173/map".into(),
            param: "plot".into(),
        }
    }
}

impl Config {
    /// Charge une configuration depuis un fichier
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path.display()))?;

        serde_json::from_str(&content).context("Failed to parse config JSON")
    }

    /// Charge une configuration depuis un preset embarqué
    pub fn from_preset(preset: &str) -> Result<Self> {
        match preset {
            "default" => Self::load_embedded(include_str!("presets/default.json")),
            "dense" => Self::load_embedded(include_str!("presets/dense.json")),
            _ => anyhow::bail!("Unknown preset: {}. Use: default, dense", preset),
        }
    }

    /// Preset embarqué ou chemin vers un fichier JSON
    pub fn resolve(spec: &str) -> Result<Self> {
        let path = Path::new(spec);
        if path.extension().map_or(false, |ext| ext == "json") || path.exists() {
            Self::load(path)
        } else {
            Self::from_preset(spec)
        }
    }

    fn load_embedded(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse embedded config")
    }

    /// Applique les variables d'environnement
    pub fn with_env(mut self) -> Self {
        if let Ok(base) = std::env::var(ENV_BASE_URL) {
            if !base.trim().is_empty() {
                self.share.base_url = base.trim().to_string();
            }
        }
        self
    }

    /// Paramètres de session dérivés des sections `outline`, `pins` et
    /// `interaction`
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            outline_ttl_ms: self.outline.ttl_ms,
            plot_click_lock_ms: self.interaction.plot_click_lock_ms,
            locality_click_lock_ms: self.interaction.locality_click_lock_ms,
            pins_hide_at_zoom: self.pins.hide_at_zoom,
        }
    }
}

/// Chemin du jeu de données : argument explicite, sinon `PLOTMAP_DATA`
pub fn data_path(explicit: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path);
    }
    match std::env::var(ENV_DATA) {
        Ok(value) if !value.trim().is_empty() => Ok(PathBuf::from(value.trim())),
        _ => anyhow::bail!("No dataset given: pass --data or set {}", ENV_DATA),
    }
}
