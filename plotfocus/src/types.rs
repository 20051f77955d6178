//! Types de données pour le crate plotfocus

use std::collections::HashMap;
use std::fmt;

use geo::{BoundingRect, Coord, Geometry, MultiLineString, Rect};
use serde::{Deserialize, Serialize};

/// Une parcelle : géométrie (Polygon / MultiPolygon en lon/lat) et attributs plats
#[derive(Debug, Clone)]
pub struct Feature {
    /// Géométrie de la parcelle, absente si la source ne la fournit pas
    pub geometry: Option<Geometry>,

    /// Attributs de la parcelle (clé -> valeur texte)
    pub properties: HashMap<String, String>,
}

impl Feature {
    pub fn new(geometry: Option<Geometry>, properties: HashMap<String, String>) -> Self {
        Self {
            geometry,
            properties,
        }
    }

    /// Valeur d'un attribut, chaîne vide si absent
    pub fn property(&self, name: &str) -> &str {
        self.properties.get(name).map(String::as_str).unwrap_or("")
    }

    /// Emprise de la géométrie, `None` sans géométrie exploitable
    pub fn bounding_box(&self) -> Option<BoundingBox> {
        self.geometry.as_ref().and_then(BoundingBox::of_geometry)
    }
}

/// Noms des attributs utilisés par le moteur
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldNames {
    pub locality: String,
    pub block: String,
    pub plot: String,
    pub kind: String,
}

impl Default for FieldNames {
    fn default() -> Self {
        Self {
            locality: "Locality".into(),
            block: "Block".into(),
            plot: "Plot_No".into(),
            kind: "Type".into(),
        }
    }
}

/// Emprise rectangulaire en lon/lat.
///
/// Une emprise "non définie" (aucun point ajouté) est représentée par des
/// bornes infinies inversées et n'est jamais valide.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    min: Coord,
    max: Coord,
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl BoundingBox {
    pub const EMPTY: BoundingBox = BoundingBox {
        min: Coord {
            x: f64::INFINITY,
            y: f64::INFINITY,
        },
        max: Coord {
            x: f64::NEG_INFINITY,
            y: f64::NEG_INFINITY,
        },
    };

    /// Crée une emprise à partir de deux coins quelconques
    pub fn new(a: Coord, b: Coord) -> Self {
        Self {
            min: Coord {
                x: a.x.min(b.x),
                y: a.y.min(b.y),
            },
            max: Coord {
                x: a.x.max(b.x),
                y: a.y.max(b.y),
            },
        }
    }

    pub fn from_rect(rect: Rect) -> Self {
        Self::new(rect.min(), rect.max())
    }

    pub fn of_geometry(geometry: &Geometry) -> Option<Self> {
        geometry
            .bounding_rect()
            .map(Self::from_rect)
            .filter(Self::is_valid)
    }

    pub fn min(&self) -> Coord {
        self.min
    }

    pub fn max(&self) -> Coord {
        self.max
    }

    pub fn west(&self) -> f64 {
        self.min.x
    }

    pub fn south(&self) -> f64 {
        self.min.y
    }

    pub fn east(&self) -> f64 {
        self.max.x
    }

    pub fn north(&self) -> f64 {
        self.max.y
    }

    pub fn north_west(&self) -> Coord {
        Coord {
            x: self.min.x,
            y: self.max.y,
        }
    }

    pub fn south_east(&self) -> Coord {
        Coord {
            x: self.max.x,
            y: self.min.y,
        }
    }

    /// Bornes finies et ordonnées (une emprise ponctuelle est valide)
    pub fn is_valid(&self) -> bool {
        self.min.x.is_finite()
            && self.min.y.is_finite()
            && self.max.x.is_finite()
            && self.max.y.is_finite()
            && self.min.x <= self.max.x
            && self.min.y <= self.max.y
    }

    /// Étend l'emprise pour couvrir `other` (ignoré si `other` est invalide)
    pub fn extend(&mut self, other: &BoundingBox) {
        if !other.is_valid() {
            return;
        }
        self.min.x = self.min.x.min(other.min.x);
        self.min.y = self.min.y.min(other.min.y);
        self.max.x = self.max.x.max(other.max.x);
        self.max.y = self.max.y.max(other.max.y);
    }

    pub fn union(mut self, other: &BoundingBox) -> Self {
        self.extend(other);
        self
    }

    pub fn center(&self) -> Coord {
        Coord {
            x: (self.min.x + self.max.x) / 2.0,
            y: (self.min.y + self.max.y) / 2.0,
        }
    }

    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }

    /// Vrai si `other` est entièrement contenue (bords inclus)
    pub fn contains(&self, other: &BoundingBox) -> bool {
        self.is_valid()
            && other.is_valid()
            && other.min.x >= self.min.x
            && other.max.x <= self.max.x
            && other.min.y >= self.min.y
            && other.max.y <= self.max.y
    }

    /// Agrandit (ratio > 0) ou rétrécit (ratio < 0) chaque côté d'une
    /// fraction de la taille. Un rétrécissement au-delà du centre donne une
    /// emprise invalide.
    pub fn pad(&self, ratio: f64) -> BoundingBox {
        let dx = self.width().abs() * ratio;
        let dy = self.height().abs() * ratio;
        BoundingBox {
            min: Coord {
                x: self.min.x - dx,
                y: self.min.y - dy,
            },
            max: Coord {
                x: self.max.x + dx,
                y: self.max.y + dy,
            },
        }
    }

    pub fn to_rect(&self) -> Option<Rect> {
        self.is_valid().then(|| Rect::new(self.min, self.max))
    }
}

/// Stratégie ayant produit un contour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutlineStrategy {
    /// Fusion exacte des polygones
    Dissolve,
    /// Enveloppe concave (longueur d'arête bornée)
    ConcaveHull,
    /// Enveloppe convexe
    ConvexHull,
    /// Aperçu rapide (enveloppe convexe, hors cache)
    Preview,
    /// Contour d'une parcelle isolée
    Parcel,
}

impl fmt::Display for OutlineStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Dissolve => "dissolve",
            Self::ConcaveHull => "concave_hull",
            Self::ConvexHull => "convex_hull",
            Self::Preview => "preview",
            Self::Parcel => "parcel",
        };
        f.write_str(name)
    }
}

/// Contour linéaire (anneaux fermés) d'une zone, distinct d'un polygone plein
#[derive(Debug, Clone, PartialEq)]
pub struct Outline {
    pub lines: MultiLineString,
    pub strategy: OutlineStrategy,
}

impl Outline {
    pub fn new(lines: MultiLineString, strategy: OutlineStrategy) -> Self {
        Self { lines, strategy }
    }

    /// Nombre d'anneaux du contour
    pub fn ring_count(&self) -> usize {
        self.lines.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.0.iter().all(|ring| ring.0.is_empty())
    }

    pub fn bounding_box(&self) -> Option<BoundingBox> {
        self.lines
            .bounding_rect()
            .map(BoundingBox::from_rect)
            .filter(BoundingBox::is_valid)
    }

    /// Géométrie GeoJSON (LineString pour un anneau, MultiLineString sinon)
    pub fn to_geojson(&self) -> geojson::Geometry {
        match self.lines.0.as_slice() {
            [single] => geojson::Geometry::new(geojson::Value::from(single)),
            _ => geojson::Geometry::new(geojson::Value::from(&self.lines)),
        }
    }
}
