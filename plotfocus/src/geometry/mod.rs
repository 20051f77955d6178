//! Primitives géométriques : extraction de points, centroïde, enveloppes,
//! fusion et conversion polygone -> contour.
//!
//! Le résolveur de contours ne dépend que du trait [`GeometryOps`] ; toute
//! implémentation respectant ce contrat est substituable à [`GeoOps`].

pub mod concave;
pub mod convex;
pub mod dissolve;

use geo::{Centroid, Coord, Geometry, LineString, MultiLineString, MultiPolygon, Point, Polygon};

use crate::types::Feature;
use crate::PlotError;

/// Longueur d'arête maximale (km) de l'enveloppe concave
pub const DEFAULT_CONCAVE_MAX_EDGE_KM: f64 = 1.5;

/// Capacités géométriques nécessaires au résolveur de contours
pub trait GeometryOps: Send + Sync {
    /// Fusionne des polygones en un (multi)polygone
    fn dissolve(&self, polygons: &[Polygon]) -> Result<MultiPolygon, PlotError>;

    /// Enveloppe concave d'un nuage de points, arêtes bornées à `max_edge_km`
    fn concave_hull(&self, points: &[Coord], max_edge_km: f64) -> Result<MultiPolygon, PlotError>;

    /// Enveloppe convexe d'un nuage de points
    fn convex_hull(&self, points: &[Coord]) -> Result<Polygon, PlotError>;

    /// Convertit les anneaux extérieurs en contour linéaire
    fn to_outline(&self, polygons: &MultiPolygon) -> MultiLineString {
        polygons_to_outline(polygons)
    }

    fn centroid(&self, geometry: &Geometry) -> Option<Point> {
        geometry.centroid()
    }
}

/// Implémentation par défaut, basée sur le crate `geo`
#[derive(Debug, Clone, Copy, Default)]
pub struct GeoOps;

impl GeometryOps for GeoOps {
    fn dissolve(&self, polygons: &[Polygon]) -> Result<MultiPolygon, PlotError> {
        dissolve::dissolve(polygons)
    }

    fn concave_hull(&self, points: &[Coord], max_edge_km: f64) -> Result<MultiPolygon, PlotError> {
        concave::concave_hull(points, max_edge_km)
    }

    fn convex_hull(&self, points: &[Coord]) -> Result<Polygon, PlotError> {
        convex::convex_hull(points)
    }
}

/// Polygones d'une feature (vide pour les autres types de géométrie)
pub fn feature_polygons(feature: &Feature) -> Vec<Polygon> {
    match &feature.geometry {
        Some(Geometry::Polygon(p)) => vec![p.clone()],
        Some(Geometry::MultiPolygon(mp)) => mp.0.clone(),
        _ => Vec::new(),
    }
}

/// Sommets des anneaux extérieurs de toutes les features
pub fn exterior_points<'a, I>(features: I) -> Vec<Coord>
where
    I: IntoIterator<Item = &'a Feature>,
{
    let mut points = Vec::new();
    for feature in features {
        match &feature.geometry {
            Some(Geometry::Polygon(p)) => points.extend(p.exterior().0.iter().copied()),
            Some(Geometry::MultiPolygon(mp)) => {
                for p in &mp.0 {
                    points.extend(p.exterior().0.iter().copied());
                }
            }
            _ => {}
        }
    }
    points
}

/// Anneaux extérieurs d'un (multi)polygone en contour linéaire
pub fn polygons_to_outline(polygons: &MultiPolygon) -> MultiLineString {
    MultiLineString::new(
        polygons
            .0
            .iter()
            .map(|p| p.exterior().clone())
            .filter(|ring| ring.0.len() >= 4)
            .collect(),
    )
}

/// Contour d'une géométrie de parcelle (anneaux extérieurs et intérieurs)
pub fn geometry_outline(geometry: &Geometry) -> Option<MultiLineString> {
    let rings: Vec<LineString> = match geometry {
        Geometry::Polygon(p) => std::iter::once(p.exterior())
            .chain(p.interiors())
            .cloned()
            .collect(),
        Geometry::MultiPolygon(mp) => mp
            .0
            .iter()
            .flat_map(|p| std::iter::once(p.exterior()).chain(p.interiors()))
            .cloned()
            .collect(),
        _ => return None,
    };

    let rings: Vec<LineString> = rings.into_iter().filter(|r| r.0.len() >= 4).collect();
    if rings.is_empty() {
        None
    } else {
        Some(MultiLineString::new(rings))
    }
}
