//! Fusion (dissolve) de polygones par unions successives

use std::panic::{self, AssertUnwindSafe};

use geo::{BooleanOps, MultiPolygon, Polygon};
use rayon::prelude::*;

use crate::PlotError;

/// Fusionne des polygones en un (multi)polygone.
///
/// Les unions sont réduites en arbre (rayon) plutôt qu'en chaîne. Les
/// opérations booléennes de `geo` peuvent paniquer sur des entrées
/// dégénérées : la panique est convertie en [`PlotError::Dissolve`].
pub fn dissolve(polygons: &[Polygon]) -> Result<MultiPolygon, PlotError> {
    if polygons.is_empty() {
        return Err(PlotError::Dissolve("no polygon to dissolve".into()));
    }

    for (idx, polygon) in polygons.iter().enumerate() {
        validate(polygon).map_err(|reason| {
            PlotError::Dissolve(format!("polygon #{}: {}", idx, reason))
        })?;
    }

    let merged = panic::catch_unwind(AssertUnwindSafe(|| {
        polygons
            .par_iter()
            .map(|p| MultiPolygon::new(vec![p.clone()]))
            .reduce(|| MultiPolygon::new(vec![]), |a, b| union(&a, &b))
    }))
    .map_err(|_| PlotError::Dissolve("boolean union panicked".into()))?;

    if merged.0.is_empty() {
        return Err(PlotError::Dissolve("union is empty".into()));
    }

    Ok(merged)
}

fn union(a: &MultiPolygon, b: &MultiPolygon) -> MultiPolygon {
    match (a.0.is_empty(), b.0.is_empty()) {
        (true, _) => b.clone(),
        (_, true) => a.clone(),
        _ => a.union(b),
    }
}

fn validate(polygon: &Polygon) -> Result<(), &'static str> {
    let exterior = polygon.exterior();
    if exterior.0.len() < 4 {
        return Err("exterior ring has fewer than 4 coordinates");
    }
    let all_finite = std::iter::once(exterior)
        .chain(polygon.interiors())
        .flat_map(|ring| ring.0.iter())
        .all(|c| c.x.is_finite() && c.y.is_finite());
    if !all_finite {
        return Err("non-finite coordinate");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use geo::{polygon, Area};

    fn square(x: f64, y: f64) -> Polygon {
        polygon![
            (x: x, y: y),
            (x: x + 1.0, y: y),
            (x: x + 1.0, y: y + 1.0),
            (x: x, y: y + 1.0),
            (x: x, y: y),
        ]
    }

    #[test]
    fn test_dissolve_adjacent_squares() {
        let merged = dissolve(&[square(0.0, 0.0), square(1.0, 0.0), square(2.0, 0.0)]).unwrap();
        assert_eq!(merged.0.len(), 1);
        assert_relative_eq!(merged.unsigned_area(), 3.0, epsilon = 1e-9);
    }

    #[test]
    fn test_dissolve_disjoint_keeps_parts() {
        let merged = dissolve(&[square(0.0, 0.0), square(5.0, 5.0)]).unwrap();
        assert_eq!(merged.0.len(), 2);
    }

    #[test]
    fn test_dissolve_empty_input() {
        assert!(matches!(dissolve(&[]), Err(PlotError::Dissolve(_))));
    }

    #[test]
    fn test_dissolve_rejects_non_finite() {
        let bad = polygon![
            (x: 0.0, y: 0.0),
            (x: f64::NAN, y: 0.0),
            (x: 1.0, y: 1.0),
            (x: 0.0, y: 0.0),
        ];
        assert!(dissolve(&[square(0.0, 0.0), bad]).is_err());
    }
}
