//! Enveloppe convexe, dernier recours de la chaîne de contours

use geo::{Area, BoundingRect, ConvexHull, Coord, MultiPoint, Point, Polygon};

use crate::PlotError;

/// Aire minimale de l'enveloppe, en fraction du carré de l'étendue
const COLLINEAR_TOLERANCE: f64 = 1e-9;

/// Calcule l'enveloppe convexe d'un nuage de points.
///
/// Échoue avec moins de 3 points ou si tous les points sont alignés. Le
/// seuil d'alignement est relatif à l'étendue du nuage.
pub fn convex_hull(points: &[Coord]) -> Result<Polygon, PlotError> {
    if points.len() < 3 {
        return Err(PlotError::empty_point_set("convex hull", points.len()));
    }

    let multi_point = MultiPoint::new(points.iter().map(|c| Point::from(*c)).collect());
    let hull = multi_point.convex_hull();

    let Some(rect) = multi_point.bounding_rect() else {
        return Err(PlotError::empty_point_set("convex hull", 0));
    };
    let span = rect.width().max(rect.height());
    // Bruit d'arrondi de l'aire, proportionnel à la magnitude des coordonnées
    let magnitude = [rect.min().x, rect.min().y, rect.max().x, rect.max().y]
        .into_iter()
        .fold(0.0_f64, |acc, v| acc.max(v.abs()));
    let threshold = span * (COLLINEAR_TOLERANCE * span + 16.0 * f64::EPSILON * magnitude);

    if span == 0.0 || hull.unsigned_area() <= threshold {
        return Err(PlotError::invalid_geometry(
            "convex hull",
            "all points are collinear",
        ));
    }

    Ok(hull)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convex_hull() {
        let points = vec![
            Coord { x: 0.0, y: 0.0 },
            Coord { x: 1.0, y: 0.0 },
            Coord { x: 0.5, y: 1.0 },
            Coord { x: 0.5, y: 0.3 },
        ];

        let hull = convex_hull(&points).unwrap();
        // 3 sommets + fermeture, le point intérieur est ignoré
        assert_eq!(hull.exterior().0.len(), 4);
    }

    #[test]
    fn test_convex_hull_too_few_points() {
        let points = vec![Coord { x: 0.0, y: 0.0 }, Coord { x: 1.0, y: 0.0 }];
        assert!(matches!(
            convex_hull(&points),
            Err(PlotError::EmptyPointSet { count: 2, .. })
        ));
    }

    #[test]
    fn test_convex_hull_collinear() {
        let points = vec![
            Coord { x: 0.0, y: 0.0 },
            Coord { x: 1.0, y: 1.0 },
            Coord { x: 2.0, y: 2.0 },
        ];
        assert!(convex_hull(&points).is_err());
    }

    #[test]
    fn test_convex_hull_collinear_lon_lat() {
        let points: Vec<Coord> = (0..5)
            .map(|i| Coord {
                x: 73.0 + 0.001 * i as f64,
                y: 33.6 + 0.001 * i as f64,
            })
            .collect();
        assert!(matches!(
            convex_hull(&points),
            Err(PlotError::InvalidGeometry { .. })
        ));
    }

    #[test]
    fn test_convex_hull_small_parcel_lon_lat() {
        // Parcelle de ~10 m : aire minuscule en degrés mais non dégénérée
        let points = vec![
            Coord { x: 73.0, y: 33.6 },
            Coord { x: 73.0001, y: 33.6 },
            Coord { x: 73.0001, y: 33.6001 },
            Coord { x: 73.0, y: 33.6001 },
        ];
        let hull = convex_hull(&points).unwrap();
        assert_eq!(hull.exterior().0.len(), 5);
    }

    #[test]
    fn test_convex_hull_single_repeated_point() {
        let points = vec![Coord { x: 73.0, y: 33.6 }; 4];
        assert!(convex_hull(&points).is_err());
    }
}
