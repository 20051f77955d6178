//! Enveloppe concave par triangulation filtrée.
//!
//! Les points sont triangulés (Delaunay, via `spade`), les triangles ayant une
//! arête plus longue que `max_edge_km` (distance haversine) sont écartés, puis
//! le bord de l'union des triangles restants est reconstruit en anneaux.

use std::collections::{HashMap, HashSet};

use geo::{
    Contains, Coord, HaversineDistance, InteriorPoint, LineString, MultiPolygon, Point, Polygon,
    TriangulateSpade, Winding,
};

use crate::PlotError;

type Triangle = [usize; 3];

/// Calcule l'enveloppe concave d'un nuage de points lon/lat.
///
/// Retourne un polygone par composante connexe ; les trous éventuels
/// deviennent des anneaux intérieurs.
pub fn concave_hull(points: &[Coord], max_edge_km: f64) -> Result<MultiPolygon, PlotError> {
    let points = dedup_points(points);
    if points.len() < 3 {
        return Err(PlotError::empty_point_set("concave hull", points.len()));
    }

    let max_edge_m = max_edge_km * 1000.0;
    let kept: Vec<Triangle> = triangulate(&points)?
        .into_iter()
        .filter(|t| {
            let [a, b, c] = t.map(|i| Point::from(points[i]));
            a.haversine_distance(&b) <= max_edge_m
                && b.haversine_distance(&c) <= max_edge_m
                && c.haversine_distance(&a) <= max_edge_m
        })
        .collect();

    if kept.is_empty() {
        return Err(PlotError::ConcaveHull(format!(
            "no triangle with edges under {} km",
            max_edge_km
        )));
    }

    let rings = boundary_rings(&points, &kept);
    let polygons = assemble(rings);
    if polygons.is_empty() {
        return Err(PlotError::ConcaveHull("no closed boundary ring".into()));
    }

    Ok(MultiPolygon::new(polygons))
}

/// Supprime les doublons exacts (sommets partagés par des parcelles voisines)
fn dedup_points(points: &[Coord]) -> Vec<Coord> {
    let mut seen = HashSet::with_capacity(points.len());
    points
        .iter()
        .filter(|c| c.x.is_finite() && c.y.is_finite())
        .filter(|c| seen.insert((c.x.to_bits(), c.y.to_bits())))
        .copied()
        .collect()
}

/// Triangles de Delaunay en indices de `points`, orientés CCW.
///
/// `MultiPoint` n'implémente pas `TriangulateSpade` ; la triangulation non
/// contrainte d'une `LineString` n'utilise que ses sommets.
fn triangulate(points: &[Coord]) -> Result<Vec<Triangle>, PlotError> {
    let position: HashMap<(u64, u64), usize> = points
        .iter()
        .enumerate()
        .map(|(i, c)| ((c.x.to_bits(), c.y.to_bits()), i))
        .collect();
    let index_of = |c: Coord| position.get(&(c.x.to_bits(), c.y.to_bits())).copied();

    let triangles = LineString::from(points.to_vec())
        .unconstrained_triangulation()
        .map_err(|e| PlotError::ConcaveHull(format!("triangulation failed: {}", e)))?;

    Ok(triangles
        .into_iter()
        .filter_map(|t| {
            let [a, b, c] = t.to_array();
            let (ia, ib, ic) = (index_of(a)?, index_of(b)?, index_of(c)?);
            let cross = (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x);
            if cross > 0.0 {
                Some([ia, ib, ic])
            } else if cross < 0.0 {
                Some([ia, ic, ib])
            } else {
                None
            }
        })
        .collect())
}

/// Arêtes orientées présentes dans un seul triangle, chaînées en anneaux
fn boundary_rings(points: &[Coord], triangles: &[Triangle]) -> Vec<LineString> {
    let directed: HashSet<(usize, usize)> = triangles
        .iter()
        .flat_map(|&[a, b, c]| [(a, b), (b, c), (c, a)])
        .collect();

    let mut outgoing: HashMap<usize, Vec<usize>> = HashMap::new();
    for &(u, v) in &directed {
        if !directed.contains(&(v, u)) {
            outgoing.entry(u).or_default().push(v);
        }
    }

    let starts: Vec<usize> = outgoing.keys().copied().collect();
    let mut rings = Vec::new();
    for start in starts {
        while outgoing.get(&start).is_some_and(|targets| !targets.is_empty()) {
            let mut ring = vec![points[start]];
            let mut current = start;
            while let Some(next) = outgoing.get_mut(&current).and_then(Vec::pop) {
                ring.push(points[next]);
                current = next;
                if current == start {
                    break;
                }
            }

            if current == start && ring.len() >= 4 {
                rings.push(LineString::new(ring));
            }
        }
    }

    rings
}

/// Les anneaux CCW sont des extérieurs, les anneaux CW des trous
fn assemble(rings: Vec<LineString>) -> Vec<Polygon> {
    let (exteriors, holes): (Vec<LineString>, Vec<LineString>) =
        rings.into_iter().partition(|r| r.is_ccw());

    let mut polygons: Vec<Polygon> = exteriors
        .into_iter()
        .map(|ext| Polygon::new(ext, vec![]))
        .collect();

    for hole in holes.into_iter().filter(|r| r.is_cw()) {
        let Some(inside) = Polygon::new(hole.clone(), vec![]).interior_point() else {
            continue;
        };
        if let Some(poly) = polygons
            .iter_mut()
            .find(|poly| Polygon::new(poly.exterior().clone(), vec![]).contains(&inside))
        {
            poly.interiors_push(hole);
        }
    }

    polygons
}
