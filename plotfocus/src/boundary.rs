//! Résolution des contours de localité.
//!
//! Protocole : cache -> calcul en cours partagé -> chaîne de repli
//! (dissolve, enveloppe concave, enveloppe convexe). Au plus un calcul est
//! en vol par localité ; les demandeurs concurrents partagent le même
//! handle. Le cache et la table des calculs en cours sont vidés ensemble à
//! chaque rechargement de l'index.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::{BoxFuture, FutureExt, Shared};
use geo::{MultiPolygon, Polygon};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::geometry::{self, GeoOps, GeometryOps, DEFAULT_CONCAVE_MAX_EDGE_KM};
use crate::index::SpatialIndex;
use crate::types::{Feature, Outline, OutlineStrategy};
use crate::PlotError;

/// Résultat d'une résolution : `None` signifie "pas de contour disponible"
pub type Boundary = Option<Arc<Outline>>;

type PendingBoundary = Shared<BoxFuture<'static, Boundary>>;

/// Paramètres de la chaîne de repli
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoundarySettings {
    /// Longueur d'arête maximale de l'enveloppe concave (km)
    pub concave_max_edge_km: f64,
}

impl Default for BoundarySettings {
    fn default() -> Self {
        Self {
            concave_max_edge_km: DEFAULT_CONCAVE_MAX_EDGE_KM,
        }
    }
}

/// Jeton d'identité d'une demande de contour, strictement croissant
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestToken(u64);

impl RequestToken {
    pub fn value(&self) -> u64 {
        self.0
    }
}

struct ResolverState {
    generation: u64,
    index: Arc<SpatialIndex>,
    cache: HashMap<String, Boundary>,
    pending: HashMap<String, PendingBoundary>,
}

/// Résolveur de contours avec cache, déduplication et chaîne de repli
pub struct BoundaryResolver<G: GeometryOps + 'static = GeoOps> {
    ops: Arc<G>,
    settings: BoundarySettings,
    state: Arc<Mutex<ResolverState>>,
    next_token: AtomicU64,
    last_request: AtomicU64,
    computations: Arc<AtomicUsize>,
}

impl BoundaryResolver<GeoOps> {
    pub fn new(index: Arc<SpatialIndex>, settings: BoundarySettings) -> Self {
        Self::with_ops(index, settings, GeoOps)
    }
}

impl<G: GeometryOps + 'static> BoundaryResolver<G> {
    pub fn with_ops(index: Arc<SpatialIndex>, settings: BoundarySettings, ops: G) -> Self {
        Self {
            ops: Arc::new(ops),
            settings,
            state: Arc::new(Mutex::new(ResolverState {
                generation: 0,
                index,
                cache: HashMap::new(),
                pending: HashMap::new(),
            })),
            next_token: AtomicU64::new(0),
            last_request: AtomicU64::new(0),
            computations: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Remplace l'index ; cache et calculs en cours sont oubliés.
    ///
    /// Un calcul lancé sur l'ancien index se termine mais n'écrit plus rien.
    pub fn reload(&self, index: Arc<SpatialIndex>) {
        let mut state = lock(&self.state);
        state.generation += 1;
        state.index = index;
        state.cache.clear();
        state.pending.clear();
        debug!(generation = state.generation, "Boundary cache cleared");
    }

    pub fn ops(&self) -> &G {
        &self.ops
    }

    /// Nombre d'exécutions de la chaîne de repli depuis la création
    pub fn computations(&self) -> usize {
        self.computations.load(Ordering::SeqCst)
    }

    /// Contour déjà résolu pour ce nom exact (`Some(None)` = aucun contour)
    pub fn cached(&self, name: &str) -> Option<Boundary> {
        lock(&self.state).cache.get(name).cloned()
    }

    /// Enregistre une nouvelle demande et en fait la demande courante
    pub fn stamp(&self) -> RequestToken {
        let token = self.next_token.fetch_add(1, Ordering::SeqCst) + 1;
        self.last_request.store(token, Ordering::SeqCst);
        RequestToken(token)
    }

    /// Vrai tant qu'aucune demande plus récente n'a été enregistrée
    pub fn is_current(&self, token: RequestToken) -> bool {
        self.last_request.load(Ordering::SeqCst) == token.0
    }

    /// Aperçu immédiat : enveloppe convexe des parcelles, sans cache
    pub fn preview(&self, name: &str) -> Option<Outline> {
        let index = Arc::clone(&lock(&self.state).index);
        let features = index.features_of(name);
        if features.is_empty() {
            return None;
        }

        let points = geometry::exterior_points(features.iter().map(Arc::as_ref));
        match self.ops.convex_hull(&points) {
            Ok(hull) => {
                let lines = self.ops.to_outline(&MultiPolygon::new(vec![hull]));
                (!lines.0.is_empty()).then(|| Outline::new(lines, OutlineStrategy::Preview))
            }
            Err(e) => {
                debug!(locality = %name, error = %e, "No preview hull");
                None
            }
        }
    }

    /// Résout le contour d'une localité (nom d'affichage, non normalisé)
    pub async fn resolve(&self, name: &str) -> Boundary {
        let pending = {
            let mut state = lock(&self.state);

            if let Some(hit) = state.cache.get(name) {
                debug!(locality = %name, "Boundary cache hit");
                return hit.clone();
            }

            match state.pending.get(name) {
                Some(pending) => {
                    debug!(locality = %name, "Joining in-flight boundary computation");
                    pending.clone()
                }
                None => {
                    let pending = self.spawn_computation(&state, name);
                    state.pending.insert(name.to_string(), pending.clone());
                    pending
                }
            }
        };

        pending.await
    }

    /// Lance la chaîne de repli hors de l'exécuteur async.
    ///
    /// La tâche écrit elle-même son résultat dans le cache, même si plus
    /// personne ne l'attend.
    fn spawn_computation(&self, state: &ResolverState, name: &str) -> PendingBoundary {
        let name = name.to_string();
        let generation = state.generation;
        let features: Vec<Arc<Feature>> = state.index.features_of(&name).to_vec();
        let ops = Arc::clone(&self.ops);
        let settings = self.settings;
        let shared_state = Arc::clone(&self.state);
        let computations = Arc::clone(&self.computations);

        let task = tokio::spawn(async move {
            let outcome = tokio::task::spawn_blocking({
                let name = name.clone();
                move || {
                    computations.fetch_add(1, Ordering::SeqCst);
                    run_chain(ops.as_ref(), &name, &features, &settings)
                }
            })
            .await;

            let mut state = lock(&shared_state);
            let boundary = match outcome {
                Ok(outline) => {
                    let boundary = outline.map(Arc::new);
                    if state.generation == generation {
                        state.cache.insert(name.clone(), boundary.clone());
                    }
                    boundary
                }
                Err(e) => {
                    warn!(locality = %name, error = %e, "Boundary computation aborted");
                    None
                }
            };
            if state.generation == generation {
                state.pending.remove(&name);
            }
            boundary
        });

        task.map(|joined| joined.unwrap_or(None)).boxed().shared()
    }
}

/// Chaîne de repli : dissolve, puis enveloppe concave, puis convexe
fn run_chain<G: GeometryOps + ?Sized>(
    ops: &G,
    name: &str,
    features: &[Arc<Feature>],
    settings: &BoundarySettings,
) -> Option<Outline> {
    if features.is_empty() {
        debug!(locality = %name, "No parcels for locality");
        return None;
    }

    let polygons: Vec<Polygon> = features
        .iter()
        .flat_map(|f| geometry::feature_polygons(f))
        .collect();

    match ops.dissolve(&polygons).and_then(single_part) {
        Ok(merged) => {
            let lines = ops.to_outline(&merged);
            if !lines.0.is_empty() {
                return Some(Outline::new(lines, OutlineStrategy::Dissolve));
            }
        }
        Err(e) => debug!(locality = %name, error = %e, "Dissolve unavailable, trying concave hull"),
    }

    let points = geometry::exterior_points(features.iter().map(Arc::as_ref));

    match ops.concave_hull(&points, settings.concave_max_edge_km) {
        Ok(hull) => {
            let lines = ops.to_outline(&hull);
            if !lines.0.is_empty() {
                return Some(Outline::new(lines, OutlineStrategy::ConcaveHull));
            }
        }
        Err(e) => debug!(locality = %name, error = %e, "Concave hull unavailable, using convex hull"),
    }

    match ops.convex_hull(&points) {
        Ok(hull) => {
            let lines = ops.to_outline(&MultiPolygon::new(vec![hull]));
            (!lines.0.is_empty()).then(|| Outline::new(lines, OutlineStrategy::ConvexHull))
        }
        Err(e) => {
            warn!(locality = %name, error = %e, "No boundary available");
            None
        }
    }
}

/// Un dissolve en plusieurs parties disjointes ne donne pas un anneau unique
fn single_part(merged: MultiPolygon) -> Result<MultiPolygon, PlotError> {
    match merged.0.len() {
        1 => Ok(merged),
        parts => Err(PlotError::MultipleParts { parts }),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
