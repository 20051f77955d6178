//! Session cartographique : orchestre index, résolveur, caméra et affichage.
//!
//! Trois parcours utilisateur :
//! - sélection d'une localité (aperçu, focus et contour exact en parallèle) ;
//! - clic sur une parcelle (focus puis contour de la parcelle) ;
//! - ouverture d'un lien partagé (`decode_and_focus`).

use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

use geo::Coord;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::address::PlotKey;
use crate::boundary::BoundaryResolver;
use crate::camera::{CameraController, Viewport};
use crate::geometry::{self, GeoOps, GeometryOps};
use crate::index::{LocalityPin, ParcelEntry, SpatialIndex};
use crate::presentation::{OutlinePresenter, OutlineRenderer};
use crate::types::{Feature, FieldNames, Outline, OutlineStrategy};

/// Paramètres d'interaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Durée d'affichage d'un contour
    pub outline_ttl_ms: u64,

    /// Fenêtre pendant laquelle un nouveau clic sur une parcelle est ignoré
    pub plot_click_lock_ms: u64,

    /// Idem pour la liste des localités
    pub locality_click_lock_ms: u64,

    /// Les repères de localité sont masqués à partir de ce zoom
    pub pins_hide_at_zoom: f64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            outline_ttl_ms: 1600,
            plot_click_lock_ms: 600,
            locality_click_lock_ms: 500,
            pins_hide_at_zoom: 16.0,
        }
    }
}

impl SessionSettings {
    pub fn outline_ttl(&self) -> Duration {
        Duration::from_millis(self.outline_ttl_ms)
    }
}

/// Verrou anti double-clic, partagé par tous les parcours cliquables
#[derive(Debug, Default)]
pub struct ClickGuard {
    locked_until: Mutex<Option<Instant>>,
}

impl ClickGuard {
    /// Prend le verrou pour `window`, faux s'il est déjà tenu
    pub fn try_acquire(&self, window: Duration) -> bool {
        let mut locked_until = self
            .locked_until
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        match *locked_until {
            Some(until) if now < until => false,
            _ => {
                *locked_until = Some(now + window);
                true
            }
        }
    }
}

/// Contenu de la fiche d'une parcelle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlotSummary {
    pub key: PlotKey,
    pub plot: String,
    pub block: String,
    pub kind: String,
    pub locality: String,
    /// Point d'ancrage (centroïde, à défaut centre de l'emprise)
    #[serde(skip)]
    pub anchor: Coord,
}

impl PlotSummary {
    fn build<G: GeometryOps + ?Sized>(ops: &G, key: PlotKey, entry: &ParcelEntry, fields: &FieldNames) -> Self {
        let feature = &entry.feature;
        let value = |name: &str| -> String {
            match feature.property(name).trim() {
                "" => "-".to_string(),
                v => v.to_string(),
            }
        };

        let anchor = feature
            .geometry
            .as_ref()
            .and_then(|g| ops.centroid(g))
            .map(|p| p.0)
            .unwrap_or_else(|| entry.bounding_box.center());

        Self {
            key,
            plot: value(&fields.plot),
            block: value(&fields.block),
            kind: value(&fields.kind),
            locality: value(&fields.locality),
            anchor,
        }
    }

    /// Lignes affichées, dans l'ordre
    pub fn rows(&self) -> [(&'static str, &str); 4] {
        [
            ("Plot", &self.plot),
            ("Block", &self.block),
            ("Type", &self.kind),
            ("Locality", &self.locality),
        ]
    }
}

/// Résultat de la sélection d'une localité
#[derive(Debug, Clone)]
pub struct LocalitySelection {
    /// Vrai si la caméra a bougé puis s'est arrêtée
    pub moved: bool,
    /// Contour exact, `None` si indisponible ou périmé
    pub outline: Option<Arc<Outline>>,
}

/// Résultat du focus sur une parcelle
#[derive(Debug, Clone)]
pub struct PlotSelection {
    pub moved: bool,
    pub summary: PlotSummary,
}

/// Session : index courant et collaborateurs
pub struct FocusSession<V, R, G = GeoOps>
where
    V: Viewport + 'static,
    R: OutlineRenderer + 'static,
    G: GeometryOps + 'static,
{
    index: RwLock<Arc<SpatialIndex>>,
    resolver: BoundaryResolver<G>,
    camera: CameraController<V>,
    presenter: OutlinePresenter<R>,
    settings: SessionSettings,
    clicks: ClickGuard,
}

impl<V, R, G> FocusSession<V, R, G>
where
    V: Viewport + 'static,
    R: OutlineRenderer + 'static,
    G: GeometryOps + 'static,
{
    /// Assemble une session ; le résolveur doit partager l'index fourni
    pub fn new(
        index: Arc<SpatialIndex>,
        resolver: BoundaryResolver<G>,
        camera: CameraController<V>,
        presenter: OutlinePresenter<R>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            index: RwLock::new(index),
            resolver,
            camera,
            presenter,
            settings,
            clicks: ClickGuard::default(),
        }
    }

    pub fn index(&self) -> Arc<SpatialIndex> {
        Arc::clone(&self.index.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn resolver(&self) -> &BoundaryResolver<G> {
        &self.resolver
    }

    pub fn camera(&self) -> &CameraController<V> {
        &self.camera
    }

    pub fn presenter(&self) -> &OutlinePresenter<R> {
        &self.presenter
    }

    /// Remplace le jeu de données ; cache de contours et contour affiché
    /// sont oubliés en même temps.
    pub fn load(&self, index: Arc<SpatialIndex>) {
        info!(
            localities = index.locality_count(),
            parcels = index.parcel_count(),
            "Dataset loaded"
        );
        *self.index.write().unwrap_or_else(PoisonError::into_inner) = Arc::clone(&index);
        self.resolver.reload(index);
        self.presenter.clear();
    }

    /// Affiche l'aperçu puis, si la demande est toujours la dernière, le
    /// contour exact.
    pub async fn outline_locality(&self, name: &str) -> Option<Arc<Outline>> {
        let token = self.resolver.stamp();
        let ttl = self.settings.outline_ttl();

        if let Some(preview) = self.resolver.preview(name) {
            self.presenter.present(Arc::new(preview), ttl);
        }

        let exact = self.resolver.resolve(name).await?;
        if !self.resolver.is_current(token) {
            debug!(locality = %name, token = token.value(), "Stale boundary discarded");
            return None;
        }
        self.presenter.present(Arc::clone(&exact), ttl);
        Some(exact)
    }

    /// Sélection d'une localité dans la liste.
    ///
    /// `None` si le clic est ignoré (verrou anti double-clic).
    pub async fn select_locality(&self, name: &str) -> Option<LocalitySelection> {
        let lock = Duration::from_millis(self.settings.locality_click_lock_ms);
        if !self.clicks.try_acquire(lock) {
            debug!(locality = %name, "Locality click ignored");
            return None;
        }

        let target = self
            .index()
            .locality(name)
            .map(|entry| entry.bounding_box)
            .filter(|bbox| bbox.is_valid());

        let Some(target) = target else {
            let outline = self.outline_locality(name).await;
            return Some(LocalitySelection {
                moved: false,
                outline,
            });
        };

        let (_, moved) = tokio::join!(self.outline_locality(name), self.camera.focus(&target));

        // Une fois la caméra arrêtée le contour est rejoué (depuis le cache)
        let outline = self.outline_locality(name).await;
        Some(LocalitySelection { moved, outline })
    }

    /// Clic sur une parcelle : focus, contour de la parcelle, fiche.
    ///
    /// `None` si le clic est ignoré ou la parcelle inconnue.
    pub async fn select_plot(&self, key: &PlotKey) -> Option<PlotSelection> {
        let lock = Duration::from_millis(self.settings.plot_click_lock_ms);
        if !self.clicks.try_acquire(lock) {
            debug!(key = %key, "Plot click ignored");
            return None;
        }
        self.focus_plot(key).await
    }

    /// Ouverture d'un lien partagé ; une clé inconnue ne fait rien
    pub async fn decode_and_focus(&self, raw_key: &str) -> Option<PlotSelection> {
        let key = match PlotKey::parse(raw_key) {
            Ok(key) => key,
            Err(e) => {
                debug!(error = %e, "Ignoring shared link");
                return None;
            }
        };
        self.focus_plot(&key).await
    }

    /// Fiche d'une parcelle, sans mouvement ni affichage
    pub fn summary(&self, key: &PlotKey) -> Option<PlotSummary> {
        let index = self.index();
        let entry = index.parcel(key)?;
        Some(PlotSummary::build(
            self.resolver.ops(),
            key.clone(),
            entry,
            index.fields(),
        ))
    }

    /// Repères de localité visibles au zoom courant
    pub fn visible_pins(&self) -> Vec<LocalityPin> {
        let zoom = self.camera.with_viewport(|v| v.zoom());
        if zoom >= self.settings.pins_hide_at_zoom {
            return Vec::new();
        }
        self.index().pins()
    }

    async fn focus_plot(&self, key: &PlotKey) -> Option<PlotSelection> {
        let index = self.index();
        let Some(entry) = index.parcel(key) else {
            debug!(key = %key, "Unknown plot key");
            return None;
        };

        let moved = self.camera.focus(&entry.bounding_box).await;
        self.present_parcel(&entry.feature);

        let summary = PlotSummary::build(self.resolver.ops(), key.clone(), entry, index.fields());
        Some(PlotSelection { moved, summary })
    }

    fn present_parcel(&self, feature: &Feature) {
        let lines = feature.geometry.as_ref().and_then(geometry::geometry_outline);
        match lines {
            Some(lines) => {
                let outline = Arc::new(Outline::new(lines, OutlineStrategy::Parcel));
                self.presenter.present(outline, self.settings.outline_ttl());
            }
            None => debug!("Parcel has no polygon outline"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::BoundarySettings;
    use crate::camera::{CameraSettings, HeadlessViewport, ViewportCommand};
    use crate::presentation::{MemoryRenderer, OutlineStyle, PaneSpec};
    use geo::{polygon, Geometry, Polygon};

    fn square(x: f64, y: f64, size: f64) -> Polygon {
        polygon![
            (x: x, y: y),
            (x: x + size, y: y),
            (x: x + size, y: y + size),
            (x: x, y: y + size),
            (x: x, y: y),
        ]
    }

    fn parcel(locality: &str, block: &str, plot: &str, poly: Polygon) -> Feature {
        let properties = [
            ("Locality", locality),
            ("Block", block),
            ("Plot_No", plot),
            ("Type", "Residential"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        Feature::new(Some(Geometry::Polygon(poly)), properties)
    }

    fn session(settings: SessionSettings) -> FocusSession<HeadlessViewport, MemoryRenderer> {
        let d = 0.001;
        let index = Arc::new(SpatialIndex::build(
            vec![
                parcel("Alpha", "B1", "12", square(73.0, 33.6, d)),
                parcel("Alpha", "B1", "13", square(73.0 + d, 33.6, d)),
                parcel("Beta", "", "", square(73.2, 33.8, d)),
            ],
            &FieldNames::default(),
        ));
        let viewport = HeadlessViewport::new(Coord { x: 74.3, y: 31.5 }, 10.0, 800.0, 600.0);
        FocusSession::new(
            Arc::clone(&index),
            BoundaryResolver::new(index, BoundarySettings::default()),
            CameraController::new(viewport, CameraSettings::default()),
            OutlinePresenter::new(MemoryRenderer::new(), OutlineStyle::default(), PaneSpec::default()),
            settings,
        )
    }

    #[test]
    fn test_click_guard_window() {
        let guard = ClickGuard::default();
        assert!(guard.try_acquire(Duration::from_secs(60)));
        assert!(!guard.try_acquire(Duration::from_secs(60)));

        let open = ClickGuard::default();
        assert!(open.try_acquire(Duration::ZERO));
        assert!(open.try_acquire(Duration::ZERO));
    }

    #[tokio::test]
    async fn test_decode_and_focus_single_focus() {
        let session = session(SessionSettings::default());
        let selection = session.decode_and_focus("alpha__b1__12").await.unwrap();

        assert!(selection.moved);
        assert_eq!(selection.summary.plot, "12");
        assert_eq!(selection.summary.locality, "Alpha");

        let expected = square(73.0, 33.6, 0.001);
        session.camera().with_viewport(|v| {
            assert_eq!(v.history().len(), 1);
            match &v.history()[0] {
                ViewportCommand::FitBounds { target, .. } => {
                    assert_eq!(target.min(), Coord { x: 73.0, y: 33.6 });
                    assert_eq!(target.max(), expected.exterior().0[2]);
                }
                other => panic!("unexpected command {:?}", other),
            }
        });
        assert_eq!(
            session.presenter().current_strategy(),
            Some(OutlineStrategy::Parcel)
        );
    }

    #[tokio::test]
    async fn test_unknown_key_is_noop() {
        let session = session(SessionSettings::default());
        assert!(session.decode_and_focus("gamma__x__1").await.is_none());
        assert!(session.decode_and_focus("  ").await.is_none());
        assert!(session.camera().with_viewport(|v| v.history().is_empty()));
        assert!(session.presenter().current().is_none());
    }

    #[tokio::test]
    async fn test_select_locality_presents_exact_outline() {
        let session = session(SessionSettings::default());
        let selection = session.select_locality("Alpha").await.unwrap();

        assert!(selection.moved);
        let outline = selection.outline.unwrap();
        assert_eq!(outline.strategy, OutlineStrategy::Dissolve);
        assert_eq!(session.resolver().computations(), 1);

        // Le contour rejoué après le mouvement est le même objet
        let current = session.presenter().current().unwrap();
        assert!(Arc::ptr_eq(&current, &outline));
        session.presenter().with_renderer(|r| assert_eq!(r.layers().len(), 1));
    }

    #[tokio::test]
    async fn test_repeated_click_ignored() {
        let session = session(SessionSettings::default());
        assert!(session.select_locality("Alpha").await.is_some());
        assert!(session.select_locality("Alpha").await.is_none());

        let key = PlotKey::parse("alpha__b1__12").unwrap();
        assert!(session.select_plot(&key).await.is_none());
    }

    #[tokio::test]
    async fn test_stale_outline_discarded() {
        let session = session(SessionSettings::default());
        let (first, second) = tokio::join!(
            session.outline_locality("Alpha"),
            session.outline_locality("Beta")
        );
        assert!(first.is_none());
        assert!(second.is_some());
    }

    #[tokio::test]
    async fn test_summary_defaults_and_anchor() {
        let session = session(SessionSettings::default());
        let key = PlotKey::parse("beta____").unwrap();
        let summary = session.summary(&key).unwrap();

        assert_eq!(summary.block, "-");
        assert_eq!(summary.plot, "-");
        assert_eq!(summary.kind, "Residential");
        assert!((summary.anchor.x - 73.2005).abs() < 1e-9);
        assert_eq!(summary.rows()[3], ("Locality", "Beta"));
    }

    #[tokio::test]
    async fn test_reload_clears_state() {
        let session = session(SessionSettings::default());
        session.outline_locality("Alpha").await;
        assert!(session.presenter().current().is_some());

        session.load(Arc::new(SpatialIndex::default()));
        assert!(session.presenter().current().is_none());
        assert!(session.resolver().cached("Alpha").is_none());
        assert!(session.decode_and_focus("alpha__b1__12").await.is_none());
    }

    #[test]
    fn test_pins_hidden_when_zoomed_in() {
        let session = session(SessionSettings::default());
        assert_eq!(session.visible_pins().len(), 2);

        session
            .camera()
            .with_viewport(|v| v.jump_to(Coord { x: 73.0, y: 33.6 }, 17.0));
        assert!(session.visible_pins().is_empty());
    }
}
