//! Contrôleur de caméra : focus "intelligent" sans micro-saccades.
//!
//! Pour une emprise cible, le contrôleur choisit le mouvement minimal
//! (aucun, recentrage, zoom + recentrage, ajustement complet) en fonction de
//! l'état courant du viewport, annule le mouvement en cours et retourne un
//! futur résolu à `true` quand le viewport signale la fin du mouvement.

pub mod headless;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::{self, BoxFuture, FutureExt};
use geo::Coord;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, trace, warn};

use crate::types::BoundingBox;

pub use headless::{HeadlessViewport, ViewportCommand};

/// Options d'une transition de caméra
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Motion {
    pub duration: Duration,
    pub ease_linearity: Option<f64>,
    /// Marge en pixels de chaque côté (ajustement d'emprise uniquement)
    pub padding: f64,
}

/// Capacités attendues du moteur de rendu cartographique.
///
/// Les coordonnées géographiques sont en lon/lat (`x` = longitude), les
/// coordonnées projetées en pixels absolus au zoom demandé.
pub trait Viewport: Send {
    /// Faux tant que la carte n'est pas initialisée
    fn is_ready(&self) -> bool {
        true
    }

    fn center(&self) -> Coord;

    fn zoom(&self) -> f64;

    /// Emprise géographique visible
    fn bounds(&self) -> BoundingBox;

    /// Projette un point géographique en pixels au zoom donné
    fn project(&self, point: Coord, zoom: f64) -> Coord;

    fn fit_bounds(&mut self, target: &BoundingBox, motion: &Motion);

    fn pan_to(&mut self, center: Coord, motion: &Motion);

    fn fly_to(&mut self, center: Coord, zoom: f64, motion: &Motion);

    /// Interrompt la transition en cours, s'il y en a une
    fn stop(&mut self);

    /// Compteur incrémenté à chaque fin de mouvement
    fn motion_end(&self) -> watch::Receiver<u64>;
}

/// Seuils et durées du focus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraSettings {
    /// Marge (px) de chaque côté pour l'ajustement d'emprise
    pub padding_px: f64,

    /// Fraction retirée de chaque côté du viewport pour le test "déjà visible"
    pub inset: f64,

    pub noop_distance_px: f64,
    pub noop_zoom_delta: f64,
    pub pan_zoom_delta: f64,

    /// En deçà de cette distance (px) un recentrage est jugé inutile
    pub settle_distance_px: f64,

    pub pan_duration_s: f64,
    pub fly_duration_s: f64,
    pub fit_duration_s: f64,
    pub ease_linearity: f64,

    /// Tentatives quand le viewport n'est pas encore prêt
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,

    pub min_zoom: f64,
    pub max_zoom: f64,

    /// Pas de zoom (`None` = zoom continu)
    pub zoom_snap: Option<f64>,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            padding_px: 22.0,
            inset: 0.40,
            noop_distance_px: 10.0,
            noop_zoom_delta: 0.05,
            pan_zoom_delta: 0.15,
            settle_distance_px: 30.0,
            pan_duration_s: 0.3,
            fly_duration_s: 0.45,
            fit_duration_s: 0.55,
            ease_linearity: 0.25,
            retry_attempts: 5,
            retry_delay_ms: 100,
            min_zoom: 5.0,
            max_zoom: 18.0,
            zoom_snap: None,
        }
    }
}

impl CameraSettings {
    fn pan_motion(&self) -> Motion {
        Motion {
            duration: Duration::from_secs_f64(self.pan_duration_s),
            ease_linearity: None,
            padding: 0.0,
        }
    }

    fn fly_motion(&self) -> Motion {
        Motion {
            duration: Duration::from_secs_f64(self.fly_duration_s),
            ease_linearity: Some(self.ease_linearity),
            padding: 0.0,
        }
    }

    fn fit_motion(&self) -> Motion {
        Motion {
            duration: Duration::from_secs_f64(self.fit_duration_s),
            ease_linearity: Some(self.ease_linearity),
            padding: self.padding_px,
        }
    }

    /// Applique le pas de zoom puis les bornes
    pub fn constrain_zoom(&self, zoom: f64) -> f64 {
        let zoom = match self.zoom_snap {
            Some(snap) if snap > 0.0 && zoom.is_finite() => (zoom / snap).floor() * snap,
            _ => zoom,
        };
        zoom.clamp(self.min_zoom, self.max_zoom)
    }
}

/// Mesures d'une cible par rapport au viewport courant
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FocusMetrics {
    pub current_zoom: f64,
    pub target_zoom: f64,
    pub distance_px: f64,
    pub zoom_delta: f64,
    pub already_inside: bool,
}

/// Mouvement retenu pour une cible
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FocusDecision {
    /// Emprise non définie ou dégénérée
    Invalid,
    /// Cible déjà centrée au bon zoom
    NoOp,
    /// Écart trop faible pour justifier un recentrage
    Settled,
    Pan { center: Coord },
    FlyTo { center: Coord, zoom: f64 },
    FitBounds { target: BoundingBox },
}

impl FocusDecision {
    /// Vrai si la décision déclenche une transition
    pub fn moves(&self) -> bool {
        matches!(
            self,
            Self::Pan { .. } | Self::FlyTo { .. } | Self::FitBounds { .. }
        )
    }
}

/// Zoom auquel `target` tient dans le viewport avec la marge configurée
pub fn fit_zoom<V: Viewport + ?Sized>(
    viewport: &V,
    target: &BoundingBox,
    settings: &CameraSettings,
) -> f64 {
    let zoom = viewport.zoom();
    let view = viewport.bounds();

    let view_nw = viewport.project(view.north_west(), zoom);
    let view_se = viewport.project(view.south_east(), zoom);
    let avail_x = (view_se.x - view_nw.x).abs() - 2.0 * settings.padding_px;
    let avail_y = (view_se.y - view_nw.y).abs() - 2.0 * settings.padding_px;
    if avail_x <= 0.0 || avail_y <= 0.0 {
        return settings.constrain_zoom(zoom);
    }

    let nw = viewport.project(target.north_west(), zoom);
    let se = viewport.project(target.south_east(), zoom);
    let span_x = (se.x - nw.x).abs();
    let span_y = (se.y - nw.y).abs();

    let ratio = |avail: f64, span: f64| if span > 0.0 { avail / span } else { f64::INFINITY };
    let scale = ratio(avail_x, span_x).min(ratio(avail_y, span_y));

    settings.constrain_zoom(zoom + scale.log2())
}

/// Mesure une cible (valide) par rapport au viewport
pub fn measure<V: Viewport + ?Sized>(
    viewport: &V,
    target: &BoundingBox,
    settings: &CameraSettings,
) -> FocusMetrics {
    let current_zoom = viewport.zoom();
    let target_zoom = fit_zoom(viewport, target, settings);

    // Distance évaluée au plus fort des deux zooms
    let zoom = current_zoom.max(target_zoom);
    let a = viewport.project(viewport.center(), zoom);
    let b = viewport.project(target.center(), zoom);
    let distance_px = (a.x - b.x).hypot(a.y - b.y);

    FocusMetrics {
        current_zoom,
        target_zoom,
        distance_px,
        zoom_delta: (target_zoom - current_zoom).abs(),
        already_inside: viewport.bounds().pad(-settings.inset).contains(target),
    }
}

/// Choisit le mouvement minimal pour une cible valide
pub fn decide(target: &BoundingBox, metrics: &FocusMetrics, settings: &CameraSettings) -> FocusDecision {
    if !metrics.already_inside {
        return FocusDecision::FitBounds { target: *target };
    }

    if metrics.distance_px < settings.noop_distance_px
        && metrics.zoom_delta < settings.noop_zoom_delta
    {
        return FocusDecision::NoOp;
    }

    if metrics.zoom_delta < settings.pan_zoom_delta {
        if metrics.distance_px <= settings.settle_distance_px {
            FocusDecision::Settled
        } else {
            FocusDecision::Pan {
                center: target.center(),
            }
        }
    } else {
        FocusDecision::FlyTo {
            center: target.center(),
            zoom: metrics.target_zoom,
        }
    }
}

enum Step {
    NotReady,
    Done(bool),
    Moving {
        motion_end: watch::Receiver<u64>,
        generation: watch::Receiver<u64>,
    },
}

/// Contrôleur de caméra partagé (clonable, un seul mouvement actif)
pub struct CameraController<V: Viewport> {
    viewport: Arc<Mutex<V>>,
    settings: CameraSettings,
    generation: Arc<watch::Sender<u64>>,
}

impl<V: Viewport> Clone for CameraController<V> {
    fn clone(&self) -> Self {
        Self {
            viewport: Arc::clone(&self.viewport),
            settings: self.settings.clone(),
            generation: Arc::clone(&self.generation),
        }
    }
}

impl<V: Viewport + 'static> CameraController<V> {
    pub fn new(viewport: V, settings: CameraSettings) -> Self {
        let (generation, _) = watch::channel(0);
        Self {
            viewport: Arc::new(Mutex::new(viewport)),
            settings,
            generation: Arc::new(generation),
        }
    }

    pub fn settings(&self) -> &CameraSettings {
        &self.settings
    }

    /// Accès direct au viewport (inspection, événements externes)
    pub fn with_viewport<R>(&self, f: impl FnOnce(&mut V) -> R) -> R {
        f(&mut self.lock())
    }

    /// Décision qui serait prise pour `target`, sans rien exécuter
    pub fn plan(&self, target: &BoundingBox) -> FocusDecision {
        if !target.is_valid() {
            return FocusDecision::Invalid;
        }
        let viewport = self.lock();
        let metrics = measure(&*viewport, target, &self.settings);
        decide(target, &metrics, &self.settings)
    }

    /// Amène `target` à l'écran avec le mouvement minimal.
    ///
    /// Le futur est déjà résolu (`false`) quand aucun mouvement n'est fait.
    /// Un mouvement remplacé par un focus ultérieur se résout à `false`.
    pub fn focus(&self, target: &BoundingBox) -> BoxFuture<'static, bool> {
        if !target.is_valid() {
            debug!("Focus ignored: invalid bounding box");
            return future::ready(false).boxed();
        }

        let target = *target;
        match self.step(&target) {
            Step::Done(moved) => future::ready(moved).boxed(),
            Step::Moving {
                motion_end,
                generation,
            } => wait_settled(motion_end, generation).boxed(),
            Step::NotReady => {
                let controller = self.clone();
                async move { controller.retry(target).await }.boxed()
            }
        }
    }

    async fn retry(self, target: BoundingBox) -> bool {
        let delay = Duration::from_millis(self.settings.retry_delay_ms);
        for attempt in 1..=self.settings.retry_attempts {
            tokio::time::sleep(delay).await;
            match self.step(&target) {
                Step::NotReady => debug!(attempt, "Viewport not ready, retrying focus"),
                Step::Done(moved) => return moved,
                Step::Moving {
                    motion_end,
                    generation,
                } => return wait_settled(motion_end, generation).await,
            }
        }
        warn!(
            attempts = self.settings.retry_attempts,
            "Viewport never became ready, focus abandoned"
        );
        false
    }

    fn step(&self, target: &BoundingBox) -> Step {
        let mut viewport = self.lock();
        if !viewport.is_ready() {
            return Step::NotReady;
        }

        let metrics = measure(&*viewport, target, &self.settings);
        let decision = decide(target, &metrics, &self.settings);
        trace!(?metrics, ?decision, "Focus decision");

        match decision {
            FocusDecision::Invalid | FocusDecision::NoOp => Step::Done(false),
            FocusDecision::Settled => {
                viewport.stop();
                self.bump();
                Step::Done(false)
            }
            FocusDecision::Pan { center } => {
                let (motion_end, generation) = self.begin(&mut *viewport);
                viewport.pan_to(center, &self.settings.pan_motion());
                Step::Moving {
                    motion_end,
                    generation,
                }
            }
            FocusDecision::FlyTo { center, zoom } => {
                let (motion_end, generation) = self.begin(&mut *viewport);
                viewport.fly_to(center, zoom, &self.settings.fly_motion());
                Step::Moving {
                    motion_end,
                    generation,
                }
            }
            FocusDecision::FitBounds { target } => {
                let (motion_end, generation) = self.begin(&mut *viewport);
                viewport.fit_bounds(&target, &self.settings.fit_motion());
                Step::Moving {
                    motion_end,
                    generation,
                }
            }
        }
    }

    /// Annule le mouvement en cours et s'abonne avant d'émettre le suivant
    fn begin(&self, viewport: &mut V) -> (watch::Receiver<u64>, watch::Receiver<u64>) {
        viewport.stop();
        self.bump();
        (viewport.motion_end(), self.generation.subscribe())
    }

    fn bump(&self) {
        self.generation.send_modify(|g| *g += 1);
    }

    fn lock(&self) -> MutexGuard<'_, V> {
        self.viewport.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn wait_settled(
    mut motion_end: watch::Receiver<u64>,
    mut generation: watch::Receiver<u64>,
) -> bool {
    // Un mouvement remplacé ne compte jamais comme abouti
    tokio::select! {
        biased;
        Ok(()) = generation.changed() => {
            debug!("Camera motion superseded");
            false
        }
        ended = motion_end.changed() => ended.is_ok(),
    }
}
