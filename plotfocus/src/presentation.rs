//! Affichage transitoire des contours.
//!
//! Un seul contour est visible par emplacement. Chaque affichage remplace le
//! précédent (la nouvelle couche est ajoutée avant le retrait de l'ancienne)
//! et expire seul après le délai demandé.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::types::{Outline, OutlineStrategy};

/// Délai d'affichage par défaut d'un contour
pub const DEFAULT_OUTLINE_TTL: Duration = Duration::from_millis(1600);

/// Identifiant d'une couche chez le moteur de rendu
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LayerId(u64);

impl LayerId {
    pub fn value(&self) -> u64 {
        self.0
    }
}

/// Calque dédié aux contours
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaneSpec {
    pub name: String,
    pub z_index: i32,
    pub interactive: bool,
}

impl Default for PaneSpec {
    fn default() -> Self {
        Self {
            name: "outline-pane".into(),
            z_index: 650,
            interactive: false,
        }
    }
}

/// Trait animé (pointillés qui défilent, sans remplissage)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutlineStyle {
    pub color: String,
    pub weight: f64,
    pub dash_array: Vec<f64>,
    /// Décalage final du pointillé sur un cycle d'animation
    pub dash_offset: f64,
    pub animation_s: f64,
    pub fill_opacity: f64,
}

impl Default for OutlineStyle {
    fn default() -> Self {
        Self {
            color: "#2563eb".into(),
            weight: 3.0,
            dash_array: vec![10.0, 8.0],
            dash_offset: -18.0,
            animation_s: 1.2,
            fill_opacity: 0.0,
        }
    }
}

/// Capacités attendues du moteur de rendu des contours
pub trait OutlineRenderer: Send {
    /// Crée le calque s'il n'existe pas encore
    fn ensure_pane(&mut self, pane: &PaneSpec);

    fn add_layer(&mut self, id: LayerId, outline: &Outline, style: &OutlineStyle, pane: &str);

    fn remove_layer(&mut self, id: LayerId);
}

enum Slot {
    Empty,
    Shown {
        layer: LayerId,
        epoch: u64,
        outline: Arc<Outline>,
    },
}

struct PresenterState<R> {
    renderer: R,
    slot: Slot,
    pane_ready: bool,
    next_layer: u64,
    epoch: u64,
}

/// Emplacement d'affichage d'un contour (clonable, état partagé)
pub struct OutlinePresenter<R: OutlineRenderer> {
    state: Arc<Mutex<PresenterState<R>>>,
    style: OutlineStyle,
    pane: PaneSpec,
}

impl<R: OutlineRenderer> Clone for OutlinePresenter<R> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            style: self.style.clone(),
            pane: self.pane.clone(),
        }
    }
}

impl<R: OutlineRenderer + 'static> OutlinePresenter<R> {
    pub fn new(renderer: R, style: OutlineStyle, pane: PaneSpec) -> Self {
        Self {
            state: Arc::new(Mutex::new(PresenterState {
                renderer,
                slot: Slot::Empty,
                pane_ready: false,
                next_layer: 0,
                epoch: 0,
            })),
            style,
            pane,
        }
    }

    /// Affiche `outline` à la place du contour courant.
    ///
    /// Le même objet (même `Arc`) déjà affiché n'est pas redessiné : seul son
    /// délai d'expiration repart. Un `ttl` nul garde le contour jusqu'au
    /// prochain remplacement. L'expiration nécessite un runtime tokio.
    pub fn present(&self, outline: Arc<Outline>, ttl: Duration) -> LayerId {
        let mut guard = self.lock();
        let state = &mut *guard;
        state.epoch += 1;
        let epoch = state.epoch;

        let refreshed = match &mut state.slot {
            Slot::Shown {
                layer,
                epoch: shown_epoch,
                outline: shown,
            } if Arc::ptr_eq(shown, &outline) => {
                trace!(layer = layer.0, "Outline already shown, refreshing");
                *shown_epoch = epoch;
                Some(*layer)
            }
            _ => None,
        };

        let layer = match refreshed {
            Some(layer) => layer,
            None => {
                if !state.pane_ready {
                    state.renderer.ensure_pane(&self.pane);
                    state.pane_ready = true;
                }

                state.next_layer += 1;
                let layer = LayerId(state.next_layer);
                state
                    .renderer
                    .add_layer(layer, &outline, &self.style, &self.pane.name);

                let previous = std::mem::replace(
                    &mut state.slot,
                    Slot::Shown {
                        layer,
                        epoch,
                        outline: Arc::clone(&outline),
                    },
                );
                if let Slot::Shown { layer: old, .. } = previous {
                    state.renderer.remove_layer(old);
                }
                debug!(layer = layer.0, strategy = %outline.strategy, "Outline presented");
                layer
            }
        };
        drop(guard);

        if !ttl.is_zero() {
            self.schedule_expiry(epoch, ttl);
        }
        layer
    }

    /// Retire le contour courant
    pub fn clear(&self) {
        let mut guard = self.lock();
        let state = &mut *guard;
        state.epoch += 1;
        if let Slot::Shown { layer, .. } = std::mem::replace(&mut state.slot, Slot::Empty) {
            state.renderer.remove_layer(layer);
        }
    }

    /// Contour actuellement affiché
    pub fn current(&self) -> Option<Arc<Outline>> {
        match &self.lock().slot {
            Slot::Shown { outline, .. } => Some(Arc::clone(outline)),
            Slot::Empty => None,
        }
    }

    /// Stratégie du contour affiché
    pub fn current_strategy(&self) -> Option<OutlineStrategy> {
        self.current().map(|outline| outline.strategy)
    }

    pub fn with_renderer<T>(&self, f: impl FnOnce(&mut R) -> T) -> T {
        f(&mut self.lock().renderer)
    }

    fn schedule_expiry(&self, epoch: u64, ttl: Duration) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            debug!("No async runtime, outline kept until replaced");
            return;
        };

        let state = Arc::clone(&self.state);
        handle.spawn(async move {
            tokio::time::sleep(ttl).await;
            let mut guard = state.lock().unwrap_or_else(PoisonError::into_inner);
            let state = &mut *guard;
            let expired = matches!(state.slot, Slot::Shown { epoch: e, .. } if e == epoch);
            if expired {
                if let Slot::Shown { layer, .. } = std::mem::replace(&mut state.slot, Slot::Empty) {
                    state.renderer.remove_layer(layer);
                    trace!(layer = layer.0, "Outline expired");
                }
            }
        });
    }

    fn lock(&self) -> MutexGuard<'_, PresenterState<R>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Couche dessinée par [`MemoryRenderer`]
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedLayer {
    pub id: LayerId,
    pub pane: String,
    pub strategy: OutlineStrategy,
    pub rings: usize,
    pub color: String,
}

/// Moteur de rendu en mémoire (tests, ligne de commande)
#[derive(Debug, Default)]
pub struct MemoryRenderer {
    panes: Vec<PaneSpec>,
    layers: Vec<RenderedLayer>,
    added: usize,
}

impl MemoryRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Couches actuellement visibles
    pub fn layers(&self) -> &[RenderedLayer] {
        &self.layers
    }

    pub fn panes(&self) -> &[PaneSpec] {
        &self.panes
    }

    /// Nombre total de couches ajoutées depuis la création
    pub fn added(&self) -> usize {
        self.added
    }
}

impl OutlineRenderer for MemoryRenderer {
    fn ensure_pane(&mut self, pane: &PaneSpec) {
        if !self.panes.iter().any(|p| p.name == pane.name) {
            self.panes.push(pane.clone());
        }
    }

    fn add_layer(&mut self, id: LayerId, outline: &Outline, style: &OutlineStyle, pane: &str) {
        self.added += 1;
        self.layers.push(RenderedLayer {
            id,
            pane: pane.to_string(),
            strategy: outline.strategy,
            rings: outline.ring_count(),
            color: style.color.clone(),
        });
    }

    fn remove_layer(&mut self, id: LayerId) {
        self.layers.retain(|layer| layer.id != id);
    }
}
