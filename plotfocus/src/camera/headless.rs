//! Viewport sans rendu, en projection Web Mercator (EPSG:3857).
//!
//! Pixels absolus à la Leaflet : le monde mesure `256 * 2^zoom` pixels de
//! côté, origine au coin nord-ouest. Les transitions sont instantanées ; la
//! fin de mouvement est signalée tout de suite (`auto_settle`) ou à l'appel
//! de [`HeadlessViewport::settle`].

use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, PI};
use std::time::Duration;

use geo::Coord;
use tokio::sync::watch;
use tracing::trace;

use super::{Motion, Viewport};
use crate::types::BoundingBox;

/// Demi-grand axe WGS84 (rayon de la sphère Web Mercator) en mètres
pub const EARTH_RADIUS: f64 = 6378137.0;

/// Taille d'une tuile en pixels
pub const TILE_SIZE: f64 = 256.0;

/// Latitude maximale représentable en Web Mercator
pub const MAX_LATITUDE: f64 = 85.051_128_779_806_59;

/// Commande reçue par le viewport
#[derive(Debug, Clone, PartialEq)]
pub enum ViewportCommand {
    FitBounds {
        target: BoundingBox,
        duration: Duration,
    },
    PanTo {
        center: Coord,
        duration: Duration,
    },
    FlyTo {
        center: Coord,
        zoom: f64,
        duration: Duration,
    },
}

/// Convertit lon/lat (degrés) en mètres Web Mercator
pub fn to_mercator(point: Coord) -> Coord {
    let lat = point.y.clamp(-MAX_LATITUDE, MAX_LATITUDE).to_radians();
    Coord {
        x: EARTH_RADIUS * point.x.to_radians(),
        y: EARTH_RADIUS * (FRAC_PI_4 + lat / 2.0).tan().ln(),
    }
}

/// Convertit des mètres Web Mercator en lon/lat (degrés)
pub fn from_mercator(point: Coord) -> Coord {
    Coord {
        x: (point.x / EARTH_RADIUS).to_degrees(),
        y: (2.0 * (point.y / EARTH_RADIUS).exp().atan() - FRAC_PI_2).to_degrees(),
    }
}

fn world_size(zoom: f64) -> f64 {
    TILE_SIZE * zoom.exp2()
}

/// Viewport en mémoire
#[derive(Debug)]
pub struct HeadlessViewport {
    center: Coord,
    zoom: f64,
    size: Coord,
    min_zoom: f64,
    max_zoom: f64,
    ready: bool,
    auto_settle: bool,
    moving: bool,
    stops: usize,
    history: Vec<ViewportCommand>,
    motion_end: watch::Sender<u64>,
}

impl HeadlessViewport {
    /// Crée un viewport de `width` x `height` pixels
    pub fn new(center: Coord, zoom: f64, width: f64, height: f64) -> Self {
        let (motion_end, _) = watch::channel(0);
        Self {
            center,
            zoom,
            size: Coord {
                x: width,
                y: height,
            },
            min_zoom: 0.0,
            max_zoom: 18.0,
            ready: true,
            auto_settle: true,
            moving: false,
            stops: 0,
            history: Vec::new(),
            motion_end,
        }
    }

    pub fn with_zoom_limits(mut self, min_zoom: f64, max_zoom: f64) -> Self {
        self.min_zoom = min_zoom;
        self.max_zoom = max_zoom;
        self.zoom = self.zoom.clamp(min_zoom, max_zoom);
        self
    }

    pub fn set_ready(&mut self, ready: bool) {
        self.ready = ready;
    }

    /// Si faux, chaque mouvement reste en cours jusqu'à [`Self::settle`]
    pub fn set_auto_settle(&mut self, auto_settle: bool) {
        self.auto_settle = auto_settle;
    }

    /// Place la vue sans transition ni événement
    pub fn jump_to(&mut self, center: Coord, zoom: f64) {
        self.center = center;
        self.zoom = zoom.clamp(self.min_zoom, self.max_zoom);
    }

    /// Termine le mouvement en cours
    pub fn settle(&mut self) {
        if self.moving {
            self.moving = false;
            self.motion_end.send_modify(|n| *n += 1);
        }
    }

    pub fn is_moving(&self) -> bool {
        self.moving
    }

    /// Nombre de mouvements interrompus
    pub fn stops(&self) -> usize {
        self.stops
    }

    pub fn history(&self) -> &[ViewportCommand] {
        &self.history
    }

    pub fn size(&self) -> Coord {
        self.size
    }

    /// Inverse de [`Viewport::project`]
    pub fn unproject(&self, pixel: Coord, zoom: f64) -> Coord {
        let scale = world_size(zoom);
        let half = PI * EARTH_RADIUS;
        from_mercator(Coord {
            x: (pixel.x / scale - 0.5) * 2.0 * half,
            y: (0.5 - pixel.y / scale) * 2.0 * half,
        })
    }

    /// Zoom auquel `target` tient dans la vue, marge comprise
    fn bounds_zoom(&self, target: &BoundingBox, padding: f64) -> f64 {
        let nw = self.project(target.north_west(), self.zoom);
        let se = self.project(target.south_east(), self.zoom);
        let span_x = (se.x - nw.x).abs();
        let span_y = (se.y - nw.y).abs();
        let avail_x = (self.size.x - 2.0 * padding).max(1.0);
        let avail_y = (self.size.y - 2.0 * padding).max(1.0);

        let ratio = |avail: f64, span: f64| if span > 0.0 { avail / span } else { f64::INFINITY };
        let scale = ratio(avail_x, span_x).min(ratio(avail_y, span_y));
        (self.zoom + scale.log2()).clamp(self.min_zoom, self.max_zoom)
    }

    fn start_motion(&mut self, command: ViewportCommand) {
        trace!(?command, "Headless viewport motion");
        self.history.push(command);
        self.moving = true;
        if self.auto_settle {
            self.settle();
        }
    }
}

impl Viewport for HeadlessViewport {
    fn is_ready(&self) -> bool {
        self.ready
    }

    fn center(&self) -> Coord {
        self.center
    }

    fn zoom(&self) -> f64 {
        self.zoom
    }

    fn bounds(&self) -> BoundingBox {
        let c = self.project(self.center, self.zoom);
        let nw = self.unproject(
            Coord {
                x: c.x - self.size.x / 2.0,
                y: c.y - self.size.y / 2.0,
            },
            self.zoom,
        );
        let se = self.unproject(
            Coord {
                x: c.x + self.size.x / 2.0,
                y: c.y + self.size.y / 2.0,
            },
            self.zoom,
        );
        BoundingBox::new(nw, se)
    }

    fn project(&self, point: Coord, zoom: f64) -> Coord {
        let m = to_mercator(point);
        let scale = world_size(zoom);
        let half = PI * EARTH_RADIUS;
        Coord {
            x: scale * (0.5 + m.x / (2.0 * half)),
            y: scale * (0.5 - m.y / (2.0 * half)),
        }
    }

    fn fit_bounds(&mut self, target: &BoundingBox, motion: &Motion) {
        let zoom = self.bounds_zoom(target, motion.padding);

        // Centre pris au milieu de l'emprise projetée
        let nw = self.project(target.north_west(), zoom);
        let se = self.project(target.south_east(), zoom);
        let mid = Coord {
            x: (nw.x + se.x) / 2.0,
            y: (nw.y + se.y) / 2.0,
        };
        self.center = self.unproject(mid, zoom);
        self.zoom = zoom;
        self.start_motion(ViewportCommand::FitBounds {
            target: *target,
            duration: motion.duration,
        });
    }

    fn pan_to(&mut self, center: Coord, motion: &Motion) {
        self.center = center;
        self.start_motion(ViewportCommand::PanTo {
            center,
            duration: motion.duration,
        });
    }

    fn fly_to(&mut self, center: Coord, zoom: f64, motion: &Motion) {
        self.center = center;
        self.zoom = zoom.clamp(self.min_zoom, self.max_zoom);
        self.start_motion(ViewportCommand::FlyTo {
            center,
            zoom: self.zoom,
            duration: motion.duration,
        });
    }

    fn stop(&mut self) {
        if self.moving {
            self.moving = false;
            self.stops += 1;
        }
    }

    fn motion_end(&self) -> watch::Receiver<u64> {
        self.motion_end.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_mercator_roundtrip() {
        let point = Coord { x: 73.05, y: 33.68 };
        let back = from_mercator(to_mercator(point));
        assert_relative_eq!(back.x, point.x, epsilon = 1e-9);
        assert_relative_eq!(back.y, point.y, epsilon = 1e-9);
    }

    #[test]
    fn test_project_origin_and_scale() {
        let viewport = HeadlessViewport::new(Coord { x: 0.0, y: 0.0 }, 0.0, 256.0, 256.0);
        let origin = viewport.project(Coord { x: 0.0, y: 0.0 }, 0.0);
        assert_relative_eq!(origin.x, 128.0, epsilon = 1e-9);
        assert_relative_eq!(origin.y, 128.0, epsilon = 1e-9);

        let at_one = viewport.project(Coord { x: 0.0, y: 0.0 }, 1.0);
        assert_relative_eq!(at_one.x, 256.0, epsilon = 1e-9);
    }

    #[test]
    fn test_bounds_centered_on_view() {
        let center = Coord { x: 73.05, y: 33.68 };
        let viewport = HeadlessViewport::new(center, 14.0, 800.0, 600.0);
        let bounds = viewport.bounds();
        assert!(bounds.is_valid());
        assert_relative_eq!(bounds.center().x, center.x, epsilon = 1e-9);
        // Mercator : le centre géographique de l'emprise est légèrement décalé
        assert_relative_eq!(bounds.center().y, center.y, epsilon = 1e-3);
        assert!(bounds.width() > bounds.height());
    }

    #[test]
    fn test_manual_settle_signals_motion_end() {
        let mut viewport = HeadlessViewport::new(Coord { x: 0.0, y: 0.0 }, 5.0, 800.0, 600.0);
        viewport.set_auto_settle(false);
        let mut events = viewport.motion_end();

        let motion = Motion {
            duration: Duration::from_millis(300),
            ease_linearity: None,
            padding: 0.0,
        };
        viewport.pan_to(Coord { x: 1.0, y: 1.0 }, &motion);
        assert!(viewport.is_moving());
        assert!(!events.has_changed().unwrap());

        viewport.settle();
        assert!(!viewport.is_moving());
        assert!(events.has_changed().unwrap());
        assert_eq!(viewport.stops(), 0);
    }
}
