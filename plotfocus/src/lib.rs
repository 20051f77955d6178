//! # plotfocus
//!
//! Moteur de contours de localité et de focus caméra pour un parcellaire.
//!
//! ## Features
//!
//! - Index des localités et des parcelles (clé canonique partageable)
//! - Contour de localité à la demande : dissolve, enveloppe concave puis
//!   convexe, avec cache et déduplication des calculs en cours
//! - Focus caméra sans micro-saccades (aucun mouvement, recentrage, vol ou
//!   ajustement d'emprise)
//! - Affichage transitoire des contours avec expiration
//!
//! ## Usage
//!
//! ```rust,ignore
//! use plotfocus::{address, FieldNames, SpatialIndex};
//!
//! let index = SpatialIndex::build(features, &FieldNames::default());
//! let key = address::encode_parts("Alpha", "B1", "12");
//! assert_eq!(key.as_str(), "alpha__b1__12");
//!
//! if let Some(entry) = index.parcel(&key) {
//!     let settled = camera.focus(&entry.bounding_box).await;
//! }
//! ```

pub mod address;
pub mod boundary;
pub mod camera;
pub mod error;
pub mod geometry;
pub mod index;
pub mod presentation;
pub mod session;
pub mod types;

pub use address::PlotKey;
pub use boundary::{BoundaryResolver, BoundarySettings, RequestToken};
pub use camera::{CameraController, CameraSettings, FocusDecision, HeadlessViewport, Viewport};
pub use error::PlotError;
pub use geometry::{GeoOps, GeometryOps};
pub use index::{LocalityEntry, LocalityPin, ParcelEntry, SpatialIndex};
pub use presentation::{MemoryRenderer, OutlinePresenter, OutlineRenderer, OutlineStyle, PaneSpec};
pub use session::{FocusSession, PlotSummary, SessionSettings};
pub use types::{BoundingBox, Feature, FieldNames, Outline, OutlineStrategy};
