//! Types d'erreurs pour le crate plotfocus

use thiserror::Error;

/// Erreurs pouvant survenir dans le moteur de contours et de focus
#[derive(Debug, Error)]
pub enum PlotError {
    /// Géométrie invalide ou non supportée
    #[error("Invalid geometry for {entity}: {reason}")]
    InvalidGeometry { entity: String, reason: String },

    /// Pas assez de points pour construire une enveloppe
    #[error("Not enough points for {operation}: got {count}")]
    EmptyPointSet { operation: &'static str, count: usize },

    /// Échec de la fusion des polygones
    #[error("Dissolve failed: {0}")]
    Dissolve(String),

    /// La fusion produit plusieurs polygones disjoints
    #[error("Dissolve produced {parts} disjoint parts")]
    MultipleParts { parts: usize },

    /// Échec du calcul de l'enveloppe concave
    #[error("Concave hull failed: {0}")]
    ConcaveHull(String),

    /// Clé de parcelle mal formée
    #[error("Invalid plot key: {0}")]
    InvalidKey(String),
}

impl PlotError {
    /// Crée une erreur de géométrie invalide
    pub fn invalid_geometry(entity: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidGeometry {
            entity: entity.into(),
            reason: reason.into(),
        }
    }

    /// Crée une erreur d'ensemble de points insuffisant
    pub fn empty_point_set(operation: &'static str, count: usize) -> Self {
        Self::EmptyPointSet { operation, count }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = PlotError::empty_point_set("convex hull", 2);
        assert_eq!(err.to_string(), "Not enough points for convex hull: got 2");

        let err = PlotError::invalid_geometry("convex hull", "all points are collinear");
        assert_eq!(
            err.to_string(),
            "Invalid geometry for convex hull: all points are collinear"
        );

        let err = PlotError::MultipleParts { parts: 3 };
        assert_eq!(err.to_string(), "Dissolve produced 3 disjoint parts");
    }
}
