//! Adressage des parcelles : clé canonique partageable dans une URL.
//!
//! Chaque composante (`Locality`, `Block`, `Plot_No`) est normalisée
//! (espaces retirés, minuscules) puis encodée comme `encodeURIComponent`,
//! et les trois composantes sont jointes par `__`.

use std::fmt;
use std::str::FromStr;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};

use crate::types::{Feature, FieldNames};
use crate::PlotError;

/// Séparateur entre les composantes de la clé
pub const KEY_SEPARATOR: &str = "__";

/// Caractères laissés intacts par `encodeURIComponent`
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Identité canonique d'une parcelle
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlotKey(String);

impl PlotKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Clé reçue d'un lien partagé ; la valeur est opaque, seuls les espaces
    /// autour sont retirés.
    pub fn parse(raw: &str) -> Result<Self, PlotError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(PlotError::InvalidKey("empty key".into()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

impl fmt::Display for PlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PlotKey {
    type Err = PlotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for PlotKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Normalise un nom de localité (espaces retirés, minuscules)
pub fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Composante de clé : normalisée puis encodée
pub fn key_part(value: &str) -> String {
    utf8_percent_encode(&normalize(value), URI_COMPONENT).to_string()
}

/// Construit la clé d'une parcelle à partir de ses trois composantes
pub fn encode_parts(locality: &str, block: &str, plot: &str) -> PlotKey {
    PlotKey(
        [key_part(locality), key_part(block), key_part(plot)].join(KEY_SEPARATOR),
    )
}

/// Construit la clé d'une parcelle à partir de ses attributs
pub fn encode(feature: &Feature, fields: &FieldNames) -> PlotKey {
    encode_parts(
        feature.property(&fields.locality),
        feature.property(&fields.block),
        feature.property(&fields.plot),
    )
}
