//! Liens partagés : la clé de parcelle voyage dans un paramètre de requête

use anyhow::{Context, Result};
use url::Url;

use plotfocus::PlotKey;

/// Paramètre par défaut portant la clé
pub const DEFAULT_PARAM: &str = "plot";

/// Construit le lien d'une parcelle : le paramètre est ajouté ou remplacé,
/// les autres paramètres de la base sont conservés.
pub fn share_url(base: &str, param: &str, key: &PlotKey) -> Result<Url> {
    let mut url = Url::parse(base).with_context(|| format!("Invalid base URL: {}", base))?;

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(name, _)| name != param)
        .map(|(name, value)| (name.into_owned(), value.into_owned()))
        .collect();

    url.query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair(param, key.as_str());
    Ok(url)
}

/// Clé portée par un lien, `None` si absente ou vide
pub fn plot_key_from_url(link: &str, param: &str) -> Option<PlotKey> {
    let url = Url::parse(link).ok()?;
    let raw = url
        .query_pairs()
        .find(|(name, _)| name == param)
        .map(|(_, value)| value.into_owned())?;
    PlotKey::parse(&raw).ok()
}
