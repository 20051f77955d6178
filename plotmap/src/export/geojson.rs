//! Export des contours de localité en GeoJSON avec geozero (streaming)

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use geo::Geometry;
use geozero::geojson::GeoJsonWriter;
use geozero::GeozeroGeometry;

use plotfocus::Outline;

/// Contour résolu d'une localité, prêt à l'export
#[derive(Debug, Clone)]
pub struct LocalityOutline {
    pub locality: String,
    pub parcels: usize,
    pub outline: Arc<Outline>,
}

/// Écrit les contours dans une FeatureCollection (WGS84)
pub fn export_outlines(outlines: &[LocalityOutline], output_path: &Path) -> Result<()> {
    let file = File::create(output_path)
        .context(format!("Failed to create file: {}", output_path.display()))?;
    let mut writer = BufWriter::new(file);

    write!(writer, r#"{{"type":"FeatureCollection","features":["#)?;
    for (i, item) in outlines.iter().enumerate() {
        if i > 0 {
            write!(writer, ",")?;
        }
        write_outline(&mut writer, item)?;
    }
    write!(writer, "]}}")?;
    writer.flush()?;

    Ok(())
}

/// Écrit un contour : LineString pour un anneau, MultiLineString sinon
fn write_outline<W: Write>(writer: &mut W, item: &LocalityOutline) -> Result<()> {
    let geometry = match item.outline.lines.0.as_slice() {
        [single] => Geometry::LineString(single.clone()),
        _ => Geometry::MultiLineString(item.outline.lines.clone()),
    };

    write!(writer, r#"{{"type":"Feature","geometry":"#)?;
    let mut geom_buf = Vec::new();
    let mut geom_writer = GeoJsonWriter::new(&mut geom_buf);
    geometry.process_geom(&mut geom_writer)?;
    writer.write_all(&geom_buf)?;

    write!(
        writer,
        r#","properties":{{"locality":{},"strategy":"{}","parcels":{},"rings":{}}}}}"#,
        serde_json::to_string(&item.locality)?,
        item.outline.strategy,
        item.parcels,
        item.outline.ring_count()
    )?;

    Ok(())
}
