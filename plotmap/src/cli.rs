//! Définition et implémentation des commandes CLI
//!
//! - `localities` : catalogue des localités
//! - `outline` : contour d'une localité
//! - `export-outlines` : tous les contours vers GeoJSON, avec rapport
//! - `focus` : ouverture d'un lien partagé sur un viewport sans rendu
//! - `key` / `link` : clé canonique et lien partagé d'une parcelle

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Subcommand;
use futures::stream;
use futures::StreamExt;
use tracing::{info, warn};

use plotfocus::{
    address, BoundaryResolver, CameraController, FocusDecision, FocusSession, HeadlessViewport,
    MemoryRenderer, Outline, OutlinePresenter, PlotKey, SpatialIndex, Viewport,
};
use plotmap::config::{self, Config};
use plotmap::{export_outlines, load_dataset, plot_key_from_url, share_url, LocalityOutline, OutlineReport};

#[derive(Subcommand)]
pub enum Commands {
    /// List localities with their parcel counts
    Localities {
        /// Case-insensitive substring filter
        #[arg(short, long)]
        search: Option<String>,

        /// GeoJSON dataset (default: env PLOTMAP_DATA)
        #[arg(short, long)]
        data: Option<PathBuf>,
    },

    /// Resolve the outline of one locality
    Outline {
        /// Locality name as displayed in the catalogue
        locality: String,

        /// Print the outline geometry as GeoJSON
        #[arg(long)]
        geojson: bool,

        /// GeoJSON dataset (default: env PLOTMAP_DATA)
        #[arg(short, long)]
        data: Option<PathBuf>,
    },

    /// Resolve every locality outline and write them to a GeoJSON file
    ExportOutlines {
        /// Output GeoJSON file
        #[arg(short, long)]
        output: PathBuf,

        /// Write a JSON report to this path
        #[arg(long)]
        report: Option<PathBuf>,

        /// Maximum number of outlines resolved concurrently
        #[arg(long)]
        jobs: Option<usize>,

        /// GeoJSON dataset (default: env PLOTMAP_DATA)
        #[arg(short, long)]
        data: Option<PathBuf>,
    },

    /// Open a plot key or shared link on a headless map
    Focus {
        /// Plot key or full shared URL
        target: String,

        /// GeoJSON dataset (default: env PLOTMAP_DATA)
        #[arg(short, long)]
        data: Option<PathBuf>,
    },

    /// Print the canonical key of a plot
    Key {
        #[arg(long)]
        locality: String,

        #[arg(long)]
        block: String,

        #[arg(long)]
        plot: String,
    },

    /// Print the shared link of a plot key
    Link {
        /// Canonical plot key
        key: String,
    },
}

/// Exécute une sous-commande
pub async fn run(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Localities { search, data } => cmd_localities(data, search.as_deref(), config).await,
        Commands::Outline {
            locality,
            geojson,
            data,
        } => cmd_outline(data, &locality, geojson, config).await,
        Commands::ExportOutlines {
            output,
            report,
            jobs,
            data,
        } => cmd_export_outlines(data, &output, report.as_deref(), jobs, config).await,
        Commands::Focus { target, data } => cmd_focus(data, &target, config).await,
        Commands::Key {
            locality,
            block,
            plot,
        } => {
            println!("{}", address::encode_parts(&locality, &block, &plot));
            Ok(())
        }
        Commands::Link { key } => cmd_link(&key, config),
    }
}

/// Charge le jeu de données et construit l'index
async fn open_index(data: Option<PathBuf>, config: &Config) -> Result<(Arc<SpatialIndex>, String)> {
    let path = config::data_path(data)?;
    let dataset = load_dataset(&path).await?;
    let version = dataset.short_fingerprint().to_string();

    let fields = config.fields.clone();
    let index = tokio::task::spawn_blocking(move || SpatialIndex::build(dataset.features, &fields))
        .await
        .context("Index build task failed")?;

    if index.skipped() > 0 {
        warn!(skipped = index.skipped(), "Features without locality or geometry");
    }
    info!(
        localities = index.locality_count(),
        parcels = index.parcel_count(),
        version = %version,
        "Index built"
    );
    Ok((Arc::new(index), version))
}

/// Exécute la commande localities
pub async fn cmd_localities(data: Option<PathBuf>, search: Option<&str>, config: &Config) -> Result<()> {
    let (index, _) = open_index(data, config).await?;

    let entries = match search {
        Some(query) => index.search(query),
        None => index.catalogue(),
    };

    for entry in &entries {
        println!("{:<40} {:>6}", entry.name, entry.count);
    }
    println!("\n{} localities", entries.len());
    Ok(())
}

/// Exécute la commande outline
pub async fn cmd_outline(data: Option<PathBuf>, locality: &str, geojson: bool, config: &Config) -> Result<()> {
    let (index, _) = open_index(data, config).await?;
    let Some(entry) = index.locality(locality) else {
        anyhow::bail!("Unknown locality: {}", locality);
    };
    let parcels = entry.count;

    let resolver = BoundaryResolver::new(Arc::clone(&index), config.boundary);
    let started = Instant::now();
    let Some(outline) = resolver.resolve(locality).await else {
        anyhow::bail!("No outline could be computed for {}", locality);
    };

    println!("Locality: {}", locality);
    println!("Parcels:  {}", parcels);
    println!("Strategy: {}", outline.strategy);
    println!("Rings:    {}", outline.ring_count());
    if let Some(bbox) = outline.bounding_box() {
        println!(
            "Bounds:   [{:.6}, {:.6}, {:.6}, {:.6}]",
            bbox.west(),
            bbox.south(),
            bbox.east(),
            bbox.north()
        );
    }
    println!("Time:     {:.1} ms", started.elapsed().as_secs_f64() * 1000.0);

    if geojson {
        println!("{}", serde_json::to_string_pretty(&outline.to_geojson())?);
    }
    Ok(())
}

/// Exécute la commande export-outlines
pub async fn cmd_export_outlines(
    data: Option<PathBuf>,
    output: &Path,
    report_path: Option<&Path>,
    jobs: Option<usize>,
    config: &Config,
) -> Result<()> {
    let started = Instant::now();
    let (index, version) = open_index(data, config).await?;

    let names: Vec<(String, usize)> = index
        .catalogue()
        .into_iter()
        .map(|entry| (entry.name.clone(), entry.count))
        .collect();

    let jobs = jobs
        .unwrap_or_else(|| std::thread::available_parallelism().map_or(4, |n| n.get()))
        .max(1);
    info!(localities = names.len(), jobs, "Resolving outlines");

    let resolver = BoundaryResolver::new(Arc::clone(&index), config.boundary);
    let results: Mutex<Vec<(usize, String, usize, Option<Arc<Outline>>)>> =
        Mutex::new(Vec::with_capacity(names.len()));

    stream::iter(names.into_iter().enumerate())
        .for_each_concurrent(jobs, |(position, (name, parcels))| {
            let resolver = &resolver;
            let results = &results;
            async move {
                let outline = resolver.resolve(&name).await;
                if outline.is_none() {
                    warn!(locality = %name, "No outline");
                }
                results
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push((position, name, parcels, outline));
            }
        })
        .await;

    let mut results = results.into_inner().unwrap_or_else(PoisonError::into_inner);
    results.sort_by_key(|(position, ..)| *position);

    let mut report = OutlineReport::new(&version);
    let mut outlines = Vec::with_capacity(results.len());
    for (_, locality, parcels, outline) in results {
        match outline {
            Some(outline) => {
                report.record_outline(outline.strategy, parcels);
                outlines.push(LocalityOutline {
                    locality,
                    parcels,
                    outline,
                });
            }
            None => report.record_missing(&locality, parcels),
        }
    }

    let written = outlines.len();
    let output_path = output.to_path_buf();
    tokio::task::spawn_blocking(move || export_outlines(&outlines, &output_path))
        .await
        .context("Export task failed")??;
    info!(output = %output.display(), outlines = written, "Outlines exported");

    report.set_duration(started.elapsed());
    report.finalize();
    report.display();

    if let Some(path) = report_path {
        report.save_to_file(path)?;
        info!(path = %path.display(), "Report saved");
    }
    info!("{}", report.summary());
    Ok(())
}

/// Exécute la commande focus
pub async fn cmd_focus(data: Option<PathBuf>, target: &str, config: &Config) -> Result<()> {
    let (index, _) = open_index(data, config).await?;

    let raw_key = if target.contains("://") {
        match plot_key_from_url(target, &config.share.param) {
            Some(key) => key.as_str().to_string(),
            None => anyhow::bail!("Link has no '{}' parameter", config.share.param),
        }
    } else {
        target.to_string()
    };

    let viewport = HeadlessViewport::new(
        config.viewport.center(),
        config.viewport.zoom,
        config.viewport.width,
        config.viewport.height,
    )
    .with_zoom_limits(config.camera.min_zoom, config.camera.max_zoom);

    let session = FocusSession::new(
        Arc::clone(&index),
        BoundaryResolver::new(Arc::clone(&index), config.boundary),
        CameraController::new(viewport, config.camera.clone()),
        OutlinePresenter::new(
            MemoryRenderer::new(),
            config.outline.style.clone(),
            config.outline.pane.clone(),
        ),
        config.session_settings(),
    );

    let decision = PlotKey::parse(&raw_key)
        .ok()
        .and_then(|key| index.parcel(&key).map(|entry| entry.bounding_box))
        .map(|bbox| session.camera().plan(&bbox));

    let Some(selection) = session.decode_and_focus(&raw_key).await else {
        warn!(key = %raw_key, "Unknown plot key, map left unchanged");
        return Ok(());
    };

    match decision {
        Some(FocusDecision::FitBounds { target }) => println!(
            "Camera:   fit [{:.6}, {:.6}, {:.6}, {:.6}]",
            target.west(),
            target.south(),
            target.east(),
            target.north()
        ),
        Some(FocusDecision::FlyTo { center, zoom }) => {
            println!("Camera:   fly to ({:.6}, {:.6}) z{:.2}", center.x, center.y, zoom)
        }
        Some(FocusDecision::Pan { center }) => println!("Camera:   pan to ({:.6}, {:.6})", center.x, center.y),
        Some(other) => println!("Camera:   {:?}", other),
        None => {}
    }
    let (center, zoom) = session.camera().with_viewport(|v| (v.center(), v.zoom()));
    println!("View:     ({:.6}, {:.6}) z{:.2}", center.x, center.y, zoom);

    for (label, value) in selection.summary.rows() {
        println!("{:<9} {}", format!("{}:", label), value);
    }

    let link = share_url(&config.share.base_url, &config.share.param, &selection.summary.key)?;
    println!("Link:     {}", link);
    Ok(())
}

/// Exécute la commande link
pub fn cmd_link(raw_key: &str, config: &Config) -> Result<()> {
    let key = PlotKey::parse(raw_key)?;
    let url = share_url(&config.share.base_url, &config.share.param, &key)?;
    println!("{}", url);
    Ok(())
}
