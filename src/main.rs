use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use comfy_table::Table;
use comfy_table::presets::UTF8_FULL;
use configuration::{Config, ConfigArgs};
use core_types::LatLng;
use core_types::fields::{field_label, format_value};
use engine::{IngestOutcome, RegionDraft, Session};

/// The main entry point for the Zonecast application.
#[tokio::main]
async fn main() -> Result<()> {
    // ZONECAST__* overrides may live in a .env file; it is optional.
    dotenvy::dotenv().ok();

    // Parse command-line arguments
    let cli = Cli::parse();

    let config = cli.config.load().context("Failed to load configuration")?;
    let _log_guard = configuration::init_tracing(&config.logging)?;

    let session = Session::new(&config)?;

    // Execute the appropriate command
    match cli.command {
        Commands::Series(args) => handle_series(&session, &config, args).await,
        Commands::Region(args) => handle_region(&session, args).await,
    }
}

// ==============================================================================
// CLI Structure
// ==============================================================================

/// Classifies hand-drawn map regions by their hourly weather.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    config: ConfigArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch the merged hourly series for a single point.
    Series(SeriesArgs),
    /// Create a region from vertices, acquire its series and print its classification.
    Region(RegionArgs),
}

#[derive(Parser)]
struct SeriesArgs {
    /// Latitude in degrees.
    #[arg(long, allow_hyphen_values = true)]
    lat: f64,

    /// Longitude in degrees.
    #[arg(long, allow_hyphen_values = true)]
    lon: f64,

    /// Hourly fields to fetch. Defaults to the configured region fields.
    #[arg(long = "field")]
    fields: Vec<String>,

    /// Print at most this many rows.
    #[arg(long)]
    limit: Option<usize>,
}

#[derive(Parser)]
struct RegionArgs {
    /// The region's display name.
    #[arg(long)]
    name: String,

    /// A polygon vertex as LAT,LON. Repeat 3 to 12 times.
    #[arg(long = "vertex", value_parser = parse_vertex, allow_hyphen_values = true)]
    vertices: Vec<LatLng>,

    /// The time window as START,END hour indices.
    #[arg(long, value_parser = parse_window)]
    window: Option<(usize, usize)>,

    /// Print the region as JSON instead of a table.
    #[arg(long)]
    json: bool,

    /// Also print every store notification emitted along the way.
    #[arg(long)]
    events: bool,
}

fn parse_vertex(raw: &str) -> Result<LatLng> {
    let Some((lat, lon)) = raw.split_once(',') else {
        bail!("expected LAT,LON, got '{}'", raw);
    };
    let lat: f64 = lat.trim().parse().context("invalid latitude")?;
    let lon: f64 = lon.trim().parse().context("invalid longitude")?;
    Ok(LatLng::new(lat, lon))
}

fn parse_window(raw: &str) -> Result<(usize, usize)> {
    let Some((start, end)) = raw.split_once(',') else {
        bail!("expected START,END, got '{}'", raw);
    };
    Ok((
        start.trim().parse().context("invalid window start")?,
        end.trim().parse().context("invalid window end")?,
    ))
}

// ==============================================================================
// Series Command Logic
// ==============================================================================

async fn handle_series(session: &Session, config: &Config, args: SeriesArgs) -> Result<()> {
    let fields = if args.fields.is_empty() {
        config.regions.requested_fields()
    } else {
        args.fields
    };

    let source = session
        .fetch_series(LatLng::new(args.lat, args.lon), fields)
        .await?;
    println!(
        "Hourly series for grid point {:.4}, {:.4} ({} samples)",
        source.location.lat,
        source.location.lng,
        source.series.len()
    );

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    // Fields the sources could not serve are already gone from the series.
    let fields: Vec<String> = source.series.field_names().map(str::to_string).collect();
    let mut header = vec!["Time".to_string()];
    header.extend(fields.iter().map(|f| field_label(f)));
    table.set_header(header);

    let rows = args.limit.unwrap_or(source.series.len());
    for (i, timestamp) in source.series.timestamps().iter().take(rows).enumerate() {
        let mut row = vec![timestamp.format("%Y-%m-%d %H:%M").to_string()];
        for field in &fields {
            let cell = match source.series.values(field).and_then(|v| v.get(i)) {
                Some(value) if value.is_finite() => format_value(*value, field),
                _ => "-".to_string(),
            };
            row.push(cell);
        }
        table.add_row(row);
    }
    println!("{table}");
    Ok(())
}

// ==============================================================================
// Region Command Logic
// ==============================================================================

async fn handle_region(session: &Session, args: RegionArgs) -> Result<()> {
    let mut events = session.subscribe().await;

    let outcome = session
        .create_region(RegionDraft {
            name: args.name,
            vertices: args.vertices,
        })
        .await?;
    match &outcome.acquisition {
        Ok(IngestOutcome::Applied(_)) => {}
        Ok(other) => tracing::warn!(?other, "Series was not applied."),
        Err(e) => eprintln!("Warning: could not acquire a series: {}", e),
    }

    if let Some((start, end)) = args.window {
        session.set_window(start, end).await?;
    }

    let store = session.store().lock().await;
    let region = store
        .region(outcome.region_id)
        .context("region vanished after creation")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(region)?);
    } else {
        let window = store.window();
        let value = store
            .current_value(region.id)
            .map(|v| format_value(v, &region.field))
            .unwrap_or_else(|| "-".to_string());

        let mut summary = Table::new();
        summary.load_preset(UTF8_FULL);
        summary.set_header(vec!["Region", "Vertices", "Centroid", "Field", "Window", "Value", "Color"]);
        summary.add_row(vec![
            region.name.clone(),
            region.vertices.len().to_string(),
            format!("{:.4}, {:.4}", region.centroid.lat, region.centroid.lng),
            field_label(&region.field),
            format!("[{}, {}] ({}h)", window.start(), window.end(), window.span_hours()),
            value,
            region.current_color.to_string(),
        ]);
        println!("{summary}");

        let mut rules = Table::new();
        rules.load_preset(UTF8_FULL);
        rules.set_header(vec!["#", "Rule", "Color"]);
        for (i, rule) in region.rules.iter().enumerate() {
            rules.add_row(vec![
                (i + 1).to_string(),
                format!("{} {}", rule.operator.symbol(), rule.threshold),
                rule.color.to_string(),
            ]);
        }
        println!("{rules}");
    }
    drop(store);

    if args.events {
        while let Ok(event) = events.try_recv() {
            println!("{}", event.to_json()?);
        }
    }
    Ok(())
}
