//! CLI commands implementation.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clap::{Parser, Subcommand};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::adapters::{
    GoogleAdapter, InfatuationAdapter, MichelinAdapter, OpentableAdapter, RatingAdapter,
    ResyAdapter, SessionId, SevenroomsAdapter, YelpAdapter,
};
use crate::audit::AuditEngine;
use crate::classifier::LlmClassifier;
use crate::config::Config;
use crate::detection::DetectionEngine;
use crate::models::{AuditProvider, Venue};
use crate::repository::{AuditRepository, RatingRepository, VenueRepository};

#[derive(Parser)]
#[command(name = "tablescout")]
#[command(about = "Reservation platform detection and venue coverage auditing")]
#[command(version)]
pub struct Cli {
    /// Config file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data directory (overrides config)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the data directory and database
    Init,

    /// Manage tracked venues
    Venue {
        #[command(subcommand)]
        command: VenueCommands,
    },

    /// Detect the reservation platform and booking horizon for a venue
    Detect {
        /// Venue ID
        venue_id: String,
    },

    /// Bring a venue under scheduled audit coverage
    Cover {
        /// Venue ID
        venue_id: String,
    },

    /// Run one audit sweep for a provider
    Sweep {
        /// Provider: google, michelin, yelp, infatuation, reservation
        provider: String,
        /// Limit items this sweep (capped at the provider batch cap)
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Show system status
    Status,
}

#[derive(Subcommand)]
enum VenueCommands {
    /// Add or update a venue
    Add {
        /// Venue ID
        id: String,
        /// Venue name
        name: String,
        #[arg(long)]
        city: Option<String>,
        #[arg(long)]
        website: Option<String>,
        #[arg(long)]
        lat: Option<f64>,
        #[arg(long)]
        lng: Option<f64>,
    },
    /// List tracked venues
    List,
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }
    let config = Arc::new(config);

    match cli.command {
        Commands::Init => cmd_init(&config),
        Commands::Venue { command } => match command {
            VenueCommands::Add {
                id,
                name,
                city,
                website,
                lat,
                lng,
            } => cmd_venue_add(&config, id, name, city, website, lat, lng),
            VenueCommands::List => cmd_venue_list(&config),
        },
        Commands::Detect { venue_id } => cmd_detect(&config, &venue_id).await,
        Commands::Cover { venue_id } => cmd_cover(&config, &venue_id).await,
        Commands::Sweep { provider, limit } => cmd_sweep(&config, &provider, limit).await,
        Commands::Status => cmd_status(&config),
    }
}

struct App {
    venues: Arc<VenueRepository>,
    ratings: Arc<RatingRepository>,
    audits: Arc<AuditRepository>,
}

fn open(config: &Config) -> anyhow::Result<App> {
    let db = config.db_path();
    Ok(App {
        venues: Arc::new(VenueRepository::new(&db)?),
        ratings: Arc::new(RatingRepository::new(&db)?),
        audits: Arc::new(AuditRepository::new(&db)?),
    })
}

/// Wire the detection engine for one run. Every adapter shares the run's
/// session id so the outbound proxy groups their requests.
fn build_detection(config: &Config, session: &SessionId) -> anyhow::Result<Arc<DetectionEngine>> {
    let a = &config.adapters;
    let timeout = Duration::from_secs(a.request_timeout_secs);
    let resy_key = a
        .resy_api_key
        .clone()
        .ok_or_else(|| anyhow::anyhow!("resy_api_key not configured (set RESY_API_KEY)"))?;

    Ok(Arc::new(DetectionEngine::new(
        Arc::new(LlmClassifier::new(config.classifier.clone(), session.clone())),
        Arc::new(ResyAdapter::new(
            a.resy_base_url.clone(),
            resy_key,
            session.clone(),
            timeout,
        )),
        Arc::new(OpentableAdapter::new(
            a.opentable_base_url.clone(),
            session.clone(),
            timeout,
        )),
        Arc::new(SevenroomsAdapter::new(
            a.sevenrooms_base_url.clone(),
            session.clone(),
            timeout,
        )),
    )))
}

fn build_audit_engine(config: &Arc<Config>, app: &App) -> anyhow::Result<AuditEngine> {
    let session = SessionId::generate();
    let a = &config.adapters;
    let timeout = Duration::from_secs(a.request_timeout_secs);

    let mut adapters: HashMap<AuditProvider, Arc<dyn RatingAdapter>> = HashMap::new();
    if let Some(key) = &a.google_api_key {
        adapters.insert(
            AuditProvider::Google,
            Arc::new(GoogleAdapter::new(
                a.google_base_url.clone(),
                key.clone(),
                session.clone(),
                timeout,
            )),
        );
    }
    if let Some(key) = &a.yelp_api_key {
        adapters.insert(
            AuditProvider::Yelp,
            Arc::new(YelpAdapter::new(
                a.yelp_base_url.clone(),
                key.clone(),
                session.clone(),
                timeout,
            )),
        );
    }
    adapters.insert(
        AuditProvider::Michelin,
        Arc::new(MichelinAdapter::new(
            a.michelin_base_url.clone(),
            session.clone(),
            timeout,
        )),
    );
    adapters.insert(
        AuditProvider::Infatuation,
        Arc::new(InfatuationAdapter::new(
            a.infatuation_base_url.clone(),
            session.clone(),
            timeout,
        )),
    );

    Ok(AuditEngine::new(
        app.venues.clone(),
        app.ratings.clone(),
        app.audits.clone(),
        adapters,
        build_detection(config, &session)?,
        config.clone(),
    ))
}

fn cmd_init(config: &Config) -> anyhow::Result<()> {
    std::fs::create_dir_all(&config.data_dir)?;
    open(config)?;
    println!(
        "{} Initialized database at {}",
        style("✓").green(),
        config.db_path().display()
    );
    Ok(())
}

fn cmd_venue_add(
    config: &Config,
    id: String,
    name: String,
    city: Option<String>,
    website: Option<String>,
    lat: Option<f64>,
    lng: Option<f64>,
) -> anyhow::Result<()> {
    let app = open(config)?;
    // Preserve existing reservation state when re-adding.
    let mut venue = app
        .venues
        .get(&id)?
        .unwrap_or_else(|| Venue::new(id.clone(), name.clone()));
    venue.name = name;
    venue.city = city;
    venue.website_url = website;
    venue.lat = lat;
    venue.lng = lng;
    app.venues.save(&venue)?;
    println!("{} Saved venue {}", style("✓").green(), venue.id);
    Ok(())
}

fn cmd_venue_list(config: &Config) -> anyhow::Result<()> {
    let app = open(config)?;
    let venues = app.venues.get_all()?;
    if venues.is_empty() {
        println!("No venues tracked. Add one with 'tablescout venue add'.");
        return Ok(());
    }

    println!(
        "{:<16} {:<28} {:<14} {:<12} {:>7}",
        style("ID").bold(),
        style("NAME").bold(),
        style("CITY").bold(),
        style("PROVIDER").bold(),
        style("WINDOW").bold(),
    );
    for venue in venues {
        let r = &venue.reservation;
        println!(
            "{:<16} {:<28} {:<14} {:<12} {:>7}",
            truncate(&venue.id, 16),
            truncate(&venue.name, 28),
            truncate(venue.city.as_deref().unwrap_or("-"), 14),
            r.provider.map(|p| p.as_str()).unwrap_or("-"),
            r.opening_window_days
                .map(|d| format!("{d}d"))
                .unwrap_or_else(|| "-".to_string()),
        );
    }
    Ok(())
}

async fn cmd_detect(config: &Arc<Config>, venue_id: &str) -> anyhow::Result<()> {
    let app = open(config)?;
    let venue = match app.venues.get(venue_id)? {
        Some(v) => v,
        None => {
            println!("{} Unknown venue '{}'", style("!").yellow(), venue_id);
            return Ok(());
        }
    };

    let session = SessionId::generate();
    let engine = build_detection(config, &session)?;

    let spinner = spinner(format!("Detecting reservation platform for {}", venue.name));
    let result = engine
        .detect(
            &venue,
            venue.website_url.as_deref(),
            None,
            Utc::now().date_naive(),
        )
        .await?;
    spinner.finish_and_clear();

    let mut fields = venue.reservation.clone();
    fields.apply(&result, Utc::now());
    app.venues.update_reservation(&venue.id, &fields)?;

    match result.provider {
        Some(p) => println!("{} Provider: {}", style("✓").green(), style(p.as_str()).bold()),
        None => println!("{} No reservation provider detected", style("!").yellow()),
    }
    if let Some(url) = &result.booking_url {
        println!("  Booking URL:  {url}");
    }
    if let Some(id) = &result.external_id {
        println!("  External ID:  {id}");
    }
    if let Some(days) = result.opening_window_days {
        println!("  Booking window: {days} days");
    }
    if let Some(date) = result.last_available_date {
        println!("  Bookable through: {date}");
    }
    if let Some(time) = result.opening_time {
        println!("  Opens at: {}", time.format("%H:%M"));
    }
    for signal in &result.signals {
        println!("  {} {signal}", style("·").dim());
    }
    Ok(())
}

async fn cmd_cover(config: &Arc<Config>, venue_id: &str) -> anyhow::Result<()> {
    let app = open(config)?;
    let engine = build_audit_engine(config, &app)?;

    let spinner = spinner(format!("Initiating coverage for {venue_id}"));
    let scheduled = engine.initiate_coverage(venue_id, Utc::now()).await?;
    spinner.finish_and_clear();

    println!(
        "{} Coverage initiated: {}",
        style("✓").green(),
        scheduled
            .iter()
            .map(|p| p.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    Ok(())
}

async fn cmd_sweep(
    config: &Arc<Config>,
    provider: &str,
    limit: Option<usize>,
) -> anyhow::Result<()> {
    let provider = AuditProvider::from_str(provider).ok_or_else(|| {
        anyhow::anyhow!("unknown provider '{provider}' (google, michelin, yelp, infatuation, reservation)")
    })?;
    let app = open(config)?;
    let engine = build_audit_engine(config, &app)?;

    let spinner = spinner(format!("Sweeping {} audits", provider.as_str()));
    let summary = engine.run_sweep(provider, Utc::now(), limit).await?;
    spinner.finish_and_clear();

    println!(
        "{} Sweep complete: {summary}",
        if summary.failed == 0 {
            style("✓").green()
        } else {
            style("!").yellow()
        }
    );
    Ok(())
}

fn cmd_status(config: &Config) -> anyhow::Result<()> {
    if !config.db_path().exists() {
        println!(
            "{} System not initialized. Run 'tablescout init' first.",
            style("!").yellow()
        );
        return Ok(());
    }
    let app = open(config)?;
    let now = Utc::now();

    println!("\n{}", style("Tablescout Status").bold());
    println!("{}", "-".repeat(40));
    println!("{:<20} {}", "Data Directory:", config.data_dir.display());
    println!("{:<20} {}", "Venues:", app.venues.get_all()?.len());
    println!("{:<20} {}", "Rating rows:", app.ratings.count()?);

    println!("\n{}", style("Due audits").bold());
    for provider in AuditProvider::all() {
        let due = app.audits.due_count(provider, now)?;
        if due > 0 {
            println!("{:<20} {}", format!("  {}:", provider.as_str()), due);
        }
    }
    Ok(())
}

fn spinner(message: String) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner} {msg}").expect("static template must parse"),
    );
    bar.set_message(message);
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        format!("{}...", &s[..max - 3])
    }
}
