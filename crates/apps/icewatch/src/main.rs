use std::sync::Arc;

use clap::{Parser, Subcommand};
use foundation::geo::Position;
use foundation::time::IsoDate;
use icewatch::{run_session, Backends, Flow, Session, SessionCommand, SessionEvent, ViewerConfig};
use layers::LayerStore;
use routing::HttpRouteBackend;
use streaming::{DateIndex, HttpBackend, SnapshotStatus, YearCache, YearEvent};
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Sea-ice extent viewer core")]
struct Args {
    /// Base URL of the ice-extent API (overrides ICEWATCH_API_BASE)
    #[arg(long)]
    api_base: Option<String>,

    /// Route navigation endpoint (overrides ICEWATCH_ROUTE_URL)
    #[arg(long)]
    route_url: Option<String>,

    /// Fallback route dataset, a path or an http(s) URL
    #[arg(long)]
    fallback_route: Option<String>,

    /// Sampling radius sent with extent requests
    #[arg(long)]
    radius_km: Option<f64>,

    /// Ask the router to stay inside the ice corridor
    #[arg(long)]
    use_corridor: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the dates the API has data for
    Dates,

    /// Resolve one date and print what it shows
    Snapshot {
        /// YYYY-MM-DD; defaults to today (UTC)
        #[arg(long)]
        date: Option<IsoDate>,
    },

    /// Bulk-load a whole year into the cache
    Prefetch {
        #[arg(long)]
        year: i32,
    },

    /// Route between two points and play the animation
    Route {
        /// Start as lon,lat
        #[arg(long, allow_hyphen_values = true)]
        start: Position,

        /// End as lon,lat
        #[arg(long, allow_hyphen_values = true)]
        end: Position,

        /// YYYY-MM-DD; defaults to today (UTC)
        #[arg(long)]
        date: Option<IsoDate>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let mut config = ViewerConfig::from_env();
    if let Some(api_base) = args.api_base {
        if args.route_url.is_none() && std::env::var("ICEWATCH_ROUTE_URL").is_err() {
            config.route_url = format!("{}/route_navigation", api_base.trim_end_matches('/'));
        }
        config.api_base = api_base;
    }
    if let Some(route_url) = args.route_url {
        config.route_url = route_url;
    }
    if let Some(fallback_route) = args.fallback_route {
        config.fallback_route = fallback_route;
    }
    if let Some(radius_km) = args.radius_km {
        config.radius_km = radius_km;
    }
    config.use_corridor |= args.use_corridor;
    info!(api = %config.api_base, route = %config.route_url, "icewatch starting");

    let client = reqwest::Client::new();
    let snapshots = Arc::new(
        HttpBackend::with_client(config.api_base.clone(), client.clone())
            .with_radius_km(config.radius_km),
    );
    let backends = Backends {
        snapshots: snapshots.clone(),
        routes: Arc::new(HttpRouteBackend::with_client(
            config.route_url.clone(),
            config.fallback_source(),
            client,
        )),
    };

    match args.command {
        Command::Dates => {
            let index = DateIndex::load(snapshots.as_ref()).await?;
            println!("{} dates", index.len());
            if let (Some(first), Some(last)) = (index.first(), index.last()) {
                println!("first {first}");
                println!("last  {last}");
            }
            if let Some((from, to)) = index.year_span() {
                println!("years {from}-{to}");
            }
        }
        Command::Snapshot { date } => {
            let cache = Arc::new(YearCache::new());
            let initial = date.unwrap_or_else(IsoDate::today_utc);
            let mut session = Session::new(cache, initial, LayerStore::new(), config.use_corridor);
            let (_tx, rx) = mpsc::unbounded_channel();

            run_session(&mut session, &backends, rx, config.frame_interval, |_, s| {
                if s.index_settled() && !s.status().is_loading() {
                    Flow::Stop
                } else {
                    Flow::Continue
                }
            })
            .await;

            println!("date   {}", session.selected_date());
            match session.status() {
                SnapshotStatus::Cached(snap) | SnapshotStatus::Fetched(snap) => {
                    println!("source {} ({})", snap.meta.source, session.status().label());
                    println!("radius {} km", snap.meta.radius_km);
                    println!("features {}", snap.features.len());
                }
                SnapshotStatus::Failed(message) => println!("error  {message}"),
                SnapshotStatus::Loading => println!("still loading"),
            }
        }
        Command::Prefetch { year } => {
            let cache = YearCache::new();
            match cache.ensure_year_loaded(year, snapshots.as_ref()).await {
                Some(YearEvent::Loaded { days, .. }) => println!("{year}: {days} days cached"),
                Some(YearEvent::Failed { .. }) => println!("{year}: no data upstream"),
                Some(YearEvent::Retryable { .. }) => println!("{year}: fetch failed, retryable"),
                None => println!("{year}: nothing to fetch"),
            }
        }
        Command::Route { start, end, date } => {
            let cache = Arc::new(YearCache::new());
            let initial = date.unwrap_or_else(IsoDate::today_utc);
            let mut session = Session::new(cache, initial, LayerStore::new(), config.use_corridor);
            let (tx, rx) = mpsc::unbounded_channel();

            let mut placed = false;
            let mut resolved = None;
            run_session(&mut session, &backends, rx, config.frame_interval, |event, s| {
                match event {
                    SessionEvent::SelectionChanged { .. } | SessionEvent::IndexLoaded { .. }
                        if !placed && s.index_settled() && !s.status().is_loading() =>
                    {
                        if let Some(message) = s.status().error() {
                            println!("error  {message}");
                            return Flow::Stop;
                        }
                        placed = true;
                        // The receiver lives until the loop returns.
                        let _ = tx.send(SessionCommand::Click(start));
                        let _ = tx.send(SessionCommand::Click(end));
                    }
                    SessionEvent::RouteResolved {
                        fallback,
                        coordinates,
                    } => resolved = Some((*fallback, *coordinates)),
                    SessionEvent::RouteStatusChanged(status) => {
                        info!(%status, "route status");
                        if placed && !s.route_status().is_requesting() && resolved.is_none() {
                            println!("no route available");
                            return Flow::Stop;
                        }
                    }
                    SessionEvent::AnimationFinished => return Flow::Stop,
                    _ => {}
                }
                Flow::Continue
            })
            .await;

            if let Some((fallback, coordinates)) = resolved {
                let source = if fallback { "fallback" } else { "routed" };
                println!("date   {}", session.selected_date());
                println!("path   {coordinates} coordinates ({source})");
                println!("shown  {}", session.visible_path().len());
            }
        }
    }

    Ok(())
}
