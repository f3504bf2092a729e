//! CLI for Rainbow Finder.
//!
//! Pipeline: resolve location -> fetch forecast -> score hours (parallel) ->
//! merge windows -> viewing geometry -> filter/notify -> report.

mod config;

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use config::AppConfig;
use rainbow_analyzer::reporter::PredictionReport;
use rainbow_analyzer::sink::json_stream::JsonStreamSink;
use rainbow_analyzer::solar::{day_night_cycle, solar_intensity, sun_position};
use rainbow_analyzer::{Coordinator, NotificationCenter, UserStore};
use rainbow_core::error::{RainbowError, RainbowResult};
use rainbow_core::{Location, NotificationChannel, UserPreferences};
use rainbow_provider::{gazetteer, OpenMeteoProvider, StaticProvider, WeatherService};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "rainbow", version, about = "Rainbow forecasting from weather and sun position")]
struct Cli {
    /// TOML config file.
    #[arg(long, env = "RAINBOW_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Weather source; overrides the config file.
    #[arg(long, global = true, value_parser = ["open-meteo", "static"])]
    provider: Option<String>,

    /// User profile store (JSON).
    #[arg(long, env = "RAINBOW_USERS", global = true, default_value = "rainbow-users.json")]
    users: PathBuf,

    /// Print JSON instead of the human-readable report.
    #[arg(long, global = true, default_value_t = false)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Where to look: coordinates or a known place name.
#[derive(Args, Debug, Clone)]
#[group(required = true, multiple = false)]
struct Target {
    /// Coordinates as "lat,lng".
    #[arg(long, allow_hyphen_values = true)]
    location: Option<Location>,

    /// A place from the built-in gazetteer, e.g. "Kerry Park".
    #[arg(long)]
    place: Option<String>,
}

impl Target {
    fn resolve(&self) -> RainbowResult<Location> {
        match (&self.location, &self.place) {
            (Some(loc), _) => Ok(loc.clone()),
            (None, Some(place)) => gazetteer::geocode(place)
                .ok_or_else(|| RainbowError::NotFound(format!("unknown place '{place}'"))),
            (None, None) => Err(RainbowError::InvalidInput("no location given".into())),
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Predict rainbow windows for a location.
    Predict {
        #[command(flatten)]
        target: Target,

        /// Forecast horizon in hours.
        #[arg(long)]
        hours: Option<u32>,

        /// Filter by this user's preferences and notify them.
        #[arg(long)]
        user: Option<String>,

        /// Sink output: "ndjson" writes NDJSON to stdout,
        /// "ndjson:/path/to/file" writes to file.
        #[arg(long)]
        sink: Option<String>,
    },

    /// Current weather, forecast, and whether conditions favor rainbows.
    Weather {
        #[command(flatten)]
        target: Target,

        #[arg(long, default_value_t = 12)]
        hours: u32,
    },

    /// Sun position, day/night cycle, and clear-sky intensity.
    Sun {
        #[command(flatten)]
        target: Target,

        /// RFC 3339 instant; defaults to now.
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },

    /// Resolve a place name or "lat,lng" to coordinates.
    Geocode {
        #[arg(allow_hyphen_values = true)]
        address: String,
    },

    /// Re-run predictions periodically and notify stored users (Ctrl-C stops).
    Watch {
        /// Repeatable; place names or "lat,lng".
        #[arg(long = "location", required = true, allow_hyphen_values = true)]
        locations: Vec<String>,

        #[arg(long)]
        hours: Option<u32>,

        #[arg(long)]
        interval_minutes: Option<u64>,
    },

    /// Manage user profiles.
    User {
        #[command(subcommand)]
        action: UserCommand,
    },
}

#[derive(Subcommand, Debug)]
enum UserCommand {
    /// Print a user's profile.
    Show { user_id: String },

    /// Update preferences; unspecified fields keep their current value.
    Set {
        user_id: String,

        #[arg(long)]
        min_probability: Option<f64>,

        #[arg(long)]
        max_distance_km: Option<f64>,

        #[arg(long)]
        lead_time_minutes: Option<u32>,

        #[arg(long)]
        notifications: Option<bool>,

        /// The user's home location as "lat,lng".
        #[arg(long, allow_hyphen_values = true)]
        location: Option<Location>,
    },

    /// Add or replace a named favorite location.
    Favorite {
        user_id: String,
        name: String,

        #[arg(long, allow_hyphen_values = true)]
        location: Location,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    // Validated once, after every override has been applied.
    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(p) = &cli.provider {
        config.weather.provider = p.clone();
    }
    config.validate()?;

    let users = Arc::new(UserStore::load(&cli.users)?);

    match cli.command {
        Commands::Predict {
            target,
            hours,
            user,
            sink,
        } => {
            let location = target.resolve()?;
            let hours = hours.unwrap_or(config.prediction.hours);
            let coordinator = build_coordinator(&config, users.clone())?;

            tracing::info!(
                %location,
                hours,
                provider = %config.weather.provider,
                "starting prediction"
            );
            let outcome = coordinator
                .run_prediction(&location, hours, user.as_deref())
                .await?;

            let report = PredictionReport::build(
                &location,
                &outcome.predictions,
                outcome.fetch_time,
                outcome.total_time,
            );

            if let Some(ref sink_spec) = sink {
                let (summary, rows) = report.to_rows(&outcome.predictions);

                if sink_spec == "ndjson" {
                    let mut s = JsonStreamSink::stdout();
                    s.write_summary(&summary)?;
                    s.write_predictions(&rows)?;
                    let n = s.finish()?;
                    tracing::info!(rows = n, "ndjson sink: wrote to stdout");
                } else if let Some(path) = sink_spec.strip_prefix("ndjson:") {
                    let file = std::fs::File::create(path)?;
                    let mut s = JsonStreamSink::new(file);
                    s.write_summary(&summary)?;
                    s.write_predictions(&rows)?;
                    let n = s.finish()?;
                    tracing::info!(rows = n, path, "ndjson sink: wrote to file");
                } else {
                    return Err(RainbowError::InvalidInput(format!(
                        "unknown sink '{sink_spec}'; use 'ndjson' or 'ndjson:/path'"
                    ))
                    .into());
                }

                // Still print report to stderr so it's visible.
                eprint!("{}", report.render());
            } else if cli.json {
                println!("{}", serde_json::to_string_pretty(&outcome.to_json())?);
            } else {
                print!("{}", report.render());
                for n in &outcome.notifications {
                    println!("notification {} [{:?}] {}", n.id, n.status, n.title);
                }
            }

            if user.is_some() {
                users.save(&cli.users)?;
            }
        }

        Commands::Weather { target, hours } => {
            let location = target.resolve()?;
            let coordinator = build_coordinator(&config, users.clone())?;
            let report = coordinator.weather_report(&location, hours).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                let w = &report.current;
                println!("Weather near {}", report.location);
                println!(
                    "  now: {:.1}°C, humidity {:.0}%, rain {:.1} mm/h, clouds {:.0}%, wind {:.0} km/h from {:.0}°",
                    w.temperature,
                    w.humidity,
                    w.precipitation,
                    w.cloud_cover,
                    w.wind_speed,
                    w.wind_direction
                );
                println!(
                    "  rainbow conditions: {} ({})",
                    if report.rainbow_favorable { "favorable" } else { "unfavorable" },
                    report.explanation
                );
                println!(
                    "  favorable forecast hours: {}/{}",
                    report.favorable_hours,
                    report.forecast.len()
                );
            }
        }

        Commands::Sun { target, at } => {
            let location = target.resolve()?;
            let at = at.unwrap_or_else(Utc::now);
            let sun = sun_position(&location, at);
            let cycle = day_night_cycle(&location, at.date_naive());
            let intensity = solar_intensity(&location, at);

            if cli.json {
                let out = serde_json::json!({
                    "location": location,
                    "sun_position": sun,
                    "antisolar_azimuth": sun.antisolar_azimuth(),
                    "day_night_cycle": cycle,
                    "solar_intensity": intensity,
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                let fmt = |t: Option<DateTime<Utc>>| {
                    t.map(|t| t.format("%H:%M UTC").to_string())
                        .unwrap_or_else(|| "-".into())
                };
                println!("Sun at {} for {}", at.to_rfc3339(), location);
                println!("  azimuth:      {:.2}°", sun.azimuth);
                println!("  elevation:    {:.2}°", sun.elevation);
                println!("  rainbows face {:.0}°", sun.antisolar_azimuth());
                println!("  intensity:    {:.0} W/m²", intensity);
                println!("  civil dawn:   {}", fmt(cycle.civil_twilight_begin));
                println!("  sunrise:      {}", fmt(cycle.sunrise));
                println!("  golden end:   {}", fmt(cycle.golden_hour_end));
                println!("  golden start: {}", fmt(cycle.golden_hour_begin));
                println!("  sunset:       {}", fmt(cycle.sunset));
                println!("  civil dusk:   {}", fmt(cycle.civil_twilight_end));
            }
        }

        Commands::Geocode { address } => {
            let location = gazetteer::geocode(&address)
                .ok_or_else(|| RainbowError::NotFound(format!("could not geocode '{address}'")))?;
            let nearest = gazetteer::reverse_geocode(&location, 25.0);

            if cli.json {
                let out = serde_json::json!({
                    "location": location,
                    "nearest_place": nearest.map(|p| p.name),
                    "region": nearest.map(|p| p.region),
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                println!("{location}");
                if let Some(p) = nearest {
                    println!("  near {} ({})", p.name, p.region);
                }
            }
        }

        Commands::Watch {
            locations,
            hours,
            interval_minutes,
        } => {
            let resolved = locations
                .iter()
                .map(|s| {
                    gazetteer::geocode(s)
                        .ok_or_else(|| RainbowError::NotFound(format!("could not geocode '{s}'")))
                })
                .collect::<RainbowResult<Vec<_>>>()?;
            let hours = hours.unwrap_or(config.prediction.hours);
            let interval = Duration::from_secs(
                interval_minutes.unwrap_or(config.notifications.interval_minutes).max(1) * 60,
            );
            let coordinator = build_coordinator(&config, users.clone())?;

            let summary = coordinator
                .watch(&resolved, hours, Some(interval), async {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        tracing::warn!(error = %e, "ctrl-c handler failed");
                        std::future::pending::<()>().await;
                    }
                })
                .await?;

            println!(
                "watched {} location(s) for {} tick(s): {} prediction(s), {} notification(s), {} failure(s)",
                resolved.len(),
                summary.ticks,
                summary.predictions,
                summary.notifications,
                summary.failures
            );
        }

        Commands::User { action } => {
            run_user_command(action, &users, &cli.users, cli.json)?;
        }
    }

    Ok(())
}

fn run_user_command(
    action: UserCommand,
    users: &UserStore,
    store_path: &Path,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let user_id = match &action {
        UserCommand::Show { user_id }
        | UserCommand::Set { user_id, .. }
        | UserCommand::Favorite { user_id, .. } => user_id.clone(),
    };

    match action {
        UserCommand::Show { .. } => {}
        UserCommand::Set {
            min_probability,
            max_distance_km,
            lead_time_minutes,
            notifications,
            location,
            ..
        } => {
            let current = users.get_preferences(&user_id);
            let prefs = UserPreferences {
                min_probability: min_probability.unwrap_or(current.min_probability),
                max_distance_km: max_distance_km.unwrap_or(current.max_distance_km),
                notification_lead_time_minutes: lead_time_minutes
                    .unwrap_or(current.notification_lead_time_minutes),
                notification_enabled: notifications.unwrap_or(current.notification_enabled),
                favorite_locations: current.favorite_locations,
            };
            users.update_preferences(&user_id, prefs)?;
            if let Some(loc) = location {
                users.set_location(&user_id, loc);
            }
            users.save(store_path)?;
        }
        UserCommand::Favorite { name, location, .. } => {
            users.add_favorite_location(&user_id, location, &name)?;
            users.save(store_path)?;
        }
    }

    let profile = users.profile(&user_id).unwrap_or_default();
    let mut out = std::io::stdout().lock();
    if json {
        writeln!(out, "{}", serde_json::to_string_pretty(&profile)?)?;
    } else {
        let p = &profile.preferences;
        writeln!(out, "user {user_id}")?;
        writeln!(out, "  min probability:   {:.2}", p.min_probability)?;
        writeln!(out, "  max distance:      {:.1} km", p.max_distance_km)?;
        let enabled = if p.notification_enabled { "on" } else { "off" };
        writeln!(out, "  notifications:     {enabled}")?;
        writeln!(out, "  lead time:         {} min", p.notification_lead_time_minutes)?;
        match &profile.location {
            Some(loc) => writeln!(out, "  location:          {loc}")?,
            None => writeln!(out, "  location:          -")?,
        }
        for fav in &p.favorite_locations {
            writeln!(out, "  favorite:          {fav}")?;
        }
    }
    Ok(())
}

fn build_weather(config: &AppConfig) -> RainbowResult<WeatherService> {
    let service =
        WeatherService::with_ttl(Duration::from_secs(config.weather.cache_ttl_minutes * 60));
    match config.weather.provider.as_str() {
        "static" => service.register_weather_provider("static", Arc::new(StaticProvider::new())),
        "open-meteo" => service.register_weather_provider(
            "open-meteo",
            Arc::new(OpenMeteoProvider::new(&config.weather.base_url)?),
        ),
        other => {
            return Err(RainbowError::Config(format!("unknown weather provider '{other}'")));
        }
    }
    Ok(service)
}

fn build_notifier(config: &AppConfig) -> RainbowResult<NotificationCenter> {
    let center = NotificationCenter::new();
    if config.notifications.channel != NotificationChannel::Webhook {
        return Ok(center);
    }

    #[cfg(feature = "webhook")]
    {
        let url = config
            .notifications
            .webhook_url
            .clone()
            .ok_or_else(|| RainbowError::Config("webhook channel needs a webhook_url".into()))?;
        Ok(center.with_dispatcher(
            NotificationChannel::Webhook,
            Arc::new(rainbow_analyzer::WebhookDispatcher::new(url)),
        ))
    }
    #[cfg(not(feature = "webhook"))]
    {
        let _ = center;
        Err(RainbowError::Config(
            "webhook channel requires building with the `webhook` feature".into(),
        ))
    }
}

fn build_coordinator(config: &AppConfig, users: Arc<UserStore>) -> RainbowResult<Coordinator> {
    Ok(Coordinator::new(
        Arc::new(build_weather(config)?),
        users,
        Arc::new(build_notifier(config)?),
    )
    .with_settings(config.prediction.settings.clone())
    .with_channel(config.notifications.channel)
    .with_concurrency(config.weather.concurrency))
}
