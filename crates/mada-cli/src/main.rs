use anyhow::{anyhow, Context, Result};
use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use clap::{Parser, Subcommand};
use env_logger::Env;
use mada_storage::{EntityStore, StoreFile};
use mada_sync::config::load_source_registry;
use mada_sync::queries::{self, MatchView};
use mada_sync::{resolve_match_date, ConflictScanner, SyncConfig};
use serde::Serialize;

#[derive(Debug, Parser)]
#[command(name = "mada-cli")]
#[command(about = "Interclub match date archive")]
struct Cli {
    /// Print machine-readable JSON instead of text.
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Merge every enabled snapshot source into the store.
    Sync,
    /// List same-day clashes of the current season.
    Scan {
        #[arg(long)]
        team: Option<String>,
    },
    /// Matches of the next days.
    Upcoming {
        #[arg(long, default_value_t = 7)]
        days: i64,
    },
    /// Matches around a local day (YYYY-MM-DD).
    OnDate {
        day: NaiveDate,
        #[arg(long, default_value_t = 0)]
        plusminus: i64,
    },
    /// Every match of one team.
    Team { name: String },
    /// Kickoff times seen at a venue.
    Venue { name: String },
    /// Schedule changes of a match, by its result url.
    History { url: String },
    /// Category breakdown of a played match, by its result url.
    Result { url: String },
}

struct Workspace {
    store: EntityStore,
    tz: Tz,
}

async fn open_workspace() -> Result<Workspace> {
    let config = SyncConfig::from_env();
    let registry = load_source_registry(&config).await?;
    let tz = config.resolve_timezone(&registry)?;
    let store = StoreFile::new(config.store_path.clone()).load().await?;
    Ok(Workspace { store, tz })
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("serializing output")?
    );
    Ok(())
}

fn print_matches(json: bool, views: &[MatchView]) -> Result<()> {
    if json {
        return print_json(&views);
    }
    for v in views {
        println!(
            "{}  {} - {}  @ {}",
            v.kickoff.format("%a %Y-%m-%d %H:%M"),
            v.home_team,
            v.away_team,
            v.location.as_deref().unwrap_or("?")
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Sync) {
        Commands::Sync => {
            let summary = mada_sync::run_sync_once_from_env().await?;
            if cli.json {
                return print_json(&summary);
            }
            println!(
                "sync complete: run_id={} sources={} records={} failures={} clashes={} reports={}",
                summary.run_id,
                summary.enabled_sources,
                summary.records,
                summary.failures.len(),
                summary.clashes,
                summary.reports_dir
            );
        }
        Commands::Scan { team } => {
            let ws = open_workspace().await?;
            let scanner = ConflictScanner::new(ws.tz);
            let window = scanner.season_window(Utc::now().with_timezone(&ws.tz).date_naive());
            let clashes = match team {
                Some(name) => {
                    let id = ws
                        .store
                        .find_team(&name)
                        .ok_or_else(|| anyhow!("unknown team `{name}`"))?;
                    scanner.scan_team(ws.store.data(), id, window)?
                }
                None => scanner.scan_all(ws.store.data(), window)?,
            };
            if cli.json {
                return print_json(&clashes);
            }
            for clash in &clashes {
                println!(
                    "{:?}  {}  {} ({} matches)",
                    clash.severity,
                    clash.day,
                    clash.team_name,
                    clash.matches.len()
                );
            }
        }
        Commands::Upcoming { days } => {
            let ws = open_workspace().await?;
            let views = queries::upcoming(ws.store.data(), &ws.tz, Utc::now(), days)?;
            print_matches(cli.json, &views)?;
        }
        Commands::OnDate { day, plusminus } => {
            let ws = open_workspace().await?;
            let views = queries::around_day(ws.store.data(), &ws.tz, day, plusminus)?;
            print_matches(cli.json, &views)?;
        }
        Commands::Team { name } => {
            let ws = open_workspace().await?;
            let id = ws
                .store
                .find_team(&name)
                .ok_or_else(|| anyhow!("unknown team `{name}`"))?;
            let views = queries::team_matches(ws.store.data(), &ws.tz, id)?;
            print_matches(cli.json, &views)?;
        }
        Commands::Venue { name } => {
            let ws = open_workspace().await?;
            let id = ws
                .store
                .find_location(&name)
                .ok_or_else(|| anyhow!("unknown location `{name}`"))?;
            let times = queries::usual_match_times(ws.store.data(), &ws.tz, id)?;
            if cli.json {
                return print_json(&times);
            }
            for t in &times {
                println!("{} {}  x{}", t.weekday, t.time.format("%H:%M"), t.matches);
            }
        }
        Commands::History { url } => {
            let ws = open_workspace().await?;
            let id = resolve_match_date(ws.store.data(), &url)?;
            let history = queries::match_history(ws.store.data(), id)?;
            if cli.json {
                return print_json(&history);
            }
            for change in &history.changes {
                println!(
                    "was   {}  (archived {})",
                    change.date_time.with_timezone(&ws.tz).format("%a %Y-%m-%d %H:%M"),
                    change.archived_at.format("%Y-%m-%d")
                );
            }
            println!(
                "now   {}",
                history
                    .current
                    .date_time
                    .with_timezone(&ws.tz)
                    .format("%a %Y-%m-%d %H:%M")
            );
        }
        Commands::Result { url } => {
            let ws = open_workspace().await?;
            let id = resolve_match_date(ws.store.data(), &url)?;
            let Some(view) = queries::match_result_view(ws.store.data(), id)? else {
                println!("no result merged yet");
                return Ok(());
            };
            if cli.json {
                return print_json(&view);
            }
            println!(
                "{}:{}{}",
                view.result.home_points,
                view.result.away_points,
                if view.result.walkover { " (walkover)" } else { "" }
            );
            for row in &view.rows {
                println!(
                    "{:<4} {} vs {}  {}",
                    row.category,
                    row.home.join("/"),
                    row.away.join("/"),
                    row.points
                );
            }
        }
    }

    Ok(())
}
