use anyhow::{Context, Result, bail};
use chrono::Utc;
use std::io::{self, BufRead, Write};
use tracing::{info, warn};

use headcount_monitor::cli::{Cli, Command, HelpOnly};
use headcount_monitor::config::AppConfig;
use headcount_monitor::export::SYNTHETIC_NOTICE;
use headcount_monitor::logging::{self, LogTarget};
use headcount_monitor::service::Monitor;
use headcount_monitor::ui;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();
    if cli.version {
        println!("headcount-monitor {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let mut config = AppConfig::load(cli.config.as_deref()).context("loading configuration")?;
    config.apply_cli_overrides(&cli);
    config.validate()?;

    let command = cli
        .command
        .unwrap_or(Command::Dashboard(HelpOnly::default()));
    let dashboard_on_tty =
        matches!(command, Command::Dashboard(_)) && atty::is(atty::Stream::Stdout);
    let target = if dashboard_on_tty {
        LogTarget::Discard
    } else {
        LogTarget::Stderr
    };
    logging::init(&config.logging, target)?;

    if let Command::ShowConfig(_) = command {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    let mut monitor = Monitor::from_config(config)?;

    match command {
        Command::Dashboard(_) if !dashboard_on_tty => {
            warn!("stdout is not a terminal, running in watch mode");
            monitor.run_watch().await?;
        }
        Command::Dashboard(_) => {
            let user = monitor.auth().require()?;
            ui::run_dashboard(&mut monitor, user.map(|u| u.username)).await?;
        }
        Command::Watch(_) => monitor.run_watch().await?,
        Command::List(_) => list(&monitor),
        Command::Add(opts) => {
            let sensor = monitor.add_stream(&opts.name, &opts.stream_url)?;
            println!("Added {} ({})", sensor.name, sensor.id);
            println!("  stream: {}", sensor.stream_uri);
            println!("  stats:  {}", sensor.stats_uri);
        }
        Command::Remove(opts) => {
            if opts.id.is_empty() {
                bail!("missing stream id (see `headcount-monitor list`)");
            }
            let label = monitor
                .registry()
                .get(&opts.id)
                .map(|s| format!("{} ({})", s.name, s.id))
                .unwrap_or_else(|| opts.id.clone());

            if !opts.yes && !confirm(&format!("Delete {}?", label))? {
                println!("Cancelled");
                return Ok(());
            }
            let removed = monitor.remove_stream(&opts.id)?;
            println!("Deleted {} ({})", removed.name, removed.id);
        }
        Command::Export(opts) => {
            if opts.id.is_empty() {
                bail!("missing stream id (see `headcount-monitor list`)");
            }
            let range = opts.range.unwrap_or_default();
            let output_dir = opts
                .output
                .unwrap_or_else(|| monitor.config().export.output_dir.clone());

            let report = monitor.export(&opts.id, range, &output_dir, Utc::now()).await?;
            println!("Wrote {} rows to {}", report.rows, report.path.display());
            eprintln!("Note: {}", SYNTHETIC_NOTICE);
        }
        Command::Login(opts) => {
            let gate = monitor.auth();
            if !gate.is_enabled() {
                println!("No credentials configured; the dashboard is open");
                return Ok(());
            }
            let username = match opts.username {
                Some(username) => username,
                None => prompt("Username: ")?,
            };
            let password = match opts.password {
                Some(password) => password,
                None => prompt("Password: ")?,
            };
            let user = gate.login(&username, &password)?;
            println!("Logged in as {}", user.username);
        }
        Command::Logout(_) => {
            monitor.auth().logout()?;
            println!("Logged out");
        }
        Command::ShowConfig(_) => {}
    }

    info!("Done");
    Ok(())
}

fn list(monitor: &Monitor) {
    println!("{:<24} {:<24} {:<9} STREAM", "ID", "NAME", "KIND");
    for sensor in monitor.registry().entries() {
        let kind = if sensor.is_custom() { "custom" } else { "built-in" };
        println!(
            "{:<24} {:<24} {:<9} {}",
            sensor.id, sensor.name, kind, sensor.stream_uri
        );
    }
}

fn prompt(label: &str) -> io::Result<String> {
    print!("{}", label);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn confirm(question: &str) -> io::Result<bool> {
    let answer = prompt(&format!("{} [y/N] ", question))?;
    Ok(matches!(answer.to_ascii_lowercase().as_str(), "y" | "yes"))
}
