//! Command-line interface argument parsing.
//!
//! Global options come first, then an optional subcommand; without one the
//! dashboard starts (or `watch`, when stdout is not a terminal).

use gumdrop::Options;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::export::TimeRange;

/// Log level for the application
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Directive understood by `EnvFilter`
    pub fn to_filter_string(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(format!(
                "Invalid log level: {other}. Valid values: trace, debug, info, warn, error"
            )),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_filter_string())
    }
}

/// Live head-count telemetry for networked vision sensors
#[derive(Debug, Options)]
pub struct Cli {
    #[options(help = "print help message")]
    pub help: bool,

    #[options(no_short, help = "print version and exit")]
    pub version: bool,

    #[options(help = "path to configuration file", meta = "PATH")]
    pub config: Option<PathBuf>,

    #[options(short = "l", help = "log level: trace, debug, info, warn, error", meta = "LEVEL")]
    pub log_level: Option<LogLevel>,

    #[options(short = "i", help = "telemetry poll interval in milliseconds", meta = "MS")]
    pub poll_interval_ms: Option<u64>,

    #[options(no_short, help = "path to the storage file", meta = "PATH")]
    pub storage: Option<PathBuf>,

    #[options(command)]
    pub command: Option<Command>,
}

#[derive(Debug, Options)]
pub enum Command {
    #[options(help = "interactive terminal dashboard (default)")]
    Dashboard(HelpOnly),

    #[options(help = "log connectivity changes for every sensor until interrupted")]
    Watch(HelpOnly),

    #[options(help = "list configured streams")]
    List(HelpOnly),

    #[options(help = "add a custom stream: add <NAME> <STREAM_URL>")]
    Add(AddOpts),

    #[options(help = "remove a custom stream: remove <ID>")]
    Remove(RemoveOpts),

    #[options(help = "export a stream's telemetry as CSV: export <ID>")]
    Export(ExportOpts),

    #[options(help = "log in to the dashboard")]
    Login(LoginOpts),

    #[options(help = "forget the stored login")]
    Logout(HelpOnly),

    #[options(help = "print the effective configuration as TOML")]
    ShowConfig(HelpOnly),
}

#[derive(Debug, Default, Options)]
pub struct HelpOnly {
    #[options(help = "print help message")]
    pub help: bool,
}

#[derive(Debug, Default, Options)]
pub struct AddOpts {
    #[options(help = "print help message")]
    pub help: bool,

    #[options(free, help = "display name")]
    pub name: String,

    #[options(free, help = "MJPEG stream URL, e.g. http://host:5000/stream")]
    pub stream_url: String,
}

#[derive(Debug, Default, Options)]
pub struct RemoveOpts {
    #[options(help = "print help message")]
    pub help: bool,

    #[options(help = "skip the confirmation prompt")]
    pub yes: bool,

    #[options(free, help = "id of the custom stream")]
    pub id: String,
}

#[derive(Debug, Default, Options)]
pub struct ExportOpts {
    #[options(help = "print help message")]
    pub help: bool,

    #[options(help = "time range: 1day, 7days, 1month, 3months, 6months", meta = "RANGE")]
    pub range: Option<TimeRange>,

    #[options(help = "output directory (overrides export.output_dir)", meta = "DIR")]
    pub output: Option<PathBuf>,

    #[options(free, help = "stream id")]
    pub id: String,
}

#[derive(Debug, Default, Options)]
pub struct LoginOpts {
    #[options(help = "print help message")]
    pub help: bool,

    #[options(help = "username", meta = "NAME")]
    pub username: Option<String>,

    #[options(help = "password (prompted when omitted)", meta = "PASSWORD")]
    pub password: Option<String>,
}

impl Cli {
    /// Parse process arguments, printing usage and exiting on error or `--help`
    pub fn parse_args() -> Self {
        Self::parse_args_default_or_exit()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::parse_args_default(args).unwrap()
    }

    #[test]
    fn test_log_level_conversion() {
        assert_eq!(LogLevel::Info.to_filter_string(), "info");
        assert_eq!(LogLevel::Debug.to_filter_string(), "debug");
        assert_eq!("WARNING".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert!("loud".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_default_values() {
        let cli = parse(&[]);
        assert!(cli.command.is_none());
        assert!(cli.config.is_none());
        assert!(cli.log_level.is_none());
        assert!(!cli.version);
    }

    #[test]
    fn test_global_overrides() {
        let cli = parse(&["-c", "site.toml", "-l", "debug", "-i", "500", "--storage", "s.json", "list"]);
        assert_eq!(cli.config, Some(PathBuf::from("site.toml")));
        assert_eq!(cli.log_level, Some(LogLevel::Debug));
        assert_eq!(cli.poll_interval_ms, Some(500));
        assert_eq!(cli.storage, Some(PathBuf::from("s.json")));
        assert!(matches!(cli.command, Some(Command::List(_))));
    }

    #[test]
    fn test_add_takes_positional_args() {
        let cli = parse(&["add", "Cam X", "http://h/stream"]);
        match cli.command {
            Some(Command::Add(opts)) => {
                assert_eq!(opts.name, "Cam X");
                assert_eq!(opts.stream_url, "http://h/stream");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_export_options() {
        let cli = parse(&["export", "gate2_exit", "-r", "7days", "-o", "/tmp/out"]);
        match cli.command {
            Some(Command::Export(opts)) => {
                assert_eq!(opts.id, "gate2_exit");
                assert_eq!(opts.range, Some(TimeRange::SevenDays));
                assert_eq!(opts.output, Some(PathBuf::from("/tmp/out")));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_remove_with_yes() {
        let cli = parse(&["remove", "--yes", "custom_1"]);
        match cli.command {
            Some(Command::Remove(opts)) => {
                assert!(opts.yes);
                assert_eq!(opts.id, "custom_1");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_show_config_is_kebab_case() {
        let cli = parse(&["show-config"]);
        assert!(matches!(cli.command, Some(Command::ShowConfig(_))));
    }

    #[test]
    fn test_invalid_range_is_rejected() {
        assert!(Cli::parse_args_default(&["export", "x", "-r", "2days"]).is_err());
    }
}
