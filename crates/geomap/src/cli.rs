//! Command-line interface handling for geomap.
//!
//! Arguments are parsed with the `clap` builder API. Every viewport option
//! is optional and overrides the matching `[viewport]` setting from the
//! configuration file.

use clap::{value_parser, Arg, ArgMatches, Command};
use geolocation_cache::MapAnchor;
use std::ffi::OsString;
use std::path::PathBuf;

/// Command line arguments parsed from user input.
#[derive(Debug, Clone, PartialEq)]
pub struct CliArgs {
    /// Path to the configuration file
    pub config_path: PathBuf,
    /// JSON snapshot of monitored objects
    pub objects_path: Option<PathBuf>,
    /// JSON-lines file of session notifications to replay
    pub updates_path: Option<PathBuf>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub zoom: Option<u8>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub anchor: Option<MapAnchor>,
    /// Only report descendants of this object
    pub parent: Option<u64>,
    /// Case-insensitive name substring filter
    pub filter: Option<String>,
    /// Optional override for log level
    pub log_level: Option<String>,
    /// Whether to force JSON log output
    pub json_logs: bool,
}

impl CliArgs {
    /// Builds the clap command definition.
    pub fn command() -> Command {
        Command::new("geomap")
            .version(env!("CARGO_PKG_VERSION"))
            .about("Shows which monitored objects a map viewport covers")
            .arg(
                Arg::new("config")
                    .short('c')
                    .long("config")
                    .value_name("FILE")
                    .help("Configuration file path")
                    .default_value("geomap.toml"),
            )
            .arg(
                Arg::new("objects")
                    .short('o')
                    .long("objects")
                    .value_name("FILE")
                    .help("JSON array of monitored objects to start from"),
            )
            .arg(
                Arg::new("updates")
                    .short('u')
                    .long("updates")
                    .value_name("FILE")
                    .help("JSON lines of session notifications to replay"),
            )
            .arg(
                Arg::new("lat")
                    .long("lat")
                    .value_name("DEGREES")
                    .help("Latitude of the anchor point")
                    .allow_negative_numbers(true)
                    .value_parser(value_parser!(f64)),
            )
            .arg(
                Arg::new("lon")
                    .long("lon")
                    .value_name("DEGREES")
                    .help("Longitude of the anchor point")
                    .allow_negative_numbers(true)
                    .value_parser(value_parser!(f64)),
            )
            .arg(
                Arg::new("zoom")
                    .short('z')
                    .long("zoom")
                    .value_name("LEVEL")
                    .help("Zoom level (0-22)")
                    .value_parser(value_parser!(u8)),
            )
            .arg(
                Arg::new("width")
                    .long("width")
                    .value_name("PIXELS")
                    .help("Viewport width")
                    .value_parser(value_parser!(u32)),
            )
            .arg(
                Arg::new("height")
                    .long("height")
                    .value_name("PIXELS")
                    .help("Viewport height")
                    .value_parser(value_parser!(u32)),
            )
            .arg(
                Arg::new("anchor")
                    .short('a')
                    .long("anchor")
                    .value_name("ANCHOR")
                    .help("Viewport point the anchor location is pinned to (center, top-left, bottom-right)")
                    .value_parser(value_parser!(MapAnchor)),
            )
            .arg(
                Arg::new("parent")
                    .short('p')
                    .long("parent")
                    .value_name("ID")
                    .help("Only report objects below this parent")
                    .value_parser(value_parser!(u64)),
            )
            .arg(
                Arg::new("filter")
                    .short('f')
                    .long("filter")
                    .value_name("TEXT")
                    .help("Only report objects whose name contains TEXT"),
            )
            .arg(
                Arg::new("log-level")
                    .short('l')
                    .long("log-level")
                    .value_name("LEVEL")
                    .help("Log level (trace, debug, info, warn, error)"),
            )
            .arg(
                Arg::new("json-logs")
                    .long("json-logs")
                    .help("Output logs in JSON format")
                    .action(clap::ArgAction::SetTrue),
            )
    }

    /// Parses the process arguments, exiting with usage information on error.
    pub fn parse() -> Self {
        Self::from_matches(&Self::command().get_matches())
    }

    /// Parses an explicit argument list.
    pub fn try_parse_from<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        Ok(Self::from_matches(&Self::command().try_get_matches_from(args)?))
    }

    fn from_matches(matches: &ArgMatches) -> Self {
        Self {
            config_path: matches
                .get_one::<String>("config")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("geomap.toml")),
            objects_path: matches.get_one::<String>("objects").map(PathBuf::from),
            updates_path: matches.get_one::<String>("updates").map(PathBuf::from),
            latitude: matches.get_one::<f64>("lat").copied(),
            longitude: matches.get_one::<f64>("lon").copied(),
            zoom: matches.get_one::<u8>("zoom").copied(),
            width: matches.get_one::<u32>("width").copied(),
            height: matches.get_one::<u32>("height").copied(),
            anchor: matches.get_one::<MapAnchor>("anchor").copied(),
            parent: matches.get_one::<u64>("parent").copied(),
            filter: matches.get_one::<String>("filter").cloned(),
            log_level: matches.get_one::<String>("log-level").cloned(),
            json_logs: matches.get_flag("json-logs"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = CliArgs::try_parse_from(["geomap"]).unwrap();
        assert_eq!(args.config_path, PathBuf::from("geomap.toml"));
        assert_eq!(args.objects_path, None);
        assert_eq!(args.anchor, None);
        assert!(!args.json_logs);
    }

    #[test]
    fn test_full_argument_set() {
        let args = CliArgs::try_parse_from([
            "geomap",
            "--config",
            "custom.toml",
            "--objects",
            "objects.json",
            "--updates",
            "updates.jsonl",
            "--lat",
            "-33.86",
            "--lon",
            "151.21",
            "--zoom",
            "12",
            "--width",
            "800",
            "--height",
            "600",
            "--anchor",
            "top-left",
            "--parent",
            "42",
            "--filter",
            "router",
            "--log-level",
            "debug",
            "--json-logs",
        ])
        .unwrap();

        assert_eq!(args.config_path, PathBuf::from("custom.toml"));
        assert_eq!(args.objects_path, Some(PathBuf::from("objects.json")));
        assert_eq!(args.updates_path, Some(PathBuf::from("updates.jsonl")));
        assert_eq!(args.latitude, Some(-33.86));
        assert_eq!(args.longitude, Some(151.21));
        assert_eq!(args.zoom, Some(12));
        assert_eq!((args.width, args.height), (Some(800), Some(600)));
        assert_eq!(args.anchor, Some(MapAnchor::TopLeft));
        assert_eq!(args.parent, Some(42));
        assert_eq!(args.filter.as_deref(), Some("router"));
        assert_eq!(args.log_level.as_deref(), Some("debug"));
        assert!(args.json_logs);
    }

    #[test]
    fn test_rejects_unknown_anchor() {
        assert!(CliArgs::try_parse_from(["geomap", "--anchor", "middle"]).is_err());
        assert!(CliArgs::try_parse_from(["geomap", "--anchor", "7"]).is_err());
    }

    #[test]
    fn test_rejects_bad_numbers() {
        assert!(CliArgs::try_parse_from(["geomap", "--zoom", "300"]).is_err());
        assert!(CliArgs::try_parse_from(["geomap", "--lat", "north"]).is_err());
    }
}
