use chrono::NaiveDate;
use clap::{Parser, Subcommand};

use crate::constants::DEFAULT_MIRROR_URL;

const DEFAULT_DATA_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/data");

#[derive(Parser, Debug)]
#[command(name = "weather_db")]
#[command(about = "Weather location tables (radar, METAR, forecast zones) and nearest lookup", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Download the upstream listings and rewrite the normalized tables.
    Build(BuildArgs),
    /// Print the closest radar, observation station and forecast zone.
    Nearest(NearestArgs),
    /// Print the stock source configuration as JSON.
    Config(ConfigArgs),
}

#[derive(clap::Args, Debug, Clone)]
pub struct BuildArgs {
    /// Directory the tables are written to.
    #[arg(long, default_value = DEFAULT_DATA_DIR)]
    pub data_dir: String,

    /// HTTP cache directory (defaults to <data-dir>/cache).
    #[arg(long)]
    pub cache_dir: Option<String>,

    /// JSON source configuration; see the `config` command.
    #[arg(long)]
    pub config: Option<String>,

    /// Rewrite tables even when upstream reports no change.
    #[arg(long)]
    pub force: bool,

    /// Also build the retired KMZ radar feed.
    #[arg(long)]
    pub include_legacy: bool,

    /// Treat this date (YYYY-MM-DD) as today when picking dated releases.
    #[arg(long)]
    pub as_of: Option<NaiveDate>,
}

#[derive(clap::Args, Debug, Clone)]
pub struct NearestArgs {
    #[arg(long, default_value_t = 43.01, allow_hyphen_values = true)]
    pub lat: f64,

    #[arg(long, default_value_t = -87.99, allow_hyphen_values = true)]
    pub lon: f64,

    /// Half-width of the search box, in degrees.
    #[arg(long, default_value_t = 5.0)]
    pub half_width: f64,

    /// Directory holding the built tables.
    #[arg(long, default_value = DEFAULT_DATA_DIR)]
    pub data_dir: String,

    #[arg(long)]
    pub config: Option<String>,

    /// Read the published tables instead of the local ones.
    #[arg(long)]
    pub mirror: bool,

    #[arg(long, default_value = DEFAULT_MIRROR_URL)]
    pub mirror_url: String,

    /// HTTP cache directory for mirror downloads (defaults to <data-dir>/cache).
    #[arg(long)]
    pub cache_dir: Option<String>,
}

#[derive(clap::Args, Debug, Clone)]
pub struct ConfigArgs {
    /// Include the retired KMZ radar feed.
    #[arg(long)]
    pub include_legacy: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_negative_longitude_and_date() {
        let args = Args::try_parse_from([
            "weather_db", "nearest", "--lat", "41.98", "--lon", "-87.90", "--mirror",
        ])
        .unwrap();
        let Command::Nearest(nearest) = args.cmd else {
            panic!("expected nearest");
        };
        assert_eq!(nearest.lon, -87.90);
        assert!(nearest.mirror);
        assert_eq!(nearest.half_width, 5.0);

        let args =
            Args::try_parse_from(["weather_db", "build", "--as-of", "2024-06-01", "--force"])
                .unwrap();
        let Command::Build(build) = args.cmd else {
            panic!("expected build");
        };
        assert_eq!(build.as_of, NaiveDate::from_ymd_opt(2024, 6, 1));
        assert!(build.force);
    }
}
