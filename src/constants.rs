pub const RADAR_TABLE_URL: &str = "http://www.ncdc.noaa.gov/homr/file/nexrad-stations.txt";
pub const RADAR_KMZ_URL: &str = "http://www.ncdc.noaa.gov/oa/radar/nexrad.kmz";
pub const METAR_STATIONS_URL: &str = "http://weather.noaa.gov/data/nsd_cccc.txt";
pub const METAR_ALLOW_LIST_URL: &str = "https://w1.weather.gov/xml/current_obs/index.xml";
pub const ZONE_INDEX_URL: &str = "http://www.nws.noaa.gov/geodata/catalog/wsom/html/cntyzone.htm";
pub const ZONE_INDEX_MARKER: &str = "Download Text File";

/// Published copies of the three tables.
pub const DEFAULT_MIRROR_URL: &str = "https://raw.githubusercontent.com/ian-weisser/data/master/";

pub const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));
