use maxminddb::Reader;
use serde_json::Value;
use std::net::IpAddr;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum GeoIpError {
    #[error("Failed to open GeoIP database: {0}")]
    DatabaseOpenError(#[from] maxminddb::MaxMindDBError),
}

/// Coordinates and English city name for a resolved address.
#[derive(Debug, Clone, PartialEq)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    pub city: Option<String>,
}

pub struct GeoIpClient {
    reader: Reader<Vec<u8>>,
}

impl GeoIpClient {
    /// Creates a new GeoIpClient instance.
    /// Returns an error if the database can't be loaded.
    pub fn new(db_path: PathBuf) -> Result<Self, GeoIpError> {
        debug!("Attempting to open GeoIP database at: {:?}", db_path);

        let reader = Reader::open_readfile(&db_path)?;
        info!("Successfully opened GeoIP database");

        Ok(GeoIpClient { reader })
    }

    /// Resolves the given ip address to a location.
    /// Returns None for unparseable or non-routable addresses, and for addresses
    /// the database has no coordinates for.
    pub fn get_location(&self, ip: &str) -> Option<Location> {
        let addr = routable_ip(ip)?;

        match self.reader.lookup::<Value>(addr) {
            Ok(city) => extract_location(&city),
            Err(e) => {
                debug!("GeoIP lookup failed for IP {}: {}", ip, e);
                None
            }
        }
    }
}

/// Parses the address, rejecting ranges no public database can resolve.
fn routable_ip(ip: &str) -> Option<IpAddr> {
    let addr = IpAddr::from_str(ip.trim()).ok()?;

    let reserved = match addr {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.is_broadcast()
        }
        IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified(),
    };

    if reserved {
        None
    } else {
        Some(addr)
    }
}

const LATITUDE_PATH: &[&str] = &["location", "latitude"];
const LONGITUDE_PATH: &[&str] = &["location", "longitude"];
const CITY_PATH: &[&str] = &["city", "names", "en"];

fn get_nested_value<'a>(data: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut current = data;
    for &key in path {
        current = current.get(key)?;
    }
    Some(current)
}

fn extract_location(city: &Value) -> Option<Location> {
    let latitude = get_nested_value(city, LATITUDE_PATH)?.as_f64()?;
    let longitude = get_nested_value(city, LONGITUDE_PATH)?.as_f64()?;
    let city = get_nested_value(city, CITY_PATH)
        .and_then(Value::as_str)
        .map(str::to_string);

    Some(Location {
        latitude,
        longitude,
        city,
    })
}
