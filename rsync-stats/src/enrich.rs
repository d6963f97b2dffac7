use std::sync::Arc;

use common_geoip::{GeoIpClient, Location};
use geohash::Coord;
use metrics::counter;
use thiserror::Error;
use tracing::warn;

use crate::metrics_consts::GEOIP_PROCESSED;
use crate::types::GeoTag;

pub const DEFAULT_GEOHASH_PRECISION: usize = 12;
pub const MAX_GEOHASH_PRECISION: usize = 12;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum EnrichError {
    #[error("geohash precision must be between 1 and {MAX_GEOHASH_PRECISION}, got {0}")]
    InvalidPrecision(usize),
}

/// Anything that can turn a client address into coordinates.
pub trait GeoLookup {
    fn locate(&self, ip: &str) -> Option<Location>;
}

impl GeoLookup for GeoIpClient {
    fn locate(&self, ip: &str) -> Option<Location> {
        self.get_location(ip)
    }
}

pub type GeoLookupRef = Arc<dyn GeoLookup + Send + Sync>;

/// Result of tagging one address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Located {
    pub tag: GeoTag,
    pub fallback: bool,
}

pub struct Enricher {
    lookup: GeoLookupRef,
    precision: usize,
    fallback: GeoTag,
}

impl Enricher {
    /// Fails for precisions the geohash encoder would reject, so a bad setting
    /// cannot turn every lookup into a fallback.
    pub fn new(
        lookup: GeoLookupRef,
        precision: usize,
        fallback: GeoTag,
    ) -> Result<Self, EnrichError> {
        if !(1..=MAX_GEOHASH_PRECISION).contains(&precision) {
            return Err(EnrichError::InvalidPrecision(precision));
        }

        Ok(Self {
            lookup,
            precision,
            fallback,
        })
    }

    /// Geohash and city for the address. Never fails: addresses the database
    /// cannot place get the fallback location.
    pub fn locate(&self, ip: &str) -> Located {
        let Some(location) = self.lookup.locate(ip) else {
            warn!(ip, "GeoIP lookup failed, using fallback location");
            counter!(GEOIP_PROCESSED, "outcome" => "lookup_failed").increment(1);
            return self.fallback();
        };

        let coord = Coord {
            x: location.longitude,
            y: location.latitude,
        };
        match geohash::encode(coord, self.precision) {
            Ok(geohash) => {
                counter!(GEOIP_PROCESSED, "outcome" => "resolved").increment(1);
                Located {
                    tag: GeoTag {
                        geohash,
                        city: location.city.unwrap_or_default(),
                    },
                    fallback: false,
                }
            }
            Err(e) => {
                warn!(ip, error = %e, "could not geohash location, using fallback location");
                counter!(GEOIP_PROCESSED, "outcome" => "encode_failed").increment(1);
                self.fallback()
            }
        }
    }

    fn fallback(&self) -> Located {
        Located {
            tag: self.fallback.clone(),
            fallback: true,
        }
    }
}
