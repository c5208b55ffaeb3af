//! Descriptors: the named inputs of linear models.

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::debug;

use catalog_store::{CatalogStore, DescriptorRecord};
use coverage_common::{CatalogError, CatalogResult};

use crate::lock;

/// Statistical distribution of a descriptor's values.
///
/// Only `Normal` values can be substituted algebraically; the others are
/// transformed before entering a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Distribution {
    Normal,
    LogNormal,
    Amplitude,
}

impl Distribution {
    /// True when values are used as-is.
    pub fn is_identity(&self) -> bool {
        matches!(self, Distribution::Normal)
    }
}

impl FromStr for Distribution {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "normal" | "" => Ok(Distribution::Normal),
            "lognormal" | "log-normal" => Ok(Distribution::LogNormal),
            "amplitude" => Ok(Distribution::Amplitude),
            other => Err(CatalogError::invalid_record(
                "descriptors",
                format!("unknown distribution '{}'", other),
            )),
        }
    }
}

/// Spatio-temporal displacement applied when sampling a descriptor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LocationOffset {
    /// Days.
    pub dt: f64,
    pub dx: f64,
    pub dy: f64,
    pub dz: f64,
}

impl LocationOffset {
    pub fn is_identity(&self) -> bool {
        self.dt == 0.0 && self.dx == 0.0 && self.dy == 0.0 && self.dz == 0.0
    }

    fn to_bits(self) -> [u64; 4] {
        [self.dt.to_bits(), self.dx.to_bits(), self.dy.to_bits(), self.dz.to_bits()]
    }
}

impl Eq for LocationOffset {}

impl Hash for LocationOffset {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.to_bits().hash(state);
    }
}

/// A named scalar quantity: phenomenon × procedure × band × offset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Descriptor {
    pub name: String,
    pub phenomenon: String,
    pub procedure: String,
    pub band: i16,
    pub offset: LocationOffset,
    pub distribution: Distribution,
}

const IDENTITY_NAME: &str = "①";

impl Descriptor {
    /// The constant descriptor, always valued 1.
    pub fn identity() -> Self {
        Self {
            name: IDENTITY_NAME.to_string(),
            phenomenon: "identity".to_string(),
            procedure: "identity".to_string(),
            band: 0,
            offset: LocationOffset::default(),
            distribution: Distribution::Normal,
        }
    }

    pub fn is_identity(&self) -> bool {
        self.name == IDENTITY_NAME && self.offset.is_identity()
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl TryFrom<DescriptorRecord> for Descriptor {
    type Error = CatalogError;

    fn try_from(record: DescriptorRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            distribution: record.distribution.parse()?,
            name: record.name,
            phenomenon: record.phenomenon,
            procedure: record.procedure,
            band: record.band,
            offset: LocationOffset {
                dt: record.dt,
                dx: record.dx,
                dy: record.dy,
                dz: record.dz,
            },
        })
    }
}

/// Resolves descriptors by name from the catalog store.
///
/// A lenient table retries a failed lookup by numeric identifier, then with
/// trailing digits written as subscripts ("sst2" becomes "sst₂").
pub struct DescriptorTable {
    store: Arc<dyn CatalogStore>,
    lenient: bool,
    cache: Mutex<HashMap<String, Arc<Descriptor>>>,
}

impl DescriptorTable {
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self {
            store,
            lenient: false,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Enable the numeric-identifier and subscript fallbacks.
    pub fn lenient(mut self) -> Self {
        self.lenient = true;
        self
    }

    /// Get a descriptor by name.
    pub async fn get(&self, name: &str) -> CatalogResult<Arc<Descriptor>> {
        if let Some(descriptor) = lock(&self.cache).get(name) {
            return Ok(descriptor.clone());
        }

        let descriptor = match self.get_strict(name).await {
            Err(CatalogError::NotFound { .. }) if self.lenient => self.get_fallback(name).await?,
            other => other?,
        };

        let descriptor = lock(&self.cache)
            .entry(name.to_string())
            .or_insert(descriptor)
            .clone();
        Ok(descriptor)
    }

    async fn get_strict(&self, name: &str) -> CatalogResult<Arc<Descriptor>> {
        let mut records = self.store.descriptors_named(name).await?;
        match records.len() {
            0 => Err(CatalogError::not_found("descriptor", name)),
            1 => {
                let record = records.remove(0);
                Ok(Arc::new(Descriptor::try_from(record)?))
            }
            n => Err(CatalogError::invalid_record(
                "descriptors",
                format!("{} descriptors are named '{}'", n, name),
            )),
        }
    }

    async fn get_fallback(&self, name: &str) -> CatalogResult<Arc<Descriptor>> {
        if let Ok(id) = name.trim().parse::<i64>() {
            if let Some(record) = self.store.descriptor_by_id(id).await? {
                debug!(name, id, "Resolved descriptor by identifier");
                return Ok(Arc::new(Descriptor::try_from(record)?));
            }
        }

        let subscripted = subscript_trailing_digits(name);
        if subscripted != name {
            debug!(name, subscripted = %subscripted, "Retrying descriptor with subscript digits");
            return self.get_strict(&subscripted).await;
        }

        Err(CatalogError::not_found("descriptor", name))
    }
}

/// Replace the trailing ASCII digits of `name` by Unicode subscripts.
pub fn subscript_trailing_digits(name: &str) -> String {
    let digits = name.chars().rev().take_while(|c| c.is_ascii_digit()).count();
    let split = name.len() - digits;
    let (head, tail) = name.split_at(split);
    let mut result = String::with_capacity(name.len() + digits * 2);
    result.push_str(head);
    for c in tail.chars() {
        let offset = c as u32 - '0' as u32;
        result.push(char::from_u32(0x2080 + offset).unwrap_or(c));
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog_store::MemoryCatalogStore;

    fn record(id: i64, name: &str) -> DescriptorRecord {
        DescriptorRecord {
            id,
            name: name.to_string(),
            phenomenon: "SST".to_string(),
            procedure: "AVHRR".to_string(),
            band: 1,
            dt: 0.0,
            dx: 0.0,
            dy: 0.0,
            dz: 0.0,
            distribution: "normal".to_string(),
        }
    }

    #[test]
    fn test_subscript_trailing_digits() {
        assert_eq!(subscript_trailing_digits("sst12"), "sst₁₂");
        assert_eq!(subscript_trailing_digits("chl"), "chl");
        assert_eq!(subscript_trailing_digits("a1b"), "a1b");
    }

    #[test]
    fn test_identity() {
        assert!(Descriptor::identity().is_identity());
        assert!(Distribution::Normal.is_identity());
        assert!(!"lognormal".parse::<Distribution>().unwrap().is_identity());
        assert!("weibull".parse::<Distribution>().is_err());
    }

    #[tokio::test]
    async fn test_strict_lookup() {
        let store = MemoryCatalogStore::new()
            .with_descriptor(record(1, "sst"))
            .with_descriptor(record(2, "dup"))
            .with_descriptor(record(3, "dup"));
        let table = DescriptorTable::new(Arc::new(store));

        assert_eq!(table.get("sst").await.unwrap().name, "sst");
        assert!(matches!(table.get("dup").await, Err(CatalogError::InvalidRecord { .. })));
        assert!(matches!(table.get("sst2").await, Err(CatalogError::NotFound { .. })));
        assert!(matches!(table.get("1").await, Err(CatalogError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_lenient_lookup() {
        let store = MemoryCatalogStore::new()
            .with_descriptor(record(7, "chl"))
            .with_descriptor(record(8, "sst₂"));
        let table = DescriptorTable::new(Arc::new(store)).lenient();

        assert_eq!(table.get("7").await.unwrap().name, "chl");
        assert_eq!(table.get("sst2").await.unwrap().name, "sst₂");
        assert!(matches!(table.get("wind").await, Err(CatalogError::NotFound { .. })));
    }
}
