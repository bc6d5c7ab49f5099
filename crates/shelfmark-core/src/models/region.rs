use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Catalog marketplace a lookup is issued against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Region {
    Ca,
    Cn,
    De,
    Es,
    Fr,
    In,
    It,
    Jp,
    Uk,
    #[default]
    Us,
    Br,
    Mx,
}

impl Region {
    pub const ALL: [Region; 12] = [
        Region::Ca,
        Region::Cn,
        Region::De,
        Region::Es,
        Region::Fr,
        Region::In,
        Region::It,
        Region::Jp,
        Region::Uk,
        Region::Us,
        Region::Br,
        Region::Mx,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            Self::Ca => "CA",
            Self::Cn => "CN",
            Self::De => "DE",
            Self::Es => "ES",
            Self::Fr => "FR",
            Self::In => "IN",
            Self::It => "IT",
            Self::Jp => "JP",
            Self::Uk => "UK",
            Self::Us => "US",
            Self::Br => "BR",
            Self::Mx => "MX",
        }
    }

    /// Host of the product advertising service for this marketplace.
    pub fn service_host(&self) -> &'static str {
        match self {
            Self::Ca => "webservices.amazon.ca",
            Self::Cn => "webservices.amazon.cn",
            Self::De => "webservices.amazon.de",
            Self::Es => "webservices.amazon.es",
            Self::Fr => "webservices.amazon.fr",
            Self::In => "webservices.amazon.in",
            Self::It => "webservices.amazon.it",
            Self::Jp => "webservices.amazon.co.jp",
            Self::Uk => "webservices.amazon.co.uk",
            Self::Us => "webservices.amazon.com",
            Self::Br => "webservices.amazon.com.br",
            Self::Mx => "webservices.amazon.com.mx",
        }
    }

    /// Identifier kind the vendor id is recorded under for this marketplace.
    pub fn vendor_id_key(&self) -> String {
        match self {
            Self::Us => "amazon".to_string(),
            other => format!("amazon_{}", other.code().to_lowercase()),
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Region {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_uppercase();
        Region::ALL
            .into_iter()
            .find(|r| r.code() == wanted)
            .ok_or_else(|| CoreError::UnknownRegion(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vendor_id_key_per_region() {
        assert_eq!(Region::Us.vendor_id_key(), "amazon");
        assert_eq!(Region::Uk.vendor_id_key(), "amazon_uk");
        assert_eq!(Region::Jp.vendor_id_key(), "amazon_jp");
    }

    #[test]
    fn test_parse_region_case_insensitive() {
        assert_eq!("de".parse::<Region>().unwrap(), Region::De);
        assert_eq!(" UK ".parse::<Region>().unwrap(), Region::Uk);
        assert!("XX".parse::<Region>().is_err());
    }

    #[test]
    fn test_region_serde_uses_codes() {
        let json = serde_json::to_string(&Region::Uk).unwrap();
        assert_eq!(json, "\"UK\"");
        let back: Region = serde_json::from_str("\"MX\"").unwrap();
        assert_eq!(back, Region::Mx);
    }
}
