use serde::{Deserialize, Serialize};
use std::fmt;

/// Reference record for one listed symbol, as served by the data source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instrument {
    #[serde(alias = "tradingsymbol")]
    pub symbol: String,
    #[serde(default)]
    pub segment: String,
    #[serde(default = "default_instrument_type")]
    pub instrument_type: String,
    #[serde(default)]
    pub name: Option<String>,
}

fn default_instrument_type() -> String {
    EQUITY_INSTRUMENT_TYPE.to_string()
}

pub const EQUITY_INSTRUMENT_TYPE: &str = "EQ";

impl Instrument {
    pub fn equity(symbol: &str, segment: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            segment: segment.to_string(),
            instrument_type: EQUITY_INSTRUMENT_TYPE.to_string(),
            name: None,
        }
    }

    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(&self.symbol)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Sector {
    Technology,
    Healthcare,
    Financial,
    Automotive,
    Materials,
    Energy,
    #[serde(rename = "Consumer Goods")]
    ConsumerGoods,
    Industrial,
    Other,
}

impl Sector {
    pub fn label(self) -> &'static str {
        match self {
            Sector::Technology => "Technology",
            Sector::Healthcare => "Healthcare",
            Sector::Financial => "Financial",
            Sector::Automotive => "Automotive",
            Sector::Materials => "Materials",
            Sector::Energy => "Energy",
            Sector::ConsumerGoods => "Consumer Goods",
            Sector::Industrial => "Industrial",
            Sector::Other => "Other",
        }
    }
}

impl fmt::Display for Sector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
