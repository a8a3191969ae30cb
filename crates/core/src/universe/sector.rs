use crate::domain::Sector;

/// Well-known NSE names per sector. An exact hit here beats every keyword rule.
const CURATED: &[(Sector, &[&str])] = &[
    (
        Sector::Technology,
        &[
            "TCS", "INFY", "WIPRO", "HCLTECH", "TECHM", "LTIM", "MPHASIS", "COFORGE",
            "PERSISTENT", "OFSS", "KPITTECH", "TATAELXSI", "CYIENT", "ZENSARTECH",
        ],
    ),
    (
        Sector::Healthcare,
        &[
            "SUNPHARMA", "DRREDDY", "CIPLA", "DIVISLAB", "APOLLOHOSP", "LUPIN", "AUROPHARMA",
            "BIOCON", "TORNTPHARM", "ALKEM", "ZYDUSLIFE", "GLENMARK", "MAXHEALTH", "FORTIS",
        ],
    ),
    (
        Sector::Financial,
        &[
            "HDFCBANK", "ICICIBANK", "SBIN", "KOTAKBANK", "AXISBANK", "BAJFINANCE", "BAJAJFINSV",
            "INDUSINDBK", "HDFCLIFE", "SBILIFE", "ICICIGI", "CHOLAFIN", "MUTHOOTFIN", "PFC",
            "RECLTD", "SHRIRAMFIN",
        ],
    ),
    (
        Sector::Automotive,
        &[
            "MARUTI", "TATAMOTORS", "M&M", "BAJAJ-AUTO", "HEROMOTOCO", "EICHERMOT", "TVSMOTOR",
            "ASHOKLEY", "BOSCHLTD", "MOTHERSON", "BALKRISIND", "MRF", "EXIDEIND",
        ],
    ),
    (
        Sector::Materials,
        &[
            "TATASTEEL", "JSWSTEEL", "HINDALCO", "VEDL", "SAIL", "JINDALSTEL", "NMDC",
            "ULTRACEMCO", "GRASIM", "SHREECEM", "AMBUJACEM", "ACC", "NATIONALUM", "HINDZINC",
        ],
    ),
    (
        Sector::Energy,
        &[
            "RELIANCE", "ONGC", "NTPC", "POWERGRID", "BPCL", "IOC", "GAIL", "COALINDIA",
            "TATAPOWER", "ADANIGREEN", "HINDPETRO", "PETRONET", "OIL", "NHPC",
        ],
    ),
    (
        Sector::ConsumerGoods,
        &[
            "HINDUNILVR", "ITC", "NESTLEIND", "BRITANNIA", "DABUR", "MARICO", "GODREJCP",
            "COLPAL", "TATACONSUM", "TITAN", "ASIANPAINT", "PIDILITIND", "VBL", "TRENT",
        ],
    ),
    (
        Sector::Industrial,
        &[
            "AIAENG", "SIEMENS", "ABB", "BEL", "HAL", "BHEL", "CUMMINSIND", "THERMAX", "POLYCAB",
            "HAVELLS", "ADANIPORTS", "CGPOWER", "KEI", "BHARATFORG", "TECHNOE",
        ],
    ),
];

/// One keyword rule: the symbol contains any of `keywords` → `sector`.
#[derive(Debug, Clone, Copy)]
pub struct SectorRule {
    pub keywords: &'static [&'static str],
    pub sector: Sector,
}

impl SectorRule {
    pub fn matches(&self, symbol: &str) -> bool {
        self.keywords.iter().any(|k| symbol.contains(k))
    }
}

/// Evaluated top to bottom, first match wins.
pub const KEYWORD_RULES: &[SectorRule] = &[
    SectorRule {
        keywords: &["BANK", "FIN", "NBFC"],
        sector: Sector::Financial,
    },
    SectorRule {
        keywords: &["PHARMA", "DRUG", "MED", "BIO"],
        sector: Sector::Healthcare,
    },
    SectorRule {
        keywords: &["AUTO", "MOTOR"],
        sector: Sector::Automotive,
    },
    SectorRule {
        keywords: &["STEEL", "METAL"],
        sector: Sector::Materials,
    },
    SectorRule {
        keywords: &["OIL", "GAS", "PETRO"],
        sector: Sector::Energy,
    },
    SectorRule {
        keywords: &["TECH", "INFO", "SOFT", "COMP"],
        sector: Sector::Technology,
    },
];

pub fn classify(symbol: &str) -> Sector {
    classify_with(symbol, KEYWORD_RULES)
}

pub fn classify_with(symbol: &str, rules: &[SectorRule]) -> Sector {
    let symbol = symbol.trim().to_ascii_uppercase();

    if let Some(sector) = curated_sector(&symbol) {
        return sector;
    }

    rules
        .iter()
        .find(|rule| rule.matches(&symbol))
        .map(|rule| rule.sector)
        .unwrap_or(Sector::Other)
}

fn curated_sector(symbol: &str) -> Option<Sector> {
    CURATED
        .iter()
        .find(|(_, symbols)| symbols.contains(&symbol))
        .map(|(sector, _)| *sector)
}
