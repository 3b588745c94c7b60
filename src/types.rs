use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One trading session summary
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ohlc {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl Ohlc {
    pub const fn new(open: f64, high: f64, low: f64, close: f64) -> Self {
        Self { open, high, low, close }
    }

    /// Floor pivot: (H + L + C) / 3. Open is ignored.
    pub fn pivot(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }
}

/// Where the session inputs came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    #[default]
    Manual,
    Excel,
    GoogleSheet,
}

impl std::fmt::Display for DataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataSource::Manual => write!(f, "manual"),
            DataSource::Excel => write!(f, "excel"),
            DataSource::GoogleSheet => write!(f, "google_sheet"),
        }
    }
}

impl std::str::FromStr for DataSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "manual" => Ok(DataSource::Manual),
            "excel" => Ok(DataSource::Excel),
            "google_sheet" => Ok(DataSource::GoogleSheet),
            other => Err(format!("unknown data source: {}", other)),
        }
    }
}

/// Inputs to the level engine.
///
/// Every field carries its own default so a partially stored record
/// deserializes into a complete structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionData {
    /// Morning window (9:15 - 12:30)
    pub session1: Ohlc,
    /// Afternoon window (12:30 - 15:30)
    pub session2: Ohlc,
    #[serde(rename = "dataSource")]
    pub data_source: DataSource,
    #[serde(rename = "excelZones")]
    pub excel_zones: Vec<Zone>,
    #[serde(rename = "googleSheetId")]
    pub google_sheet_id: String,
}

pub const DEFAULT_SESSION1: Ohlc = Ohlc::new(21500.0, 21600.0, 21450.0, 21550.0);
pub const DEFAULT_SESSION2: Ohlc = Ohlc::new(21550.0, 21650.0, 21520.0, 21620.0);

impl Default for SessionData {
    fn default() -> Self {
        Self {
            session1: DEFAULT_SESSION1,
            session2: DEFAULT_SESSION2,
            data_source: DataSource::Manual,
            excel_zones: Vec::new(),
            google_sheet_id: String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoneType {
    Demand,
    Supply,
    /// Not yet classified against pivot 2
    Neural,
}

impl std::fmt::Display for ZoneType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ZoneType::Demand => write!(f, "demand"),
            ZoneType::Supply => write!(f, "supply"),
            ZoneType::Neural => write!(f, "neural"),
        }
    }
}

/// A derived or imported price level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub level: f64,
    #[serde(rename = "type")]
    pub zone_type: ZoneType,
    /// Offset percentage that produced the zone, 0 for points rules and imports
    #[serde(default)]
    pub percentage: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(rename = "ruleId", default, skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl Zone {
    /// Copy of this zone moved into a display bucket under a new label
    pub fn classified(&self, zone_type: ZoneType, label: String) -> Self {
        Self {
            zone_type,
            label: Some(label),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleBase {
    Pivot1,
    #[default]
    Pivot2,
    Average,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleUnit {
    #[default]
    Percent,
    Points,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleDirection {
    #[default]
    Add,
    Subtract,
}

/// User or assistant authored offset rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeuralRule {
    pub id: String,
    pub name: String, // e.g. "Golden Pocket"
    pub base: RuleBase,
    pub value: f64,
    pub unit: RuleUnit,
    pub direction: RuleDirection, // add = above, subtract = below
    pub color: String,
    /// Inactive rules stay stored but never reach a calculation
    #[serde(rename = "isActive")]
    pub is_active: bool,
}

impl NeuralRule {
    /// New active rule with a freshly assigned id
    pub fn new(
        name: impl Into<String>,
        base: RuleBase,
        value: f64,
        unit: RuleUnit,
        direction: RuleDirection,
        color: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            base,
            value,
            unit,
            direction,
            color: color.into(),
            is_active: true,
        }
    }
}

/// Plain-text principle handed to the assistant verbatim
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogicRule {
    pub id: String,
    pub content: String,
    #[serde(rename = "isActive")]
    pub is_active: bool,
}

impl LogicRule {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            content: content.into(),
            is_active: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Bias {
    Buy,
    Sell,
    Neutral,
}

impl std::fmt::Display for Bias {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Bias::Buy => write!(f, "BUY"),
            Bias::Sell => write!(f, "SELL"),
            Bias::Neutral => write!(f, "NEUTRAL"),
        }
    }
}

/// Engine output snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculatedLevels {
    pub pivot1: f64,
    pub pivot2: f64,
    pub bias: Bias,
    #[serde(rename = "demandZones")]
    pub demand_zones: Vec<Zone>,
    #[serde(rename = "supplyZones")]
    pub supply_zones: Vec<Zone>,
    /// Rule-derived and imported zones, unclassified
    #[serde(rename = "neuralZones")]
    pub neural_zones: Vec<Zone>,
    #[serde(rename = "allZonesSorted")]
    pub all_zones_sorted: Vec<Zone>,
    #[serde(rename = "lastUpdated")]
    pub last_updated: String,
}

impl CalculatedLevels {
    /// Equality over everything except the display timestamp
    pub fn same_levels(&self, other: &Self) -> bool {
        self.pivot1.to_bits() == other.pivot1.to_bits()
            && self.pivot2.to_bits() == other.pivot2.to_bits()
            && self.bias == other.bias
            && zones_identical(&self.demand_zones, &other.demand_zones)
            && zones_identical(&self.supply_zones, &other.supply_zones)
            && zones_identical(&self.neural_zones, &other.neural_zones)
            && zones_identical(&self.all_zones_sorted, &other.all_zones_sorted)
    }

    /// Closest supply zone above pivot 2
    pub fn nearest_supply(&self) -> Option<&Zone> {
        self.supply_zones.last()
    }

    /// Closest demand zone at or below pivot 2
    pub fn nearest_demand(&self) -> Option<&Zone> {
        self.demand_zones.first()
    }
}

// Bitwise on levels so NaN outputs still compare equal to themselves
fn zones_identical(a: &[Zone], b: &[Zone]) -> bool {
    a.len() == b.len()
        && a.iter().zip(b).all(|(x, y)| {
            x.level.to_bits() == y.level.to_bits()
                && x.percentage.to_bits() == y.percentage.to_bits()
                && x.zone_type == y.zone_type
                && x.label == y.label
                && x.rule_id == y.rule_id
                && x.color == y.color
        })
}
