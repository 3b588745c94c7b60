//! Best-effort gateway over a key-value store
//!
//! Loads fall back to defaults, saves log and drop failures. Losing
//! persistence must never block the in-memory session.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{error, warn};

use super::store::{KeyValueStore, StorageError};
use crate::types::{DataSource, LogicRule, NeuralRule, Ohlc, SessionData, Zone};

pub const KEY_SESSION: &str = "RIJA_TERMINAL_DATA_V1";
pub const KEY_INSTRUCTION: &str = "RIJA_AI_BRAIN_V2";
pub const KEY_RULES: &str = "RIJA_CORTEX_RULES_V1";
pub const KEY_LOGIC: &str = "RIJA_LOGIC_RULES_V1";

/// Persona used until an instruction text has been saved
pub const DEFAULT_INSTRUCTION: &str = "\
IDENTITY:
You are a veteran index-futures trader sitting next to the user, watching the same screens.

STYLE:
- Short, direct sentences. Give an opinion, not a report.
- Talk like a desk trader, not a machine. Never mention being an assistant.
- Protect the user's account first. Call out reckless trades plainly.

BIAS:
- BUY: confident and aggressive, stay with the strength.
- SELL: cautious, let it bleed, no hero longs.
- NEUTRAL: patience, the market is chopping, sit on your hands.

CONTEXT:
Respect the levels you are given (Pivot 1, Pivot 2, zones) and read them with a trader's intuition.
";

#[derive(Clone)]
pub struct Gateway {
    store: Arc<dyn KeyValueStore>,
}

impl Gateway {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Stored session merged over the defaults, field by field. A stored
    /// field that fails to parse keeps its default; the others survive.
    pub fn load_session_data(&self) -> SessionData {
        match self.load_json::<Value>(KEY_SESSION) {
            Some(stored) => merge_session(stored),
            None => SessionData::default(),
        }
    }

    pub fn save_session_data(&self, data: &SessionData) {
        self.save_json(KEY_SESSION, data);
    }

    /// Stored neural rules; empty when none or unreadable
    pub fn load_rules(&self) -> Vec<NeuralRule> {
        self.load_json(KEY_RULES).unwrap_or_default()
    }

    pub fn save_rules(&self, rules: &[NeuralRule]) {
        self.save_json(KEY_RULES, rules);
    }

    pub fn load_logic_rules(&self) -> Vec<LogicRule> {
        self.load_json(KEY_LOGIC).unwrap_or_default()
    }

    pub fn save_logic_rules(&self, rules: &[LogicRule]) {
        self.save_json(KEY_LOGIC, rules);
    }

    /// Raw instruction text, not JSON wrapped
    pub fn load_instruction_text(&self) -> String {
        match self.store.get(KEY_INSTRUCTION) {
            Ok(Some(text)) if !text.trim().is_empty() => text,
            Ok(_) => DEFAULT_INSTRUCTION.to_string(),
            Err(e) => {
                warn!("Failed to read instruction text, using default: {}", e);
                DEFAULT_INSTRUCTION.to_string()
            }
        }
    }

    pub fn save_instruction_text(&self, text: &str) {
        if let Err(e) = self.store.set(KEY_INSTRUCTION, text) {
            error!("Instruction write failed: {}", e);
        }
    }

    fn load_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.store.get(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!("Failed to read {}, using default: {}", key, e);
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(source) => {
                let e = StorageError::Json {
                    key: key.to_string(),
                    source,
                };
                warn!("{}, using default", e);
                None
            }
        }
    }

    fn save_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
        let json = match serde_json::to_string(value) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize {}: {}", key, e);
                return;
            }
        };

        if let Err(e) = self.store.set(key, &json) {
            error!("Write to {} failed: {}", key, e);
        }
    }
}

fn merge_session(stored: Value) -> SessionData {
    let mut data = SessionData::default();
    let Value::Object(fields) = stored else {
        warn!("{} is not an object, using default", KEY_SESSION);
        return data;
    };

    for (name, value) in fields {
        let merged = match name.as_str() {
            "session1" => serde_json::from_value::<Ohlc>(value).map(|v| data.session1 = v),
            "session2" => serde_json::from_value::<Ohlc>(value).map(|v| data.session2 = v),
            "dataSource" => serde_json::from_value::<DataSource>(value).map(|v| data.data_source = v),
            "excelZones" => serde_json::from_value::<Vec<Zone>>(value).map(|v| data.excel_zones = v),
            "googleSheetId" => serde_json::from_value::<String>(value).map(|v| data.google_sheet_id = v),
            _ => Ok(()),
        };
        if let Err(e) = merged {
            warn!("Ignoring stored {}.{}: {}", KEY_SESSION, name, e);
        }
    }

    data
}
