//! Level computation from session data and neural rules
//!
//! Produces:
//! - Pivot 1 / Pivot 2: (H + L + C) / 3 of each session
//! - Bias: BUY when pivot 2 is above pivot 1, SELL below, NEUTRAL otherwise
//! - Ladder zones, rule zones and imported zones, sorted high to low

use chrono::Local;
use tracing::debug;

use super::ladder::{ladder_label, LADDER_PERCENTAGES};
use crate::types::{
    Bias, CalculatedLevels, DataSource, NeuralRule, RuleBase, RuleDirection, RuleUnit,
    SessionData, Zone, ZoneType,
};

const RULE_PREFIX: &str = "[AI] ";
const IMPORT_PREFIX: &str = "[XLS] ";

/// Compute the full pivot structure.
///
/// Pure apart from the `last_updated` display stamp. Non-finite inputs are
/// not rejected; they flow through to the output levels.
pub fn compute(data: &SessionData, rules: &[NeuralRule]) -> CalculatedLevels {
    let pivot1 = data.session1.pivot();
    let pivot2 = data.session2.pivot();
    let pivot_avg = (pivot1 + pivot2) / 2.0;

    let bias = compute_bias(pivot1, pivot2);

    let mut supply_zones = Vec::new();
    let mut demand_zones = Vec::new();
    let mut neural_zones = Vec::new();

    // Standard ladder, always around pivot 2
    for pct in LADDER_PERCENTAGES {
        let label = ladder_label(pct);
        supply_zones.push(Zone {
            level: pivot2 * (1.0 + pct / 100.0),
            zone_type: ZoneType::Supply,
            percentage: pct,
            label: Some(label.to_string()),
            rule_id: None,
            color: None,
        });
        demand_zones.push(Zone {
            level: pivot2 * (1.0 - pct / 100.0),
            zone_type: ZoneType::Demand,
            percentage: pct,
            label: Some(label.to_string()),
            rule_id: None,
            color: None,
        });
    }

    for rule in rules.iter().filter(|r| r.is_active) {
        let base = match rule.base {
            RuleBase::Pivot1 => pivot1,
            RuleBase::Pivot2 => pivot2,
            RuleBase::Average => pivot_avg,
        };
        let zone = rule_zone(rule, base);
        let label = format!("{}{}", RULE_PREFIX, rule.name);

        classify_into(&zone, label, pivot2, &mut supply_zones, &mut demand_zones);
        neural_zones.push(zone);
    }

    if data.data_source == DataSource::Excel && !data.excel_zones.is_empty() {
        for zone in &data.excel_zones {
            let label = format!("{}{}", IMPORT_PREFIX, zone.label.as_deref().unwrap_or_default());

            classify_into(zone, label, pivot2, &mut supply_zones, &mut demand_zones);
            neural_zones.push(zone.clone());
        }
    }

    sort_descending(&mut supply_zones);
    sort_descending(&mut demand_zones);

    let mut all_zones_sorted: Vec<Zone> = supply_zones.iter().chain(&demand_zones).cloned().collect();
    sort_descending(&mut all_zones_sorted);

    debug!(
        "Computed levels: P1={:.2}, P2={:.2}, bias={}, supply={}, demand={}, neural={}",
        pivot1,
        pivot2,
        bias,
        supply_zones.len(),
        demand_zones.len(),
        neural_zones.len()
    );

    CalculatedLevels {
        pivot1,
        pivot2,
        bias,
        demand_zones,
        supply_zones,
        neural_zones,
        all_zones_sorted,
        last_updated: Local::now().format("%H:%M:%S").to_string(),
    }
}

/// Strict comparison, no tolerance band. NaN on either side is NEUTRAL.
pub fn compute_bias(pivot1: f64, pivot2: f64) -> Bias {
    if pivot2 > pivot1 {
        Bias::Buy
    } else if pivot2 < pivot1 {
        Bias::Sell
    } else {
        Bias::Neutral
    }
}

/// Stable sort, highest level first. Equal levels keep insertion order;
/// NaN levels are pushed to the ends instead of breaking the order.
pub fn sort_descending(zones: &mut [Zone]) {
    // + 0.0 folds -0.0 into +0.0 so signed zeros tie
    zones.sort_by(|a, b| (b.level + 0.0).total_cmp(&(a.level + 0.0)));
}

fn rule_zone(rule: &NeuralRule, base: f64) -> Zone {
    let adjustment = match rule.unit {
        RuleUnit::Points => rule.value,
        RuleUnit::Percent => base * (rule.value / 100.0),
    };
    let level = match rule.direction {
        RuleDirection::Add => base + adjustment,
        RuleDirection::Subtract => base - adjustment,
    };

    Zone {
        level,
        zone_type: ZoneType::Neural,
        percentage: match rule.unit {
            RuleUnit::Points => 0.0,
            RuleUnit::Percent => rule.value,
        },
        label: Some(rule.name.clone()),
        rule_id: Some(rule.id.clone()),
        color: Some(rule.color.clone()),
    }
}

// Threshold is pivot 2 whatever anchor produced the zone
fn classify_into(zone: &Zone, label: String, pivot2: f64, supply: &mut Vec<Zone>, demand: &mut Vec<Zone>) {
    if zone.level > pivot2 {
        supply.push(zone.classified(ZoneType::Supply, label));
    } else {
        demand.push(zone.classified(ZoneType::Demand, label));
    }
}
