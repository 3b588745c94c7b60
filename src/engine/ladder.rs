//! Standard zone ladder

/// Percent offsets from pivot 2 (0.2611 means 0.2611%)
pub const LADDER_PERCENTAGES: [f64; 4] = [0.2611, 0.50, 0.7389, 1.00];

/// Label for offsets outside the ladder table
pub const FALLBACK_LABEL: &str = "CRITICAL STRUCTURE";

const LADDER_LABELS: [(f64, &str); 4] = [
    (0.2611, "OPERATOR TRAP"),
    (0.50, "INSTITUTIONAL WALL"),
    (0.7389, "BANK LEVEL"),
    (1.00, "VOLATILITY CAP"),
];

/// Display label for a ladder percentage
pub fn ladder_label(pct: f64) -> &'static str {
    LADDER_LABELS
        .iter()
        .find(|(p, _)| *p == pct)
        .map(|(_, label)| *label)
        .unwrap_or(FALLBACK_LABEL)
}
