use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Where a unit cost came from. Manual entries beat bulk imports, which
/// beat platform-provided values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostSource {
    Manual,
    Imported,
    Platform,
}

impl CostSource {
    pub fn precedence(&self) -> u8 {
        match self {
            Self::Manual => 3,
            Self::Imported => 2,
            Self::Platform => 1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Imported => "imported",
            Self::Platform => "platform",
        }
    }
}

impl FromStr for CostSource {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "manual" => Ok(Self::Manual),
            "imported" => Ok(Self::Imported),
            "platform" => Ok(Self::Platform),
            other => Err(format!("unknown cost source `{other}`")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VariantCost {
    pub variant_id: String,
    pub unit_cost: Decimal,
    pub source: CostSource,
    pub updated_at: DateTime<Utc>,
}

/// Variant-id keyed cost mapping. A variant absent from the map has an
/// unknown cost, which is never treated as zero.
#[derive(Clone, Debug, Default)]
pub struct CostLookup {
    costs: HashMap<String, VariantCost>,
}

impl CostLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_costs(costs: Vec<VariantCost>) -> Self {
        let mut lookup = Self::new();
        for cost in costs {
            lookup.upsert(cost);
        }
        lookup
    }

    /// Insert or replace a cost entry. An existing entry from a
    /// higher-precedence source wins over the incoming one.
    pub fn upsert(&mut self, cost: VariantCost) {
        match self.costs.get(&cost.variant_id) {
            Some(existing) if existing.source.precedence() > cost.source.precedence() => {}
            _ => {
                self.costs.insert(cost.variant_id.clone(), cost);
            }
        }
    }

    pub fn unit_cost(&self, variant_id: &str) -> Option<Decimal> {
        self.costs.get(variant_id).map(|cost| cost.unit_cost)
    }

    pub fn get(&self, variant_id: &str) -> Option<&VariantCost> {
        self.costs.get(variant_id)
    }

    pub fn len(&self) -> usize {
        self.costs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.costs.is_empty()
    }
}

/// Result of parsing a delimited cost import file.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CostImportReport {
    pub imported: Vec<(String, Decimal)>,
    pub skipped_lines: Vec<usize>,
}

/// Parse a `variant_id,unit_cost` delimited text payload. Blank lines and
/// `#` comments are ignored; malformed lines are skipped per-line and
/// reported, never aborting the whole import.
pub fn parse_cost_import(input: &str) -> CostImportReport {
    let mut report = CostImportReport::default();

    for (index, raw) in input.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let mut parts = line.splitn(2, [',', '\t', ';']);
        let variant_id = parts.next().map(str::trim).unwrap_or_default();
        let cost = parts.next().map(str::trim).and_then(|value| Decimal::from_str(value).ok());

        match (variant_id.is_empty(), cost) {
            (false, Some(cost)) if cost >= Decimal::ZERO => {
                report.imported.push((variant_id.to_string(), cost));
            }
            _ => report.skipped_lines.push(index + 1),
        }
    }

    report
}
