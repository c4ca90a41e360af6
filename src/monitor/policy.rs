use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UnitThreshold {
    pub unit_id: i32,
    pub unit_name: String,
    #[serde(default)]
    pub max_temp: Option<f64>,
    #[serde(default)]
    pub min_temp: Option<f64>,
    /// Text used for the high-temperature alert, e.g. "Frozen Food Thawing".
    #[serde(default)]
    pub alert_label: Option<String>,
}

impl UnitThreshold {
    /// Returns the alert message when `temperature` is outside the configured bounds.
    pub fn breach_message(&self, temperature: f64) -> Option<String> {
        let temp = format_celsius(temperature);
        if self.max_temp.is_some_and(|max| temperature > max) {
            let label = self
                .alert_label
                .clone()
                .unwrap_or_else(|| format!("{} High Temp", self.unit_name));
            return Some(format!("Critical: {label} ({temp}°C)"));
        }
        if self.min_temp.is_some_and(|min| temperature < min) {
            return Some(format!("Critical: {} Low Temp ({temp}°C)", self.unit_name));
        }
        None
    }
}

#[derive(Debug, Deserialize)]
struct PolicyFile {
    units: Vec<UnitThreshold>,
}

/// Static per-unit breach rules. Units without an entry never alert.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdPolicy {
    units: BTreeMap<i32, UnitThreshold>,
}

impl Default for ThresholdPolicy {
    fn default() -> Self {
        Self::new(vec![
            UnitThreshold {
                unit_id: 1,
                unit_name: "Milk Storage".to_string(),
                max_temp: Some(5.0),
                min_temp: None,
                alert_label: Some("Milk Storage High Temp".to_string()),
            },
            UnitThreshold {
                unit_id: 2,
                unit_name: "Frozen Food Storage".to_string(),
                max_temp: Some(-5.0),
                min_temp: None,
                alert_label: Some("Frozen Food Thawing".to_string()),
            },
        ])
    }
}

impl ThresholdPolicy {
    pub fn new(units: impl IntoIterator<Item = UnitThreshold>) -> Self {
        Self {
            units: units.into_iter().map(|u| (u.unit_id, u)).collect(),
        }
    }

    pub fn from_json_slice(bytes: &mut [u8]) -> Result<Self> {
        let file: PolicyFile =
            simd_json::serde::from_slice(bytes).context("invalid threshold policy JSON")?;
        if let Some(unit) = file
            .units
            .iter()
            .find(|u| u.max_temp.is_none() && u.min_temp.is_none())
        {
            anyhow::bail!(
                "threshold policy for unit {} has neither max_temp nor min_temp",
                unit.unit_id
            );
        }
        let mut seen = HashSet::new();
        if let Some(unit) = file.units.iter().find(|u| !seen.insert(u.unit_id)) {
            anyhow::bail!("threshold policy lists unit {} more than once", unit.unit_id);
        }
        Ok(Self::new(file.units))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read(path)
            .with_context(|| format!("failed to read threshold policy {}", path.display()))?;
        let mut bytes = contents;
        Self::from_json_slice(&mut bytes)
            .with_context(|| format!("failed to load threshold policy {}", path.display()))
    }

    pub fn get(&self, unit_id: i32) -> Option<&UnitThreshold> {
        self.units.get(&unit_id)
    }

    pub fn units(&self) -> impl Iterator<Item = &UnitThreshold> {
        self.units.values()
    }
}

fn format_celsius(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.1}")
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_matches_deployed_units() {
        let policy = ThresholdPolicy::default();
        let milk = policy.get(1).expect("milk");
        assert_eq!(milk.breach_message(5.0), None);
        assert_eq!(
            milk.breach_message(5.5).as_deref(),
            Some("Critical: Milk Storage High Temp (5.5°C)")
        );
        let frozen = policy.get(2).expect("frozen");
        assert_eq!(frozen.breach_message(-18.0), None);
        assert_eq!(
            frozen.breach_message(-4.0).as_deref(),
            Some("Critical: Frozen Food Thawing (-4.0°C)")
        );
        assert!(policy.get(3).is_none());
    }

    #[test]
    fn policy_file_supports_lower_bound() {
        let mut raw = br#"{"units":[
            {"unit_id": 7, "unit_name": "Produce", "max_temp": 8.0, "min_temp": 1.0}
        ]}"#
        .to_vec();
        let policy = ThresholdPolicy::from_json_slice(&mut raw).expect("policy");
        let produce = policy.get(7).expect("unit 7");
        assert_eq!(
            produce.breach_message(9.25).as_deref(),
            Some("Critical: Produce High Temp (9.25°C)")
        );
        assert_eq!(
            produce.breach_message(0.5).as_deref(),
            Some("Critical: Produce Low Temp (0.5°C)")
        );
        assert_eq!(produce.breach_message(4.0), None);
    }

    #[test]
    fn policy_file_without_bounds_is_rejected() {
        let mut raw = br#"{"units":[{"unit_id": 3, "unit_name": "Empty"}]}"#.to_vec();
        assert!(ThresholdPolicy::from_json_slice(&mut raw).is_err());
    }

    #[test]
    fn policy_file_with_repeated_unit_is_rejected() {
        let mut raw = br#"{"units":[
            {"unit_id": 1, "unit_name": "Milk Storage", "max_temp": 5.0},
            {"unit_id": 1, "unit_name": "Milk Storage", "max_temp": 9.0}
        ]}"#
        .to_vec();
        let err = ThresholdPolicy::from_json_slice(&mut raw).unwrap_err();
        assert!(err.to_string().contains("unit 1 more than once"));
    }

    #[test]
    fn load_reads_policy_from_disk() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("policy.json");
        std::fs::write(
            &path,
            r#"{"units":[{"unit_id": 1, "unit_name": "Milk Storage", "max_temp": 4.0}]}"#,
        )?;
        let policy = ThresholdPolicy::load(&path)?;
        assert_eq!(policy.units().count(), 1);
        assert!(policy.get(1).and_then(|u| u.breach_message(4.5)).is_some());
        Ok(())
    }
}
