//! Scheduler configuration.
//!
//! Stored configuration may be partial or come from an older client, so
//! loading goes through [`Config::from_stored`], which overlays the stored
//! JSON onto the defaults before deserializing.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::algorithm::fsrs::DEFAULT_PARAMS;
use crate::algorithm::steps::parse_steps;
use crate::error::{CoreError, Result};
use crate::types::{GradingMethod, InterleaveOrder};

/// User-tunable scheduling settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub new_card_per_day: u32,
    pub max_reviews_per_day: u32,
    pub new_card_order: InterleaveOrder,
    pub new_previously_studied_card_per_day: u32,
    pub new_previously_studied_card_order: InterleaveOrder,
    pub start_previously_studied_card_from_the_back: bool,
    pub grading_method: GradingMethod,
    pub stroke_leniency: f64,
    pub learning_steps: Vec<String>,
    pub previously_studied_learning_steps: Vec<String>,
    pub desired_retention: f64,
    pub enable_short_term: bool,
    pub enable_fuzz: bool,
    #[serde(rename = "FSRSParams")]
    pub fsrs_params: Vec<f64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            new_card_per_day: 5,
            max_reviews_per_day: 200,
            new_card_order: InterleaveOrder::Mix,
            new_previously_studied_card_per_day: 20,
            new_previously_studied_card_order: InterleaveOrder::Mix,
            start_previously_studied_card_from_the_back: true,
            grading_method: GradingMethod::Auto,
            stroke_leniency: 1.5,
            learning_steps: vec!["1m".to_string(), "10m".to_string()],
            previously_studied_learning_steps: vec!["1m".to_string(), "5d".to_string()],
            desired_retention: 0.9,
            enable_short_term: false,
            enable_fuzz: false,
            fsrs_params: DEFAULT_PARAMS.to_vec(),
        }
    }
}

impl Config {
    /// Resolve a stored config against the defaults.
    ///
    /// Missing keys take their default, nested objects merge key by key and
    /// arrays are replaced whole.
    pub fn from_stored(stored: Option<Value>) -> Result<Self> {
        let mut merged = serde_json::to_value(Self::default())?;
        if let Some(stored) = stored {
            merge_json(&mut merged, stored);
        }
        let config: Self = serde_json::from_value(merged)?;
        config.validate()?;
        Ok(config)
    }

    /// Check values the recall engine depends on.
    pub fn validate(&self) -> Result<()> {
        if self.fsrs_params.len() != DEFAULT_PARAMS.len() {
            return Err(CoreError::InvalidConfig(format!(
                "FSRSParams must contain {} weights, got {}",
                DEFAULT_PARAMS.len(),
                self.fsrs_params.len()
            )));
        }
        if self.fsrs_params.iter().any(|w| !w.is_finite()) {
            return Err(CoreError::InvalidConfig(
                "FSRSParams must be finite numbers".to_string(),
            ));
        }
        if !(self.desired_retention > 0.0 && self.desired_retention < 1.0) {
            return Err(CoreError::InvalidConfig(format!(
                "desiredRetention must be between 0 and 1, got {}",
                self.desired_retention
            )));
        }
        parse_steps(&self.learning_steps)?;
        parse_steps(&self.previously_studied_learning_steps)?;
        Ok(())
    }
}

/// Overlay `overlay` onto `base`, recursing into objects.
pub fn merge_json(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_json(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (_, Value::Null) => {}
        (slot, value) => *slot = value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.new_card_per_day, 5);
        assert_eq!(config.max_reviews_per_day, 200);
        assert_eq!(config.new_previously_studied_card_per_day, 20);
        assert!(config.start_previously_studied_card_from_the_back);
        assert_eq!(config.learning_steps, vec!["1m", "10m"]);
        assert_eq!(config.previously_studied_learning_steps, vec!["1m", "5d"]);
        assert_eq!(config.fsrs_params.len(), 21);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_stored_fills_missing_keys() {
        let config =
            Config::from_stored(Some(json!({ "newCardPerDay": 12, "enableFuzz": true }))).unwrap();
        assert_eq!(config.new_card_per_day, 12);
        assert!(config.enable_fuzz);
        assert_eq!(config.max_reviews_per_day, 200);
        assert_eq!(config.new_card_order, InterleaveOrder::Mix);
    }

    #[test]
    fn test_from_stored_replaces_arrays() {
        let config = Config::from_stored(Some(json!({ "learningSteps": ["5m"] }))).unwrap();
        assert_eq!(config.learning_steps, vec!["5m"]);
    }

    #[test]
    fn test_from_stored_ignores_unknown_keys() {
        let config = Config::from_stored(Some(json!({ "zh": { "font": "serif" } }))).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_from_stored_none_is_default() {
        assert_eq!(Config::from_stored(None).unwrap(), Config::default());
    }

    #[test]
    fn test_rejects_wrong_weight_count() {
        let result = Config::from_stored(Some(json!({ "FSRSParams": [0.1, 0.2] })));
        assert!(matches!(result, Err(CoreError::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_bad_learning_step() {
        let result = Config::from_stored(Some(json!({ "learningSteps": ["soon"] })));
        assert!(matches!(result, Err(CoreError::InvalidLearningStep(_))));
    }

    #[test]
    fn test_merge_json_nested_objects() {
        let mut base = json!({ "a": { "x": 1, "y": 2 }, "b": [1, 2, 3] });
        merge_json(&mut base, json!({ "a": { "y": 5 }, "b": [9] }));
        assert_eq!(base, json!({ "a": { "x": 1, "y": 5 }, "b": [9] }));
    }
}
