//! Attribute values.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// The value carried by a condition, parameter or property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Value {
    NominalReal {
        nominal: f64,
        #[serde(default)]
        units: String,
    },
    UniformReal {
        lower_bound: f64,
        upper_bound: f64,
        #[serde(default)]
        units: String,
    },
    NormalReal {
        mean: f64,
        std: f64,
        #[serde(default)]
        units: String,
    },
    NominalInteger {
        nominal: i64,
    },
    NominalCategorical {
        category: String,
    },
    EmpiricalFormula {
        formula: String,
    },
    NominalComposition {
        quantities: BTreeMap<String, f64>,
    },
}

impl Value {
    #[must_use]
    pub fn nominal_real(nominal: f64, units: impl Into<String>) -> Self {
        Value::NominalReal {
            nominal,
            units: units.into(),
        }
    }

    #[must_use]
    pub fn uniform_real(lower_bound: f64, upper_bound: f64, units: impl Into<String>) -> Self {
        Value::UniformReal {
            lower_bound,
            upper_bound,
            units: units.into(),
        }
    }

    #[must_use]
    pub fn normal_real(mean: f64, std: f64, units: impl Into<String>) -> Self {
        Value::NormalReal {
            mean,
            std,
            units: units.into(),
        }
    }

    #[must_use]
    pub fn nominal_integer(nominal: i64) -> Self {
        Value::NominalInteger { nominal }
    }

    #[must_use]
    pub fn categorical(category: impl Into<String>) -> Self {
        Value::NominalCategorical {
            category: category.into(),
        }
    }

    #[must_use]
    pub fn empirical_formula(formula: impl Into<String>) -> Self {
        Value::EmpiricalFormula {
            formula: formula.into(),
        }
    }

    #[must_use]
    pub fn composition<I, K>(quantities: I) -> Self
    where
        I: IntoIterator<Item = (K, f64)>,
        K: Into<String>,
    {
        Value::NominalComposition {
            quantities: quantities.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    /// Units of a real-valued value; `None` for the other kinds.
    #[must_use]
    pub fn units(&self) -> Option<&str> {
        match self {
            Value::NominalReal { units, .. }
            | Value::UniformReal { units, .. }
            | Value::NormalReal { units, .. } => Some(units),
            _ => None,
        }
    }
}

/// Split an empirical formula into its element symbols.
///
/// An element symbol is one uppercase letter followed by lowercase letters;
/// counts, parentheses and dots are skipped.
#[must_use]
pub fn formula_elements(formula: &str) -> BTreeSet<String> {
    let mut elements = BTreeSet::new();
    let mut current = String::new();
    for c in formula.chars() {
        if c.is_ascii_uppercase() {
            if !current.is_empty() {
                elements.insert(std::mem::take(&mut current));
            }
            current.push(c);
        } else if c.is_ascii_lowercase() && !current.is_empty() {
            current.push(c);
        } else if !current.is_empty() {
            elements.insert(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        elements.insert(current);
    }
    elements
}

fn with_units(text: String, units: &str) -> String {
    if units.is_empty() {
        text
    } else {
        format!("{} {}", text, units)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Value::NominalReal { nominal, units } => with_units(nominal.to_string(), units),
            Value::UniformReal {
                lower_bound,
                upper_bound,
                units,
            } => with_units(format!("[{}, {}]", lower_bound, upper_bound), units),
            Value::NormalReal { mean, std, units } => {
                with_units(format!("{} +/- {}", mean, std), units)
            }
            Value::NominalInteger { nominal } => nominal.to_string(),
            Value::NominalCategorical { category } => category.clone(),
            Value::EmpiricalFormula { formula } => formula.clone(),
            Value::NominalComposition { quantities } => quantities
                .iter()
                .map(|(k, v)| format!("{}: {}", k, v))
                .collect::<Vec<_>>()
                .join(", "),
        };
        f.write_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_real_with_units() {
        assert_eq!(Value::nominal_real(1200.0, "K").to_string(), "1200 K");
        assert_eq!(Value::nominal_real(0.5, "").to_string(), "0.5");
    }

    #[test]
    fn display_categorical() {
        assert_eq!(Value::categorical("annealed").to_string(), "annealed");
    }

    #[test]
    fn formula_elements_parses_symbols() {
        let elements = formula_elements("Fe2O3");
        assert_eq!(
            elements.into_iter().collect::<Vec<_>>(),
            vec!["Fe".to_string(), "O".to_string()]
        );
        let elements = formula_elements("Ca(OH)2");
        assert!(elements.contains("Ca") && elements.contains("O") && elements.contains("H"));
    }

    #[test]
    fn serde_uses_snake_case_tag() {
        let json = serde_json::to_value(Value::nominal_integer(3)).expect("json");
        assert_eq!(json, serde_json::json!({"type": "nominal_integer", "nominal": 3}));
    }
}
