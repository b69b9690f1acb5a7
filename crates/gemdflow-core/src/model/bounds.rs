//! Attribute template bounds.

use crate::model::value::{Value, formula_elements};
use crate::types::GemdError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// The set of values an attribute template admits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Bounds {
    /// Closed real interval in fixed units.
    RealBounds {
        lower_bound: f64,
        upper_bound: f64,
        #[serde(default)]
        default_units: String,
    },
    /// Closed integer interval.
    IntegerBounds { lower_bound: i64, upper_bound: i64 },
    /// Allowed categories.
    CategoricalBounds { categories: BTreeSet<String> },
    /// Allowed composition components; empty admits any.
    CompositionBounds { components: BTreeSet<String> },
    /// Allowed elements of an empirical formula; empty admits any.
    EmpiricalFormulaBounds { elements: BTreeSet<String> },
}

impl Bounds {
    #[must_use]
    pub fn real(lower_bound: f64, upper_bound: f64, default_units: impl Into<String>) -> Self {
        Bounds::RealBounds {
            lower_bound,
            upper_bound,
            default_units: default_units.into(),
        }
    }

    #[must_use]
    pub fn integer(lower_bound: i64, upper_bound: i64) -> Self {
        Bounds::IntegerBounds {
            lower_bound,
            upper_bound,
        }
    }

    #[must_use]
    pub fn categorical<I, S>(categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Bounds::CategoricalBounds {
            categories: categories.into_iter().map(Into::into).collect(),
        }
    }

    #[must_use]
    pub fn composition<I, S>(components: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Bounds::CompositionBounds {
            components: components.into_iter().map(Into::into).collect(),
        }
    }

    #[must_use]
    pub fn empirical_formula<I, S>(elements: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Bounds::EmpiricalFormulaBounds {
            elements: elements.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether `value` lies within these bounds.
    ///
    /// Real values must use the bounds' default units verbatim; no unit
    /// conversion is attempted. A value of the wrong kind is never contained.
    #[must_use]
    pub fn contains(&self, value: &Value) -> bool {
        match (self, value) {
            (
                Bounds::RealBounds {
                    lower_bound,
                    upper_bound,
                    default_units,
                },
                real,
            ) => {
                let in_range = |x: f64| x >= *lower_bound && x <= *upper_bound;
                match real {
                    Value::NominalReal { nominal, units } => {
                        units == default_units && in_range(*nominal)
                    }
                    Value::UniformReal {
                        lower_bound: lo,
                        upper_bound: hi,
                        units,
                    } => units == default_units && lo <= hi && in_range(*lo) && in_range(*hi),
                    Value::NormalReal { mean, units, .. } => {
                        units == default_units && in_range(*mean)
                    }
                    _ => false,
                }
            }
            (
                Bounds::IntegerBounds {
                    lower_bound,
                    upper_bound,
                },
                Value::NominalInteger { nominal },
            ) => nominal >= lower_bound && nominal <= upper_bound,
            (Bounds::CategoricalBounds { categories }, Value::NominalCategorical { category }) => {
                categories.contains(category)
            }
            (Bounds::CompositionBounds { components }, Value::NominalComposition { quantities }) => {
                components.is_empty() || quantities.keys().all(|k| components.contains(k))
            }
            (Bounds::EmpiricalFormulaBounds { elements }, Value::EmpiricalFormula { formula }) => {
                elements.is_empty() || formula_elements(formula).is_subset(elements)
            }
            _ => false,
        }
    }

    /// Check `value`, reporting the offending value on failure.
    pub fn check(&self, attribute: &str, value: &Value) -> Result<(), GemdError> {
        if self.contains(value) {
            Ok(())
        } else {
            Err(GemdError::BoundsViolation {
                attribute: attribute.to_string(),
                value: value.to_string(),
                bounds: self.to_string(),
            })
        }
    }
}

fn join(set: &BTreeSet<String>) -> String {
    set.iter().cloned().collect::<Vec<_>>().join(", ")
}

impl fmt::Display for Bounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bounds::RealBounds {
                lower_bound,
                upper_bound,
                default_units,
            } => write!(f, "[{}, {}] {}", lower_bound, upper_bound, default_units),
            Bounds::IntegerBounds {
                lower_bound,
                upper_bound,
            } => write!(f, "[{}, {}]", lower_bound, upper_bound),
            Bounds::CategoricalBounds { categories } => write!(f, "{{{}}}", join(categories)),
            Bounds::CompositionBounds { components } => {
                write!(f, "composition of {{{}}}", join(components))
            }
            Bounds::EmpiricalFormulaBounds { elements } => {
                write!(f, "formula over {{{}}}", join(elements))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn real_bounds_check_range_and_units() {
        let bounds = Bounds::real(0.0, 2000.0, "K");
        assert!(bounds.contains(&Value::nominal_real(1200.0, "K")));
        assert!(!bounds.contains(&Value::nominal_real(2500.0, "K")));
        assert!(!bounds.contains(&Value::nominal_real(1200.0, "degC")));
        assert!(bounds.contains(&Value::uniform_real(10.0, 20.0, "K")));
        assert!(!bounds.contains(&Value::uniform_real(20.0, 10.0, "K")));
    }

    #[test]
    fn integer_bounds_reject_real() {
        let bounds = Bounds::integer(1, 10);
        assert!(bounds.contains(&Value::nominal_integer(10)));
        assert!(!bounds.contains(&Value::nominal_integer(11)));
        assert!(!bounds.contains(&Value::nominal_real(5.0, "")));
    }

    #[test]
    fn categorical_bounds() {
        let bounds = Bounds::categorical(["cast", "annealed"]);
        assert!(bounds.contains(&Value::categorical("cast")));
        assert!(!bounds.contains(&Value::categorical("forged")));
    }

    #[test]
    fn composition_and_formula_bounds() {
        let comp = Bounds::composition(["Fe", "Ni"]);
        assert!(comp.contains(&Value::composition([("Fe", 0.7), ("Ni", 0.3)])));
        assert!(!comp.contains(&Value::composition([("Co", 1.0)])));

        let formula = Bounds::empirical_formula(["Fe", "O"]);
        assert!(formula.contains(&Value::empirical_formula("Fe2O3")));
        assert!(!formula.contains(&Value::empirical_formula("NaCl")));
        assert!(Bounds::empirical_formula(Vec::<String>::new())
            .contains(&Value::empirical_formula("NaCl")));
    }

    #[test]
    fn check_reports_offending_value() {
        let err = Bounds::integer(0, 3)
            .check("Passes", &Value::nominal_integer(7))
            .expect_err("out of range");
        match err {
            GemdError::BoundsViolation { attribute, value, .. } => {
                assert_eq!(attribute, "Passes");
                assert_eq!(value, "7");
            }
            other => unreachable!("unexpected error {other}"),
        }
    }
}
