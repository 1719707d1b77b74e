//! Covariate effects and the search space they are drawn from

use std::fmt;
use std::str::FromStr;

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SearchError};

/// Functional form of a covariate effect
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum FunctionalForm {
    Linear,
    Categorical,
    PiecewiseLinear,
    Exponential,
    Power,
    /// A user-supplied expression
    Custom(String),
}

impl FunctionalForm {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Linear => "lin",
            Self::Categorical => "cat",
            Self::PiecewiseLinear => "piece_lin",
            Self::Exponential => "exp",
            Self::Power => "pow",
            Self::Custom(expr) => expr,
        }
    }
}

impl fmt::Display for FunctionalForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FunctionalForm {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s.trim() {
            "" => return Err(SearchError::invalid_effect("empty functional form")),
            "lin" => Self::Linear,
            "cat" => Self::Categorical,
            "piece_lin" => Self::PiecewiseLinear,
            "exp" => Self::Exponential,
            "pow" => Self::Power,
            expr => Self::Custom(expr.to_string()),
        })
    }
}

impl TryFrom<String> for FunctionalForm {
    type Error = SearchError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<FunctionalForm> for String {
    fn from(value: FunctionalForm) -> Self {
        value.as_str().to_string()
    }
}

/// How an effect is combined with the parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EffectOperation {
    #[default]
    #[serde(rename = "*")]
    Multiplicative,
    #[serde(rename = "+")]
    Additive,
}

impl EffectOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Multiplicative => "*",
            Self::Additive => "+",
        }
    }
}

impl fmt::Display for EffectOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EffectOperation {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "*" => Ok(Self::Multiplicative),
            "+" => Ok(Self::Additive),
            other => Err(SearchError::invalid_effect(format!(
                "unknown operation '{other}' (expected '*' or '+')"
            ))),
        }
    }
}

/// One covariate effect on one parameter
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Effect {
    pub parameter: String,
    pub covariate: String,
    pub fp: FunctionalForm,
    pub operation: EffectOperation,
}

impl Effect {
    pub fn new(
        parameter: impl Into<String>,
        covariate: impl Into<String>,
        fp: FunctionalForm,
        operation: EffectOperation,
    ) -> Self {
        Self {
            parameter: parameter.into(),
            covariate: covariate.into(),
            fp,
            operation,
        }
    }

    /// Whether both effects act on the same parameter/covariate pair
    pub fn same_target(&self, other: &Effect) -> bool {
        self.parameter == other.parameter && self.covariate == other.covariate
    }

    /// State label used in step tables, e.g. `* exp`
    pub fn state(&self) -> String {
        format!("{} {}", self.operation, self.fp)
    }
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, {}, {}, {}",
            self.parameter, self.covariate, self.fp, self.operation
        )
    }
}

/// Parses `PARAM, COV, FP[, OP]`; the operation defaults to `*`
impl FromStr for Effect {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        let (parameter, covariate, fp, operation) = match parts.as_slice() {
            [p, c, fp] => (*p, *c, *fp, EffectOperation::default()),
            [p, c, fp, op] => (*p, *c, *fp, op.parse()?),
            _ => {
                return Err(SearchError::invalid_effect(format!(
                    "expected 'PARAM, COV, FP[, OP]', got '{s}'"
                )))
            }
        };
        if parameter.is_empty() || covariate.is_empty() {
            return Err(SearchError::invalid_effect(format!(
                "empty parameter or covariate in '{s}'"
            )));
        }
        Ok(Self::new(parameter, covariate, fp.parse()?, operation))
    }
}

/// Compact description of a set of effects
///
/// Expands to the cartesian product of parameters, covariates and
/// functional forms, all with the same operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectSpec {
    pub parameters: Vec<String>,
    pub covariates: Vec<String>,
    pub fps: Vec<FunctionalForm>,
    #[serde(default)]
    pub operation: EffectOperation,
}

impl EffectSpec {
    pub fn new<P, C>(
        parameters: impl IntoIterator<Item = P>,
        covariates: impl IntoIterator<Item = C>,
        fps: impl IntoIterator<Item = FunctionalForm>,
        operation: EffectOperation,
    ) -> Self
    where
        P: Into<String>,
        C: Into<String>,
    {
        Self {
            parameters: parameters.into_iter().map(Into::into).collect(),
            covariates: covariates.into_iter().map(Into::into).collect(),
            fps: fps.into_iter().collect(),
            operation,
        }
    }

    /// Expand into single effects
    pub fn expand(&self) -> Result<Vec<Effect>> {
        if self.parameters.is_empty() || self.covariates.is_empty() || self.fps.is_empty() {
            return Err(SearchError::invalid_effect(format!(
                "effect list expands to nothing: {self:?}"
            )));
        }
        if let Some(blank) = self
            .parameters
            .iter()
            .chain(&self.covariates)
            .find(|name| name.trim().is_empty())
        {
            return Err(SearchError::invalid_effect(format!(
                "blank name '{blank}' in effect list"
            )));
        }

        let mut effects = Vec::with_capacity(self.parameters.len() * self.covariates.len() * self.fps.len());
        for parameter in &self.parameters {
            for covariate in &self.covariates {
                for fp in &self.fps {
                    effects.push(Effect::new(
                        parameter.as_str(),
                        covariate.as_str(),
                        fp.clone(),
                        self.operation,
                    ));
                }
            }
        }
        Ok(effects)
    }
}

impl From<Effect> for EffectSpec {
    fn from(effect: Effect) -> Self {
        Self {
            parameters: vec![effect.parameter],
            covariates: vec![effect.covariate],
            fps: vec![effect.fp],
            operation: effect.operation,
        }
    }
}

/// Expand effect lists and drop duplicates, keeping first occurrences
pub fn expand_effects(specs: &[EffectSpec]) -> Result<Vec<Effect>> {
    let mut unique = IndexSet::new();
    for spec in specs {
        unique.extend(spec.expand()?);
    }
    Ok(unique.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_effect() {
        let effect: Effect = "CL, WGT, exp, *".parse().unwrap();
        assert_eq!(
            effect,
            Effect::new("CL", "WGT", FunctionalForm::Exponential, EffectOperation::Multiplicative)
        );
        assert_eq!(effect.to_string(), "CL, WGT, exp, *");
        assert_eq!(effect.state(), "* exp");

        let additive: Effect = "V,APGR,lin,+".parse().unwrap();
        assert_eq!(additive.operation, EffectOperation::Additive);

        let defaulted: Effect = "V, AGE, pow".parse().unwrap();
        assert_eq!(defaulted.operation, EffectOperation::Multiplicative);
    }

    #[test]
    fn test_parse_effect_errors() {
        assert!("CL, WGT".parse::<Effect>().is_err());
        assert!("CL, WGT, exp, /".parse::<Effect>().is_err());
        assert!(", WGT, exp".parse::<Effect>().is_err());
        assert!("CL, WGT, ".parse::<Effect>().is_err());
    }

    #[test]
    fn test_custom_functional_form() {
        let fp: FunctionalForm = "exp(WGT-70)".parse().unwrap();
        assert_eq!(fp, FunctionalForm::Custom("exp(WGT-70)".to_string()));
        assert_eq!(fp.to_string(), "exp(WGT-70)");
    }

    #[test]
    fn test_expand_cartesian_product() {
        let spec = EffectSpec::new(
            ["CL", "V"],
            ["WGT", "AGE"],
            [FunctionalForm::Exponential],
            EffectOperation::Multiplicative,
        );
        let effects = spec.expand().unwrap();
        let labels: Vec<String> = effects.iter().map(Effect::to_string).collect();
        assert_eq!(
            labels,
            vec![
                "CL, WGT, exp, *",
                "CL, AGE, exp, *",
                "V, WGT, exp, *",
                "V, AGE, exp, *",
            ]
        );
    }

    #[test]
    fn test_expand_deduplicates_keeping_order() {
        let single = |s: &str| EffectSpec::from(s.parse::<Effect>().unwrap());
        let specs = vec![
            single("V, WGT, lin"),
            EffectSpec::new(
                ["CL"],
                ["WGT"],
                [FunctionalForm::Exponential, FunctionalForm::Power],
                EffectOperation::Multiplicative,
            ),
            single("V, WGT, lin"),
            single("CL, WGT, exp"),
        ];
        let effects = expand_effects(&specs).unwrap();
        let labels: Vec<String> = effects.iter().map(Effect::to_string).collect();
        assert_eq!(
            labels,
            vec!["V, WGT, lin, *", "CL, WGT, exp, *", "CL, WGT, pow, *"]
        );
    }

    #[test]
    fn test_empty_spec_rejected() {
        let spec = EffectSpec::new(
            Vec::<String>::new(),
            ["WGT"],
            [FunctionalForm::Linear],
            EffectOperation::Additive,
        );
        assert!(matches!(spec.expand(), Err(SearchError::InvalidEffect(_))));
        assert!(expand_effects(&[spec]).is_err());
        assert!(expand_effects(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_same_target() {
        let a: Effect = "CL, WGT, exp".parse().unwrap();
        let b: Effect = "CL, WGT, pow, +".parse().unwrap();
        let c: Effect = "V, WGT, exp".parse().unwrap();
        assert!(a.same_target(&b));
        assert!(!a.same_target(&c));
    }

    #[test]
    fn test_spec_from_json() {
        let spec: EffectSpec = serde_json::from_str(
            r#"{"parameters": ["CL"], "covariates": ["WGT", "APGR"], "fps": ["exp", "cat"], "operation": "+"}"#,
        )
        .unwrap();
        assert_eq!(spec.fps, vec![FunctionalForm::Exponential, FunctionalForm::Categorical]);
        assert_eq!(spec.operation, EffectOperation::Additive);
        assert_eq!(spec.expand().unwrap().len(), 4);
    }
}
