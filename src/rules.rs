//! Targeting rule evaluation.
use regex::Regex;

use crate::{
    ufc::{Condition, ConditionOperator, ConditionValue, Rule, Value},
    AttributeValue, Attributes, Error, Result,
};

/// Return `true` if at least one of `rules` matches `attributes`.
///
/// An empty rule list never matches, while a rule without conditions always does.
pub fn matches_any(attributes: &Attributes, rules: &[Rule]) -> Result<bool> {
    for rule in rules {
        if rule.eval(attributes)? {
            return Ok(true);
        }
    }
    Ok(false)
}

impl Rule {
    /// Return `true` if every condition of the rule matches.
    pub fn eval(&self, attributes: &Attributes) -> Result<bool> {
        for condition in &self.conditions {
            if !condition.eval(attributes)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl Condition {
    /// Evaluate the condition against subject attributes.
    ///
    /// A missing or null attribute never matches.
    pub fn eval(&self, attributes: &Attributes) -> Result<bool> {
        self.operator
            .eval(attributes.get(&self.attribute), &self.value)
    }
}

impl ConditionOperator {
    /// Apply the operator. Returns `Ok(false)` if the operator cannot be applied to the values and
    /// `Err` if the operator itself is unknown.
    pub(crate) fn eval(
        &self,
        attribute: Option<&AttributeValue>,
        condition_value: &ConditionValue,
    ) -> Result<bool> {
        if let Self::Unrecognized(op) = self {
            return Err(Error::MalformedOperator(op.clone()));
        }
        Ok(self.try_eval(attribute, condition_value).unwrap_or(false))
    }

    /// Try applying the operator, returning `None` if it cannot be applied.
    fn try_eval(
        &self,
        attribute: Option<&AttributeValue>,
        condition_value: &ConditionValue,
    ) -> Option<bool> {
        let attribute = attribute.filter(|v| **v != AttributeValue::Null)?;

        match self {
            Self::Matches => {
                let s = attribute.to_display_string()?;
                let pattern = match condition_value {
                    ConditionValue::Single(Value::String(s)) => s,
                    _ => return None,
                };
                let regex = match Regex::new(pattern) {
                    Ok(regex) => regex,
                    Err(err) => {
                        log::warn!(target: "eppo", pattern; "invalid regex in condition: {err}");
                        return None;
                    }
                };
                Some(regex.is_match(&s))
            }

            Self::OneOf | Self::NotOneOf => {
                let s = attribute.to_display_string()?.to_lowercase();
                let values = match condition_value {
                    ConditionValue::Multiple(v) => v,
                    _ => return None,
                };
                let is_one_of = values.iter().any(|v| v.to_lowercase() == s);
                let has_to_be_one_of = *self == Self::OneOf;
                Some(is_one_of == has_to_be_one_of)
            }

            Self::Gte | Self::Gt | Self::Lte | Self::Lt => {
                let condition_value = match condition_value {
                    ConditionValue::Single(Value::Number(n)) => *n,
                    ConditionValue::Single(Value::String(s)) => s.trim().parse().ok()?,
                    _ => return None,
                };
                let attribute_value = attribute.to_number()?;

                Some(match self {
                    Self::Gt => attribute_value > condition_value,
                    Self::Gte => attribute_value >= condition_value,
                    Self::Lt => attribute_value < condition_value,
                    Self::Lte => attribute_value <= condition_value,
                    _ => {
                        // unreachable
                        return None;
                    }
                })
            }

            Self::Unrecognized(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use crate::{
        ufc::{Condition, ConditionOperator, ConditionValue, Rule},
        AttributeValue, Attributes, Error,
    };

    use super::matches_any;

    fn eval(op: ConditionOperator, attribute: Option<AttributeValue>, value: ConditionValue) -> bool {
        op.eval(attribute.as_ref(), &value).unwrap()
    }

    fn age_between_10_and_100() -> Rule {
        Rule {
            conditions: vec![
                Condition {
                    attribute: "age".into(),
                    operator: ConditionOperator::Gt,
                    value: 10.0.into(),
                },
                Condition {
                    attribute: "age".into(),
                    operator: ConditionOperator::Lt,
                    value: 100.0.into(),
                },
            ],
        }
    }

    fn email_rule() -> Rule {
        Rule {
            conditions: vec![Condition {
                attribute: "email".into(),
                operator: ConditionOperator::Matches,
                value: ".*@email.com".into(),
            }],
        }
    }

    fn attrs<const N: usize>(pairs: [(&str, AttributeValue); N]) -> Attributes {
        pairs
            .into_iter()
            .map(|(k, v)| (k.to_owned(), v))
            .collect()
    }

    #[test]
    fn matches_regex() {
        assert!(eval(
            ConditionOperator::Matches,
            Some("test@example.com".into()),
            "^test.*".into()
        ));
        assert!(!eval(
            ConditionOperator::Matches,
            Some("example@test.com".into()),
            "^test.*".into()
        ));
    }

    #[test]
    fn matches_regex_against_number() {
        assert!(eval(
            ConditionOperator::Matches,
            Some(99.0.into()),
            "^[0-9]+$".into()
        ));
    }

    #[test]
    fn invalid_regex_does_not_match() {
        assert!(!eval(
            ConditionOperator::Matches,
            Some("anything".into()),
            "(unclosed".into()
        ));
    }

    #[test]
    fn one_of_is_case_insensitive() {
        let names = ConditionValue::from(vec!["John", "Ron"]);
        assert!(eval(ConditionOperator::OneOf, Some("ron".into()), names.clone()));
        assert!(eval(ConditionOperator::OneOf, Some("JOHN".into()), names.clone()));
        assert!(!eval(ConditionOperator::OneOf, Some("Sam".into()), names));
    }

    #[test]
    fn not_one_of_is_case_insensitive() {
        let values = ConditionValue::from(vec!["bbB", "1.1.ab"]);
        assert!(!eval(ConditionOperator::NotOneOf, Some("BBB".into()), values.clone()));
        assert!(!eval(ConditionOperator::NotOneOf, Some("1.1.AB".into()), values.clone()));
        assert!(eval(ConditionOperator::NotOneOf, Some("ccc".into()), values));
    }

    #[test]
    fn one_of_and_not_one_of_partition() {
        let candidates = ConditionValue::from(vec!["alice", "Bob", "42", "true"]);
        let subjects: [AttributeValue; 6] = [
            "alice".into(),
            "BOB".into(),
            "charlie".into(),
            42.0.into(),
            true.into(),
            false.into(),
        ];
        for subject in subjects {
            let one_of = eval(ConditionOperator::OneOf, Some(subject.clone()), candidates.clone());
            let not_one_of = eval(
                ConditionOperator::NotOneOf,
                Some(subject.clone()),
                candidates.clone(),
            );
            assert_ne!(one_of, not_one_of, "{subject:?}");
        }
    }

    #[test]
    fn one_of_numbers_and_booleans() {
        let numbers = ConditionValue::from(vec!["14", "15.11", "15"]);
        assert!(eval(ConditionOperator::OneOf, Some("14".into()), numbers.clone()));
        assert!(eval(ConditionOperator::OneOf, Some(15.11.into()), numbers.clone()));
        assert!(eval(ConditionOperator::OneOf, Some(15.0.into()), numbers.clone()));
        assert!(!eval(ConditionOperator::OneOf, Some("10".into()), numbers));

        assert!(eval(
            ConditionOperator::OneOf,
            Some(true.into()),
            vec!["true"].into()
        ));
        assert!(!eval(
            ConditionOperator::NotOneOf,
            Some("true".into()),
            vec!["True"].into()
        ));
        assert!(eval(
            ConditionOperator::NotOneOf,
            Some("false".into()),
            vec!["True"].into()
        ));
    }

    #[test]
    fn missing_attribute_never_matches() {
        let candidates = ConditionValue::from(vec!["alice"]);
        for op in [
            ConditionOperator::Matches,
            ConditionOperator::OneOf,
            ConditionOperator::NotOneOf,
            ConditionOperator::Gt,
            ConditionOperator::Gte,
            ConditionOperator::Lt,
            ConditionOperator::Lte,
        ] {
            let value = match op {
                ConditionOperator::OneOf | ConditionOperator::NotOneOf => candidates.clone(),
                ConditionOperator::Matches => ".*".into(),
                _ => 10.0.into(),
            };
            assert!(!eval(op.clone(), None, value.clone()), "{op:?}");
            assert!(!eval(op.clone(), Some(AttributeValue::Null), value), "{op:?}");
        }
    }

    #[test]
    fn comparisons() {
        assert!(eval(ConditionOperator::Gte, Some(18.0.into()), 18.0.into()));
        assert!(!eval(ConditionOperator::Gte, Some(17.0.into()), 18.0.into()));
        assert!(eval(ConditionOperator::Gt, Some(19.0.into()), 18.0.into()));
        assert!(!eval(ConditionOperator::Gt, Some(18.0.into()), 18.0.into()));
        assert!(eval(ConditionOperator::Lte, Some(18.0.into()), 18.0.into()));
        assert!(!eval(ConditionOperator::Lte, Some(19.0.into()), 18.0.into()));
        assert!(eval(ConditionOperator::Lt, Some(17.0.into()), 18.0.into()));
        assert!(!eval(ConditionOperator::Lt, Some(18.0.into()), 18.0.into()));
    }

    #[test]
    fn numeric_strings_are_coerced() {
        assert!(eval(ConditionOperator::Gt, Some("19".into()), 18.0.into()));
        assert!(eval(ConditionOperator::Lt, Some(17.0.into()), "18".into()));
    }

    #[test]
    fn non_numeric_values_never_compare() {
        for threshold in [-1e9, 0.0, 10.0, 1e9] {
            for op in [
                ConditionOperator::Gt,
                ConditionOperator::Gte,
                ConditionOperator::Lt,
                ConditionOperator::Lte,
            ] {
                assert!(!eval(op.clone(), Some("something".into()), threshold.into()));
                assert!(!eval(op.clone(), Some("1.2.0".into()), threshold.into()));
                assert!(!eval(op, Some(true.into()), threshold.into()));
            }
        }
    }

    #[test]
    fn unrecognized_operator_is_an_error() {
        let op = ConditionOperator::Unrecognized("LTGT".to_owned());
        assert!(matches!(
            op.eval(Some(&25.0.into()), &30.0.into()),
            Err(Error::MalformedOperator(name)) if name == "LTGT"
        ));
    }

    #[test]
    fn empty_rule_matches() {
        let rule = Rule { conditions: vec![] };
        assert!(rule.eval(&HashMap::new()).unwrap());
    }

    #[test]
    fn empty_rule_list_never_matches() {
        assert!(!matches_any(&attrs([("age", 20.0.into())]), &[]).unwrap());
        assert!(!matches_any(&HashMap::new(), &[]).unwrap());
    }

    #[test]
    fn rule_without_conditions_matches_anything() {
        let rules = [Rule { conditions: vec![] }];
        assert!(matches_any(&HashMap::new(), &rules).unwrap());
        assert!(matches_any(&attrs([("age", 5.0.into())]), &rules).unwrap());
    }

    #[test]
    fn age_rule_scenario() {
        let rules = [age_between_10_and_100()];
        assert!(matches_any(&attrs([("age", 99.0.into())]), &rules).unwrap());
        assert!(!matches_any(&attrs([("age", 5.0.into())]), &rules).unwrap());
        assert!(!matches_any(&HashMap::new(), &rules).unwrap());
        assert!(!matches_any(&attrs([("age", "something".into())]), &rules).unwrap());
    }

    #[test]
    fn no_rule_matches() {
        let attributes = attrs([
            ("age", 99.0.into()),
            ("country", "US".into()),
            ("email", "test@example.com".into()),
        ]);
        assert!(!matches_any(&attributes, &[email_rule()]).unwrap());
        assert!(matches_any(&attributes, &[email_rule(), age_between_10_and_100()]).unwrap());
    }

    #[test]
    fn malformed_operator_propagates_through_rules() {
        let rule = Rule {
            conditions: vec![Condition {
                attribute: "age".into(),
                operator: ConditionOperator::Unrecognized("LTGT".to_owned()),
                value: 30.0.into(),
            }],
        };
        assert!(matches!(
            matches_any(&attrs([("age", 25.0.into())]), &[rule]),
            Err(Error::MalformedOperator(_))
        ));
    }
}
