//! ValidationRuleInferencer — candidate validation rules from sample values.
//!
//! Pure function over a field and its observed values. Proposes at most
//! three rules ranked by confidence; rules under 0.5 are discarded outright.
//! Ties prefer the most specific rule kind: format > pattern > range > length.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::pipeline::analyzer::types::{ExtractedField, FieldType};

/// Confidence floor below which a candidate rule is not surfaced at all.
const DISCARD_BELOW: f64 = 0.5;
/// Rules at or above this confidence are marked recommended.
const RECOMMEND_AT: f64 = 0.7;
/// Cap on rules proposed per field.
const MAX_RULES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleType {
    Pattern,
    Length,
    Range,
    Format,
    Custom,
}

impl RuleType {
    /// Specificity rank for tie-breaking; lower is more specific.
    fn specificity(&self) -> u8 {
        match self {
            Self::Format => 0,
            Self::Pattern => 1,
            Self::Range => 2,
            Self::Length => 3,
            Self::Custom => 4,
        }
    }
}

/// One inferred validation rule with its user-facing justification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRule {
    pub rule_type: RuleType,
    /// Regex for pattern/format rules, JSON bounds for length/range.
    pub rule_value: String,
    pub confidence_score: f64,
    pub sample_matches: Vec<String>,
    pub sample_non_matches: Vec<String>,
    pub is_recommended: bool,
}

/// A named entry in the fixed format catalogue.
struct FormatSpec {
    name: &'static str,
    pattern: &'static str,
}

const FORMAT_CATALOGUE: &[FormatSpec] = &[
    FormatSpec {
        name: "email",
        pattern: r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$",
    },
    FormatSpec {
        name: "url",
        pattern: r"^https?://[^\s]+$",
    },
    FormatSpec {
        name: "date_iso",
        pattern: r"^\d{4}-\d{2}-\d{2}$",
    },
    FormatSpec {
        name: "currency",
        pattern: r"^[$€£]?\s?-?\d{1,3}(,\d{3})*(\.\d{1,2})?$",
    },
    FormatSpec {
        name: "phone",
        pattern: r"^\+?[0-9][0-9 ().-]{6,18}[0-9]$",
    },
    FormatSpec {
        name: "national_id",
        pattern: r"^\d{3}-\d{2}-\d{4}$",
    },
];

fn catalogue_regexes() -> &'static Vec<(&'static str, Regex)> {
    static COMPILED: OnceLock<Vec<(&'static str, Regex)>> = OnceLock::new();
    COMPILED.get_or_init(|| {
        FORMAT_CATALOGUE
            .iter()
            .map(|spec| {
                // Catalogue patterns are fixed and covered by tests.
                (spec.name, Regex::new(spec.pattern).unwrap())
            })
            .collect()
    })
}

/// Infer 0-3 candidate rules for a field from its sampled values.
pub fn infer_rules(field: &ExtractedField) -> Vec<ValidationRule> {
    let samples: Vec<&str> = field
        .sample_values
        .iter()
        .map(String::as_str)
        .filter(|s| !s.trim().is_empty())
        .collect();
    if samples.is_empty() {
        return Vec::new();
    }

    let mut candidates = Vec::new();
    if let Some(rule) = format_rule(&samples) {
        candidates.push(rule);
    }
    if let Some(rule) = pattern_rule(&samples) {
        candidates.push(rule);
    }
    if field.field_type == FieldType::Number {
        if let Some(rule) = range_rule(&samples) {
            candidates.push(rule);
        }
    }
    if let Some(rule) = length_rule(&samples) {
        candidates.push(rule);
    }

    candidates.retain(|r| r.confidence_score >= DISCARD_BELOW);
    candidates.sort_by(|a, b| {
        b.confidence_score
            .partial_cmp(&a.confidence_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.rule_type.specificity().cmp(&b.rule_type.specificity()))
    });
    candidates.truncate(MAX_RULES);
    candidates
}

/// Match samples against the fixed format catalogue; the best-scoring
/// format wins. Confidence is the exact-match fraction.
fn format_rule(samples: &[&str]) -> Option<ValidationRule> {
    let mut best: Option<(&'static str, &Regex, f64)> = None;
    for (name, regex) in catalogue_regexes() {
        let matching = samples.iter().filter(|s| regex.is_match(s)).count();
        let confidence = matching as f64 / samples.len() as f64;
        if confidence > best.map(|(_, _, c)| c).unwrap_or(0.0) {
            best = Some((name, regex, confidence));
        }
    }
    let (name, regex, confidence) = best?;
    let (matches, non_matches) = partition(samples, regex);
    Some(ValidationRule {
        rule_type: RuleType::Format,
        rule_value: format!("{name}:{}", regex.as_str()),
        confidence_score: confidence,
        sample_matches: matches,
        sample_non_matches: non_matches,
        is_recommended: confidence >= RECOMMEND_AT,
    })
}

/// Mine a character-class template from the samples. Only proposed when
/// every sample produces the same template.
fn pattern_rule(samples: &[&str]) -> Option<ValidationRule> {
    let first = char_class_template(samples[0]);
    if first.is_empty() || !samples.iter().all(|s| char_class_template(s) == first) {
        return None;
    }
    let pattern = format!("^{first}$");
    let regex = Regex::new(&pattern).ok()?;
    let confidence = if samples.len() >= 2 { 0.9 } else { 0.7 };
    let (matches, non_matches) = partition(samples, &regex);
    Some(ValidationRule {
        rule_type: RuleType::Pattern,
        rule_value: pattern,
        confidence_score: confidence,
        sample_matches: matches,
        sample_non_matches: non_matches,
        is_recommended: confidence >= RECOMMEND_AT,
    })
}

/// Magnitude bounds for numeric fields: zero-floored when all samples are
/// non-negative, ceiling at the next power of ten.
fn range_rule(samples: &[&str]) -> Option<ValidationRule> {
    let numbers: Vec<f64> = samples
        .iter()
        .filter_map(|s| crate::pipeline::analyzer::value_norm::parse_number(s))
        .collect();
    if numbers.is_empty() {
        return None;
    }
    let observed_min = numbers.iter().cloned().fold(f64::INFINITY, f64::min);
    let observed_max = numbers.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let min = if observed_min >= 0.0 {
        0.0
    } else {
        -next_power_of_ten(observed_min.abs())
    };
    let max = next_power_of_ten(observed_max.abs().max(1.0));
    let confidence = if numbers.len() >= 2 { 0.6 } else { 0.5 };
    Some(ValidationRule {
        rule_type: RuleType::Range,
        rule_value: serde_json::json!({ "min": min, "max": max }).to_string(),
        confidence_score: confidence,
        sample_matches: samples.iter().map(|s| s.to_string()).collect(),
        sample_non_matches: Vec::new(),
        is_recommended: confidence >= RECOMMEND_AT,
    })
}

/// Observed length bounds with a ±25% margin (at least ±2).
fn length_rule(samples: &[&str]) -> Option<ValidationRule> {
    let min_len = samples.iter().map(|s| s.chars().count()).min()?;
    let max_len = samples.iter().map(|s| s.chars().count()).max()?;
    let margin = ((max_len as f64 * 0.25).ceil() as usize).max(2);
    let confidence = if samples.len() >= 2 { 0.6 } else { 0.5 };
    Some(ValidationRule {
        rule_type: RuleType::Length,
        rule_value: serde_json::json!({
            "min": min_len.saturating_sub(margin),
            "max": max_len + margin,
        })
        .to_string(),
        confidence_score: confidence,
        sample_matches: samples.iter().map(|s| s.to_string()).collect(),
        sample_non_matches: Vec::new(),
        is_recommended: confidence >= RECOMMEND_AT,
    })
}

/// Collapse a value into a regex template: digit runs, letter-case runs,
/// literal separators. "INV-0001" → "[A-Z]{3}-\d{4}".
fn char_class_template(value: &str) -> String {
    #[derive(PartialEq)]
    enum Class {
        Digit,
        Upper,
        Lower,
        Literal(char),
    }
    let mut runs: Vec<(Class, usize)> = Vec::new();
    for c in value.chars() {
        let class = if c.is_ascii_digit() {
            Class::Digit
        } else if c.is_ascii_uppercase() {
            Class::Upper
        } else if c.is_ascii_lowercase() {
            Class::Lower
        } else {
            Class::Literal(c)
        };
        match runs.last_mut() {
            Some((last, count)) if *last == class && !matches!(class, Class::Literal(_)) => {
                *count += 1
            }
            _ => runs.push((class, 1)),
        }
    }

    let mut out = String::new();
    for (class, count) in runs {
        match class {
            Class::Digit => out.push_str(r"\d"),
            Class::Upper => out.push_str("[A-Z]"),
            Class::Lower => out.push_str("[a-z]"),
            Class::Literal(c) => {
                out.push_str(&regex::escape(&c.to_string()));
                continue;
            }
        }
        if count > 1 {
            out.push_str(&format!("{{{count}}}"));
        }
    }
    out
}

fn next_power_of_ten(v: f64) -> f64 {
    10f64.powf(v.log10().ceil().max(1.0))
}

fn partition(samples: &[&str], regex: &Regex) -> (Vec<String>, Vec<String>) {
    let mut matches = Vec::new();
    let mut non_matches = Vec::new();
    for s in samples {
        if regex.is_match(s) {
            matches.push(s.to_string());
        } else {
            non_matches.push(s.to_string());
        }
    }
    (matches, non_matches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::analyzer::types::{ConfidenceDimensions, FieldValue};

    fn field_with_samples(name: &str, field_type: FieldType, samples: &[&str]) -> ExtractedField {
        ExtractedField {
            detected_name: name.to_string(),
            display_name: name.to_string(),
            field_type,
            value: samples.first().map(|s| FieldValue::String(s.to_string())),
            source_text: String::new(),
            description: None,
            confidence: ConfidenceDimensions::default(),
            overall_confidence_score: 0.8,
            requires_review: false,
            alternative_names: vec![],
            alternative_types: vec![],
            field_group: None,
            extraction_hints: vec![],
            sample_values: samples.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn email_samples_get_a_recommended_format_rule() {
        let field = field_with_samples(
            "email",
            FieldType::String,
            &["billing@acme.com", "ops@acme.com"],
        );
        let rules = infer_rules(&field);
        let format = rules
            .iter()
            .find(|r| r.rule_type == RuleType::Format)
            .unwrap();
        assert!(format.rule_value.starts_with("email:"));
        assert!((format.confidence_score - 1.0).abs() < 1e-9);
        assert!(format.is_recommended);
        assert!(format.sample_non_matches.is_empty());
    }

    #[test]
    fn invoice_numbers_mine_a_pattern() {
        let field = field_with_samples(
            "invoice_number",
            FieldType::String,
            &["INV-0001", "INV-0002"],
        );
        let rules = infer_rules(&field);
        let pattern = rules
            .iter()
            .find(|r| r.rule_type == RuleType::Pattern)
            .unwrap();
        assert_eq!(pattern.rule_value, r"^[A-Z]{3}-\d{4}$");
        assert!(pattern.is_recommended);
    }

    #[test]
    fn numeric_fields_get_a_range_rule() {
        let field = field_with_samples("total", FieldType::Number, &["150.00", "89.50"]);
        let rules = infer_rules(&field);
        let range = rules.iter().find(|r| r.rule_type == RuleType::Range).unwrap();
        let bounds: serde_json::Value = serde_json::from_str(&range.rule_value).unwrap();
        assert_eq!(bounds["min"], 0.0);
        assert!(bounds["max"].as_f64().unwrap() >= 150.0);
    }

    #[test]
    fn at_most_three_rules_most_specific_first_on_ties() {
        let field = field_with_samples("total", FieldType::Number, &["150.00", "89.50"]);
        let rules = infer_rules(&field);
        assert!(rules.len() <= 3);
        // Range and length tie at 0.6; range is more specific.
        let range_pos = rules.iter().position(|r| r.rule_type == RuleType::Range);
        let length_pos = rules.iter().position(|r| r.rule_type == RuleType::Length);
        if let (Some(r), Some(l)) = (range_pos, length_pos) {
            assert!(r < l);
        }
    }

    #[test]
    fn low_confidence_rules_are_discarded_not_surfaced() {
        // Wildly different shapes: no pattern, weak format fraction.
        let field = field_with_samples(
            "notes",
            FieldType::String,
            &["hello world", "x", "a much longer free-form remark", "42"],
        );
        let rules = infer_rules(&field);
        assert!(rules.iter().all(|r| r.confidence_score >= DISCARD_BELOW));
        assert!(rules.iter().all(|r| r.rule_type != RuleType::Format));
    }

    #[test]
    fn no_samples_no_rules() {
        let field = field_with_samples("empty", FieldType::String, &[]);
        assert!(infer_rules(&field).is_empty());
    }

    #[test]
    fn char_class_template_examples() {
        assert_eq!(char_class_template("INV-0001"), r"[A-Z]{3}-\d{4}");
        assert_eq!(char_class_template("ab12"), r"[a-z]{2}\d{2}");
        assert_eq!(char_class_template("2024-01-15"), r"\d{4}-\d{2}-\d{2}");
    }

    #[test]
    fn catalogue_patterns_compile_and_match() {
        let regexes = catalogue_regexes();
        let expectations = [
            ("email", "someone@example.org", true),
            ("email", "not-an-email", false),
            ("date_iso", "2024-01-15", true),
            ("currency", "$1,234.56", true),
            ("currency", "$1,234.567", false),
            ("phone", "+1 (555) 123-4567", true),
            ("national_id", "123-45-6789", true),
            ("url", "https://example.org/x", true),
        ];
        for (name, sample, expected) in expectations {
            let (_, regex) = regexes.iter().find(|(n, _)| *n == name).unwrap();
            assert_eq!(regex.is_match(sample), expected, "{name} vs {sample}");
        }
    }
}
