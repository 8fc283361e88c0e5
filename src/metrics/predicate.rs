//! Label predicates and single-sample assertions

use std::fmt;

use super::MetricSample;
use crate::common::{Error, Result};

/// Expectation on one label
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelMatch {
    /// The label is present with exactly this value
    Equals(String),
    /// The label is missing or empty, which the exposition format treats alike
    Absent,
}

impl LabelMatch {
    pub fn matches(&self, actual: Option<&str>) -> bool {
        match self {
            LabelMatch::Equals(expected) => actual == Some(expected.as_str()),
            LabelMatch::Absent => actual.map_or(true, str::is_empty),
        }
    }
}

/// Conjunction of label expectations
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelPredicate {
    labels: Vec<(String, LabelMatch)>,
}

impl LabelPredicate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, expectation: LabelMatch) -> Self {
        self.labels.push((key.into(), expectation));
        self
    }

    pub fn equals(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.with(key, LabelMatch::Equals(value.into()))
    }

    pub fn absent(self, key: impl Into<String>) -> Self {
        self.with(key, LabelMatch::Absent)
    }

    /// Add an expectation from a validation parameter: empty means absent.
    ///
    /// Sentinel values such as `emptyResponse` are ordinary strings here and
    /// must appear verbatim.
    pub fn param(self, key: impl Into<String>, value: &str) -> Self {
        if value.is_empty() {
            self.absent(key)
        } else {
            self.equals(key, value)
        }
    }

    pub fn matches(&self, sample: &MetricSample) -> bool {
        self.labels
            .iter()
            .all(|(key, expectation)| expectation.matches(sample.label(key)))
    }
}

impl fmt::Display for LabelPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (key, expectation)) in self.labels.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            match expectation {
                LabelMatch::Equals(value) => write!(f, "{}={:?}", key, value)?,
                LabelMatch::Absent => write!(f, "{}=<absent>", key)?,
            }
        }
        f.write_str("}")
    }
}

/// Find the one sample of `metric` satisfying `predicate`
pub fn find_single<'a>(
    samples: &'a [MetricSample],
    metric: &str,
    predicate: &LabelPredicate,
) -> Result<&'a MetricSample> {
    let mut matches = samples
        .iter()
        .filter(|sample| sample.name == metric && predicate.matches(sample));

    let first = matches.next().ok_or_else(|| Error::MetricNotFound {
        metric: metric.to_string(),
        labels: predicate.to_string(),
    })?;

    let extra = matches.count();
    if extra > 0 {
        return Err(Error::AmbiguousMetric {
            metric: metric.to_string(),
            labels: predicate.to_string(),
            count: extra + 1,
        });
    }
    Ok(first)
}

/// Parse an expected counter value, `None` unless it is a non-negative integer
pub fn parse_count(raw: &str) -> Option<u64> {
    raw.trim().parse().ok()
}

/// Read the sample's value as an integer count, comparing it to `expected` when given
pub fn check_count(sample: &MetricSample, expected: Option<&str>) -> Result<u64> {
    let actual = as_count(sample.value).ok_or_else(|| Error::ValueMismatch {
        metric: sample.name.clone(),
        expected: expected.unwrap_or("an integer count").to_string(),
        actual: sample.value.to_string(),
    })?;

    if let Some(expected) = expected {
        let wanted = parse_count(expected);
        if wanted != Some(actual) {
            return Err(Error::ValueMismatch {
                metric: sample.name.clone(),
                expected: expected.to_string(),
                actual: actual.to_string(),
            });
        }
    }
    Ok(actual)
}

fn as_count(value: f64) -> Option<u64> {
    if value.is_finite() && value >= 0.0 && value.fract() == 0.0 && value <= u64::MAX as f64 {
        Some(value as u64)
    } else {
        None
    }
}

/// Assert exactly one sample matches and that its value equals `expected`
pub fn validate_single<'a>(
    samples: &'a [MetricSample],
    metric: &str,
    predicate: &LabelPredicate,
    expected: Option<&str>,
) -> Result<(&'a MetricSample, u64)> {
    let sample = find_single(samples, metric, predicate)?;
    let count = check_count(sample, expected)?;
    Ok((sample, count))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::parse;

    const PAYLOAD: &str = r#"
# TYPE dns_request_count counter
dns_request_count{query="example.com",type="A"} 3
dns_request_count{query="example.com",type="AAAA"} 1
dns_response_count{query="nope.example.",response="emptyResponse"} 2
dns_response_count{query="other.example.",response=""} 5
"#;

    fn samples() -> Vec<MetricSample> {
        parse(PAYLOAD).unwrap()
    }

    fn example_a() -> LabelPredicate {
        LabelPredicate::new()
            .equals("query", "example.com")
            .equals("type", "A")
    }

    #[test]
    fn test_exact_count_passes() {
        let samples = samples();
        let (sample, count) =
            validate_single(&samples, "dns_request_count", &example_a(), Some("3")).unwrap();
        assert_eq!(count, 3);
        assert_eq!(sample.label("type"), Some("A"));
    }

    #[test]
    fn test_wrong_count_is_value_mismatch() {
        let samples = samples();
        let err = validate_single(&samples, "dns_request_count", &example_a(), Some("4")).unwrap_err();
        match err {
            Error::ValueMismatch { expected, actual, .. } => {
                assert_eq!(expected, "4");
                assert_eq!(actual, "3");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_no_match_is_metric_not_found() {
        let samples = samples();
        let predicate = LabelPredicate::new().equals("query", "missing.example.");
        let err = validate_single(&samples, "dns_request_count", &predicate, Some("3")).unwrap_err();
        assert!(matches!(err, Error::MetricNotFound { .. }));

        // Right labels, wrong metric name
        let err = validate_single(&samples, "dns_response_count", &example_a(), None).unwrap_err();
        assert!(matches!(err, Error::MetricNotFound { .. }));
    }

    #[test]
    fn test_two_matches_is_ambiguous() {
        let samples = samples();
        let predicate = LabelPredicate::new().equals("query", "example.com");
        let err = validate_single(&samples, "dns_request_count", &predicate, Some("3")).unwrap_err();
        assert!(matches!(err, Error::AmbiguousMetric { count: 2, .. }));
    }

    #[test]
    fn test_sentinel_is_a_literal_value() {
        let samples = samples();
        let sentinel = LabelPredicate::new()
            .equals("query", "nope.example.")
            .param("response", "emptyResponse");
        let (_, count) = validate_single(&samples, "dns_response_count", &sentinel, Some("2")).unwrap();
        assert_eq!(count, 2);

        let absent = LabelPredicate::new()
            .equals("query", "nope.example.")
            .absent("response");
        let err = validate_single(&samples, "dns_response_count", &absent, None).unwrap_err();
        assert!(matches!(err, Error::MetricNotFound { .. }));
    }

    #[test]
    fn test_empty_param_requires_absent_label() {
        let samples = samples();
        let predicate = LabelPredicate::new()
            .equals("query", "other.example.")
            .param("response", "");
        let (_, count) = validate_single(&samples, "dns_response_count", &predicate, None).unwrap();
        assert_eq!(count, 5);
    }

    #[test]
    fn test_fractional_value_is_not_a_count() {
        let samples = parse("m{a=\"b\"} 2.5").unwrap();
        let predicate = LabelPredicate::new().equals("a", "b");
        let err = validate_single(&samples, "m", &predicate, None).unwrap_err();
        assert!(matches!(err, Error::ValueMismatch { .. }));
    }

    #[test]
    fn test_non_integer_expected_count_is_value_mismatch() {
        let samples = samples();
        let err = validate_single(&samples, "dns_request_count", &example_a(), Some("three")).unwrap_err();
        match err {
            Error::ValueMismatch { expected, actual, .. } => {
                assert_eq!(expected, "three");
                assert_eq!(actual, "3");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(parse_count(" 7 "), Some(7));
        assert_eq!(parse_count("-1"), None);
    }

    #[test]
    fn test_predicate_display() {
        let predicate = LabelPredicate::new().equals("query", "x.").absent("response");
        assert_eq!(predicate.to_string(), r#"{query="x.", response=<absent>}"#);
    }
}
