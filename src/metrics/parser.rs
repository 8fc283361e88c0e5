//! Prometheus text exposition parser
//!
//! Each non-empty, non-comment line has the shape
//!
//! ```text
//! metric_name [ "{" label_name "=" `"` label_value `"` { "," ... } [ "," ] "}" ] value [ timestamp ]
//! ```
//!
//! `# HELP` / `# TYPE` lines are skipped and timestamps are discarded.

use std::collections::BTreeMap;

use nom::{
    branch::alt,
    bytes::complete::{is_not, tag, take_while, take_while1},
    character::complete::{char, digit1, space0, space1},
    combinator::{all_consuming, map, opt, recognize, value},
    multi::{fold_many0, separated_list0},
    number::complete::double,
    sequence::{delimited, pair, preceded, separated_pair, terminated},
    IResult,
};

use crate::common::{Error, Result};

/// A single `(name, labels, value)` triple from the payload
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub value: f64,
}

impl MetricSample {
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }
}

/// Parse a whole exposition payload into samples
pub fn parse(payload: &str) -> Result<Vec<MetricSample>> {
    payload
        .lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(index, line)| {
            all_consuming(sample)(line.trim())
                .map(|(_, sample)| sample)
                .map_err(|e| Error::MetricsParse {
                    line: index + 1,
                    reason: describe(e),
                })
        })
        .collect()
}

fn describe(err: nom::Err<nom::error::Error<&str>>) -> String {
    match err {
        nom::Err::Error(e) | nom::Err::Failure(e) => {
            let near: String = e.input.chars().take(24).collect();
            format!("unexpected input '{}'", near)
        }
        nom::Err::Incomplete(_) => "incomplete line".to_string(),
    }
}

fn sample(input: &str) -> IResult<&str, MetricSample> {
    let (input, name) = metric_name(input)?;
    let (input, labels) = opt(preceded(space0, labels))(input)?;
    let (input, value) = preceded(space1, sample_value)(input)?;
    let (input, _timestamp) = opt(preceded(space1, recognize(pair(opt(char('-')), digit1))))(input)?;
    let (input, _) = space0(input)?;
    Ok((
        input,
        MetricSample {
            name: name.to_string(),
            labels: labels.unwrap_or_default(),
            value,
        },
    ))
}

/// `[a-zA-Z_:][a-zA-Z0-9_:]*`
fn metric_name(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        take_while1(|c: char| c.is_ascii_alphabetic() || c == '_' || c == ':'),
        take_while(|c: char| c.is_ascii_alphanumeric() || c == '_' || c == ':'),
    ))(input)
}

/// `[a-zA-Z_][a-zA-Z0-9_]*`
fn label_name(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        take_while1(|c: char| c.is_ascii_alphabetic() || c == '_'),
        take_while(|c: char| c.is_ascii_alphanumeric() || c == '_'),
    ))(input)
}

/// `{name="value",...}` with an optional trailing comma
fn labels(input: &str) -> IResult<&str, BTreeMap<String, String>> {
    let label = separated_pair(
        preceded(space0, label_name),
        delimited(space0, char('='), space0),
        label_value,
    );
    let list = separated_list0(preceded(space0, char(',')), label);
    map(
        delimited(
            char('{'),
            terminated(list, opt(preceded(space0, char(',')))),
            preceded(space0, char('}')),
        ),
        |pairs| {
            pairs
                .into_iter()
                .map(|(k, v): (&str, String)| (k.to_string(), v))
                .collect()
        },
    )(input)
}

/// Quoted label value; `\\`, `\"` and `\n` are the only escapes
fn label_value(input: &str) -> IResult<&str, String> {
    enum Fragment<'a> {
        Literal(&'a str),
        Escaped(char),
    }

    let fragment = alt((
        map(is_not("\"\\"), Fragment::Literal),
        map(
            preceded(
                char('\\'),
                alt((
                    value('\n', char('n')),
                    value('"', char('"')),
                    value('\\', char('\\')),
                )),
            ),
            Fragment::Escaped,
        ),
    ));

    let content = fold_many0(fragment, String::new, |mut acc, fragment| {
        match fragment {
            Fragment::Literal(s) => acc.push_str(s),
            Fragment::Escaped(c) => acc.push(c),
        }
        acc
    });

    delimited(char('"'), content, char('"'))(input)
}

fn sample_value(input: &str) -> IResult<&str, f64> {
    alt((
        value(f64::INFINITY, tag("+Inf")),
        value(f64::NEG_INFINITY, tag("-Inf")),
        value(f64::NAN, tag("NaN")),
        double,
    ))(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sample_with_labels() {
        let samples = parse(
            r#"networkobservability_dns_request_count{query="example.com",query_type="A"} 3"#,
        )
        .unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].name, "networkobservability_dns_request_count");
        assert_eq!(samples[0].label("query"), Some("example.com"));
        assert_eq!(samples[0].label("query_type"), Some("A"));
        assert_eq!(samples[0].value, 3.0);
    }

    #[test]
    fn test_skips_comments_and_blank_lines() {
        let payload = "\
# HELP dns_request_count DNS requests
# TYPE dns_request_count counter

dns_request_count 7
";
        let samples = parse(payload).unwrap();
        assert_eq!(samples.len(), 1);
        assert!(samples[0].labels.is_empty());
        assert_eq!(samples[0].value, 7.0);
    }

    #[test]
    fn test_timestamp_and_trailing_comma() {
        let samples = parse(r#"up{job="agent",} 1 1712345678000"#).unwrap();
        assert_eq!(samples[0].label("job"), Some("agent"));
        assert_eq!(samples[0].value, 1.0);
    }

    #[test]
    fn test_escaped_label_values() {
        let samples = parse(r#"m{response="a\"b\\c\nd"} 1"#).unwrap();
        assert_eq!(samples[0].label("response"), Some("a\"b\\c\nd"));
    }

    #[test]
    fn test_empty_label_value_and_special_floats() {
        let samples = parse("m{response=\"\"} +Inf\nn NaN\no{} 1.5e3").unwrap();
        assert_eq!(samples[0].label("response"), Some(""));
        assert!(samples[0].value.is_infinite());
        assert!(samples[1].value.is_nan());
        assert_eq!(samples[2].value, 1500.0);
    }

    #[test]
    fn test_malformed_line_reports_line_number() {
        let err = parse("ok 1\nbroken{query=\"x\" 2").unwrap_err();
        match err {
            Error::MetricsParse { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
