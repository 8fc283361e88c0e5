//! Metric scraping, parsing and matching
//!
//! Validation always follows the same path: scrape the payload, parse it into
//! [`MetricSample`]s, keep the samples of one metric that satisfy a
//! [`LabelPredicate`], and require exactly one of them with the expected value.

mod parser;
mod predicate;
mod scrape;

pub use parser::{parse, MetricSample};
pub use predicate::{
    check_count, find_single, parse_count, validate_single, LabelMatch, LabelPredicate,
};
pub use scrape::{fetch_samples, metrics_url, HttpScraper, MetricsSource};
