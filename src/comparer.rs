use crate::{BodyData, HttpMethod, RequestData};
use std::{collections::HashMap, fmt::Debug, fmt::Display};

/// Which field of the actual request diverged from the expectation, with
/// enough detail to render a diagnostic line.
#[derive(Debug, Clone, PartialEq)]
pub enum Mismatch {
    Method {
        expected: HttpMethod,
        actual: HttpMethod,
    },
    Path {
        expected: String,
        actual: String,
    },
    Query {
        key: String,
        expected: Vec<String>,
        actual: Vec<String>,
    },
    Header {
        key: String,
        expected: String,
        actual: Option<String>,
    },
    Body {
        expected: Option<BodyData>,
        actual: Option<BodyData>,
    },
}

impl Display for Mismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mismatch::Method { expected, actual } => {
                write!(f, "Expected method {}, got {}", expected, actual)
            }
            Mismatch::Path { expected, actual } => {
                write!(f, "Expected path {}, got {}", expected, actual)
            }
            Mismatch::Query {
                key,
                expected,
                actual,
            } => {
                if actual.is_empty() {
                    write!(f, "Missing query parameter {}={:?}", key, expected)
                } else {
                    write!(
                        f,
                        "Expected query parameter {}={:?}, got {:?}",
                        key, expected, actual
                    )
                }
            }
            Mismatch::Header {
                key,
                expected,
                actual,
            } => match actual {
                Some(actual) => write!(
                    f,
                    "Expected header {}: {}, got {}: {}",
                    key, expected, key, actual
                ),
                None => write!(f, "Missing header {}: {}", key, expected),
            },
            Mismatch::Body { expected, actual } => {
                write!(f, "Expected body {:?}, got {:?}", expected, actual)
            }
        }
    }
}

/// Decides whether an actual request satisfies the expected one. The default
/// implementation is [`ProviderRequestComparer`]; a custom implementation is
/// the extension point for looser matching strategies such as path templates.
pub trait RequestComparer: Debug {
    /// Short-circuits on the first divergent field, in the order
    /// method, path, query, headers, body.
    fn compare(&self, expected: &RequestData, actual: &RequestData) -> Result<(), Mismatch>;

    /// Collects every divergent field instead of stopping at the first.
    fn compare_full(&self, expected: &RequestData, actual: &RequestData) -> Vec<Mismatch>;
}

/// Field-wise comparer with subset semantics for query parameters and
/// headers: only the keys the consumer declared on the expected request are
/// asserted; extra keys on the actual request are tolerated.
#[derive(Debug, Default)]
pub struct ProviderRequestComparer;

impl ProviderRequestComparer {
    pub fn new() -> Self {
        Self
    }

    fn check_method(expected: &RequestData, actual: &RequestData) -> Option<Mismatch> {
        if expected.method != actual.method {
            Some(Mismatch::Method {
                expected: expected.method,
                actual: actual.method,
            })
        } else {
            None
        }
    }

    fn check_path(expected: &RequestData, actual: &RequestData) -> Option<Mismatch> {
        if expected.path != actual.path {
            Some(Mismatch::Path {
                expected: expected.path.clone(),
                actual: actual.path.clone(),
            })
        } else {
            None
        }
    }

    fn check_query(expected: &RequestData, actual: &RequestData) -> Vec<Mismatch> {
        let expected_by_key = group_query(&expected.query);
        let actual_by_key = group_query(&actual.query);
        let mut mismatches = Vec::new();
        let mut seen = Vec::new();

        // Walk the declared order so diagnostics come out in it.
        for (key, _) in &expected.query {
            if seen.contains(&key.as_str()) {
                continue;
            }
            seen.push(key.as_str());

            let expected_values = expected_by_key[key.as_str()].clone();
            let actual_values = actual_by_key.get(key.as_str()).cloned().unwrap_or_default();
            if actual_values != expected_values {
                mismatches.push(Mismatch::Query {
                    key: key.clone(),
                    expected: expected_values,
                    actual: actual_values,
                });
            }
        }

        mismatches
    }

    fn check_headers(expected: &RequestData, actual: &RequestData) -> Vec<Mismatch> {
        let actual_lowercased = actual
            .headers
            .iter()
            .map(|(key, value)| (key.to_lowercase(), value.clone()))
            .collect::<HashMap<_, _>>();
        let mut mismatches = Vec::new();

        for (key, expected_value) in &expected.headers {
            let actual_value = actual_lowercased.get(&key.to_lowercase());
            if actual_value != Some(expected_value) {
                mismatches.push(Mismatch::Header {
                    key: key.clone(),
                    expected: expected_value.clone(),
                    actual: actual_value.cloned(),
                });
            }
        }

        mismatches
    }

    fn check_body(expected: &RequestData, actual: &RequestData) -> Option<Mismatch> {
        let matches = match (&expected.body, &actual.body) {
            // The consumer declared nothing about the body.
            (None, _) => true,
            (Some(BodyData::Json(expected)), Some(BodyData::Json(actual))) => expected == actual,
            (Some(BodyData::Raw(expected)), Some(BodyData::Raw(actual))) => expected == actual,
            _ => false,
        };

        if matches {
            None
        } else {
            Some(Mismatch::Body {
                expected: expected.body.clone(),
                actual: actual.body.clone(),
            })
        }
    }
}

impl RequestComparer for ProviderRequestComparer {
    fn compare(&self, expected: &RequestData, actual: &RequestData) -> Result<(), Mismatch> {
        if let Some(mismatch) = Self::check_method(expected, actual) {
            return Err(mismatch);
        }
        if let Some(mismatch) = Self::check_path(expected, actual) {
            return Err(mismatch);
        }
        if let Some(mismatch) = Self::check_query(expected, actual).into_iter().next() {
            return Err(mismatch);
        }
        if let Some(mismatch) = Self::check_headers(expected, actual).into_iter().next() {
            return Err(mismatch);
        }
        if let Some(mismatch) = Self::check_body(expected, actual) {
            return Err(mismatch);
        }

        Ok(())
    }

    fn compare_full(&self, expected: &RequestData, actual: &RequestData) -> Vec<Mismatch> {
        let mut mismatches = Vec::new();
        mismatches.extend(Self::check_method(expected, actual));
        mismatches.extend(Self::check_path(expected, actual));
        mismatches.extend(Self::check_query(expected, actual));
        mismatches.extend(Self::check_headers(expected, actual));
        mismatches.extend(Self::check_body(expected, actual));
        mismatches
    }
}

fn group_query<'a>(query: &'a [(String, String)]) -> HashMap<&'a str, Vec<String>> {
    let mut grouped: HashMap<&str, Vec<String>> = HashMap::new();
    for (key, value) in query {
        grouped.entry(key.as_str()).or_default().push(value.clone());
    }
    grouped
}
