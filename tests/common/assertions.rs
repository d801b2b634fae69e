//! Custom assertion macros for logriver tests.

/// Assert that a `Result` failed with a `LogError` variant matching a pattern.
///
/// ```rust
/// assert_log_error!(result, logriver::LogError::Delivery(_));
/// ```
#[macro_export]
macro_rules! assert_log_error {
    ($result:expr, $pattern:pat) => {{
        match $result {
            Err($pattern) => {}
            Err(other) => panic!(
                "assert_log_error! failed:\n  expected: {}\n  actual:   {:?}",
                stringify!($pattern),
                other
            ),
            Ok(_) => panic!(
                "assert_log_error! failed: expected {} but the call succeeded",
                stringify!($pattern)
            ),
        }
    }};
}

/// Assert that every hit in a search response satisfies a predicate on its
/// unwrapped source.
///
/// ```rust
/// assert_hits_all!(response, |s| s["severity"] == "ERROR");
/// ```
#[macro_export]
macro_rules! assert_hits_all {
    ($response:expr, $pred:expr) => {{
        let response: &logriver::SearchResponse = &$response;
        let pred = $pred;
        let failing: Vec<_> = response.hits.iter().filter(|h| !pred(&h.source)).collect();
        if !failing.is_empty() {
            panic!(
                "assert_hits_all! failed: {} of {} hits did not satisfy predicate.\n  first: {:?}",
                failing.len(),
                response.hits.len(),
                failing[0]
            );
        }
    }};
}

/// Assert the `timestamp` fields of a search response, in order.
#[macro_export]
macro_rules! assert_hit_timestamps {
    ($response:expr, [$($ts:expr),* $(,)?]) => {{
        let response: &logriver::SearchResponse = &$response;
        let actual: Vec<String> = response
            .hits
            .iter()
            .map(|h| h.source["timestamp"].as_str().unwrap_or_default().to_string())
            .collect();
        let expected: Vec<String> = vec![$(logriver::types::iso8601(&$ts)),*];
        pretty_assertions::assert_eq!(actual, expected);
    }};
}
