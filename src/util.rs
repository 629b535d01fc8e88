//! Utility functions used by Gander, and available when writing performance tests.

use num_format::{Locale, ToFormattedString};
use regex::Regex;
use std::collections::BTreeMap;
use std::str::FromStr;
use url::Url;

use crate::GanderError;

/// Parse a string representing a time span and return the number of seconds.
///
/// Can be specified as an integer, indicating seconds. Or can use integers
/// together with one or more of "h", "m", and "s", in that order, indicating
/// "hours", "minutes", and "seconds".
///
/// Valid formats include: 20, 20s, 3m, 2h, 1h20m, 3h30m10s, etc.
///
/// # Example
/// ```rust
/// use gander::util;
///
/// // 1 hour 2 minutes and 3 seconds is 3,723 seconds.
/// assert_eq!(util::parse_timespan("1h2m3s"), 3_723);
///
/// // 45 seconds is 45 seconds.
/// assert_eq!(util::parse_timespan("45"), 45);
///
/// // Invalid value is 0 seconds.
/// assert_eq!(util::parse_timespan("foo"), 0);
/// ```
pub fn parse_timespan(time_str: &str) -> usize {
    match usize::from_str(time_str) {
        // If an integer is passed in, assume it's seconds
        Ok(t) => {
            trace!("{} is integer: {} seconds", time_str, t);
            t
        }
        // Otherwise use a regex to extract hours, minutes and seconds from string.
        Err(_) => {
            let re = Regex::new(r"((?P<hours>\d+?)h)?((?P<minutes>\d+?)m)?((?P<seconds>\d+?)s)?")
                .unwrap();
            let time_matches = re.captures(time_str).unwrap();
            let hours = match time_matches.name("hours") {
                Some(_) => usize::from_str(&time_matches["hours"]).unwrap(),
                None => 0,
            };
            let minutes = match time_matches.name("minutes") {
                Some(_) => usize::from_str(&time_matches["minutes"]).unwrap(),
                None => 0,
            };
            let seconds = match time_matches.name("seconds") {
                Some(_) => usize::from_str(&time_matches["seconds"]).unwrap(),
                None => 0,
            };
            let total = hours * 60 * 60 + minutes * 60 + seconds;
            trace!(
                "{} hours {} minutes {} seconds: {} seconds",
                hours,
                minutes,
                seconds,
                total
            );
            total
        }
    }
}

/// Substitute `{{PLACEHOLDER}}` markers in a template with values from a map.
///
/// Placeholders are uppercase names (letters, digits and underscores) wrapped
/// in double braces. A placeholder with no matching entry in the map is
/// replaced with an empty string.
///
/// # Example
/// ```rust
/// use std::collections::BTreeMap;
/// use gander::util;
///
/// let mut variables = BTreeMap::new();
/// variables.insert("NAME".to_string(), "spike_test".to_string());
///
/// // A known placeholder is replaced with its value.
/// assert_eq!(
///     util::render_template("test: {{NAME}}", &variables),
///     "test: spike_test"
/// );
///
/// // An unknown placeholder is replaced with an empty string.
/// assert_eq!(util::render_template("[{{OTHER}}]", &variables), "[]");
/// ```
pub fn render_template(template: &str, variables: &BTreeMap<String, String>) -> String {
    let re = Regex::new(r"\{\{([A-Z0-9_]+)\}\}").unwrap();
    let mut rendered = template.to_string();
    for capture in re.captures_iter(template) {
        let placeholder = capture.get(0).unwrap().as_str();
        let name = capture.get(1).unwrap().as_str();
        let value = variables.get(name).map(String::as_str).unwrap_or("");
        rendered = rendered.replace(placeholder, value);
    }
    rendered
}

/// Escape a string for safe inclusion in an HTML document.
///
/// # Example
/// ```rust
/// use gander::util;
///
/// assert_eq!(util::escape_html("<b>&\"'"), "&lt;b&gt;&amp;&quot;&#x27;");
/// ```
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

/// Format an integer with thousands separators for display.
///
/// # Example
/// ```rust
/// use gander::util;
///
/// assert_eq!(util::format_number(1_234_567), "1,234,567");
/// ```
pub fn format_number(number: u64) -> String {
    number.to_formatted_string(&Locale::en)
}

/// Get the response time that a certain percent of the requests finished within.
///
/// Expects response-time samples in milliseconds, sorted ascending. Returns 0
/// when the sample list is empty.
///
/// # Example
/// ```rust
/// use gander::util;
///
/// let samples = vec![100, 200, 300, 400, 500, 600, 700, 800, 900, 1000];
///
/// // Half of the requests finished within 500ms.
/// assert_eq!(util::percentile(&samples, 0.5), 500);
///
/// // All requests finished within 1,000ms.
/// assert_eq!(util::percentile(&samples, 1.0), 1000);
/// ```
pub fn percentile(sorted_samples: &[u64], percent: f64) -> u64 {
    if sorted_samples.is_empty() {
        return 0;
    }
    let percentile_request = (sorted_samples.len() as f64 * percent).round() as usize;
    // Percentiles smaller than 1/len round down to the first sample.
    let index = percentile_request.max(1) - 1;
    sorted_samples[index.min(sorted_samples.len() - 1)]
}

/// Truncate strings when they're too long to display.
///
/// If a string is longer than the specified max length, this function removes
/// the extra characters and replaces the last two with a double-period ellipsis.
///
/// # Example
/// ```rust
/// use gander::util;
///
/// // All but 7 characters are truncated, with ".." appended.
/// assert_eq!(util::truncate_string("this is a long string", 9), "this is..");
///
/// // All characters are returned as the string is less than 15 characters long.
/// assert_eq!(util::truncate_string("shorter string", 15), "shorter string");
/// ```
pub fn truncate_string(str_to_truncate: &str, max_length: usize) -> String {
    if str_to_truncate.char_indices().count() > max_length {
        match str_to_truncate.char_indices().nth(max_length - 2) {
            None => str_to_truncate.to_string(),
            Some((idx, _)) => format!("{}..", &str_to_truncate[..idx]),
        }
    } else {
        str_to_truncate.to_string()
    }
}

/// Build a `yyyyMMdd_HHmmss` timestamp from the current local time, used to
/// give scenario names and report artifacts unique, sortable suffixes.
pub fn file_timestamp() -> String {
    chrono::Local::now().format("%Y%m%d_%H%M%S").to_string()
}

/// Helper function to determine if a host can be parsed.
///
/// # Example
/// ```rust
/// use gander::util;
///
/// // Hostname is a valid URL.
/// assert_eq!(util::is_valid_host("http://localhost/").is_ok(), true);
///
/// // IP is a valid URL.
/// assert_eq!(util::is_valid_host("http://127.0.0.1").is_ok(), true);
///
/// // Protocol is required.
/// assert_eq!(util::is_valid_host("example.com/").is_ok(), false);
/// ```
pub fn is_valid_host(host: &str) -> Result<bool, GanderError> {
    Url::parse(host).map_err(|parse_error| GanderError::InvalidHost {
        host: host.to_string(),
        detail: "Invalid host.".to_string(),
        parse_error,
    })?;
    Ok(true)
}
