//! Threshold evaluation for scenario metrics.
//!
//! The session applies [`evaluate`] to every completed scenario; a violated
//! threshold is a recorded outcome, never an error. The `verify_*` checks are
//! the standalone form, returning a [`GanderError::ThresholdExceeded`] so a
//! test suite can assert directly on individual limits or compare a run
//! against a baseline.

use strum_macros::{Display, EnumString};

use crate::config::GanderConfiguration;
use crate::metrics::ScenarioMetrics;
use crate::GanderError;

/// Selects which response-time measurement a check applies to.
#[derive(Clone, Copy, Debug, Display, EnumString, Eq, PartialEq)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Percentile {
    /// The mean response time.
    #[strum(to_string = "avg", serialize = "average")]
    Average,
    /// The median response time.
    #[strum(to_string = "p50", serialize = "median")]
    P50,
    /// The 95th percentile response time.
    P95,
    /// The 99th percentile response time.
    P99,
    /// The slowest observed response time.
    Max,
}

impl Percentile {
    /// Pull the selected measurement out of a record, in milliseconds.
    fn measure(&self, metrics: &ScenarioMetrics) -> u64 {
        match self {
            Percentile::Average => metrics.average_response_time,
            Percentile::P50 => metrics.p50_response_time,
            Percentile::P95 => metrics.p95_response_time,
            Percentile::P99 => metrics.p99_response_time,
            Percentile::Max => metrics.maximum_response_time,
        }
    }
}

/// Compare a scenario record against the configured thresholds.
///
/// Checks error rate, p95, p99 and throughput in order, accumulating one
/// reason clause for every violated check. The record passes only when all
/// four checks hold; the reason is empty for a passing record. Evaluation is
/// pure: the same inputs always produce the same outcome.
pub fn evaluate(metrics: &ScenarioMetrics, configuration: &GanderConfiguration) -> (bool, String) {
    let mut failure_reason = String::new();

    if metrics.error_rate > configuration.error_rate_threshold() {
        failure_reason.push_str(&format!(
            "Error rate {:.2}% exceeds threshold {:.2}%. ",
            metrics.error_rate,
            configuration.error_rate_threshold()
        ));
    }

    if metrics.p95_response_time > configuration.p95_threshold() {
        failure_reason.push_str(&format!(
            "P95 response time {}ms exceeds threshold {}ms. ",
            metrics.p95_response_time,
            configuration.p95_threshold()
        ));
    }

    if metrics.p99_response_time > configuration.p99_threshold() {
        failure_reason.push_str(&format!(
            "P99 response time {}ms exceeds threshold {}ms. ",
            metrics.p99_response_time,
            configuration.p99_threshold()
        ));
    }

    if metrics.throughput < configuration.minimum_throughput() {
        failure_reason.push_str(&format!(
            "Throughput {:.2} req/s below minimum {:.2} req/s. ",
            metrics.throughput,
            configuration.minimum_throughput()
        ));
    }

    (failure_reason.is_empty(), failure_reason)
}

/// Check that the selected response-time measurement does not exceed a limit.
pub fn verify_response_time(
    metrics: &ScenarioMetrics,
    percentile: Percentile,
    max_response_time_ms: u64,
) -> Result<(), GanderError> {
    let actual = percentile.measure(metrics);
    if actual > max_response_time_ms {
        return Err(GanderError::ThresholdExceeded {
            check: format!("{} response time", percentile),
            actual: format!("{}ms", actual),
            limit: format!("<= {}ms", max_response_time_ms),
        });
    }
    info!(
        "validated {} response time: {}ms <= {}ms",
        percentile, actual, max_response_time_ms
    );
    Ok(())
}

/// Check that throughput meets a minimum rate.
pub fn verify_throughput(
    metrics: &ScenarioMetrics,
    minimum_throughput: f64,
) -> Result<(), GanderError> {
    if metrics.throughput < minimum_throughput {
        return Err(GanderError::ThresholdExceeded {
            check: "throughput".to_string(),
            actual: format!("{:.2} req/s", metrics.throughput),
            limit: format!(">= {:.2} req/s", minimum_throughput),
        });
    }
    info!(
        "validated throughput: {:.2} req/s >= {:.2} req/s",
        metrics.throughput, minimum_throughput
    );
    Ok(())
}

/// Check that the error rate does not exceed a ceiling.
pub fn verify_error_rate(
    metrics: &ScenarioMetrics,
    max_error_rate: f64,
) -> Result<(), GanderError> {
    if metrics.error_rate > max_error_rate {
        return Err(GanderError::ThresholdExceeded {
            check: "error rate".to_string(),
            actual: format!("{:.2}%", metrics.error_rate),
            limit: format!("<= {:.2}%", max_error_rate),
        });
    }
    info!(
        "validated error rate: {:.2}% <= {:.2}%",
        metrics.error_rate, max_error_rate
    );
    Ok(())
}

/// Check that the success rate meets a minimum percentage.
pub fn verify_success_rate(
    metrics: &ScenarioMetrics,
    min_success_rate: f64,
) -> Result<(), GanderError> {
    let actual = metrics.success_rate();
    if actual < min_success_rate {
        return Err(GanderError::ThresholdExceeded {
            check: "success rate".to_string(),
            actual: format!("{:.2}%", actual),
            limit: format!(">= {:.2}%", min_success_rate),
        });
    }
    info!(
        "validated success rate: {:.2}% >= {:.2}%",
        actual, min_success_rate
    );
    Ok(())
}

/// Check a record against every configured threshold, failing on the first
/// violation.
pub fn verify_thresholds(
    metrics: &ScenarioMetrics,
    configuration: &GanderConfiguration,
) -> Result<(), GanderError> {
    verify_response_time(metrics, Percentile::P95, configuration.p95_threshold())?;
    verify_response_time(metrics, Percentile::P99, configuration.p99_threshold())?;
    verify_error_rate(metrics, configuration.error_rate_threshold())?;
    verify_throughput(metrics, configuration.minimum_throughput())?;
    info!("all thresholds validated for scenario {}", metrics.name);
    Ok(())
}

/// Compare a run against a baseline run, checking that throughput has not
/// dropped and p95 response time has not grown by more than the allowed
/// percentage.
pub fn verify_no_degradation(
    current: &ScenarioMetrics,
    baseline: &ScenarioMetrics,
    max_degradation_percent: f64,
) -> Result<(), GanderError> {
    let throughput_change =
        (current.throughput - baseline.throughput) / baseline.throughput * 100.0;
    if throughput_change < -max_degradation_percent {
        return Err(GanderError::ThresholdExceeded {
            check: "throughput degradation".to_string(),
            actual: format!("{:.2}%", -throughput_change),
            limit: format!("<= {:.2}%", max_degradation_percent),
        });
    }

    let p95_change = (current.p95_response_time as f64 - baseline.p95_response_time as f64)
        / baseline.p95_response_time as f64
        * 100.0;
    if p95_change > max_degradation_percent {
        return Err(GanderError::ThresholdExceeded {
            check: "p95 response time degradation".to_string(),
            actual: format!("{:.2}%", p95_change),
            limit: format!("<= {:.2}%", max_degradation_percent),
        });
    }

    info!(
        "validated degradation against baseline {}: throughput {:+.2}%, p95 {:+.2}%",
        baseline.name, throughput_change, p95_change
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::tests::sample_metrics;

    fn test_configuration() -> GanderConfiguration {
        // Defaults: p95 <= 2000ms, p99 <= 5000ms, error rate <= 1.0%,
        // throughput >= 10 req/s.
        GanderConfiguration::default()
    }

    #[test]
    fn evaluate_passing_record() {
        let configuration = test_configuration();
        let metrics = sample_metrics("load_test", false);
        let (passed, reason) = evaluate(&metrics, &configuration);
        assert!(passed);
        assert!(reason.is_empty());
    }

    #[test]
    fn evaluate_error_rate_violation() {
        let configuration = test_configuration();
        let mut metrics = sample_metrics("load_test", false);
        metrics.error_rate = 2.0;
        let (passed, reason) = evaluate(&metrics, &configuration);
        assert!(!passed);
        assert!(reason.contains("Error rate 2.00% exceeds threshold 1.00%"));
        // Only the one violated check contributes a clause.
        assert!(!reason.contains("P95"));
        assert!(!reason.contains("P99"));
        assert!(!reason.contains("Throughput"));
    }

    #[test]
    fn evaluate_accumulates_all_clauses() {
        let configuration = test_configuration();
        let mut metrics = sample_metrics("stress_test", false);
        metrics.error_rate = 5.0;
        metrics.p95_response_time = 3_000;
        metrics.p99_response_time = 8_000;
        metrics.throughput = 2.5;
        let (passed, reason) = evaluate(&metrics, &configuration);
        assert!(!passed);
        // One clause per violated check, all four present.
        assert!(reason.contains("Error rate 5.00% exceeds threshold 1.00%"));
        assert!(reason.contains("P95 response time 3000ms exceeds threshold 2000ms"));
        assert!(reason.contains("P99 response time 8000ms exceeds threshold 5000ms"));
        assert!(reason.contains("Throughput 2.50 req/s below minimum 10.00 req/s"));
        assert_eq!(reason.matches(". ").count(), 4);
    }

    #[test]
    fn evaluate_is_idempotent() {
        let configuration = test_configuration();
        let mut metrics = sample_metrics("load_test", false);
        metrics.p95_response_time = 2_500;
        let first = evaluate(&metrics, &configuration);
        let second = evaluate(&metrics, &configuration);
        assert_eq!(first, second);
    }

    #[test]
    fn response_time_by_percentile() {
        let metrics = sample_metrics("load_test", true);
        // avg=500, p50=450, p95=1200, p99=1800, max=2000.
        assert!(verify_response_time(&metrics, Percentile::Average, 500).is_ok());
        assert!(verify_response_time(&metrics, Percentile::P50, 400).is_err());
        assert!(verify_response_time(&metrics, Percentile::P95, 1_200).is_ok());
        assert!(verify_response_time(&metrics, Percentile::P99, 1_500).is_err());
        assert!(verify_response_time(&metrics, Percentile::Max, 2_000).is_ok());
    }

    #[test]
    fn percentile_aliases() {
        assert_eq!("avg".parse::<Percentile>().unwrap(), Percentile::Average);
        assert_eq!("average".parse::<Percentile>().unwrap(), Percentile::Average);
        assert_eq!("p50".parse::<Percentile>().unwrap(), Percentile::P50);
        assert_eq!("median".parse::<Percentile>().unwrap(), Percentile::P50);
        assert_eq!("P95".parse::<Percentile>().unwrap(), Percentile::P95);
        assert_eq!("p99".parse::<Percentile>().unwrap(), Percentile::P99);
        assert_eq!("max".parse::<Percentile>().unwrap(), Percentile::Max);
        assert!("p75".parse::<Percentile>().is_err());
    }

    #[test]
    fn throughput_and_rates() {
        let metrics = sample_metrics("load_test", true);
        assert!(verify_throughput(&metrics, 10.0).is_ok());
        assert!(verify_throughput(&metrics, 20.0).is_err());
        assert!(verify_error_rate(&metrics, 1.0).is_ok());
        assert!(verify_error_rate(&metrics, 0.1).is_err());
        // 995/1000 = 99.5% success.
        assert!(verify_success_rate(&metrics, 99.0).is_ok());
        assert!(verify_success_rate(&metrics, 99.9).is_err());
    }

    #[test]
    fn full_threshold_check() {
        let configuration = test_configuration();
        let metrics = sample_metrics("load_test", true);
        assert!(verify_thresholds(&metrics, &configuration).is_ok());

        let mut slow = sample_metrics("slow_test", true);
        slow.p99_response_time = 9_000;
        let error = verify_thresholds(&slow, &configuration).unwrap_err();
        assert!(error.to_string().contains("p99 response time"));
    }

    #[test]
    fn degradation_within_limits() {
        let baseline = sample_metrics("baseline", true);
        let mut current = sample_metrics("current", true);
        // 10% slower and 10% less throughput, within a 50% allowance.
        current.throughput = baseline.throughput * 0.9;
        current.p95_response_time = (baseline.p95_response_time as f64 * 1.1) as u64;
        assert!(verify_no_degradation(&current, &baseline, 50.0).is_ok());
        // An improvement always passes.
        current.throughput = baseline.throughput * 2.0;
        current.p95_response_time = baseline.p95_response_time / 2;
        assert!(verify_no_degradation(&current, &baseline, 5.0).is_ok());
    }

    #[test]
    fn degradation_beyond_limits() {
        let baseline = sample_metrics("baseline", true);

        let mut slow = sample_metrics("slow", true);
        slow.p95_response_time = baseline.p95_response_time * 2;
        let error = verify_no_degradation(&slow, &baseline, 50.0).unwrap_err();
        assert!(error.to_string().contains("p95 response time degradation"));

        let mut weak = sample_metrics("weak", true);
        weak.throughput = baseline.throughput / 4.0;
        let error = verify_no_degradation(&weak, &baseline, 50.0).unwrap_err();
        assert!(error.to_string().contains("throughput degradation"));
    }
}
