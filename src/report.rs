//! Renders session results into HTML, JSON and CSV report artifacts.
//!
//! Report files are written into the configured reports directory with a
//! `{name}_{yyyyMMdd_HHmmss}` timestamp suffix so successive sessions don't
//! overwrite each other.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::metrics::{ScenarioMetrics, SessionSummary};
use crate::util;
use crate::GanderError;

/// Template used to generate an HTML report.
pub const TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head>
    <title>Performance Test Report</title>
    <style>
        body {
            margin: 0;
            background: #f5fafa;
        }

        .container {
            width: 1000px;
            margin: 0 auto;
            padding: 10px;
            font-family: Arial, Helvetica, sans-serif;
            font-size: 14px;
            color: #333;
        }

        .info span {
            color: #5a6d64;
        }

        .summary-box {
            display: inline-block;
            min-width: 130px;
            margin: 5px;
            padding: 10px;
            background: #173529;
            color: #fff;
            text-align: center;
        }

        .summary-box .value {
            font-size: 22px;
        }

        table {
            border-collapse: collapse;
            text-align: center;
            width: 100%;
        }

        td, th {
            border: 1px solid #cad9ea;
            color: #666;
            height: 30px;
        }

        thead th {
            background-color: #cce8eb;
        }

        tr:nth-child(odd) {
            background: #fff;
        }

        tr:nth-child(even) {
            background: #f5fafa;
        }

        .status-passed {
            color: #00ca5a;
        }

        .status-failed {
            color: #ca0000;
        }

        .recommendation-success {
            padding: 10px;
            background: #e7f7ed;
            border-left: 4px solid #00ca5a;
        }

        .recommendation-warning {
            padding: 10px;
            background: #fdf6e3;
            border-left: 4px solid #e0a800;
        }

        .recommendation-danger {
            padding: 10px;
            background: #fdeaea;
            border-left: 4px solid #ca0000;
        }
    </style>
</head>
<body>
    <div class="container">
        <h1>Performance Test Report</h1>

        <div class="info">
            <p>Generated: <span>{{GENERATION_TIME}}</span></p>
        </div>

        <div class="summary">
            <div class="summary-box"><div class="value">{{TOTAL_TESTS}}</div>Scenarios</div>
            <div class="summary-box"><div class="value">{{PASS_RATE}}%</div>Pass Rate</div>
            <div class="summary-box"><div class="value">{{AVG_THROUGHPUT}}</div>Avg req/s</div>
            <div class="summary-box"><div class="value">{{AVG_P95}} ms</div>Avg P95</div>
            <div class="summary-box"><div class="value">{{AVG_ERROR_RATE}}%</div>Avg Error Rate</div>
        </div>

        <div class="analysis">
            <h2>Analysis</h2>
            <p>Total requests issued: <span>{{TOTAL_REQUESTS}}</span></p>
            <p>Overall success rate: <span>{{OVERALL_SUCCESS_RATE}}%</span></p>
            <p>Peak throughput: <span>{{PEAK_THROUGHPUT}} req/s</span></p>
            <p>Baseline status: <span>{{BASELINE_STATUS}}</span></p>
        </div>

        <div class="results">
            <h2>Scenario Results</h2>
            <table>
                <thead>
                    <tr>
                        <th>Name</th>
                        <th>Type</th>
                        <th>Status</th>
                        <th>Duration (s)</th>
                        <th>Requests</th>
                        <th>Success Rate (%)</th>
                        <th>Throughput (req/s)</th>
                        <th>Avg (ms)</th>
                        <th>P95 (ms)</th>
                        <th>P99 (ms)</th>
                        <th>Error Rate (%)</th>
                    </tr>
                </thead>
                <tbody>
{{TEST_RESULTS_ROWS}}
                </tbody>
            </table>
        </div>

{{FAILED_TESTS_SECTION}}

        <div class="recommendations">
            <h2>Recommendations</h2>
{{RECOMMENDATIONS}}
        </div>
    </div>
</body>
</html>"#;

/// Template for one row of the scenario results table.
const RESULT_ROW_TEMPLATE: &str = r#"                    <tr>
                        <td>{{TEST_NAME}}</td>
                        <td>{{TEST_TYPE}}</td>
                        <td class="{{STATUS_CLASS}}">{{STATUS_TEXT}}</td>
                        <td>{{DURATION}}</td>
                        <td>{{TOTAL_REQUESTS}}</td>
                        <td>{{SUCCESS_RATE}}</td>
                        <td>{{THROUGHPUT}}</td>
                        <td>{{AVG_RESPONSE_TIME}}</td>
                        <td>{{P95_RESPONSE_TIME}}</td>
                        <td>{{P99_RESPONSE_TIME}}</td>
                        <td>{{ERROR_RATE}}</td>
                    </tr>"#;

/// Template for the failed-scenarios section, rendered only when at least one
/// scenario failed.
const FAILED_SECTION_TEMPLATE: &str = r#"        <div class="failures">
            <h2>Failed Scenarios</h2>
            <table>
                <thead>
                    <tr>
                        <th>Name</th>
                        <th>Failure Reason</th>
                        <th>Error Rate (%)</th>
                        <th>P95 (ms)</th>
                        <th>Throughput (req/s)</th>
                    </tr>
                </thead>
                <tbody>
{{FAILED_TEST_ROWS}}
                </tbody>
            </table>
        </div>"#;

/// Template for one row of the failed-scenarios table.
const FAILED_ROW_TEMPLATE: &str = r#"                    <tr>
                        <td>{{TEST_NAME}}</td>
                        <td>{{FAILURE_REASON}}</td>
                        <td>{{ERROR_RATE}}</td>
                        <td>{{P95_RESPONSE_TIME}}</td>
                        <td>{{THROUGHPUT}}</td>
                    </tr>"#;

const RECOMMENDATION_SUCCESS: &str = r#"            <div class="recommendation-success">
                <strong>Excellent Performance:</strong> the system is performing well within
                the configured thresholds. Consider establishing this run as the baseline.
            </div>"#;

const RECOMMENDATION_WARNING: &str = r#"            <div class="recommendation-warning">
                <strong>Performance Concerns:</strong> some scenarios are failing their
                thresholds. Review the failed scenarios and the critical paths they exercise.
            </div>"#;

const RECOMMENDATION_DANGER: &str = r#"            <div class="recommendation-danger">
                <strong>Performance Issues:</strong> significant degradation detected.
                Immediate investigation is required before establishing a baseline.
            </div>"#;

/// The fixed column order of CSV reports.
const CSV_HEADER: &str = "Test Name,Type,Status,Start Time,Duration (s),Total Requests,\
Successful,Failed,Error Rate (%),Throughput (req/s),Avg Response (ms),P95 (ms),P99 (ms)";

/// Writes report artifacts for a session into the reports directory.
pub struct ReportGenerator {
    report_directory: PathBuf,
}

impl ReportGenerator {
    /// Create a generator, creating the reports directory if needed.
    pub fn new(report_directory: &Path) -> Result<ReportGenerator, GanderError> {
        fs::create_dir_all(report_directory)?;
        Ok(ReportGenerator {
            report_directory: report_directory.to_path_buf(),
        })
    }

    /// Render the session summary to a timestamped HTML file.
    pub fn write_html_report(
        &self,
        summary: &SessionSummary,
        report_name: &str,
    ) -> Result<PathBuf, GanderError> {
        self.write(report_name, "html", render_html(summary))
    }

    /// Serialize the scenario records to a timestamped JSON file.
    pub fn write_json_report(
        &self,
        results: &[ScenarioMetrics],
        report_name: &str,
    ) -> Result<PathBuf, GanderError> {
        self.write(report_name, "json", render_json(results)?)
    }

    /// Render the scenario records to a timestamped CSV file.
    pub fn write_csv_report(
        &self,
        results: &[ScenarioMetrics],
        report_name: &str,
    ) -> Result<PathBuf, GanderError> {
        self.write(report_name, "csv", render_csv(results))
    }

    fn write(
        &self,
        report_name: &str,
        extension: &str,
        content: String,
    ) -> Result<PathBuf, GanderError> {
        fs::create_dir_all(&self.report_directory)?;
        let file_name = self.report_directory.join(format!(
            "{}_{}.{}",
            report_name,
            util::file_timestamp(),
            extension
        ));
        fs::write(&file_name, content)?;
        info!("performance report generated: {}", file_name.display());
        Ok(file_name)
    }
}

/// Render a session summary as a self-contained HTML document.
pub fn render_html(summary: &SessionSummary) -> String {
    let mut variables = BTreeMap::new();
    variables.insert(
        "GENERATION_TIME".to_string(),
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
    );
    variables.insert("TOTAL_TESTS".to_string(), summary.total_tests.to_string());
    variables.insert("PASS_RATE".to_string(), format!("{:.1}", summary.pass_rate()));
    variables.insert(
        "AVG_THROUGHPUT".to_string(),
        format!("{:.1}", summary.average_throughput),
    );
    variables.insert(
        "AVG_P95".to_string(),
        format!("{:.0}", summary.average_p95_response_time),
    );
    variables.insert(
        "AVG_ERROR_RATE".to_string(),
        format!("{:.2}", summary.average_error_rate),
    );

    let total_requests: u64 = summary
        .results
        .iter()
        .map(|metrics| metrics.total_requests)
        .sum();
    let overall_success_rate = if summary.results.is_empty() {
        0.0
    } else {
        summary
            .results
            .iter()
            .map(|metrics| metrics.success_rate())
            .sum::<f64>()
            / summary.results.len() as f64
    };
    let peak_throughput = summary
        .results
        .iter()
        .map(|metrics| metrics.throughput)
        .fold(0.0, f64::max);
    variables.insert(
        "TOTAL_REQUESTS".to_string(),
        util::format_number(total_requests),
    );
    variables.insert(
        "OVERALL_SUCCESS_RATE".to_string(),
        format!("{:.1}", overall_success_rate),
    );
    variables.insert(
        "PEAK_THROUGHPUT".to_string(),
        format!("{:.1}", peak_throughput),
    );
    variables.insert(
        "BASELINE_STATUS".to_string(),
        if summary.passed_tests > 0 {
            "ESTABLISHED".to_string()
        } else {
            "NEEDS ATTENTION".to_string()
        },
    );

    variables.insert(
        "TEST_RESULTS_ROWS".to_string(),
        results_rows(&summary.results),
    );
    variables.insert(
        "FAILED_TESTS_SECTION".to_string(),
        if summary.failed_tests > 0 {
            failed_tests_section(&summary.results)
        } else {
            String::new()
        },
    );
    variables.insert(
        "RECOMMENDATIONS".to_string(),
        recommendations(summary.pass_rate()).to_string(),
    );

    util::render_template(TEMPLATE, &variables)
}

/// Serialize scenario records as pretty-printed JSON.
pub fn render_json(results: &[ScenarioMetrics]) -> Result<String, GanderError> {
    Ok(serde_json::to_string_pretty(results)?)
}

/// Render scenario records as CSV: a header line plus one line per record.
pub fn render_csv(results: &[ScenarioMetrics]) -> String {
    let mut csv = String::from(CSV_HEADER);
    csv.push('\n');
    for metrics in results {
        csv.push_str(&format!(
            "{},{},{},{},{},{},{},{},{:.2},{:.2},{},{},{}\n",
            metrics.name,
            metrics.kind,
            if metrics.passed { "PASSED" } else { "FAILED" },
            metrics.started.format("%Y-%m-%dT%H:%M:%S"),
            metrics.duration_seconds,
            metrics.total_requests,
            metrics.successful_requests,
            metrics.failed_requests,
            metrics.error_rate,
            metrics.throughput,
            metrics.average_response_time,
            metrics.p95_response_time,
            metrics.p99_response_time,
        ));
    }
    csv
}

/// Render the scenario results table rows.
fn results_rows(results: &[ScenarioMetrics]) -> String {
    let mut rows = Vec::new();
    for metrics in results {
        let mut variables = BTreeMap::new();
        variables.insert("TEST_NAME".to_string(), util::escape_html(&metrics.name));
        variables.insert("TEST_TYPE".to_string(), metrics.kind.to_string());
        variables.insert(
            "STATUS_CLASS".to_string(),
            if metrics.passed {
                "status-passed".to_string()
            } else {
                "status-failed".to_string()
            },
        );
        variables.insert(
            "STATUS_TEXT".to_string(),
            if metrics.passed {
                "PASSED".to_string()
            } else {
                "FAILED".to_string()
            },
        );
        variables.insert("DURATION".to_string(), metrics.duration_seconds.to_string());
        variables.insert(
            "TOTAL_REQUESTS".to_string(),
            util::format_number(metrics.total_requests),
        );
        variables.insert(
            "SUCCESS_RATE".to_string(),
            format!("{:.2}", metrics.success_rate()),
        );
        variables.insert("THROUGHPUT".to_string(), format!("{:.2}", metrics.throughput));
        variables.insert(
            "AVG_RESPONSE_TIME".to_string(),
            metrics.average_response_time.to_string(),
        );
        variables.insert(
            "P95_RESPONSE_TIME".to_string(),
            metrics.p95_response_time.to_string(),
        );
        variables.insert(
            "P99_RESPONSE_TIME".to_string(),
            metrics.p99_response_time.to_string(),
        );
        variables.insert("ERROR_RATE".to_string(), format!("{:.2}", metrics.error_rate));
        rows.push(util::render_template(RESULT_ROW_TEMPLATE, &variables));
    }
    rows.join("\n")
}

/// Render the failed-scenarios section.
fn failed_tests_section(results: &[ScenarioMetrics]) -> String {
    let mut rows = Vec::new();
    for metrics in results.iter().filter(|metrics| !metrics.passed) {
        let mut variables = BTreeMap::new();
        variables.insert("TEST_NAME".to_string(), util::escape_html(&metrics.name));
        variables.insert(
            "FAILURE_REASON".to_string(),
            util::escape_html(
                metrics
                    .failure_reason
                    .as_deref()
                    .unwrap_or("Threshold exceeded"),
            ),
        );
        variables.insert("ERROR_RATE".to_string(), format!("{:.2}", metrics.error_rate));
        variables.insert(
            "P95_RESPONSE_TIME".to_string(),
            metrics.p95_response_time.to_string(),
        );
        variables.insert("THROUGHPUT".to_string(), format!("{:.2}", metrics.throughput));
        rows.push(util::render_template(FAILED_ROW_TEMPLATE, &variables));
    }

    let mut variables = BTreeMap::new();
    variables.insert("FAILED_TEST_ROWS".to_string(), rows.join("\n"));
    util::render_template(FAILED_SECTION_TEMPLATE, &variables)
}

/// Pick the recommendation tier for a pass rate.
fn recommendations(pass_rate: f64) -> &'static str {
    if pass_rate >= 90.0 {
        RECOMMENDATION_SUCCESS
    } else if pass_rate >= 70.0 {
        RECOMMENDATION_WARNING
    } else {
        RECOMMENDATION_DANGER
    }
}
