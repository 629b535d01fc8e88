//! The plan-driven JMeter executor.
//!
//! Runs pre-authored `.jmx` test plans through JMeter's non-GUI engine and
//! reduces the JTL results log into a [`ScenarioMetrics`] record. The engine
//! is initialized at most once per runner: the binary is checked and a
//! properties file is resolved (writing a default one when the installation
//! has none) behind a mutex so repeated or concurrent first-use cannot
//! initialize twice.

use chrono::prelude::*;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use crate::config::GanderConfiguration;
use crate::executor::ScenarioExecutor;
use crate::metrics::{ScenarioKind, ScenarioMetrics};
use crate::util;
use crate::GanderError;

/// Properties applied when the JMeter installation ships no properties file,
/// keeping the results log in CSV form with the fields the parser reads.
const DEFAULT_PROPERTIES: &str = "\
jmeter.save.saveservice.output_format=csv
jmeter.save.saveservice.timestamp_format=ms
jmeter.save.saveservice.timestamp=true
jmeter.save.saveservice.time=true
jmeter.save.saveservice.label=true
jmeter.save.saveservice.code=true
jmeter.save.saveservice.message=true
jmeter.save.saveservice.success=true
jmeter.save.saveservice.url=true
jmeter.save.saveservice.latency=true
jmeter.save.saveservice.bytes=true
jmeter.save.saveservice.sent_bytes=true
jmeter.save.saveservice.thread_counts=true
jmeter.save.saveservice.response_data=false
jmeter.save.saveservice.samplerData=false
jmeter.save.saveservice.requestHeaders=false
jmeter.save.saveservice.responseHeaders=false
";

/// One row of a JTL results log.
#[derive(Debug)]
struct Sample {
    timestamp_ms: u64,
    elapsed_ms: u64,
    success: bool,
}

/// Runs test plans with JMeter's non-GUI engine.
///
/// A missing test plan or an engine that cannot be started fails the
/// scenario. Anything else that goes wrong after the engine ran (non-zero
/// exit, missing, empty or unreadable results) degrades to a zero-valued
/// failed record.
pub struct JMeterRunner {
    jmeter_home: PathBuf,
    report_directory: PathBuf,
    // The resolved properties file, doubling as the initialized-once flag.
    properties_file: Mutex<Option<PathBuf>>,
}

impl JMeterRunner {
    /// Create a runner for the configured JMeter installation.
    pub fn new(configuration: &GanderConfiguration) -> JMeterRunner {
        JMeterRunner {
            jmeter_home: configuration.jmeter_home(),
            report_directory: configuration.report_directory(),
            properties_file: Mutex::new(None),
        }
    }

    /// Key-value overrides for a parameterized test plan.
    pub fn plan_properties(
        base_url: &str,
        users: usize,
        duration_seconds: usize,
    ) -> BTreeMap<String, String> {
        let mut properties = BTreeMap::new();
        properties.insert("base.url".to_string(), base_url.to_string());
        properties.insert("users".to_string(), users.to_string());
        properties.insert("duration".to_string(), duration_seconds.to_string());
        properties
    }

    /// Key-value overrides including a ramp-up period.
    pub fn plan_properties_with_ramp_up(
        base_url: &str,
        users: usize,
        duration_seconds: usize,
        ramp_up_seconds: usize,
    ) -> BTreeMap<String, String> {
        let mut properties = Self::plan_properties(base_url, users, duration_seconds);
        properties.insert("ramp.up".to_string(), ramp_up_seconds.to_string());
        properties
    }

    fn jmeter_binary(&self) -> PathBuf {
        self.jmeter_home.join("bin").join("jmeter")
    }

    /// Check the installation and resolve a properties file, at most once
    /// per runner.
    fn ensure_initialized(&self) -> Result<PathBuf, GanderError> {
        let mut guard = self
            .properties_file
            .lock()
            .expect("jmeter initialization lock poisoned");
        if let Some(properties) = guard.as_ref() {
            return Ok(properties.clone());
        }

        info!("initializing JMeter with home: {}", self.jmeter_home.display());
        let binary = self.jmeter_binary();
        if !binary.exists() {
            return Err(GanderError::ToolNotFound {
                tool: "jmeter".to_string(),
                path: binary.display().to_string(),
            });
        }

        let bundled = self.jmeter_home.join("bin").join("jmeter.properties");
        let properties = if bundled.exists() {
            debug!("loading JMeter properties from: {}", bundled.display());
            bundled
        } else {
            warn!(
                "JMeter properties file not found at: {}",
                bundled.display()
            );
            info!("creating default JMeter properties");
            self.write_default_properties()?
        };

        *guard = Some(properties.clone());
        info!("JMeter initialized successfully");
        Ok(properties)
    }

    /// Write a default properties file under the reports directory.
    fn write_default_properties(&self) -> Result<PathBuf, GanderError> {
        let temp_directory = self.report_directory.join("temp");
        fs::create_dir_all(&temp_directory)?;
        let properties = temp_directory.join("jmeter_default.properties");
        fs::write(&properties, DEFAULT_PROPERTIES)?;
        debug!("created default properties file: {}", properties.display());
        Ok(properties)
    }

    /// Reduce a JTL results log into a metrics record.
    fn parse_results(
        results_file: &Path,
        scenario_name: &str,
        started: DateTime<Utc>,
        ended: DateTime<Utc>,
    ) -> Result<ScenarioMetrics, GanderError> {
        let file = fs::File::open(results_file)?;
        let samples = Self::parse_samples(file, results_file)?;
        if samples.is_empty() {
            return Err(GanderError::Parse {
                path: results_file.display().to_string(),
                detail: "results log contains no samples".to_string(),
            });
        }

        let total_requests = samples.len() as u64;
        let successful_requests = samples.iter().filter(|sample| sample.success).count() as u64;
        let failed_requests = total_requests - successful_requests;
        let error_rate = failed_requests as f64 / total_requests as f64 * 100.0;

        let mut elapsed: Vec<u64> = samples.iter().map(|sample| sample.elapsed_ms).collect();
        elapsed.sort_unstable();
        let average_response_time =
            (elapsed.iter().sum::<u64>() as f64 / total_requests as f64).round() as u64;

        // Prefer the sampled time window for throughput; an implausibly
        // narrow window falls back to the wall-clock duration.
        let first_sample = samples.iter().map(|sample| sample.timestamp_ms).min().unwrap_or(0);
        let last_sample = samples.iter().map(|sample| sample.timestamp_ms).max().unwrap_or(0);
        let mut window_seconds = (last_sample - first_sample) as f64 / 1_000.0;
        if window_seconds <= 0.0 {
            window_seconds = (ended - started).num_seconds().max(0) as f64;
        }
        let throughput = if window_seconds > 0.0 {
            total_requests as f64 / window_seconds
        } else {
            0.0
        };

        Ok(ScenarioMetrics {
            name: scenario_name.to_string(),
            kind: ScenarioKind::Plan,
            started,
            ended,
            duration_seconds: (ended - started).num_seconds().max(0) as u64,
            total_requests,
            successful_requests,
            failed_requests,
            error_rate,
            throughput,
            average_response_time,
            minimum_response_time: *elapsed.first().unwrap(),
            maximum_response_time: *elapsed.last().unwrap(),
            p50_response_time: util::percentile(&elapsed, 0.5),
            p95_response_time: util::percentile(&elapsed, 0.95),
            p99_response_time: util::percentile(&elapsed, 0.99),
            custom_metrics: BTreeMap::new(),
            results_file: Some(results_file.to_path_buf()),
            passed: false,
            failure_reason: None,
        })
    }

    /// Read JTL rows, located by header name so column order doesn't matter.
    fn parse_samples<R: io::Read>(
        reader: R,
        results_file: &Path,
    ) -> Result<Vec<Sample>, GanderError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);
        let headers = csv_reader.headers()?.clone();

        let column = |name: &str| -> Result<usize, GanderError> {
            headers
                .iter()
                .position(|header| header == name)
                .ok_or_else(|| GanderError::Parse {
                    path: results_file.display().to_string(),
                    detail: format!("results log has no {} column", name),
                })
        };
        let timestamp_column = column("timeStamp")?;
        let elapsed_column = column("elapsed")?;
        let success_column = column("success")?;

        let mut samples = Vec::new();
        for record in csv_reader.records() {
            let record = record?;
            let field = |index: usize| record.get(index).unwrap_or("").trim();
            samples.push(Sample {
                timestamp_ms: field(timestamp_column).parse().unwrap_or(0),
                elapsed_ms: field(elapsed_column).parse().unwrap_or(0),
                success: field(success_column).eq_ignore_ascii_case("true"),
            });
        }
        Ok(samples)
    }
}

impl ScenarioExecutor for JMeterRunner {
    fn execute(
        &self,
        source: &Path,
        scenario_name: &str,
        properties: &BTreeMap<String, String>,
    ) -> Result<ScenarioMetrics, GanderError> {
        let started = Utc::now();
        if !source.exists() {
            return Err(GanderError::Executor {
                scenario: scenario_name.to_string(),
                detail: format!("test plan not found: {}", source.display()),
            });
        }
        let properties_file = self.ensure_initialized()?;

        fs::create_dir_all(&self.report_directory)?;
        let results_file = self
            .report_directory
            .join(format!("{}_results.jtl", scenario_name));

        info!(
            "starting JMeter scenario {} with plan {}",
            scenario_name,
            source.display()
        );
        let mut command = Command::new(self.jmeter_binary());
        command
            .arg("-n")
            .arg("-t")
            .arg(source)
            .arg("-l")
            .arg(&results_file)
            .arg("-p")
            .arg(&properties_file);
        for (key, value) in properties {
            debug!("set JMeter property: {} = {}", key, value);
            command.arg(format!("-J{}={}", key, value));
        }

        let output = command.output().map_err(|error| {
            if error.kind() == io::ErrorKind::NotFound {
                GanderError::ToolNotFound {
                    tool: "jmeter".to_string(),
                    path: self.jmeter_binary().display().to_string(),
                }
            } else {
                GanderError::Executor {
                    scenario: scenario_name.to_string(),
                    detail: format!("failed to start jmeter: {}", error),
                }
            }
        })?;
        for line in String::from_utf8_lossy(&output.stdout).lines() {
            debug!("jmeter: {}", line);
        }
        for line in String::from_utf8_lossy(&output.stderr).lines() {
            debug!("jmeter: {}", line);
        }
        if !output.status.success() {
            warn!("jmeter exited with {}", output.status);
        }

        // Give the result collector a moment to finish flushing to disk.
        thread::sleep(Duration::from_secs(2));
        let ended = Utc::now();

        let result_bytes = fs::metadata(&results_file)
            .map(|metadata| metadata.len())
            .unwrap_or(0);
        if result_bytes == 0 {
            warn!(
                "results file is empty or missing: {}",
                results_file.display()
            );
            return Ok(ScenarioMetrics::empty(
                scenario_name,
                ScenarioKind::Plan,
                started,
                ended,
                "No results generated",
            ));
        }

        match JMeterRunner::parse_results(&results_file, scenario_name, started, ended) {
            Ok(metrics) => {
                info!("JMeter scenario completed: {}", scenario_name);
                Ok(metrics)
            }
            Err(error) => {
                warn!(
                    "failed to parse JMeter results for {}: {}",
                    scenario_name, error
                );
                Ok(ScenarioMetrics::empty(
                    scenario_name,
                    ScenarioKind::Plan,
                    started,
                    ended,
                    &format!("Unreadable results: {}", error),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const JTL: &str = "\
timeStamp,elapsed,label,responseCode,responseMessage,threadName,dataType,success,failureMessage,bytes,sentBytes,grpThreads,allThreads,URL,Latency,IdleTime,Connect
1700000000000,120,HTTP Request,200,OK,Thread Group 1-1,text,true,,1024,256,10,10,http://localhost/posts,100,0,20
1700000001000,240,HTTP Request,200,OK,Thread Group 1-2,text,true,,1024,256,10,10,http://localhost/posts,200,0,20
1700000002000,480,HTTP Request,200,OK,Thread Group 1-3,text,true,,1024,256,10,10,http://localhost/users,400,0,20
1700000004000,960,HTTP Request,500,Internal Server Error,Thread Group 1-4,text,false,oops,512,256,10,10,http://localhost/comments,900,0,20
";

    fn fixture_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("{}_{}", std::process::id(), name))
    }

    #[test]
    fn parse_jtl_samples() {
        let samples =
            JMeterRunner::parse_samples(Cursor::new(JTL), Path::new("results.jtl")).unwrap();
        assert_eq!(samples.len(), 4);
        assert_eq!(samples[0].elapsed_ms, 120);
        assert!(samples[0].success);
        assert!(!samples[3].success);
    }

    #[test]
    fn parse_jtl_without_success_column() {
        let malformed = "timeStamp,elapsed,label\n1700000000000,120,HTTP Request\n";
        let error = JMeterRunner::parse_samples(Cursor::new(malformed), Path::new("results.jtl"))
            .unwrap_err();
        assert!(error.to_string().contains("success"));
    }

    #[test]
    fn reduce_results() {
        let results_file = fixture_path("results.jtl");
        fs::write(&results_file, JTL).unwrap();
        let started = Utc::now();
        let ended = started + chrono::Duration::seconds(10);
        let metrics =
            JMeterRunner::parse_results(&results_file, "plan_test", started, ended).unwrap();
        fs::remove_file(&results_file).unwrap();

        assert_eq!(metrics.kind, ScenarioKind::Plan);
        assert_eq!(metrics.total_requests, 4);
        assert_eq!(metrics.successful_requests, 3);
        assert_eq!(metrics.failed_requests, 1);
        assert!((metrics.error_rate - 25.0).abs() < 0.001);
        // 4 samples across a 4 second window.
        assert!((metrics.throughput - 1.0).abs() < 0.001);
        assert_eq!(metrics.minimum_response_time, 120);
        assert_eq!(metrics.maximum_response_time, 960);
        assert_eq!(metrics.average_response_time, 450);
        assert_eq!(metrics.p50_response_time, 240);
        assert_eq!(metrics.p95_response_time, 960);
        assert_eq!(metrics.p99_response_time, 960);
        assert_eq!(metrics.results_file.as_deref(), Some(results_file.as_path()));
    }

    #[test]
    fn reduce_results_with_headers_only() {
        let results_file = fixture_path("empty_results.jtl");
        fs::write(
            &results_file,
            "timeStamp,elapsed,label,responseCode,responseMessage,threadName,dataType,success\n",
        )
        .unwrap();
        let started = Utc::now();
        let error =
            JMeterRunner::parse_results(&results_file, "plan_test", started, started).unwrap_err();
        fs::remove_file(&results_file).unwrap();
        assert!(error.to_string().contains("no samples"));
    }

    #[test]
    fn missing_plan_is_an_executor_failure() {
        let mut configuration = GanderConfiguration::default();
        configuration.report_directory = std::env::temp_dir()
            .join(format!("{}_gander_jmeter", std::process::id()))
            .display()
            .to_string();
        let runner = JMeterRunner::new(&configuration);
        let error = runner
            .execute(
                Path::new("/no/such/plan.jmx"),
                "plan_test",
                &BTreeMap::new(),
            )
            .unwrap_err();
        assert!(matches!(error, GanderError::Executor { .. }));
    }

    #[test]
    fn missing_installation_is_a_configuration_failure() {
        let temp_directory =
            std::env::temp_dir().join(format!("{}_gander_jmeter_home", std::process::id()));
        let plan = temp_directory.join("plan.jmx");
        fs::create_dir_all(&temp_directory).unwrap();
        fs::write(&plan, "<jmeterTestPlan/>").unwrap();

        let mut configuration = GanderConfiguration::default();
        configuration.jmeter_home = temp_directory.display().to_string();
        configuration.report_directory = temp_directory.display().to_string();
        let runner = JMeterRunner::new(&configuration);
        let error = runner
            .execute(&plan, "plan_test", &BTreeMap::new())
            .unwrap_err();
        assert!(matches!(error, GanderError::ToolNotFound { .. }));

        fs::remove_dir_all(&temp_directory).unwrap();
    }

    #[test]
    fn plan_property_helpers() {
        let properties = JMeterRunner::plan_properties("http://localhost:8080", 25, 300);
        assert_eq!(properties.get("base.url").unwrap(), "http://localhost:8080");
        assert_eq!(properties.get("users").unwrap(), "25");
        assert_eq!(properties.get("duration").unwrap(), "300");
        assert!(properties.get("ramp.up").is_none());

        let properties =
            JMeterRunner::plan_properties_with_ramp_up("http://localhost:8080", 25, 300, 60);
        assert_eq!(properties.get("ramp.up").unwrap(), "60");
    }
}
