//! Functions and structures related to configuring a Gander session.
//!
//! Configuration is resolved in three layers: compiled-in defaults, `GANDER_*`
//! environment variables, and command-line options, with later layers winning.

use gumdrop::Options;
use serde::{Deserialize, Serialize};
use simplelog::*;
use std::env;
use std::path::PathBuf;

use crate::util;
use crate::GanderError;

/// Default number of concurrent users for a load scenario.
const DEFAULT_LOAD_USERS: usize = 10;
/// Default steady-state duration of a load scenario, in seconds.
const DEFAULT_LOAD_TIME: usize = 60;
/// Default peak user count for a stress scenario.
const DEFAULT_STRESS_USERS: usize = 50;
/// Default steady-state duration of a stress scenario, in seconds.
const DEFAULT_STRESS_TIME: usize = 120;
/// Default user count during the spike stage of a spike scenario.
const DEFAULT_SPIKE_USERS: usize = 100;
/// Default duration of the spike stage, in seconds.
const DEFAULT_SPIKE_TIME: usize = 30;
/// Default ceiling on p95 response time, in milliseconds.
const DEFAULT_P95_THRESHOLD: u64 = 2_000;
/// Default ceiling on p99 response time, in milliseconds.
const DEFAULT_P99_THRESHOLD: u64 = 5_000;
/// Default ceiling on error rate, as a percentage.
const DEFAULT_ERROR_RATE_THRESHOLD: f64 = 1.0;
/// Default floor on throughput, in requests per second.
const DEFAULT_MINIMUM_THROUGHPUT: f64 = 10.0;
/// Default name of the k6 binary, resolved through $PATH.
const DEFAULT_K6_BINARY: &str = "k6";
/// Default JMeter installation directory.
const DEFAULT_JMETER_HOME: &str = "/usr/local/jmeter";
/// Default directory for scripts, raw results and rendered reports.
const DEFAULT_REPORT_DIRECTORY: &str = "performance-reports";
/// Default base name for report artifacts.
const DEFAULT_REPORT_NAME: &str = "performance";

/// Options available when launching a Gander session, typically configured
/// from the command line.
#[derive(Options, Debug, Clone, Default, Serialize, Deserialize)]
pub struct GanderConfiguration {
    /// Displays this help
    #[options(short = "h")]
    pub help: bool,
    /// Prints version information
    #[options(short = "V")]
    pub version: bool,

    /// Defines host to performance test (ie http://10.21.32.33)
    #[options(short = "H")]
    pub host: String,
    /// Sets concurrent users for the load scenario (default: 10)
    #[options(no_short, meta = "USERS")]
    pub load_users: Option<usize>,
    /// Sets load steady-state time (30s, 20m, 3h, 1h30m, etc; default: 60)
    #[options(no_short, meta = "TIME")]
    pub load_time: String,
    /// Sets peak users for the stress scenario (default: 50)
    #[options(no_short, meta = "USERS")]
    pub stress_users: Option<usize>,
    /// Sets stress steady-state time (default: 120)
    #[options(no_short, meta = "TIME")]
    pub stress_time: String,
    /// Sets users during the spike stage (default: 100)
    #[options(no_short, meta = "USERS")]
    pub spike_users: Option<usize>,
    /// Sets spike stage time (default: 30)
    #[options(no_short, meta = "TIME")]
    pub spike_time: String,

    /// Sets p95 response time ceiling in ms (default: 2000)
    #[options(no_short, meta = "MS")]
    pub p95_threshold: Option<u64>,
    /// Sets p99 response time ceiling in ms (default: 5000)
    #[options(no_short, meta = "MS")]
    pub p99_threshold: Option<u64>,
    /// Sets error rate ceiling as a percentage (default: 1.0)
    #[options(no_short, meta = "PERCENT")]
    pub error_rate_threshold: Option<f64>,
    /// Sets throughput floor in requests/second (default: 10.0)
    #[options(no_short, meta = "RPS")]
    pub minimum_throughput: Option<f64>,

    /// Sets the k6 binary to invoke (default: k6)
    #[options(no_short, meta = "PATH")]
    pub k6_binary: String,
    /// Sets the JMeter installation directory (default: /usr/local/jmeter)
    #[options(no_short, meta = "PATH")]
    pub jmeter_home: String,
    /// Sets the directory scripts, results and reports are written to
    #[options(short = "d", meta = "DIR")]
    pub report_directory: String,
    /// Sets the base name of report artifacts (default: performance)
    #[options(no_short, meta = "NAME")]
    pub report_name: String,

    /// Enables Gander log file and sets name
    #[options(short = "G", meta = "NAME")]
    pub gander_log: String,
    /// Increases log file verbosity (-g, -gg, etc)
    #[options(short = "g", count)]
    pub log_level: u8,
    /// Decreases terminal verbosity (-q, -qq, etc)
    #[options(count, short = "q")]
    pub quiet: u8,
    /// Increases terminal verbosity (-v, -vv, etc)
    #[options(count, short = "v")]
    pub verbose: u8,
}

impl GanderConfiguration {
    /// Build a configuration from the process command line and environment.
    pub fn load() -> Result<GanderConfiguration, GanderError> {
        let args: Vec<String> = env::args().skip(1).collect();
        let mut configuration = GanderConfiguration::parse_args_default(&args).map_err(|e| {
            GanderError::InvalidOption {
                option: "command line".to_string(),
                value: args.join(" "),
                detail: e.to_string(),
            }
        })?;
        configuration.apply_env_overrides();
        Ok(configuration)
    }

    /// Fill unset string options from `GANDER_*` environment variables.
    pub fn apply_env_overrides(&mut self) {
        for (variable, field) in [
            ("GANDER_HOST", &mut self.host),
            ("GANDER_K6_BINARY", &mut self.k6_binary),
            ("GANDER_JMETER_HOME", &mut self.jmeter_home),
            ("GANDER_REPORT_DIRECTORY", &mut self.report_directory),
        ] {
            if field.is_empty() {
                if let Ok(value) = env::var(variable) {
                    debug!("applying {}: {}", variable, value);
                    *field = value;
                }
            }
        }
    }

    /// Confirm the configured host is usable before starting a session.
    pub fn validate(&self) -> Result<(), GanderError> {
        if self.host.is_empty() {
            return Err(GanderError::InvalidOption {
                option: "--host".to_string(),
                value: self.host.clone(),
                detail: "a host to performance test is required".to_string(),
            });
        }
        util::is_valid_host(&self.host)?;
        Ok(())
    }

    /// Concurrent users for the load scenario.
    pub fn load_users(&self) -> usize {
        self.load_users.unwrap_or(DEFAULT_LOAD_USERS)
    }

    /// Steady-state seconds for the load scenario.
    pub fn load_time_seconds(&self) -> usize {
        duration_or(&self.load_time, DEFAULT_LOAD_TIME)
    }

    /// Peak users for the stress scenario.
    pub fn stress_users(&self) -> usize {
        self.stress_users.unwrap_or(DEFAULT_STRESS_USERS)
    }

    /// Steady-state seconds for the stress scenario.
    pub fn stress_time_seconds(&self) -> usize {
        duration_or(&self.stress_time, DEFAULT_STRESS_TIME)
    }

    /// Users during the spike stage of the spike scenario.
    pub fn spike_users(&self) -> usize {
        self.spike_users.unwrap_or(DEFAULT_SPIKE_USERS)
    }

    /// Seconds the spike stage is held.
    pub fn spike_time_seconds(&self) -> usize {
        duration_or(&self.spike_time, DEFAULT_SPIKE_TIME)
    }

    /// Ceiling on p95 response time, in milliseconds.
    pub fn p95_threshold(&self) -> u64 {
        self.p95_threshold.unwrap_or(DEFAULT_P95_THRESHOLD)
    }

    /// Ceiling on p99 response time, in milliseconds.
    pub fn p99_threshold(&self) -> u64 {
        self.p99_threshold.unwrap_or(DEFAULT_P99_THRESHOLD)
    }

    /// Ceiling on error rate, as a percentage.
    pub fn error_rate_threshold(&self) -> f64 {
        self.error_rate_threshold
            .unwrap_or(DEFAULT_ERROR_RATE_THRESHOLD)
    }

    /// Floor on throughput, in requests per second.
    pub fn minimum_throughput(&self) -> f64 {
        self.minimum_throughput.unwrap_or(DEFAULT_MINIMUM_THROUGHPUT)
    }

    /// The k6 binary to invoke.
    pub fn k6_binary(&self) -> String {
        string_or(&self.k6_binary, DEFAULT_K6_BINARY)
    }

    /// The JMeter installation directory.
    pub fn jmeter_home(&self) -> PathBuf {
        PathBuf::from(string_or(&self.jmeter_home, DEFAULT_JMETER_HOME))
    }

    /// Where scripts, raw results and rendered reports are written.
    pub fn report_directory(&self) -> PathBuf {
        PathBuf::from(string_or(&self.report_directory, DEFAULT_REPORT_DIRECTORY))
    }

    /// Base name for report artifacts.
    pub fn report_name(&self) -> String {
        string_or(&self.report_name, DEFAULT_REPORT_NAME)
    }

    /// Set up a terminal logger, plus a file logger when `--gander-log` is
    /// enabled.
    pub fn configure_logger(&self) {
        // Terminal verbosity is controlled with -q and -v.
        let debug_level = match self.quiet {
            0 => match self.verbose {
                0 => LevelFilter::Info,
                1 => LevelFilter::Debug,
                _ => LevelFilter::Trace,
            },
            1 => LevelFilter::Warn,
            _ => LevelFilter::Error,
        };

        // Log file verbosity is controlled with -g.
        let log_level = match self.log_level {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        };

        if self.gander_log.is_empty() {
            match CombinedLogger::init(vec![SimpleLogger::new(debug_level, Config::default())]) {
                Ok(_) => (),
                Err(e) => {
                    info!("failed to initialize CombinedLogger: {}", e);
                }
            }
        } else {
            match std::fs::File::create(&self.gander_log) {
                Ok(log_file) => {
                    match CombinedLogger::init(vec![
                        SimpleLogger::new(debug_level, Config::default()),
                        WriteLogger::new(log_level, Config::default(), log_file),
                    ]) {
                        Ok(_) => (),
                        Err(e) => {
                            info!("failed to initialize CombinedLogger: {}", e);
                        }
                    }
                    info!("writing to log file: {}", self.gander_log);
                }
                Err(e) => {
                    eprintln!("failed to create log file {}: {}", self.gander_log, e);
                }
            }
        }
    }
}

/// Resolve a timespan string against a default, treating empty as unset.
fn duration_or(time: &str, default: usize) -> usize {
    if time.is_empty() {
        default
    } else {
        util::parse_timespan(time)
    }
}

/// Resolve a string option against a default, treating empty as unset.
fn string_or(value: &str, default: &str) -> String {
    if value.is_empty() {
        default.to_string()
    } else {
        value.to_string()
    }
}
