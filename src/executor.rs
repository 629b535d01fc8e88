//! External test executors.
//!
//! An executor runs one scenario to completion against the target system and
//! measures it into a [`ScenarioMetrics`] record. Two executors are provided:
//! [`k6::K6Runner`] drives generated k6 scripts, and [`jmeter::JMeterRunner`]
//! drives pre-authored JMeter test plans. The two differ deliberately in how
//! they handle missing results: k6 treats a failed run as fatal to the
//! scenario, while JMeter degrades to a zero-valued failed record.

pub mod jmeter;
pub mod k6;

use std::collections::BTreeMap;
use std::path::Path;

use crate::metrics::ScenarioMetrics;
use crate::GanderError;

/// Runs one scenario synchronously, blocking until the external tool exits.
///
/// `source` is the scenario script or test plan to execute, and `properties`
/// carries key-value overrides an executor may apply to it. Implementations
/// fail with [`GanderError::Executor`] when the scenario cannot be run at
/// all; a scenario that ran but produced unusable results is reported as a
/// zero-valued record with `passed` unset, not as an error.
pub trait ScenarioExecutor {
    fn execute(
        &self,
        source: &Path,
        scenario_name: &str,
        properties: &BTreeMap<String, String>,
    ) -> Result<ScenarioMetrics, GanderError>;
}
