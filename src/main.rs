use gumdrop::Options;
use log::error;

use gander::config::GanderConfiguration;
use gander::report::ReportGenerator;
use gander::{GanderError, GanderSession};

fn main() {
    let configuration = match GanderConfiguration::load() {
        Ok(configuration) => configuration,
        Err(error) => {
            eprintln!("{}", error);
            std::process::exit(1);
        }
    };

    if configuration.help {
        println!("Usage: gander [OPTIONS]");
        println!();
        println!("{}", GanderConfiguration::usage());
        return;
    }
    if configuration.version {
        println!("gander {}", env!("CARGO_PKG_VERSION"));
        return;
    }

    configuration.configure_logger();

    if let Err(error) = run_session(configuration) {
        eprintln!("{}", error);
        std::process::exit(1);
    }
}

/// Run the load, stress and spike scenarios against the configured host,
/// print the session summary, and write all three report formats.
fn run_session(configuration: GanderConfiguration) -> Result<(), GanderError> {
    configuration.validate()?;
    let host = configuration.host.clone();
    let mut session = GanderSession::initialize(configuration.clone())?;

    // A scenario that cannot run at all is logged and skipped; the session
    // always completes and reports whatever it collected.
    if let Err(error) = session.run_load_test(
        &host,
        configuration.load_users(),
        configuration.load_time_seconds(),
    ) {
        error!("load test failed: {}", error);
    }
    if let Err(error) = session.run_stress_test(
        &host,
        configuration.stress_users(),
        configuration.stress_time_seconds(),
    ) {
        error!("stress test failed: {}", error);
    }
    if let Err(error) = session.run_spike_test(
        &host,
        configuration.spike_users(),
        configuration.spike_time_seconds(),
    ) {
        error!("spike test failed: {}", error);
    }

    let summary = session.summary();
    println!("{}", summary);

    let generator = ReportGenerator::new(&configuration.report_directory())?;
    generator.write_html_report(&summary, &configuration.report_name())?;
    generator.write_json_report(&summary.results, &configuration.report_name())?;
    generator.write_csv_report(&summary.results, &configuration.report_name())?;

    Ok(())
}
