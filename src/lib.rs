#![allow(clippy::too_many_arguments)]

pub mod core;
pub mod errors;
mod external_conditions;
pub mod input;
pub mod model;
pub mod output;
pub mod simulation_time;

#[cfg(test)]
mod tests;

#[macro_use]
extern crate is_close;

pub use crate::model::{AirflowModel, AirflowResults};
use crate::input::ingest_for_processing;
use crate::output::Output;
use std::io::{Read, Write};
use tracing::debug;

pub const RESULTS_OUTPUT_KEY: &str = "airflow_results";
pub const PROGRAM_OUTPUT_KEY: &str = "airflow_program";

/// Set up the airflow model from a JSON input and write out the setup results (JSON) and
/// the control program text.
pub fn run_project(input: impl Read, output: impl Output) -> Result<AirflowResults, anyhow::Error> {
    let input = ingest_for_processing(input)?;
    let model = AirflowModel::from_input(&input)?;
    let results = model.results();

    if !output.is_noop() {
        debug!("writing out to {RESULTS_OUTPUT_KEY}");
        let mut writer = output.writer_for_location_key(RESULTS_OUTPUT_KEY)?;
        serde_json::to_writer_pretty(&mut writer, &results)?;
        writer.flush()?;

        debug!("writing out to {PROGRAM_OUTPUT_KEY}");
        let mut writer = output.writer_for_location_key(PROGRAM_OUTPUT_KEY)?;
        writer.write_all(model.program_text()?.as_bytes())?;
        writer.flush()?;
    }

    Ok(results)
}
