//! Central fan integrated supply (CFIS) ventilation: outdoor air drawn through the
//! return side of a ducted heating/cooling air handler while a motorised damper is open.
//!
//! The damper must be open for a target number of minutes in each hour. It opens
//! opportunistically whenever the air handler blower is already running, and if the
//! target can no longer be met that way it runs the blower on its own for the rest of
//! the hour.

use crate::core::units::{cfm_to_cubic_metres_per_second, MINUTES_PER_HOUR};
use crate::errors::AirflowError;
use crate::input::{AirHandlerInput, CfisInput};
use crate::simulation_time::SimulationTimeIteration;

/// Highest achievable damper open time in an hour, in minutes
const MAX_MINUTES_OPEN_PER_HOUR: f64 = 59.999;
/// Tolerance when comparing the end of a timestep with the forced-operation start minute
pub(crate) const MINUTE_TOLERANCE: f64 = 1e-5;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CfisPhase {
    Idle,
    Accumulating,
    SatisfiedForHour,
}

/// Per-hour damper accumulator. Owned by the caller and carried between timesteps.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CfisState {
    hour: Option<u32>,
    open_minutes: f64,
    on_for_rest_of_hour: bool,
    satisfied: bool,
    damper_fraction: f64,
}

impl CfisState {
    pub fn new() -> Self {
        Default::default()
    }

    /// Minutes the damper has been open so far in the current hour
    pub fn open_minutes(&self) -> f64 {
        self.open_minutes
    }

    pub fn is_satisfied(&self) -> bool {
        self.satisfied
    }

    /// Damper open fraction of the most recent timestep
    pub fn damper_fraction(&self) -> f64 {
        self.damper_fraction
    }

    pub fn phase(&self) -> CfisPhase {
        if self.satisfied {
            CfisPhase::SatisfiedForHour
        } else if self.open_minutes > 0. || self.on_for_rest_of_hour {
            CfisPhase::Accumulating
        } else {
            CfisPhase::Idle
        }
    }

    fn start_hour(&mut self, hour: u32) {
        *self = Self {
            hour: Some(hour),
            ..Default::default()
        };
    }
}

/// Result of one CFIS timestep
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CfisOutcome {
    pub damper_fraction: f64,
    /// Outdoor air drawn in, in m^3/s
    pub outdoor_air_flow: f64,
    /// Blower power spent on ventilation alone, beyond the blower's own heating/cooling runtime, in W
    pub ventilation_only_blower_power: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CfisController {
    air_handler: String,
    target_minutes_per_hour: f64,
    blower_fraction: f64,
    flow_rate: f64,          // m^3/s of outdoor air with the damper open
    rated_blower_power: f64, // W
}

impl CfisController {
    /// Arguments:
    /// * `input` - CFIS configuration
    /// * `flow_rate` - outdoor air flow with the damper open, in cfm
    /// * `air_handler` - the air handler named by the configuration, if it exists
    pub fn new(
        input: &CfisInput,
        flow_rate: f64,
        air_handler: Option<&AirHandlerInput>,
    ) -> Result<Self, AirflowError> {
        let air_handler = match air_handler {
            Some(air_handler) if air_handler.has_ducted_equipment => air_handler,
            _ => {
                return Err(AirflowError::CfisWithoutDuctedEquipment(
                    input.air_handler.clone(),
                ))
            }
        };
        if !(0. ..=1.).contains(&input.blower_fraction) {
            return Err(AirflowError::CfisBlowerFraction(input.blower_fraction));
        }

        Ok(Self {
            air_handler: input.air_handler.clone(),
            target_minutes_per_hour: input
                .minutes_open_per_hour
                .clamp(0., MAX_MINUTES_OPEN_PER_HOUR),
            blower_fraction: input.blower_fraction,
            flow_rate: cfm_to_cubic_metres_per_second(flow_rate),
            rated_blower_power: air_handler.blower_power,
        })
    }

    pub fn air_handler(&self) -> &str {
        &self.air_handler
    }

    pub fn target_minutes_per_hour(&self) -> f64 {
        self.target_minutes_per_hour
    }

    /// Outdoor air flow with the damper fully open, in m^3/s
    pub fn flow_rate(&self) -> f64 {
        self.flow_rate
    }

    /// Advance the damper controller by one timestep.
    ///
    /// Arguments:
    /// * `state` - accumulator carried over from the previous timestep
    /// * `time` - the current timestep
    /// * `blower_runtime_fraction` - runtime fraction of the air handler blower for
    ///   heating or cooling in this timestep
    pub fn tick(
        &self,
        state: &mut CfisState,
        time: &SimulationTimeIteration,
        blower_runtime_fraction: f64,
    ) -> CfisOutcome {
        let hour = time.current_hour();
        if state.hour != Some(hour) {
            state.start_hour(hour);
        }

        let timestep = time.timestep_in_minutes();
        let minute = time.minute_at_end_of_step();
        let remaining = self.target_minutes_per_hour - state.open_minutes;

        let damper_fraction = if remaining <= 0. {
            state.satisfied = true;
            0.
        } else {
            // minute at which running until the end of the hour just meets the target
            let forced_start_minute = MINUTES_PER_HOUR as f64 - remaining;
            let fraction = if state.on_for_rest_of_hour
                || minute + MINUTE_TOLERANCE >= forced_start_minute
            {
                let fraction = if state.on_for_rest_of_hour {
                    1.
                } else {
                    (minute - forced_start_minute) / timestep
                };
                state.on_for_rest_of_hour = true;
                fraction
            } else {
                blower_runtime_fraction
            }
            .clamp(0., 1.);

            if fraction * timestep >= remaining {
                state.open_minutes = self.target_minutes_per_hour;
                state.satisfied = true;
                remaining / timestep
            } else {
                state.open_minutes += fraction * timestep;
                fraction
            }
        };
        state.damper_fraction = damper_fraction;

        let ventilation_only_fraction = (damper_fraction - blower_runtime_fraction).max(0.);

        CfisOutcome {
            damper_fraction,
            outdoor_air_flow: damper_fraction * self.flow_rate,
            ventilation_only_blower_power: self.rated_blower_power
                * self.blower_fraction
                * ventilation_only_fraction,
        }
    }
}
