use crate::core::psychrometrics::{dry_air_density, STANDARD_PRESSURE_PA};
use crate::core::units::{fahrenheit_to_celsius, kg_per_m3_to_lbm_per_ft3, BelowAbsoluteZeroError};
use crate::input::ExternalConditionsInput;

/// Summary weather values handed over by the weather preprocessing collaborator.
/// Only annual values are needed at setup; per-timestep weather comes in through
/// the timestep snapshot.
#[derive(Clone, Debug)]
pub struct ExternalConditions {
    annual_average_drybulb_f: f64,
    local_pressure_atm: f64,
    wind_speed_correction_factor: f64,
}

impl ExternalConditions {
    /// Arguments:
    /// * `annual_average_drybulb_f` - annual average outdoor dry bulb temperature, in deg F
    /// * `local_pressure_atm` - local barometric pressure, in atm
    /// * `wind_speed_correction_factor` - annual wind speed correction factor (WSF, ASHRAE 136)
    pub fn new(
        annual_average_drybulb_f: f64,
        local_pressure_atm: f64,
        wind_speed_correction_factor: f64,
    ) -> Self {
        Self {
            annual_average_drybulb_f,
            local_pressure_atm,
            wind_speed_correction_factor,
        }
    }

    pub fn wind_speed_correction_factor(&self) -> f64 {
        self.wind_speed_correction_factor
    }

    pub fn local_pressure_pa(&self) -> f64 {
        self.local_pressure_atm * STANDARD_PRESSURE_PA
    }

    /// Density of dry outside air at the annual average temperature, in lbm/ft^3
    pub fn outside_air_density(&self) -> Result<f64, BelowAbsoluteZeroError> {
        Ok(kg_per_m3_to_lbm_per_ft3(dry_air_density(
            fahrenheit_to_celsius(self.annual_average_drybulb_f),
            0.,
            self.local_pressure_pa(),
        )?))
    }
}

impl From<&ExternalConditionsInput> for ExternalConditions {
    fn from(input: &ExternalConditionsInput) -> Self {
        Self::new(
            input.annual_average_drybulb,
            input.local_pressure,
            input.wind_speed_correction_factor,
        )
    }
}
