//! Moist air properties used by the airflow models. All functions here work in SI
//! units: temperatures in deg C, humidity ratios in kg water / kg dry air,
//! pressures in Pa and enthalpies in J/kg dry air.

use crate::core::units::{celsius_to_kelvin, BelowAbsoluteZeroError};
use std::sync::LazyLock;

/// Standard atmospheric pressure, in Pa
pub const STANDARD_PRESSURE_PA: f64 = 101_325.;

/// Ratio of the molecular mass of water vapour to that of dry air
const MOLECULAR_MASS_RATIO: f64 = 0.621_945;
/// Gas constant for dry air, in J/(kg K)
const GAS_CONSTANT_DRY_AIR: f64 = 287.055;
/// Enthalpy of vaporisation of water at 0 deg C, in J/kg
const H_FG_0C: f64 = 2_501_000.;
/// Specific heat of water vapour, in J/(kg K)
const CP_WATER_VAPOUR: f64 = 1_860.;

#[derive(Clone, Copy, Debug)]
pub struct MaterialProperties {
    specific_heat_capacity: f64, // J/(kg.K)
}

impl MaterialProperties {
    pub fn new(specific_heat_capacity: f64) -> Self {
        Self {
            specific_heat_capacity,
        }
    }

    pub fn specific_heat_capacity(&self) -> f64 {
        self.specific_heat_capacity
    }
}

pub static AIR: LazyLock<MaterialProperties> =
    LazyLock::new(|| MaterialProperties::new(1006.0));

/// Dry bulb temperature (deg C) and humidity ratio (kg/kg) of a body of air
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct AirState {
    pub temperature: f64,
    pub humidity_ratio: f64,
}

impl AirState {
    pub fn new(temperature: f64, humidity_ratio: f64) -> Self {
        Self {
            temperature,
            humidity_ratio,
        }
    }
}

/// Saturation vapour pressure, in Pa, using the Hyland-Wexler correlations
/// (ASHRAE Handbook of Fundamentals, chapter 1, equations 5 and 6)
pub fn saturation_pressure(temp_c: f64) -> Result<f64, BelowAbsoluteZeroError> {
    let t = celsius_to_kelvin(temp_c)?;
    let ln_p_ws = if temp_c < 0. {
        -5.674_535_9e3 / t + 6.392_524_7 - 9.677_843_0e-3 * t + 6.221_570_1e-7 * t.powi(2)
            + 2.074_782_5e-9 * t.powi(3)
            - 9.484_024_0e-13 * t.powi(4)
            + 4.163_501_9 * t.ln()
    } else {
        -5.800_220_6e3 / t + 1.391_499_3 - 4.864_023_9e-2 * t + 4.176_476_8e-5 * t.powi(2)
            - 1.445_209_3e-8 * t.powi(3)
            + 6.545_967_3 * t.ln()
    };
    Ok(ln_p_ws.exp())
}

/// Partial pressure of water vapour for a humidity ratio at a total pressure, in Pa
fn vapour_pressure(humidity_ratio: f64, pressure_pa: f64) -> f64 {
    pressure_pa * humidity_ratio / (MOLECULAR_MASS_RATIO + humidity_ratio)
}

/// Relative humidity (0-1) from dry bulb temperature, humidity ratio and pressure
pub fn relative_humidity(
    temp_c: f64,
    humidity_ratio: f64,
    pressure_pa: f64,
) -> Result<f64, BelowAbsoluteZeroError> {
    Ok(vapour_pressure(humidity_ratio, pressure_pa) / saturation_pressure(temp_c)?)
}

/// Density of the dry air component of moist air, in kg/m^3
pub fn dry_air_density(
    temp_c: f64,
    humidity_ratio: f64,
    pressure_pa: f64,
) -> Result<f64, BelowAbsoluteZeroError> {
    let dry_air_pressure =
        MOLECULAR_MASS_RATIO * pressure_pa / (MOLECULAR_MASS_RATIO + humidity_ratio);
    Ok(dry_air_pressure / (GAS_CONSTANT_DRY_AIR * celsius_to_kelvin(temp_c)?))
}

/// Enthalpy of moist air, in J/kg dry air
pub fn enthalpy(temp_c: f64, humidity_ratio: f64) -> f64 {
    AIR.specific_heat_capacity() * temp_c + humidity_ratio * (H_FG_0C + CP_WATER_VAPOUR * temp_c)
}

/// Humidity ratio of moist air with the given dry bulb temperature and enthalpy
pub fn humidity_ratio_from_enthalpy(temp_c: f64, enthalpy: f64) -> f64 {
    (enthalpy - AIR.specific_heat_capacity() * temp_c) / (H_FG_0C + CP_WATER_VAPOUR * temp_c)
}

/// Latent heat of vaporisation at the air state, in J/kg
pub fn latent_heat_of_vaporisation(temp_c: f64) -> f64 {
    // saturated vapour enthalpy minus saturated liquid enthalpy
    (2_500_940. + 1_858.95 * temp_c) - 4_180. * temp_c
}
