use thiserror::Error;

pub const MINUTES_PER_HOUR: u32 = 60;
pub const SECONDS_PER_HOUR: u32 = 3_600;
pub const HOURS_PER_DAY: u32 = 24;
pub const DAYS_PER_WEEK: u32 = 7;
pub const DAYS_PER_YEAR: u32 = 365;
pub const HOURS_PER_YEAR: u32 = HOURS_PER_DAY * DAYS_PER_YEAR;

pub const METRES_PER_FOOT: f64 = 0.3048;
pub const SQUARE_INCHES_PER_SQUARE_FOOT: f64 = 144.;
pub const CUBIC_METRES_PER_SECOND_PER_CFM: f64 = 0.000_471_947_443;
pub const PASCALS_PER_INCH_OF_WATER: f64 = 249.088_9;
pub const METRES_PER_SECOND_PER_MPH: f64 = 0.447_04;
pub const KELVIN_PER_RANKINE: f64 = 5. / 9.;
pub const WATTS_PER_BTU_PER_HOUR: f64 = 0.293_071_07;
pub const KG_PER_LBM: f64 = 0.453_592_37;

/// Standard gravity, in ft/s^2
pub const GRAVITY_FT_PER_S2: f64 = 32.174;

pub(crate) fn square_feet_to_square_metres(area_ft2: f64) -> f64 {
    area_ft2 * METRES_PER_FOOT.powi(2)
}

pub(crate) fn cubic_feet_to_cubic_metres(volume_ft3: f64) -> f64 {
    volume_ft3 * METRES_PER_FOOT.powi(3)
}

pub(crate) fn cfm_to_cubic_metres_per_second(flow_cfm: f64) -> f64 {
    flow_cfm * CUBIC_METRES_PER_SECOND_PER_CFM
}

pub(crate) fn cubic_metres_per_second_to_cfm(flow_m3_per_s: f64) -> f64 {
    flow_m3_per_s / CUBIC_METRES_PER_SECOND_PER_CFM
}

/// Convert air changes per hour into a volumetric flow in cfm for a volume in ft^3
pub(crate) fn air_change_rate_to_flow_rate_cfm(air_change_rate: f64, volume_ft3: f64) -> f64 {
    air_change_rate * volume_ft3 / MINUTES_PER_HOUR as f64
}

/// Convert air changes per hour into a volumetric flow in m^3/s for a volume in ft^3
pub(crate) fn air_change_rate_to_flow_rate_m3_per_s(air_change_rate: f64, volume_ft3: f64) -> f64 {
    air_change_rate * cubic_feet_to_cubic_metres(volume_ft3) / SECONDS_PER_HOUR as f64
}

/// Convert a conductance in Btu/(hr F) into W/K
pub(crate) fn btu_per_hour_f_to_watts_per_kelvin(ua: f64) -> f64 {
    ua * WATTS_PER_BTU_PER_HOUR / KELVIN_PER_RANKINE
}

/// Convert a pressure expressed as lbm/(ft s^2) into inches of water
pub(crate) fn lbm_per_ft_s2_to_inches_of_water(pressure: f64) -> f64 {
    pressure * (KG_PER_LBM / METRES_PER_FOOT) / PASCALS_PER_INCH_OF_WATER
}

/// Convert a density in lbm/ft^3 into the dynamic pressure coefficient in inH2O/mph^2
pub(crate) fn lbm_per_ft3_to_inches_of_water_per_mph2(density: f64) -> f64 {
    let ft_per_s_per_mph = METRES_PER_SECOND_PER_MPH / METRES_PER_FOOT;
    lbm_per_ft_s2_to_inches_of_water(density * ft_per_s_per_mph.powi(2))
}

pub(crate) fn kg_per_m3_to_lbm_per_ft3(density: f64) -> f64 {
    density * METRES_PER_FOOT.powi(3) / KG_PER_LBM
}

pub fn fahrenheit_to_celsius(temp_f: f64) -> f64 {
    (temp_f - 32.) * KELVIN_PER_RANKINE
}

pub fn celsius_to_fahrenheit(temp_c: f64) -> f64 {
    temp_c / KELVIN_PER_RANKINE + 32.
}

pub(crate) fn fahrenheit_to_rankine(temp_f: f64) -> Result<f64, BelowAbsoluteZeroError> {
    if temp_f < -459.67 {
        Err(BelowAbsoluteZeroError::from_c(fahrenheit_to_celsius(temp_f)))
    } else {
        Ok(temp_f + 459.67)
    }
}

pub(crate) fn celsius_to_kelvin(temp_c: f64) -> Result<f64, BelowAbsoluteZeroError> {
    if temp_c < -273.15 {
        Err(BelowAbsoluteZeroError::from_c(temp_c))
    } else {
        Ok(temp_c + 273.15)
    }
}

#[derive(Clone, Copy, Debug, Error, PartialEq)]
#[error("A temperature of {k}ºK/{}ºC was encountered, which is less than absolute zero", k - 273.15)]
pub struct BelowAbsoluteZeroError {
    k: f64,
}

impl BelowAbsoluteZeroError {
    fn from_c(c: f64) -> Self {
        Self { k: c + 273.15 }
    }
}
