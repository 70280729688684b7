use crate::core::airflow::infiltration::{EffectiveLeakageArea, InfiltrationModel};
use crate::core::psychrometrics::relative_humidity;
use crate::core::units::{
    air_change_rate_to_flow_rate_m3_per_s, fahrenheit_to_celsius, HOURS_PER_DAY, HOURS_PER_YEAR,
};
use crate::errors::AirflowError;
use crate::input::{NaturalVentilationInput, SetpointSchedulesInput};
use crate::simulation_time::{month_for_hour, DayOfWeek};
use itertools::Itertools;
use std::array;
use tracing::warn;

/// Fraction of the opened window area that is free to flow air
const WINDOW_DISCHARGE_FRACTION: f64 = 0.6;
const WINDOW_NEUTRAL_LEVEL: f64 = 0.5;
const MAX_AIR_CHANGES_PER_HOUR: f64 = 20.;

// Used when no thermostat schedules are available, in deg F
const DEFAULT_HEATING_SETPOINT_F: f64 = 71.;
const DEFAULT_COOLING_SETPOINT_F: f64 = 76.;

/// Season of a month for window opening purposes
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum VentingSeason {
    Heating,
    Cooling,
    Overlap,
    None,
}

impl VentingSeason {
    fn from_month_flags(heating: bool, cooling: bool) -> Self {
        match (heating, cooling) {
            (true, true) => VentingSeason::Overlap,
            (true, false) => VentingSeason::Heating,
            (false, true) => VentingSeason::Cooling,
            (false, false) => VentingSeason::None,
        }
    }
}

/// Days of the week on which windows may be opened, spread as evenly as possible
/// through the week
pub fn operable_days(weekdays: u32, weekend_days: u32) -> Vec<DayOfWeek> {
    use DayOfWeek::*;

    let weekdays: &[DayOfWeek] = match weekdays {
        0 => &[],
        1 => &[Wednesday],
        2 => &[Tuesday, Thursday],
        3 => &[Monday, Wednesday, Friday],
        4 => &[Monday, Tuesday, Thursday, Friday],
        _ => &[Monday, Tuesday, Wednesday, Thursday, Friday],
    };
    let weekend_days: &[DayOfWeek] = match weekend_days {
        0 => &[],
        1 => &[Saturday],
        _ => &[Saturday, Sunday],
    };

    weekdays.iter().chain(weekend_days).copied().collect()
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct DailySetpoints {
    heating: [f64; 24],
    cooling: [f64; 24],
}

fn setpoints_by_day_type(setpoints: Option<&SetpointSchedulesInput>) -> (DailySetpoints, DailySetpoints) {
    match setpoints {
        Some(setpoints) => (
            DailySetpoints {
                heating: setpoints.heating_weekday,
                cooling: setpoints.cooling_weekday,
            },
            DailySetpoints {
                heating: setpoints.heating_weekend,
                cooling: setpoints.cooling_weekend,
            },
        ),
        None => {
            warn!("No heating and cooling setpoint schedules were provided, so natural ventilation will assume setpoints of {DEFAULT_HEATING_SETPOINT_F}F heating and {DEFAULT_COOLING_SETPOINT_F}F cooling.");
            let defaults = DailySetpoints {
                heating: [DEFAULT_HEATING_SETPOINT_F; 24],
                cooling: [DEFAULT_COOLING_SETPOINT_F; 24],
            };
            (defaults, defaults)
        }
    }
}

/// Window opening for natural ventilation, driven by indoor/outdoor temperature and
/// outdoor humidity, on an availability schedule.
#[derive(Clone, Debug)]
pub struct NaturalVentilationController {
    free_area: f64, // ft^2
    opening: EffectiveLeakageArea,
    max_flow: f64, // m^3/s
    max_outdoor_humidity_ratio: f64,
    max_outdoor_relative_humidity: f64,
    first_day_of_year: DayOfWeek,
    weekday_triggers: [[f64; 24]; 12], // deg C
    weekend_triggers: [[f64; 24]; 12], // deg C
    availability: Vec<f64>,
}

impl NaturalVentilationController {
    /// Arguments:
    /// * `input` - natural ventilation configuration
    /// * `window_area` - total exterior window area, in ft^2
    /// * `conditioned_volume` - in ft^3
    /// * `infiltration` - infiltration model providing the wind profile and stack height
    /// * `setpoints` - thermostat schedules, when the HVAC collaborator has any
    pub fn new(
        input: &NaturalVentilationInput,
        window_area: f64,
        conditioned_volume: f64,
        infiltration: &InfiltrationModel,
        setpoints: Option<&SetpointSchedulesInput>,
    ) -> Result<Self, AirflowError> {
        let free_area = WINDOW_DISCHARGE_FRACTION
            * window_area
            * input.fraction_windows_open
            * input.fraction_window_area_openable;
        let height = infiltration.infiltration_height();
        let wind_speed = infiltration.wind_speed();
        let opening = EffectiveLeakageArea::new(
            free_area,
            0.,
            WINDOW_NEUTRAL_LEVEL,
            height,
            wind_speed.shielding_coefficient(),
            wind_speed.power_law_terrain_factor(height),
        )?;

        let seasons: [VentingSeason; 12] = array::from_fn(|month| {
            VentingSeason::from_month_flags(input.heating_months[month], input.cooling_months[month])
        });
        let (weekday_setpoints, weekend_setpoints) = setpoints_by_day_type(setpoints);
        let weekday_triggers =
            array::from_fn(|month| trigger_temperatures(seasons[month], &weekday_setpoints, input));
        let weekend_triggers =
            array::from_fn(|month| trigger_temperatures(seasons[month], &weekend_setpoints, input));

        let days = operable_days(input.operable_weekdays, input.operable_weekend_days);
        let season_enabled = |season: VentingSeason| match season {
            VentingSeason::Heating => input.heating_season_enabled,
            VentingSeason::Cooling => input.cooling_season_enabled,
            VentingSeason::Overlap => input.overlap_season_enabled,
            VentingSeason::None => false,
        };
        let availability = (0..HOURS_PER_YEAR)
            .map(|hour| {
                let day_of_week = input.first_day_of_year.offset_by(hour / HOURS_PER_DAY);
                let enabled = month_for_hour(hour)
                    .is_some_and(|month| season_enabled(seasons[month as usize]));
                if enabled && days.contains(&day_of_week) {
                    1.
                } else {
                    0.
                }
            })
            .collect_vec();

        Ok(Self {
            free_area,
            opening,
            max_flow: air_change_rate_to_flow_rate_m3_per_s(
                MAX_AIR_CHANGES_PER_HOUR,
                conditioned_volume,
            ),
            max_outdoor_humidity_ratio: input.max_outdoor_humidity_ratio,
            max_outdoor_relative_humidity: input.max_outdoor_relative_humidity,
            first_day_of_year: input.first_day_of_year,
            weekday_triggers,
            weekend_triggers,
            availability,
        })
    }

    /// Operable free area of the windows, in ft^2
    pub fn free_area(&self) -> f64 {
        self.free_area
    }

    pub fn opening(&self) -> &EffectiveLeakageArea {
        &self.opening
    }

    /// Maximum natural ventilation flow, in m^3/s
    pub fn max_flow(&self) -> f64 {
        self.max_flow
    }

    pub fn max_outdoor_humidity_ratio(&self) -> f64 {
        self.max_outdoor_humidity_ratio
    }

    pub fn max_outdoor_relative_humidity(&self) -> f64 {
        self.max_outdoor_relative_humidity
    }

    pub fn availability(&self, hour_of_year: u32) -> f64 {
        self.availability[(hour_of_year % HOURS_PER_YEAR) as usize]
    }

    /// Equivalent full-load hours of window availability over the year
    pub fn available_hours(&self) -> f64 {
        self.availability.iter().sum()
    }

    /// Indoor temperature above which windows are opened, in deg C
    pub fn trigger_temperature(&self, hour_of_year: u32) -> f64 {
        let hour_of_year = hour_of_year % HOURS_PER_YEAR;
        let month = month_for_hour(hour_of_year).unwrap_or_default() as usize;
        let hour_of_day = (hour_of_year % HOURS_PER_DAY) as usize;
        let day_of_week = self
            .first_day_of_year
            .offset_by(hour_of_year / HOURS_PER_DAY);
        if day_of_week.is_weekend() {
            self.weekend_triggers[month][hour_of_day]
        } else {
            self.weekday_triggers[month][hour_of_day]
        }
    }

    /// Natural ventilation flow for the timestep, in m^3/s
    ///
    /// Arguments:
    /// * `hour_of_year` - hour of the simulation year
    /// * `indoor_temp` - conditioned zone air temperature, in deg C
    /// * `outdoor_temp` - outdoor dry bulb temperature, in deg C
    /// * `outdoor_humidity_ratio` - in kg/kg
    /// * `pressure` - outdoor barometric pressure, in Pa
    /// * `wind_speed` - weather station wind speed, in m/s
    pub fn flow(
        &self,
        hour_of_year: u32,
        indoor_temp: f64,
        outdoor_temp: f64,
        outdoor_humidity_ratio: f64,
        pressure: f64,
        wind_speed: f64,
    ) -> Result<f64, AirflowError> {
        let availability = self.availability(hour_of_year);
        if availability == 0. {
            return Ok(0.);
        }
        let trigger = self.trigger_temperature(hour_of_year);
        let outdoor_relative_humidity =
            relative_humidity(outdoor_temp, outdoor_humidity_ratio, pressure)?;

        if outdoor_humidity_ratio >= self.max_outdoor_humidity_ratio
            || outdoor_relative_humidity >= self.max_outdoor_relative_humidity
            || indoor_temp <= trigger
            || indoor_temp <= outdoor_temp
        {
            return Ok(0.);
        }

        let raw_flow =
            availability * self.opening.flow(indoor_temp - outdoor_temp, wind_speed);
        let ramp = ((indoor_temp - trigger) / (indoor_temp - outdoor_temp)).clamp(0., 1.);

        Ok((raw_flow * ramp).min(self.max_flow))
    }
}

/// Hourly trigger temperatures for a month, in deg C
fn trigger_temperatures(
    season: VentingSeason,
    setpoints: &DailySetpoints,
    input: &NaturalVentilationInput,
) -> [f64; 24] {
    let overlap = setpoints
        .heating
        .iter()
        .copied()
        .fold(f64::NEG_INFINITY, f64::max)
        + input.overlap_offset;

    array::from_fn(|hour| {
        fahrenheit_to_celsius(match season {
            VentingSeason::Heating => setpoints.cooling[hour] - input.heating_offset,
            VentingSeason::Cooling => setpoints.heating[hour] + input.cooling_offset,
            VentingSeason::Overlap | VentingSeason::None => overlap,
        })
    })
}
