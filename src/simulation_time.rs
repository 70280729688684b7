use crate::core::units::{DAYS_PER_WEEK, HOURS_PER_DAY, MINUTES_PER_HOUR};
use serde::{Deserialize, Serialize};
use strum_macros::{EnumIter, FromRepr};

/// Allowance for rounding when counting whole timesteps
const STEP_TOLERANCE: f64 = 1e-9;

// Hours that start each month, with a 13th value closing December.
// E.g. Jan is hours 0-743
const MONTH_START_END_HOURS: [u32; 13] = [
    0, 744, 1416, 2160, 2880, 3624, 4344, 5088, 5832, 6552, 7296, 8016, 8760,
];

#[derive(Clone, Copy, Debug, Default, Deserialize, EnumIter, Eq, FromRepr, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub enum DayOfWeek {
    #[default]
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl DayOfWeek {
    pub fn is_weekend(&self) -> bool {
        matches!(self, DayOfWeek::Saturday | DayOfWeek::Sunday)
    }

    /// The weekday falling `days` days after this one
    pub fn offset_by(&self, days: u32) -> Self {
        Self::from_repr(((*self as u32 + days) % DAYS_PER_WEEK) as usize).unwrap_or_default()
    }
}

#[derive(Clone, Copy, Debug, Deserialize)]
pub struct SimulationTime {
    #[serde(rename(deserialize = "start"))]
    start_time: f64,
    #[serde(rename(deserialize = "end"))]
    end_time: f64,
    step: f64,
}

impl SimulationTime {
    pub fn new(start_time: f64, end_time: f64, step: f64) -> Self {
        Self {
            start_time,
            end_time,
            step,
        }
    }

    pub fn total_steps(&self) -> usize {
        ((self.end_time - self.start_time) / self.step - STEP_TOLERANCE).ceil() as usize
    }

    pub fn iter(&self) -> SimulationTimeIterator {
        SimulationTimeIterator::from(*self)
    }
}

#[derive(Clone)]
pub struct SimulationTimeIterator {
    current_index: usize,
    total_steps: usize,
    simulation_time: SimulationTime,
}

impl SimulationTimeIterator {
    fn from(simulation_time: SimulationTime) -> Self {
        SimulationTimeIterator {
            current_index: 0,
            total_steps: simulation_time.total_steps(),
            simulation_time,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SimulationTimeIteration {
    pub index: usize,
    pub time: f64,
    pub timestep: f64,
}

impl SimulationTimeIteration {
    pub fn current_hour(&self) -> u32 {
        self.time.floor() as u32
    }

    pub fn hour_of_day(&self) -> u32 {
        self.current_hour() % HOURS_PER_DAY
    }

    pub fn current_day(&self) -> u32 {
        self.time as u32 / HOURS_PER_DAY
    }

    pub fn current_month(&self) -> Option<u32> {
        month_for_hour(self.current_hour())
    }

    pub fn day_of_week(&self, first_day_of_year: DayOfWeek) -> DayOfWeek {
        first_day_of_year.offset_by(self.current_day())
    }

    pub fn timestep_in_minutes(&self) -> f64 {
        self.timestep * MINUTES_PER_HOUR as f64
    }

    /// Minute of the current hour at which this timestep ends, in (0, 60].
    /// This matches the convention of engines that report the minute at the end
    /// of the zone timestep.
    pub fn minute_at_end_of_step(&self) -> f64 {
        (self.time + self.timestep - self.current_hour() as f64) * MINUTES_PER_HOUR as f64
    }
}

/// Month index (0 = January) of a given hour of a 365-day year
pub fn month_for_hour(hour_of_year: u32) -> Option<u32> {
    MONTH_START_END_HOURS
        .iter()
        .position(|end_hour| hour_of_year < *end_hour)
        .map(|i| (i - 1) as u32)
}

impl Iterator for SimulationTimeIterator {
    type Item = SimulationTimeIteration;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current_index >= self.total_steps {
            return None;
        }
        // times are derived from the index so that rounding does not build up over a year
        let iteration = SimulationTimeIteration {
            index: self.current_index,
            time: self.simulation_time.start_time
                + self.current_index as f64 * self.simulation_time.step,
            timestep: self.simulation_time.step,
        };
        self.current_index += 1;

        Some(iteration)
    }
}
