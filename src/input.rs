use crate::simulation_time::DayOfWeek;
use anyhow::anyhow;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_valid::Validate;
use std::io::{BufReader, Read};
use strum_macros::{Display, EnumIter};

pub fn ingest_for_processing(json: impl Read) -> Result<Input, anyhow::Error> {
    let input: Input = serde_json::from_reader(BufReader::new(json))?;
    input
        .validate()
        .map_err(|err| anyhow!("Airflow input failed validation: {err}"))?;

    Ok(input)
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct Input {
    #[validate]
    pub building: BuildingInput,
    pub external_conditions: ExternalConditionsInput,
    #[validate]
    pub infiltration: InfiltrationInput,
    #[validate]
    pub natural_ventilation: Option<NaturalVentilationInput>,
    pub mechanical_ventilation: Option<MechanicalVentilationInput>,
    pub spot_ventilation: Option<SpotVentilationInput>,
    pub clothes_dryer: Option<ClothesDryerInput>,
    #[serde(default)]
    pub air_handlers: IndexMap<String, AirHandlerInput>,
    pub setpoints: Option<SetpointSchedulesInput>,
}

/// Building-level geometry, as extracted from the 3-D model by the geometry collaborator.
/// Lengths are in ft, areas in ft^2 and volumes in ft^3.
#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct BuildingInput {
    #[validate(exclusive_minimum = 0.)]
    pub conditioned_floor_area: f64,
    #[validate(exclusive_minimum = 0.)]
    pub conditioned_volume: f64,
    #[validate(minimum = 1)]
    pub above_grade_storeys: u32,
    #[serde(default)]
    pub number_of_bedrooms: u32,
    #[serde(default)]
    pub number_of_bathrooms: u32,
    #[validate(minimum = 0.)]
    pub window_area: f64,
    #[validate(exclusive_minimum = 0.)]
    pub building_height: f64,
    #[validate(exclusive_minimum = 0.)]
    pub infiltration_height: Option<f64>,
    /// Distance to the nearest neighbouring building, in ft
    pub neighbour_distance: Option<f64>,
    pub zones: IndexMap<ZoneKind, ZoneInput>,
}

#[derive(Clone, Copy, Debug, Deserialize, Display, EnumIter, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ZoneKind {
    Conditioned,
    Garage,
    UnconditionedBasement,
    VentedCrawlspace,
    UnventedCrawlspace,
    VentedAttic,
    UnventedAttic,
}

impl ZoneKind {
    /// Whether the zone exchanges air freely with outside through purpose-made vents
    pub fn is_vented(&self) -> bool {
        matches!(self, ZoneKind::VentedCrawlspace | ZoneKind::VentedAttic)
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ZoneInput {
    pub height: f64,
    pub floor_area: f64,
    pub volume: f64,
    /// Height of the zone floor above grade, in ft
    #[serde(default)]
    pub elevation: f64,
    /// Fixed air changes per hour, where the zone is modelled with constant infiltration
    pub ach: Option<f64>,
    /// Specific leakage area, where known
    pub sla: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExternalConditionsInput {
    /// Annual average outdoor dry bulb temperature, in deg F
    pub annual_average_drybulb: f64,
    /// Local barometric pressure, in atm
    #[serde(default = "default_local_pressure")]
    pub local_pressure: f64,
    pub wind_speed_correction_factor: f64,
}

fn default_local_pressure() -> f64 {
    1.0
}

#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct InfiltrationInput {
    pub envelope_leakage: EnvelopeLeakage,
    #[validate(minimum = 0.)]
    #[validate(maximum = 1.)]
    pub shelter_coefficient: Option<f64>,
    pub terrain: Terrain,
    #[serde(default)]
    pub has_flue_or_chimney: bool,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq)]
#[serde(tag = "type", deny_unknown_fields)]
pub enum EnvelopeLeakage {
    #[serde(rename = "ACH50")]
    Ach50 { value: f64 },
    #[serde(rename = "SLA")]
    Sla { value: f64 },
    #[serde(rename = "ConstantACH")]
    ConstantAch { value: f64 },
}

#[derive(Clone, Copy, Debug, Deserialize, EnumIter, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Terrain {
    Ocean,
    Plains,
    Rural,
    Suburban,
    City,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct NaturalVentilationInput {
    /// Offset below the cooling setpoint for venting in heating-season months, in deg F
    #[serde(default = "default_setpoint_offset")]
    pub heating_offset: f64,
    /// Offset above the heating setpoint for venting in cooling-season months, in deg F
    #[serde(default = "default_setpoint_offset")]
    pub cooling_offset: f64,
    /// Offset above the heating setpoint for venting in overlap months, in deg F
    #[serde(default = "default_setpoint_offset")]
    pub overlap_offset: f64,
    #[serde(default = "default_true")]
    pub heating_season_enabled: bool,
    #[serde(default = "default_true")]
    pub cooling_season_enabled: bool,
    #[serde(default = "default_true")]
    pub overlap_season_enabled: bool,
    #[validate(maximum = 5)]
    #[serde(default = "default_operable_weekdays")]
    pub operable_weekdays: u32,
    #[validate(maximum = 2)]
    #[serde(default = "default_operable_weekend_days")]
    pub operable_weekend_days: u32,
    #[validate(minimum = 0.)]
    #[validate(maximum = 1.)]
    #[serde(default = "default_fraction_windows_open")]
    pub fraction_windows_open: f64,
    #[validate(minimum = 0.)]
    #[validate(maximum = 1.)]
    #[serde(default = "default_fraction_window_area_openable")]
    pub fraction_window_area_openable: f64,
    #[serde(default = "default_max_outdoor_humidity_ratio")]
    pub max_outdoor_humidity_ratio: f64,
    #[validate(minimum = 0.)]
    #[validate(maximum = 1.)]
    #[serde(default = "default_max_outdoor_relative_humidity")]
    pub max_outdoor_relative_humidity: f64,
    /// Months (January first) the HVAC collaborator classifies as heating season
    pub heating_months: [bool; 12],
    /// Months (January first) the HVAC collaborator classifies as cooling season
    pub cooling_months: [bool; 12],
    #[serde(default)]
    pub first_day_of_year: DayOfWeek,
}

fn default_true() -> bool {
    true
}

fn default_setpoint_offset() -> f64 {
    1.0
}

fn default_operable_weekdays() -> u32 {
    5
}

fn default_operable_weekend_days() -> u32 {
    2
}

fn default_fraction_windows_open() -> f64 {
    0.33
}

fn default_fraction_window_area_openable() -> f64 {
    0.2
}

fn default_max_outdoor_humidity_ratio() -> f64 {
    0.0115
}

fn default_max_outdoor_relative_humidity() -> f64 {
    0.7
}

/// Thermostat setpoints, in deg F, as 24 hourly values per day type
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SetpointSchedulesInput {
    pub heating_weekday: [f64; 24],
    pub heating_weekend: [f64; 24],
    pub cooling_weekday: [f64; 24],
    pub cooling_weekend: [f64; 24],
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MechanicalVentilationInput {
    pub fan_type: VentilationFanType,
    /// Whole-house ventilation flow rate, in cfm
    pub flow_rate: f64,
    /// Total fan power, in W
    pub fan_power: f64,
    pub recovery_efficiency: Option<RecoveryEfficiencyInput>,
    pub cfis: Option<CfisInput>,
}

#[derive(Clone, Copy, Debug, Deserialize, Display, EnumIter, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VentilationFanType {
    Exhaust,
    Supply,
    Balanced,
    #[serde(alias = "erv", alias = "hrv")]
    HeatRecovery,
    #[serde(rename = "cfis")]
    CentralFanIntegratedSupply,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq)]
#[serde(tag = "type", deny_unknown_fields)]
pub enum RecoveryEfficiencyInput {
    /// Rated (unadjusted) sensible and total recovery efficiencies, which still
    /// include the effect of fan heat
    Unadjusted { sensible: f64, total: Option<f64> },
    /// Adjusted sensible and total recovery efficiencies
    Adjusted { sensible: f64, total: Option<f64> },
    /// A single combined efficiency without a sensible/latent split
    Combined { total: f64 },
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CfisInput {
    pub minutes_open_per_hour: f64,
    /// Blower flow in ventilation-only mode as a fraction of the rated blower flow
    #[serde(default = "default_blower_fraction")]
    pub blower_fraction: f64,
    pub air_handler: String,
}

fn default_blower_fraction() -> f64 {
    1.0
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SpotVentilationInput {
    pub bath_fan: Option<SpotFanInput>,
    pub range_fan: Option<SpotFanInput>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SpotFanInput {
    /// Flow rate per fan, in cfm
    pub flow_rate: f64,
    /// Number of fans; bath fans default to the number of bathrooms
    pub quantity: Option<u32>,
    #[serde(default = "default_spot_fan_hours")]
    pub hours_in_operation: f64,
    pub start_hour: u32,
    /// Fan power per fan, in W
    #[serde(default)]
    pub fan_power: f64,
}

fn default_spot_fan_hours() -> f64 {
    1.0
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClothesDryerInput {
    #[serde(default = "default_dryer_exhaust_flow_rate")]
    pub exhaust_flow_rate: f64,
    #[serde(default = "default_true")]
    pub vented: bool,
}

fn default_dryer_exhaust_flow_rate() -> f64 {
    100.
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AirHandlerInput {
    /// Whether ducted heating or cooling equipment is served by this air handler
    pub has_ducted_equipment: bool,
    #[serde(default)]
    pub ducts: Vec<DuctInput>,
    /// Rated blower power, in W
    #[serde(default)]
    pub blower_power: f64,
    /// Pressure difference across duct leaks while the blower runs, in Pa
    #[serde(default = "default_duct_operating_pressure")]
    pub duct_operating_pressure: f64,
}

fn default_duct_operating_pressure() -> f64 {
    25.
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DuctInput {
    pub side: DuctSide,
    /// Zone the duct runs through; absent means the duct is outside
    pub location: Option<ZoneKind>,
    pub leakage_fraction: Option<f64>,
    /// Leakage flow at a 25 Pa pressure difference, in cfm
    pub leakage_flow_at_25pa: Option<f64>,
    /// Duct surface area, in ft^2
    pub area: f64,
    pub nominal_r_value: f64,
}

#[derive(Clone, Copy, Debug, Deserialize, Display, EnumIter, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DuctSide {
    Supply,
    Return,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::*;
    use serde_json::json;

    fn minimal_input() -> serde_json::Value {
        json!({
            "Building": {
                "conditioned_floor_area": 2000.,
                "conditioned_volume": 16000.,
                "above_grade_storeys": 2,
                "window_area": 300.,
                "building_height": 18.,
                "zones": {
                    "conditioned": {"height": 16., "floor_area": 2000., "volume": 16000.}
                }
            },
            "ExternalConditions": {
                "annual_average_drybulb": 51.,
                "wind_speed_correction_factor": 0.6
            },
            "Infiltration": {
                "envelope_leakage": {"type": "ACH50", "value": 7.},
                "terrain": "suburban"
            }
        })
    }

    #[rstest]
    fn should_ingest_minimal_input() {
        let input = ingest_for_processing(minimal_input().to_string().as_bytes()).unwrap();
        assert_eq!(
            input.infiltration.envelope_leakage,
            EnvelopeLeakage::Ach50 { value: 7. }
        );
        assert_eq!(input.infiltration.terrain, Terrain::Suburban);
        assert_eq!(input.external_conditions.local_pressure, 1.0);
        assert!(input.air_handlers.is_empty());
        assert!(input.building.zones.contains_key(&ZoneKind::Conditioned));
    }

    #[rstest]
    fn should_reject_unknown_terrain() {
        let mut input = minimal_input();
        input["Infiltration"]["terrain"] = json!("forest");
        assert!(ingest_for_processing(input.to_string().as_bytes()).is_err());
    }

    #[rstest]
    #[case(0.)]
    #[case(-4.)]
    fn should_reject_non_positive_infiltration_height(#[case] infiltration_height: f64) {
        let mut input = minimal_input();
        input["Building"]["infiltration_height"] = json!(infiltration_height);
        assert!(ingest_for_processing(input.to_string().as_bytes()).is_err());

        input["Building"]["infiltration_height"] = json!(16.);
        assert!(ingest_for_processing(input.to_string().as_bytes()).is_ok());
    }

    #[rstest]
    fn should_reject_out_of_range_shelter_coefficient() {
        let mut input = minimal_input();
        input["Infiltration"]["shelter_coefficient"] = json!(1.5);
        assert!(ingest_for_processing(input.to_string().as_bytes()).is_err());
    }

    #[rstest]
    fn should_apply_natural_ventilation_defaults() {
        let mut input = minimal_input();
        input["NaturalVentilation"] = json!({
            "heating_months": ([true; 12]),
            "cooling_months": ([false; 12])
        });
        let input = ingest_for_processing(input.to_string().as_bytes()).unwrap();
        let natural_ventilation = input.natural_ventilation.unwrap();
        assert_eq!(natural_ventilation.operable_weekdays, 5);
        assert_eq!(natural_ventilation.operable_weekend_days, 2);
        assert_eq!(natural_ventilation.fraction_windows_open, 0.33);
        assert_eq!(natural_ventilation.first_day_of_year, DayOfWeek::Monday);
    }

    #[rstest]
    fn should_reject_too_many_operable_weekdays() {
        let mut input = minimal_input();
        input["NaturalVentilation"] = json!({
            "operable_weekdays": 6,
            "heating_months": ([true; 12]),
            "cooling_months": ([false; 12])
        });
        assert!(ingest_for_processing(input.to_string().as_bytes()).is_err());
    }

    #[rstest]
    fn should_ingest_ducts_with_outside_location() {
        let mut input = minimal_input();
        input["AirHandlers"] = json!({
            "furnace": {
                "has_ducted_equipment": true,
                "ducts": [
                    {"side": "supply", "location": "vented_attic", "leakage_fraction": 0.1, "area": 300., "nominal_r_value": 6.},
                    {"side": "return", "leakage_flow_at_25pa": 25., "area": 100., "nominal_r_value": 0.}
                ]
            }
        });
        let input = ingest_for_processing(input.to_string().as_bytes()).unwrap();
        let ducts = &input.air_handlers["furnace"].ducts;
        assert_eq!(ducts[0].location, Some(ZoneKind::VentedAttic));
        assert_eq!(ducts[1].location, None);
        assert_eq!(ducts[1].side, DuctSide::Return);
    }
}
