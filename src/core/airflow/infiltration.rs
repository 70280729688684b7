use crate::core::airflow::wind_speed::WindSpeedProfile;
use crate::core::units::{
    air_change_rate_to_flow_rate_cfm, air_change_rate_to_flow_rate_m3_per_s,
    fahrenheit_to_rankine, lbm_per_ft3_to_inches_of_water_per_mph2,
    lbm_per_ft_s2_to_inches_of_water, square_feet_to_square_metres,
    CUBIC_METRES_PER_SECOND_PER_CFM, GRAVITY_FT_PER_S2, KELVIN_PER_RANKINE, METRES_PER_FOOT,
    METRES_PER_SECOND_PER_MPH, PASCALS_PER_INCH_OF_WATER, SQUARE_INCHES_PER_SQUARE_FOOT,
};
use crate::errors::AirflowError;
use crate::external_conditions::ExternalConditions;
use crate::input::{BuildingInput, EnvelopeLeakage, InfiltrationInput, ZoneInput, ZoneKind};
use indexmap::IndexMap;
use serde::Serialize;
use strum_macros::Display;

/// Pressure exponent of the envelope leakage power law
pub const PRESSURE_EXPONENT: f64 = 0.65;
/// Pressure difference of a blower door test, in Pa
const BLOWER_DOOR_PRESSURE_PA: f64 = 50.;
/// Reference pressure for effective leakage area, in inH2O (4 Pa)
const ELA_REFERENCE_PRESSURE_INH2O: f64 = 0.016;
/// Converts ELA (ft^2) and density (lbm/ft^3) into a flow coefficient in cfm/inH2O^n
const FLOW_COEFFICIENT_CONVERSION: f64 = 776.25;
/// Indoor temperature assumed when deriving stack coefficients, in deg F
pub(crate) const ASSUMED_INDOOR_TEMP_F: f64 = 73.5;

// Flue or chimney parameters
const FLUE_LEAKAGE_FRACTION: f64 = 0.2;
const FLUE_HEIGHT_ABOVE_BUILDING_FT: f64 = 2.;
const FLUE_SHELTER_COEFFICIENT: f64 = 1.;

// Leakage distribution assumptions for attached unconditioned zones
const GARAGE_HORIZONTAL_LEAKAGE_FRACTION: f64 = 0.4;
const ATTIC_HORIZONTAL_LEAKAGE_FRACTION: f64 = 0.75;
const ZONE_NEUTRAL_LEVEL: f64 = 0.5;
const UNCONDITIONED_BASEMENT_ACH: f64 = 0.1;
const VENTED_CRAWLSPACE_SLA: f64 = 1. / 150.;
const VENTED_ATTIC_SLA: f64 = 1. / 300.;

/// Specific leakage area for a blower door result, assuming the AIM-2 pressure exponent.
///
/// Arguments:
/// * `ach50` - air changes per hour at 50 Pa
/// * `floor_area` - in ft^2
/// * `volume` - in ft^3
pub fn sla_from_ach50(ach50: f64, floor_area: f64, volume: f64) -> f64 {
    ach50 * 0.283_316_478 * 4f64.powf(PRESSURE_EXPONENT) * volume
        / (floor_area
            * SQUARE_INCHES_PER_SQUARE_FOOT
            * BLOWER_DOOR_PRESSURE_PA.powf(PRESSURE_EXPONENT)
            * 60.)
}

/// Annual average air changes per hour from specific leakage area (ASHRAE 119 normalized
/// leakage scaled by the weather wind speed factor)
pub fn ach_from_sla(sla: f64, storeys: f64, wind_speed_correction_factor: f64) -> f64 {
    let normalized_leakage = 1000. * sla * storeys.powf(0.4);
    normalized_leakage * wind_speed_correction_factor
}

pub fn sla_from_ach(ach: f64, storeys: f64, wind_speed_correction_factor: f64) -> f64 {
    let normalized_leakage = ach / wind_speed_correction_factor;
    normalized_leakage / (1000. * storeys.powf(0.4))
}

/// Fractions of envelope leakage in the ceiling, walls and floor.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct LeakageDistribution {
    ceiling: f64,
    walls: f64,
    floor: f64,
}

impl LeakageDistribution {
    pub fn new(ceiling: f64, walls: f64, floor: f64) -> Result<Self, AirflowError> {
        if !is_close!(ceiling + walls + floor, 1., rel_tol = 1e-9, abs_tol = 1e-12) {
            return Err(AirflowError::LeakageDistribution {
                ceiling,
                walls,
                floor,
            });
        }

        Ok(Self {
            ceiling,
            walls,
            floor,
        })
    }

    pub fn for_building(has_vented_crawlspace: bool) -> Result<Self, AirflowError> {
        if has_vented_crawlspace {
            Self::new(0.15, 0.35, 0.50)
        } else {
            Self::new(0.25, 0.50, 0.25)
        }
    }

    pub fn ceiling(&self) -> f64 {
        self.ceiling
    }

    pub fn walls(&self) -> f64 {
        self.walls
    }

    pub fn floor(&self) -> f64 {
        self.floor
    }
}

/// AIM-2 coefficients for the conditioned zone. Stored in the inch-pound units they are
/// derived in; SI accessors give the forms used per timestep.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Aim2Coefficients {
    pressure_exponent: f64,
    specific_leakage_area: f64,
    effective_leakage_area: f64, // ft^2
    flow_coefficient: f64,       // cfm/inH2O^n
    stack_coefficient: f64,      // (inH2O/R)^n
    wind_coefficient: f64,       // (inH2O/mph^2)^n
    flue_fraction: f64,
    flue_shelter_coefficient: f64,
    shelter_coefficient: f64,
    terrain_factor: f64,
}

impl Aim2Coefficients {
    pub fn pressure_exponent(&self) -> f64 {
        self.pressure_exponent
    }

    pub fn specific_leakage_area(&self) -> f64 {
        self.specific_leakage_area
    }

    pub fn effective_leakage_area(&self) -> f64 {
        self.effective_leakage_area
    }

    pub fn flow_coefficient(&self) -> f64 {
        self.flow_coefficient
    }

    pub fn stack_coefficient(&self) -> f64 {
        self.stack_coefficient
    }

    pub fn wind_coefficient(&self) -> f64 {
        self.wind_coefficient
    }

    /// Flow coefficient in m^3/s/Pa^n
    pub fn flow_coefficient_si(&self) -> f64 {
        self.flow_coefficient * CUBIC_METRES_PER_SECOND_PER_CFM
            / PASCALS_PER_INCH_OF_WATER.powf(self.pressure_exponent)
    }

    /// Stack coefficient in (Pa/K)^n
    pub fn stack_coefficient_si(&self) -> f64 {
        self.stack_coefficient
            * (PASCALS_PER_INCH_OF_WATER / KELVIN_PER_RANKINE).powf(self.pressure_exponent)
    }

    /// Wind coefficient in (Pa s^2/m^2)^n
    pub fn wind_coefficient_si(&self) -> f64 {
        self.wind_coefficient
            * (PASCALS_PER_INCH_OF_WATER / METRES_PER_SECOND_PER_MPH.powi(2))
                .powf(self.pressure_exponent)
    }

    /// Combined terrain and shelter multiplier applied to the weather station wind speed
    pub fn wind_shelter_multiplier(&self) -> f64 {
        self.terrain_factor
            * (self.shelter_coefficient * (1. - self.flue_fraction)
                + self.flue_shelter_coefficient * 1.5 * self.flue_fraction)
    }

    /// Infiltration flow, in m^3/s
    ///
    /// Arguments:
    /// * `delta_t` - indoor/outdoor temperature difference, in K
    /// * `wind_speed` - weather station wind speed, in m/s
    pub fn flow(&self, delta_t: f64, wind_speed: f64) -> f64 {
        let n = self.pressure_exponent;
        let c = self.flow_coefficient_si();
        let stack_flow = c * self.stack_coefficient_si() * delta_t.abs().powf(n);
        let wind_flow = c
            * self.wind_coefficient_si()
            * (self.wind_shelter_multiplier() * wind_speed.max(0.)).powf(2. * n);

        stack_flow.hypot(wind_flow)
    }
}

/// Effective leakage area model (ASHRAE basic model) for attached unconditioned zones
/// and window openings. Coefficients are held in SI.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct EffectiveLeakageArea {
    area: f64,              // m^2
    stack_coefficient: f64, // m^2/(s^2 K)
    wind_coefficient: f64,  // dimensionless
}

impl EffectiveLeakageArea {
    /// Arguments:
    /// * `area` - leakage area, in ft^2
    /// * `horizontal_leakage_fraction` - fraction of leakage in horizontal surfaces
    /// * `neutral_level` - neutral pressure level as a fraction of `height`
    /// * `height` - stack height, in ft
    /// * `shielding_coefficient` - local shielding
    /// * `terrain_factor` - power-law terrain factor at the zone height
    pub fn new(
        area: f64,
        horizontal_leakage_fraction: f64,
        neutral_level: f64,
        height: f64,
        shielding_coefficient: f64,
        terrain_factor: f64,
    ) -> Result<Self, AirflowError> {
        if area < 0. {
            return Err(AirflowError::NegativeQuantity {
                quantity: "effective leakage area",
                value: area,
            });
        }
        let h = horizontal_leakage_fraction;
        let stack_factor = 2. / 3.
            * (1. + h / 2.)
            * (2. * neutral_level * (1. - neutral_level)).sqrt()
            / (neutral_level.sqrt() + (1. - neutral_level).sqrt());
        let wind_factor = shielding_coefficient * (1. - h).cbrt() * terrain_factor;

        // ft^2/(s^2 R)
        let stack_coefficient = stack_factor.powi(2) * GRAVITY_FT_PER_S2 * height
            / fahrenheit_to_rankine(ASSUMED_INDOOR_TEMP_F)?;

        Ok(Self {
            area: square_feet_to_square_metres(area),
            stack_coefficient: stack_coefficient * METRES_PER_FOOT.powi(2) / KELVIN_PER_RANKINE,
            wind_coefficient: wind_factor.powi(2),
        })
    }

    pub fn area(&self) -> f64 {
        self.area
    }

    pub fn stack_coefficient(&self) -> f64 {
        self.stack_coefficient
    }

    pub fn wind_coefficient(&self) -> f64 {
        self.wind_coefficient
    }

    /// Flow through the leakage area, in m^3/s
    pub fn flow(&self, delta_t: f64, wind_speed: f64) -> f64 {
        if self.area == 0. {
            return 0.;
        }
        self.area
            * (self.stack_coefficient * delta_t.abs() + self.wind_coefficient * wind_speed.powi(2))
                .sqrt()
    }
}

#[derive(Clone, Copy, Debug, Display, Eq, PartialEq, Serialize)]
pub enum InfiltrationMethod {
    Aim2,
    ConstantAch,
    EffectiveLeakageArea,
    None,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ZoneInfiltration {
    Aim2 {
        coefficients: Aim2Coefficients,
        annual_average_ach: f64,
    },
    ConstantAch {
        ach: f64,
    },
    EffectiveLeakageArea {
        leakage_area: EffectiveLeakageArea,
        annual_average_ach: f64,
    },
    None,
}

impl ZoneInfiltration {
    pub fn method(&self) -> InfiltrationMethod {
        match self {
            ZoneInfiltration::Aim2 { .. } => InfiltrationMethod::Aim2,
            ZoneInfiltration::ConstantAch { .. } => InfiltrationMethod::ConstantAch,
            ZoneInfiltration::EffectiveLeakageArea { .. } => {
                InfiltrationMethod::EffectiveLeakageArea
            }
            ZoneInfiltration::None => InfiltrationMethod::None,
        }
    }

    /// Effective leakage area, in ft^2
    pub fn effective_leakage_area(&self) -> f64 {
        match self {
            ZoneInfiltration::Aim2 { coefficients, .. } => coefficients.effective_leakage_area(),
            ZoneInfiltration::EffectiveLeakageArea { leakage_area, .. } => {
                leakage_area.area() / METRES_PER_FOOT.powi(2)
            }
            ZoneInfiltration::ConstantAch { .. } | ZoneInfiltration::None => 0.,
        }
    }

    pub fn annual_average_ach(&self) -> f64 {
        match self {
            ZoneInfiltration::Aim2 {
                annual_average_ach, ..
            }
            | ZoneInfiltration::EffectiveLeakageArea {
                annual_average_ach, ..
            } => *annual_average_ach,
            ZoneInfiltration::ConstantAch { ach } => *ach,
            ZoneInfiltration::None => 0.,
        }
    }

    /// Infiltration flow for the timestep, in m^3/s
    ///
    /// Arguments:
    /// * `volume` - zone volume, in ft^3
    /// * `delta_t` - zone/outdoor temperature difference, in K
    /// * `wind_speed` - weather station wind speed, in m/s
    pub fn flow(&self, volume: f64, delta_t: f64, wind_speed: f64) -> f64 {
        match self {
            ZoneInfiltration::Aim2 { coefficients, .. } => coefficients.flow(delta_t, wind_speed),
            ZoneInfiltration::ConstantAch { ach } => {
                air_change_rate_to_flow_rate_m3_per_s(*ach, volume)
            }
            ZoneInfiltration::EffectiveLeakageArea { leakage_area, .. } => {
                leakage_area.flow(delta_t, wind_speed)
            }
            ZoneInfiltration::None => 0.,
        }
    }
}

/// Derived infiltration properties of one zone, as reported to sizing.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ZoneInfiltrationSummary {
    pub zone: ZoneKind,
    pub method: InfiltrationMethod,
    pub effective_leakage_area: f64,
    pub annual_average_ach: f64,
    pub steady_flow_cfm: f64,
}

#[derive(Clone, Debug)]
struct ZoneRecord {
    volume: f64,
    infiltration: ZoneInfiltration,
}

#[derive(Clone, Debug)]
pub struct InfiltrationModel {
    wind_speed: WindSpeedProfile,
    leakage_distribution: LeakageDistribution,
    infiltration_height: f64,
    zones: IndexMap<ZoneKind, ZoneRecord>,
}

impl InfiltrationModel {
    pub fn new(
        building: &BuildingInput,
        infiltration: &InfiltrationInput,
        external_conditions: &ExternalConditions,
    ) -> Result<Self, AirflowError> {
        let wind_speed = WindSpeedProfile::new(
            infiltration.terrain,
            infiltration.shelter_coefficient,
            building.neighbour_distance,
            building.building_height,
        );
        let has_vented_crawlspace = building.zones.contains_key(&ZoneKind::VentedCrawlspace);
        let leakage_distribution = LeakageDistribution::for_building(has_vented_crawlspace)?;
        let infiltration_height = building.infiltration_height.unwrap_or_else(|| {
            building
                .zones
                .get(&ZoneKind::Conditioned)
                .map(|zone| zone.height + zone.elevation)
                .unwrap_or(building.building_height)
        });

        let mut model = Self {
            wind_speed,
            leakage_distribution,
            infiltration_height,
            zones: Default::default(),
        };

        let conditioned = model.conditioned_zone_infiltration(
            building,
            infiltration,
            external_conditions,
            has_vented_crawlspace,
        )?;
        model.insert_zone(
            ZoneKind::Conditioned,
            building.conditioned_volume,
            conditioned,
        )?;

        for (&kind, zone) in building
            .zones
            .iter()
            .filter(|(kind, _)| **kind != ZoneKind::Conditioned)
        {
            let zone_infiltration = model.unconditioned_zone_infiltration(
                kind,
                zone,
                &infiltration.envelope_leakage,
                external_conditions,
            )?;
            model.insert_zone(kind, zone.volume, zone_infiltration)?;
        }

        Ok(model)
    }

    fn insert_zone(
        &mut self,
        kind: ZoneKind,
        volume: f64,
        infiltration: ZoneInfiltration,
    ) -> Result<(), AirflowError> {
        let steady_flow = air_change_rate_to_flow_rate_cfm(infiltration.annual_average_ach(), volume);
        if steady_flow < 0. || steady_flow.is_nan() {
            return Err(AirflowError::NegativeQuantity {
                quantity: "infiltration flow",
                value: steady_flow,
            });
        }
        self.zones.insert(
            kind,
            ZoneRecord {
                volume,
                infiltration,
            },
        );

        Ok(())
    }

    fn conditioned_zone_infiltration(
        &self,
        building: &BuildingInput,
        infiltration: &InfiltrationInput,
        external_conditions: &ExternalConditions,
        has_vented_crawlspace: bool,
    ) -> Result<ZoneInfiltration, AirflowError> {
        let sla = match infiltration.envelope_leakage {
            EnvelopeLeakage::ConstantAch { value } => {
                return Ok(ZoneInfiltration::ConstantAch { ach: value })
            }
            EnvelopeLeakage::Ach50 { value } => sla_from_ach50(
                value,
                building.conditioned_floor_area,
                building.conditioned_volume,
            ),
            EnvelopeLeakage::Sla { value } => value,
        };

        let coefficients = self.aim2_coefficients(
            sla,
            building,
            infiltration.has_flue_or_chimney,
            has_vented_crawlspace,
            external_conditions.outside_air_density()?,
        )?;

        Ok(ZoneInfiltration::Aim2 {
            coefficients,
            annual_average_ach: ach_from_sla(
                sla,
                building.above_grade_storeys as f64,
                external_conditions.wind_speed_correction_factor(),
            ),
        })
    }

    /// Derive AIM-2 coefficients (Walker and Wilson, 1998) from the specific leakage area
    fn aim2_coefficients(
        &self,
        sla: f64,
        building: &BuildingInput,
        has_flue: bool,
        has_vented_crawlspace: bool,
        outside_air_density: f64,
    ) -> Result<Aim2Coefficients, AirflowError> {
        let n = PRESSURE_EXPONENT;
        let ela = sla * building.conditioned_floor_area;
        if ela < 0. {
            return Err(AirflowError::NegativeQuantity {
                quantity: "effective leakage area",
                value: ela,
            });
        }

        let (y, flue_height, flue_shelter_coefficient) = if has_flue {
            (
                FLUE_LEAKAGE_FRACTION,
                building.building_height + FLUE_HEIGHT_ABOVE_BUILDING_FT,
                FLUE_SHELTER_COEFFICIENT,
            )
        } else {
            (0., 0., 0.)
        };

        let ceiling = self.leakage_distribution.ceiling();
        let floor = self.leakage_distribution.floor();
        let r_i = (ceiling + floor) * (1. - y);
        let x_i = (ceiling - floor) * (1. - y);
        let z_f = flue_height / self.infiltration_height;

        let flow_coefficient = ela
            * (2. / outside_air_density).sqrt()
            * ELA_REFERENCE_PRESSURE_INH2O.powf(0.5 - n)
            * FLOW_COEFFICIENT_CONVERSION;

        // Stack factor
        let m_o = (x_i + (2. * n + 1.) * y).powi(2) / (2. - r_i);
        let m_i = m_o.min(1.);
        let flue_function = if has_flue {
            let x_c = r_i + 2. * (1. - r_i - y) / (n + 1.) - 2. * y * (z_f - 1.).max(0.).powf(n);
            n * y
                * (z_f - 1.).max(0.).powf((3. * n - 1.) / 3.)
                * (1. - 3. * (x_c - x_i).powi(2) * r_i.powf(1. - n) / (2. * (z_f + 1.)))
        } else {
            0.
        };
        let stack_factor = ((1. + n * r_i) / (n + 1.)) * (0.5 - 0.5 * m_i.powf(1.2)).powf(n + 1.)
            + flue_function;
        let stack_coefficient = stack_factor
            * (lbm_per_ft_s2_to_inches_of_water(
                outside_air_density * GRAVITY_FT_PER_S2 * self.infiltration_height,
            ) / fahrenheit_to_rankine(ASSUMED_INDOOR_TEMP_F)?)
            .powf(n);

        // Wind factor
        let wind_factor = if has_vented_crawlspace {
            let x_i = x_i.min(1. - 2. * y);
            let r_x = 1. - r_i * (n / 2. + 0.2);
            let y_x = 1. - y / 4.;
            let x_s = (1. - r_i) / 5. - 1.5 * y;
            let x_x = 1. - (((x_i - x_s) / (2. - r_i)).powi(2)).powf(0.75);
            0.19 * (2. - n) * x_x * r_x * y_x
        } else {
            let j = (x_i + r_i + 2. * y) / 2.;
            0.19 * (2. - n) * (1. - ((x_i + r_i) / 2.).powf(1.5 - y))
                - y / 4. * (j - 2. * y * j.powi(4))
        };
        let wind_coefficient = wind_factor
            * lbm_per_ft3_to_inches_of_water_per_mph2(outside_air_density / 2.).powf(n);

        Ok(Aim2Coefficients {
            pressure_exponent: n,
            specific_leakage_area: sla,
            effective_leakage_area: ela,
            flow_coefficient,
            stack_coefficient,
            wind_coefficient,
            flue_fraction: y,
            flue_shelter_coefficient,
            shelter_coefficient: self.wind_speed.shelter_coefficient(),
            terrain_factor: self.wind_speed.ashrae_terrain_factor(self.infiltration_height),
        })
    }

    fn unconditioned_zone_infiltration(
        &self,
        kind: ZoneKind,
        zone: &ZoneInput,
        envelope_leakage: &EnvelopeLeakage,
        external_conditions: &ExternalConditions,
    ) -> Result<ZoneInfiltration, AirflowError> {
        let wsf = external_conditions.wind_speed_correction_factor();
        let zone_infiltration = match kind {
            ZoneKind::Conditioned => unreachable!("conditioned zone is handled separately"),
            ZoneKind::Garage => match (zone.ach, zone.sla, *envelope_leakage) {
                (Some(ach), _, _) => ZoneInfiltration::ConstantAch { ach },
                (None, None, EnvelopeLeakage::ConstantAch { value }) => {
                    ZoneInfiltration::ConstantAch { ach: value }
                }
                (None, Some(sla), _) | (None, None, EnvelopeLeakage::Sla { value: sla }) => {
                    self.effective_leakage_area_zone(
                        zone,
                        sla,
                        GARAGE_HORIZONTAL_LEAKAGE_FRACTION,
                        wsf,
                    )?
                }
                (None, None, EnvelopeLeakage::Ach50 { value }) => self
                    .effective_leakage_area_zone(
                        zone,
                        sla_from_ach50(value, zone.floor_area, zone.volume),
                        GARAGE_HORIZONTAL_LEAKAGE_FRACTION,
                        wsf,
                    )?,
            },
            ZoneKind::UnconditionedBasement => ZoneInfiltration::ConstantAch {
                ach: zone.ach.unwrap_or(UNCONDITIONED_BASEMENT_ACH),
            },
            ZoneKind::VentedCrawlspace => match zone.ach {
                Some(ach) => ZoneInfiltration::ConstantAch { ach },
                None => ZoneInfiltration::ConstantAch {
                    ach: ach_from_sla(zone.sla.unwrap_or(VENTED_CRAWLSPACE_SLA), 1., wsf),
                },
            },
            ZoneKind::UnventedCrawlspace | ZoneKind::UnventedAttic => {
                match (zone.ach, zone.sla) {
                    (Some(ach), _) if ach > 0. => ZoneInfiltration::ConstantAch { ach },
                    (None, Some(sla)) if sla > 0. => ZoneInfiltration::ConstantAch {
                        ach: ach_from_sla(sla, 1., wsf),
                    },
                    _ => ZoneInfiltration::None,
                }
            }
            ZoneKind::VentedAttic => match zone.ach {
                Some(ach) => ZoneInfiltration::ConstantAch { ach },
                None => self.effective_leakage_area_zone(
                    zone,
                    zone.sla.unwrap_or(VENTED_ATTIC_SLA),
                    ATTIC_HORIZONTAL_LEAKAGE_FRACTION,
                    wsf,
                )?,
            },
        };

        // A zone with no leakage carries no infiltration at all
        Ok(match zone_infiltration {
            ZoneInfiltration::ConstantAch { ach } if ach == 0. => ZoneInfiltration::None,
            ZoneInfiltration::EffectiveLeakageArea { leakage_area, .. }
                if leakage_area.area() == 0. =>
            {
                ZoneInfiltration::None
            }
            other => other,
        })
    }

    fn effective_leakage_area_zone(
        &self,
        zone: &ZoneInput,
        sla: f64,
        horizontal_leakage_fraction: f64,
        wind_speed_correction_factor: f64,
    ) -> Result<ZoneInfiltration, AirflowError> {
        let leakage_area = EffectiveLeakageArea::new(
            sla * zone.floor_area,
            horizontal_leakage_fraction,
            ZONE_NEUTRAL_LEVEL,
            zone.height,
            self.wind_speed.shielding_coefficient(),
            self.wind_speed
                .power_law_terrain_factor(zone.elevation + zone.height),
        )?;

        Ok(ZoneInfiltration::EffectiveLeakageArea {
            leakage_area,
            annual_average_ach: ach_from_sla(sla, 1., wind_speed_correction_factor),
        })
    }

    pub fn wind_speed(&self) -> &WindSpeedProfile {
        &self.wind_speed
    }

    pub fn leakage_distribution(&self) -> &LeakageDistribution {
        &self.leakage_distribution
    }

    /// Height used for stack effects, in ft
    pub fn infiltration_height(&self) -> f64 {
        self.infiltration_height
    }

    pub fn zone(&self, kind: ZoneKind) -> Option<&ZoneInfiltration> {
        self.zones.get(&kind).map(|record| &record.infiltration)
    }

    /// Zones with an infiltration model, the conditioned zone first
    pub fn zone_kinds(&self) -> impl Iterator<Item = ZoneKind> + '_ {
        self.zones.keys().copied()
    }

    pub fn conditioned(&self) -> &ZoneInfiltration {
        &self.zones[&ZoneKind::Conditioned].infiltration
    }

    /// Zone volume, in ft^3
    pub fn zone_volume(&self, kind: ZoneKind) -> Option<f64> {
        self.zones.get(&kind).map(|record| record.volume)
    }

    /// Infiltration flow into a zone for the timestep, in m^3/s
    pub fn zone_flow(&self, kind: ZoneKind, delta_t: f64, wind_speed: f64) -> f64 {
        self.zones
            .get(&kind)
            .map(|record| record.infiltration.flow(record.volume, delta_t, wind_speed))
            .unwrap_or(0.)
    }

    pub fn zone_summaries(&self) -> Vec<ZoneInfiltrationSummary> {
        self.zones
            .iter()
            .map(|(&zone, record)| ZoneInfiltrationSummary {
                zone,
                method: record.infiltration.method(),
                effective_leakage_area: record.infiltration.effective_leakage_area(),
                annual_average_ach: record.infiltration.annual_average_ach(),
                steady_flow_cfm: air_change_rate_to_flow_rate_cfm(
                    record.infiltration.annual_average_ach(),
                    record.volume,
                ),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::Terrain;
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;
    use rstest::*;

    fn zone(height: f64, floor_area: f64) -> ZoneInput {
        ZoneInput {
            height,
            floor_area,
            volume: height * floor_area,
            elevation: 0.,
            ach: None,
            sla: None,
        }
    }

    #[fixture]
    fn building() -> BuildingInput {
        BuildingInput {
            conditioned_floor_area: 2000.,
            conditioned_volume: 16000.,
            above_grade_storeys: 2,
            number_of_bedrooms: 3,
            number_of_bathrooms: 2,
            window_area: 300.,
            building_height: 16.,
            infiltration_height: None,
            neighbour_distance: None,
            zones: IndexMap::from([(ZoneKind::Conditioned, zone(16., 1000.))]),
        }
    }

    #[fixture]
    fn infiltration() -> InfiltrationInput {
        InfiltrationInput {
            envelope_leakage: EnvelopeLeakage::Ach50 { value: 7. },
            shelter_coefficient: Some(0.5),
            terrain: Terrain::Suburban,
            has_flue_or_chimney: false,
        }
    }

    #[fixture]
    fn external_conditions() -> ExternalConditions {
        ExternalConditions::new(50., 1., 0.6)
    }

    #[rstest]
    fn should_calc_sla_from_ach50() {
        assert_relative_eq!(
            sla_from_ach50(7., 2000., 16000.),
            3.556e-4,
            max_relative = 1e-3
        );
    }

    #[rstest]
    #[case(1.)]
    #[case(2.)]
    #[case(3.5)]
    fn should_round_trip_sla_and_ach(#[case] storeys: f64) {
        for sla in [0., 1e-4, 3.556e-4, 1. / 150.] {
            for wsf in [0.3, 0.6, 1.1] {
                assert_relative_eq!(
                    sla_from_ach(ach_from_sla(sla, storeys, wsf), storeys, wsf),
                    sla,
                    max_relative = 1e-12
                );
            }
        }
    }

    #[rstest]
    fn should_select_leakage_distribution() {
        let with_crawlspace = LeakageDistribution::for_building(true).unwrap();
        assert_eq!(
            (
                with_crawlspace.ceiling(),
                with_crawlspace.walls(),
                with_crawlspace.floor()
            ),
            (0.15, 0.35, 0.50)
        );
        let without = LeakageDistribution::for_building(false).unwrap();
        assert_eq!((without.ceiling(), without.walls(), without.floor()), (0.25, 0.50, 0.25));
    }

    #[rstest]
    fn should_fail_for_leakage_distribution_not_summing_to_one() {
        assert_eq!(
            LeakageDistribution::new(0.25, 0.40, 0.25),
            Err(AirflowError::LeakageDistribution {
                ceiling: 0.25,
                walls: 0.40,
                floor: 0.25
            })
        );
    }

    #[rstest]
    fn should_derive_aim2_coefficients(
        building: BuildingInput,
        infiltration: InfiltrationInput,
        external_conditions: ExternalConditions,
    ) {
        let model = InfiltrationModel::new(&building, &infiltration, &external_conditions).unwrap();
        assert_eq!(model.infiltration_height(), 16.);
        let ZoneInfiltration::Aim2 {
            coefficients,
            annual_average_ach,
        } = model.conditioned()
        else {
            panic!("expected AIM-2 infiltration");
        };
        assert_relative_eq!(
            coefficients.effective_leakage_area(),
            0.7112,
            max_relative = 1e-3
        );
        assert_relative_eq!(coefficients.flow_coefficient(), 5204., max_relative = 1e-3);
        assert_relative_eq!(coefficients.stack_coefficient(), 0.001706, max_relative = 1e-3);
        assert_relative_eq!(coefficients.wind_coefficient(), 0.001605, max_relative = 1e-3);
        assert_relative_eq!(
            *annual_average_ach,
            1000. * coefficients.specific_leakage_area() * 2f64.powf(0.4) * 0.6,
            max_relative = 1e-12
        );
    }

    #[rstest]
    fn should_increase_flow_with_temperature_difference_and_wind(
        building: BuildingInput,
        infiltration: InfiltrationInput,
        external_conditions: ExternalConditions,
    ) {
        let model = InfiltrationModel::new(&building, &infiltration, &external_conditions).unwrap();
        let still = model.zone_flow(ZoneKind::Conditioned, 0., 0.);
        let cold = model.zone_flow(ZoneKind::Conditioned, 20., 0.);
        let windy = model.zone_flow(ZoneKind::Conditioned, 20., 5.);
        assert_eq!(still, 0.);
        assert!(cold > 0.);
        assert!(windy > cold);
    }

    #[rstest]
    fn should_apply_flue_adjustment(
        building: BuildingInput,
        mut infiltration: InfiltrationInput,
        external_conditions: ExternalConditions,
    ) {
        let without_flue =
            InfiltrationModel::new(&building, &infiltration, &external_conditions).unwrap();
        infiltration.has_flue_or_chimney = true;
        let with_flue =
            InfiltrationModel::new(&building, &infiltration, &external_conditions).unwrap();

        let (
            ZoneInfiltration::Aim2 {
                coefficients: without,
                ..
            },
            ZoneInfiltration::Aim2 {
                coefficients: with, ..
            },
        ) = (without_flue.conditioned(), with_flue.conditioned())
        else {
            panic!("expected AIM-2 infiltration");
        };
        assert_ne!(without.stack_coefficient(), with.stack_coefficient());
        assert!(with.wind_shelter_multiplier() > without.wind_shelter_multiplier());
    }

    #[rstest]
    fn should_use_constant_ach(
        building: BuildingInput,
        mut infiltration: InfiltrationInput,
        external_conditions: ExternalConditions,
    ) {
        infiltration.envelope_leakage = EnvelopeLeakage::ConstantAch { value: 0.45 };
        let model = InfiltrationModel::new(&building, &infiltration, &external_conditions).unwrap();
        let summary = &model.zone_summaries()[0];
        assert_eq!(summary.method, InfiltrationMethod::ConstantAch);
        assert_relative_eq!(summary.steady_flow_cfm, 0.45 * 16000. / 60.);
        assert_relative_eq!(
            model.zone_flow(ZoneKind::Conditioned, 10., 3.),
            air_change_rate_to_flow_rate_m3_per_s(0.45, 16000.)
        );
    }

    #[rstest]
    fn should_give_exactly_zero_flow_for_unvented_zones(
        mut building: BuildingInput,
        infiltration: InfiltrationInput,
        external_conditions: ExternalConditions,
    ) {
        building
            .zones
            .insert(ZoneKind::UnventedAttic, zone(6., 1000.));
        building
            .zones
            .insert(ZoneKind::UnventedCrawlspace, zone(3., 1000.));
        let model = InfiltrationModel::new(&building, &infiltration, &external_conditions).unwrap();

        for kind in [ZoneKind::UnventedAttic, ZoneKind::UnventedCrawlspace] {
            assert_eq!(model.zone(kind), Some(&ZoneInfiltration::None));
            assert_eq!(model.zone_flow(kind, 30., 10.), 0.);
        }
    }

    #[rstest]
    fn should_derive_unconditioned_zone_methods(
        mut building: BuildingInput,
        infiltration: InfiltrationInput,
        external_conditions: ExternalConditions,
    ) {
        building.zones.insert(ZoneKind::Garage, zone(8., 400.));
        building
            .zones
            .insert(ZoneKind::UnconditionedBasement, zone(8., 1000.));
        building.zones.insert(ZoneKind::VentedAttic, zone(6., 1000.));
        let model = InfiltrationModel::new(&building, &infiltration, &external_conditions).unwrap();

        let methods = model
            .zone_summaries()
            .iter()
            .map(|summary| (summary.zone, summary.method))
            .collect::<Vec<_>>();
        assert_eq!(
            methods,
            vec![
                (ZoneKind::Conditioned, InfiltrationMethod::Aim2),
                (ZoneKind::Garage, InfiltrationMethod::EffectiveLeakageArea),
                (ZoneKind::UnconditionedBasement, InfiltrationMethod::ConstantAch),
                (ZoneKind::VentedAttic, InfiltrationMethod::EffectiveLeakageArea),
            ]
        );

        let attic = model.zone(ZoneKind::VentedAttic).unwrap();
        assert_relative_eq!(attic.effective_leakage_area(), 1000. / 300., max_relative = 1e-12);
        assert_relative_eq!(attic.annual_average_ach(), 1000. / 300. * 0.6, max_relative = 1e-12);
        assert!(model.zone_flow(ZoneKind::VentedAttic, 10., 4.) > 0.);
        assert_relative_eq!(
            model.zone(ZoneKind::UnconditionedBasement).unwrap().annual_average_ach(),
            0.1
        );
    }

    #[rstest]
    fn should_use_vented_crawlspace_distribution_and_sla(
        mut building: BuildingInput,
        infiltration: InfiltrationInput,
        external_conditions: ExternalConditions,
    ) {
        building
            .zones
            .insert(ZoneKind::VentedCrawlspace, zone(3., 1000.));
        let model = InfiltrationModel::new(&building, &infiltration, &external_conditions).unwrap();
        assert_eq!(model.leakage_distribution().floor(), 0.50);
        assert_relative_eq!(
            model
                .zone(ZoneKind::VentedCrawlspace)
                .unwrap()
                .annual_average_ach(),
            1000. / 150. * 0.6,
            max_relative = 1e-12
        );
    }

    #[rstest]
    fn should_calc_ela_flow_from_coefficients() {
        let leakage_area = EffectiveLeakageArea::new(1., 0., 0.5, 8., 0.3, 0.8).unwrap();
        let expected = square_feet_to_square_metres(1.)
            * (leakage_area.stack_coefficient() * 10. + leakage_area.wind_coefficient() * 9.).sqrt();
        assert_relative_eq!(leakage_area.flow(-10., 3.), expected, max_relative = 1e-12);
        assert_relative_eq!(leakage_area.wind_coefficient(), (0.3 * 0.8f64).powi(2));
        assert!(EffectiveLeakageArea::new(-1., 0., 0.5, 8., 0.3, 0.8).is_err());
    }
}
