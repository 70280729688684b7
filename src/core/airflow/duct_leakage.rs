//! Leakage and conduction losses from forced-air ducts that run through unconditioned
//! spaces or outside, grouped per air handler and per duct location.

use crate::core::psychrometrics::{
    dry_air_density, enthalpy, latent_heat_of_vaporisation, AirState, AIR,
};
use crate::core::units::{btu_per_hour_f_to_watts_per_kelvin, cubic_metres_per_second_to_cfm};
use crate::errors::AirflowError;
use crate::input::{AirHandlerInput, DuctInput, DuctSide, ZoneKind};
use indexmap::IndexMap;
use serde::Serialize;
use std::fmt;
use tracing::warn;

/// Effective R-value of an uninsulated duct, in ft^2 F hr / Btu
const UNINSULATED_EFFECTIVE_R_VALUE: f64 = 1.7;
/// Pressure difference at which leakage flows are specified, in Pa
const LEAKAGE_REFERENCE_PRESSURE: f64 = 25.;
const DUCT_LEAKAGE_EXPONENT: f64 = 0.6;

/// Leakage flow at an operating pressure from the flow measured at 25 Pa, both in cfm
pub fn leakage_flow_at_pressure(flow_at_25pa: f64, pressure: f64) -> f64 {
    flow_at_25pa * (pressure / LEAKAGE_REFERENCE_PRESSURE).powf(DUCT_LEAKAGE_EXPONENT)
}

/// Effective R-value of a duct including air films, in ft^2 F hr / Btu
///
/// Arguments:
/// * `side` - supply or return
/// * `nominal_r_value` - nominal insulation R-value, in ft^2 F hr / Btu
pub fn effective_r_value(side: DuctSide, nominal_r_value: f64) -> f64 {
    if nominal_r_value <= 0. {
        return UNINSULATED_EFFECTIVE_R_VALUE;
    }
    match side {
        DuctSide::Supply => 2.2438 + 0.5619 * nominal_r_value,
        DuctSide::Return => 2.0388 + 0.7053 * nominal_r_value,
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DuctLocation {
    Outside,
    Zone(ZoneKind),
}

impl DuctLocation {
    fn from_input(location: Option<ZoneKind>) -> Self {
        location.map_or(Self::Outside, Self::Zone)
    }

    /// Whether air in this location exchanges freely with outdoors
    pub fn is_vented(&self) -> bool {
        match self {
            Self::Outside => true,
            Self::Zone(zone) => zone.is_vented(),
        }
    }
}

impl fmt::Display for DuctLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Outside => write!(f, "outside"),
            Self::Zone(zone) => write!(f, "{zone}"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DuctLeakage {
    /// Fraction of the air handler flow
    Fraction(f64),
    /// Flow at 25 Pa, in cfm
    FlowAt25Pa(f64),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LeakageUnits {
    Fraction,
    FlowAt25Pa,
}

impl DuctLeakage {
    fn units(&self) -> LeakageUnits {
        match self {
            Self::Fraction(_) => LeakageUnits::Fraction,
            Self::FlowAt25Pa(_) => LeakageUnits::FlowAt25Pa,
        }
    }

    fn value(&self) -> f64 {
        match self {
            Self::Fraction(value) | Self::FlowAt25Pa(value) => *value,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Duct {
    side: DuctSide,
    location: DuctLocation,
    leakage: Option<DuctLeakage>,
    area: f64, // ft^2
    nominal_r_value: f64,
    effective_r_value: f64,
}

impl Duct {
    pub fn new(input: &DuctInput) -> Result<Self, AirflowError> {
        let side = input.side;
        let leakage = match (input.leakage_fraction, input.leakage_flow_at_25pa) {
            (Some(_), Some(_)) => return Err(AirflowError::DuctLeakageOverSpecified { side }),
            (Some(fraction), None) => {
                if !(0. ..=1.).contains(&fraction) {
                    return Err(AirflowError::DuctLeakageFraction {
                        side,
                        value: fraction,
                    });
                }
                Some(DuctLeakage::Fraction(fraction))
            }
            (None, Some(flow)) => {
                if !(flow >= 0.) {
                    return Err(AirflowError::DuctLeakageFlow { side, value: flow });
                }
                Some(DuctLeakage::FlowAt25Pa(flow))
            }
            (None, None) => None,
        };
        if !(input.area >= 0.) {
            return Err(AirflowError::DuctArea {
                side,
                value: input.area,
            });
        }
        if !(input.nominal_r_value >= 0.) {
            return Err(AirflowError::DuctRValue {
                side,
                value: input.nominal_r_value,
            });
        }

        Ok(Self {
            side,
            location: DuctLocation::from_input(input.location),
            leakage,
            area: input.area,
            nominal_r_value: input.nominal_r_value,
            effective_r_value: effective_r_value(side, input.nominal_r_value),
        })
    }

    pub fn side(&self) -> DuctSide {
        self.side
    }

    pub fn location(&self) -> DuctLocation {
        self.location
    }

    pub fn leakage(&self) -> Option<DuctLeakage> {
        self.leakage
    }

    /// Conductance of the duct wall, in W/K
    pub fn ua(&self) -> f64 {
        btu_per_hour_f_to_watts_per_kelvin(self.area / self.effective_r_value)
    }
}

/// Split of imbalanced duct leakage between the conditioned zone, the duct zone and outside.
/// Holds fractions of the imbalance in setup, and flows in m^3/s once scaled for a timestep.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct ImbalancePaths {
    pub outside_to_conditioned: f64,
    pub conditioned_to_outside: f64,
    pub outside_to_duct_zone: f64,
    pub duct_zone_to_outside: f64,
    pub conditioned_to_duct_zone: f64,
    pub duct_zone_to_conditioned: f64,
}

impl ImbalancePaths {
    /// Arguments:
    /// * `supply_leakage` - total supply leakage in the location
    /// * `return_leakage` - total return leakage in the location, in the same units
    /// * `vented` - whether the location exchanges freely with outdoors
    pub fn new(supply_leakage: f64, return_leakage: f64, vented: bool) -> Self {
        if is_close!(supply_leakage, return_leakage, rel_tol = 1e-9, abs_tol = 1e-12) {
            return Default::default();
        }
        match (supply_leakage > return_leakage, vented) {
            (true, true) => Self {
                outside_to_conditioned: 1.,
                ..Default::default()
            },
            (true, false) => Self {
                outside_to_conditioned: 0.5,
                duct_zone_to_outside: 0.5,
                duct_zone_to_conditioned: 0.5,
                ..Default::default()
            },
            (false, true) => Self {
                conditioned_to_outside: 1.,
                ..Default::default()
            },
            (false, false) => Self {
                conditioned_to_outside: 0.5,
                outside_to_duct_zone: 0.5,
                conditioned_to_duct_zone: 0.5,
                ..Default::default()
            },
        }
    }

    fn scaled(&self, flow: f64) -> Self {
        Self {
            outside_to_conditioned: self.outside_to_conditioned * flow,
            conditioned_to_outside: self.conditioned_to_outside * flow,
            outside_to_duct_zone: self.outside_to_duct_zone * flow,
            duct_zone_to_outside: self.duct_zone_to_outside * flow,
            conditioned_to_duct_zone: self.conditioned_to_duct_zone * flow,
            duct_zone_to_conditioned: self.duct_zone_to_conditioned * flow,
        }
    }
}

/// Leakage and conductance of all ducts of one air handler in one location
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DuctLocationRecord {
    location: DuctLocation,
    units: Option<LeakageUnits>,
    supply_leakage: f64,
    return_leakage: f64,
    supply_ua: f64, // W/K
    return_ua: f64, // W/K
    imbalance: ImbalancePaths,
}

impl DuctLocationRecord {
    fn new(location: DuctLocation) -> Self {
        Self {
            location,
            units: None,
            supply_leakage: 0.,
            return_leakage: 0.,
            supply_ua: 0.,
            return_ua: 0.,
            imbalance: Default::default(),
        }
    }

    fn add_duct(&mut self, duct: &Duct, air_handler: &str) -> Result<(), AirflowError> {
        if let Some(leakage) = duct.leakage {
            match self.units {
                Some(units) if units != leakage.units() => {
                    return Err(AirflowError::MixedDuctLeakageUnits {
                        air_handler: air_handler.to_string(),
                        location: self.location.to_string(),
                    })
                }
                _ => self.units = Some(leakage.units()),
            }
            match duct.side {
                DuctSide::Supply => self.supply_leakage += leakage.value(),
                DuctSide::Return => self.return_leakage += leakage.value(),
            }
        }
        match duct.side {
            DuctSide::Supply => self.supply_ua += duct.ua(),
            DuctSide::Return => self.return_ua += duct.ua(),
        }
        Ok(())
    }

    fn finalise(&mut self) -> Result<(), AirflowError> {
        for ua in [self.supply_ua, self.return_ua] {
            if ua < 0. {
                return Err(AirflowError::NegativeQuantity {
                    quantity: "duct UA",
                    value: ua,
                });
            }
        }
        self.imbalance = ImbalancePaths::new(
            self.supply_leakage,
            self.return_leakage,
            self.location.is_vented(),
        );
        Ok(())
    }

    pub fn location(&self) -> DuctLocation {
        self.location
    }

    pub fn units(&self) -> Option<LeakageUnits> {
        self.units
    }

    /// Total supply leakage, in the record's units
    pub fn supply_leakage(&self) -> f64 {
        self.supply_leakage
    }

    pub fn return_leakage(&self) -> f64 {
        self.return_leakage
    }

    /// in W/K
    pub fn supply_ua(&self) -> f64 {
        self.supply_ua
    }

    pub fn return_ua(&self) -> f64 {
        self.return_ua
    }

    pub fn imbalance_fractions(&self) -> ImbalancePaths {
        self.imbalance
    }

    /// Supply and return leakage as fractions of the air handler flow.
    ///
    /// Arguments:
    /// * `volume_flow` - air handler flow, in m^3/s
    /// * `operating_pressure` - pressure difference across the leaks, in Pa
    pub fn leakage_fractions(&self, volume_flow: f64, operating_pressure: f64) -> (f64, f64) {
        match self.units {
            None => (0., 0.),
            Some(LeakageUnits::Fraction) => (self.supply_leakage, self.return_leakage),
            Some(LeakageUnits::FlowAt25Pa) => {
                let flow_cfm = cubic_metres_per_second_to_cfm(volume_flow);
                if flow_cfm <= 0. {
                    return (0., 0.);
                }
                let fraction = |leakage: f64| {
                    (leakage_flow_at_pressure(leakage, operating_pressure) / flow_cfm).min(1.)
                };
                (
                    fraction(self.supply_leakage),
                    fraction(self.return_leakage),
                )
            }
        }
    }
}

/// Operating state of an air handler over one timestep
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AirHandlerConditions {
    /// Mass flow averaged over the timestep, in kg/s
    pub mass_flow: f64,
    pub runtime_fraction: f64,
    /// Air leaving the air handler
    pub outlet: AirState,
    /// Air returned from the conditioned zone
    pub return_air: AirState,
}

/// Heat gains (W) from the ducts of one location in one timestep
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct DuctLoads {
    pub supply_leakage_fraction: f64,
    pub return_leakage_fraction: f64,
    pub conditioned_sensible: f64,
    pub conditioned_latent: f64,
    pub return_plenum_sensible: f64,
    pub return_plenum_latent: f64,
    pub duct_zone_sensible: f64,
    pub duct_zone_latent: f64,
    /// Imbalanced leakage flow, in m^3/s
    pub imbalance_flow: f64,
    pub imbalance: ImbalancePaths,
}

impl DuctLoads {
    /// Outdoor air drawn into the conditioned zone by the imbalance, in m^3/s
    pub fn exhaust_equivalent(&self) -> f64 {
        self.imbalance.outside_to_conditioned
    }

    /// Conditioned air pushed outside by the imbalance, in m^3/s
    pub fn supply_equivalent(&self) -> f64 {
        self.imbalance.conditioned_to_outside
    }
}

/// Ducts served by one air handler
#[derive(Clone, Debug, PartialEq)]
pub struct AirHandlerDucts {
    name: String,
    ducts: Vec<Duct>,
    locations: IndexMap<DuctLocation, DuctLocationRecord>,
    operating_pressure: f64,
    return_to_conditioned: bool,
}

impl AirHandlerDucts {
    /// Arguments:
    /// * `name` - air handler name
    /// * `input` - air handler and its ducts
    /// * `serves_cfis` - whether CFIS draws outdoor air through this air handler
    pub fn new(name: &str, input: &AirHandlerInput, serves_cfis: bool) -> Result<Self, AirflowError> {
        let ducts = input
            .ducts
            .iter()
            .map(Duct::new)
            .collect::<Result<Vec<_>, _>>()?;

        let mut locations: IndexMap<DuctLocation, DuctLocationRecord> = Default::default();
        for duct in &ducts {
            // ducts inside the conditioned zone lose nothing
            if duct.location == DuctLocation::Zone(ZoneKind::Conditioned) {
                continue;
            }
            locations
                .entry(duct.location)
                .or_insert_with(|| DuctLocationRecord::new(duct.location))
                .add_duct(duct, name)?;
        }
        for record in locations.values_mut() {
            record.finalise()?;
        }

        Ok(Self {
            name: name.to_string(),
            ducts,
            locations,
            operating_pressure: input.duct_operating_pressure,
            return_to_conditioned: serves_cfis,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Pressure difference across the leaks while the blower runs, in Pa
    pub fn operating_pressure(&self) -> f64 {
        self.operating_pressure
    }

    pub fn ducts(&self) -> &[Duct] {
        &self.ducts
    }

    pub fn has_ducts(&self) -> bool {
        !self.ducts.is_empty()
    }

    pub fn locations(&self) -> impl Iterator<Item = &DuctLocationRecord> {
        self.locations.values()
    }

    /// Whether return plenum loads are delivered to the conditioned zone
    pub fn returns_to_conditioned(&self) -> bool {
        self.return_to_conditioned
    }

    /// Duct losses for each location of this air handler in one timestep.
    ///
    /// Arguments:
    /// * `conditions` - air handler operation over the timestep
    /// * `outdoor` - outdoor air state
    /// * `zones` - air states of the unconditioned zones
    /// * `pressure` - local air pressure, in Pa
    pub fn loads(
        &self,
        conditions: &AirHandlerConditions,
        outdoor: AirState,
        zones: &IndexMap<ZoneKind, AirState>,
        pressure: f64,
    ) -> Result<IndexMap<DuctLocation, DuctLoads>, AirflowError> {
        self.locations
            .values()
            .map(|record| -> Result<_, AirflowError> {
                let duct_zone = match record.location {
                    DuctLocation::Outside => outdoor,
                    DuctLocation::Zone(zone) => *zones
                        .get(&zone)
                        .ok_or(AirflowError::MissingZoneState(zone))?,
                };
                let loads = self.location_loads(record, conditions, duct_zone, pressure)?;
                Ok((record.location, loads))
            })
            .collect()
    }

    fn location_loads(
        &self,
        record: &DuctLocationRecord,
        conditions: &AirHandlerConditions,
        duct_zone: AirState,
        pressure: f64,
    ) -> Result<DuctLoads, AirflowError> {
        let mass_flow = conditions.mass_flow;
        if mass_flow <= 0. {
            return Ok(Default::default());
        }
        let cp = AIR.specific_heat_capacity();
        let return_air = conditions.return_air;
        let outlet = conditions.outlet;

        let density = dry_air_density(return_air.temperature, return_air.humidity_ratio, pressure)?;
        let volume_flow = mass_flow / density;
        let (supply_fraction, return_fraction) =
            record.leakage_fractions(volume_flow, self.operating_pressure);

        // conduction through the duct walls, on the whole stream
        let supply_outlet_temp = duct_zone.temperature
            + (outlet.temperature - duct_zone.temperature)
                * (-record.supply_ua * conditions.runtime_fraction / (mass_flow * cp)).exp();
        let return_outlet_temp = duct_zone.temperature
            + (return_air.temperature - duct_zone.temperature)
                * (-record.return_ua * conditions.runtime_fraction / (mass_flow * cp)).exp();
        let supply_conduction = mass_flow * cp * (supply_outlet_temp - outlet.temperature);
        let return_conduction = mass_flow * cp * (return_outlet_temp - return_air.temperature);

        // sensible enthalpies are taken at the return air humidity ratio
        let w = return_air.humidity_ratio;
        let h_return = enthalpy(return_air.temperature, w);
        let h_supply = enthalpy(supply_outlet_temp, w);
        let h_duct_zone = enthalpy(duct_zone.temperature, w);
        let h_fg = latent_heat_of_vaporisation(return_air.temperature);

        let supply_leak = supply_fraction * mass_flow;
        let return_leak = return_fraction * mass_flow;

        let mut loads = DuctLoads {
            supply_leakage_fraction: supply_fraction,
            return_leakage_fraction: return_fraction,
            conditioned_sensible: supply_conduction + supply_leak * (h_return - h_supply),
            conditioned_latent: supply_leak * h_fg * (w - outlet.humidity_ratio),
            return_plenum_sensible: return_conduction + return_leak * (h_duct_zone - h_return),
            return_plenum_latent: return_leak * h_fg * (duct_zone.humidity_ratio - w),
            duct_zone_sensible: supply_leak * (h_supply - h_duct_zone)
                - supply_conduction
                - return_conduction,
            duct_zone_latent: supply_leak * h_fg * (outlet.humidity_ratio - duct_zone.humidity_ratio),
            imbalance_flow: 0.,
            imbalance: Default::default(),
        };
        if self.return_to_conditioned {
            loads.conditioned_sensible += loads.return_plenum_sensible;
            loads.conditioned_latent += loads.return_plenum_latent;
            loads.return_plenum_sensible = 0.;
            loads.return_plenum_latent = 0.;
        }

        loads.imbalance_flow = (supply_fraction - return_fraction).abs() * volume_flow;
        loads.imbalance = record.imbalance.scaled(loads.imbalance_flow);
        Ok(loads)
    }
}

/// Per-handler duct existence and duct list
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AirHandlerDuctSummary {
    pub air_handler: String,
    pub has_ducts: bool,
    pub ducts: Vec<Duct>,
}

/// Ducts of every air handler with ducted equipment
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DuctLeakageNetwork {
    air_handlers: IndexMap<String, AirHandlerDucts>,
}

impl DuctLeakageNetwork {
    /// Arguments:
    /// * `air_handlers` - air handlers by name
    /// * `cfis_air_handler` - name of the air handler CFIS draws outdoor air through, if any
    pub fn new(
        air_handlers: &IndexMap<String, AirHandlerInput>,
        cfis_air_handler: Option<&str>,
    ) -> Result<Self, AirflowError> {
        let mut network: IndexMap<String, AirHandlerDucts> = Default::default();
        for (name, input) in air_handlers {
            match (input.has_ducted_equipment, input.ducts.is_empty()) {
                (false, false) => {
                    warn!(
                        "Air handler '{name}' has ducts but no ducted equipment; its ducts are ignored"
                    );
                    continue;
                }
                (false, true) => continue,
                (true, true) => {
                    warn!("Air handler '{name}' has ducted equipment but no ducts");
                }
                (true, false) => {}
            }
            network.insert(
                name.clone(),
                AirHandlerDucts::new(name, input, cfis_air_handler == Some(name.as_str()))?,
            );
        }

        Ok(Self {
            air_handlers: network,
        })
    }

    pub fn air_handlers(&self) -> impl Iterator<Item = &AirHandlerDucts> {
        self.air_handlers.values()
    }

    pub fn air_handler(&self, name: &str) -> Option<&AirHandlerDucts> {
        self.air_handlers.get(name)
    }

    pub fn summaries(&self) -> Vec<AirHandlerDuctSummary> {
        self.air_handlers
            .values()
            .map(|air_handler| AirHandlerDuctSummary {
                air_handler: air_handler.name.clone(),
                has_ducts: air_handler.has_ducts(),
                ducts: air_handler.ducts.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::psychrometrics::STANDARD_PRESSURE_PA;
    use crate::core::units::cfm_to_cubic_metres_per_second;
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;
    use rstest::*;
    use strum::IntoEnumIterator;

    fn duct(side: DuctSide, location: Option<ZoneKind>, leakage_fraction: Option<f64>) -> DuctInput {
        DuctInput {
            side,
            location,
            leakage_fraction,
            leakage_flow_at_25pa: None,
            area: 100.,
            nominal_r_value: 6.,
        }
    }

    fn air_handler(ducts: Vec<DuctInput>) -> AirHandlerInput {
        AirHandlerInput {
            has_ducted_equipment: true,
            ducts,
            blower_power: 400.,
            duct_operating_pressure: 25.,
        }
    }

    #[fixture]
    fn attic_ducts() -> AirHandlerInput {
        air_handler(vec![
            duct(DuctSide::Supply, Some(ZoneKind::VentedAttic), Some(0.075)),
            duct(DuctSide::Return, Some(ZoneKind::VentedAttic), Some(0.025)),
        ])
    }

    fn cooling_conditions() -> AirHandlerConditions {
        AirHandlerConditions {
            mass_flow: 0.5,
            runtime_fraction: 0.6,
            outlet: AirState::new(13., 0.008),
            return_air: AirState::new(24., 0.010),
        }
    }

    fn hot_attic() -> IndexMap<ZoneKind, AirState> {
        IndexMap::from([(ZoneKind::VentedAttic, AirState::new(45., 0.012))])
    }

    #[rstest]
    #[case(DuctSide::Supply, 0., 1.7)]
    #[case(DuctSide::Supply, -1., 1.7)]
    #[case(DuctSide::Supply, 6., 2.2438 + 0.5619 * 6.)]
    #[case(DuctSide::Return, 8., 2.0388 + 0.7053 * 8.)]
    fn should_calc_effective_r_value(
        #[case] side: DuctSide,
        #[case] nominal: f64,
        #[case] expected: f64,
    ) {
        assert_relative_eq!(effective_r_value(side, nominal), expected);
    }

    #[rstest]
    fn should_increase_effective_r_value_with_insulation() {
        for side in DuctSide::iter() {
            let values = (0..=16)
                .map(|r| effective_r_value(side, r as f64))
                .collect::<Vec<_>>();
            assert!(values.windows(2).all(|pair| pair[1] > pair[0]));
        }
    }

    #[rstest]
    #[case(Some(1.2), None, 100., 6., AirflowError::DuctLeakageFraction { side: DuctSide::Supply, value: 1.2 })]
    #[case(None, Some(-5.), 100., 6., AirflowError::DuctLeakageFlow { side: DuctSide::Supply, value: -5. })]
    #[case(Some(0.1), Some(50.), 100., 6., AirflowError::DuctLeakageOverSpecified { side: DuctSide::Supply })]
    #[case(None, None, -1., 6., AirflowError::DuctArea { side: DuctSide::Supply, value: -1. })]
    #[case(None, None, 100., -2., AirflowError::DuctRValue { side: DuctSide::Supply, value: -2. })]
    fn should_reject_invalid_ducts(
        #[case] leakage_fraction: Option<f64>,
        #[case] leakage_flow_at_25pa: Option<f64>,
        #[case] area: f64,
        #[case] nominal_r_value: f64,
        #[case] expected: AirflowError,
    ) {
        let input = DuctInput {
            side: DuctSide::Supply,
            location: None,
            leakage_fraction,
            leakage_flow_at_25pa,
            area,
            nominal_r_value,
        };
        assert_eq!(Duct::new(&input), Err(expected));
    }

    #[rstest]
    #[case(50., 50., true, ImbalancePaths::default())]
    #[case(50., 50., false, ImbalancePaths::default())]
    #[case(75., 25., true, ImbalancePaths { outside_to_conditioned: 1., ..Default::default() })]
    #[case(75., 25., false, ImbalancePaths {
        outside_to_conditioned: 0.5,
        duct_zone_to_outside: 0.5,
        duct_zone_to_conditioned: 0.5,
        ..Default::default()
    })]
    #[case(25., 75., true, ImbalancePaths { conditioned_to_outside: 1., ..Default::default() })]
    #[case(25., 75., false, ImbalancePaths {
        conditioned_to_outside: 0.5,
        outside_to_duct_zone: 0.5,
        conditioned_to_duct_zone: 0.5,
        ..Default::default()
    })]
    fn should_split_imbalance_by_direction_and_venting(
        #[case] supply_leakage: f64,
        #[case] return_leakage: f64,
        #[case] vented: bool,
        #[case] expected: ImbalancePaths,
    ) {
        let paths = ImbalancePaths::new(supply_leakage, return_leakage, vented);
        assert_eq!(paths, expected);
        // only one direction of mixing between the conditioned and duct zones
        assert!(paths.conditioned_to_duct_zone == 0. || paths.duct_zone_to_conditioned == 0.);
    }

    #[rstest]
    fn should_aggregate_ducts_per_location(attic_ducts: AirHandlerInput) {
        let mut input = attic_ducts;
        input.ducts.push(duct(DuctSide::Supply, None, Some(0.02)));
        input
            .ducts
            .push(duct(DuctSide::Supply, Some(ZoneKind::Conditioned), Some(0.3)));

        let ducts = AirHandlerDucts::new("furnace", &input, false).unwrap();
        assert_eq!(ducts.ducts().len(), 4);
        let locations = ducts.locations().map(|r| r.location()).collect::<Vec<_>>();
        assert_eq!(
            locations,
            vec![
                DuctLocation::Zone(ZoneKind::VentedAttic),
                DuctLocation::Outside
            ]
        );

        let attic = ducts.locations().next().unwrap();
        assert_relative_eq!(
            attic.supply_ua(),
            btu_per_hour_f_to_watts_per_kelvin(100. / (2.2438 + 0.5619 * 6.))
        );
        assert_relative_eq!(
            attic.return_ua(),
            btu_per_hour_f_to_watts_per_kelvin(100. / (2.0388 + 0.7053 * 6.))
        );
        assert_eq!(attic.leakage_fractions(1., 25.), (0.075, 0.025));
        assert_eq!(attic.imbalance_fractions().outside_to_conditioned, 1.);
    }

    #[rstest]
    fn should_reject_mixed_leakage_units_in_one_location() {
        let mut flow_duct = duct(DuctSide::Return, Some(ZoneKind::Garage), None);
        flow_duct.leakage_flow_at_25pa = Some(40.);
        let input = air_handler(vec![
            duct(DuctSide::Supply, Some(ZoneKind::Garage), Some(0.05)),
            flow_duct,
        ]);
        assert_eq!(
            AirHandlerDucts::new("furnace", &input, false),
            Err(AirflowError::MixedDuctLeakageUnits {
                air_handler: "furnace".into(),
                location: "garage".into(),
            })
        );
    }

    #[rstest]
    fn should_convert_leakage_flow_to_fraction_of_air_handler_flow() {
        let mut supply = duct(DuctSide::Supply, Some(ZoneKind::UnventedAttic), None);
        supply.leakage_flow_at_25pa = Some(75.);
        let mut ret = duct(DuctSide::Return, Some(ZoneKind::UnventedAttic), None);
        ret.leakage_flow_at_25pa = Some(25.);
        let input = air_handler(vec![supply, ret]);
        let ducts = AirHandlerDucts::new("furnace", &input, false).unwrap();
        let record = ducts.locations().next().unwrap();

        let volume_flow = cfm_to_cubic_metres_per_second(1000.);
        let (supply_fraction, return_fraction) = record.leakage_fractions(volume_flow, 25.);
        assert_relative_eq!(supply_fraction, 0.075, max_relative = 1e-9);
        assert_relative_eq!(return_fraction, 0.025, max_relative = 1e-9);

        let (supply_fraction, _) = record.leakage_fractions(volume_flow, 50.);
        assert_relative_eq!(supply_fraction, 0.075 * 2f64.powf(0.6), max_relative = 1e-9);

        assert_eq!(
            record.imbalance_fractions(),
            ImbalancePaths {
                outside_to_conditioned: 0.5,
                duct_zone_to_outside: 0.5,
                duct_zone_to_conditioned: 0.5,
                ..Default::default()
            }
        );
    }

    #[rstest]
    fn should_have_no_losses_when_blower_is_off(attic_ducts: AirHandlerInput) {
        let ducts = AirHandlerDucts::new("furnace", &attic_ducts, false).unwrap();
        let conditions = AirHandlerConditions {
            mass_flow: 0.,
            runtime_fraction: 0.,
            ..cooling_conditions()
        };
        let loads = ducts
            .loads(&conditions, AirState::new(30., 0.01), &hot_attic(), STANDARD_PRESSURE_PA)
            .unwrap();
        assert_eq!(
            loads[&DuctLocation::Zone(ZoneKind::VentedAttic)],
            DuctLoads::default()
        );
    }

    #[rstest]
    fn should_conserve_conduction_between_zones_without_leakage() {
        let input = air_handler(vec![
            duct(DuctSide::Supply, Some(ZoneKind::VentedAttic), None),
            duct(DuctSide::Return, Some(ZoneKind::VentedAttic), None),
        ]);
        let ducts = AirHandlerDucts::new("furnace", &input, false).unwrap();
        let conditions = cooling_conditions();
        let loads = ducts
            .loads(&conditions, AirState::new(30., 0.01), &hot_attic(), STANDARD_PRESSURE_PA)
            .unwrap()[&DuctLocation::Zone(ZoneKind::VentedAttic)];

        let record = ducts.locations().next().unwrap();
        let cp = AIR.specific_heat_capacity();
        let supply_outlet = 45.
            + (13. - 45.) * (-record.supply_ua() * 0.6 / (0.5 * cp)).exp();
        assert_relative_eq!(
            loads.conditioned_sensible,
            0.5 * cp * (supply_outlet - 13.),
            max_relative = 1e-9
        );
        assert!(loads.conditioned_sensible > 0.);
        assert!(loads.return_plenum_sensible > 0.);
        assert_relative_eq!(
            loads.conditioned_sensible + loads.return_plenum_sensible + loads.duct_zone_sensible,
            0.,
            epsilon = 1e-6
        );
        assert_eq!(loads.conditioned_latent, 0.);
        assert_eq!(loads.imbalance_flow, 0.);
    }

    #[rstest]
    fn should_calc_leakage_loads_and_imbalance_flow(attic_ducts: AirHandlerInput) {
        let ducts = AirHandlerDucts::new("furnace", &attic_ducts, false).unwrap();
        let conditions = cooling_conditions();
        let loads = ducts
            .loads(&conditions, AirState::new(30., 0.01), &hot_attic(), STANDARD_PRESSURE_PA)
            .unwrap()[&DuctLocation::Zone(ZoneKind::VentedAttic)];

        assert_eq!(loads.supply_leakage_fraction, 0.075);
        assert_eq!(loads.return_leakage_fraction, 0.025);
        // cold dry supply air lost to the attic, hot humid attic air drawn into the return
        assert!(loads.conditioned_latent > 0.);
        assert!(loads.return_plenum_latent > 0.);
        assert!(loads.duct_zone_sensible < 0.);

        let density = dry_air_density(24., 0.010, STANDARD_PRESSURE_PA).unwrap();
        let expected_flow = 0.05 * 0.5 / density;
        assert_relative_eq!(loads.imbalance_flow, expected_flow, max_relative = 1e-9);
        assert_relative_eq!(loads.exhaust_equivalent(), expected_flow, max_relative = 1e-9);
        assert_eq!(loads.supply_equivalent(), 0.);
    }

    #[rstest]
    fn should_route_return_plenum_loads_to_conditioned_zone_with_cfis(
        attic_ducts: AirHandlerInput,
    ) {
        let conditions = cooling_conditions();
        let outdoor = AirState::new(30., 0.01);
        let zones = hot_attic();
        let location = DuctLocation::Zone(ZoneKind::VentedAttic);

        let plain = AirHandlerDucts::new("furnace", &attic_ducts, false)
            .unwrap()
            .loads(&conditions, outdoor, &zones, STANDARD_PRESSURE_PA)
            .unwrap()[&location];
        let with_cfis = AirHandlerDucts::new("furnace", &attic_ducts, true)
            .unwrap()
            .loads(&conditions, outdoor, &zones, STANDARD_PRESSURE_PA)
            .unwrap()[&location];

        assert_eq!(with_cfis.return_plenum_sensible, 0.);
        assert_eq!(with_cfis.return_plenum_latent, 0.);
        assert_relative_eq!(
            with_cfis.conditioned_sensible,
            plain.conditioned_sensible + plain.return_plenum_sensible
        );
        assert_relative_eq!(
            with_cfis.conditioned_latent,
            plain.conditioned_latent + plain.return_plenum_latent
        );
        assert_eq!(with_cfis.duct_zone_sensible, plain.duct_zone_sensible);
    }

    #[rstest]
    fn should_fail_without_duct_zone_state(attic_ducts: AirHandlerInput) {
        let ducts = AirHandlerDucts::new("furnace", &attic_ducts, false).unwrap();
        assert_eq!(
            ducts.loads(
                &cooling_conditions(),
                AirState::new(30., 0.01),
                &IndexMap::new(),
                STANDARD_PRESSURE_PA
            ),
            Err(AirflowError::MissingZoneState(ZoneKind::VentedAttic))
        );
    }

    #[rstest]
    fn should_skip_ducts_without_ducted_equipment(attic_ducts: AirHandlerInput) {
        let without_equipment = AirHandlerInput {
            has_ducted_equipment: false,
            ..attic_ducts.clone()
        };
        let no_ducts = air_handler(vec![]);
        let air_handlers = IndexMap::from([
            ("furnace".to_string(), attic_ducts),
            ("boiler".to_string(), without_equipment),
            ("mini_split".to_string(), no_ducts),
        ]);

        let network = DuctLeakageNetwork::new(&air_handlers, Some("furnace")).unwrap();
        let summaries = network.summaries();
        assert_eq!(
            summaries
                .iter()
                .map(|s| (s.air_handler.as_str(), s.has_ducts, s.ducts.len()))
                .collect::<Vec<_>>(),
            vec![("furnace", true, 2), ("mini_split", false, 0)]
        );
        assert!(network.air_handler("furnace").unwrap().returns_to_conditioned());
        assert!(network.air_handler("boiler").is_none());
        assert_eq!(network.air_handlers().count(), 2);
    }
}
