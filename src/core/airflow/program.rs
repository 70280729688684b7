//! Per-timestep airflow program: evaluates the airflow components in a fixed order and
//! combines infiltration with unbalanced mechanical flows into the actuator values the
//! host zone heat balance applies.

use crate::core::airflow::cfis::CfisState;
use crate::core::airflow::duct_leakage::{
    AirHandlerConditions, DuctLeakageNetwork, DuctLoads, DuctLocation, ImbalancePaths,
};
use crate::core::airflow::infiltration::{InfiltrationModel, ZoneInfiltration};
use crate::core::airflow::mechanical_ventilation::{
    MechanicalVentilationFlows, MechanicalVentilationModel,
};
use crate::core::airflow::natural_ventilation::NaturalVentilationController;
use crate::core::psychrometrics::AirState;
use crate::errors::AirflowError;
use crate::input::ZoneKind;
use crate::simulation_time::SimulationTimeIteration;
use indexmap::IndexMap;
use serde::Serialize;
use strum_macros::{Display, EnumIter};

#[derive(Clone, Copy, Debug, Display, EnumIter, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProgramStage {
    Infiltration,
    NaturalVentilation,
    MechanicalVentilation,
    Ducts,
    CombinedBalance,
}

pub const EVALUATION_ORDER: [ProgramStage; 5] = [
    ProgramStage::Infiltration,
    ProgramStage::NaturalVentilation,
    ProgramStage::MechanicalVentilation,
    ProgramStage::Ducts,
    ProgramStage::CombinedBalance,
];

/// Conditions supplied by the host simulation for one timestep
#[derive(Clone, Debug)]
pub struct TimestepSnapshot {
    pub time: SimulationTimeIteration,
    pub indoor: AirState,
    pub outdoor: AirState,
    /// Outdoor barometric pressure, in Pa
    pub pressure: f64,
    /// Weather station wind speed, in m/s
    pub wind_speed: f64,
    /// Air states of the unconditioned zones
    pub zones: IndexMap<ZoneKind, AirState>,
    /// Operation of each air handler over the timestep, keyed by name
    pub air_handlers: IndexMap<String, AirHandlerConditions>,
    /// Fraction of the timestep the clothes dryer runs
    pub dryer_fraction: f64,
}

/// Duct leakage fractions of one air handler location in one timestep
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DuctOutputs {
    pub air_handler: String,
    pub location: DuctLocation,
    pub supply_fraction: f64,
    pub return_fraction: f64,
    pub imbalance_fractions: ImbalancePaths,
}

/// Values reported alongside the actuators
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct NamedOutputs {
    /// Conditioned zone stack coefficient, in (m^3/s)^2/K^n or (L/s)^2/(cm^4 K) for ELA
    pub stack_coefficient: f64,
    pub wind_coefficient: f64,
    /// Conditioned zone effective leakage area, in ft^2
    pub effective_leakage_area: f64,
    /// Natural ventilation opening area, in m^2
    pub natural_ventilation_area: f64,
    /// in m^3/s
    pub cfis_outdoor_air_flow: f64,
    pub ducts: Vec<DuctOutputs>,
}

/// Flows (m^3/s) and powers (W) applied to the conditioned zone for one timestep
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Actuators {
    /// Infiltration remaining after combination with the imbalanced mechanical flow
    pub infiltration: f64,
    pub imbalanced_mechanical_ventilation: f64,
    pub natural_ventilation: f64,
    pub balanced_ventilation: f64,
    /// Balanced supply air after heat recovery
    pub balanced_supply_air: AirState,
    pub fan_power: f64,
    pub fan_heat_to_zone: f64,
    pub mechanical_ventilation: MechanicalVentilationFlows,
    /// Infiltration of each unconditioned zone
    pub unconditioned_infiltration: IndexMap<ZoneKind, f64>,
    pub duct_loads: IndexMap<String, IndexMap<DuctLocation, DuctLoads>>,
    pub outputs: NamedOutputs,
}

/// Combination of the flows into the conditioned zone. Exhaust and supply are in m^3/s.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CombinedBalance {
    pub exhaust: f64,
    pub supply: f64,
    pub imbalance: f64,
    pub total: f64,
    pub infiltration: f64,
}

impl CombinedBalance {
    /// Unbalanced mechanical flow and infiltration add in quadrature
    pub fn new(exhaust: f64, supply: f64, infiltration_flow: f64) -> Self {
        let imbalance = (supply - exhaust).abs();
        let total = imbalance.hypot(infiltration_flow);
        Self {
            exhaust,
            supply,
            imbalance,
            total,
            infiltration: (total - imbalance).max(0.),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AirflowProgram {
    infiltration: InfiltrationModel,
    natural_ventilation: Option<NaturalVentilationController>,
    mechanical_ventilation: MechanicalVentilationModel,
    ducts: DuctLeakageNetwork,
}

impl AirflowProgram {
    pub fn new(
        infiltration: InfiltrationModel,
        natural_ventilation: Option<NaturalVentilationController>,
        mechanical_ventilation: MechanicalVentilationModel,
        ducts: DuctLeakageNetwork,
    ) -> Self {
        Self {
            infiltration,
            natural_ventilation,
            mechanical_ventilation,
            ducts,
        }
    }

    pub fn infiltration(&self) -> &InfiltrationModel {
        &self.infiltration
    }

    pub fn natural_ventilation(&self) -> Option<&NaturalVentilationController> {
        self.natural_ventilation.as_ref()
    }

    pub fn mechanical_ventilation(&self) -> &MechanicalVentilationModel {
        &self.mechanical_ventilation
    }

    pub fn ducts(&self) -> &DuctLeakageNetwork {
        &self.ducts
    }

    /// Stack and wind coefficients of the conditioned zone in SI units
    pub fn conditioned_coefficients(&self) -> (f64, f64) {
        match self.infiltration.conditioned() {
            ZoneInfiltration::Aim2 { coefficients, .. } => (
                coefficients.stack_coefficient_si(),
                coefficients.wind_coefficient_si(),
            ),
            ZoneInfiltration::EffectiveLeakageArea { leakage_area, .. } => {
                (leakage_area.stack_coefficient(), leakage_area.wind_coefficient())
            }
            ZoneInfiltration::ConstantAch { .. } | ZoneInfiltration::None => (0., 0.),
        }
    }

    /// Evaluate the program for one timestep.
    ///
    /// Arguments:
    /// * `snapshot` - conditions for the timestep
    /// * `cfis_state` - CFIS damper accumulator carried between timesteps
    pub fn evaluate(
        &self,
        snapshot: &TimestepSnapshot,
        cfis_state: &mut CfisState,
    ) -> Result<Actuators, AirflowError> {
        let (stack_coefficient, wind_coefficient) = self.conditioned_coefficients();
        let mut actuators = Actuators {
            outputs: NamedOutputs {
                stack_coefficient,
                wind_coefficient,
                effective_leakage_area: self.infiltration.conditioned().effective_leakage_area(),
                natural_ventilation_area: self
                    .natural_ventilation
                    .as_ref()
                    .map(|controller| controller.opening().area())
                    .unwrap_or_default(),
                ..Default::default()
            },
            ..Default::default()
        };
        let mut infiltration_flow = 0.;

        for stage in EVALUATION_ORDER {
            match stage {
                ProgramStage::Infiltration => {
                    infiltration_flow = self.evaluate_infiltration(snapshot, &mut actuators)?;
                }
                ProgramStage::NaturalVentilation => {
                    if let Some(controller) = &self.natural_ventilation {
                        actuators.natural_ventilation = controller.flow(
                            snapshot.time.current_hour(),
                            snapshot.indoor.temperature,
                            snapshot.outdoor.temperature,
                            snapshot.outdoor.humidity_ratio,
                            snapshot.pressure,
                            snapshot.wind_speed,
                        )?;
                    }
                }
                ProgramStage::MechanicalVentilation => {
                    self.evaluate_mechanical_ventilation(snapshot, cfis_state, &mut actuators);
                }
                ProgramStage::Ducts => self.evaluate_ducts(snapshot, &mut actuators)?,
                ProgramStage::CombinedBalance => {
                    let balance = self.combined_balance(&actuators, infiltration_flow);
                    actuators.infiltration = balance.infiltration;
                    actuators.imbalanced_mechanical_ventilation = balance.imbalance;
                }
            }
        }

        Ok(actuators)
    }

    fn evaluate_infiltration(
        &self,
        snapshot: &TimestepSnapshot,
        actuators: &mut Actuators,
    ) -> Result<f64, AirflowError> {
        let mut conditioned_flow = 0.;
        for zone in self.infiltration.zone_kinds() {
            let zone_temp = if zone == ZoneKind::Conditioned {
                snapshot.indoor.temperature
            } else {
                snapshot
                    .zones
                    .get(&zone)
                    .ok_or(AirflowError::MissingZoneState(zone))?
                    .temperature
            };
            let flow = self.infiltration.zone_flow(
                zone,
                zone_temp - snapshot.outdoor.temperature,
                snapshot.wind_speed,
            );
            if !(flow >= 0.) {
                return Err(AirflowError::NegativeQuantity {
                    quantity: "infiltration flow",
                    value: flow,
                });
            }
            if zone == ZoneKind::Conditioned {
                conditioned_flow = flow;
            } else {
                actuators.unconditioned_infiltration.insert(zone, flow);
            }
        }
        Ok(conditioned_flow)
    }

    fn evaluate_mechanical_ventilation(
        &self,
        snapshot: &TimestepSnapshot,
        cfis_state: &mut CfisState,
        actuators: &mut Actuators,
    ) {
        let blower_runtime_fraction = self
            .mechanical_ventilation
            .cfis()
            .and_then(|cfis| snapshot.air_handlers.get(cfis.air_handler()))
            .map(|conditions| conditions.runtime_fraction)
            .unwrap_or_default();
        let flows = self.mechanical_ventilation.flows(
            cfis_state,
            &snapshot.time,
            blower_runtime_fraction,
            snapshot.dryer_fraction,
        );

        let (temperature, humidity_ratio) = self.mechanical_ventilation.recovered_supply_air(
            snapshot.outdoor.temperature,
            snapshot.outdoor.humidity_ratio,
            snapshot.indoor.temperature,
            snapshot.indoor.humidity_ratio,
        );
        actuators.balanced_ventilation = flows.balanced;
        actuators.balanced_supply_air = AirState::new(temperature, humidity_ratio);
        actuators.fan_power = flows.fan_power;
        actuators.fan_heat_to_zone = flows.fan_heat_to_zone;
        actuators.outputs.cfis_outdoor_air_flow = flows.cfis_outdoor_air;
        actuators.mechanical_ventilation = flows;
    }

    fn evaluate_ducts(
        &self,
        snapshot: &TimestepSnapshot,
        actuators: &mut Actuators,
    ) -> Result<(), AirflowError> {
        for air_handler in self.ducts.air_handlers() {
            // an air handler missing from the snapshot is not running
            let Some(conditions) = snapshot.air_handlers.get(air_handler.name()) else {
                continue;
            };
            let loads = air_handler.loads(
                conditions,
                snapshot.outdoor,
                &snapshot.zones,
                snapshot.pressure,
            )?;
            for record in air_handler.locations() {
                let location = record.location();
                let location_loads = loads.get(&location).copied().unwrap_or_default();
                actuators.outputs.ducts.push(DuctOutputs {
                    air_handler: air_handler.name().to_string(),
                    location,
                    supply_fraction: location_loads.supply_leakage_fraction,
                    return_fraction: location_loads.return_leakage_fraction,
                    imbalance_fractions: record.imbalance_fractions(),
                });
            }
            actuators
                .duct_loads
                .insert(air_handler.name().to_string(), loads);
        }
        Ok(())
    }

    fn combined_balance(&self, actuators: &Actuators, infiltration_flow: f64) -> CombinedBalance {
        let flows = &actuators.mechanical_ventilation;
        let (duct_exhaust, duct_supply) = actuators
            .duct_loads
            .values()
            .flat_map(|loads| loads.values())
            .fold((0., 0.), |(exhaust, supply), loads| {
                (
                    exhaust + loads.exhaust_equivalent(),
                    supply + loads.supply_equivalent(),
                )
            });

        let exhaust = flows.range_exhaust
            + flows.bath_exhaust
            + flows.dryer_exhaust
            + flows.exhaust
            + flows.balanced
            + duct_exhaust;
        let supply = flows.supply + flows.balanced + flows.cfis_outdoor_air + duct_supply;

        CombinedBalance::new(exhaust, supply, infiltration_flow)
    }
}
