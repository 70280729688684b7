use crate::core::airflow::cfis::{CfisController, CfisOutcome, CfisState};
use crate::core::psychrometrics::{
    dry_air_density, enthalpy, humidity_ratio_from_enthalpy, AIR, STANDARD_PRESSURE_PA,
};
use crate::core::units::{cfm_to_cubic_metres_per_second, HOURS_PER_DAY};
use crate::errors::{AirflowError, EffectivenessKind};
use crate::input::{
    AirHandlerInput, ClothesDryerInput, MechanicalVentilationInput, RecoveryEfficiencyInput,
    SpotFanInput, VentilationFanType,
};
use crate::simulation_time::SimulationTimeIteration;
use indexmap::IndexMap;
use serde::Serialize;

/// Rated heating test condition: supply inlet and exhaust inlet (temperature in deg C, humidity ratio)
const HEATING_TEST_SUPPLY_INLET: (f64, f64) = (0., 0.0028);
const HEATING_TEST_EXHAUST_INLET: (f64, f64) = (22., 0.0065);
/// Rated cooling test condition: supply inlet and exhaust inlet (temperature in deg C, humidity ratio)
const COOLING_TEST_SUPPLY_INLET: (f64, f64) = (35., 0.0178);
const COOLING_TEST_EXHAUST_INLET: (f64, f64) = (24., 0.0092);

const DEFAULT_BATH_FAN_FLOW_CFM: f64 = 50.;
const DEFAULT_RANGE_FAN_FLOW_CFM: f64 = 100.;

/// Fraction of fan heat delivered to the conditioned zone, and the number of fans
fn fan_type_properties(fan_type: VentilationFanType) -> (f64, u32) {
    match fan_type {
        VentilationFanType::Exhaust => (0., 1),
        VentilationFanType::Supply => (1., 1),
        VentilationFanType::Balanced | VentilationFanType::HeatRecovery => (0.5, 2),
        VentilationFanType::CentralFanIntegratedSupply => (1., 1),
    }
}

/// Heat and moisture recovery effectiveness of a balanced ventilation system.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct RecoveryEffectiveness {
    /// Sensible effectiveness including the effect of fan heat
    pub apparent_sensible: f64,
    /// Sensible effectiveness of the heat exchanger core alone
    pub sensible: f64,
    pub latent: f64,
}

impl RecoveryEffectiveness {
    /// Derive effectiveness from rated recovery efficiencies.
    ///
    /// Arguments:
    /// * `fan_type` - used in error reports
    /// * `efficiency` - rated, adjusted or combined recovery efficiency
    /// * `flow_rate` - supply flow, in cfm
    /// * `fan_power` - total fan power, in W
    /// * `fan_elements` - number of fans sharing `fan_power`
    pub fn from_efficiency(
        fan_type: VentilationFanType,
        efficiency: &RecoveryEfficiencyInput,
        flow_rate: f64,
        fan_power: f64,
        fan_elements: u32,
    ) -> Result<Self, AirflowError> {
        let effectiveness = match *efficiency {
            RecoveryEfficiencyInput::Combined { total } => Self {
                apparent_sensible: total,
                sensible: total,
                latent: total,
            },
            RecoveryEfficiencyInput::Adjusted { sensible, total } => Self {
                apparent_sensible: sensible,
                sensible,
                latent: total.map_or(0., |total| total - sensible),
            },
            RecoveryEfficiencyInput::Unadjusted { sensible, total } => {
                if sensible <= 0. || flow_rate <= 0. {
                    Default::default()
                } else {
                    Self::from_rated_test_conditions(
                        sensible,
                        total,
                        flow_rate,
                        fan_power / fan_elements as f64,
                    )?
                }
            }
        };

        for (kind, value) in [
            (EffectivenessKind::ApparentSensible, effectiveness.apparent_sensible),
            (EffectivenessKind::Sensible, effectiveness.sensible),
            (EffectivenessKind::Latent, effectiveness.latent),
        ] {
            if !(0. ..=1.).contains(&value) {
                return Err(AirflowError::RecoveryEffectiveness {
                    fan_type,
                    kind,
                    value,
                });
            }
        }

        Ok(effectiveness)
    }

    /// Solve the energy balances of the rated heating and cooling tests, removing the
    /// contribution of fan heat from the rated efficiencies.
    fn from_rated_test_conditions(
        sensible_recovery_efficiency: f64,
        total_recovery_efficiency: Option<f64>,
        flow_rate: f64,
        fan_power: f64,
    ) -> Result<Self, AirflowError> {
        let cp = AIR.specific_heat_capacity();
        let volume_flow = cfm_to_cubic_metres_per_second(flow_rate);

        // heating test
        let (t_sup_in, w_sup_in) = HEATING_TEST_SUPPLY_INLET;
        let (t_exh_in, _) = HEATING_TEST_EXHAUST_INLET;
        let m_fan = volume_flow * dry_air_density(t_sup_in, w_sup_in, STANDARD_PRESSURE_PA)?;
        let t_sup_out = t_sup_in
            + (sensible_recovery_efficiency * (m_fan * cp * (t_exh_in - t_sup_in) + fan_power)
                + fan_power)
                / (m_fan * cp);
        let apparent_sensible = (t_sup_out - t_sup_in) / (t_exh_in - t_sup_in);
        let t_sup_out_gross = t_sup_out - fan_power / (m_fan * cp);
        let sensible = (t_sup_out_gross - t_sup_in) / (t_exh_in - t_sup_in);

        let latent = match total_recovery_efficiency {
            None => 0.,
            Some(total_recovery_efficiency) => {
                // cooling test
                let (t_sup_in, w_sup_in) = COOLING_TEST_SUPPLY_INLET;
                let (t_exh_in, w_exh_in) = COOLING_TEST_EXHAUST_INLET;
                let m_fan =
                    volume_flow * dry_air_density(t_sup_in, w_sup_in, STANDARD_PRESSURE_PA)?;
                let t_sup_out_gross = t_sup_in - sensible * (t_sup_in - t_exh_in);
                let t_sup_out = t_sup_out_gross + fan_power / (m_fan * cp);

                let h_sup_in = enthalpy(t_sup_in, w_sup_in);
                let h_exh_in = enthalpy(t_exh_in, w_exh_in);
                let h_sup_out = h_sup_in
                    - (total_recovery_efficiency * (m_fan * (h_sup_in - h_exh_in) + fan_power)
                        + fan_power)
                        / m_fan;
                let w_sup_out = humidity_ratio_from_enthalpy(t_sup_out, h_sup_out);

                (w_sup_out - w_sup_in) / (w_exh_in - w_sup_in)
            }
        };

        Ok(Self {
            apparent_sensible,
            sensible,
            latent,
        })
    }
}

/// Bath or range extract fans, running for a fixed period each day.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct SpotFan {
    flow_rate: f64, // m^3/s, all fans together
    hours_in_operation: f64,
    start_hour: u32,
    fan_power: f64, // W, all fans together
}

impl SpotFan {
    /// Arguments:
    /// * `input` - fan configuration
    /// * `default_quantity` - number of fans when the configuration does not give one
    pub fn new(input: &SpotFanInput, default_quantity: u32) -> Self {
        let quantity = input.quantity.unwrap_or(default_quantity) as f64;
        Self {
            flow_rate: cfm_to_cubic_metres_per_second(input.flow_rate * quantity),
            hours_in_operation: input.hours_in_operation,
            start_hour: input.start_hour,
            fan_power: input.fan_power * quantity,
        }
    }

    /// Extract flow with all fans running, in m^3/s
    pub fn flow_rate(&self) -> f64 {
        self.flow_rate
    }

    pub fn start_hour(&self) -> u32 {
        self.start_hour
    }

    pub fn hours_in_operation(&self) -> f64 {
        self.hours_in_operation
    }

    /// Fraction of the timestep during which the fans run
    pub fn fraction_on(&self, time: &SimulationTimeIteration) -> f64 {
        if self.hours_in_operation <= 0. || time.timestep <= 0. {
            return 0.;
        }
        let hours_per_day = HOURS_PER_DAY as f64;
        let step_start = time.time.rem_euclid(hours_per_day);
        let step_end = step_start + time.timestep;
        let on = self.start_hour as f64;
        let off = on + self.hours_in_operation.min(hours_per_day);

        // the operating window may wrap round midnight, and so may the timestep
        let overlap: f64 = [-hours_per_day, 0., hours_per_day]
            .iter()
            .map(|shift| (step_end.min(off + shift) - step_start.max(on + shift)).max(0.))
            .sum();

        (overlap / time.timestep).min(1.)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ClothesDryerExhaust {
    flow_rate: f64, // m^3/s
}

impl ClothesDryerExhaust {
    /// A dryer only exhausts air to outside when it is vented
    pub fn new(input: &ClothesDryerInput) -> Option<Self> {
        input.vented.then(|| Self {
            flow_rate: cfm_to_cubic_metres_per_second(input.exhaust_flow_rate),
        })
    }

    pub fn flow_rate(&self) -> f64 {
        self.flow_rate
    }
}

/// Mechanical ventilation flows and fan energy for one timestep. Flows in m^3/s.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct MechanicalVentilationFlows {
    pub range_exhaust: f64,
    pub bath_exhaust: f64,
    pub dryer_exhaust: f64,
    pub exhaust: f64,
    pub supply: f64,
    pub balanced: f64,
    pub cfis_outdoor_air: f64,
    pub cfis_damper_fraction: f64,
    /// Electrical power of ventilation fans, in W
    pub fan_power: f64,
    /// Share of fan power ending up as heat in the conditioned zone, in W
    pub fan_heat_to_zone: f64,
}

#[derive(Clone, Debug)]
pub struct MechanicalVentilationModel {
    whole_house: Option<WholeHouseFan>,
    cfis: Option<CfisController>,
    bath_fans: Option<SpotFan>,
    range_fan: Option<SpotFan>,
    clothes_dryer: Option<ClothesDryerExhaust>,
}

#[derive(Clone, Debug)]
struct WholeHouseFan {
    fan_type: VentilationFanType,
    flow_rate: f64, // m^3/s
    fan_power: f64, // W
    fraction_fan_heat_to_zone: f64,
    effectiveness: RecoveryEffectiveness,
}

impl MechanicalVentilationModel {
    /// Arguments:
    /// * `input` - whole-house mechanical ventilation, if any
    /// * `bath_fan`, `range_fan` - spot ventilation, if any
    /// * `number_of_bathrooms` - default number of bath fans
    /// * `clothes_dryer` - clothes dryer, if present
    /// * `air_handlers` - air handlers by name, for central fan integrated supply
    pub fn new(
        input: Option<&MechanicalVentilationInput>,
        bath_fan: Option<&SpotFanInput>,
        range_fan: Option<&SpotFanInput>,
        number_of_bathrooms: u32,
        clothes_dryer: Option<&ClothesDryerInput>,
        air_handlers: &IndexMap<String, AirHandlerInput>,
    ) -> Result<Self, AirflowError> {
        let (whole_house, cfis) = match input {
            None => (None, None),
            Some(input) => {
                let (fraction_fan_heat_to_zone, fan_elements) = fan_type_properties(input.fan_type);
                let effectiveness = match (input.fan_type, &input.recovery_efficiency) {
                    (
                        VentilationFanType::Balanced | VentilationFanType::HeatRecovery,
                        Some(efficiency),
                    ) => RecoveryEffectiveness::from_efficiency(
                        input.fan_type,
                        efficiency,
                        input.flow_rate,
                        input.fan_power,
                        fan_elements,
                    )?,
                    _ => Default::default(),
                };
                let cfis = match (input.fan_type, &input.cfis) {
                    (VentilationFanType::CentralFanIntegratedSupply, Some(cfis)) => {
                        Some(CfisController::new(
                            cfis,
                            input.flow_rate,
                            air_handlers.get(&cfis.air_handler),
                        )?)
                    }
                    (VentilationFanType::CentralFanIntegratedSupply, None) => {
                        return Err(AirflowError::CfisWithoutDuctedEquipment(
                            "unspecified".to_string(),
                        ))
                    }
                    _ => None,
                };
                let whole_house = (input.fan_type
                    != VentilationFanType::CentralFanIntegratedSupply)
                    .then(|| WholeHouseFan {
                        fan_type: input.fan_type,
                        flow_rate: cfm_to_cubic_metres_per_second(input.flow_rate),
                        fan_power: input.fan_power,
                        fraction_fan_heat_to_zone,
                        effectiveness,
                    });
                (whole_house, cfis)
            }
        };

        Ok(Self {
            whole_house,
            cfis,
            bath_fans: bath_fan.map(|input| SpotFan::new(input, number_of_bathrooms)),
            range_fan: range_fan.map(|input| SpotFan::new(input, 1)),
            clothes_dryer: clothes_dryer.and_then(ClothesDryerExhaust::new),
        })
    }

    pub fn range_fan(&self) -> Option<&SpotFan> {
        self.range_fan.as_ref()
    }

    pub fn bath_fans(&self) -> Option<&SpotFan> {
        self.bath_fans.as_ref()
    }

    pub fn clothes_dryer(&self) -> Option<&ClothesDryerExhaust> {
        self.clothes_dryer.as_ref()
    }

    /// Flow of the whole-house fan, in m^3/s. CFIS flow is set by its damper instead.
    pub fn whole_house_flow_rate(&self) -> f64 {
        self.whole_house
            .as_ref()
            .map(|fan| fan.flow_rate)
            .unwrap_or_default()
    }

    pub fn cfis(&self) -> Option<&CfisController> {
        self.cfis.as_ref()
    }

    pub fn fan_type(&self) -> Option<VentilationFanType> {
        match (&self.whole_house, &self.cfis) {
            (Some(fan), _) => Some(fan.fan_type),
            (None, Some(_)) => Some(VentilationFanType::CentralFanIntegratedSupply),
            (None, None) => None,
        }
    }

    pub fn effectiveness(&self) -> RecoveryEffectiveness {
        self.whole_house
            .as_ref()
            .map(|fan| fan.effectiveness)
            .unwrap_or_default()
    }

    pub fn fraction_fan_heat_to_zone(&self) -> f64 {
        self.fan_type()
            .map(|fan_type| fan_type_properties(fan_type).0)
            .unwrap_or_default()
    }

    pub fn fan_elements(&self) -> u32 {
        self.fan_type()
            .map(|fan_type| fan_type_properties(fan_type).1)
            .unwrap_or_default()
    }

    /// Conditions of balanced supply air leaving the heat exchanger, as (deg C, kg/kg)
    pub fn recovered_supply_air(
        &self,
        outdoor_temp: f64,
        outdoor_humidity_ratio: f64,
        indoor_temp: f64,
        indoor_humidity_ratio: f64,
    ) -> (f64, f64) {
        let effectiveness = self.effectiveness();
        (
            outdoor_temp + effectiveness.sensible * (indoor_temp - outdoor_temp),
            outdoor_humidity_ratio
                + effectiveness.latent * (indoor_humidity_ratio - outdoor_humidity_ratio),
        )
    }

    /// Ventilation flows for the timestep.
    ///
    /// Arguments:
    /// * `cfis_state` - CFIS damper accumulator carried between timesteps
    /// * `time` - the current timestep
    /// * `blower_runtime_fraction` - heating/cooling runtime fraction of the CFIS air handler blower
    /// * `dryer_fraction` - fraction of the timestep the clothes dryer runs
    pub fn flows(
        &self,
        cfis_state: &mut CfisState,
        time: &SimulationTimeIteration,
        blower_runtime_fraction: f64,
        dryer_fraction: f64,
    ) -> MechanicalVentilationFlows {
        let mut flows = MechanicalVentilationFlows::default();

        if let Some(fan) = &self.range_fan {
            let fraction = fan.fraction_on(time);
            flows.range_exhaust = fan.flow_rate * fraction;
            flows.fan_power += fan.fan_power * fraction;
        }
        if let Some(fan) = &self.bath_fans {
            let fraction = fan.fraction_on(time);
            flows.bath_exhaust = fan.flow_rate * fraction;
            flows.fan_power += fan.fan_power * fraction;
        }
        if let Some(dryer) = &self.clothes_dryer {
            flows.dryer_exhaust = dryer.flow_rate * dryer_fraction.clamp(0., 1.);
        }

        if let Some(fan) = &self.whole_house {
            match fan.fan_type {
                VentilationFanType::Exhaust => flows.exhaust = fan.flow_rate,
                VentilationFanType::Supply => flows.supply = fan.flow_rate,
                VentilationFanType::Balanced | VentilationFanType::HeatRecovery => {
                    flows.balanced = fan.flow_rate
                }
                VentilationFanType::CentralFanIntegratedSupply => {}
            }
            flows.fan_power += fan.fan_power;
            flows.fan_heat_to_zone += fan.fan_power * fan.fraction_fan_heat_to_zone;
        }

        if let Some(cfis) = &self.cfis {
            let CfisOutcome {
                damper_fraction,
                outdoor_air_flow,
                ventilation_only_blower_power,
            } = cfis.tick(cfis_state, time, blower_runtime_fraction);
            let (cfis_heat_fraction, _) =
                fan_type_properties(VentilationFanType::CentralFanIntegratedSupply);
            flows.cfis_damper_fraction = damper_fraction;
            flows.cfis_outdoor_air = outdoor_air_flow;
            flows.fan_power += ventilation_only_blower_power;
            flows.fan_heat_to_zone += ventilation_only_blower_power * cfis_heat_fraction;
        }

        flows
    }
}

/// Default bath fan configuration: one 50 cfm fan per bathroom for an hour from 7am
pub fn default_bath_fan() -> SpotFanInput {
    SpotFanInput {
        flow_rate: DEFAULT_BATH_FAN_FLOW_CFM,
        quantity: None,
        hours_in_operation: 1.,
        start_hour: 7,
        fan_power: 0.3 * DEFAULT_BATH_FAN_FLOW_CFM,
    }
}

/// Default range fan configuration: one 100 cfm fan for an hour from 6pm
pub fn default_range_fan() -> SpotFanInput {
    SpotFanInput {
        flow_rate: DEFAULT_RANGE_FAN_FLOW_CFM,
        quantity: Some(1),
        hours_in_operation: 1.,
        start_hour: 18,
        fan_power: 0.3 * DEFAULT_RANGE_FAN_FLOW_CFM,
    }
}
