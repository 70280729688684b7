//! EnergyPlus EMS-style text for the airflow program: the sensor, actuator and global
//! variable bindings the host adapter wires up, followed by the program statements with
//! the precomputed coefficients filled in.

use crate::core::airflow::cfis::{CfisController, MINUTE_TOLERANCE};
use crate::core::airflow::duct_leakage::{
    leakage_flow_at_pressure, AirHandlerDucts, DuctLocation, DuctLocationRecord, LeakageUnits,
};
use crate::core::airflow::infiltration::ZoneInfiltration;
use crate::core::airflow::program::{AirflowProgram, ProgramStage, EVALUATION_ORDER};
use crate::core::psychrometrics::AIR;
use crate::core::units::{
    air_change_rate_to_flow_rate_m3_per_s, CUBIC_METRES_PER_SECOND_PER_CFM, MINUTES_PER_HOUR,
};
use crate::input::{VentilationFanType, ZoneKind};
use anyhow::anyhow;
use formatx::formatx;
use itertools::Itertools;
use serde::Serialize;
use std::fmt::Write;
use strum_macros::Display;

pub const PROGRAM_NAME: &str = "AirflowProgram";

const SENSOR_TEMPLATE: &str = "EnergyManagementSystem:Sensor,\n  {},\n  {},\n  {};\n";
const ACTUATOR_TEMPLATE: &str = "EnergyManagementSystem:Actuator,\n  {},\n  {},\n  {};\n";
const GLOBAL_VARIABLE_TEMPLATE: &str = "EnergyManagementSystem:GlobalVariable,\n  {};\n";

const DUCT_LOAD_NAMES: [&str; 6] = [
    "conditioned_sensible",
    "conditioned_latent",
    "return_plenum_sensible",
    "return_plenum_latent",
    "duct_zone_sensible",
    "duct_zone_latent",
];

#[derive(Clone, Copy, Debug, Display, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingKind {
    Sensor,
    Actuator,
    GlobalVariable,
}

/// A named value exchanged between the program and the host simulation
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Binding {
    pub kind: BindingKind,
    pub name: String,
    pub key: String,
    /// Output variable for sensors; component type and control type for actuators
    pub variable: String,
}

impl Binding {
    fn sensor(name: impl Into<String>, key: impl Into<String>, variable: &str) -> Self {
        Self {
            kind: BindingKind::Sensor,
            name: name.into(),
            key: key.into(),
            variable: variable.to_string(),
        }
    }

    fn actuator(name: impl Into<String>, key: impl Into<String>, variable: &str) -> Self {
        Self {
            kind: BindingKind::Actuator,
            name: name.into(),
            key: key.into(),
            variable: variable.to_string(),
        }
    }

    fn global_variable(name: impl Into<String>) -> Self {
        Self {
            kind: BindingKind::GlobalVariable,
            name: name.into(),
            key: String::new(),
            variable: String::new(),
        }
    }

    fn render(&self) -> anyhow::Result<String> {
        let rendered = match self.kind {
            BindingKind::Sensor => formatx!(SENSOR_TEMPLATE, &self.name, &self.key, &self.variable),
            BindingKind::Actuator => {
                formatx!(ACTUATOR_TEMPLATE, &self.name, &self.key, &self.variable)
            }
            BindingKind::GlobalVariable => formatx!(GLOBAL_VARIABLE_TEMPLATE, &self.name),
        };
        rendered.map_err(|err| anyhow!("Could not render {} '{}': {err:?}", self.kind, self.name))
    }
}

/// Identifier safe for use as an EMS variable name
pub fn ems_name(parts: &[&str]) -> String {
    parts
        .iter()
        .map(|part| {
            part.chars()
                .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
                .collect::<String>()
        })
        .join("_")
}

fn zone_temperature_variable(zone: ZoneKind) -> String {
    ems_name(&["T", &zone.to_string()])
}

fn zone_humidity_variable(zone: ZoneKind) -> String {
    ems_name(&["W", &zone.to_string()])
}

fn duct_prefix(air_handler: &AirHandlerDucts, record: &DuctLocationRecord) -> String {
    ems_name(&[air_handler.name(), &record.location().to_string()])
}

/// Sensors, actuators and global variables used by the program
pub fn bindings(program: &AirflowProgram) -> Vec<Binding> {
    let mut bindings = vec![
        Binding::sensor("Tin", ZoneKind::Conditioned.to_string(), "Zone Mean Air Temperature"),
        Binding::sensor("Win", ZoneKind::Conditioned.to_string(), "Zone Air Humidity Ratio"),
        Binding::sensor("Tout", "Environment", "Site Outdoor Air Drybulb Temperature"),
        Binding::sensor("Wout", "Environment", "Site Outdoor Air Humidity Ratio"),
        Binding::sensor("Pbar", "Environment", "Site Outdoor Air Barometric Pressure"),
        Binding::sensor("Vwind", "Environment", "Site Wind Speed"),
    ];
    let unconditioned_zones = program
        .infiltration()
        .zone_kinds()
        .filter(|zone| *zone != ZoneKind::Conditioned)
        .collect::<Vec<_>>();
    for zone in &unconditioned_zones {
        bindings.push(Binding::sensor(
            zone_temperature_variable(*zone),
            zone.to_string(),
            "Zone Mean Air Temperature",
        ));
        bindings.push(Binding::sensor(
            zone_humidity_variable(*zone),
            zone.to_string(),
            "Zone Air Humidity Ratio",
        ));
    }
    if program.natural_ventilation().is_some() {
        bindings.push(Binding::sensor(
            "NVAvail",
            "natural_ventilation_availability",
            "Schedule Value",
        ));
        bindings.push(Binding::sensor(
            "NVTrigger",
            "natural_ventilation_trigger",
            "Schedule Value",
        ));
    }
    let mechanical_ventilation = program.mechanical_ventilation();
    if mechanical_ventilation.range_fan().is_some() {
        bindings.push(Binding::sensor("RangeFanFrac", "range_fan", "Schedule Value"));
    }
    if mechanical_ventilation.bath_fans().is_some() {
        bindings.push(Binding::sensor("BathFanFrac", "bath_fans", "Schedule Value"));
    }
    if mechanical_ventilation.clothes_dryer().is_some() {
        bindings.push(Binding::sensor("DryerFrac", "clothes_dryer", "Schedule Value"));
    }
    if let Some(cfis) = mechanical_ventilation.cfis() {
        bindings.push(Binding::sensor(
            "CFIS_RTF",
            cfis.air_handler(),
            "Fan Runtime Fraction",
        ));
    }
    for air_handler in program.ducts().air_handlers() {
        let name = air_handler.name();
        bindings.push(Binding::sensor(
            ems_name(&["AH_MFR", name]),
            name,
            "Fan Air Mass Flow Rate",
        ));
        bindings.push(Binding::sensor(
            ems_name(&["AH_RTF", name]),
            name,
            "Fan Runtime Fraction",
        ));
        bindings.push(Binding::sensor(
            ems_name(&["AH_Tout", name]),
            name,
            "System Node Temperature",
        ));
        bindings.push(Binding::sensor(
            ems_name(&["AH_Wout", name]),
            name,
            "System Node Humidity Ratio",
        ));
    }

    bindings.push(Binding::actuator(
        "InfiltrationFlow",
        "conditioned_infiltration",
        "Zone Infiltration, Air Exchange Flow Rate",
    ));
    bindings.push(Binding::actuator(
        "ImbalancedMechFlow",
        "conditioned_imbalanced_mechanical_ventilation",
        "Zone Ventilation, Air Exchange Flow Rate",
    ));
    if program.natural_ventilation().is_some() {
        bindings.push(Binding::actuator(
            "NatVentFlow",
            "conditioned_natural_ventilation",
            "Zone Ventilation, Air Exchange Flow Rate",
        ));
    }
    if matches!(
        mechanical_ventilation.fan_type(),
        Some(VentilationFanType::Balanced | VentilationFanType::HeatRecovery)
    ) {
        bindings.push(Binding::actuator(
            "BalancedMechFlow",
            "conditioned_balanced_mechanical_ventilation",
            "Zone Ventilation, Air Exchange Flow Rate",
        ));
    }
    bindings.push(Binding::actuator(
        "FanPower",
        "mechanical_ventilation_fans",
        "ElectricEquipment, Electricity Rate",
    ));
    for zone in &unconditioned_zones {
        let key = ems_name(&[&zone.to_string(), "infiltration"]);
        bindings.push(Binding::actuator(
            ems_name(&["Qinf", &zone.to_string()]),
            key,
            "Zone Infiltration, Air Exchange Flow Rate",
        ));
    }
    for air_handler in program.ducts().air_handlers() {
        for record in air_handler.locations() {
            let prefix = duct_prefix(air_handler, record);
            for load in DUCT_LOAD_NAMES {
                if air_handler.returns_to_conditioned() && load.starts_with("return_plenum") {
                    continue;
                }
                let name = ems_name(&[&prefix, load]);
                bindings.push(Binding::actuator(
                    name.clone(),
                    name,
                    "OtherEquipment, Power Level",
                ));
            }
        }
    }

    if mechanical_ventilation.cfis().is_some() {
        for name in [
            "CFIS_hour",
            "CFIS_t_sum_open",
            "CFIS_on_for_hour",
            "CFIS_satisfied",
            "CFIS_f_damper_open",
        ] {
            bindings.push(Binding::global_variable(name));
        }
    }
    for air_handler in program.ducts().air_handlers() {
        for record in air_handler.locations() {
            let prefix = duct_prefix(air_handler, record);
            for suffix in ["f_sup", "f_ret", "Q_imbal"] {
                bindings.push(Binding::global_variable(ems_name(&[&prefix, suffix])));
            }
        }
    }

    bindings
}

/// Statements computing a zone infiltration flow into `target`
fn infiltration_statements(
    target: &str,
    zone: &str,
    infiltration: &ZoneInfiltration,
    volume: f64,
    delta_t: &str,
) -> Vec<String> {
    let var = |name: &str| ems_name(&[name, zone]);
    match infiltration {
        ZoneInfiltration::Aim2 { coefficients, .. } => vec![
            format!("Set {} = {}", var("c"), coefficients.flow_coefficient_si()),
            format!("Set {} = {}", var("Cs"), coefficients.stack_coefficient_si()),
            format!("Set {} = {}", var("Cw"), coefficients.wind_coefficient_si()),
            format!("Set {} = {}", var("n"), coefficients.pressure_exponent()),
            format!("Set {} = {}", var("s"), coefficients.wind_shelter_multiplier()),
            format!(
                "Set {target} = ((({c}*{cs}*({delta_t}^{n}))^2)+(({c}*{cw}*(({s}*Vwind)^(2*{n})))^2))^0.5",
                c = var("c"),
                cs = var("Cs"),
                cw = var("Cw"),
                n = var("n"),
                s = var("s"),
            ),
        ],
        ZoneInfiltration::EffectiveLeakageArea { leakage_area, .. } => vec![
            format!("Set {} = {}", var("ELA"), leakage_area.area()),
            format!("Set {} = {}", var("Cs"), leakage_area.stack_coefficient()),
            format!("Set {} = {}", var("Cw"), leakage_area.wind_coefficient()),
            format!(
                "Set {target} = {ela}*(({cs}*{delta_t})+({cw}*(Vwind^2)))^0.5",
                ela = var("ELA"),
                cs = var("Cs"),
                cw = var("Cw"),
            ),
        ],
        ZoneInfiltration::ConstantAch { ach } => vec![format!(
            "Set {target} = {}",
            air_change_rate_to_flow_rate_m3_per_s(*ach, volume)
        )],
        ZoneInfiltration::None => vec![format!("Set {target} = 0")],
    }
}

fn stage_statements(program: &AirflowProgram, stage: ProgramStage) -> Vec<String> {
    let mut lines = vec![format!("! {stage}")];
    match stage {
        ProgramStage::Infiltration => {
            let infiltration = program.infiltration();
            lines.push("Set dT = @Abs (Tin-Tout)".to_string());
            lines.extend(infiltration_statements(
                "Qn",
                &ZoneKind::Conditioned.to_string(),
                infiltration.conditioned(),
                infiltration.zone_volume(ZoneKind::Conditioned).unwrap_or_default(),
                "dT",
            ));
            for zone in infiltration
                .zone_kinds()
                .filter(|zone| *zone != ZoneKind::Conditioned)
            {
                let Some(zone_infiltration) = infiltration.zone(zone) else {
                    continue;
                };
                let zone_name = zone.to_string();
                let delta_t = ems_name(&["dT", &zone_name]);
                lines.push(format!(
                    "Set {delta_t} = @Abs ({}-Tout)",
                    zone_temperature_variable(zone)
                ));
                lines.extend(infiltration_statements(
                    &ems_name(&["Qinf", &zone_name]),
                    &zone_name,
                    zone_infiltration,
                    infiltration.zone_volume(zone).unwrap_or_default(),
                    &delta_t,
                ));
            }
        }
        ProgramStage::NaturalVentilation => match program.natural_ventilation() {
            Some(controller) => {
                let opening = controller.opening();
                lines.extend([
                    format!("Set NVArea = {}", opening.area()),
                    format!("Set NVCs = {}", opening.stack_coefficient()),
                    format!("Set NVCw = {}", opening.wind_coefficient()),
                    format!("Set NVMax = {}", controller.max_flow()),
                    "Set RHout = @RhFnTdbWPb Tout Wout Pbar".to_string(),
                    format!(
                        "If (Wout < {}) && (RHout < {}) && (Tin > NVTrigger) && (Tin > Tout)",
                        controller.max_outdoor_humidity_ratio(),
                        controller.max_outdoor_relative_humidity()
                    ),
                    "Set Qnv = NVAvail*NVArea*((NVCs*(Tin-Tout))+(NVCw*(Vwind^2)))^0.5"
                        .to_string(),
                    "Set NVRamp = @Min 1 ((Tin-NVTrigger)/(Tin-Tout))".to_string(),
                    "Set NatVentFlow = @Min (Qnv*NVRamp) NVMax".to_string(),
                    "Else".to_string(),
                    "Set NatVentFlow = 0".to_string(),
                    "EndIf".to_string(),
                ]);
            }
            None => lines.push("Set NatVentFlow = 0".to_string()),
        },
        ProgramStage::MechanicalVentilation => {
            let model = program.mechanical_ventilation();
            let scheduled = |sensor: &str, flow: Option<f64>| match flow {
                Some(flow) => format!("{sensor}*{flow}"),
                None => "0".to_string(),
            };
            lines.push(format!(
                "Set Qrange = {}",
                scheduled("RangeFanFrac", model.range_fan().map(|fan| fan.flow_rate()))
            ));
            lines.push(format!(
                "Set Qbath = {}",
                scheduled("BathFanFrac", model.bath_fans().map(|fan| fan.flow_rate()))
            ));
            lines.push(format!(
                "Set Qdryer = {}",
                scheduled("DryerFrac", model.clothes_dryer().map(|dryer| dryer.flow_rate()))
            ));
            let whole_house = model.whole_house_flow_rate();
            let (exhaust, supply, balanced) = match model.fan_type() {
                Some(VentilationFanType::Exhaust) => (whole_house, 0., 0.),
                Some(VentilationFanType::Supply) => (0., whole_house, 0.),
                Some(VentilationFanType::Balanced | VentilationFanType::HeatRecovery) => {
                    (0., 0., whole_house)
                }
                Some(VentilationFanType::CentralFanIntegratedSupply) | None => (0., 0., 0.),
            };
            lines.push(format!("Set QWHV_exh = {exhaust}"));
            lines.push(format!("Set QWHV_sup = {supply}"));
            lines.push(format!("Set QWHV_bal = {balanced}"));
            match model.cfis() {
                Some(cfis) => lines.extend(cfis_statements(cfis)),
                None => lines.push("Set CFIS_Qoa = 0".to_string()),
            }
        }
        ProgramStage::Ducts => {
            let mut exhaust_terms = vec![];
            let mut supply_terms = vec![];
            for air_handler in program.ducts().air_handlers() {
                lines.extend(duct_statements(air_handler, &mut exhaust_terms, &mut supply_terms));
            }
            let sum = |terms: Vec<String>| {
                if terms.is_empty() {
                    "0".to_string()
                } else {
                    terms.join("+")
                }
            };
            lines.push(format!("Set QductsOut = {}", sum(exhaust_terms)));
            lines.push(format!("Set QductsIn = {}", sum(supply_terms)));
        }
        ProgramStage::CombinedBalance => lines.extend([
            "Set Qexhaust = Qrange+Qbath+Qdryer+QWHV_exh+QWHV_bal+QductsOut".to_string(),
            "Set Qsupply = QWHV_sup+QWHV_bal+CFIS_Qoa+QductsIn".to_string(),
            "Set Qimb = @Abs (Qsupply-Qexhaust)".to_string(),
            "Set Qtot = ((Qimb^2)+(Qn^2))^0.5".to_string(),
            "Set InfiltrationFlow = @Max (Qtot-Qimb) 0".to_string(),
            "Set ImbalancedMechFlow = Qimb".to_string(),
        ]),
    }
    lines
}

/// Damper schedule for central fan integrated supply, stepping the same accumulator as
/// `CfisController::tick` through the CFIS global variables
fn cfis_statements(cfis: &CfisController) -> Vec<String> {
    vec![
        format!("Set CFIS_target = {}", cfis.target_minutes_per_hour()),
        format!("Set CFIS_Q = {}", cfis.flow_rate()),
        "Set CFIS_dt = ZoneTimeStep*60".to_string(),
        "If Hour <> CFIS_hour".to_string(),
        "Set CFIS_hour = Hour".to_string(),
        "Set CFIS_t_sum_open = 0".to_string(),
        "Set CFIS_on_for_hour = 0".to_string(),
        "Set CFIS_satisfied = 0".to_string(),
        "EndIf".to_string(),
        "Set CFIS_remaining = CFIS_target-CFIS_t_sum_open".to_string(),
        "If CFIS_remaining <= 0".to_string(),
        "Set CFIS_satisfied = 1".to_string(),
        "Set CFIS_f_damper_open = 0".to_string(),
        "Else".to_string(),
        format!("Set CFIS_forced_start = {MINUTES_PER_HOUR}-CFIS_remaining"),
        "If CFIS_on_for_hour == 1".to_string(),
        "Set CFIS_f_damper_open = 1".to_string(),
        format!("ElseIf (Minute+{MINUTE_TOLERANCE}) >= CFIS_forced_start"),
        "Set CFIS_f_damper_open = (Minute-CFIS_forced_start)/CFIS_dt".to_string(),
        "Set CFIS_on_for_hour = 1".to_string(),
        "Else".to_string(),
        "Set CFIS_f_damper_open = CFIS_RTF".to_string(),
        "EndIf".to_string(),
        "Set CFIS_f_damper_open = @Max 0 (@Min CFIS_f_damper_open 1)".to_string(),
        "If (CFIS_f_damper_open*CFIS_dt) >= CFIS_remaining".to_string(),
        "Set CFIS_f_damper_open = CFIS_remaining/CFIS_dt".to_string(),
        "Set CFIS_t_sum_open = CFIS_target".to_string(),
        "Set CFIS_satisfied = 1".to_string(),
        "Else".to_string(),
        "Set CFIS_t_sum_open = CFIS_t_sum_open+(CFIS_f_damper_open*CFIS_dt)".to_string(),
        "EndIf".to_string(),
        "EndIf".to_string(),
        "Set CFIS_Qoa = CFIS_f_damper_open*CFIS_Q".to_string(),
    ]
}

fn duct_statements(
    air_handler: &AirHandlerDucts,
    exhaust_terms: &mut Vec<String>,
    supply_terms: &mut Vec<String>,
) -> Vec<String> {
    let name = air_handler.name();
    let mass_flow = ems_name(&["AH_MFR", name]);
    let volume_flow = ems_name(&["AH_VFR", name]);
    let cp = AIR.specific_heat_capacity();
    let mut lines = vec![format!(
        "Set {volume_flow} = {mass_flow}/(@RhoAirFnPbTdbW Pbar Tin Win)"
    )];

    for record in air_handler.locations() {
        let prefix = duct_prefix(air_handler, record);
        let var = |suffix: &str| ems_name(&[&prefix, suffix]);
        let leakage_fraction = |leakage: f64| match record.units() {
            Some(LeakageUnits::FlowAt25Pa) => format!(
                "@Min 1 ({}/({volume_flow}/{CUBIC_METRES_PER_SECOND_PER_CFM}))",
                leakage_flow_at_pressure(leakage, air_handler.operating_pressure())
            ),
            Some(LeakageUnits::Fraction) => leakage.to_string(),
            None => "0".to_string(),
        };
        lines.push(format!("Set {} = {}", var("UA_sup"), record.supply_ua()));
        lines.push(format!("Set {} = {}", var("UA_ret"), record.return_ua()));
        lines.push(format!("If {mass_flow} > 0"));
        lines.push(format!("Set {} = {}", var("f_sup"), leakage_fraction(record.supply_leakage())));
        lines.push(format!("Set {} = {}", var("f_ret"), leakage_fraction(record.return_leakage())));
        lines.push(format!(
            "Set {} = @Abs ({}-{})*{volume_flow}",
            var("Q_imbal"),
            var("f_sup"),
            var("f_ret")
        ));

        let imbalance = record.imbalance_fractions();
        if imbalance.outside_to_conditioned > 0. {
            exhaust_terms.push(format!("({}*{})", imbalance.outside_to_conditioned, var("Q_imbal")));
        }
        if imbalance.conditioned_to_outside > 0. {
            supply_terms.push(format!("({}*{})", imbalance.conditioned_to_outside, var("Q_imbal")));
        }

        let (duct_zone_temp, duct_zone_humidity) = match record.location() {
            DuctLocation::Outside => ("Tout".to_string(), "Wout".to_string()),
            DuctLocation::Zone(zone) => (
                zone_temperature_variable(zone),
                zone_humidity_variable(zone),
            ),
        };
        let exponent = |ua: String| {
            format!(
                "@Exp (0-({ua}*{}/({mass_flow}*{cp})))",
                ems_name(&["AH_RTF", name]),
            )
        };
        let load = |load: &str| ems_name(&[&prefix, load]);
        let outlet_humidity = ems_name(&["AH_Wout", name]);

        lines.extend([
            format!(
                "Set {} = {duct_zone_temp}+(({}-{duct_zone_temp})*{})",
                var("T_sup_out"),
                ems_name(&["AH_Tout", name]),
                exponent(var("UA_sup"))
            ),
            format!(
                "Set {} = {duct_zone_temp}+((Tin-{duct_zone_temp})*{})",
                var("T_ret_out"),
                exponent(var("UA_ret"))
            ),
            format!(
                "Set {} = {mass_flow}*{cp}*({}-{})",
                var("Q_sup_cond"),
                var("T_sup_out"),
                ems_name(&["AH_Tout", name])
            ),
            format!(
                "Set {} = {mass_flow}*{cp}*({}-Tin)",
                var("Q_ret_cond"),
                var("T_ret_out")
            ),
            format!("Set {} = @HFnTdbW Tin Win", var("h_ret")),
            format!("Set {} = @HFnTdbW {} Win", var("h_sup"), var("T_sup_out")),
            format!("Set {} = @HFnTdbW {duct_zone_temp} Win", var("h_dz")),
            format!("Set {} = @HfgAirFnWTdb Win Tin", var("h_fg")),
            format!(
                "Set {} = {}+({}*{mass_flow}*({}-{}))",
                load("conditioned_sensible"),
                var("Q_sup_cond"),
                var("f_sup"),
                var("h_ret"),
                var("h_sup")
            ),
            format!(
                "Set {} = {}*{mass_flow}*{}*(Win-{outlet_humidity})",
                load("conditioned_latent"),
                var("f_sup"),
                var("h_fg")
            ),
            format!(
                "Set {} = {}+({}*{mass_flow}*({}-{}))",
                var("Q_ret_sens"),
                var("Q_ret_cond"),
                var("f_ret"),
                var("h_dz"),
                var("h_ret")
            ),
            format!(
                "Set {} = {}*{mass_flow}*{}*({duct_zone_humidity}-Win)",
                var("Q_ret_lat"),
                var("f_ret"),
                var("h_fg")
            ),
            format!(
                "Set {} = ({}*{mass_flow}*({}-{}))-{}-{}",
                load("duct_zone_sensible"),
                var("f_sup"),
                var("h_sup"),
                var("h_dz"),
                var("Q_sup_cond"),
                var("Q_ret_cond")
            ),
            format!(
                "Set {} = {}*{mass_flow}*{}*({outlet_humidity}-{duct_zone_humidity})",
                load("duct_zone_latent"),
                var("f_sup"),
                var("h_fg")
            ),
        ]);
        if air_handler.returns_to_conditioned() {
            lines.extend([
                format!(
                    "Set {0} = {0}+{1}",
                    load("conditioned_sensible"),
                    var("Q_ret_sens")
                ),
                format!(
                    "Set {0} = {0}+{1}",
                    load("conditioned_latent"),
                    var("Q_ret_lat")
                ),
            ]);
        } else {
            lines.extend([
                format!("Set {} = {}", load("return_plenum_sensible"), var("Q_ret_sens")),
                format!("Set {} = {}", load("return_plenum_latent"), var("Q_ret_lat")),
            ]);
        }
        lines.push("Else".to_string());
        for suffix in ["f_sup", "f_ret", "Q_imbal"] {
            lines.push(format!("Set {} = 0", var(suffix)));
        }
        for load_name in DUCT_LOAD_NAMES {
            if air_handler.returns_to_conditioned() && load_name.starts_with("return_plenum") {
                continue;
            }
            lines.push(format!("Set {} = 0", load(load_name)));
        }
        lines.push("EndIf".to_string());
    }
    lines
}

/// The program statements in evaluation order
pub fn statements(program: &AirflowProgram) -> Vec<String> {
    EVALUATION_ORDER
        .iter()
        .flat_map(|stage| stage_statements(program, *stage))
        .collect()
}

/// Render the bindings and the program as EMS-style text
pub fn render(program: &AirflowProgram) -> anyhow::Result<String> {
    let mut text = String::new();
    writeln!(
        text,
        "! Evaluation order: {}",
        EVALUATION_ORDER.iter().join(", ")
    )?;
    writeln!(text)?;
    for binding in bindings(program) {
        text.push_str(&binding.render()?);
        writeln!(text)?;
    }

    writeln!(text, "EnergyManagementSystem:Program,")?;
    write!(text, "  {PROGRAM_NAME}")?;
    for statement in statements(program) {
        write!(text, ",\n  {statement}")?;
    }
    writeln!(text, ";")?;

    Ok(text)
}
