use crate::core::airflow::cfis::CfisState;
use crate::core::airflow::duct_leakage::{AirHandlerDuctSummary, DuctLeakageNetwork};
use crate::core::airflow::infiltration::{InfiltrationModel, ZoneInfiltrationSummary};
use crate::core::airflow::mechanical_ventilation::{
    default_bath_fan, default_range_fan, MechanicalVentilationModel, RecoveryEffectiveness,
};
use crate::core::airflow::natural_ventilation::NaturalVentilationController;
use crate::core::airflow::program::{Actuators, AirflowProgram, NamedOutputs, TimestepSnapshot};
use crate::core::airflow::program_text::{self, Binding};
use crate::errors::AirflowError;
use crate::external_conditions::ExternalConditions;
use crate::input::{Input, SpotVentilationInput, VentilationFanType};
use serde::Serialize;
use tracing::{debug, instrument};

/// Airflow components of a building, set up once from the input
#[derive(Clone, Debug)]
pub struct AirflowModel {
    program: AirflowProgram,
}

impl AirflowModel {
    #[instrument(skip_all)]
    pub fn from_input(input: &Input) -> anyhow::Result<Self> {
        let external_conditions = ExternalConditions::from(&input.external_conditions);

        let infiltration =
            InfiltrationModel::new(&input.building, &input.infiltration, &external_conditions)?;
        debug!(
            "Conditioned zone infiltration uses {} with an annual average of {} ACH",
            infiltration.conditioned().method(),
            infiltration.conditioned().annual_average_ach()
        );

        let natural_ventilation = natural_ventilation_from_input(input, &infiltration)?;
        let mechanical_ventilation = mechanical_ventilation_from_input(input)?;

        let cfis_air_handler = mechanical_ventilation
            .cfis()
            .map(|cfis| cfis.air_handler().to_string());
        let ducts = DuctLeakageNetwork::new(&input.air_handlers, cfis_air_handler.as_deref())?;

        Ok(Self {
            program: AirflowProgram::new(
                infiltration,
                natural_ventilation,
                mechanical_ventilation,
                ducts,
            ),
        })
    }

    pub fn program(&self) -> &AirflowProgram {
        &self.program
    }

    /// Actuator values for one timestep
    pub fn evaluate(
        &self,
        snapshot: &TimestepSnapshot,
        cfis_state: &mut CfisState,
    ) -> Result<Actuators, AirflowError> {
        self.program.evaluate(snapshot, cfis_state)
    }

    pub fn program_text(&self) -> anyhow::Result<String> {
        program_text::render(&self.program)
    }

    pub fn results(&self) -> AirflowResults {
        let program = &self.program;
        let conditioned = program.infiltration().conditioned();
        let (stack_coefficient, wind_coefficient) = program.conditioned_coefficients();

        AirflowResults {
            zones: program.infiltration().zone_summaries(),
            air_handlers: program.ducts().summaries(),
            natural_ventilation: program.natural_ventilation().map(|controller| {
                NaturalVentilationSummary {
                    free_area: controller.free_area(),
                    available_hours: controller.available_hours(),
                    max_flow: controller.max_flow(),
                }
            }),
            mechanical_ventilation: program.mechanical_ventilation().fan_type().map(|fan_type| {
                let model = program.mechanical_ventilation();
                MechanicalVentilationSummary {
                    fan_type,
                    flow_rate: model.whole_house_flow_rate(),
                    fraction_fan_heat_to_zone: model.fraction_fan_heat_to_zone(),
                    fan_elements: model.fan_elements(),
                    effectiveness: model.effectiveness(),
                    cfis_minutes_open_per_hour: model
                        .cfis()
                        .map(|cfis| cfis.target_minutes_per_hour()),
                }
            }),
            named_outputs: NamedOutputs {
                stack_coefficient,
                wind_coefficient,
                effective_leakage_area: conditioned.effective_leakage_area(),
                natural_ventilation_area: program
                    .natural_ventilation()
                    .map(|controller| controller.opening().area())
                    .unwrap_or_default(),
                ..Default::default()
            },
            bindings: program_text::bindings(program),
        }
    }
}

fn natural_ventilation_from_input(
    input: &Input,
    infiltration: &InfiltrationModel,
) -> Result<Option<NaturalVentilationController>, AirflowError> {
    input
        .natural_ventilation
        .as_ref()
        .map(|natural_ventilation| {
            NaturalVentilationController::new(
                natural_ventilation,
                input.building.window_area,
                input.building.conditioned_volume,
                infiltration,
                input.setpoints.as_ref(),
            )
        })
        .transpose()
}

/// A spot ventilation section switches on bath and range fans, with default fans for any
/// it does not describe
fn mechanical_ventilation_from_input(
    input: &Input,
) -> Result<MechanicalVentilationModel, AirflowError> {
    let spot_ventilation = input.spot_ventilation.as_ref();
    let bath_fan = spot_ventilation.map(|SpotVentilationInput { bath_fan, .. }| {
        bath_fan.clone().unwrap_or_else(default_bath_fan)
    });
    let range_fan = spot_ventilation.map(|SpotVentilationInput { range_fan, .. }| {
        range_fan.clone().unwrap_or_else(default_range_fan)
    });

    MechanicalVentilationModel::new(
        input.mechanical_ventilation.as_ref(),
        bath_fan.as_ref(),
        range_fan.as_ref(),
        input.building.number_of_bathrooms,
        input.clothes_dryer.as_ref(),
        &input.air_handlers,
    )
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NaturalVentilationSummary {
    /// in ft^2
    pub free_area: f64,
    pub available_hours: f64,
    /// in m^3/s
    pub max_flow: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MechanicalVentilationSummary {
    pub fan_type: VentilationFanType,
    /// in m^3/s
    pub flow_rate: f64,
    pub fraction_fan_heat_to_zone: f64,
    pub fan_elements: u32,
    pub effectiveness: RecoveryEffectiveness,
    pub cfis_minutes_open_per_hour: Option<f64>,
}

/// Setup results handed to the host simulation and to sizing
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AirflowResults {
    pub zones: Vec<ZoneInfiltrationSummary>,
    pub air_handlers: Vec<AirHandlerDuctSummary>,
    pub natural_ventilation: Option<NaturalVentilationSummary>,
    pub mechanical_ventilation: Option<MechanicalVentilationSummary>,
    pub named_outputs: NamedOutputs,
    pub bindings: Vec<Binding>,
}
