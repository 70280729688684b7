mod test_airflow_model {
    use crate::core::airflow::cfis::CfisState;
    use crate::core::airflow::duct_leakage::{AirHandlerConditions, DuctLocation};
    use crate::core::airflow::program::TimestepSnapshot;
    use crate::core::psychrometrics::{AirState, STANDARD_PRESSURE_PA};
    use crate::core::units::cfm_to_cubic_metres_per_second;
    use crate::errors::AirflowError;
    use crate::input::{ingest_for_processing, ZoneKind};
    use crate::model::AirflowModel;
    use crate::simulation_time::{SimulationTime, SimulationTimeIteration};
    use approx::assert_relative_eq;
    use indexmap::IndexMap;
    use pretty_assertions::assert_eq;
    use rstest::*;
    use serde_json::{json, Value};

    #[fixture]
    pub fn input() -> Value {
        json!({
            "Building": {
                "conditioned_floor_area": 2000.,
                "conditioned_volume": 16000.,
                "above_grade_storeys": 2,
                "number_of_bedrooms": 3,
                "number_of_bathrooms": 2,
                "window_area": 300.,
                "building_height": 20.,
                "zones": {
                    "conditioned": {"height": 16., "floor_area": 2000., "volume": 16000.},
                    "vented_attic": {"height": 4., "floor_area": 1000., "volume": 4000., "elevation": 16.},
                    "garage": {"height": 8., "floor_area": 400., "volume": 3200.}
                }
            },
            "ExternalConditions": {
                "annual_average_drybulb": 50.,
                "wind_speed_correction_factor": 1.0
            },
            "Infiltration": {
                "envelope_leakage": {"type": "ACH50", "value": 7.},
                "terrain": "suburban"
            },
            "MechanicalVentilation": {
                "fan_type": "cfis",
                "flow_rate": 90.,
                "fan_power": 0.,
                "cfis": {"minutes_open_per_hour": 20., "air_handler": "furnace"}
            },
            "SpotVentilation": {},
            "ClothesDryer": {},
            "AirHandlers": {
                "furnace": {
                    "has_ducted_equipment": true,
                    "blower_power": 400.,
                    "ducts": [
                        {"side": "supply", "location": "vented_attic", "leakage_fraction": 0.075, "area": 300., "nominal_r_value": 6.},
                        {"side": "return", "location": "vented_attic", "leakage_fraction": 0.025, "area": 100., "nominal_r_value": 6.}
                    ]
                }
            }
        })
    }

    fn model_from(input: &Value) -> AirflowModel {
        let input = ingest_for_processing(input.to_string().as_bytes()).unwrap();
        AirflowModel::from_input(&input).unwrap()
    }

    fn winter_snapshot(time: SimulationTimeIteration) -> TimestepSnapshot {
        let indoor = AirState::new(21., 0.006);
        let outdoor = AirState::new(0., 0.003);
        TimestepSnapshot {
            time,
            indoor,
            outdoor,
            pressure: STANDARD_PRESSURE_PA,
            wind_speed: 4.,
            zones: IndexMap::from([
                (ZoneKind::VentedAttic, AirState::new(2., 0.003)),
                (ZoneKind::Garage, AirState::new(8., 0.003)),
            ]),
            air_handlers: IndexMap::from([(
                "furnace".to_string(),
                AirHandlerConditions {
                    mass_flow: 0.,
                    runtime_fraction: 0.,
                    outlet: indoor,
                    return_air: indoor,
                },
            )]),
            dryer_fraction: 0.,
        }
    }

    fn first_step() -> SimulationTimeIteration {
        SimulationTimeIteration {
            index: 0,
            time: 0.,
            timestep: 0.25,
        }
    }

    fn raw_conditioned_infiltration(model: &AirflowModel, snapshot: &TimestepSnapshot) -> f64 {
        model.program().infiltration().zone_flow(
            ZoneKind::Conditioned,
            snapshot.indoor.temperature - snapshot.outdoor.temperature,
            snapshot.wind_speed,
        )
    }

    #[rstest]
    pub fn should_open_cfis_damper_for_target_minutes_every_hour(input: Value) {
        let model = model_from(&input);
        let simtime = SimulationTime::new(0., 24., 0.25);
        let mut cfis_state = CfisState::new();
        let mut open_minutes = vec![0.; 24];

        for time in simtime.iter() {
            let snapshot = winter_snapshot(time);
            let actuators = model.evaluate(&snapshot, &mut cfis_state).unwrap();
            open_minutes[time.current_hour() as usize] +=
                actuators.mechanical_ventilation.cfis_damper_fraction * time.timestep_in_minutes();

            // imbalance and infiltration add in quadrature to the combined flow
            let raw = raw_conditioned_infiltration(&model, &snapshot);
            let imbalance = actuators.imbalanced_mechanical_ventilation;
            assert_relative_eq!(
                (actuators.infiltration + imbalance).powi(2),
                imbalance.powi(2) + raw.powi(2),
                max_relative = 1e-9
            );
        }

        for minutes in open_minutes {
            assert_relative_eq!(minutes, 20., epsilon = 1e-9);
        }
    }

    #[rstest]
    pub fn should_count_duct_leakage_in_imbalance_while_blower_runs(input: Value) {
        let model = model_from(&input);
        let mut snapshot = winter_snapshot(first_step());
        snapshot.air_handlers.insert(
            "furnace".to_string(),
            AirHandlerConditions {
                mass_flow: 0.5,
                runtime_fraction: 1.,
                outlet: AirState::new(40., 0.006),
                return_air: snapshot.indoor,
            },
        );

        let actuators = model.evaluate(&snapshot, &mut CfisState::new()).unwrap();

        let attic_loads = actuators.duct_loads["furnace"][&DuctLocation::Zone(ZoneKind::VentedAttic)];
        assert!(attic_loads.imbalance_flow > 0.);
        assert!(attic_loads.duct_zone_sensible > 0.);
        assert_eq!(actuators.mechanical_ventilation.cfis_damper_fraction, 1.);

        let flows = &actuators.mechanical_ventilation;
        let exhaust = flows.range_exhaust
            + flows.bath_exhaust
            + flows.dryer_exhaust
            + attic_loads.exhaust_equivalent();
        let supply = flows.cfis_outdoor_air + attic_loads.supply_equivalent();
        assert_relative_eq!(
            actuators.imbalanced_mechanical_ventilation,
            (supply - exhaust).abs(),
            epsilon = 1e-12
        );

        assert_eq!(actuators.outputs.ducts.len(), 1);
        assert_relative_eq!(
            actuators.outputs.cfis_outdoor_air_flow,
            cfm_to_cubic_metres_per_second(90.)
        );
    }

    #[rstest]
    pub fn should_leave_infiltration_untouched_by_balanced_ventilation(mut input: Value) {
        input["MechanicalVentilation"] = json!({
            "fan_type": "hrv",
            "flow_rate": 100.,
            "fan_power": 60.,
            "recovery_efficiency": {"type": "Unadjusted", "sensible": 0.7, "total": 0.6}
        });
        let input = input.as_object_mut().unwrap();
        input.remove("SpotVentilation");
        input.remove("ClothesDryer");
        input.remove("AirHandlers");
        let model = model_from(&Value::Object(input.clone()));

        let snapshot = winter_snapshot(first_step());
        let actuators = model.evaluate(&snapshot, &mut CfisState::new()).unwrap();

        assert_eq!(actuators.imbalanced_mechanical_ventilation, 0.);
        assert_relative_eq!(
            actuators.infiltration,
            raw_conditioned_infiltration(&model, &snapshot),
            max_relative = 1e-12
        );
        assert_relative_eq!(
            actuators.balanced_ventilation,
            cfm_to_cubic_metres_per_second(100.)
        );

        let sensible = model.program().mechanical_ventilation().effectiveness().sensible;
        assert_relative_eq!(
            actuators.balanced_supply_air.temperature,
            sensible * 21.,
            max_relative = 1e-12
        );
        assert!(actuators.duct_loads.is_empty());
    }

    #[rstest]
    pub fn should_reduce_infiltration_under_exhaust_ventilation(mut input: Value) {
        input["MechanicalVentilation"] = json!({
            "fan_type": "exhaust",
            "flow_rate": 100.,
            "fan_power": 30.
        });
        let input = input.as_object_mut().unwrap();
        input.remove("SpotVentilation");
        input.remove("AirHandlers");
        let model = model_from(&Value::Object(input.clone()));

        let snapshot = winter_snapshot(first_step());
        let actuators = model.evaluate(&snapshot, &mut CfisState::new()).unwrap();

        let exhaust = cfm_to_cubic_metres_per_second(100.);
        let raw = raw_conditioned_infiltration(&model, &snapshot);
        assert_relative_eq!(actuators.imbalanced_mechanical_ventilation, exhaust);
        assert_relative_eq!(
            actuators.infiltration,
            exhaust.hypot(raw) - exhaust,
            max_relative = 1e-12
        );
        assert!(actuators.infiltration < raw);
        assert_eq!(actuators.fan_power, 30.);
    }

    #[rstest]
    pub fn should_fail_without_state_for_an_unconditioned_zone(input: Value) {
        let model = model_from(&input);
        let mut snapshot = winter_snapshot(first_step());
        snapshot.zones.shift_remove(&ZoneKind::Garage);

        assert_eq!(
            model.evaluate(&snapshot, &mut CfisState::new()),
            Err(AirflowError::MissingZoneState(ZoneKind::Garage))
        );
    }
}
