use crate::core::units::BelowAbsoluteZeroError;
use crate::input::{DuctSide, VentilationFanType, ZoneKind};
use thiserror::Error;

/// Fatal conditions found while setting up or evaluating the airflow models.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum AirflowError {
    #[error(
        "Envelope leakage distribution does not sum to 1 (ceiling {ceiling}, walls {walls}, floor {floor})"
    )]
    LeakageDistribution { ceiling: f64, walls: f64, floor: f64 },
    #[error("Calculated {kind} effectiveness of {value} for the {fan_type} ventilation fan is outside the range 0-1")]
    RecoveryEffectiveness {
        fan_type: VentilationFanType,
        kind: EffectivenessKind,
        value: f64,
    },
    #[error("Leakage fraction of {value} on {side} duct is outside the range 0-1")]
    DuctLeakageFraction { side: DuctSide, value: f64 },
    #[error("Leakage flow of {value} cfm at 25 Pa on {side} duct is negative")]
    DuctLeakageFlow { side: DuctSide, value: f64 },
    #[error("Surface area of {value} ft2 on {side} duct is negative")]
    DuctArea { side: DuctSide, value: f64 },
    #[error("Nominal R-value of {value} on {side} duct is negative")]
    DuctRValue { side: DuctSide, value: f64 },
    #[error("A {side} duct specifies both a leakage fraction and a leakage flow at 25 Pa")]
    DuctLeakageOverSpecified { side: DuctSide },
    #[error("Ducts on air handler '{air_handler}' in {location} mix leakage fractions with leakage flows")]
    MixedDuctLeakageUnits {
        air_handler: String,
        location: String,
    },
    #[error("Central fan integrated supply requires ducted equipment on air handler '{0}'")]
    CfisWithoutDuctedEquipment(String),
    #[error("Central fan integrated supply blower fraction of {0} is outside the range 0-1")]
    CfisBlowerFraction(f64),
    #[error("No air state was supplied for the {0} zone")]
    MissingZoneState(ZoneKind),
    #[error("Calculated {quantity} of {value} is negative")]
    NegativeQuantity { quantity: &'static str, value: f64 },
    #[error(transparent)]
    BelowAbsoluteZero(#[from] BelowAbsoluteZeroError),
}

#[derive(Clone, Copy, Debug, PartialEq, strum_macros::Display)]
#[strum(serialize_all = "snake_case")]
pub enum EffectivenessKind {
    ApparentSensible,
    Sensible,
    Latent,
}
