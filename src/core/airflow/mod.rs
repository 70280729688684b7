pub mod cfis;
pub mod duct_leakage;
pub mod infiltration;
pub mod mechanical_ventilation;
pub mod natural_ventilation;
pub mod program;
pub mod program_text;
pub mod wind_speed;
