pub mod airflow;
pub mod psychrometrics;
pub mod units;
