mod test_airflow_model;
