mod agent_test;
mod barrier_test;
mod bulk_update_test;
mod service_test;
