pub mod assistant_client;
pub mod project_store_client;
pub mod runner_client;
