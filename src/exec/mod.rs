pub mod gateway;
pub mod queue;
