pub mod registry;
pub mod relay;
pub mod room;
