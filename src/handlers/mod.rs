pub mod assistant;
pub mod diagnostics;
pub mod execution;
pub mod health;

pub use assistant::*;
pub use diagnostics::*;
pub use execution::*;
pub use health::*;
