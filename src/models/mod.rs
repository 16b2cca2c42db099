pub mod assistant;
pub mod diagnostics;
pub mod error;
pub mod execution;
pub mod health;
pub mod messages;
pub mod session;

pub use assistant::*;
pub use diagnostics::*;
pub use error::*;
pub use execution::*;
pub use health::*;
pub use messages::*;
pub use session::*;
