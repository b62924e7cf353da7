pub mod project;
pub mod messages;
pub mod health;
pub mod diagnostics;
pub mod run;
pub mod error;

pub use project::*;
pub use messages::*;
pub use health::*;
pub use diagnostics::*;
pub use run::*;
pub use error::*;
