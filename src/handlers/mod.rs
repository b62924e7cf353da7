pub mod health;
pub mod diagnostics;
pub mod run;

pub use health::*;
pub use diagnostics::*;
pub use run::*;
