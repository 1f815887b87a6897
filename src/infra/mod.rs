mod logging;
mod runner;

pub use logging::*;
pub use runner::*;
