//! CLI commands module.

mod calibrate;
mod classify;
mod enroll;
mod info;
mod mine;
mod util;

pub use calibrate::CalibrateCommand;
pub use classify::ClassifyCommand;
pub use enroll::EnrollCommand;
pub use info::InfoCommand;
pub use mine::MineCommand;

pub(crate) use util::*;
