mod install;
mod setup;
mod vm;

pub use install::install;
pub use setup::setup;
pub use vm::vm;
