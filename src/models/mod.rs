mod diff;
mod import_job;
mod import_version;
mod road;

pub use diff::*;
pub use import_job::*;
pub use import_version::*;
pub use road::*;
