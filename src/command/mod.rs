mod pack;
mod preview;
mod report;

pub use pack::run_pack;
pub use preview::run_preview;
pub use report::run_report;
