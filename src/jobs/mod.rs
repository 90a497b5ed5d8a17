pub mod monitor;
pub mod reaper;
