pub mod detect;
pub mod protect;
pub mod remove;
pub mod report;
