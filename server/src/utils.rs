#[cfg(test)]
pub mod log_capture;
mod logging;

pub use logging::setup_logging;
