pub mod gain;
pub mod reblock;
pub mod signal_path;

pub use gain::{GainSmoother, GAIN_RAMP_MS};
pub use reblock::FrameReblocker;
pub use signal_path::{BlockOutcome, SignalPath};
