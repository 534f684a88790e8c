pub mod detector;
pub mod renderer;

pub use detector::{ChartDetector, DetectorMode};
pub use renderer::ChartRenderer;
