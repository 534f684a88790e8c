pub mod client;
pub mod registry;

pub use client::ToolClient;
pub use registry::{ToolRegistry, CHART_DETECTOR, CHART_RENDERER};
