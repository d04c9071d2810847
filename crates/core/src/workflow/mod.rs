mod engine;
mod resources;
pub mod steps;

pub use engine::{BillArtifact, BillGenerationWorkflow};
pub use resources::TempResourceSet;
pub use steps::BillStep;
