pub mod backend;
pub mod orchestrator;
