pub mod analysis;
pub mod core;
pub mod directory;
pub mod maintenance;
pub mod progress;
