pub mod distribute_remaining;
pub mod generate_roster;
pub mod optimize_roster;
pub mod validate_tolerance;

pub use distribute_remaining::DistributeRemaining;
pub use generate_roster::GenerateRoster;
pub use optimize_roster::OptimizeRoster;
pub use validate_tolerance::ValidateTolerance;
