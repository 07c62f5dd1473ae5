pub mod roster_output;

pub use roster_output::{
    DayOutput, RosterOutput, SummaryOutput, ViolationsOutput, WorkerStatsOutput,
};
