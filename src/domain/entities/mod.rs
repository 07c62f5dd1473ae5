pub mod roster_problem;
pub mod schedule;
pub mod worker;

pub use roster_problem::RosterProblem;
pub use schedule::{Schedule, Slot};
pub use worker::{DateInterval, Worker};
