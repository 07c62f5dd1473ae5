pub mod balance_validator;
pub mod constraint_checker;
pub mod holiday_calendar;
pub mod iteration_planner;
pub mod schedule_builder;

pub use balance_validator::{BalanceValidator, WorkerBalance};
pub use constraint_checker::{ConstraintChecker, ViolationReport};
pub use holiday_calendar::HolidayCalendar;
pub use iteration_planner::{IterationPlan, IterationPlanner};
pub use schedule_builder::{FillOutcome, ScheduleBuilder};
