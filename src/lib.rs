pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod presentation;

pub use application::services;
pub use application::use_cases;
pub use domain::entities;
pub use domain::value_objects;
pub use infrastructure::output;
pub use infrastructure::parsers;
