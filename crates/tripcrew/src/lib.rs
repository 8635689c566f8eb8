pub mod agent;
pub mod conversation;
pub mod crew;
pub mod errors;
pub mod executor;
pub mod models;
pub mod planner;
pub mod prompt_template;
pub mod providers;
pub mod selector;
pub mod settings;
pub mod tools;
pub mod transcript;

pub use planner::{PlanOptions, PlanReport, Planner};
