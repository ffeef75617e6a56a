pub mod location;
pub mod prefilter;
pub mod salary;
pub mod scoring;
pub mod strike;

pub use location::WorkArrangement;
pub use prefilter::{PreFilter, PreFilterDecision};
pub use salary::{extract_salary, parse_salary_string};
pub use scoring::{JobExtraction, ScoreBreakdown, ScoringEngine};
pub use strike::{FilterResult, Strike, StrikeEngine};
