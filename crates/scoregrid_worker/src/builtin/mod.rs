//! Reference workers that need no external model.

pub mod planner;
pub mod scoring;

pub use planner::{PLANNER_ROLE, StaticPlanner, spinoff_grid_plan};
pub use scoring::{
    RuleScorer, score_debt_loading, score_equity_incentives, score_index_exclusion,
};
