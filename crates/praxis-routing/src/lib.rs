mod classifier;
mod cost;
mod router;
mod supervision;

pub use classifier::classify;
pub use cost::{CostTracker, ModelCost, SessionCost, SupervisionStats, TierCost};
pub use router::TierRouter;
pub use supervision::{SupervisionResult, TaskValidator, ValidationRule};
