// Order intake, scheduling, stage tracking and completion
pub mod order_lifecycle;

// Configurable production stage list
pub mod stage_catalog;

pub use order_lifecycle::OrderLifecycleService;
pub use stage_catalog::StageCatalogService;
