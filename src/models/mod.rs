//! Status and classification enums shared by the order and stage entities.

pub mod order;
pub mod stage;

pub use order::{OrderPriority, OrderStatus, SOURCE_MANUAL, SOURCE_WOOCOMMERCE};
pub use stage::{StageStatus, MAX_STAGE_HOURS};
