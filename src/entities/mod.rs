pub mod custom_stage;
pub mod order;
pub mod order_stage;
