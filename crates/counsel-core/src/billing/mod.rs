pub mod engine;
pub mod meter;
pub mod registry;

pub use engine::{BillingEngine, ForcedEndHook};
pub use meter::{BillingMeter, CyclePlan, FinalTotals};
pub use registry::BillingRegistry;
