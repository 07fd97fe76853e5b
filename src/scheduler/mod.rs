pub mod controller;
pub mod policy;
pub mod registry;

pub use controller::LifecycleController;
