//! Context window management.

pub mod window;

pub use window::{OverBudget, Window, WindowPolicy, build_window};
