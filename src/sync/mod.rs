pub mod authority;
pub mod diagnostics;
pub mod reconcile;
