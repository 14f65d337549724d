pub mod check;
pub mod drag;
pub mod drop_zone;
pub mod hierarchy;
pub mod keyboard;
pub mod positioning;
pub mod relative;
