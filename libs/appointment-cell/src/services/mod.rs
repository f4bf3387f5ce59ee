// libs/appointment-cell/src/services/mod.rs
pub mod availability;
pub mod booking;
pub mod calendar;
pub mod conflict;
pub mod lifecycle;
pub mod locks;
pub mod recurrence;
pub mod slots;
