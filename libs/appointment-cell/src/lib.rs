// libs/appointment-cell/src/lib.rs
pub mod clock;
pub mod error;
pub mod handlers;
pub mod models;
pub mod router;
pub mod services;
pub mod store;

pub use clock::ClinicClock;
pub use error::{AppointmentError, AppointmentResult};
pub use router::{scheduling_routes, SchedulingState};
