pub mod booking;
pub mod delay;
pub mod lifecycle;
pub mod reassignment;
pub mod store;
pub mod vacancy;

pub use booking::BookingAllocator;
pub use delay::DelayPropagationEngine;
pub use lifecycle::AppointmentLifecycleService;
pub use reassignment::ArrivedPatientReassignment;
pub use store::AppointmentStore;
pub use vacancy::VacancyRecoveryEngine;
