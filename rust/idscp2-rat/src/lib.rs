//! Remote-attestation driver runtime: a generic registry of named prover and
//! verifier implementations, the channel-pair wiring each spawned driver
//! gets, and a reference `dummy` driver for tests and demos.

mod driver;
mod dummy;
mod error;
mod registry;

pub use driver::{DriverContext, DriverEvent, DriverFn, DriverHandle, Prover, Verifier};
pub use dummy::dummy_driver_factory;
pub use error::RatError;
pub use registry::DriverRegistry;
