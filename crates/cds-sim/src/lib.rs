//! ---
//! cds_section: "04-simulation"
//! cds_subsection: "module"
//! cds_type: "source"
//! cds_scope: "code"
//! cds_description: "Simulated collaborators and bench wiring."
//! cds_version: "v0.0.0-prealpha"
//! cds_owner: "tbd"
//! ---
//! Simulated collaborators for exercising the lifecycle without hardware.
//!
//! Every collaborator call is recorded in a shared [`Journal`] under a
//! `component.operation` key, and any key can be made to fail. Resources that
//! a real driver would allocate are counted so leaks show up in
//! [`Journal::outstanding`].

pub mod bench;
pub mod firmware;
pub mod journal;
pub mod platform;
pub mod radio;
pub mod scheduler;
pub mod stack;

pub use bench::{fast_timeouts, SimBench};
pub use firmware::SimFirmware;
pub use journal::Journal;
pub use platform::SimPlatform;
pub use radio::SimRadio;
pub use scheduler::SimScheduler;
pub use stack::{SimDataPlane, SimDispatcher, SimMac, SimSme};
