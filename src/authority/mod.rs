mod client;
mod engine;
mod schedule;
mod service;

pub use client::SessionAuthorityClient;
pub use engine::InterventionEngine;
pub use schedule::ScheduleMonitor;
pub use service::SessionAuthority;
