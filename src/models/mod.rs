pub mod activity;
pub mod events;
pub mod schedule;
pub mod session;

pub use activity::ActivitySample;
pub use events::{BridgeEvent, FeedbackKind, InterventionSignal, Topic};
pub use schedule::Schedule;
pub use session::{ActiveSession, CompletedSession, SessionSnapshot};
