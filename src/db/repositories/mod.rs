mod feedback;
mod schedules;
mod sessions;

pub use feedback::FeedbackRecord;
