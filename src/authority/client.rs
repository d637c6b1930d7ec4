use std::future::Future;

use crate::{
    error::AuthorityError,
    models::{FeedbackKind, SessionSnapshot},
};

/// Commands a surface may send to whoever owns the session.
///
/// Return values only report acceptance. Display state always follows the
/// broadcast stream, never these results.
pub trait SessionAuthorityClient: Send + Sync + 'static {
    /// One-shot read used once, when a surface mounts.
    fn get_current_session(
        &self,
    ) -> impl Future<Output = Result<Option<SessionSnapshot>, AuthorityError>> + Send;

    /// Fails with [`AuthorityError::Conflict`] while another session is active.
    fn start_session(
        &self,
        task_id: Option<String>,
        goal_duration_minutes: u32,
    ) -> impl Future<Output = Result<SessionSnapshot, AuthorityError>> + Send;

    /// Fails with [`AuthorityError::NotFound`] when nothing is active.
    fn end_session(
        &self,
        user_evaluation_score: u8,
    ) -> impl Future<Output = Result<(), AuthorityError>> + Send;

    fn submit_feedback(
        &self,
        kind: FeedbackKind,
    ) -> impl Future<Output = Result<(), AuthorityError>> + Send;

    fn hide_overlay(&self) -> impl Future<Output = Result<(), AuthorityError>> + Send;
}
