mod dispatcher;
mod notifier;

pub use dispatcher::{
    AlertState, Attachment, InterventionDispatcher, PointerTarget, Reaction, ResolveOutcome,
    Severity,
};
pub use notifier::{LogNotifier, Notice, Notifier, PermissionState};
