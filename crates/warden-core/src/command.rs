//! Command abstractions.

/// Implemented by every command a bounded context accepts. Handlers use it to
/// attribute pushed events and to tag their tracing spans.
pub trait Command: Send + Sync + std::fmt::Debug {
    /// Stable command name, e.g. `user.change_email`.
    fn command_type(&self) -> &'static str;

    /// The aggregate the command targets.
    fn aggregate_id(&self) -> &str;

    /// The user issuing the command, recorded as the events' editor.
    fn editor_user(&self) -> &str;
}
