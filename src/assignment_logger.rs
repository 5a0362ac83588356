use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::Attributes;

/// Event describing a single logged assignment. Submit it to your analytics storage to know
/// which subject received which variation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentEvent {
    /// Key of the evaluated flag.
    pub feature_flag: String,
    /// Key of the allocation that matched.
    pub allocation: String,
    /// `"{feature_flag}-{allocation}"`.
    pub experiment: String,
    /// Key of the assigned variation.
    pub variation: String,
    /// Subject key.
    pub subject: String,
    /// Attributes the subject was evaluated with.
    pub subject_attributes: Attributes,
    /// Time of the assignment (RFC 3339).
    pub timestamp: String,
    /// SDK identity.
    pub meta_data: HashMap<String, String>,
    /// Extra logging fields of the matched split.
    #[serde(flatten)]
    pub extra_logging: HashMap<String, String>,
}

/// A trait for logging assignment events to your storage system.
pub trait AssignmentLogger {
    /// Logs the assignment event to the storage system.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use eppo_assignment::{AssignmentLogger, AssignmentEvent};
    /// struct MyAssignmentLogger;
    ///
    /// impl AssignmentLogger for MyAssignmentLogger {
    ///     fn log_assignment(&self, event: AssignmentEvent) {
    ///         // Implement assignment logging logic here
    ///     }
    /// }
    /// ```
    ///
    /// # Errors
    ///
    /// Errors that occur during logging should be handled internally within the implementation.
    /// A panicking logger is caught and does not affect the returned assignment.
    ///
    /// # Notes
    ///
    /// This method is called before returning assignment to the caller, so it should not block
    /// the calling thread.
    fn log_assignment(&self, event: AssignmentEvent);
}

pub(crate) struct NoopAssignmentLogger;
impl AssignmentLogger for NoopAssignmentLogger {
    fn log_assignment(&self, _event: AssignmentEvent) {}
}

impl<T: Fn(AssignmentEvent)> AssignmentLogger for T {
    fn log_assignment(&self, event: AssignmentEvent) {
        self(event);
    }
}
