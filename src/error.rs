//! Error kinds surfaced by the analytics pipeline.
//!
//! Only [`AnalyticsError::DataLoad`] is fatal, and only to session start. Every
//! other kind is scoped to the single derived view that raised it; the view
//! assembler turns it into an "unavailable" outcome plus a diagnostic.

use thiserror::Error;

pub type Result<T, E = AnalyticsError> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalyticsError {
    #[error("Unable to load transactions: {0}")]
    DataLoad(String),
    #[error("No rows available for {0}")]
    EmptyView(String),
    #[error("Cannot aggregate: {0}")]
    Aggregation(String),
    #[error("Undefined result: {0}")]
    DivisionUndefined(String),
    #[error("Insufficient data: {0}")]
    InsufficientData(String),
}

impl AnalyticsError {
    pub fn data_load(message: impl Into<String>) -> Self {
        Self::DataLoad(message.into())
    }

    pub fn empty_view(what: impl Into<String>) -> Self {
        Self::EmptyView(what.into())
    }

    pub fn aggregation(message: impl Into<String>) -> Self {
        Self::Aggregation(message.into())
    }

    pub fn division_undefined(message: impl Into<String>) -> Self {
        Self::DivisionUndefined(message.into())
    }

    pub fn insufficient_data(message: impl Into<String>) -> Self {
        Self::InsufficientData(message.into())
    }

    /// True for everything except load failures.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, AnalyticsError::DataLoad(_))
    }

    /// Short label used when a view cannot be shown.
    pub fn display_label(&self) -> &'static str {
        match self {
            AnalyticsError::DataLoad(_) => "load failed",
            AnalyticsError::EmptyView(_) => "no data",
            AnalyticsError::Aggregation(_) => "skipped",
            AnalyticsError::DivisionUndefined(_) | AnalyticsError::InsufficientData(_) => {
                "undefined"
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_load_errors_are_fatal() {
        assert!(!AnalyticsError::data_load("missing column").is_recoverable());
        assert!(AnalyticsError::empty_view("top store").is_recoverable());
        assert!(AnalyticsError::division_undefined("std_dev is zero").is_recoverable());
    }

    #[test]
    fn messages_are_descriptive() {
        let err = AnalyticsError::empty_view("top category");
        assert_eq!(err.to_string(), "No rows available for top category");
        assert_eq!(err.display_label(), "no data");
        assert_eq!(
            AnalyticsError::insufficient_data("x").display_label(),
            "undefined"
        );
    }
}
