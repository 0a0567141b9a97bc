use std::fmt;

/// Error type for contact-data calculations.
#[derive(Debug)]
pub enum CmDataError {
    /// No molecule instances were supplied
    EmptyPartition,
    /// Molecule ranges do not tile the atom index space
    InvalidPartition(String),
    /// Rejected analysis options
    InvalidSettings(String),
    /// Frame atom count differs from the topology
    FrameMismatch { expected: usize, found: usize },
    /// Failure while loading the topology or trajectory
    Topology(String),
    /// Building or serializing a results table failed
    Table(String),
    /// Reading input or writing results failed
    Io(std::io::Error),
}

impl CmDataError {
    /// Errors raised before any frame is processed.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            CmDataError::EmptyPartition
                | CmDataError::InvalidPartition(_)
                | CmDataError::InvalidSettings(_)
        )
    }
}

impl fmt::Display for CmDataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CmDataError::EmptyPartition => {
                write!(f, "Cannot classify molecules from an empty partition")
            }
            CmDataError::InvalidPartition(msg) => write!(f, "Invalid molecule partition: {msg}"),
            CmDataError::InvalidSettings(msg) => write!(f, "Invalid settings: {msg}"),
            CmDataError::FrameMismatch { expected, found } => write!(
                f,
                "Frame has {found} atoms but the topology has {expected}"
            ),
            CmDataError::Topology(msg) => write!(f, "Failed to load topology: {msg}"),
            CmDataError::Table(msg) => write!(f, "Failed to export table: {msg}"),
            CmDataError::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for CmDataError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CmDataError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<polars::prelude::PolarsError> for CmDataError {
    fn from(err: polars::prelude::PolarsError) -> Self {
        CmDataError::Table(err.to_string())
    }
}

impl From<std::io::Error> for CmDataError {
    fn from(err: std::io::Error) -> Self {
        CmDataError::Io(err)
    }
}
