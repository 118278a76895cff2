use thiserror::Error;

#[derive(Error, Debug)]
pub enum GeezError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Failed to load font: {0}")]
    FontLoad(String),

    #[error("Failed to scan page {page}: {reason}")]
    PageScan { page: u32, reason: String },

    #[error("Failed to modify page {page}: {reason}")]
    PageMutation { page: u32, reason: String },

    #[error("Unsupported input: {0}")]
    UnsupportedInput(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl GeezError {
    pub(crate) fn scan(page: u32, reason: impl ToString) -> Self {
        GeezError::PageScan {
            page,
            reason: reason.to_string(),
        }
    }

    pub(crate) fn mutation(page: u32, reason: impl ToString) -> Self {
        GeezError::PageMutation {
            page,
            reason: reason.to_string(),
        }
    }
}
