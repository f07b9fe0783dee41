use thiserror::Error;

/// Main error type for the VidTune system
#[derive(Error, Debug)]
pub enum VtError {
    #[error("Data error: {0}")]
    Data(#[from] DataError),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Tuning error: {0}")]
    Tune(#[from] TuneError),

    #[error("Training error: {0}")]
    Train(#[from] TrainError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Arrow error: {0}")]
    Arrow(String),

    #[error("Parquet error: {0}")]
    Parquet(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Dataset-related errors
#[derive(Error, Debug)]
pub enum DataError {
    #[error("Dataset not found at {path}")]
    DatasetNotFound { path: String },

    #[error("Split not found: {split}")]
    SplitNotFound { split: String },

    #[error("Invalid manifest: {message}")]
    ManifestInvalid { message: String },

    #[error("Invalid data format: {message}")]
    InvalidFormat { message: String },

    #[error("Data corruption detected: {message}")]
    Corruption { message: String },

    #[error("Split {split} has no examples")]
    EmptySplit { split: String },

    #[error("Data loading failed: {message}")]
    LoadingFailed { message: String },

    #[error("Data write failed: {message}")]
    WriteFailed { message: String },
}

/// Model construction errors
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Pretrained assets not found for {id} (looked in {path})")]
    PretrainedNotFound { id: String, path: String },

    #[error("Invalid model identifier {id}: {message}")]
    InvalidIdentifier { id: String, message: String },

    #[error("Missing special token: {token}")]
    MissingSpecialToken { token: String },

    #[error("Invalid model configuration: {message}")]
    InvalidConfig { message: String },
}

/// Search and trial-scheduling errors
#[derive(Error, Debug)]
pub enum TuneError {
    #[error("Search space has no parameters")]
    EmptySearchSpace,

    #[error("Unknown parameter: {name}")]
    UnknownParameter { name: String },

    #[error("Invalid bounds for {name}: {message}")]
    InvalidBounds { name: String, message: String },

    #[error("Invalid value for parameter {name}: {message}")]
    InvalidParameter { name: String, message: String },

    #[error("Missing parameter: {name}")]
    MissingParameter { name: String },

    #[error("No completed trials")]
    NoCompletedTrials,

    #[error("Trial {number} failed: {message}")]
    TrialFailed { number: usize, message: String },

    #[error("Report export failed: {message}")]
    ReportFailed { message: String },
}

/// Trainer harness errors
#[derive(Error, Debug)]
pub enum TrainError {
    #[error("Invalid training arguments: {message}")]
    InvalidArguments { message: String },

    #[error("Checkpoint write failed: {message}")]
    CheckpointFailed { message: String },
}

/// Result type alias for VidTune operations
pub type VtResult<T> = Result<T, VtError>;

/// Macro for creating validation errors
#[macro_export]
macro_rules! validation_error {
    ($($arg:tt)*) => {
        $crate::VtError::Validation(format!($($arg)*))
    };
}

/// Macro for creating internal errors
#[macro_export]
macro_rules! internal_error {
    ($($arg:tt)*) => {
        $crate::VtError::Internal(format!($($arg)*))
    };
}

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::VtError::Config(format!($($arg)*))
    };
}
