use thiserror::Error;

#[derive(Error, Debug)]
pub enum YardError {
    #[error("Validation failed: {}", .violations.join("; "))]
    ValidationError { violations: Vec<String> },

    #[error("Block '{block_name}' ({block_id}) is full")]
    NoCapacityError { block_id: String, block_name: String },

    #[error("Slot {slot_id} is not occupied")]
    NotOccupiedError { slot_id: String },

    #[error("{entity} not found: {id}")]
    NotFoundError { entity: &'static str, id: String },

    #[error("Slot {slot_id} already holds container {occupant}")]
    SlotOccupiedError { slot_id: String, occupant: String },

    #[error("Slot {slot_id} was changed by another writer")]
    SlotConflictError { slot_id: String },

    #[error("Container number already exists: {container_number}")]
    DuplicateContainerError { container_number: String },

    #[error("Slot {coord} already exists in block {block_id}")]
    DuplicateSlotError { block_id: String, coord: String },

    #[error("Block {block_id} still holds {occupied} container(s)")]
    BlockNotEmptyError { block_id: String, occupied: usize },

    #[error("Store error: {message}")]
    StoreError { message: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Invalid value for {field}: '{value}' ({reason})")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Input,
    Capacity,
    State,
    Infrastructure,
    Configuration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl YardError {
    pub fn validation(violations: Vec<String>) -> Self {
        Self::ValidationError { violations }
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFoundError {
            entity,
            id: id.to_string(),
        }
    }

    pub fn store(message: impl Into<String>) -> Self {
        Self::StoreError {
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ValidationError { .. }
            | Self::NotFoundError { .. }
            | Self::DuplicateContainerError { .. } => ErrorCategory::Input,
            Self::NoCapacityError { .. } => ErrorCategory::Capacity,
            Self::NotOccupiedError { .. }
            | Self::SlotOccupiedError { .. }
            | Self::SlotConflictError { .. }
            | Self::DuplicateSlotError { .. }
            | Self::BlockNotEmptyError { .. } => ErrorCategory::State,
            Self::StoreError { .. }
            | Self::IoError(_)
            | Self::SerializationError(_)
            | Self::CsvError(_) => ErrorCategory::Infrastructure,
            Self::ConfigError { .. } | Self::InvalidConfigValueError { .. } => {
                ErrorCategory::Configuration
            }
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Input | ErrorCategory::State => ErrorSeverity::High,
            // 換一個區塊即可繼續作業
            ErrorCategory::Capacity => ErrorSeverity::Medium,
            ErrorCategory::Configuration => ErrorSeverity::High,
            ErrorCategory::Infrastructure => ErrorSeverity::Critical,
        }
    }

    /// 是否可由呼叫端自行修正後重試
    pub fn is_recoverable(&self) -> bool {
        self.category() != ErrorCategory::Infrastructure
    }

    pub fn recovery_suggestion(&self) -> String {
        match self {
            Self::ValidationError { .. } => "Fix the listed fields and submit again".to_string(),
            Self::NoCapacityError { .. } => {
                "Choose another block or remove a container from this one".to_string()
            }
            Self::NotOccupiedError { .. } => "Refresh the block view; the slot is already empty".to_string(),
            Self::NotFoundError { entity, .. } => {
                format!("Check the {} identifier and try again", entity.to_lowercase())
            }
            Self::SlotOccupiedError { .. } => {
                "Pick an empty slot or remove the current occupant first".to_string()
            }
            Self::SlotConflictError { .. } => {
                "Another user changed this block; refresh and retry".to_string()
            }
            Self::DuplicateContainerError { .. } => {
                "Use the existing container record or correct the container number".to_string()
            }
            Self::DuplicateSlotError { .. } => "Recreate the block with a fresh id".to_string(),
            Self::BlockNotEmptyError { .. } => {
                "Remove every container from the block before deleting it".to_string()
            }
            Self::StoreError { .. } => "Check the yard store and its connectivity".to_string(),
            Self::IoError(_) => "Check file permissions and available disk space".to_string(),
            Self::SerializationError(_) => "The yard data file may be corrupted".to_string(),
            Self::CsvError(_) => "Check the CSV header and column values".to_string(),
            Self::ConfigError { .. } | Self::InvalidConfigValueError { .. } => {
                "Review stackwise.toml and the command line flags".to_string()
            }
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            Self::ValidationError { violations } => {
                let mut message = String::from("The request has invalid fields:");
                for violation in violations {
                    message.push_str("\n  - ");
                    message.push_str(violation);
                }
                message
            }
            Self::NoCapacityError { block_name, .. } => {
                format!("Block '{}' is full", block_name)
            }
            Self::StoreError { .. }
            | Self::IoError(_)
            | Self::SerializationError(_) => format!("The yard store failed: {}", self),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, YardError>;
