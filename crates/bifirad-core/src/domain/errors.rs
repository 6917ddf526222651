pub type SimResult<T> = Result<T, BifiError>;
pub type GeometryResult<T> = SimResult<T>;
pub type ParserResult<T> = SimResult<T>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BifiErrorCategory {
    Success,
    InputValidationError,
    IoSystemError,
    ComputationError,
    InternalError,
}

impl BifiErrorCategory {
    pub const fn exit_status(self) -> ExitStatus {
        match self {
            Self::Success => ExitStatus {
                exit_code: 0,
                rust_category: "Success",
                severity_class: "SUCCESS",
            },
            Self::InputValidationError => ExitStatus {
                exit_code: 2,
                rust_category: "InputValidationError",
                severity_class: "INPUT_FATAL",
            },
            Self::IoSystemError => ExitStatus {
                exit_code: 3,
                rust_category: "IoSystemError",
                severity_class: "IO_FATAL",
            },
            Self::ComputationError => ExitStatus {
                exit_code: 4,
                rust_category: "ComputationError",
                severity_class: "RUN_FATAL",
            },
            Self::InternalError => ExitStatus {
                exit_code: 5,
                rust_category: "InternalError",
                severity_class: "SYS_FATAL",
            },
        }
    }

    pub const fn exit_code(self) -> i32 {
        self.exit_status().exit_code
    }

    pub const fn rust_category(self) -> &'static str {
        self.exit_status().rust_category
    }

    pub const fn severity_class(self) -> &'static str {
        self.exit_status().severity_class
    }

    pub const fn is_fatal(self) -> bool {
        !matches!(self, Self::Success)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitStatus {
    pub exit_code: i32,
    pub rust_category: &'static str,
    pub severity_class: &'static str,
}

/// Structured failure raised anywhere in the simulation pipeline.
///
/// The placeholder is a stable dotted identifier (`INPUT.SCENE_PITCH`,
/// `IO.WEATHER_READ`, ...) that scripts can match on; the message is free text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{} [{}] {}", .category.rust_category(), .placeholder, .message)]
pub struct BifiError {
    category: BifiErrorCategory,
    placeholder: &'static str,
    message: String,
}

impl BifiError {
    pub fn new(
        category: BifiErrorCategory,
        placeholder: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            category,
            placeholder,
            message: message.into(),
        }
    }

    pub fn input_validation(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(
            BifiErrorCategory::InputValidationError,
            placeholder,
            message,
        )
    }

    pub fn io_system(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(BifiErrorCategory::IoSystemError, placeholder, message)
    }

    pub fn computation(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(BifiErrorCategory::ComputationError, placeholder, message)
    }

    pub fn internal(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(BifiErrorCategory::InternalError, placeholder, message)
    }

    pub const fn category(&self) -> BifiErrorCategory {
        self.category
    }

    pub const fn placeholder(&self) -> &'static str {
        self.placeholder
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn exit_code(&self) -> i32 {
        self.category.exit_code()
    }

    pub fn diagnostic_line(&self) -> String {
        let severity = if self.category.is_fatal() {
            "ERROR"
        } else {
            "INFO"
        };
        format!("{}: [{}] {}", severity, self.placeholder, self.message)
    }

    pub fn fatal_exit_line(&self) -> Option<String> {
        self.category
            .is_fatal()
            .then(|| format!("FATAL EXIT CODE: {}", self.exit_code()))
    }
}

#[cfg(test)]
mod tests {
    use super::{BifiError, BifiErrorCategory};

    #[test]
    fn exit_mapping_is_stable() {
        let cases = [
            (BifiErrorCategory::Success, 0, "SUCCESS"),
            (BifiErrorCategory::InputValidationError, 2, "INPUT_FATAL"),
            (BifiErrorCategory::IoSystemError, 3, "IO_FATAL"),
            (BifiErrorCategory::ComputationError, 4, "RUN_FATAL"),
            (BifiErrorCategory::InternalError, 5, "SYS_FATAL"),
        ];

        for (category, exit_code, severity_class) in cases {
            assert_eq!(category.exit_code(), exit_code);
            assert_eq!(category.severity_class(), severity_class);
        }
        assert!(!BifiErrorCategory::Success.is_fatal());
    }

    #[test]
    fn fatal_error_renders_diagnostic_lines() {
        let error = BifiError::input_validation(
            "INPUT.SCENE_PITCH",
            "scene needs either 'pitch' or 'gcr'",
        );

        assert_eq!(error.exit_code(), 2);
        assert_eq!(
            error.diagnostic_line(),
            "ERROR: [INPUT.SCENE_PITCH] scene needs either 'pitch' or 'gcr'"
        );
        assert_eq!(
            error.fatal_exit_line().as_deref(),
            Some("FATAL EXIT CODE: 2")
        );
        assert_eq!(
            error.to_string(),
            "InputValidationError [INPUT.SCENE_PITCH] scene needs either 'pitch' or 'gcr'"
        );
        let boxed: Box<dyn std::error::Error> = Box::new(error);
        assert!(boxed.source().is_none());
    }
}
