//! Driver error taxonomy and its mapping onto negative errno status codes.

/// Which of the three ordered registration steps failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegistrationStage {
    /// Dynamic numeric (major) id assignment.
    MajorNumber,
    /// Device class creation.
    Class,
    /// Device node creation under the class.
    Node,
}

impl std::fmt::Display for RegistrationStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MajorNumber => write!(f, "major number"),
            Self::Class => write!(f, "device class"),
            Self::Node => write!(f, "device node"),
        }
    }
}

impl std::str::FromStr for RegistrationStage {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "major" | "major_number" => Ok(Self::MajorNumber),
            "class" => Ok(Self::Class),
            "node" | "device" => Ok(Self::Node),
            other => Err(format!("unknown registration stage '{other}'")),
        }
    }
}

/// Every way a driver operation can fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// A registration step failed; earlier steps were already rolled back.
    /// `code` is the host's negative status code.
    Registration { stage: RegistrationStage, code: i32 },
    /// `initialize()` was called while the identity is still registered.
    AlreadyRegistered,
    /// The transfer buffer for a read could not be allocated.
    Allocation { requested: usize },
    /// Copying the buffer to the caller's destination failed.
    TransferFault { requested: usize },
    /// The device identity has been torn down (or never existed).
    NotRegistered,
}

impl DeviceError {
    /// Negative status code as returned across the read/load interface.
    pub fn errno(&self) -> i32 {
        match self {
            Self::Registration { code, .. } => *code,
            Self::AlreadyRegistered => -libc::EBUSY,
            Self::Allocation { .. } => -libc::ENOMEM,
            Self::TransferFault { .. } => -libc::EFAULT,
            Self::NotRegistered => -libc::ENODEV,
        }
    }
}

impl std::fmt::Display for DeviceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Registration { stage, code } => {
                write!(f, "failed to register the {stage} (status {code})")
            }
            Self::AlreadyRegistered => write!(f, "device is already registered"),
            Self::Allocation { requested } => {
                write!(f, "could not allocate a {requested}-byte transfer buffer")
            }
            Self::TransferFault { requested } => {
                write!(f, "bad address: failed to send {requested} random bytes")
            }
            Self::NotRegistered => write!(f, "device is not registered"),
        }
    }
}

impl std::error::Error for DeviceError {}

/// Result alias used throughout the driver core.
pub type Result<T> = std::result::Result<T, DeviceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errno_mapping() {
        assert_eq!(DeviceError::TransferFault { requested: 4 }.errno(), -14);
        assert_eq!(DeviceError::Allocation { requested: 4 }.errno(), -libc::ENOMEM);
        assert_eq!(DeviceError::NotRegistered.errno(), -libc::ENODEV);
        let reg = DeviceError::Registration {
            stage: RegistrationStage::Class,
            code: -libc::EEXIST,
        };
        assert_eq!(reg.errno(), -libc::EEXIST);
    }

    #[test]
    fn test_display_names_stage() {
        let err = DeviceError::Registration {
            stage: RegistrationStage::Node,
            code: -12,
        };
        assert_eq!(err.to_string(), "failed to register the device node (status -12)");
    }

    #[test]
    fn test_parse_stage() {
        assert_eq!("major".parse::<RegistrationStage>(), Ok(RegistrationStage::MajorNumber));
        assert_eq!("class".parse::<RegistrationStage>(), Ok(RegistrationStage::Class));
        assert_eq!("node".parse::<RegistrationStage>(), Ok(RegistrationStage::Node));
        assert!("CLASS".parse::<RegistrationStage>().is_err());
    }
}
