use crux_core::capability::{CapabilityContext, Operation};
use crux_core::macros::Capability;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MAX_KEY_LENGTH: usize = 512;
pub const MAX_VALUE_SIZE: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KvKey {
    namespace: KeyNamespace,
    key: String,
}

impl KvKey {
    pub fn new(namespace: KeyNamespace, key: impl Into<String>) -> Result<Self, KvError> {
        let key = key.into();
        Self::validate_key(&key)?;
        Ok(Self { namespace, key })
    }

    /// The string the shell stores under.
    #[must_use]
    pub fn raw(&self) -> String {
        format!("{}:{}", self.namespace.prefix(), self.key)
    }

    fn validate_key(key: &str) -> Result<(), KvError> {
        if key.trim().is_empty() {
            return Err(KvError::InvalidKey {
                key: key.to_string(),
                reason: "key cannot be empty".to_string(),
            });
        }

        if key.len() > MAX_KEY_LENGTH {
            return Err(KvError::InvalidKey {
                key: key.chars().take(50).collect::<String>() + "...",
                reason: format!("key exceeds maximum length of {MAX_KEY_LENGTH} bytes"),
            });
        }

        if key.contains("..") || key.starts_with('/') || key.starts_with('\\') {
            return Err(KvError::InvalidKey {
                key: key.to_string(),
                reason: "key cannot look like a path".to_string(),
            });
        }

        if key.chars().any(char::is_control) {
            return Err(KvError::InvalidKey {
                key: key.escape_default().to_string(),
                reason: "key contains control characters".to_string(),
            });
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyNamespace {
    Cache,
}

impl KeyNamespace {
    #[must_use]
    pub fn prefix(self) -> &'static str {
        match self {
            KeyNamespace::Cache => "cache",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum KvOperation {
    Get { key: String },
    Set { key: String, value: Vec<u8> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum KvOutput {
    Value(Option<Vec<u8>>),
    Written,
}

pub type KvResult = Result<KvOutput, KvError>;

impl Operation for KvOperation {
    type Output = KvResult;
}

#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum KvError {
    #[error("invalid key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("value too large: {size} bytes exceeds maximum of {max} bytes")]
    ValueTooLarge { size: usize, max: usize },

    #[error("storage error: {message} (code: {code:?}, retryable: {retryable})")]
    Storage {
        code: StorageErrorCode,
        message: String,
        retryable: bool,
    },

    #[error("unexpected output for {operation}")]
    UnexpectedOutput { operation: String },
}

impl KvError {
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            KvError::Storage { retryable, .. } => *retryable,
            _ => false,
        }
    }

    pub fn storage(code: StorageErrorCode, message: impl Into<String>) -> Self {
        Self::Storage {
            code,
            message: message.into(),
            retryable: code.is_retryable(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageErrorCode {
    Unknown,
    Corrupted,
    DiskFull,
    PermissionDenied,
    Busy,
    Locked,
    IoError,
}

impl StorageErrorCode {
    #[must_use]
    pub fn is_retryable(self) -> bool {
        matches!(self, StorageErrorCode::Busy | StorageErrorCode::Locked)
    }
}

/// String-keyed blob storage owned by the shell.
#[derive(Capability)]
pub struct KeyValue<Ev> {
    context: CapabilityContext<KvOperation, Ev>,
}

impl<Ev> KeyValue<Ev>
where
    Ev: 'static,
{
    pub fn new(context: CapabilityContext<KvOperation, Ev>) -> Self {
        Self { context }
    }

    pub fn get<F>(&self, key: &KvKey, make_event: F)
    where
        F: FnOnce(Result<Option<Vec<u8>>, KvError>) -> Ev + Send + 'static,
    {
        let operation = KvOperation::Get { key: key.raw() };
        self.context.spawn({
            let context = self.context.clone();
            async move {
                let result = match context.request_from_shell(operation).await {
                    Ok(KvOutput::Value(value)) => Ok(value),
                    Ok(KvOutput::Written) => Err(KvError::UnexpectedOutput {
                        operation: "get".into(),
                    }),
                    Err(e) => Err(e),
                };
                context.update_app(make_event(result));
            }
        });
    }

    pub fn set<F>(&self, key: &KvKey, value: Vec<u8>, make_event: F)
    where
        F: FnOnce(Result<(), KvError>) -> Ev + Send + 'static,
    {
        if value.len() > MAX_VALUE_SIZE {
            let error = KvError::ValueTooLarge {
                size: value.len(),
                max: MAX_VALUE_SIZE,
            };
            let context = self.context.clone();
            self.context.spawn(async move {
                context.update_app(make_event(Err(error)));
            });
            return;
        }

        let operation = KvOperation::Set {
            key: key.raw(),
            value,
        };
        self.context.spawn({
            let context = self.context.clone();
            async move {
                let result = match context.request_from_shell(operation).await {
                    Ok(KvOutput::Written) => Ok(()),
                    Ok(KvOutput::Value(_)) => Err(KvError::UnexpectedOutput {
                        operation: "set".into(),
                    }),
                    Err(e) => Err(e),
                };
                context.update_app(make_event(result));
            }
        });
    }
}
