//! 统一错误类型模块
//!
//! 提供 passwordless 库中所有操作的错误类型定义。
//!
//! 业务结果（restart-flow / incorrect-code / expired-code）以 [`FlowError`]
//! 的显式变体返回，调用方通过模式匹配决定重试还是重新开始登录流程；
//! 存储层故障以 [`StorageError`] 原样向上传播，绝不会被伪装成业务结果。

use std::fmt;

/// passwordless 库的统一结果类型
pub type Result<T> = std::result::Result<T, Error>;

/// passwordless 库的错误类型
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// 登录流程的业务结果
    Flow(FlowError),

    /// 存储错误
    Storage(StorageError),

    /// 加密错误
    Crypto(CryptoError),

    /// 输入验证错误
    Validation(ValidationError),
}

impl Error {
    /// 创建一个验证错误
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(ValidationError::Custom(msg.into()))
    }

    /// 是否为 restart-flow 结果
    ///
    /// 客户端收到该结果后必须丢弃持有的全部秘密并重新发起登录。
    pub fn is_restart_flow(&self) -> bool {
        matches!(self, Error::Flow(FlowError::RestartFlow))
    }
}

/// 登录流程的业务结果
///
/// 设备/验证码的三种失败结局。它们是协议的一部分而非异常：
/// 上层需要把它们映射成不同的响应状态，客户端据此决定重试或重新开始。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowError {
    /// 整个登录流程失效（设备不存在、失败次数超限、resend 目标丢失），
    /// 必须从头开始
    RestartFlow,

    /// 验证码错误，同一设备上下文可以重试
    IncorrectCode {
        /// 本次失败后的累计失败次数
        failed_attempts: u32,
        /// 配置的最大失败次数
        max_attempts: u32,
    },

    /// 验证码匹配但已过期，客户端可以请求 resend
    ExpiredCode,
}

/// 存储相关错误
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// 连接失败
    ConnectionFailed(String),

    /// 记录已存在
    AlreadyExists(String),

    /// 操作失败
    OperationFailed(String),
}

/// 加密相关错误
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// 随机数生成失败
    RngFailed(String),

    /// 密钥无效
    InvalidKey(String),
}

/// 输入验证相关错误
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// 字段为空
    EmptyField(String),

    /// 无法解析的 magic link token
    MalformedLinkCode,

    /// 自定义验证错误
    Custom(String),
}

// ============================================================================
// Display 实现
// ============================================================================

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Flow(e) => write!(f, "{}", e),
            Error::Storage(e) => write!(f, "Storage error: {}", e),
            Error::Crypto(e) => write!(f, "Crypto error: {}", e),
            Error::Validation(e) => write!(f, "Validation error: {}", e),
        }
    }
}

impl fmt::Display for FlowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowError::RestartFlow => write!(f, "restart flow: login attempt is no longer valid"),
            FlowError::IncorrectCode {
                failed_attempts,
                max_attempts,
            } => write!(
                f,
                "incorrect code: {} of {} attempts used",
                failed_attempts, max_attempts
            ),
            FlowError::ExpiredCode => write!(f, "expired code: request a new one"),
        }
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::ConnectionFailed(msg) => write!(f, "storage connection failed: {}", msg),
            StorageError::AlreadyExists(item) => write!(f, "already exists: {}", item),
            StorageError::OperationFailed(msg) => write!(f, "storage operation failed: {}", msg),
        }
    }
}

impl fmt::Display for CryptoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CryptoError::RngFailed(msg) => write!(f, "random number generation failed: {}", msg),
            CryptoError::InvalidKey(msg) => write!(f, "invalid key: {}", msg),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::EmptyField(field) => write!(f, "field '{}' cannot be empty", field),
            ValidationError::MalformedLinkCode => write!(f, "malformed magic link token"),
            ValidationError::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

// ============================================================================
// std::error::Error 实现
// ============================================================================

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}

impl std::error::Error for FlowError {}
impl std::error::Error for StorageError {}
impl std::error::Error for CryptoError {}
impl std::error::Error for ValidationError {}

// ============================================================================
// From 实现 - 方便错误转换
// ============================================================================

impl From<FlowError> for Error {
    fn from(err: FlowError) -> Self {
        Error::Flow(err)
    }
}

impl From<StorageError> for Error {
    fn from(err: StorageError) -> Self {
        Error::Storage(err)
    }
}

impl From<CryptoError> for Error {
    fn from(err: CryptoError) -> Self {
        Error::Crypto(err)
    }
}

impl From<ValidationError> for Error {
    fn from(err: ValidationError) -> Self {
        Error::Validation(err)
    }
}
