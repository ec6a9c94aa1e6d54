//! # Passwordless
//!
//! 一个无密码认证核心库。
//!
//! ## 功能特性
//!
//! - **验证码签发**: 为邮箱/手机号创建登录设备并签发一次性验证码，
//!   支持向同一设备 resend 追加验证码
//! - **验证码消费**: 验证用户输入的数字验证码或 magic link，
//!   失败计数、过期判断与清理在单个存储事务内原子完成
//! - **暴力破解防护**: 失败次数达到上限即删除设备，常量时间比较防止时序攻击
//! - **只存哈希**: 设备秘密与链接码只以单向哈希落库，存储层无法重建任何验证码
//! - **可插拔存储**: 通过事务化的存储 trait 接入任意后端，内置内存实现
//!
//! ## 设计原则
//!
//! 本库只负责验证码/设备的生命周期逻辑，**不包含** HTTP 层、
//! 邮件/短信发送和登录成功后的会话签发。这些由应用层集成实现。
//!
//! ## 示例
//!
//! ```rust
//! use passwordless::{ConsumeCodeRequest, CreateCodeRequest, PasswordlessConfig, PasswordlessManager};
//!
//! // 创建管理器（默认内存存储）
//! let manager = PasswordlessManager::new(PasswordlessConfig::default());
//!
//! // 用户输入邮箱，签发验证码
//! let created = manager
//!     .create_code(CreateCodeRequest::email("user@example.com"))
//!     .unwrap();
//!
//! // 应用层发送验证码（邮件/短信）
//! // send_email(user_email, &created.user_input_code);
//! // 或构建 magic link:
//! // format!("https://example.com/auth/verify?code={}", created.link_code);
//!
//! // 用户输入收到的验证码
//! let consumed = manager
//!     .consume_code(ConsumeCodeRequest::user_input_code(
//!         &created.device_id,
//!         &created.user_input_code,
//!     ))
//!     .unwrap();
//!
//! // 应用层据此创建/查找用户并建立会话
//! assert_eq!(consumed.email.as_deref(), Some("user@example.com"));
//! ```
//!
//! ## 错误处理
//!
//! 三种业务结局以 [`FlowError`] 的显式变体返回：
//!
//! ```rust
//! use passwordless::{ConsumeCodeRequest, CreateCodeRequest, Error, FlowError, PasswordlessManager};
//!
//! let manager = PasswordlessManager::with_default_config();
//! let created = manager
//!     .create_code(CreateCodeRequest::email("user@example.com").with_user_input_code("111111"))
//!     .unwrap();
//!
//! match manager.consume_code(ConsumeCodeRequest::user_input_code(&created.device_id, "000000")) {
//!     Err(Error::Flow(FlowError::IncorrectCode { failed_attempts, max_attempts })) => {
//!         // 可在同一设备上重试
//!         assert_eq!((failed_attempts, max_attempts), (1, 5));
//!     }
//!     Err(Error::Flow(FlowError::ExpiredCode)) => { /* 引导用户 resend */ }
//!     Err(Error::Flow(FlowError::RestartFlow)) => { /* 丢弃秘密，重新开始登录 */ }
//!     other => panic!("unexpected outcome: {:?}", other),
//! }
//! ```
//!
//! ## 安全考虑
//!
//! - 设备秘密使用 256 位密码学安全随机数
//! - 验证码比较使用常量时间算法，防止时序攻击
//! - 消费成功即删除整个设备，每个已签发的验证码都是一次性的
//! - 并发消费同一验证码时至多一次成功，由存储事务的冲突检测保证

pub mod config;
pub mod crypto;
pub mod error;
pub mod manager;
pub mod model;
pub mod random;
pub mod storage;

pub use error::{CryptoError, Error, FlowError, Result, StorageError, ValidationError};

// ============================================================================
// 配置与数据模型导出
// ============================================================================

pub use config::PasswordlessConfig;
pub use model::{Code, Device};

// ============================================================================
// 管理器导出
// ============================================================================

pub use manager::{
    ConsumeCodeRequest, ConsumedDevice, CreateCodeRequest, CreateCodeResponse, PasswordlessManager,
};

// ============================================================================
// 存储契约导出
// ============================================================================

pub use storage::{
    InMemoryStorage, PasswordlessStorage, PasswordlessTransaction, TxError, TxResult,
};
