//! 配置模块
//!
//! 提供验证码签发与验证行为的配置。
//!
//! ## 示例
//!
//! ```rust
//! use passwordless::PasswordlessConfig;
//! use std::time::Duration;
//!
//! let config = PasswordlessConfig::default()
//!     .with_user_input_code_length(6)            // 6 位数字
//!     .with_code_lifetime(Duration::from_secs(900))  // 15 分钟过期
//!     .with_max_code_input_attempts(5);          // 最多失败 5 次
//! ```

/// 无密码认证配置
#[derive(Debug, Clone)]
pub struct PasswordlessConfig {
    /// 用户输入验证码的位数
    pub user_input_code_length: usize,

    /// 验证码有效期
    pub code_lifetime: std::time::Duration,

    /// 针对单个设备允许的最大失败验证次数，达到后设备被删除
    pub max_code_input_attempts: u32,
}

impl Default for PasswordlessConfig {
    fn default() -> Self {
        Self {
            user_input_code_length: 6,
            code_lifetime: std::time::Duration::from_secs(15 * 60), // 15 分钟
            max_code_input_attempts: 5,
        }
    }
}

impl PasswordlessConfig {
    /// 创建新配置
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置用户输入验证码的位数
    pub fn with_user_input_code_length(mut self, length: usize) -> Self {
        assert!(
            (4..=10).contains(&length),
            "user input code length must be between 4 and 10"
        );
        self.user_input_code_length = length;
        self
    }

    /// 设置验证码有效期
    pub fn with_code_lifetime(mut self, lifetime: std::time::Duration) -> Self {
        self.code_lifetime = lifetime;
        self
    }

    /// 设置最大失败验证次数
    pub fn with_max_code_input_attempts(mut self, max: u32) -> Self {
        assert!(max >= 1, "max code input attempts must be at least 1");
        self.max_code_input_attempts = max;
        self
    }

    /// 高安全性配置
    ///
    /// - 8 位验证码
    /// - 5 分钟过期
    /// - 最多失败 3 次
    pub fn high_security() -> Self {
        Self {
            user_input_code_length: 8,
            code_lifetime: std::time::Duration::from_secs(5 * 60),
            max_code_input_attempts: 3,
        }
    }

    /// 宽松配置（适用于开发/测试）
    ///
    /// - 4 位验证码
    /// - 1 小时过期
    /// - 最多失败 10 次
    pub fn relaxed() -> Self {
        Self {
            user_input_code_length: 4,
            code_lifetime: std::time::Duration::from_secs(60 * 60),
            max_code_input_attempts: 10,
        }
    }
}
