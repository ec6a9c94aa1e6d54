//! 安全随机数生成模块
//!
//! 提供密码学安全的随机数生成功能，用于生成设备秘密、盐和一次性验证码。

use rand::{Rng, TryRngCore, rngs::OsRng};

use crate::error::{CryptoError, Error, Result};

/// 生成指定长度的随机字节数组
///
/// 使用操作系统提供的密码学安全随机数生成器 (CSPRNG)
///
/// # Example
///
/// ```rust
/// use passwordless::random::generate_random_bytes;
///
/// let bytes = generate_random_bytes(32).unwrap();
/// assert_eq!(bytes.len(), 32);
/// ```
pub fn generate_random_bytes(length: usize) -> Result<Vec<u8>> {
    let mut bytes = vec![0u8; length];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| Error::Crypto(CryptoError::RngFailed(format!("{:?}", e))))?;
    Ok(bytes)
}

/// 生成指定长度的 Base64 URL 安全随机字符串
///
/// 使用 URL 安全的 Base64 编码（不含填充），可直接嵌入登录链接。
///
/// # Example
///
/// ```rust
/// use passwordless::random::generate_random_base64_url;
///
/// let token = generate_random_base64_url(32).unwrap();
/// assert!(!token.contains('+'));
/// assert!(!token.contains('/'));
/// ```
pub fn generate_random_base64_url(byte_length: usize) -> Result<String> {
    use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
    let bytes = generate_random_bytes(byte_length)?;
    Ok(URL_SAFE_NO_PAD.encode(&bytes))
}

/// 生成设备秘密 `deviceId`
///
/// 使用 32 字节（256 位）的随机数据，使离线猜测不可行。
///
/// # Example
///
/// ```rust
/// use passwordless::random::generate_device_id;
///
/// let device_id = generate_device_id().unwrap();
/// assert!(device_id.len() >= 43); // 32 bytes base64url
/// ```
pub fn generate_device_id() -> Result<String> {
    generate_random_base64_url(32)
}

/// 生成每设备的链接码盐
///
/// 32 字节随机数据，作为链接码派生的 HMAC 密钥。
pub fn generate_link_code_salt() -> Result<String> {
    generate_random_base64_url(32)
}

/// 生成指定位数的数字验证码
///
/// 用户通过邮件/短信收到后手动输入的验证码。
///
/// # Example
///
/// ```rust
/// use passwordless::random::generate_user_input_code;
///
/// let code = generate_user_input_code(6);
/// assert_eq!(code.len(), 6);
/// assert!(code.chars().all(|c| c.is_ascii_digit()));
/// ```
pub fn generate_user_input_code(length: usize) -> String {
    let mut code = String::with_capacity(length);
    for _ in 0..length {
        let digit = rand::rng().random_range(0..10u32);
        code.push(char::from_digit(digit, 10).unwrap_or('0'));
    }
    code
}

/// 生成验证码的公开标识 `codeId`
///
/// 16 字节随机数据的十六进制表示，用于显式删除单个验证码。
pub fn generate_code_id() -> Result<String> {
    let bytes = generate_random_bytes(16)?;
    Ok(bytes.iter().map(|b| format!("{:02x}", b)).collect())
}

/// 常量时间比较两个字节切片
///
/// 用于防止时序攻击
///
/// # Example
///
/// ```rust
/// use passwordless::random::constant_time_compare;
///
/// assert!(constant_time_compare(b"secret_token", b"secret_token"));
/// assert!(!constant_time_compare(b"secret_token", b"other_token!"));
/// ```
pub fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    use subtle::ConstantTimeEq;
    a.ct_eq(b).into()
}

/// 常量时间比较两个字符串
pub fn constant_time_compare_str(a: &str, b: &str) -> bool {
    constant_time_compare(a.as_bytes(), b.as_bytes())
}
