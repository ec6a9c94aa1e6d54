//! 秘密派生模块
//!
//! 设备与验证码的全部公开标识都由秘密单向派生而来：
//!
//! - `deviceIdHash = base64url(SHA-256(deviceId))` —— 设备的存储键和
//!   对外标识，拿到它无法还原设备秘密
//! - 链接码秘密 `= base64url(HMAC-SHA256(salt, deviceId || counter || userInputCode))`
//!   —— 计数器保证同一设备的两个验证码即使输入码相同也不会碰撞
//! - `linkCodeHash = base64url(SHA-256(链接码秘密))` —— 存储层只保存哈希，
//!   原始链接码无法被存储层重建
//!
//! Magic link 中携带的单个不透明 token 形如 `<deviceId>.<链接码秘密>`，
//! 两部分都是 base64url，因此 `.` 是安全的分隔符。

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::error::{CryptoError, Error, Result, ValidationError};

type HmacSha256 = Hmac<Sha256>;

/// magic link token 中设备秘密与链接码秘密的分隔符
const LINK_CODE_SEPARATOR: char = '.';

/// 从设备秘密派生公开的 `deviceIdHash`
///
/// # Example
///
/// ```rust
/// use passwordless::crypto::device_id_hash;
///
/// let hash = device_id_hash("my-device-secret");
/// // SHA-256 输出 32 字节，base64url 编码后 43 字符
/// assert_eq!(hash.len(), 43);
/// assert_eq!(hash, device_id_hash("my-device-secret"));
/// ```
pub fn device_id_hash(device_id: &str) -> String {
    let digest = Sha256::digest(device_id.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

/// 派生链接码秘密
///
/// 以设备的 `linkCodeSalt` 为 HMAC 密钥，对
/// `(deviceId, counter, userInputCode)` 做 HMAC-SHA256。
/// 同一输入永远得到相同输出；不同 `counter` 的输出互不碰撞，
/// 因此同一设备上 resend 多个验证码是安全的。
pub fn derive_link_code_secret(
    salt: &str,
    device_id: &str,
    counter: u64,
    user_input_code: &str,
) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(salt.as_bytes())
        .map_err(|e| Error::Crypto(CryptoError::InvalidKey(e.to_string())))?;
    mac.update(device_id.as_bytes());
    mac.update(&counter.to_be_bytes());
    mac.update(user_input_code.as_bytes());
    Ok(URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes()))
}

/// 计算链接码秘密的存储哈希 `linkCodeHash`
pub fn link_code_hash(link_code_secret: &str) -> String {
    let digest = Sha256::digest(link_code_secret.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

/// 组装 magic link 中携带的单个不透明 token
///
/// # Example
///
/// ```rust
/// use passwordless::crypto::{compose_link_code, parse_link_code};
///
/// let token = compose_link_code("device-secret", "code-secret");
/// let (device_id, secret) = parse_link_code(&token).unwrap();
/// assert_eq!(device_id, "device-secret");
/// assert_eq!(secret, "code-secret");
/// ```
pub fn compose_link_code(device_id: &str, link_code_secret: &str) -> String {
    format!("{}{}{}", device_id, LINK_CODE_SEPARATOR, link_code_secret)
}

/// 解析 magic link token，返回 `(deviceId, 链接码秘密)`
///
/// # Errors
///
/// token 不是 `<deviceId>.<秘密>` 形式或任一部分为空时返回
/// [`ValidationError::MalformedLinkCode`]
pub fn parse_link_code(token: &str) -> Result<(String, String)> {
    match token.split_once(LINK_CODE_SEPARATOR) {
        Some((device_id, secret)) if !device_id.is_empty() && !secret.is_empty() => {
            Ok((device_id.to_string(), secret.to_string()))
        }
        _ => Err(Error::Validation(ValidationError::MalformedLinkCode)),
    }
}
