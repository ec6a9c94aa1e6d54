//! 密码学工具模块
//!
//! 提供设备与验证码秘密的单向派生原语。
//!
//! ## 功能
//!
//! - **设备标识派生**: 从设备秘密派生公开的 `deviceIdHash`
//! - **链接码派生**: 基于 HMAC-SHA256 从 (盐, 设备秘密, 计数器, 验证码)
//!   确定性地派生链接码秘密及其存储哈希
//! - **Magic link token**: 单个不透明 token 的编码与解析
//!
//! ## 示例
//!
//! ```rust
//! use passwordless::crypto::{device_id_hash, derive_link_code_secret, link_code_hash};
//!
//! let device_id = "device-secret";
//! let hash = device_id_hash(device_id);
//!
//! // 派生是确定性的
//! let secret = derive_link_code_secret("salt", device_id, 0, "847291").unwrap();
//! assert_eq!(
//!     secret,
//!     derive_link_code_secret("salt", device_id, 0, "847291").unwrap()
//! );
//!
//! // 存储层只保存哈希
//! let stored = link_code_hash(&secret);
//! assert_ne!(stored, secret);
//! ```

pub mod derive;

pub use derive::{
    compose_link_code, derive_link_code_secret, device_id_hash, link_code_hash, parse_link_code,
};
