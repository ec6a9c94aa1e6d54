//! 设备与验证码数据模型
//!
//! 存储层持有这些记录的持久化状态；核心逻辑不保留长期引用，
//! 每次操作都在自己的事务内重新加载，保证看到的是最新状态。
//!
//! ## 不变量
//!
//! - 设备至少关联一个验证码：删除最后一个验证码必须级联删除设备
//! - 设备创建时 email / phone_number 恰好设置一个
//! - `failed_attempts` 只增不减，只有删除设备才能"重置"
//! - 验证码只存 `link_code_hash`，原始链接码永远不落库

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// 一次登录尝试的服务端上下文
///
/// 对外以 `device_id_hash` 标识；设备秘密 `deviceId` 只存在于
/// 客户端持有的链接/响应中，从不持久化。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// 设备秘密的单向哈希，作为存储键和对外标识
    pub device_id_hash: String,

    /// 创建设备时绑定的邮箱
    pub email: Option<String>,

    /// 创建设备时绑定的手机号
    pub phone_number: Option<String>,

    /// 每设备随机盐，作为链接码派生的 HMAC 密钥
    pub link_code_salt: String,

    /// 针对该设备的累计失败验证次数
    pub failed_attempts: u32,
}

impl Device {
    /// 返回设备绑定的联系方式 `(email, phone_number)`
    pub fn contact(&self) -> (Option<&str>, Option<&str>) {
        (self.email.as_deref(), self.phone_number.as_deref())
    }
}

/// 一个已签发的一次性验证码
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Code {
    /// 公开标识，用于显式删除单个验证码
    pub code_id: String,

    /// 所属设备
    pub device_id_hash: String,

    /// 链接码秘密的单向哈希
    pub link_code_hash: String,

    /// 设备内严格递增的计数器，参与链接码派生
    pub counter: u64,

    /// 签发时间，配合配置的有效期计算过期
    pub created_at: DateTime<Utc>,
}

impl Code {
    /// 按给定有效期判断验证码是否已过期
    pub fn is_expired(&self, lifetime: std::time::Duration, now: DateTime<Utc>) -> bool {
        let lifetime = Duration::seconds(lifetime.as_secs() as i64);
        now > self.created_at + lifetime
    }
}
