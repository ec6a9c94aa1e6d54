//! 无密码认证管理器
//!
//! 提供验证码生命周期的三个入口：签发 ([`create_code`])、消费
//! ([`consume_code`]) 与删除 ([`remove_code`])。
//!
//! [`create_code`]: PasswordlessManager::create_code
//! [`consume_code`]: PasswordlessManager::consume_code
//! [`remove_code`]: PasswordlessManager::remove_code
//!
//! ## 工作流程
//!
//! 1. 用户提交邮箱或手机号，[`PasswordlessManager::create_code`] 创建
//!    设备并签发第一个验证码
//! 2. 应用层把数字验证码和 magic link 通过邮件/短信发送给用户
//! 3. 用户没收到时请求 resend：`create_code` 携带 `deviceId` 向同一设备
//!    追加新验证码，已发出的旧验证码保持有效
//! 4. 用户输入验证码或点击链接，[`PasswordlessManager::consume_code`]
//!    在一个存储事务内完成验证、失败计数与清理
//! 5. 验证成功后设备连同全部验证码被删除（一次性使用），返回的联系方式
//!    交由应用层创建或查找用户并建立会话
//!
//! ## 示例
//!
//! ```rust
//! use passwordless::{ConsumeCodeRequest, CreateCodeRequest, PasswordlessConfig, PasswordlessManager};
//!
//! let manager = PasswordlessManager::new(PasswordlessConfig::default());
//!
//! // 签发验证码
//! let created = manager
//!     .create_code(CreateCodeRequest::email("user@example.com"))
//!     .unwrap();
//!
//! // 应用层发送 created.user_input_code / created.link_code
//!
//! // 用户输入验证码
//! let consumed = manager
//!     .consume_code(ConsumeCodeRequest::user_input_code(
//!         &created.device_id,
//!         &created.user_input_code,
//!     ))
//!     .unwrap();
//! assert_eq!(consumed.email.as_deref(), Some("user@example.com"));
//! ```
//!
//! ## 并发语义
//!
//! 每次调用都在单个存储事务内执行并在写冲突时携带最新状态重试，
//! 因此同一个有效验证码被并发消费时，恰好一个调用成功，
//! 其余调用观察到设备已删除并得到 restart-flow。

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use crate::config::PasswordlessConfig;
use crate::crypto::{
    compose_link_code, derive_link_code_secret, device_id_hash, link_code_hash, parse_link_code,
};
use crate::error::{FlowError, Result, ValidationError};
use crate::model::{Code, Device};
use crate::random::{
    constant_time_compare_str, generate_code_id, generate_device_id, generate_link_code_salt,
    generate_user_input_code,
};
use crate::storage::{
    InMemoryStorage, PasswordlessStorage, PasswordlessTransaction, TxError, TxResult,
};

/// 事务闭包的返回类型：外层区分冲突/存储故障，内层承载业务结局。
///
/// 业务结局作为值返回，保证失败计数、级联删除等变更先提交、
/// 结局后浮出，而不是靠错误传播中断事务。
type FlowStep<T> = TxResult<Result<T>>;

// ============================================================================
// 请求与响应类型
// ============================================================================

/// 签发验证码的目标
#[derive(Debug, Clone)]
enum CreateCodeTarget {
    /// 为邮箱创建新设备
    Email(String),

    /// 为手机号创建新设备
    PhoneNumber(String),

    /// 向已有设备追加验证码（resend）
    Resend { device_id: String },
}

/// 签发验证码的请求
///
/// 三个构造函数互斥地指定目标，"同时提供邮箱和设备"这类调用错误
/// 在类型上不可表达。
///
/// # Example
///
/// ```rust
/// use passwordless::CreateCodeRequest;
///
/// let by_email = CreateCodeRequest::email("user@example.com");
/// let by_phone = CreateCodeRequest::phone_number("+442071838750");
/// let resend = CreateCodeRequest::resend("device-secret");
///
/// // 测试和定制集成可以指定验证码而非随机生成
/// let fixed = CreateCodeRequest::email("user@example.com").with_user_input_code("847291");
/// ```
#[derive(Debug, Clone)]
pub struct CreateCodeRequest {
    target: CreateCodeTarget,
    user_input_code: Option<String>,
}

impl CreateCodeRequest {
    /// 为邮箱创建新设备并签发第一个验证码
    pub fn email(email: impl Into<String>) -> Self {
        Self {
            target: CreateCodeTarget::Email(email.into()),
            user_input_code: None,
        }
    }

    /// 为手机号创建新设备并签发第一个验证码
    pub fn phone_number(phone_number: impl Into<String>) -> Self {
        Self {
            target: CreateCodeTarget::PhoneNumber(phone_number.into()),
            user_input_code: None,
        }
    }

    /// 向 `device_id` 对应的已有设备追加验证码
    pub fn resend(device_id: impl Into<String>) -> Self {
        Self {
            target: CreateCodeTarget::Resend {
                device_id: device_id.into(),
            },
            user_input_code: None,
        }
    }

    /// 指定用户输入验证码，覆盖随机生成
    pub fn with_user_input_code(mut self, code: impl Into<String>) -> Self {
        self.user_input_code = Some(code.into());
        self
    }
}

/// 签发验证码的结果
///
/// 包含客户端展示/发送验证码所需的全部值。存储层只保存派生哈希，
/// 没有这里的秘密无法重建任何验证码。
#[derive(Debug, Clone)]
pub struct CreateCodeResponse {
    /// 设备秘密，只交给发起登录的客户端
    pub device_id: String,

    /// 设备的公开标识
    pub device_id_hash: String,

    /// 新验证码的公开标识
    pub code_id: String,

    /// 用户手动输入的数字验证码
    pub user_input_code: String,

    /// 嵌入 magic link 的不透明 token
    pub link_code: String,

    /// 签发时间
    pub created_at: DateTime<Utc>,

    /// 过期时间
    pub expires_at: DateTime<Utc>,
}

/// 消费验证码的请求
///
/// 两种提交方式：设备秘密加手动输入的验证码，或 magic link 中的
/// 单个不透明 token。
#[derive(Debug, Clone)]
pub enum ConsumeCodeRequest {
    /// 设备秘密 + 用户输入的验证码
    UserInputCode {
        /// 签发时返回给客户端的设备秘密
        device_id: String,
        /// 用户输入的数字验证码
        user_input_code: String,
    },

    /// magic link 中携带的不透明 token
    LinkCode(String),
}

impl ConsumeCodeRequest {
    /// 以设备秘密和用户输入的验证码构造请求
    pub fn user_input_code(
        device_id: impl Into<String>,
        user_input_code: impl Into<String>,
    ) -> Self {
        ConsumeCodeRequest::UserInputCode {
            device_id: device_id.into(),
            user_input_code: user_input_code.into(),
        }
    }

    /// 以 magic link token 构造请求
    pub fn link_code(token: impl Into<String>) -> Self {
        ConsumeCodeRequest::LinkCode(token.into())
    }
}

/// 成功消费后返回的设备联系方式
///
/// 核心逻辑到此为止；调用方据此创建或查找用户账号并建立会话。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumedDevice {
    /// 设备绑定的邮箱
    pub email: Option<String>,

    /// 设备绑定的手机号
    pub phone_number: Option<String>,
}

// ============================================================================
// 管理器
// ============================================================================

/// 无密码认证管理器
///
/// 对泛型存储后端执行验证码生命周期操作。存储句柄显式传入，
/// 生命周期由宿主层管理。
pub struct PasswordlessManager<S: PasswordlessStorage = InMemoryStorage> {
    storage: S,
    config: PasswordlessConfig,
}

impl PasswordlessManager<InMemoryStorage> {
    /// 使用默认内存存储创建管理器
    pub fn new(config: PasswordlessConfig) -> Self {
        Self {
            storage: InMemoryStorage::new(),
            config,
        }
    }

    /// 使用默认配置创建管理器
    pub fn with_default_config() -> Self {
        Self::new(PasswordlessConfig::default())
    }
}

impl<S: PasswordlessStorage> PasswordlessManager<S> {
    /// 使用自定义存储创建管理器
    pub fn with_storage(storage: S, config: PasswordlessConfig) -> Self {
        Self { storage, config }
    }

    /// 获取配置
    pub fn config(&self) -> &PasswordlessConfig {
        &self.config
    }

    /// 获取存储句柄
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// 事务重试循环
    ///
    /// 闭包在新事务上执行；提交冲突时丢弃所有缓冲写入并携带最新状态
    /// 重试。重试次数不设上限：每次尝试都是幂等的，且无论重试多少次
    /// 至多一次成功。
    fn run_in_transaction<T>(
        &self,
        mut f: impl FnMut(&mut S::Transaction) -> FlowStep<T>,
    ) -> Result<T> {
        loop {
            let mut tx = self.storage.begin()?;
            match f(&mut tx) {
                Ok(outcome) => match tx.commit() {
                    Ok(()) => return outcome,
                    Err(TxError::Conflict) => continue,
                    Err(TxError::Storage(e)) => return Err(e.into()),
                },
                Err(TxError::Conflict) => continue,
                Err(TxError::Storage(e)) => return Err(e.into()),
            }
        }
    }

    // ------------------------------------------------------------------------
    // 签发
    // ------------------------------------------------------------------------

    /// 签发验证码
    ///
    /// 新设备路径（邮箱/手机号）：生成设备秘密与盐，签发计数器为 0 的
    /// 第一个验证码，设备和验证码在一个事务内一起落库。
    ///
    /// resend 路径：按设备秘密加载设备，追加一个计数器递增的新验证码；
    /// 设备不存在时返回 restart-flow（客户端持有的设备引用已失效，
    /// 必须重新开始登录）。
    ///
    /// # Errors
    ///
    /// - [`FlowError::RestartFlow`] - resend 目标设备不存在
    /// - [`ValidationError::EmptyField`] - 邮箱/手机号/设备秘密为空
    pub fn create_code(&self, request: CreateCodeRequest) -> Result<CreateCodeResponse> {
        match request.target {
            CreateCodeTarget::Email(email) => {
                if email.is_empty() {
                    return Err(ValidationError::EmptyField("email".to_string()).into());
                }
                self.create_device(Some(email), None, request.user_input_code)
            }
            CreateCodeTarget::PhoneNumber(phone_number) => {
                if phone_number.is_empty() {
                    return Err(ValidationError::EmptyField("phoneNumber".to_string()).into());
                }
                self.create_device(None, Some(phone_number), request.user_input_code)
            }
            CreateCodeTarget::Resend { device_id } => {
                if device_id.is_empty() {
                    return Err(ValidationError::EmptyField("deviceId".to_string()).into());
                }
                self.append_code(&device_id, request.user_input_code)
            }
        }
    }

    /// 新设备路径：设备 + 第一个验证码
    fn create_device(
        &self,
        email: Option<String>,
        phone_number: Option<String>,
        user_input_code: Option<String>,
    ) -> Result<CreateCodeResponse> {
        let device_id = generate_device_id()?;
        let device_id_hash = device_id_hash(&device_id);
        let link_code_salt = generate_link_code_salt()?;
        let user_input_code = user_input_code
            .unwrap_or_else(|| generate_user_input_code(self.config.user_input_code_length));

        let secret = derive_link_code_secret(&link_code_salt, &device_id, 0, &user_input_code)?;
        let code_id = generate_code_id()?;
        let created_at = Utc::now();

        let device = Device {
            device_id_hash: device_id_hash.clone(),
            email,
            phone_number,
            link_code_salt,
            failed_attempts: 0,
        };
        let code = Code {
            code_id: code_id.clone(),
            device_id_hash: device_id_hash.clone(),
            link_code_hash: link_code_hash(&secret),
            counter: 0,
            created_at,
        };

        self.run_in_transaction(|tx| {
            tx.create_device_with_code(device.clone(), code.clone())?;
            Ok(Ok(()))
        })?;

        debug!(device_id_hash = %device_id_hash, "created device with first code");

        Ok(CreateCodeResponse {
            link_code: compose_link_code(&device_id, &secret),
            device_id,
            device_id_hash,
            code_id,
            user_input_code,
            created_at,
            expires_at: created_at + self.lifetime(),
        })
    }

    /// resend 路径：向已有设备追加验证码
    fn append_code(
        &self,
        device_id: &str,
        user_input_code: Option<String>,
    ) -> Result<CreateCodeResponse> {
        let device_id_hash = device_id_hash(device_id);
        let user_input_code = user_input_code
            .unwrap_or_else(|| generate_user_input_code(self.config.user_input_code_length));

        let response = self.run_in_transaction(|tx| {
            let device = match tx.get_device_by_hash(&device_id_hash)? {
                Some(device) => device,
                None => return Ok(Err(FlowError::RestartFlow.into())),
            };
            let codes = tx.get_codes_of_device(&device_id_hash)?;

            // 计数器严格递增，同一设备的验证码哈希永不碰撞
            let counter = codes.iter().map(|c| c.counter).max().map_or(0, |c| c + 1);

            let secret = match derive_link_code_secret(
                &device.link_code_salt,
                device_id,
                counter,
                &user_input_code,
            ) {
                Ok(secret) => secret,
                Err(err) => return Ok(Err(err)),
            };
            let code_id = match generate_code_id() {
                Ok(code_id) => code_id,
                Err(err) => return Ok(Err(err)),
            };
            let created_at = Utc::now();

            tx.create_code_for_device(Code {
                code_id: code_id.clone(),
                device_id_hash: device_id_hash.clone(),
                link_code_hash: link_code_hash(&secret),
                counter,
                created_at,
            })?;

            Ok(Ok(CreateCodeResponse {
                device_id: device_id.to_string(),
                device_id_hash: device_id_hash.clone(),
                code_id,
                user_input_code: user_input_code.clone(),
                link_code: compose_link_code(device_id, &secret),
                created_at,
                expires_at: created_at + self.lifetime(),
            }))
        })?;

        debug!(device_id_hash = %response.device_id_hash, "appended resend code to device");
        Ok(response)
    }

    // ------------------------------------------------------------------------
    // 消费
    // ------------------------------------------------------------------------

    /// 消费验证码
    ///
    /// 整个验证-计数-清理序列在单个事务内执行，对同一设备的并发消费/
    /// 签发是原子的。
    ///
    /// 成功时删除整个设备（级联删除其全部验证码，保证每个已签发的
    /// 验证码都是一次性的），返回设备绑定的联系方式。
    ///
    /// # Errors
    ///
    /// - [`FlowError::RestartFlow`] - 设备不存在或失败次数达到上限
    /// - [`FlowError::IncorrectCode`] - 验证码不匹配，可在同一设备上重试
    /// - [`FlowError::ExpiredCode`] - 验证码匹配但已过期，可请求 resend
    /// - [`ValidationError::MalformedLinkCode`] - magic link token 无法解析
    pub fn consume_code(&self, request: ConsumeCodeRequest) -> Result<ConsumedDevice> {
        let (device_id, presented) = match request {
            ConsumeCodeRequest::UserInputCode {
                device_id,
                user_input_code,
            } => {
                if device_id.is_empty() {
                    return Err(ValidationError::EmptyField("deviceId".to_string()).into());
                }
                if user_input_code.is_empty() {
                    return Err(ValidationError::EmptyField("userInputCode".to_string()).into());
                }
                (device_id, Presented::UserInput(user_input_code))
            }
            ConsumeCodeRequest::LinkCode(token) => {
                let (device_id, secret) = parse_link_code(&token)?;
                (device_id, Presented::LinkSecret(secret))
            }
        };

        let device_id_hash = device_id_hash(&device_id);
        let max_attempts = self.config.max_code_input_attempts;
        let lifetime = self.config.code_lifetime;

        self.run_in_transaction(|tx| {
            let device = match tx.get_device_by_hash(&device_id_hash)? {
                Some(device) => device,
                None => return Ok(Err(FlowError::RestartFlow.into())),
            };
            let codes = tx.get_codes_of_device(&device_id_hash)?;
            let now = Utc::now();

            let mut matched: Option<Code> = None;
            for code in &codes {
                let candidate_hash = match &presented {
                    Presented::UserInput(input) => {
                        match derive_link_code_secret(
                            &device.link_code_salt,
                            &device_id,
                            code.counter,
                            input,
                        ) {
                            Ok(secret) => link_code_hash(&secret),
                            Err(err) => return Ok(Err(err)),
                        }
                    }
                    Presented::LinkSecret(secret) => link_code_hash(secret),
                };
                if constant_time_compare_str(&candidate_hash, &code.link_code_hash) {
                    matched = Some(code.clone());
                    break;
                }
            }

            match matched {
                None => {
                    let failed_attempts = device.failed_attempts + 1;
                    if failed_attempts >= max_attempts {
                        // 达到失败上限：删除设备，整个登录流程作废
                        tx.delete_device(&device_id_hash)?;
                        warn!(
                            device_id_hash = %device_id_hash,
                            failed_attempts,
                            "failed attempt limit reached, deleting device"
                        );
                        Ok(Err(FlowError::RestartFlow.into()))
                    } else {
                        tx.increment_failed_attempts(&device_id_hash)?;
                        Ok(Err(FlowError::IncorrectCode {
                            failed_attempts,
                            max_attempts,
                        }
                        .into()))
                    }
                }
                Some(code) if code.is_expired(lifetime, now) => {
                    // 过期不是错误猜测，不计入失败次数；只有当它是设备的
                    // 最后一个验证码时才删除（设备不能比最后一个验证码活得久）
                    if codes.len() == 1 {
                        tx.delete_device(&device_id_hash)?;
                    }
                    Ok(Err(FlowError::ExpiredCode.into()))
                }
                Some(_) => {
                    // 删除整个设备，所有已签发的验证码一次性失效
                    tx.delete_device(&device_id_hash)?;
                    debug!(device_id_hash = %device_id_hash, "code consumed, device deleted");
                    Ok(Ok(ConsumedDevice {
                        email: device.email,
                        phone_number: device.phone_number,
                    }))
                }
            }
        })
    }

    // ------------------------------------------------------------------------
    // 删除
    // ------------------------------------------------------------------------

    /// 删除单个验证码
    ///
    /// 验证码不存在时也报告成功（幂等删除）。被删除的验证码是设备的
    /// 最后一个时，设备在同一事务内一并删除。
    pub fn remove_code(&self, code_id: &str) -> Result<()> {
        self.run_in_transaction(|tx| {
            let code = match tx.get_code(code_id)? {
                Some(code) => code,
                // 幂等：不存在视为已删除
                None => return Ok(Ok(())),
            };
            let codes = tx.get_codes_of_device(&code.device_id_hash)?;
            if codes.len() <= 1 {
                tx.delete_device(&code.device_id_hash)?;
                debug!(
                    device_id_hash = %code.device_id_hash,
                    "last code removed, deleting device"
                );
            } else {
                tx.delete_code(code_id)?;
            }
            Ok(Ok(()))
        })
    }

    // ------------------------------------------------------------------------
    // 查询
    // ------------------------------------------------------------------------

    /// 列出绑定某邮箱的所有设备
    pub fn list_devices_by_email(&self, email: &str) -> Result<Vec<Device>> {
        self.run_in_transaction(|tx| Ok(Ok(tx.get_devices_by_email(email)?)))
    }

    /// 列出绑定某手机号的所有设备
    pub fn list_devices_by_phone_number(&self, phone_number: &str) -> Result<Vec<Device>> {
        self.run_in_transaction(|tx| Ok(Ok(tx.get_devices_by_phone_number(phone_number)?)))
    }

    /// 列出设备的全部验证码
    pub fn list_codes_of_device(&self, device_id_hash: &str) -> Result<Vec<Code>> {
        self.run_in_transaction(|tx| Ok(Ok(tx.get_codes_of_device(device_id_hash)?)))
    }

    fn lifetime(&self) -> Duration {
        Duration::seconds(self.config.code_lifetime.as_secs() as i64)
    }
}

/// 消费请求解析后的候选秘密
enum Presented {
    /// 用户手动输入的验证码，需按每个存储验证码的计数器派生再比较
    UserInput(String),

    /// magic link 中的链接码秘密，直接哈希比较
    LinkSecret(String),
}
