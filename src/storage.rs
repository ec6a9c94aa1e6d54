//! 存储协作方契约
//!
//! 核心逻辑不持有任何进程内共享可变状态，正确性完全依赖存储事务的
//! 冲突检测与重试契约：
//!
//! - 每个操作在单个事务内执行，事务范围是受影响的设备及其验证码
//! - 读操作观察已提交的快照；写操作在事务内缓冲，提交时统一校验并应用
//! - 两个并发事务同时修改同一设备时，至多一个能提交成功，另一个在
//!   [`PasswordlessTransaction::commit`] 处收到 [`TxError::Conflict`]，
//!   由调用方重新获取最新状态后重试（每设备可串行化即可，
//!   不要求全局可串行化）
//! - 冲突是显式的信号值而非异常，重试循环就是一个普通的 `loop`
//!
//! 本模块同时提供 [`InMemoryStorage`]：基于每设备版本号的乐观并发
//! 参考实现，适用于单实例部署和测试环境。生产环境应针对实际数据库
//! 实现这两个 trait。

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::StorageError;
use crate::model::{Code, Device};

/// 事务内操作的结果类型
pub type TxResult<T> = std::result::Result<T, TxError>;

/// 事务内操作的失败方式
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxError {
    /// 写冲突：另一个事务抢先修改了本事务读过的设备，
    /// 整个事务应当放弃并重试
    Conflict,

    /// 存储故障，原样向上传播，不参与重试
    Storage(StorageError),
}

impl From<StorageError> for TxError {
    fn from(err: StorageError) -> Self {
        TxError::Storage(err)
    }
}

/// 存储后端入口
///
/// 唯一职责是打开事务。后端自身的生命周期（连接池的建立与关闭）
/// 由宿主层管理，核心逻辑只接受显式传入的存储句柄。
pub trait PasswordlessStorage: Send + Sync {
    /// 该后端的事务句柄类型
    type Transaction: PasswordlessTransaction;

    /// 打开一个新事务
    fn begin(&self) -> Result<Self::Transaction, StorageError>;
}

/// 单个事务内可用的存储操作
///
/// 读操作观察事务开始后某一时刻的已提交状态；写操作缓冲到
/// [`commit`](Self::commit) 才生效。调用方的流程应当先读后写，
/// 不依赖读到自己未提交的写入。
pub trait PasswordlessTransaction {
    /// 按公开标识查找设备
    fn get_device_by_hash(&mut self, device_id_hash: &str) -> TxResult<Option<Device>>;

    /// 查找绑定某邮箱的所有设备
    fn get_devices_by_email(&mut self, email: &str) -> TxResult<Vec<Device>>;

    /// 查找绑定某手机号的所有设备
    fn get_devices_by_phone_number(&mut self, phone_number: &str) -> TxResult<Vec<Device>>;

    /// 列出设备的全部验证码
    fn get_codes_of_device(&mut self, device_id_hash: &str) -> TxResult<Vec<Code>>;

    /// 按公开标识查找单个验证码
    fn get_code(&mut self, code_id: &str) -> TxResult<Option<Code>>;

    /// 原子地创建设备及其第一个验证码
    fn create_device_with_code(&mut self, device: Device, code: Code) -> TxResult<()>;

    /// 向已有设备追加一个验证码（resend）
    fn create_code_for_device(&mut self, code: Code) -> TxResult<()>;

    /// 将设备的失败验证次数加一
    fn increment_failed_attempts(&mut self, device_id_hash: &str) -> TxResult<()>;

    /// 删除设备并级联删除其全部验证码
    fn delete_device(&mut self, device_id_hash: &str) -> TxResult<()>;

    /// 删除单个验证码
    ///
    /// "最后一个验证码被删除后设备也必须删除"的级联规则由调用方负责。
    fn delete_code(&mut self, code_id: &str) -> TxResult<()>;

    /// 提交事务
    ///
    /// 返回 [`TxError::Conflict`] 表示本事务读过的某个设备已被并发
    /// 事务修改，所有缓冲的写入都被丢弃，调用方应重试。
    fn commit(self) -> TxResult<()>;
}

// ============================================================================
// 内存存储实现
// ============================================================================

/// 内存存储的已提交状态
#[derive(Debug, Default)]
struct InMemoryState {
    /// device_id_hash -> 设备
    devices: HashMap<String, Device>,

    /// code_id -> 验证码
    codes: HashMap<String, Code>,

    /// device_id_hash -> 版本号；设备的任何变更（包括删除和其验证码的
    /// 增删）都会递增版本号，版本号在设备删除后保留
    device_versions: HashMap<String, u64>,
}

impl InMemoryState {
    fn version_of(&self, device_id_hash: &str) -> u64 {
        self.device_versions
            .get(device_id_hash)
            .copied()
            .unwrap_or(0)
    }

    fn bump_version(&mut self, device_id_hash: &str) {
        *self
            .device_versions
            .entry(device_id_hash.to_string())
            .or_insert(0) += 1;
    }
}

/// 内存存储实现
///
/// 每设备版本号的乐观并发控制：事务记录它读过的每个设备的版本号，
/// 提交时逐一校验，任一版本号变化即报告冲突。
/// 适用于单实例部署或测试环境。
///
/// # Example
///
/// ```rust
/// use passwordless::storage::{InMemoryStorage, PasswordlessStorage, PasswordlessTransaction};
///
/// let storage = InMemoryStorage::new();
/// let mut tx = storage.begin().unwrap();
/// assert!(tx.get_device_by_hash("missing").unwrap().is_none());
/// tx.commit().unwrap();
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryStorage {
    state: Arc<Mutex<InMemoryState>>,
}

impl InMemoryStorage {
    /// 创建新的内存存储
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前存储的设备数量
    pub fn device_count(&self) -> usize {
        self.state.lock().unwrap().devices.len()
    }

    /// 当前存储的验证码数量
    pub fn code_count(&self) -> usize {
        self.state.lock().unwrap().codes.len()
    }

    /// 检查存储是否为空
    pub fn is_empty(&self) -> bool {
        let state = self.state.lock().unwrap();
        state.devices.is_empty() && state.codes.is_empty()
    }
}

impl PasswordlessStorage for InMemoryStorage {
    type Transaction = InMemoryTransaction;

    fn begin(&self) -> Result<InMemoryTransaction, StorageError> {
        Ok(InMemoryTransaction {
            state: Arc::clone(&self.state),
            read_versions: HashMap::new(),
            writes: Vec::new(),
        })
    }
}

/// 缓冲的写操作
#[derive(Debug)]
enum WriteOp {
    CreateDeviceWithCode(Device, Code),
    CreateCode(Code),
    IncrementFailedAttempts(String),
    DeleteDevice(String),
    DeleteCode(String),
}

/// [`InMemoryStorage`] 的事务句柄
#[derive(Debug)]
pub struct InMemoryTransaction {
    state: Arc<Mutex<InMemoryState>>,
    /// 本事务读过的设备及其当时的版本号（首次读取时记录）
    read_versions: HashMap<String, u64>,
    writes: Vec<WriteOp>,
}

impl InMemoryTransaction {
    fn record_read(&mut self, state: &InMemoryState, device_id_hash: &str) {
        let version = state.version_of(device_id_hash);
        self.read_versions
            .entry(device_id_hash.to_string())
            .or_insert(version);
    }
}

impl PasswordlessTransaction for InMemoryTransaction {
    fn get_device_by_hash(&mut self, device_id_hash: &str) -> TxResult<Option<Device>> {
        let state = Arc::clone(&self.state);
        let state = state.lock().unwrap();
        self.record_read(&state, device_id_hash);
        Ok(state.devices.get(device_id_hash).cloned())
    }

    fn get_devices_by_email(&mut self, email: &str) -> TxResult<Vec<Device>> {
        let state = Arc::clone(&self.state);
        let state = state.lock().unwrap();
        let devices: Vec<Device> = state
            .devices
            .values()
            .filter(|d| d.email.as_deref() == Some(email))
            .cloned()
            .collect();
        for device in &devices {
            self.record_read(&state, &device.device_id_hash);
        }
        Ok(devices)
    }

    fn get_devices_by_phone_number(&mut self, phone_number: &str) -> TxResult<Vec<Device>> {
        let state = Arc::clone(&self.state);
        let state = state.lock().unwrap();
        let devices: Vec<Device> = state
            .devices
            .values()
            .filter(|d| d.phone_number.as_deref() == Some(phone_number))
            .cloned()
            .collect();
        for device in &devices {
            self.record_read(&state, &device.device_id_hash);
        }
        Ok(devices)
    }

    fn get_codes_of_device(&mut self, device_id_hash: &str) -> TxResult<Vec<Code>> {
        let state = Arc::clone(&self.state);
        let state = state.lock().unwrap();
        self.record_read(&state, device_id_hash);
        let mut codes: Vec<Code> = state
            .codes
            .values()
            .filter(|c| c.device_id_hash == device_id_hash)
            .cloned()
            .collect();
        codes.sort_by_key(|c| c.counter);
        Ok(codes)
    }

    fn get_code(&mut self, code_id: &str) -> TxResult<Option<Code>> {
        let state = Arc::clone(&self.state);
        let state = state.lock().unwrap();
        let code = state.codes.get(code_id).cloned();
        if let Some(code) = &code {
            self.record_read(&state, &code.device_id_hash);
        }
        Ok(code)
    }

    fn create_device_with_code(&mut self, device: Device, code: Code) -> TxResult<()> {
        self.writes.push(WriteOp::CreateDeviceWithCode(device, code));
        Ok(())
    }

    fn create_code_for_device(&mut self, code: Code) -> TxResult<()> {
        self.writes.push(WriteOp::CreateCode(code));
        Ok(())
    }

    fn increment_failed_attempts(&mut self, device_id_hash: &str) -> TxResult<()> {
        self.writes
            .push(WriteOp::IncrementFailedAttempts(device_id_hash.to_string()));
        Ok(())
    }

    fn delete_device(&mut self, device_id_hash: &str) -> TxResult<()> {
        self.writes
            .push(WriteOp::DeleteDevice(device_id_hash.to_string()));
        Ok(())
    }

    fn delete_code(&mut self, code_id: &str) -> TxResult<()> {
        self.writes.push(WriteOp::DeleteCode(code_id.to_string()));
        Ok(())
    }

    fn commit(self) -> TxResult<()> {
        let mut state = self.state.lock().unwrap();

        // 校验读集：本事务读过的设备必须仍处于读取时的版本
        for (device_id_hash, read_version) in &self.read_versions {
            if state.version_of(device_id_hash) != *read_version {
                return Err(TxError::Conflict);
            }
        }

        for write in self.writes {
            match write {
                WriteOp::CreateDeviceWithCode(device, code) => {
                    if state.devices.contains_key(&device.device_id_hash) {
                        return Err(TxError::Storage(StorageError::AlreadyExists(format!(
                            "device {}",
                            device.device_id_hash
                        ))));
                    }
                    let hash = device.device_id_hash.clone();
                    state.devices.insert(hash.clone(), device);
                    state.codes.insert(code.code_id.clone(), code);
                    state.bump_version(&hash);
                }
                WriteOp::CreateCode(code) => {
                    let hash = code.device_id_hash.clone();
                    state.codes.insert(code.code_id.clone(), code);
                    state.bump_version(&hash);
                }
                WriteOp::IncrementFailedAttempts(hash) => {
                    if let Some(device) = state.devices.get_mut(&hash) {
                        device.failed_attempts += 1;
                    }
                    state.bump_version(&hash);
                }
                WriteOp::DeleteDevice(hash) => {
                    state.devices.remove(&hash);
                    state.codes.retain(|_, code| code.device_id_hash != hash);
                    state.bump_version(&hash);
                }
                WriteOp::DeleteCode(code_id) => {
                    if let Some(code) = state.codes.remove(&code_id) {
                        state.bump_version(&code.device_id_hash);
                    }
                }
            }
        }

        Ok(())
    }
}
