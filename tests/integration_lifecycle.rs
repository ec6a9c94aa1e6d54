//! 验证码生命周期集成测试
//!
//! 覆盖签发 → 发送 → 消费/删除的完整流程，包括 resend、
//! 失败计数和并发消费场景。

use std::sync::{Arc, Barrier};
use std::thread;

use passwordless::{
    ConsumeCodeRequest, CreateCodeRequest, Error, FlowError, PasswordlessConfig,
    PasswordlessManager,
};

// ============================================================================
// 签发与消费
// ============================================================================

/// 测试基本的邮箱登录流程：签发后立即用返回的验证码消费，恰好成功一次
#[test]
fn test_email_login_flow() {
    let manager = PasswordlessManager::new(PasswordlessConfig::default());

    let created = manager
        .create_code(CreateCodeRequest::email("user@example.com"))
        .unwrap();

    assert!(!created.device_id.is_empty());
    assert!(!created.link_code.is_empty());
    assert_eq!(created.user_input_code.len(), 6);

    let consumed = manager
        .consume_code(ConsumeCodeRequest::user_input_code(
            &created.device_id,
            &created.user_input_code,
        ))
        .unwrap();
    assert_eq!(consumed.email.as_deref(), Some("user@example.com"));
    assert_eq!(consumed.phone_number, None);

    // 同一验证码再次消费：设备已删除，必须重新开始登录
    let err = manager
        .consume_code(ConsumeCodeRequest::user_input_code(
            &created.device_id,
            &created.user_input_code,
        ))
        .unwrap_err();
    assert!(err.is_restart_flow());
}

/// 测试手机号登录流程走 magic link
#[test]
fn test_phone_magic_link_flow() {
    let manager = PasswordlessManager::new(PasswordlessConfig::default());

    let created = manager
        .create_code(CreateCodeRequest::phone_number("+442071838750"))
        .unwrap();

    let consumed = manager
        .consume_code(ConsumeCodeRequest::link_code(&created.link_code))
        .unwrap();
    assert_eq!(consumed.phone_number.as_deref(), Some("+442071838750"));
    assert_eq!(consumed.email, None);

    let err = manager
        .consume_code(ConsumeCodeRequest::link_code(&created.link_code))
        .unwrap_err();
    assert!(err.is_restart_flow());
}

// ============================================================================
// Resend
// ============================================================================

/// 测试 resend 使设备的验证码数量加一，设备标识、联系方式和失败计数不变
#[test]
fn test_resend_keeps_device_intact() {
    let manager = PasswordlessManager::new(PasswordlessConfig::default());

    let created = manager
        .create_code(CreateCodeRequest::email("user@example.com"))
        .unwrap();

    // 制造一次失败，确认 resend 不会动失败计数
    let _ = manager
        .consume_code(ConsumeCodeRequest::user_input_code(
            &created.device_id,
            "999999",
        ))
        .unwrap_err();

    let resent = manager
        .create_code(CreateCodeRequest::resend(&created.device_id))
        .unwrap();
    assert_eq!(resent.device_id_hash, created.device_id_hash);

    let devices = manager.list_devices_by_email("user@example.com").unwrap();
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].device_id_hash, created.device_id_hash);
    assert_eq!(devices[0].email.as_deref(), Some("user@example.com"));
    assert_eq!(devices[0].failed_attempts, 1);

    let codes = manager
        .list_codes_of_device(&created.device_id_hash)
        .unwrap();
    assert_eq!(codes.len(), 2);

    // 新旧验证码都能定位到同一设备
    for code in &codes {
        assert_eq!(code.device_id_hash, created.device_id_hash);
    }
}

/// 测试对不存在的设备 resend 必须 restart-flow
#[test]
fn test_resend_unknown_device() {
    let manager = PasswordlessManager::new(PasswordlessConfig::default());

    let err = manager
        .create_code(CreateCodeRequest::resend(
            "JWlE/V+Uz8qgaTyFkzOI4FfRrU6fBH85ve2GunoPpz0=",
        ))
        .unwrap_err();
    assert!(err.is_restart_flow());
}

// ============================================================================
// 失败计数
// ============================================================================

/// 测试错误验证码逐次累加失败计数，达到上限后设备删除
#[test]
fn test_failed_attempts_accounting() {
    let config = PasswordlessConfig::default().with_max_code_input_attempts(3);
    let manager = PasswordlessManager::new(config);

    let created = manager
        .create_code(CreateCodeRequest::email("user@example.com").with_user_input_code("111111"))
        .unwrap();

    for expected in 1..=2u32 {
        let err = manager
            .consume_code(ConsumeCodeRequest::user_input_code(
                &created.device_id,
                "000000",
            ))
            .unwrap_err();
        assert_eq!(
            err,
            Error::Flow(FlowError::IncorrectCode {
                failed_attempts: expected,
                max_attempts: 3,
            })
        );

        let devices = manager.list_devices_by_email("user@example.com").unwrap();
        assert_eq!(devices[0].failed_attempts, expected);
    }

    // 第三次失败达到上限：设备删除，restart-flow
    let err = manager
        .consume_code(ConsumeCodeRequest::user_input_code(
            &created.device_id,
            "000000",
        ))
        .unwrap_err();
    assert!(err.is_restart_flow());
    assert!(
        manager
            .list_devices_by_email("user@example.com")
            .unwrap()
            .is_empty()
    );
}

// ============================================================================
// 删除
// ============================================================================

/// 测试删除设备仅剩的验证码时设备一并删除
///
/// 场景：手机号 +442071838750 的设备上有一个 codeId 为 "codeId" 的
/// 验证码，删除后验证码和设备都查不到。
#[test]
fn test_remove_last_code_removes_device() {
    use chrono::Utc;
    use passwordless::storage::{PasswordlessStorage, PasswordlessTransaction};
    use passwordless::{Code, Device};

    let manager = PasswordlessManager::new(PasswordlessConfig::default());

    // 直接通过存储契约注入指定 codeId 的验证码
    let device_id_hash = passwordless::crypto::device_id_hash("device-secret");
    let mut tx = manager.storage().begin().unwrap();
    tx.create_device_with_code(
        Device {
            device_id_hash: device_id_hash.clone(),
            email: None,
            phone_number: Some("+442071838750".to_string()),
            link_code_salt: "salt".to_string(),
            failed_attempts: 0,
        },
        Code {
            code_id: "codeId".to_string(),
            device_id_hash: device_id_hash.clone(),
            link_code_hash: "linkCodeHash".to_string(),
            counter: 0,
            created_at: Utc::now(),
        },
    )
    .unwrap();
    tx.commit().unwrap();

    manager.remove_code("codeId").unwrap();

    let mut tx = manager.storage().begin().unwrap();
    assert!(tx.get_code("codeId").unwrap().is_none());
    assert!(tx.get_device_by_hash(&device_id_hash).unwrap().is_none());
    tx.commit().unwrap();
}

/// 测试删除不存在的验证码是幂等成功且不改动任何状态
#[test]
fn test_remove_missing_code_reports_success() {
    let manager = PasswordlessManager::new(PasswordlessConfig::default());
    let created = manager
        .create_code(CreateCodeRequest::email("user@example.com"))
        .unwrap();

    manager.remove_code("does-not-exist").unwrap();

    let codes = manager
        .list_codes_of_device(&created.device_id_hash)
        .unwrap();
    assert_eq!(codes.len(), 1);
    assert_eq!(
        manager
            .list_devices_by_email("user@example.com")
            .unwrap()
            .len(),
        1
    );
}

// ============================================================================
// 并发
// ============================================================================

/// 测试两个线程并发消费同一个有效验证码：恰好一个成功，
/// 另一个观察到设备已删除（restart-flow），绝不会双双成功或双双失败
#[test]
fn test_concurrent_consume_single_success() {
    for _ in 0..20 {
        let manager = Arc::new(PasswordlessManager::new(PasswordlessConfig::default()));
        let created = manager
            .create_code(CreateCodeRequest::email("user@example.com"))
            .unwrap();

        let barrier = Arc::new(Barrier::new(2));
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let manager = Arc::clone(&manager);
                let barrier = Arc::clone(&barrier);
                let link_code = created.link_code.clone();
                thread::spawn(move || {
                    barrier.wait();
                    manager.consume_code(ConsumeCodeRequest::link_code(link_code))
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let successes = results.iter().filter(|r| r.is_ok()).count();
        let restarts = results
            .iter()
            .filter(|r| matches!(r, Err(err) if err.is_restart_flow()))
            .count();
        assert_eq!(successes, 1, "exactly one consumer must win: {:?}", results);
        assert_eq!(restarts, 1, "the loser must observe restart-flow: {:?}", results);
        assert!(manager.storage().is_empty());
    }
}

/// 测试消费与 resend 并发：无论先后，设备状态保持一致
#[test]
fn test_concurrent_consume_and_resend() {
    for _ in 0..20 {
        let manager = Arc::new(PasswordlessManager::new(PasswordlessConfig::default()));
        let created = manager
            .create_code(CreateCodeRequest::email("user@example.com"))
            .unwrap();

        let barrier = Arc::new(Barrier::new(2));

        let consume_handle = {
            let manager = Arc::clone(&manager);
            let barrier = Arc::clone(&barrier);
            let link_code = created.link_code.clone();
            thread::spawn(move || {
                barrier.wait();
                manager.consume_code(ConsumeCodeRequest::link_code(link_code))
            })
        };
        let resend_handle = {
            let manager = Arc::clone(&manager);
            let barrier = Arc::clone(&barrier);
            let device_id = created.device_id.clone();
            thread::spawn(move || {
                barrier.wait();
                manager.create_code(CreateCodeRequest::resend(device_id))
            })
        };

        let consumed = consume_handle.join().unwrap();
        let resent = resend_handle.join().unwrap();

        // 消费读到的设备一定存在（resend 不删除设备），必然成功
        assert!(consumed.is_ok());

        match resent {
            // resend 先提交：追加的验证码随后被成功消费连带删除
            Ok(_) => assert!(manager.storage().is_empty()),
            // 消费先提交：resend 重试后观察到设备已删除
            Err(err) => assert!(err.is_restart_flow()),
        }
    }
}
