#![allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]

//! Encrypted event log lifecycle: persistence across key cycles, the
//! entry cap, filtering and stats, clearing, and archival.

use coffret_crypto_core::{encrypt_json, SecretBytes};
use coffret_vault::{
    EventLogger, LogCategory, LogEntry, DEFAULT_LOG_LIMIT, MAX_LOG_ENTRIES,
};
use tempfile::TempDir;

const LOG_FILE: &str = "logs.enc";

fn test_key() -> SecretBytes<32> {
    SecretBytes::new([0x11; 32])
}

fn keyed_logger(dir: &TempDir) -> EventLogger {
    let logger = EventLogger::new(dir.path());
    logger.set_encryption_key(test_key());
    logger
}

#[test]
fn log_appends_and_persists() {
    let dir = TempDir::new().unwrap();
    let logger = keyed_logger(&dir);
    logger.log("first event", LogCategory::Info);
    logger.log_app("second event");

    let logs = logger.get_logs();
    assert_eq!(logs.len(), 2);
    assert_eq!(logs[0].message, "first event");
    assert_eq!(logs[1].category, LogCategory::App);
    assert!(dir.path().join(LOG_FILE).exists());
}

#[test]
fn entries_survive_key_cycle() {
    let dir = TempDir::new().unwrap();
    let logger = keyed_logger(&dir);
    logger.log("persisted event", LogCategory::Lock);
    logger.clear_encryption_key();
    assert!(logger.get_logs().is_empty());

    logger.set_encryption_key(test_key());
    let logs = logger.get_logs();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].message, "persisted event");
}

#[test]
fn wrong_key_discards_existing_file() {
    let dir = TempDir::new().unwrap();
    let logger = keyed_logger(&dir);
    logger.log("old event", LogCategory::Info);
    logger.clear_encryption_key();

    logger.set_encryption_key(SecretBytes::new([0x22; 32]));
    assert!(logger.get_logs().is_empty());
}

#[test]
fn log_truncates_to_cap() {
    let dir = TempDir::new().unwrap();
    let logger = keyed_logger(&dir);
    for i in 0..(MAX_LOG_ENTRIES + 25) {
        logger.log(&format!("event {i}"), LogCategory::Info);
    }
    let logs = logger.get_logs();
    assert_eq!(logs.len(), MAX_LOG_ENTRIES);
    assert_eq!(logs[0].message, "event 25");
}

#[test]
fn filtered_logs_newest_first_with_limit() {
    let dir = TempDir::new().unwrap();
    let logger = keyed_logger(&dir);
    logger.log_app("app one");
    logger.log_lock("lock one");
    logger.log_app("app two");

    let apps = logger.get_filtered_logs(Some(LogCategory::App), DEFAULT_LOG_LIMIT);
    assert_eq!(apps.len(), 2);
    assert_eq!(apps[0].message, "app two");

    let limited = logger.get_filtered_logs(None, 1);
    assert_eq!(limited.len(), 1);
    assert_eq!(limited[0].message, "app two");
}

#[test]
fn stats_count_by_category() {
    let dir = TempDir::new().unwrap();
    let logger = keyed_logger(&dir);
    logger.log_app("a");
    logger.log_access("read", "proj", &["K".into()]);
    logger.log_access("read", "proj", &["K2".into()]);

    let stats = logger.get_log_stats();
    assert_eq!(stats.total, 3);
    assert_eq!(stats.by_category.get("app"), Some(&1));
    assert_eq!(stats.by_category.get("access"), Some(&2));
}

#[test]
fn clear_logs_removes_file_and_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let logger = keyed_logger(&dir);
    logger.log("something", LogCategory::Info);
    logger.clear_logs().unwrap();
    assert!(!dir.path().join(LOG_FILE).exists());
    logger.clear_logs().unwrap();
}

#[test]
fn archive_splits_old_entries() {
    let dir = TempDir::new().unwrap();

    // Seed the log file with two ancient entries under the test key.
    let old_entries = vec![
        LogEntry {
            timestamp: "2020-01-01T00:00:00Z".into(),
            category: LogCategory::Info,
            message: "ancient one".into(),
        },
        LogEntry {
            timestamp: "2020-06-01T00:00:00Z".into(),
            category: LogCategory::Info,
            message: "ancient two".into(),
        },
    ];
    let envelope = encrypt_json(&old_entries, &test_key()).unwrap();
    std::fs::write(dir.path().join(LOG_FILE), &envelope).unwrap();

    let logger = keyed_logger(&dir);
    logger.log("fresh", LogCategory::Info);
    assert_eq!(logger.get_logs().len(), 3);

    let archive = logger
        .archive_logs(30)
        .unwrap()
        .expect("there were old entries");
    assert!(archive.exists());
    let archive_name = archive.file_name().unwrap().to_str().unwrap().to_string();
    assert!(archive_name.starts_with("logs_archive_"));
    assert!(archive_name.ends_with(".enc"));

    let logs = logger.get_logs();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].message, "fresh");

    // The archived shard decrypts under the same key.
    let archived: Vec<LogEntry> = {
        let bytes = std::fs::read(&archive).unwrap();
        coffret_crypto_core::decrypt_json(&bytes, &test_key()).unwrap()
    };
    assert_eq!(archived.len(), 2);
    assert_eq!(archived[0].message, "ancient one");

    // Nothing left to archive on a second pass.
    assert!(logger.archive_logs(30).unwrap().is_none());
}

#[test]
fn access_log_joins_keys() {
    let dir = TempDir::new().unwrap();
    let logger = keyed_logger(&dir);
    logger.log_access("Access denied: User denied", "app", &["K".into(), "K2".into()]);
    let logs = logger.get_logs();
    assert!(logs[0].message.contains("Access denied"));
    assert!(logs[0].message.contains("app"));
    assert!(logs[0].message.contains("K, K2"));
    assert_eq!(logs[0].category, LogCategory::Access);
}

#[test]
fn persisted_messages_are_masked() {
    let dir = TempDir::new().unwrap();
    let logger = keyed_logger(&dir);
    logger.log(
        "client sent sk-abcdefghijklmnopqrstu today",
        LogCategory::Access,
    );
    let logs = logger.get_logs();
    assert!(!logs[0].message.contains("sk-abcdefghijklmnopqrstu"));
}
