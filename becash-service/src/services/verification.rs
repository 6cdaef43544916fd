//! Phone verification with one-time codes.
//!
//! A pending code lives in the store under `otp:phone:{user}:{phone}` for ten minutes. Only the
//! SHA-256 hash of the code is stored. Every guess reserves an attempt before the code is
//! compared, so concurrent guesses cannot exceed the limit. Three wrong guesses lock the record
//! until it expires; sending a new code replaces it.

use async_trait::async_trait;
use rand::Rng;
use redis::{aio::ConnectionManager, Client};
use service_core::error::AppError;
use service_core::utils::secret::secrets_match;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Digits in a verification code.
pub const CODE_LENGTH: usize = 6;
/// Lifetime of a pending code.
pub const CODE_TTL: Duration = Duration::from_secs(600);
/// Minimum time between two sends for the same user.
pub const RESEND_INTERVAL: Duration = Duration::from_secs(60);
/// Wrong guesses allowed before the code locks.
pub const MAX_ATTEMPTS: u32 = 3;

/// Stored state of a code that has been sent but not verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCode {
    pub code_hash: String,
    pub attempts: u32,
}

/// Outcome of reserving a guess against a pending code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptReservation {
    /// No pending code, or it expired.
    Missing,
    /// Every attempt is used.
    Locked,
    /// The guess may be compared. `attempt` counts it.
    Reserved { code_hash: String, attempt: u32 },
}

#[async_trait]
pub trait VerificationStore: Send + Sync {
    /// Store a pending code, replacing any previous one.
    async fn put_pending(
        &self,
        key: &str,
        record: &PendingCode,
        ttl: Duration,
    ) -> Result<(), anyhow::Error>;
    /// Atomically count one guess against the record unless `max_attempts` are already used.
    /// Never extends the record's lifetime.
    async fn reserve_attempt(
        &self,
        key: &str,
        max_attempts: u32,
    ) -> Result<AttemptReservation, anyhow::Error>;
    async fn delete(&self, key: &str) -> Result<(), anyhow::Error>;
    /// Take the send slot for `key` unless it is held. Returns the seconds left when held.
    async fn claim_send_slot(&self, key: &str, ttl: Duration)
        -> Result<Option<u64>, anyhow::Error>;
    /// Give back a slot taken by `claim_send_slot`.
    async fn release_send_slot(&self, key: &str) -> Result<(), anyhow::Error>;
    async fn health_check(&self) -> Result<(), anyhow::Error>;
}

/// Redis-backed store.
#[derive(Clone)]
pub struct RedisVerificationStore {
    _client: Client,
    manager: ConnectionManager,
}

impl RedisVerificationStore {
    pub async fn new(url: &str) -> Result<Self, anyhow::Error> {
        tracing::info!("Connecting to Redis");
        let client = Client::open(url)?;

        let manager = client.get_connection_manager().await.map_err(|e| {
            tracing::error!("Failed to get Redis connection manager: {}", e);
            anyhow::anyhow!("Failed to connect to Redis: {}", e)
        })?;

        tracing::info!("Successfully connected to Redis");

        Ok(Self {
            _client: client,
            manager,
        })
    }
}

#[async_trait]
impl VerificationStore for RedisVerificationStore {
    async fn put_pending(
        &self,
        key: &str,
        record: &PendingCode,
        ttl: Duration,
    ) -> Result<(), anyhow::Error> {
        let mut conn = self.manager.clone();
        redis::pipe()
            .atomic()
            .del(key)
            .ignore()
            .hset_multiple(
                key,
                &[
                    ("code_hash", record.code_hash.clone()),
                    ("attempts", record.attempts.to_string()),
                ],
            )
            .ignore()
            .expire(key, ttl.as_secs() as i64)
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to store verification code: {}", e))
    }

    async fn reserve_attempt(
        &self,
        key: &str,
        max_attempts: u32,
    ) -> Result<AttemptReservation, anyhow::Error> {
        // Status 0 = missing, 1 = locked, 2 = reserved. HINCRBY runs only on an existing key so
        // the record is never recreated without a TTL.
        let script = redis::Script::new(
            r"local hash = redis.call('HGET', KEYS[1], 'code_hash')
              if not hash then
                return {0, '', 0}
              end
              local attempts = tonumber(redis.call('HGET', KEYS[1], 'attempts') or ARGV[1])
              if attempts >= tonumber(ARGV[1]) then
                return {1, '', attempts}
              end
              local attempt = redis.call('HINCRBY', KEYS[1], 'attempts', 1)
              return {2, hash, attempt}",
        );
        let mut conn = self.manager.clone();
        let (status, code_hash, attempt): (i64, String, i64) = script
            .key(key)
            .arg(max_attempts)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to reserve attempt: {}", e))?;

        Ok(match status {
            0 => AttemptReservation::Missing,
            1 => AttemptReservation::Locked,
            _ => AttemptReservation::Reserved {
                code_hash,
                attempt: u32::try_from(attempt).unwrap_or(max_attempts),
            },
        })
    }

    async fn delete(&self, key: &str) -> Result<(), anyhow::Error> {
        let mut conn = self.manager.clone();
        redis::cmd("DEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to delete verification code: {}", e))
    }

    async fn claim_send_slot(
        &self,
        key: &str,
        ttl: Duration,
    ) -> Result<Option<u64>, anyhow::Error> {
        let mut conn = self.manager.clone();
        let claimed: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs())
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to claim send slot: {}", e))?;

        if claimed.is_some() {
            return Ok(None);
        }

        let remaining: i64 = redis::cmd("TTL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to read send slot TTL: {}", e))?;

        Ok(Some(remaining.max(1) as u64))
    }

    async fn release_send_slot(&self, key: &str) -> Result<(), anyhow::Error> {
        let mut conn = self.manager.clone();
        redis::cmd("DEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to release send slot: {}", e))
    }

    async fn health_check(&self) -> Result<(), anyhow::Error> {
        let mut conn = self.manager.clone();
        redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Redis health check failed: {}", e))
    }
}

/// Process-local store for development and tests.
#[derive(Default)]
pub struct InMemoryVerificationStore {
    pending: Mutex<HashMap<String, (PendingCode, Instant)>>,
    slots: Mutex<HashMap<String, Instant>>,
}

impl InMemoryVerificationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VerificationStore for InMemoryVerificationStore {
    async fn put_pending(
        &self,
        key: &str,
        record: &PendingCode,
        ttl: Duration,
    ) -> Result<(), anyhow::Error> {
        self.pending
            .lock()
            .map_err(|e| anyhow::anyhow!("Verification store mutex poisoned: {}", e))?
            .insert(key.to_string(), (record.clone(), Instant::now() + ttl));
        Ok(())
    }

    async fn reserve_attempt(
        &self,
        key: &str,
        max_attempts: u32,
    ) -> Result<AttemptReservation, anyhow::Error> {
        let mut pending = self
            .pending
            .lock()
            .map_err(|e| anyhow::anyhow!("Verification store mutex poisoned: {}", e))?;

        let expired = matches!(pending.get(key), Some((_, expires)) if *expires <= Instant::now());
        if expired {
            pending.remove(key);
        }

        Ok(match pending.get_mut(key) {
            None => AttemptReservation::Missing,
            Some((record, _)) if record.attempts >= max_attempts => AttemptReservation::Locked,
            Some((record, _)) => {
                record.attempts += 1;
                AttemptReservation::Reserved {
                    code_hash: record.code_hash.clone(),
                    attempt: record.attempts,
                }
            }
        })
    }

    async fn delete(&self, key: &str) -> Result<(), anyhow::Error> {
        self.pending
            .lock()
            .map_err(|e| anyhow::anyhow!("Verification store mutex poisoned: {}", e))?
            .remove(key);
        Ok(())
    }

    async fn claim_send_slot(
        &self,
        key: &str,
        ttl: Duration,
    ) -> Result<Option<u64>, anyhow::Error> {
        let mut slots = self
            .slots
            .lock()
            .map_err(|e| anyhow::anyhow!("Verification store mutex poisoned: {}", e))?;

        let now = Instant::now();
        if let Some(until) = slots.get(key).filter(|until| **until > now) {
            let remaining = until.duration_since(now).as_secs_f64().ceil() as u64;
            return Ok(Some(remaining.max(1)));
        }
        slots.insert(key.to_string(), now + ttl);
        Ok(None)
    }

    async fn release_send_slot(&self, key: &str) -> Result<(), anyhow::Error> {
        self.slots
            .lock()
            .map_err(|e| anyhow::anyhow!("Verification store mutex poisoned: {}", e))?
            .remove(key);
        Ok(())
    }

    async fn health_check(&self) -> Result<(), anyhow::Error> {
        Ok(())
    }
}

/// Hands a freshly generated code to the user.
#[async_trait]
pub trait CodeDelivery: Send + Sync {
    async fn deliver(&self, phone: &str, code: &str) -> Result<(), anyhow::Error>;
}

/// Writes codes to the log instead of messaging the user.
pub struct LogDelivery;

#[async_trait]
impl CodeDelivery for LogDelivery {
    async fn deliver(&self, phone: &str, code: &str) -> Result<(), anyhow::Error> {
        info!(phone = %mask_phone(phone), "Verification code issued");
        debug!(phone = %mask_phone(phone), code = %code, "Verification code");
        Ok(())
    }
}

/// Keeps the last code per phone so tests can read it back.
#[derive(Default)]
pub struct RecordingDelivery {
    codes: Mutex<HashMap<String, String>>,
}

impl RecordingDelivery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_code(&self, phone: &str) -> Option<String> {
        self.codes.lock().ok()?.get(phone).cloned()
    }
}

#[async_trait]
impl CodeDelivery for RecordingDelivery {
    async fn deliver(&self, phone: &str, code: &str) -> Result<(), anyhow::Error> {
        self.codes
            .lock()
            .map_err(|e| anyhow::anyhow!("Recording delivery mutex poisoned: {}", e))?
            .insert(phone.to_string(), code.to_string());
        Ok(())
    }
}

/// Result of sending a code.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SentCode {
    pub phone: String,
    pub expires_in_seconds: u64,
}

/// Send/verify flow on top of a store and a delivery channel.
#[derive(Clone)]
pub struct VerificationService {
    store: Arc<dyn VerificationStore>,
    delivery: Arc<dyn CodeDelivery>,
}

impl VerificationService {
    pub fn new(store: Arc<dyn VerificationStore>, delivery: Arc<dyn CodeDelivery>) -> Self {
        Self { store, delivery }
    }

    pub async fn health_check(&self) -> Result<(), AppError> {
        self.store.health_check().await.map_err(AppError::InternalError)
    }

    /// Generate, store and deliver a new code for `phone`.
    #[instrument(skip(self, phone), fields(user_id = %user_id))]
    pub async fn send(&self, user_id: Uuid, phone: &str) -> Result<SentCode, AppError> {
        validate_phone(phone)?;

        let slot = throttle_key(user_id);
        if let Some(retry_after) = self.store.claim_send_slot(&slot, RESEND_INTERVAL).await? {
            return Err(AppError::TooManyRequests(
                "A code was sent recently, please wait before requesting another".to_string(),
                Some(retry_after),
            ));
        }

        if let Err(e) = self.issue_code(user_id, phone).await {
            // No code reached the user; free the slot.
            if let Err(release_err) = self.store.release_send_slot(&slot).await {
                warn!(error = %release_err, "Failed to release send slot");
            }
            return Err(e);
        }

        info!(phone = %mask_phone(phone), "Verification code sent");

        Ok(SentCode {
            phone: phone.to_string(),
            expires_in_seconds: CODE_TTL.as_secs(),
        })
    }

    async fn issue_code(&self, user_id: Uuid, phone: &str) -> Result<(), AppError> {
        let code = generate_code(CODE_LENGTH);
        let record = PendingCode {
            code_hash: hash_code(&code),
            attempts: 0,
        };
        self.store
            .put_pending(&pending_key(user_id, phone), &record, CODE_TTL)
            .await?;
        self.delivery.deliver(phone, &code).await?;
        Ok(())
    }

    /// Check `code` against the pending code for `phone`. The record is consumed on success.
    #[instrument(skip(self, phone, code), fields(user_id = %user_id))]
    pub async fn verify(&self, user_id: Uuid, phone: &str, code: &str) -> Result<(), AppError> {
        validate_phone(phone)?;
        let key = pending_key(user_id, phone);

        let (code_hash, attempt) = match self.store.reserve_attempt(&key, MAX_ATTEMPTS).await? {
            AttemptReservation::Missing => return Err(expired()),
            AttemptReservation::Locked => return Err(locked()),
            AttemptReservation::Reserved { code_hash, attempt } => (code_hash, attempt),
        };

        if secrets_match(&code_hash, &hash_code(code.trim())) {
            self.store.delete(&key).await?;
            info!(phone = %mask_phone(phone), "Verification code accepted");
            return Ok(());
        }

        if attempt >= MAX_ATTEMPTS {
            warn!(phone = %mask_phone(phone), "Verification locked after repeated failures");
            return Err(locked());
        }
        Err(AppError::BadRequest(anyhow::anyhow!(
            "Incorrect code, {} attempt(s) left",
            MAX_ATTEMPTS - attempt
        )))
    }
}

fn expired() -> AppError {
    AppError::Gone(anyhow::anyhow!(
        "Verification code expired or was never requested"
    ))
}

fn locked() -> AppError {
    AppError::TooManyRequests(
        "Too many incorrect attempts, request a new code".to_string(),
        None,
    )
}

/// E.164: `+` followed by 10 to 15 digits.
pub fn validate_phone(phone: &str) -> Result<(), AppError> {
    let valid = phone
        .strip_prefix('+')
        .map(|digits| {
            (10..=15).contains(&digits.len()) && digits.bytes().all(|b| b.is_ascii_digit())
        })
        .unwrap_or(false);

    if valid {
        Ok(())
    } else {
        Err(AppError::BadRequest(anyhow::anyhow!(
            "Phone must be in E.164 format, e.g. +5511999999999"
        )))
    }
}

fn pending_key(user_id: Uuid, phone: &str) -> String {
    format!("otp:phone:{}:{}", user_id, phone)
}

fn throttle_key(user_id: Uuid) -> String {
    format!("otp:phone:throttle:{}", user_id)
}

fn generate_code(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| rng.gen_range(0..10).to_string())
        .collect()
}

fn hash_code(code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(code.as_bytes());
    hex::encode(hasher.finalize())
}

fn mask_phone(phone: &str) -> String {
    let visible = phone.len().saturating_sub(4);
    format!("{}{}", "*".repeat(visible), &phone[visible..])
}
