//! Shared-secret extractors for machine callers: the job scheduler and the billing integration.

use crate::config::SecurityConfig;
use axum::async_trait;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::{header::AUTHORIZATION, request::Parts};
use service_core::error::AppError;
use service_core::utils::secret::{bearer_token, secrets_match};

pub const INTERNAL_KEY_HEADER: &str = "X-Internal-Key";

/// Scheduler call carrying `Authorization: Bearer <CRON_SECRET>`.
#[derive(Debug, Clone, Copy)]
pub struct CronAuth;

/// Internal call carrying the shared key in `X-Internal-Key`.
#[derive(Debug, Clone, Copy)]
pub struct InternalAuth;

#[async_trait]
impl<S> FromRequestParts<S> for CronAuth
where
    SecurityConfig: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let security = SecurityConfig::from_ref(state);
        let presented = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(bearer_token)
            .unwrap_or_default();

        if !secrets_match(&security.cron_secret, presented) {
            tracing::warn!("Rejected job trigger with invalid cron secret");
            return Err(AppError::Unauthorized(anyhow::anyhow!(
                "Invalid or missing cron secret"
            )));
        }

        Ok(CronAuth)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for InternalAuth
where
    SecurityConfig: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let security = SecurityConfig::from_ref(state);
        let presented = parts
            .headers
            .get(INTERNAL_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();

        if !secrets_match(&security.internal_api_key, presented) {
            tracing::warn!("Rejected internal call with invalid key");
            return Err(AppError::Unauthorized(anyhow::anyhow!(
                "Invalid or missing internal key"
            )));
        }

        Ok(InternalAuth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn security() -> SecurityConfig {
        SecurityConfig {
            cron_secret: "cron-s3cret".to_string(),
            internal_api_key: "internal-k3y".to_string(),
            verification_rate_limit: 10,
            verification_rate_window_seconds: 60,
        }
    }

    fn parts(name: &str, value: &str) -> Parts {
        let (parts, _) = Request::builder()
            .uri("/jobs/recurrences")
            .header(name, value)
            .body(())
            .unwrap()
            .into_parts();
        parts
    }

    #[tokio::test]
    async fn cron_accepts_matching_bearer() {
        let mut parts = parts("authorization", "Bearer cron-s3cret");
        assert!(CronAuth::from_request_parts(&mut parts, &security()).await.is_ok());
    }

    #[tokio::test]
    async fn cron_rejects_wrong_or_missing_secret() {
        let mut wrong = parts("authorization", "Bearer cron-s3creT");
        assert!(matches!(
            CronAuth::from_request_parts(&mut wrong, &security()).await,
            Err(AppError::Unauthorized(_))
        ));

        let mut other_header = parts("x-other", "cron-s3cret");
        assert!(CronAuth::from_request_parts(&mut other_header, &security())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn unconfigured_secret_never_matches() {
        let mut config = security();
        config.cron_secret = String::new();
        let mut parts = parts("authorization", "Bearer ");
        assert!(CronAuth::from_request_parts(&mut parts, &config).await.is_err());
    }

    #[tokio::test]
    async fn internal_key_header() {
        let mut ok = parts(INTERNAL_KEY_HEADER, "internal-k3y");
        assert!(InternalAuth::from_request_parts(&mut ok, &security()).await.is_ok());

        let mut bearer = parts("authorization", "Bearer internal-k3y");
        assert!(InternalAuth::from_request_parts(&mut bearer, &security())
            .await
            .is_err());
    }
}
