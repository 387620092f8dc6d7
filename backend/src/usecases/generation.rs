use std::sync::Arc;

use anyhow::Result as AnyResult;
use async_trait::async_trait;
use crates::{
    domain::{
        repositories::{profiles::ProfileRepository, usage::UsageRepository},
        value_objects::{
            enums::subscription_statuses::SubscriptionStatus, month_key::MonthKey,
        },
    },
    generation::client::GenerationClient,
};
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::usecases::{entitlement::EntitlementResolver, prompts::DocumentPrompt};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GenerationGateway: Send + Sync {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> AnyResult<String>;
}

#[async_trait]
impl GenerationGateway for GenerationClient {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> AnyResult<String> {
        self.complete(system_prompt, user_prompt).await
    }
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("monthly AI generation limit reached")]
    QuotaExceeded,
    #[error("generation provider failure")]
    Provider(#[source] anyhow::Error),
}

impl GenerationError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            GenerationError::QuotaExceeded => StatusCode::TOO_MANY_REQUESTS,
            GenerationError::Provider(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub type GenerationResult<T> = std::result::Result<T, GenerationError>;

/// Shared request pipeline for every generation capability: resolve
/// entitlement, reject or proceed, call the provider, record usage.
///
/// The quota check always runs before the provider call so an exhausted user
/// costs nothing upstream. Usage recording runs after a successful call and
/// is best-effort: the caller already has their content, so a failed
/// increment is logged, never surfaced.
pub struct GenerationUseCase<P, U, G>
where
    P: ProfileRepository + Send + Sync + 'static,
    U: UsageRepository + Send + Sync + 'static,
    G: GenerationGateway + Send + Sync + 'static,
{
    entitlement: Arc<EntitlementResolver<P, U>>,
    usage_repo: Arc<U>,
    gateway: Arc<G>,
}

impl<P, U, G> GenerationUseCase<P, U, G>
where
    P: ProfileRepository + Send + Sync + 'static,
    U: UsageRepository + Send + Sync + 'static,
    G: GenerationGateway + Send + Sync + 'static,
{
    pub fn new(
        entitlement: Arc<EntitlementResolver<P, U>>,
        usage_repo: Arc<U>,
        gateway: Arc<G>,
    ) -> Self {
        Self {
            entitlement,
            usage_repo,
            gateway,
        }
    }

    pub async fn generate(
        &self,
        user_id: Uuid,
        capability: &'static str,
        prompt: DocumentPrompt,
    ) -> GenerationResult<String> {
        let entitlement = self.entitlement.resolve(user_id).await;
        let status = SubscriptionStatus::from_str(&entitlement.subscription_status);

        if !entitlement.can_generate {
            warn!(
                %user_id,
                capability,
                usage_count = entitlement.usage_count,
                status = GenerationError::QuotaExceeded.status_code().as_u16(),
                "generation: monthly limit reached, rejecting before provider call"
            );
            return Err(GenerationError::QuotaExceeded);
        }

        info!(
            %user_id,
            capability,
            subscription_status = %entitlement.subscription_status,
            usage_count = entitlement.usage_count,
            "generation: invoking provider"
        );

        let content = self
            .gateway
            .complete(&prompt.system, &prompt.user)
            .await
            .map_err(|err| {
                error!(
                    %user_id,
                    capability,
                    error = ?err,
                    "generation: provider call failed"
                );
                GenerationError::Provider(err)
            })?;

        // Pro callers are unmetered; only free-tier generations count.
        if status == SubscriptionStatus::Free {
            self.record_usage(user_id, capability).await;
        }

        Ok(content)
    }

    /// Best-effort bookkeeping after content has already been produced. A
    /// failure here must not take back the user's result.
    async fn record_usage(&self, user_id: Uuid, capability: &'static str) {
        let month_key = MonthKey::current();
        match self.usage_repo.increment_usage(user_id, &month_key).await {
            Ok(new_count) => {
                info!(
                    %user_id,
                    capability,
                    month_key = %month_key,
                    new_count,
                    "generation: usage recorded"
                );
            }
            Err(err) => {
                error!(
                    %user_id,
                    capability,
                    month_key = %month_key,
                    db_error = ?err,
                    "generation: failed to record usage, continuing"
                );
            }
        }
    }
}
