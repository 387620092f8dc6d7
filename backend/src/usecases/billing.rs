use std::{collections::HashMap, sync::Arc};

use anyhow::Result as AnyResult;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use crates::{
    domain::{
        entities::subscribers::SubscriberView,
        repositories::{profiles::ProfileRepository, subscribers::SubscriberRepository},
        value_objects::enums::subscription_statuses::SubscriptionStatus,
    },
    payments::stripe_client::{StripeClient, StripeEvent, StripeSubscription},
};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StripeGateway: Send + Sync {
    async fn find_customer_by_email(&self, email: &str) -> AnyResult<Option<String>>;

    async fn create_customer(&self, email: &str, user_id: Uuid) -> AnyResult<String>;

    async fn create_checkout_session(
        &self,
        price_id: Option<String>,
        customer_id: String,
        metadata: HashMap<String, String>,
    ) -> AnyResult<String>;

    async fn find_active_subscription(
        &self,
        customer_id: &str,
    ) -> AnyResult<Option<StripeSubscription>>;

    fn verify_webhook_signature(&self, payload: &[u8], signature: &str) -> AnyResult<StripeEvent>;
}

#[async_trait]
impl StripeGateway for StripeClient {
    async fn find_customer_by_email(&self, email: &str) -> AnyResult<Option<String>> {
        self.find_customer_by_email(email).await
    }

    async fn create_customer(&self, email: &str, user_id: Uuid) -> AnyResult<String> {
        self.create_customer(email, user_id).await
    }

    async fn create_checkout_session(
        &self,
        price_id: Option<String>,
        customer_id: String,
        metadata: HashMap<String, String>,
    ) -> AnyResult<String> {
        self.create_checkout_session(price_id.as_deref(), &customer_id, metadata)
            .await
    }

    async fn find_active_subscription(
        &self,
        customer_id: &str,
    ) -> AnyResult<Option<StripeSubscription>> {
        self.find_active_subscription(customer_id).await
    }

    fn verify_webhook_signature(&self, payload: &[u8], signature: &str) -> AnyResult<StripeEvent> {
        self.verify_webhook_signature(payload, signature)
    }
}

#[derive(Debug, Error)]
pub enum BillingError {
    #[error("user email is required for billing operations")]
    MissingEmail,
    #[error("invalid webhook payload: {0}")]
    InvalidWebhook(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl BillingError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            BillingError::MissingEmail | BillingError::InvalidWebhook(_) => {
                StatusCode::BAD_REQUEST
            }
            BillingError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub type BillingResult<T> = std::result::Result<T, BillingError>;

/// Keeps `Profile.subscription_status` in sync with Stripe through two
/// convergent writers: webhook events and the explicit refresh path the
/// client calls after returning from checkout.
///
/// Checkout-session creation never mutates the profile; billing state only
/// changes on a processor-confirmed signal.
pub struct BillingUseCase<P, S, Stripe>
where
    P: ProfileRepository + Send + Sync + 'static,
    S: SubscriberRepository + Send + Sync + 'static,
    Stripe: StripeGateway + Send + Sync + 'static,
{
    profile_repo: Arc<P>,
    subscriber_repo: Arc<S>,
    stripe_client: Arc<Stripe>,
    configured_price_id: Option<String>,
}

impl<P, S, Stripe> BillingUseCase<P, S, Stripe>
where
    P: ProfileRepository + Send + Sync + 'static,
    S: SubscriberRepository + Send + Sync + 'static,
    Stripe: StripeGateway + Send + Sync + 'static,
{
    pub fn new(
        profile_repo: Arc<P>,
        subscriber_repo: Arc<S>,
        stripe_client: Arc<Stripe>,
        configured_price_id: Option<String>,
    ) -> Self {
        Self {
            profile_repo,
            subscriber_repo,
            stripe_client,
            configured_price_id,
        }
    }

    pub async fn create_checkout_session(
        &self,
        user_id: Uuid,
        user_email: Option<String>,
        price_override: Option<String>,
    ) -> BillingResult<String> {
        let email = match user_email {
            Some(value) => value,
            None => {
                let err = BillingError::MissingEmail;
                warn!(
                    %user_id,
                    status = err.status_code().as_u16(),
                    "billing: missing email for checkout"
                );
                return Err(err);
            }
        };

        let customer_id = match self
            .stripe_client
            .find_customer_by_email(&email)
            .await
            .map_err(|err| {
                error!(
                    %user_id,
                    error = ?err,
                    "billing: customer lookup failed"
                );
                BillingError::Internal(err)
            })? {
            Some(existing) => existing,
            None => self
                .stripe_client
                .create_customer(&email, user_id)
                .await
                .map_err(|err| {
                    error!(
                        %user_id,
                        error = ?err,
                        "billing: customer creation failed"
                    );
                    BillingError::Internal(err)
                })?,
        };

        let price_id = price_override.or_else(|| self.configured_price_id.clone());
        let metadata = HashMap::from([("user_id".to_string(), user_id.to_string())]);

        info!(
            %user_id,
            customer_id = %customer_id,
            price_id = ?price_id,
            "billing: creating checkout session"
        );

        let checkout_url = self
            .stripe_client
            .create_checkout_session(price_id, customer_id, metadata)
            .await
            .map_err(|err| {
                error!(
                    %user_id,
                    error = ?err,
                    "billing: stripe checkout session creation failed"
                );
                BillingError::Internal(err)
            })?;

        Ok(checkout_url)
    }

    pub async fn handle_stripe_webhook(&self, payload: &[u8], signature: &str) -> BillingResult<()> {
        let event = self
            .stripe_client
            .verify_webhook_signature(payload, signature)
            .map_err(|err| {
                warn!(
                    error = %err,
                    status = BillingError::InvalidWebhook("".into()).status_code().as_u16(),
                    "billing: stripe webhook verification failed"
                );
                BillingError::InvalidWebhook("signature verification failed".into())
            })?;

        let event_type = event.type_.clone();
        info!(event_type = %event_type, "billing: stripe webhook verified");

        match event_type.as_str() {
            "checkout.session.completed" => {
                self.handle_checkout_completed(&event).await?;
            }
            "customer.subscription.deleted" => {
                self.handle_subscription_deleted(&event).await?;
            }
            _ => {
                // Stripe expects unknown event types to be acknowledged, not
                // rejected, or it retries them indefinitely.
                debug!(event_type = %event_type, "billing: ignoring unhandled stripe event type");
            }
        }

        Ok(())
    }

    /// Re-derives the subscriber view from Stripe (the source of truth) and
    /// overwrites local state. Used right after a checkout redirect, when the
    /// webhook may not have landed yet.
    pub async fn refresh_subscription(
        &self,
        user_id: Uuid,
        user_email: Option<String>,
    ) -> BillingResult<SubscriberView> {
        let email = user_email.ok_or_else(|| {
            let err = BillingError::MissingEmail;
            warn!(
                %user_id,
                status = err.status_code().as_u16(),
                "billing: missing email for subscription refresh"
            );
            err
        })?;

        let customer_id = self
            .stripe_client
            .find_customer_by_email(&email)
            .await
            .map_err(|err| {
                error!(%user_id, error = ?err, "billing: customer lookup failed during refresh");
                BillingError::Internal(err)
            })?;

        let subscription = match customer_id.as_deref() {
            Some(customer) => self
                .stripe_client
                .find_active_subscription(customer)
                .await
                .map_err(|err| {
                    error!(
                        %user_id,
                        customer_id = customer,
                        error = ?err,
                        "billing: subscription lookup failed during refresh"
                    );
                    BillingError::Internal(err)
                })?,
            None => None,
        };

        let view = match subscription {
            Some(subscription) => SubscriberView {
                subscribed: true,
                subscription_tier: Some(SubscriptionStatus::Pro.to_string()),
                subscription_end: subscription.period_end().and_then(Self::ts_to_datetime),
            },
            None => SubscriberView {
                subscribed: false,
                subscription_tier: None,
                subscription_end: None,
            },
        };

        let status = if view.subscribed {
            SubscriptionStatus::Pro
        } else {
            SubscriptionStatus::Free
        };

        self.profile_repo
            .set_status(user_id, status)
            .await
            .map_err(|err| {
                error!(%user_id, db_error = ?err, "billing: failed to write refreshed status");
                BillingError::Internal(err)
            })?;

        self.subscriber_repo
            .upsert_view(user_id, view.clone())
            .await
            .map_err(|err| {
                error!(%user_id, db_error = ?err, "billing: failed to write subscriber view");
                BillingError::Internal(err)
            })?;

        info!(
            %user_id,
            subscribed = view.subscribed,
            "billing: subscription refreshed from stripe"
        );

        Ok(view)
    }

    pub async fn get_subscription(&self, user_id: Uuid) -> BillingResult<SubscriberView> {
        let view = self
            .subscriber_repo
            .find_view(user_id)
            .await
            .map_err(|err| {
                error!(%user_id, db_error = ?err, "billing: failed to read subscriber view");
                BillingError::Internal(err)
            })?;

        // No stored view yet means the user never went near checkout.
        Ok(view.unwrap_or(SubscriberView {
            subscribed: false,
            subscription_tier: None,
            subscription_end: None,
        }))
    }

    /// Signature-valid but unmappable sessions are acknowledged, not
    /// rejected: Stripe retries non-2xx responses for days, and the same
    /// account may carry checkouts this service knows nothing about.
    async fn handle_checkout_completed(&self, event: &StripeEvent) -> BillingResult<()> {
        let Some(session) = StripeClient::extract_checkout_session(event) else {
            warn!("billing: checkout payload did not parse as a session, acknowledging");
            return Ok(());
        };

        if session.mode.as_deref() != Some("subscription") {
            // One-off payment sessions carry no tier change for us.
            info!(
                mode = ?session.mode,
                "billing: ignoring non-subscription checkout session"
            );
            return Ok(());
        }

        let user_id = match session
            .metadata
            .as_ref()
            .and_then(|metadata| metadata.get("user_id"))
            .and_then(|value| Uuid::parse_str(value).ok())
        {
            Some(user_id) => user_id,
            None => {
                info!(
                    session_id = ?session.id,
                    "billing: checkout session carries no mappable user_id, acknowledging"
                );
                return Ok(());
            }
        };

        let Some(subscription_id) = session.subscription.clone() else {
            warn!(
                %user_id,
                "billing: subscription id missing on completed session, acknowledging"
            );
            return Ok(());
        };

        let customer_id = session.customer.clone().unwrap_or_default();

        // Upsert keyed by user id, so at-least-once delivery converges.
        self.profile_repo
            .mark_pro(user_id, customer_id, subscription_id.clone())
            .await
            .map_err(|err| {
                error!(
                    %user_id,
                    %subscription_id,
                    db_error = ?err,
                    "billing: failed to mark profile pro after checkout"
                );
                BillingError::Internal(err)
            })?;

        info!(
            %user_id,
            %subscription_id,
            "billing: profile upgraded to pro from checkout webhook"
        );

        Ok(())
    }

    async fn handle_subscription_deleted(&self, event: &StripeEvent) -> BillingResult<()> {
        #[derive(Deserialize)]
        struct SubscriptionObject {
            id: Option<String>,
        }

        let subscription_id = match serde_json::from_value::<SubscriptionObject>(
            event.data.object.clone(),
        ) {
            Ok(SubscriptionObject {
                id: Some(subscription_id),
            }) => subscription_id,
            Ok(SubscriptionObject { id: None }) => {
                warn!("billing: subscription id missing in deletion payload, acknowledging");
                return Ok(());
            }
            Err(err) => {
                warn!(
                    error = %err,
                    "billing: deletion payload did not parse as a subscription, acknowledging"
                );
                return Ok(());
            }
        };

        // The deletion event carries no user id; the stored subscription id
        // is the lookup key.
        let affected = self
            .profile_repo
            .clear_subscription(&subscription_id)
            .await
            .map_err(|err| {
                error!(
                    subscription_id = %subscription_id,
                    db_error = ?err,
                    "billing: failed to downgrade profile from webhook"
                );
                BillingError::Internal(err)
            })?;

        if affected == 0 {
            info!(
                subscription_id = %subscription_id,
                "billing: subscription deletion matched no profile, acknowledging anyway"
            );
        } else {
            info!(
                subscription_id = %subscription_id,
                "billing: profile downgraded to free from webhook"
            );
        }

        Ok(())
    }

    fn ts_to_datetime(ts: i64) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(ts, 0).single()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crates::domain::entities::profiles::ProfileEntity;
    use crates::domain::repositories::{
        profiles::{MockProfileRepository, ProfileRepository},
        subscribers::MockSubscriberRepository,
    };
    use mockall::predicate::eq;
    use std::sync::Mutex;

    fn completed_event(user_id: Uuid) -> StripeEvent {
        serde_json::from_value(serde_json::json!({
            "id": "evt_1",
            "type": "checkout.session.completed",
            "data": {
                "object": {
                    "id": "cs_1",
                    "mode": "subscription",
                    "subscription": "sub_1",
                    "customer": "cus_1",
                    "metadata": { "user_id": user_id.to_string() }
                }
            }
        }))
        .unwrap()
    }

    fn deleted_event(subscription_id: &str) -> StripeEvent {
        serde_json::from_value(serde_json::json!({
            "id": "evt_2",
            "type": "customer.subscription.deleted",
            "data": { "object": { "id": subscription_id } }
        }))
        .unwrap()
    }

    /// Profile store double with the same upsert/clear semantics as the
    /// Postgres implementation, for replay-convergence assertions.
    #[derive(Default)]
    struct InMemoryProfiles {
        rows: Mutex<std::collections::HashMap<Uuid, ProfileEntity>>,
    }

    impl InMemoryProfiles {
        fn snapshot(&self, user_id: Uuid) -> Option<(String, Option<String>)> {
            self.rows
                .lock()
                .unwrap()
                .get(&user_id)
                .map(|row| (row.subscription_status.clone(), row.stripe_subscription_id.clone()))
        }
    }

    #[async_trait]
    impl ProfileRepository for InMemoryProfiles {
        async fn find_by_user_id(&self, user_id: Uuid) -> AnyResult<Option<ProfileEntity>> {
            Ok(self.rows.lock().unwrap().get(&user_id).cloned())
        }

        async fn mark_pro(
            &self,
            user_id: Uuid,
            stripe_customer_id: String,
            stripe_subscription_id: String,
        ) -> AnyResult<()> {
            self.rows.lock().unwrap().insert(
                user_id,
                ProfileEntity {
                    user_id,
                    subscription_status: SubscriptionStatus::Pro.to_string(),
                    stripe_customer_id: Some(stripe_customer_id),
                    stripe_subscription_id: Some(stripe_subscription_id),
                    updated_at: Utc::now(),
                },
            );
            Ok(())
        }

        async fn clear_subscription(&self, stripe_subscription_id: &str) -> AnyResult<usize> {
            let mut rows = self.rows.lock().unwrap();
            let mut affected = 0;
            for row in rows.values_mut() {
                if row.stripe_subscription_id.as_deref() == Some(stripe_subscription_id) {
                    row.subscription_status = SubscriptionStatus::Free.to_string();
                    row.stripe_subscription_id = None;
                    affected += 1;
                }
            }
            Ok(affected)
        }

        async fn set_status(&self, user_id: Uuid, status: SubscriptionStatus) -> AnyResult<()> {
            let mut rows = self.rows.lock().unwrap();
            rows.entry(user_id)
                .and_modify(|row| row.subscription_status = status.to_string())
                .or_insert_with(|| ProfileEntity {
                    user_id,
                    subscription_status: status.to_string(),
                    stripe_customer_id: None,
                    stripe_subscription_id: None,
                    updated_at: Utc::now(),
                });
            Ok(())
        }
    }

    fn stripe_accepting(event: StripeEvent) -> MockStripeGateway {
        let payload = serde_json::json!({
            "id": event.id,
            "type": event.type_,
            "data": { "object": event.data.object }
        });
        let mut stripe = MockStripeGateway::new();
        stripe
            .expect_verify_webhook_signature()
            .returning(move |_, _| Ok(serde_json::from_value(payload.clone()).unwrap()));
        stripe
    }

    #[tokio::test]
    async fn checkout_completed_upgrades_profile_to_pro() {
        let user_id = Uuid::new_v4();
        let profiles = Arc::new(InMemoryProfiles::default());
        let stripe = stripe_accepting(completed_event(user_id));

        let usecase = BillingUseCase::new(
            Arc::clone(&profiles),
            Arc::new(MockSubscriberRepository::new()),
            Arc::new(stripe),
            None,
        );

        usecase
            .handle_stripe_webhook(b"{}", "t=1,v1=aa")
            .await
            .unwrap();

        let (status, subscription_id) = profiles.snapshot(user_id).unwrap();
        assert_eq!(status, "pro");
        assert_eq!(subscription_id.as_deref(), Some("sub_1"));
    }

    #[tokio::test]
    async fn replayed_checkout_event_converges_to_the_same_state() {
        let user_id = Uuid::new_v4();
        let profiles = Arc::new(InMemoryProfiles::default());
        let stripe = stripe_accepting(completed_event(user_id));

        let usecase = BillingUseCase::new(
            Arc::clone(&profiles),
            Arc::new(MockSubscriberRepository::new()),
            Arc::new(stripe),
            None,
        );

        usecase
            .handle_stripe_webhook(b"{}", "t=1,v1=aa")
            .await
            .unwrap();
        let after_first = profiles.snapshot(user_id).unwrap();

        usecase
            .handle_stripe_webhook(b"{}", "t=1,v1=aa")
            .await
            .unwrap();
        let after_replay = profiles.snapshot(user_id).unwrap();

        assert_eq!(after_first, after_replay);
        assert_eq!(after_replay.0, "pro");
    }

    #[tokio::test]
    async fn subscription_deleted_downgrades_matching_profile() {
        let user_id = Uuid::new_v4();
        let profiles = Arc::new(InMemoryProfiles::default());
        profiles
            .mark_pro(user_id, "cus_1".to_string(), "sub_1".to_string())
            .await
            .unwrap();

        let stripe = stripe_accepting(deleted_event("sub_1"));
        let usecase = BillingUseCase::new(
            Arc::clone(&profiles),
            Arc::new(MockSubscriberRepository::new()),
            Arc::new(stripe),
            None,
        );

        usecase
            .handle_stripe_webhook(b"{}", "t=1,v1=aa")
            .await
            .unwrap();

        let (status, subscription_id) = profiles.snapshot(user_id).unwrap();
        assert_eq!(status, "free");
        assert_eq!(subscription_id, None);
    }

    #[tokio::test]
    async fn subscription_deleted_with_no_match_is_acknowledged() {
        let user_id = Uuid::new_v4();
        let profiles = Arc::new(InMemoryProfiles::default());
        profiles
            .mark_pro(user_id, "cus_1".to_string(), "sub_1".to_string())
            .await
            .unwrap();

        let stripe = stripe_accepting(deleted_event("sub_unknown"));
        let usecase = BillingUseCase::new(
            Arc::clone(&profiles),
            Arc::new(MockSubscriberRepository::new()),
            Arc::new(stripe),
            None,
        );

        let result = usecase.handle_stripe_webhook(b"{}", "t=1,v1=aa").await;
        assert!(result.is_ok());

        // The unrelated profile is untouched.
        let (status, subscription_id) = profiles.snapshot(user_id).unwrap();
        assert_eq!(status, "pro");
        assert_eq!(subscription_id.as_deref(), Some("sub_1"));
    }

    #[tokio::test]
    async fn bad_signature_is_rejected_and_state_untouched() {
        let user_id = Uuid::new_v4();
        let profiles = Arc::new(InMemoryProfiles::default());

        let mut stripe = MockStripeGateway::new();
        stripe
            .expect_verify_webhook_signature()
            .returning(|_, _| Err(anyhow::anyhow!("invalid webhook signature")));

        let usecase = BillingUseCase::new(
            Arc::clone(&profiles),
            Arc::new(MockSubscriberRepository::new()),
            Arc::new(stripe),
            None,
        );

        let err = usecase
            .handle_stripe_webhook(b"{}", "t=1,v1=bad")
            .await
            .unwrap_err();

        assert!(matches!(err, BillingError::InvalidWebhook(_)));
        assert_eq!(err.status_code().as_u16(), 400);
        assert!(profiles.snapshot(user_id).is_none());
    }

    #[tokio::test]
    async fn unknown_event_type_is_ignored_but_accepted() {
        let event: StripeEvent = serde_json::from_value(serde_json::json!({
            "id": "evt_3",
            "type": "invoice.finalized",
            "data": { "object": {} }
        }))
        .unwrap();

        let profiles = Arc::new(InMemoryProfiles::default());
        let stripe = stripe_accepting(event);

        let usecase = BillingUseCase::new(
            Arc::clone(&profiles),
            Arc::new(MockSubscriberRepository::new()),
            Arc::new(stripe),
            None,
        );

        assert!(usecase.handle_stripe_webhook(b"{}", "t=1,v1=aa").await.is_ok());
    }

    #[tokio::test]
    async fn checkout_session_without_user_metadata_is_acknowledged_untouched() {
        // A subscription-mode checkout created outside this service, e.g. a
        // dashboard payment link on the same Stripe account.
        let event: StripeEvent = serde_json::from_value(serde_json::json!({
            "id": "evt_4",
            "type": "checkout.session.completed",
            "data": {
                "object": {
                    "id": "cs_foreign",
                    "mode": "subscription",
                    "subscription": "sub_foreign",
                    "customer": "cus_foreign"
                }
            }
        }))
        .unwrap();

        let profiles = Arc::new(InMemoryProfiles::default());
        let stripe = stripe_accepting(event);

        let usecase = BillingUseCase::new(
            Arc::clone(&profiles),
            Arc::new(MockSubscriberRepository::new()),
            Arc::new(stripe),
            None,
        );

        let result = usecase.handle_stripe_webhook(b"{}", "t=1,v1=aa").await;
        assert!(result.is_ok());
        assert!(profiles.rows.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn checkout_session_without_subscription_id_is_acknowledged() {
        let user_id = Uuid::new_v4();
        let event: StripeEvent = serde_json::from_value(serde_json::json!({
            "id": "evt_5",
            "type": "checkout.session.completed",
            "data": {
                "object": {
                    "id": "cs_2",
                    "mode": "subscription",
                    "customer": "cus_1",
                    "metadata": { "user_id": user_id.to_string() }
                }
            }
        }))
        .unwrap();

        let profiles = Arc::new(InMemoryProfiles::default());
        let stripe = stripe_accepting(event);

        let usecase = BillingUseCase::new(
            Arc::clone(&profiles),
            Arc::new(MockSubscriberRepository::new()),
            Arc::new(stripe),
            None,
        );

        let result = usecase.handle_stripe_webhook(b"{}", "t=1,v1=aa").await;
        assert!(result.is_ok());
        assert!(profiles.snapshot(user_id).is_none());
    }

    #[tokio::test]
    async fn subscription_deletion_without_id_is_acknowledged() {
        let event: StripeEvent = serde_json::from_value(serde_json::json!({
            "id": "evt_6",
            "type": "customer.subscription.deleted",
            "data": { "object": { "status": "canceled" } }
        }))
        .unwrap();

        let profiles = Arc::new(InMemoryProfiles::default());
        let stripe = stripe_accepting(event);

        let usecase = BillingUseCase::new(
            Arc::clone(&profiles),
            Arc::new(MockSubscriberRepository::new()),
            Arc::new(stripe),
            None,
        );

        assert!(usecase.handle_stripe_webhook(b"{}", "t=1,v1=aa").await.is_ok());
    }

    #[tokio::test]
    async fn refresh_with_active_subscription_marks_pro_and_writes_view() {
        let user_id = Uuid::new_v4();
        let profiles = Arc::new(InMemoryProfiles::default());

        let mut stripe = MockStripeGateway::new();
        stripe
            .expect_find_customer_by_email()
            .with(eq("teacher@example.com"))
            .returning(|_| Ok(Some("cus_1".to_string())));
        stripe
            .expect_find_active_subscription()
            .with(eq("cus_1"))
            .returning(|_| {
                Ok(Some(
                    serde_json::from_value(serde_json::json!({
                        "id": "sub_1",
                        "status": "active",
                        "current_period_end": 1760000000
                    }))
                    .unwrap(),
                ))
            });

        let mut subscriber_repo = MockSubscriberRepository::new();
        subscriber_repo
            .expect_upsert_view()
            .withf(|_, view| view.subscribed && view.subscription_tier.as_deref() == Some("pro"))
            .times(1)
            .returning(|_, _| Ok(()));

        let usecase = BillingUseCase::new(
            Arc::clone(&profiles),
            Arc::new(subscriber_repo),
            Arc::new(stripe),
            None,
        );

        let view = usecase
            .refresh_subscription(user_id, Some("teacher@example.com".to_string()))
            .await
            .unwrap();

        assert!(view.subscribed);
        assert!(view.subscription_end.is_some());
        assert_eq!(profiles.snapshot(user_id).unwrap().0, "pro");
    }

    #[tokio::test]
    async fn refresh_without_stripe_customer_resolves_to_free() {
        let user_id = Uuid::new_v4();
        let profiles = Arc::new(InMemoryProfiles::default());
        profiles
            .mark_pro(user_id, "cus_1".to_string(), "sub_1".to_string())
            .await
            .unwrap();

        let mut stripe = MockStripeGateway::new();
        stripe
            .expect_find_customer_by_email()
            .returning(|_| Ok(None));

        let mut subscriber_repo = MockSubscriberRepository::new();
        subscriber_repo
            .expect_upsert_view()
            .withf(|_, view| !view.subscribed)
            .times(1)
            .returning(|_, _| Ok(()));

        let usecase = BillingUseCase::new(
            Arc::clone(&profiles),
            Arc::new(subscriber_repo),
            Arc::new(stripe),
            None,
        );

        let view = usecase.refresh_subscription(user_id, Some("x@y.z".to_string())).await.unwrap();

        assert!(!view.subscribed);
        assert_eq!(profiles.snapshot(user_id).unwrap().0, "free");
    }

    #[tokio::test]
    async fn checkout_session_reuses_existing_customer() {
        let user_id = Uuid::new_v4();

        let mut stripe = MockStripeGateway::new();
        stripe
            .expect_find_customer_by_email()
            .with(eq("teacher@example.com"))
            .returning(|_| Ok(Some("cus_1".to_string())));
        stripe.expect_create_customer().times(0);
        stripe
            .expect_create_checkout_session()
            .withf(move |price_id, customer_id, metadata| {
                price_id.as_deref() == Some("price_pro_monthly")
                    && customer_id == "cus_1"
                    && metadata.get("user_id") == Some(&user_id.to_string())
            })
            .times(1)
            .returning(|_, _, _| Ok("https://checkout.stripe.com/c/pay/cs_1".to_string()));

        let usecase = BillingUseCase::new(
            Arc::new(MockProfileRepository::new()),
            Arc::new(MockSubscriberRepository::new()),
            Arc::new(stripe),
            Some("price_pro_monthly".to_string()),
        );

        let url = usecase
            .create_checkout_session(user_id, Some("teacher@example.com".to_string()), None)
            .await
            .unwrap();

        assert_eq!(url, "https://checkout.stripe.com/c/pay/cs_1");
    }

    #[tokio::test]
    async fn checkout_session_creates_customer_when_absent() {
        let user_id = Uuid::new_v4();

        let mut stripe = MockStripeGateway::new();
        stripe
            .expect_find_customer_by_email()
            .returning(|_| Ok(None));
        stripe
            .expect_create_customer()
            .with(eq("new@example.com"), eq(user_id))
            .times(1)
            .returning(|_, _| Ok("cus_new".to_string()));
        stripe
            .expect_create_checkout_session()
            // No configured price: the inline fallback is signalled by None.
            .withf(|price_id, customer_id, _| price_id.is_none() && customer_id == "cus_new")
            .times(1)
            .returning(|_, _, _| Ok("https://checkout.stripe.com/c/pay/cs_2".to_string()));

        let usecase = BillingUseCase::new(
            Arc::new(MockProfileRepository::new()),
            Arc::new(MockSubscriberRepository::new()),
            Arc::new(stripe),
            None,
        );

        let url = usecase
            .create_checkout_session(user_id, Some("new@example.com".to_string()), None)
            .await
            .unwrap();

        assert_eq!(url, "https://checkout.stripe.com/c/pay/cs_2");
    }

    #[tokio::test]
    async fn checkout_session_requires_email() {
        let usecase = BillingUseCase::new(
            Arc::new(MockProfileRepository::new()),
            Arc::new(MockSubscriberRepository::new()),
            Arc::new(MockStripeGateway::new()),
            None,
        );

        let err = usecase
            .create_checkout_session(Uuid::new_v4(), None, None)
            .await
            .unwrap_err();

        assert!(matches!(err, BillingError::MissingEmail));
    }
}
