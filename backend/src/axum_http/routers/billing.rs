use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::json;

use crate::auth::AuthUser;
use crate::axum_http::error_responses::AppError;
use crate::config::config_model::DotEnvyConfig;
use crate::usecases::billing::{BillingUseCase, StripeGateway};
use crates::{
    domain::{
        entities::subscribers::SubscriberView,
        repositories::{profiles::ProfileRepository, subscribers::SubscriberRepository},
    },
    infra::db::{
        postgres::postgres_connection::PgPoolSquad,
        repositories::{profiles::ProfilePostgres, subscribers::SubscriberPostgres},
    },
    payments::stripe_client::StripeClient,
};

pub fn routes(db_pool: Arc<PgPoolSquad>, config: Arc<DotEnvyConfig>) -> Router {
    let profile_repo = Arc::new(ProfilePostgres::new(Arc::clone(&db_pool)));
    let subscriber_repo = Arc::new(SubscriberPostgres::new(Arc::clone(&db_pool)));
    let stripe_client = Arc::new(StripeClient::new(
        config.stripe.secret_key.clone(),
        config.stripe.webhook_secret.clone(),
        config.stripe.success_url.clone(),
        config.stripe.cancel_url.clone(),
    ));
    let billing_usecase = BillingUseCase::new(
        profile_repo,
        subscriber_repo,
        stripe_client,
        config.stripe.price_id.clone(),
    );

    Router::new()
        .route("/checkout-session", post(create_checkout_session))
        .route("/refresh", post(refresh_subscription))
        .route("/subscription", get(get_subscription))
        .route("/webhook", post(webhook))
        .with_state(Arc::new(billing_usecase))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCheckoutSessionRequest {
    pub price_id: Option<String>,
}

pub async fn create_checkout_session<P, S, Stripe>(
    State(billing_usecase): State<Arc<BillingUseCase<P, S, Stripe>>>,
    auth: AuthUser,
    Json(request): Json<CreateCheckoutSessionRequest>,
) -> Result<Json<serde_json::Value>, AppError>
where
    P: ProfileRepository + Send + Sync + 'static,
    S: SubscriberRepository + Send + Sync + 'static,
    Stripe: StripeGateway + Send + Sync + 'static,
{
    let url = billing_usecase
        .create_checkout_session(auth.user_id, auth.email, request.price_id)
        .await?;

    Ok(Json(json!({ "url": url })))
}

pub async fn refresh_subscription<P, S, Stripe>(
    State(billing_usecase): State<Arc<BillingUseCase<P, S, Stripe>>>,
    auth: AuthUser,
) -> Result<Json<SubscriberView>, AppError>
where
    P: ProfileRepository + Send + Sync + 'static,
    S: SubscriberRepository + Send + Sync + 'static,
    Stripe: StripeGateway + Send + Sync + 'static,
{
    let view = billing_usecase
        .refresh_subscription(auth.user_id, auth.email)
        .await?;

    Ok(Json(view))
}

pub async fn get_subscription<P, S, Stripe>(
    State(billing_usecase): State<Arc<BillingUseCase<P, S, Stripe>>>,
    auth: AuthUser,
) -> Result<Json<SubscriberView>, AppError>
where
    P: ProfileRepository + Send + Sync + 'static,
    S: SubscriberRepository + Send + Sync + 'static,
    Stripe: StripeGateway + Send + Sync + 'static,
{
    let view = billing_usecase.get_subscription(auth.user_id).await?;

    Ok(Json(view))
}

/// Stripe calls this unauthenticated; the signature header is the
/// credential. Recognized events always get a 200 acknowledgement.
pub async fn webhook<P, S, Stripe>(
    State(billing_usecase): State<Arc<BillingUseCase<P, S, Stripe>>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response
where
    P: ProfileRepository + Send + Sync + 'static,
    S: SubscriberRepository + Send + Sync + 'static,
    Stripe: StripeGateway + Send + Sync + 'static,
{
    let signature = headers
        .get("Stripe-Signature")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    match billing_usecase.handle_stripe_webhook(&body, signature).await {
        Ok(()) => (StatusCode::OK, Json(json!({ "received": true }))).into_response(),
        Err(err) => AppError::from(err).into_response(),
    }
}
