use std::sync::Arc;

use axum::{Json, Router, extract::State, routing::post};
use serde::Serialize;

use crate::auth::AuthUser;
use crate::axum_http::error_responses::AppError;
use crate::config::config_model::DotEnvyConfig;
use crate::usecases::{
    entitlement::EntitlementResolver,
    generation::{GenerationGateway, GenerationUseCase},
    prompts::{
        self, EvaluationRequest, LessonPlanRequest, NewsletterRequest,
    },
};
use crates::{
    domain::repositories::{profiles::ProfileRepository, usage::UsageRepository},
    generation::client::GenerationClient,
    infra::db::{
        postgres::postgres_connection::PgPoolSquad,
        repositories::{profiles::ProfilePostgres, usage::UsagePostgres},
    },
};

pub fn routes(db_pool: Arc<PgPoolSquad>, config: Arc<DotEnvyConfig>) -> Router {
    let profile_repo = Arc::new(ProfilePostgres::new(Arc::clone(&db_pool)));
    let usage_repo = Arc::new(UsagePostgres::new(Arc::clone(&db_pool)));
    let entitlement_resolver = Arc::new(EntitlementResolver::new(
        Arc::clone(&profile_repo),
        Arc::clone(&usage_repo),
    ));
    let generation_client = Arc::new(GenerationClient::new(
        config.generation.api_key.clone(),
        config.generation.endpoint.clone(),
        config.generation.model.clone(),
    ));
    let generation_usecase =
        GenerationUseCase::new(entitlement_resolver, usage_repo, generation_client);

    Router::new()
        .route("/lesson-plan", post(lesson_plan))
        .route("/evaluation", post(evaluation))
        .route("/newsletter", post(newsletter))
        .with_state(Arc::new(generation_usecase))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonPlanResponse {
    pub lesson_plan: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationResponse {
    pub evaluation: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsletterResponse {
    pub newsletter: String,
}

pub async fn lesson_plan<P, U, G>(
    State(generation_usecase): State<Arc<GenerationUseCase<P, U, G>>>,
    auth: AuthUser,
    Json(request): Json<LessonPlanRequest>,
) -> Result<Json<LessonPlanResponse>, AppError>
where
    P: ProfileRepository + Send + Sync + 'static,
    U: UsageRepository + Send + Sync + 'static,
    G: GenerationGateway + Send + Sync + 'static,
{
    let prompt = prompts::lesson_plan_prompt(&request);
    let lesson_plan = generation_usecase
        .generate(auth.user_id, "lesson_plan", prompt)
        .await?;

    Ok(Json(LessonPlanResponse { lesson_plan }))
}

pub async fn evaluation<P, U, G>(
    State(generation_usecase): State<Arc<GenerationUseCase<P, U, G>>>,
    auth: AuthUser,
    Json(request): Json<EvaluationRequest>,
) -> Result<Json<EvaluationResponse>, AppError>
where
    P: ProfileRepository + Send + Sync + 'static,
    U: UsageRepository + Send + Sync + 'static,
    G: GenerationGateway + Send + Sync + 'static,
{
    let prompt = prompts::evaluation_prompt(&request);
    let evaluation = generation_usecase
        .generate(auth.user_id, "evaluation", prompt)
        .await?;

    Ok(Json(EvaluationResponse { evaluation }))
}

pub async fn newsletter<P, U, G>(
    State(generation_usecase): State<Arc<GenerationUseCase<P, U, G>>>,
    auth: AuthUser,
    Json(request): Json<NewsletterRequest>,
) -> Result<Json<NewsletterResponse>, AppError>
where
    P: ProfileRepository + Send + Sync + 'static,
    U: UsageRepository + Send + Sync + 'static,
    G: GenerationGateway + Send + Sync + 'static,
{
    let prompt = prompts::newsletter_prompt(&request);
    let newsletter = generation_usecase
        .generate(auth.user_id, "newsletter", prompt)
        .await?;

    Ok(Json(NewsletterResponse { newsletter }))
}
