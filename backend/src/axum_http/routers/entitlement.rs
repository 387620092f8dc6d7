use std::sync::Arc;

use axum::{Json, Router, extract::State, response::IntoResponse, routing::get};

use crate::auth::AuthUser;
use crate::usecases::entitlement::EntitlementResolver;
use crates::{
    domain::repositories::{profiles::ProfileRepository, usage::UsageRepository},
    infra::db::{
        postgres::postgres_connection::PgPoolSquad,
        repositories::{profiles::ProfilePostgres, usage::UsagePostgres},
    },
};

pub fn routes(db_pool: Arc<PgPoolSquad>) -> Router {
    let profile_repo = Arc::new(ProfilePostgres::new(Arc::clone(&db_pool)));
    let usage_repo = Arc::new(UsagePostgres::new(Arc::clone(&db_pool)));
    let entitlement_resolver = EntitlementResolver::new(profile_repo, usage_repo);

    Router::new()
        .route("/", get(check_entitlement))
        .with_state(Arc::new(entitlement_resolver))
}

/// Advisory quota view for the client UI. Enforcement happens inside the
/// generation endpoints regardless of what this returns.
pub async fn check_entitlement<P, U>(
    State(entitlement_resolver): State<Arc<EntitlementResolver<P, U>>>,
    auth: AuthUser,
) -> impl IntoResponse
where
    P: ProfileRepository + Send + Sync + 'static,
    U: UsageRepository + Send + Sync + 'static,
{
    Json(entitlement_resolver.resolve(auth.user_id).await)
}
