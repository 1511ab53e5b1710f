use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Path, Query, State};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use foundation::{Clock, MarkerId, SystemClock};
use scene::Marker;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::auth::{AuthUser, MaybeUser};
use crate::config::ServerConfig;
use crate::error::ApiResult;
use crate::repo::{
    MapDocument, MapFields, MapFilter, MapSummary, MarkerFields, ProfileUpdate, Registration,
    Repository, UserProfile,
};

/// Marker images are data URLs of up to 10 MB once decoded.
const BODY_LIMIT_BYTES: usize = 16 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            repo: Arc::new(Repository::new()),
            config: Arc::new(config),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_headers(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ]);

    let api = Router::new()
        .route("/users/register", post(register))
        .route("/users/login", post(login))
        .route("/users/profile", get(profile).put(update_profile))
        .route("/maps", get(list_maps).post(create_map))
        .route("/maps/:id", get(get_map).put(update_map).delete(delete_map))
        .route("/maps/:id/features", post(add_feature))
        .route("/maps/:id/markers", get(list_markers).post(add_marker))
        .route(
            "/maps/:id/markers/:marker_id",
            put(update_marker).delete(delete_marker),
        );

    Router::new()
        .route("/health", get(health))
        .nest("/api", api)
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn now() -> foundation::Timestamp {
    SystemClock.now()
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    #[serde(flatten)]
    pub user: UserProfile,
    pub token: Uuid,
}

impl AuthResponse {
    fn issue(state: &AppState, user: UserProfile) -> Self {
        let token = state
            .repo
            .issue_token(user.id, now(), state.config.token_ttl_ms());
        Self { user, token }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FeatureBody {
    pub feature: Option<Value>,
}

async fn health() -> Response {
    (StatusCode::OK, "ok").into_response()
}

async fn register(
    State(state): State<AppState>,
    Json(reg): Json<Registration>,
) -> ApiResult<(StatusCode, Json<AuthResponse>)> {
    let user = state.repo.register(reg, now())?;
    Ok((StatusCode::CREATED, Json(AuthResponse::issue(&state, user))))
}

async fn login(
    State(state): State<AppState>,
    Json(creds): Json<Credentials>,
) -> ApiResult<Json<AuthResponse>> {
    let user = state.repo.login(&creds.email, &creds.password, now())?;
    tracing::info!(user = %user.id, "user logged in");
    Ok(Json(AuthResponse::issue(&state, user)))
}

async fn profile(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> ApiResult<Json<UserProfile>> {
    state.repo.profile(user).map(Json)
}

async fn update_profile(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(update): Json<ProfileUpdate>,
) -> ApiResult<Json<AuthResponse>> {
    let user = state.repo.update_profile(user, update)?;
    Ok(Json(AuthResponse::issue(&state, user)))
}

async fn list_maps(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
    Query(filter): Query<MapFilter>,
) -> Json<Vec<MapSummary>> {
    Json(state.repo.list_maps(viewer, &filter))
}

async fn get_map(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<MapDocument>> {
    state.repo.get_map(id, viewer).map(Json)
}

async fn create_map(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(fields): Json<MapFields>,
) -> ApiResult<(StatusCode, Json<MapDocument>)> {
    let map = state.repo.create_map(user, fields, now())?;
    Ok((StatusCode::CREATED, Json(map)))
}

async fn update_map(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
    Json(fields): Json<MapFields>,
) -> ApiResult<Json<MapDocument>> {
    state.repo.update_map(id, user, fields, now()).map(Json)
}

async fn delete_map(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    state.repo.delete_map(id, user)?;
    Ok(Json(json!({ "message": "Map deleted successfully" })))
}

async fn add_feature(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
    Json(body): Json<FeatureBody>,
) -> ApiResult<Json<MapDocument>> {
    state.repo.add_feature(id, user, body.feature, now()).map(Json)
}

async fn list_markers(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<Marker>>> {
    state.repo.list_markers(id, viewer).map(Json)
}

async fn add_marker(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
    Json(fields): Json<MarkerFields>,
) -> ApiResult<(StatusCode, Json<Marker>)> {
    let marker = state.repo.add_marker(id, user, fields, now())?;
    Ok((StatusCode::CREATED, Json(marker)))
}

async fn update_marker(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path((id, marker_id)): Path<(Uuid, String)>,
    Json(fields): Json<MarkerFields>,
) -> ApiResult<Json<Marker>> {
    state
        .repo
        .update_marker(id, user, &MarkerId::new(marker_id), fields, now())
        .map(Json)
}

async fn delete_marker(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path((id, marker_id)): Path<(Uuid, String)>,
) -> ApiResult<Json<Value>> {
    state
        .repo
        .delete_marker(id, user, &MarkerId::new(marker_id), now())?;
    Ok(Json(json!({ "message": "Marker deleted successfully" })))
}

#[cfg(test)]
mod tests {
    use axum::extract::{FromRequestParts, Path, Query, State};
    use axum::http::{Request, StatusCode};
    use axum::response::IntoResponse;
    use axum::Json;
    use foundation::math::LngLat;
    use serde_json::json;

    use super::*;
    use crate::error::ApiError;

    fn state() -> AppState {
        AppState::new(ServerConfig::from_lookup(|_| None).unwrap())
    }

    async fn signup(state: &AppState, name: &str) -> AuthResponse {
        let reg: Registration = serde_json::from_value(json!({
            "username": name,
            "email": format!("{name}@example.com"),
            "password": "secret",
            "firstName": "Test",
        }))
        .unwrap();
        let (status, Json(body)) = register(State(state.clone()), Json(reg)).await.unwrap();
        assert_eq!(status, StatusCode::CREATED);
        body
    }

    async fn extract<T: FromRequestParts<AppState>>(
        state: &AppState,
        token: Option<Uuid>,
    ) -> Result<T, T::Rejection> {
        let mut builder = Request::builder().uri("/api/maps");
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {token}"));
        }
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        T::from_request_parts(&mut parts, state).await
    }

    #[tokio::test]
    async fn register_then_login_issues_working_tokens() {
        let state = state();
        let ana = signup(&state, "ana").await;
        assert_eq!(ana.user.first_name, "Test");

        let Json(again) = login(
            State(state.clone()),
            Json(Credentials {
                email: "ana@example.com".to_string(),
                password: "secret".to_string(),
            }),
        )
        .await
        .unwrap();
        assert_ne!(again.token, ana.token);

        let AuthUser(user) = extract::<AuthUser>(&state, Some(again.token)).await.unwrap();
        assert_eq!(user, ana.user.id);
        let Json(me) = profile(State(state.clone()), AuthUser(user)).await.unwrap();
        assert_eq!(me.username, "ana");

        let body = serde_json::to_value(&again).unwrap();
        assert_eq!(body["username"], "ana");
        assert!(body.get("password").is_none());
    }

    #[tokio::test]
    async fn extractors_distinguish_anonymous_callers() {
        let state = state();
        assert_eq!(
            extract::<AuthUser>(&state, None).await,
            Err(ApiError::Unauthorized)
        );
        assert_eq!(
            extract::<AuthUser>(&state, Some(Uuid::new_v4())).await,
            Err(ApiError::Unauthorized)
        );
        assert_eq!(
            extract::<MaybeUser>(&state, Some(Uuid::new_v4())).await,
            Ok(MaybeUser(None))
        );
    }

    #[tokio::test]
    async fn map_routes_enforce_ownership() {
        let state = state();
        let ana = signup(&state, "ana").await.user.id;
        let bo = signup(&state, "bo").await.user.id;

        let fields: MapFields = serde_json::from_value(json!({
            "name": "Toubkal trek",
            "center": [-7.0, 31.5],
            "tags": ["hiking"],
        }))
        .unwrap();
        let (status, Json(map)) = create_map(State(state.clone()), AuthUser(ana), Json(fields))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(map.center, LngLat::new(-7.0, 31.5));
        assert!(!map.is_public);

        let err = get_map(State(state.clone()), MaybeUser(Some(bo)), Path(map.id))
            .await
            .unwrap_err();
        assert_eq!(err.clone().into_response().status(), StatusCode::FORBIDDEN);

        let Json(listed) = list_maps(
            State(state.clone()),
            MaybeUser(None),
            Query(MapFilter::default()),
        )
        .await;
        assert!(listed.is_empty());

        let body: FeatureBody = serde_json::from_value(json!({
            "feature": {
                "type": "Feature",
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[0.0, 0.0], [0.0, 0.01], [0.01, 0.01], [0.0, 0.0]]]
                }
            }
        }))
        .unwrap();
        let Json(map) = add_feature(State(state.clone()), AuthUser(ana), Path(map.id), Json(body))
            .await
            .unwrap();
        assert_eq!(map.features.len(), 1);

        let err = add_feature(
            State(state.clone()),
            AuthUser(ana),
            Path(map.id),
            Json(FeatureBody::default()),
        )
        .await
        .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);

        let err = delete_map(State(state.clone()), AuthUser(bo), Path(map.id))
            .await
            .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::FORBIDDEN);
        delete_map(State(state.clone()), AuthUser(ana), Path(map.id))
            .await
            .unwrap();
        let err = get_map(State(state), MaybeUser(Some(ana)), Path(map.id))
            .await
            .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn marker_routes() {
        let state = state();
        let ana = signup(&state, "ana").await.user.id;
        let fields: MapFields = serde_json::from_value(json!({
            "name": "Camps",
            "center": [0.0, 0.0],
            "isPublic": true,
        }))
        .unwrap();
        let (_, Json(map)) = create_map(State(state.clone()), AuthUser(ana), Json(fields))
            .await
            .unwrap();

        let fields: MarkerFields = serde_json::from_value(json!({
            "title": "Spring",
            "location": [0.5, 0.5],
            "icon": "star",
        }))
        .unwrap();
        let (status, Json(marker)) =
            add_marker(State(state.clone()), AuthUser(ana), Path(map.id), Json(fields))
                .await
                .unwrap();
        assert_eq!(status, StatusCode::CREATED);

        let Json(markers) = list_markers(State(state.clone()), MaybeUser(None), Path(map.id))
            .await
            .unwrap();
        assert_eq!(markers, vec![marker.clone()]);

        let err = delete_marker(
            State(state.clone()),
            AuthUser(ana),
            Path((map.id, "missing".to_string())),
        )
        .await
        .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);

        delete_marker(
            State(state.clone()),
            AuthUser(ana),
            Path((map.id, marker.id.as_str().to_string())),
        )
        .await
        .unwrap();
    }
}
