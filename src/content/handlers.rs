use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Multipart, Path, Query, State,
    },
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::Serialize;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    assets::MultipartForm,
    auth::{
        dto::MessageResponse,
        jwt::{AuthUser, MaybeAuthUser},
    },
    content::{
        dto::{
            ContactRequest, DataResponse, EducationInput, ExperienceInput, Pagination, ProfileView,
            ServiceInput, SkillInput, TechnologyImage,
        },
        repo_types::{Blog, BlogSummary, Education, Experience, Profile, Service, Skill, Technology},
        services::{self, HOMEPAGE_BLOGS},
    },
    error::{AppError, AppResult},
    state::AppState,
};

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/get-profile", get(get_profile))
        .route("/get-education", get(get_education))
        .route("/get-experience", get(get_experience))
        .route("/get-skill", get(get_skill))
        .route("/get-services", get(get_services))
        .route("/get-technology", get(get_technology))
        .route("/get-blogs", get(get_blogs))
        .route("/homepage-blogs", get(homepage_blogs))
        .route("/blog/:id", get(get_blog))
        .route("/contact", post(contact))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route("/update-profile", post(update_profile))
        .route("/add-education", post(add_education))
        .route("/add-experience", post(add_experience))
        .route("/add-skill", post(add_skill))
        .route("/add-services", post(add_services))
        .route("/add-technology", post(add_technology))
        .route("/add-blog", post(add_blog))
        .route("/update-blog/:id", put(update_blog))
        .route("/delete-blog/:id", delete(delete_blog))
}

/// Sections are replaced as a whole list; a single object is not accepted.
fn entries<T>(payload: Result<Json<Vec<T>>, JsonRejection>) -> AppResult<Vec<T>> {
    let Json(entries) = payload.map_err(|e| match e {
        JsonRejection::JsonDataError(_) => {
            AppError::Validation("expected a JSON array of entries".into())
        }
        other => AppError::from(other),
    })?;
    Ok(entries)
}

// --- profile ---

#[instrument(skip(state, mp))]
pub async fn update_profile(
    State(state): State<AppState>,
    AuthUser(admin_id): AuthUser,
    mp: Multipart,
) -> AppResult<Json<DataResponse<Profile>>> {
    let form = MultipartForm::read(mp).await?;
    let profile = services::update_profile(&state, admin_id, form).await?;
    Ok(Json(DataResponse::new("Profile saved successfully", profile)))
}

#[instrument(skip(state))]
pub async fn get_profile(
    State(state): State<AppState>,
    MaybeAuthUser(caller): MaybeAuthUser,
) -> AppResult<Json<DataResponse<ProfileView>>> {
    let view = services::load_profile(&state, caller).await?;
    Ok(Json(DataResponse::new("Profile data fetched successfully", view)))
}

// --- sections ---

#[instrument(skip(state, payload))]
pub async fn add_education(
    State(state): State<AppState>,
    AuthUser(admin_id): AuthUser,
    payload: Result<Json<Vec<EducationInput>>, JsonRejection>,
) -> AppResult<Json<Vec<Education>>> {
    let valid = entries(payload)?
        .iter()
        .map(EducationInput::validate)
        .collect::<AppResult<Vec<_>>>()?;
    let saved = state.content.replace_education(admin_id, &valid).await?;
    info!(admin_id = %admin_id, count = saved.len(), "education replaced");
    Ok(Json(saved))
}

#[instrument(skip(state))]
pub async fn get_education(State(state): State<AppState>) -> AppResult<Json<Vec<Education>>> {
    Ok(Json(state.content.list_education().await?))
}

#[instrument(skip(state, payload))]
pub async fn add_experience(
    State(state): State<AppState>,
    AuthUser(admin_id): AuthUser,
    payload: Result<Json<Vec<ExperienceInput>>, JsonRejection>,
) -> AppResult<Json<Vec<Experience>>> {
    let valid = entries(payload)?
        .iter()
        .map(ExperienceInput::validate)
        .collect::<AppResult<Vec<_>>>()?;
    let saved = state.content.replace_experience(admin_id, &valid).await?;
    info!(admin_id = %admin_id, count = saved.len(), "experience replaced");
    Ok(Json(saved))
}

#[instrument(skip(state))]
pub async fn get_experience(State(state): State<AppState>) -> AppResult<Json<Vec<Experience>>> {
    Ok(Json(state.content.list_experience().await?))
}

#[instrument(skip(state, payload))]
pub async fn add_skill(
    State(state): State<AppState>,
    AuthUser(admin_id): AuthUser,
    payload: Result<Json<Vec<SkillInput>>, JsonRejection>,
) -> AppResult<Json<Vec<Skill>>> {
    let valid = entries(payload)?
        .iter()
        .map(SkillInput::validate)
        .collect::<AppResult<Vec<_>>>()?;
    let saved = state.content.replace_skills(admin_id, &valid).await?;
    info!(admin_id = %admin_id, count = saved.len(), "skills replaced");
    Ok(Json(saved))
}

#[instrument(skip(state))]
pub async fn get_skill(State(state): State<AppState>) -> AppResult<Json<Vec<Skill>>> {
    Ok(Json(state.content.list_skills().await?))
}

#[instrument(skip(state, payload))]
pub async fn add_services(
    State(state): State<AppState>,
    AuthUser(admin_id): AuthUser,
    payload: Result<Json<Vec<ServiceInput>>, JsonRejection>,
) -> AppResult<Json<Vec<Service>>> {
    let valid = entries(payload)?
        .iter()
        .map(ServiceInput::validate)
        .collect::<AppResult<Vec<_>>>()?;
    let saved = state.content.replace_services(admin_id, &valid).await?;
    info!(admin_id = %admin_id, count = saved.len(), "services replaced");
    Ok(Json(saved))
}

#[instrument(skip(state))]
pub async fn get_services(State(state): State<AppState>) -> AppResult<Json<Vec<Service>>> {
    Ok(Json(state.content.list_services().await?))
}

// --- technology ---

#[instrument(skip(state, mp))]
pub async fn add_technology(
    State(state): State<AppState>,
    AuthUser(admin_id): AuthUser,
    mp: Multipart,
) -> AppResult<Json<DataResponse<Vec<Technology>>>> {
    let form = MultipartForm::read(mp).await?;
    let inserted = services::replace_technologies(&state, admin_id, form).await?;
    Ok(Json(DataResponse::new("Technologies added successfully", inserted)))
}

#[instrument(skip(state))]
pub async fn get_technology(State(state): State<AppState>) -> AppResult<Json<Vec<TechnologyImage>>> {
    let images = state
        .content
        .list_technologies()
        .await?
        .into_iter()
        .map(|t| TechnologyImage { image: t.image })
        .collect();
    Ok(Json(images))
}

// --- blogs ---

#[instrument(skip(state, mp))]
pub async fn add_blog(
    State(state): State<AppState>,
    AuthUser(admin_id): AuthUser,
    mp: Multipart,
) -> AppResult<Json<DataResponse<Blog>>> {
    let form = MultipartForm::read(mp).await?;
    let blog = services::create_blog(&state, admin_id, form).await?;
    Ok(Json(DataResponse::new("Blog saved successfully", blog)))
}

#[instrument(skip(state, id, mp))]
pub async fn update_blog(
    State(state): State<AppState>,
    AuthUser(admin_id): AuthUser,
    id: Result<Path<Uuid>, PathRejection>,
    mp: Multipart,
) -> AppResult<Json<DataResponse<Blog>>> {
    let Path(id) = id?;
    let form = MultipartForm::read(mp).await?;
    let blog = services::update_blog(&state, id, admin_id, form).await?;
    Ok(Json(DataResponse::new("Blog updated successfully", blog)))
}

#[derive(Debug, Serialize)]
pub struct DeletedResponse {
    pub success: bool,
    pub message: String,
}

#[instrument(skip(state, id))]
pub async fn delete_blog(
    State(state): State<AppState>,
    AuthUser(admin_id): AuthUser,
    id: Result<Path<Uuid>, PathRejection>,
) -> AppResult<Json<DeletedResponse>> {
    let Path(id) = id?;
    services::delete_blog(&state, id, admin_id).await?;
    Ok(Json(DeletedResponse {
        success: true,
        message: "Blog and related files deleted successfully".into(),
    }))
}

#[instrument(skip(state, p))]
pub async fn get_blogs(
    State(state): State<AppState>,
    p: Result<Query<Pagination>, QueryRejection>,
) -> AppResult<Json<Vec<Blog>>> {
    let Query(p) = p?;
    let (limit, offset) = p.clamped();
    Ok(Json(state.content.list_blogs(limit, offset).await?))
}

#[instrument(skip(state))]
pub async fn homepage_blogs(State(state): State<AppState>) -> AppResult<Json<Vec<BlogSummary>>> {
    Ok(Json(state.content.recent_blogs(HOMEPAGE_BLOGS).await?))
}

#[instrument(skip(state, id))]
pub async fn get_blog(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> AppResult<Json<Blog>> {
    let Path(id) = id?;
    let blog = state
        .content
        .find_blog(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Blog not found".into()))?;
    Ok(Json(blog))
}

// --- contact ---

#[instrument(skip(state, payload))]
pub async fn contact(
    State(state): State<AppState>,
    payload: Result<Json<ContactRequest>, JsonRejection>,
) -> AppResult<Json<MessageResponse>> {
    let Json(payload) = payload?;
    services::send_contact(&state, &payload).await?;
    Ok(Json(MessageResponse::new("Message sent successfully")))
}
