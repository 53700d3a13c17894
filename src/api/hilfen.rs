use std::collections::BTreeSet;
use std::net::IpAddr;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Redirect;
use axum_extra::extract::{CookieJar, SignedCookieJar};
use serde::{Deserialize, Serialize};

use crate::access::evaluator;
use crate::access::ownership::require_owner;
use crate::access::session::AccessSessionStore;
use crate::access::throttle::UnlockThrottle;
use crate::api::viewer::{viewer_session, ClientAddress};
use crate::app::AppState;
use crate::auth::middleware::{current_user, require_user};
use crate::auth::models::AuthenticatedUser;
use crate::config::AppConfig;
use crate::db::models::{
    CreateResponse, Dashboard, DocumentRequest, DocumentSummary, HilfeDocument, ListQuery,
};
use crate::db::repository::DocumentRepository;
use crate::error::AppError;
use crate::rendering::view::{compose, DocumentView};

/// A code submitted for one unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnlockRequest {
    #[serde(default)]
    pub code: String,
}

/// Successful unlock result for asynchronous callers.
///
/// Failures are reported through [`AppError`] as `{success: false, error}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnlockResponse {
    pub success: bool,
    pub unlocked_indices: Vec<usize>,
}

/// Query of the refresh view.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ViewQuery {
    /// Index of the unit whose code was just rejected by the form flow.
    #[serde(default)]
    pub failed: Option<usize>,
}

async fn load(repo: &dyn DocumentRepository, id: &str) -> Result<HilfeDocument, AppError> {
    repo.find_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Document '{}' not found", id)))
}

/// Validate and store a new document. Returns its id and share link.
pub async fn process_create(
    repo: &dyn DocumentRepository,
    config: &AppConfig,
    request: DocumentRequest,
    creator: Option<&AuthenticatedUser>,
) -> Result<CreateResponse, AppError> {
    if creator.is_none() && !config.auth.allow_anonymous_create {
        return Err(AppError::Auth("Log in to create study aids".into()));
    }

    let draft = request.into_draft()?;
    let doc = HilfeDocument::from_draft(draft, creator.map(|u| u.user_id.clone()));
    repo.insert(&doc).await?;

    tracing::info!(
        document_id = %doc.id,
        units = doc.units.len(),
        locked = doc.locked_unit_count(),
        "Created study aid"
    );

    Ok(CreateResponse {
        share_url: config.share_url(&doc.id),
        id: doc.id,
    })
}

/// Project a document for one viewer.
///
/// With `reset` the viewer's unlock state for this document is cleared first.
pub async fn process_view(
    repo: &dyn DocumentRepository,
    sessions: &dyn AccessSessionStore,
    id: &str,
    session_id: &str,
    reset: bool,
    failed_index: Option<usize>,
) -> Result<DocumentView, AppError> {
    let doc = load(repo, id).await?;

    if reset {
        sessions.reset(session_id, &doc.id).await?;
    }

    let visibility = sessions.project_visibility(session_id, &doc).await?;
    Ok(compose(&doc, &visibility, failed_index))
}

/// Check a submitted code and record what it unlocks for this viewer.
///
/// Throttling is keyed on `client`, never on the viewer session. Only a
/// correct code for a gated unit clears the failure count; a submission to
/// an ungated unit proves nothing and leaves it untouched.
#[allow(clippy::too_many_arguments)]
pub async fn process_unlock(
    repo: &dyn DocumentRepository,
    sessions: &dyn AccessSessionStore,
    throttle: &UnlockThrottle,
    client: IpAddr,
    id: &str,
    unit_index: usize,
    session_id: &str,
    code: &str,
) -> Result<UnlockResponse, AppError> {
    let doc = load(repo, id).await?;
    throttle.check(client, &doc.id, chrono::Utc::now())?;

    let unlocked: BTreeSet<usize> = match evaluator::evaluate(&doc, unit_index, code) {
        Ok(unlocked) => unlocked,
        Err(AppError::IncorrectCode(index)) => {
            tracing::warn!(document_id = %doc.id, unit = index, "Incorrect code submitted");
            throttle.record_failure(client, &doc.id, chrono::Utc::now());
            return Err(AppError::IncorrectCode(index));
        }
        Err(e) => return Err(e),
    };

    if !unlocked.is_empty() {
        sessions.record_unlock(session_id, &doc.id, &unlocked).await?;
        throttle.record_success(client, &doc.id);
        tracing::debug!(document_id = %doc.id, units = ?unlocked, "Units unlocked");
    }

    Ok(UnlockResponse {
        success: true,
        unlocked_indices: unlocked.into_iter().collect(),
    })
}

/// The full document, lock codes included, for its owner's edit form.
pub async fn process_edit_view(
    repo: &dyn DocumentRepository,
    id: &str,
    requester: Option<&AuthenticatedUser>,
) -> Result<HilfeDocument, AppError> {
    let doc = load(repo, id).await?;
    require_owner(&doc, requester.map(|u| u.user_id.as_str()))?;
    Ok(doc)
}

/// Replace title, subject and the whole unit list of an owned document.
///
/// When any index changes its lock code, every viewer is re-locked.
pub async fn process_replace(
    repo: &dyn DocumentRepository,
    sessions: &dyn AccessSessionStore,
    id: &str,
    request: DocumentRequest,
    requester: Option<&AuthenticatedUser>,
) -> Result<HilfeDocument, AppError> {
    let current = load(repo, id).await?;
    require_owner(&current, requester.map(|u| u.user_id.as_str()))?;

    let expected_revision = request.expected_revision;
    let draft = request.into_draft()?;
    let replaced = current.replaced_with(draft);
    repo.replace(&replaced, expected_revision).await?;

    if !current.same_gating(&replaced) {
        sessions.forget_document(&replaced.id).await?;
        tracing::info!(document_id = %replaced.id, "Lock codes changed, viewers re-locked");
    }

    tracing::info!(
        document_id = %replaced.id,
        revision = replaced.revision,
        "Replaced study aid"
    );
    Ok(replaced)
}

/// Delete an owned document and forget every viewer's unlock state for it.
pub async fn process_delete(
    repo: &dyn DocumentRepository,
    sessions: &dyn AccessSessionStore,
    id: &str,
    requester: Option<&AuthenticatedUser>,
) -> Result<(), AppError> {
    let doc = load(repo, id).await?;
    require_owner(&doc, requester.map(|u| u.user_id.as_str()))?;

    repo.delete(&doc.id).await?;
    if let Err(e) = sessions.forget_document(&doc.id).await {
        tracing::warn!("Failed to drop access sessions of deleted document: {e}");
    }

    tracing::info!(document_id = %doc.id, "Deleted study aid");
    Ok(())
}

/// The owner's documents plus the subjects used across all of them.
pub async fn process_dashboard(
    repo: &dyn DocumentRepository,
    config: &AppConfig,
    owner: &AuthenticatedUser,
    query: &ListQuery,
) -> Result<Dashboard, AppError> {
    let all = repo.list_by_owner(&owner.user_id, &ListQuery::default()).await?;
    let subjects: BTreeSet<String> = all.into_iter().filter_map(|d| d.subject).collect();

    let hilfen = repo
        .list_by_owner(&owner.user_id, query)
        .await?
        .into_iter()
        .map(|doc| DocumentSummary {
            share_url: config.share_url(&doc.id),
            unit_count: doc.units.len(),
            locked_unit_count: doc.locked_unit_count(),
            id: doc.id,
            title: doc.title,
            subject: doc.subject,
            created_at: doc.created_at,
            updated_at: doc.updated_at,
        })
        .collect();

    Ok(Dashboard {
        hilfen,
        subjects: subjects.into_iter().collect(),
    })
}

/// `POST /api/v1/hilfen`
pub async fn create_handler(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    axum::Json(request): axum::Json<DocumentRequest>,
) -> Result<(StatusCode, axum::Json<CreateResponse>), AppError> {
    let creator = current_user(&jar, state.config.auth.demo_mode);
    let response = process_create(
        state.document_repo.as_ref(),
        &state.config,
        request,
        creator.as_ref(),
    )
    .await?;

    Ok((StatusCode::CREATED, axum::Json(response)))
}

/// `GET /hilfe/{id}`: a visit through the share link.
///
/// Re-locks the document for this viewer when `viewer.reset_on_view` is set.
pub async fn visit_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(id): Path<String>,
) -> Result<(CookieJar, axum::Json<DocumentView>), AppError> {
    let (jar, session_id) = viewer_session(jar, &state.config.viewer.cookie_name);
    let view = process_view(
        state.document_repo.as_ref(),
        state.access_sessions.as_ref(),
        &id,
        &session_id,
        state.config.viewer.reset_on_view,
        None,
    )
    .await?;

    Ok((jar, axum::Json(view)))
}

/// `GET /api/v1/hilfen/{id}`: refresh of the viewer projection.
pub async fn view_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(id): Path<String>,
    Query(query): Query<ViewQuery>,
) -> Result<(CookieJar, axum::Json<DocumentView>), AppError> {
    let (jar, session_id) = viewer_session(jar, &state.config.viewer.cookie_name);
    let view = process_view(
        state.document_repo.as_ref(),
        state.access_sessions.as_ref(),
        &id,
        &session_id,
        false,
        query.failed,
    )
    .await?;

    Ok((jar, axum::Json(view)))
}

/// `POST /api/v1/hilfen/{id}/unlock/{index}`: unlock for asynchronous callers.
pub async fn unlock_handler(
    State(state): State<AppState>,
    ClientAddress(client): ClientAddress,
    jar: CookieJar,
    Path((id, index)): Path<(String, usize)>,
    axum::Json(request): axum::Json<UnlockRequest>,
) -> Result<(CookieJar, axum::Json<UnlockResponse>), AppError> {
    let (jar, session_id) = viewer_session(jar, &state.config.viewer.cookie_name);
    let response = process_unlock(
        state.document_repo.as_ref(),
        state.access_sessions.as_ref(),
        &state.unlock_throttle,
        client,
        &id,
        index,
        &session_id,
        &request.code,
    )
    .await?;

    Ok((jar, axum::Json(response)))
}

/// `POST /hilfe/{id}/unlock/{index}`: form submission.
///
/// Redirects to the refresh view; a rejected code is flagged there.
pub async fn unlock_form_handler(
    State(state): State<AppState>,
    ClientAddress(client): ClientAddress,
    jar: CookieJar,
    Path((id, index)): Path<(String, usize)>,
    axum::Form(request): axum::Form<UnlockRequest>,
) -> Result<(CookieJar, Redirect), AppError> {
    let (jar, session_id) = viewer_session(jar, &state.config.viewer.cookie_name);
    let result = process_unlock(
        state.document_repo.as_ref(),
        state.access_sessions.as_ref(),
        &state.unlock_throttle,
        client,
        &id,
        index,
        &session_id,
        &request.code,
    )
    .await;

    let target = match result {
        Ok(_) => format!("/api/v1/hilfen/{}", id),
        Err(AppError::IncorrectCode(failed)) => {
            format!("/api/v1/hilfen/{}?failed={}", id, failed)
        }
        Err(e) => return Err(e),
    };

    Ok((jar, Redirect::to(&target)))
}

/// `GET /api/v1/hilfen/{id}/edit`
pub async fn edit_view_handler(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Path(id): Path<String>,
) -> Result<axum::Json<HilfeDocument>, AppError> {
    let requester = current_user(&jar, state.config.auth.demo_mode);
    let doc = process_edit_view(state.document_repo.as_ref(), &id, requester.as_ref()).await?;
    Ok(axum::Json(doc))
}

/// `PUT /api/v1/hilfen/{id}`
pub async fn replace_handler(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Path(id): Path<String>,
    axum::Json(request): axum::Json<DocumentRequest>,
) -> Result<axum::Json<HilfeDocument>, AppError> {
    let requester = current_user(&jar, state.config.auth.demo_mode);
    let doc = process_replace(
        state.document_repo.as_ref(),
        state.access_sessions.as_ref(),
        &id,
        request,
        requester.as_ref(),
    )
    .await?;

    Ok(axum::Json(doc))
}

/// `DELETE /api/v1/hilfen/{id}`
pub async fn delete_handler(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let requester = current_user(&jar, state.config.auth.demo_mode);
    process_delete(
        state.document_repo.as_ref(),
        state.access_sessions.as_ref(),
        &id,
        requester.as_ref(),
    )
    .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/v1/hilfen`: the logged-in creator's dashboard.
pub async fn dashboard_handler(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Query(query): Query<ListQuery>,
) -> Result<axum::Json<Dashboard>, AppError> {
    let owner = require_user(&jar, state.config.auth.demo_mode)?;
    let dashboard =
        process_dashboard(state.document_repo.as_ref(), &state.config, &owner, &query).await?;
    Ok(axum::Json(dashboard))
}
