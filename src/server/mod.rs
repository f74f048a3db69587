use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::{multipart::MultipartRejection, DefaultBodyLimit, FromRef, Multipart, Path, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
    Router,
};
use axum_extra::extract::cookie::{Cookie, Key, SignedCookieJar};
use rand::RngCore;
use sha2::{Digest, Sha512};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    config::ServerConfig,
    core::{
        engine::{load_model, SharedModel},
        pipeline::{Pipeline, PipelineOptions, Upload},
    },
    error::{ErrorKind, Result, StemError},
    store::StemStore,
};

pub mod flash;
pub mod views;

const JOB_COOKIE: &str = "stem_job";

#[derive(Clone)]
pub struct AppState {
    pipeline: Pipeline,
    store: Arc<StemStore>,
    key: Key,
    max_duration_secs: f64,
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Self {
        state.key.clone()
    }
}

impl AppState {
    pub fn new(cfg: &ServerConfig, model: SharedModel) -> Self {
        let pipeline = Pipeline::new(
            model,
            PipelineOptions {
                max_duration_secs: cfg.max_duration_secs,
                package: cfg.package.clone(),
            },
        );
        Self {
            pipeline,
            store: Arc::new(StemStore::new(cfg.stem_ttl)),
            key: signing_key(cfg.secret_key.as_deref()),
            max_duration_secs: cfg.max_duration_secs,
        }
    }
}

/// Cookie signing key derived from `SECRET_KEY`. Without one, a random key
/// is used, so flashes do not survive a restart.
fn signing_key(secret: Option<&str>) -> Key {
    match secret.filter(|s| !s.is_empty()) {
        Some(secret) => Key::from(Sha512::digest(secret.as_bytes()).as_slice()),
        None => {
            warn!("SECRET_KEY is not set; using a random per-process session key");
            let mut bytes = [0u8; 64];
            rand::thread_rng().fill_bytes(&mut bytes);
            Key::from(&bytes[..])
        }
    }
}

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(upload_form).post(upload_file))
        .route("/download/:filename", get(download_latest))
        .route("/download/:job/:filename", get(download_file))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state)
}

fn flash_redirect(jar: SignedCookieJar, err: &StemError) -> Response {
    match err.kind() {
        ErrorKind::Validation => info!(error = %err, "upload rejected"),
        kind => error!(error = %err, ?kind, "upload failed"),
    }
    (flash::push(jar, err.to_string()), Redirect::to("/")).into_response()
}

// ═══════════════════════════════════════════════════════════════
// GET /
// ═══════════════════════════════════════════════════════════════

async fn upload_form(State(st): State<AppState>, jar: SignedCookieJar) -> impl IntoResponse {
    let (jar, messages) = flash::take(jar);
    (jar, Html(views::upload_page(&messages, st.max_duration_secs)))
}

// ═══════════════════════════════════════════════════════════════
// POST /
// ═══════════════════════════════════════════════════════════════

async fn read_upload(multipart: std::result::Result<Multipart, MultipartRejection>) -> Result<Upload> {
    // A body that is not multipart at all has no file part either.
    let Ok(mut multipart) = multipart else {
        return Err(StemError::NoFilePart);
    };

    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().map(str::to_owned);
        // Validate before buffering the body.
        Upload::new(file_name.as_deref(), Bytes::new())?;
        let bytes = field.bytes().await?;
        return Upload::new(file_name.as_deref(), bytes);
    }

    Err(StemError::NoFilePart)
}

async fn upload_file(
    State(st): State<AppState>,
    jar: SignedCookieJar,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Response {
    let upload = match read_upload(multipart).await {
        Ok(upload) => upload,
        Err(e) => return flash_redirect(jar, &e),
    };
    info!(file = %upload.file_name(), bytes = upload.len(), "upload accepted");

    let pipeline = st.pipeline.clone();
    let outcome = tokio::task::spawn_blocking(move || pipeline.run(&upload))
        .await
        .unwrap_or_else(|e| Err(StemError::Anyhow(anyhow::anyhow!("worker task failed: {e}"))));

    match outcome {
        Ok(output) => {
            let job = st.store.insert(output.track.clone(), output.stems.clone());
            let page = views::download_page(job, &output.track, &output.stems, output.truncated);
            let cookie = Cookie::build((JOB_COOKIE, job.to_string()))
                .path("/")
                .http_only(true)
                .build();
            (jar.add(cookie), Html(page)).into_response()
        }
        Err(e) => flash_redirect(jar, &e),
    }
}

// ═══════════════════════════════════════════════════════════════
// GET /download/:job/:filename and /download/:filename
// ═══════════════════════════════════════════════════════════════

fn not_found(jar: SignedCookieJar, filename: &str) -> Response {
    info!(%filename, "download miss");
    (flash::push(jar, "File not found."), Redirect::to("/")).into_response()
}

fn serve_stem(st: &AppState, jar: SignedCookieJar, job: Option<Uuid>, filename: &str) -> Response {
    let Some(stem) = job.and_then(|id| st.store.get(&id, filename)) else {
        return not_found(jar, filename);
    };

    let disposition = format!("attachment; filename=\"{}\"", stem.file_name);
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, stem.mime.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        Body::from(stem.bytes),
    )
        .into_response()
}

async fn download_file(
    State(st): State<AppState>,
    jar: SignedCookieJar,
    Path((job, filename)): Path<(String, String)>,
) -> Response {
    let job = Uuid::parse_str(&job).ok();
    serve_stem(&st, jar, job, &filename)
}

/// Resolves `filename` against the job remembered in the session cookie.
async fn download_latest(
    State(st): State<AppState>,
    jar: SignedCookieJar,
    Path(filename): Path<String>,
) -> Response {
    let job = jar
        .get(JOB_COOKIE)
        .and_then(|c| Uuid::parse_str(c.value()).ok());
    serve_stem(&st, jar, job, &filename)
}

// ═══════════════════════════════════════════════════════════════
// Startup
// ═══════════════════════════════════════════════════════════════

/// Loads the model off the async runtime. A failure is logged and turned into
/// an unavailable slot; the server still starts.
pub async fn load_shared_model(cfg: &ServerConfig) -> SharedModel {
    let model_cfg = cfg.model.clone();
    let params = cfg.inference;
    let loaded = tokio::task::spawn_blocking(move || load_model(&model_cfg, params)).await;

    match loaded {
        Ok(Ok(separator)) => SharedModel::ready(separator),
        Ok(Err(e)) => {
            error!(error = %e, model = %cfg.model.name, "model loading failed; serving without a model");
            SharedModel::Unavailable(e.to_string().into())
        }
        Err(e) => {
            error!(error = %e, "model loading task failed");
            SharedModel::Unavailable(format!("model loader crashed: {e}").into())
        }
    }
}

/// Periodically drops expired jobs from the store.
pub fn spawn_sweeper(store: Arc<StemStore>) -> tokio::task::JoinHandle<()> {
    let period = (store.ttl() / 2).max(std::time::Duration::from_secs(1));
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(period);
        loop {
            tick.tick().await;
            let purged = store.purge_expired();
            if purged > 0 {
                info!(purged, remaining = store.len(), "expired stem jobs purged");
            }
        }
    })
}

pub async fn serve(listener: TcpListener, state: AppState, max_upload_bytes: usize) -> Result<()> {
    let _sweeper = spawn_sweeper(state.store.clone());
    let app = router(state, max_upload_bytes);
    axum::serve(listener, app).await?;
    Ok(())
}

pub async fn run_server(cfg: ServerConfig) -> Result<()> {
    cfg.validate()?;

    let model = load_shared_model(&cfg).await;
    let state = AppState::new(&cfg, model);

    let listener = TcpListener::bind(cfg.listen_addr).await?;
    info!(addr = %cfg.listen_addr, "stem splitter listening");

    serve(listener, state, cfg.max_upload_bytes).await
}
