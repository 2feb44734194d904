//! Web upload form and JSON API

use crate::config::{Config, ServerConfig};
use crate::error::{Result as SatbResult, SatbError};
use crate::services::{identify_recording, Credentials, SongMatcher};
use crate::{GenerateOptions, GenerationOutput, OutputFormat, SatbGenerator, SolfegeSystem};
use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

const INDEX_HTML: &str = include_str!("../static/index.html");

/// Extensions accepted for recognition uploads
const RECORDING_EXTENSIONS: [&str; 4] = ["mp3", "webm", "wav", "ogg"];

/// Shared state for web handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub generator: Arc<SatbGenerator>,
    pub credentials: Arc<Credentials>,
}

impl AppState {
    pub fn new(config: Config, credentials: Credentials) -> Self {
        Self {
            generator: Arc::new(SatbGenerator::new(config.clone())),
            config: Arc::new(config),
            credentials: Arc::new(credentials),
        }
    }

    fn dirs(&self) -> &ServerConfig {
        &self.config.server
    }
}

/// JSON error body `{"error": "..."}` with a status code
#[derive(Debug)]
pub struct ApiError(StatusCode, String);

impl ApiError {
    fn bad_request(msg: impl Into<String>) -> Self {
        Self(StatusCode::BAD_REQUEST, msg.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(json!({ "error": self.1 }))).into_response()
    }
}

impl From<SatbError> for ApiError {
    fn from(err: SatbError) -> Self {
        let status = match &err {
            SatbError::InputValidationError(_)
            | SatbError::InvalidAudioFormat(_)
            | SatbError::UnsupportedSampleRate(_) => StatusCode::BAD_REQUEST,
            SatbError::MissingCredentials(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self(status, err.to_string())
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Create the upload, results, audio and recordings directories
pub fn prepare_dirs(server: &ServerConfig) -> SatbResult<()> {
    for dir in [&server.upload_dir, &server.results_dir, &server.audio_dir, &server.recordings_dir] {
        std::fs::create_dir_all(dir)?;
    }
    Ok(())
}

pub fn router(state: AppState) -> Router {
    let dirs = state.dirs().clone();
    Router::new()
        .route("/", get(serve_index))
        .route("/upload", post(upload_file))
        .route("/api/match", post(api_match))
        .route("/api/generate", post(api_generate))
        .route("/api/identify", post(api_identify))
        .nest_service("/results", ServeDir::new(&dirs.results_dir))
        .nest_service("/audio", ServeDir::new(&dirs.audio_dir))
        .nest_service("/recordings", ServeDir::new(&dirs.recordings_dir))
        .layer(DefaultBodyLimit::max(dirs.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until the process is stopped
pub async fn serve(config: Config, credentials: Credentials) -> SatbResult<()> {
    prepare_dirs(&config.server)?;
    let bind = config.server.bind.clone();
    let app = router(AppState::new(config, credentials));

    let listener = tokio::net::TcpListener::bind(&bind).await?;
    tracing::info!("Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}

/// Reduce a client-supplied file name to a safe basename
///
/// Path separators and whitespace become `_`, characters outside
/// `[A-Za-z0-9._-]` are dropped, and leading or trailing `.`/`_` are trimmed.
pub fn secure_filename(name: &str) -> Option<String> {
    let spaced = name.replace(['/', '\\'], " ");
    let joined = spaced.split_whitespace().collect::<Vec<_>>().join("_");
    let kept: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();
    let trimmed = kept.trim_matches(|c| c == '.' || c == '_');
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn extension_of(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// URL under which a generated file is served, if it lives in a served directory
fn public_url(dirs: &ServerConfig, path: &Path) -> Option<String> {
    [("/results", &dirs.results_dir), ("/audio", &dirs.audio_dir)]
        .into_iter()
        .find_map(|(prefix, dir)| {
            let rel = path.strip_prefix(dir).ok()?;
            let rel: Vec<_> = rel.iter().filter_map(|c| c.to_str()).collect();
            Some(format!("{}/{}", prefix, rel.join("/")))
        })
}

async fn serve_index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// An uploaded multipart file
struct Upload {
    file_name: String,
    bytes: Vec<u8>,
}

/// First field among `names` in a multipart body
async fn read_upload(multipart: &mut Multipart, names: &[&str]) -> ApiResult<Option<Upload>> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart body: {}", e)))?
    {
        let Some(name) = field.name() else { continue };
        if !names.contains(&name) {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(format!("Failed to read upload: {}", e)))?;
        return Ok(Some(Upload { file_name, bytes: bytes.to_vec() }));
    }
    Ok(None)
}

/// Run a generation on the blocking pool
async fn run_generation(state: &AppState, input: PathBuf, options: GenerateOptions) -> ApiResult<GenerationOutput> {
    let generator = state.generator.clone();
    let output = tokio::task::spawn_blocking(move || generator.generate(&input, &options))
        .await
        .map_err(|e| ApiError(StatusCode::INTERNAL_SERVER_ERROR, format!("generation task failed: {}", e)))?;
    Ok(output?)
}

#[derive(Debug, Serialize)]
struct UploadResponse {
    message: String,
    files: BTreeMap<String, String>,
    basename: String,
    #[serde(rename = "type")]
    kind: &'static str,
}

async fn upload_file(State(state): State<AppState>, mut multipart: Multipart) -> ApiResult<Json<UploadResponse>> {
    let upload = read_upload(&mut multipart, &["file"])
        .await?
        .ok_or_else(|| ApiError::bad_request("No file part"))?;

    if upload.file_name.is_empty() {
        return Err(ApiError::bad_request("No selected file"));
    }
    if extension_of(&upload.file_name).as_deref() != Some("mp3") {
        return Err(ApiError::bad_request("Only MP3 files are supported"));
    }
    let filename = secure_filename(&upload.file_name).ok_or_else(|| ApiError::bad_request("No selected file"))?;

    let dirs = state.dirs();
    let path = dirs.upload_dir.join(&filename);
    tokio::fs::write(&path, &upload.bytes)
        .await
        .map_err(|e| ApiError::from(SatbError::from(e)))?;
    tracing::info!("Saved upload {} ({} bytes)", path.display(), upload.bytes.len());

    let options = GenerateOptions {
        output_dir: Some(dirs.results_dir.clone()),
        format: OutputFormat::MusicXml,
        solfege: state
            .config
            .export
            .solfege
            .parse()
            .map_err(|e: String| ApiError(StatusCode::INTERNAL_SERVER_ERROR, e))?,
        export_audio: state.config.export.export_audio,
        audio_dir: Some(dirs.audio_dir.clone()),
    };
    let output = run_generation(&state, path, options)
        .await
        .map_err(|ApiError(_, msg)| ApiError(StatusCode::INTERNAL_SERVER_ERROR, msg))?;

    let files = output
        .files
        .iter()
        .filter_map(|(key, path)| {
            let name = path.file_name()?.to_str()?;
            Some((key.clone(), name.to_string()))
        })
        .collect();

    Ok(Json(UploadResponse {
        message: "File processed successfully".to_string(),
        files,
        basename: output.basename,
        kind: "satb_parts",
    }))
}

async fn api_match(State(state): State<AppState>, mut multipart: Multipart) -> ApiResult<Json<serde_json::Value>> {
    let upload = read_upload(&mut multipart, &["audio", "file"]).await?;
    let Some((upload, ext)) = upload.and_then(|u| {
        let ext = extension_of(&u.file_name).filter(|e| RECORDING_EXTENSIONS.contains(&e.as_str()))?;
        Some((u, ext))
    }) else {
        return Err(ApiError::bad_request("No valid audio uploaded"));
    };

    let unique_name = format!("recording_{}.{}", uuid::Uuid::new_v4().simple(), ext);
    let path = state.dirs().upload_dir.join(&unique_name);
    tokio::fs::write(&path, &upload.bytes)
        .await
        .map_err(|e| ApiError::from(SatbError::from(e)))?;

    let matcher = SongMatcher::new(&state.config, &state.credentials)?;
    match matcher.recognize(&path).await? {
        Some(hit) => Ok(Json(json!({
            "match": hit.title,
            "artist": hit.artist,
            "spotify": hit.spotify,
            "filename": unique_name,
        }))),
        None => {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                tracing::warn!("Could not remove unmatched recording {}: {}", path.display(), e);
            }
            Ok(Json(json!({ "match": null })))
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct GenerateForm {
    pub filename: Option<String>,
    pub format: Option<String>,
    pub solfege: Option<String>,
}

#[derive(Debug, Serialize)]
struct DownloadLink {
    part: String,
    url: String,
}

async fn api_generate(State(state): State<AppState>, Form(form): Form<GenerateForm>) -> ApiResult<Json<serde_json::Value>> {
    let filename = form
        .filename
        .as_deref()
        .filter(|f| !f.is_empty())
        .ok_or_else(|| ApiError::bad_request("No file provided"))?;
    let format: OutputFormat = form
        .format
        .as_deref()
        .unwrap_or("musicxml")
        .parse()
        .map_err(ApiError::bad_request)?;
    let solfege: SolfegeSystem = form
        .solfege
        .as_deref()
        .unwrap_or("fixed")
        .parse()
        .map_err(ApiError::bad_request)?;

    let dirs = state.dirs();
    let path = secure_filename(filename)
        .map(|name| dirs.upload_dir.join(name))
        .filter(|p| p.is_file())
        .ok_or_else(|| ApiError(StatusCode::NOT_FOUND, "File not found".to_string()))?;

    let options = GenerateOptions {
        output_dir: Some(dirs.results_dir.clone()),
        format,
        solfege,
        export_audio: state.config.export.export_audio,
        audio_dir: Some(dirs.audio_dir.clone()),
    };
    let output = run_generation(&state, path, options).await?;

    let mut download_links = Vec::new();
    let mut pdf_link = None;
    for (part, path) in &output.files {
        let Some(url) = public_url(dirs, path) else { continue };
        if part == "score" && format == OutputFormat::Pdf && path.extension().is_some_and(|e| e == "pdf") {
            pdf_link = Some(url);
        } else {
            download_links.push(DownloadLink { part: part.clone(), url });
        }
    }

    Ok(Json(json!({ "download_links": download_links, "pdf_link": pdf_link })))
}

async fn api_identify(State(state): State<AppState>, mut multipart: Multipart) -> ApiResult<Json<serde_json::Value>> {
    let upload = read_upload(&mut multipart, &["audio", "file"])
        .await?
        .ok_or_else(|| ApiError::bad_request("No audio uploaded"))?;

    let ext = extension_of(&upload.file_name)
        .filter(|e| RECORDING_EXTENSIONS.contains(&e.as_str()))
        .unwrap_or_else(|| "wav".to_string());
    let path = state
        .dirs()
        .recordings_dir
        .join(format!("recording_{}.{}", uuid::Uuid::new_v4().simple(), ext));
    tokio::fs::write(&path, &upload.bytes)
        .await
        .map_err(|e| ApiError::from(SatbError::from(e)))?;

    let result = identify_recording(&path, &state.config, &state.credentials).await?;
    Ok(Json(json!({
        "message": "Audio recorded and processed successfully",
        "music_text": result.music_text,
        "tracks": result.tracks,
        "type": "spotify_results",
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secure_filename() {
        assert_eq!(secure_filename("My Song.mp3").as_deref(), Some("My_Song.mp3"));
        assert_eq!(secure_filename("../../etc/passwd").as_deref(), Some("etc_passwd"));
        assert_eq!(secure_filename("chœur.mp3").as_deref(), Some("chur.mp3"));
        assert_eq!(secure_filename("..."), None);
        assert_eq!(secure_filename(""), None);
    }

    #[test]
    fn test_public_url() {
        let dirs = ServerConfig {
            results_dir: PathBuf::from("/srv/results"),
            audio_dir: PathBuf::from("/srv/audio"),
            ..ServerConfig::default()
        };
        assert_eq!(
            public_url(&dirs, Path::new("/srv/results/song_satb.mid")).as_deref(),
            Some("/results/song_satb.mid")
        );
        assert_eq!(
            public_url(&dirs, Path::new("/srv/audio/song_bass.mp3")).as_deref(),
            Some("/audio/song_bass.mp3")
        );
        assert_eq!(public_url(&dirs, Path::new("/tmp/x.mid")), None);
    }
}
