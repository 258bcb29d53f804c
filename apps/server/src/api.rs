//! Administrative HTTP routes

use std::{
	path::{Path, PathBuf},
	sync::Arc,
};

use axum::{
	body::Bytes,
	extract::State,
	http::StatusCode,
	response::{IntoResponse, Response},
	routing::{get, post},
	Json, Router,
};
use chrono::{DateTime, Utc};
use fm_monitor::{
	hash::file_checksum, AuthorityError, FileMonitor, MemoryAuthority, StatusReport,
};
use serde_json::{Map, Value};
use tokio::fs;
use tracing::{debug, info, warn};

pub struct ServerState {
	pub monitor: FileMonitor,
	pub authority: Arc<MemoryAuthority>,
	/// Where commits are written back to, if anywhere
	pub manifest_path: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
	#[error("Body is empty")]
	EmptyBody,
	#[error("Input format is not parsable json.")]
	NotJson(#[source] serde_json::Error),
	#[error("Input json is not an object.")]
	NotAnObject,
	#[error("Missing field: {0}")]
	MissingField(&'static str),
	#[error("Storage authority unavailable: {0}")]
	Authority(#[from] AuthorityError),
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let status = match self {
			Self::Authority(_) => StatusCode::SERVICE_UNAVAILABLE,
			_ => StatusCode::BAD_REQUEST,
		};

		(status, self.to_string()).into_response()
	}
}

type JsonObject = Map<String, Value>;

fn parse_object(body: &[u8]) -> Result<JsonObject, ApiError> {
	if body.is_empty() {
		return Err(ApiError::EmptyBody);
	}

	match serde_json::from_slice::<Value>(body).map_err(ApiError::NotJson)? {
		Value::Object(object) => Ok(object),
		_ => Err(ApiError::NotAnObject),
	}
}

fn required_str<'a>(object: &'a JsonObject, field: &'static str) -> Result<&'a str, ApiError> {
	object
		.get(field)
		.and_then(Value::as_str)
		.ok_or(ApiError::MissingField(field))
}

pub fn router(state: Arc<ServerState>) -> Router {
	Router::new()
		.route("/health", get(|| async { "OK" }))
		.route("/startMonitoring", post(start_monitoring))
		.route("/addFolder", post(add_folder))
		.route("/addFile", post(add_file))
		.route("/getFolderTreeStatus", get(folder_tree_status))
		.route("/pause", post(pause))
		.route("/resume", post(resume))
		.route("/commit", post(commit))
		.with_state(state)
}

async fn start_monitoring(State(state): State<Arc<ServerState>>) -> Result<&'static str, ApiError> {
	let summary = state.monitor.start_monitoring().await?;
	info!(?summary, "Monitoring started");

	Ok("Monitoring started.")
}

async fn add_folder(
	State(state): State<Arc<ServerState>>,
	body: Bytes,
) -> Result<Json<bool>, ApiError> {
	let object = parse_object(&body)?;
	let folder = required_str(&object, "folderPath")?;

	Ok(Json(state.monitor.add_folder(folder).await))
}

async fn add_file(
	State(state): State<Arc<ServerState>>,
	body: Bytes,
) -> Result<Json<bool>, ApiError> {
	let object = parse_object(&body)?;
	let folder = required_str(&object, "folderPath")?;
	let name = required_str(&object, "fileName")?;

	Ok(Json(state.monitor.add_file(folder, name).await))
}

async fn folder_tree_status(State(state): State<Arc<ServerState>>) -> Json<StatusReport> {
	Json(state.monitor.report())
}

async fn pause(State(state): State<Arc<ServerState>>) -> StatusCode {
	state.monitor.pause();
	StatusCode::OK
}

async fn resume(State(state): State<Arc<ServerState>>) -> StatusCode {
	state.monitor.resume();
	StatusCode::OK
}

/// Flush `path` into the authority as it is on disk, then close its episode
async fn commit(
	State(state): State<Arc<ServerState>>,
	body: Bytes,
) -> Result<Json<bool>, ApiError> {
	let object = parse_object(&body)?;
	let path = PathBuf::from(required_str(&object, "path")?);

	flush(&state.authority, &path).await;

	if let Some(manifest_path) = &state.manifest_path {
		if let Err(e) = state.authority.save(manifest_path).await {
			warn!(?e, "Failed to write storage manifest;");
		}
	}

	Ok(Json(state.monitor.commit(&path)))
}

async fn flush(authority: &MemoryAuthority, path: &Path) {
	match fs::metadata(path).await {
		Ok(metadata) if metadata.is_dir() => authority.commit_folder(path),
		Ok(metadata) => {
			let hash = file_checksum(path)
				.await
				.map_err(|e| warn!(%e, "Committing without a hash;"))
				.ok();
			let last_modified = metadata.modified().ok().map(DateTime::<Utc>::from);

			authority.commit_file(path, hash, last_modified);
		}
		Err(e) => {
			debug!(?e, path = %path.display(), "Committed path is gone, forgetting it");
			authority.forget(path);
		}
	}
}

#[cfg(test)]
mod tests {
	use axum::{
		body::{to_bytes, Body},
		http::Request,
	};
	use fm_fs_watcher::{WatchBackend, WatchError, WatchHandle};
	use fm_monitor::{MonitorConfig, StorageAuthority};
	use tower::ServiceExt;
	use tracing_test::traced_test;

	use super::*;

	/// Hands out handles without watching anything
	struct NullBackend;

	impl WatchBackend for NullBackend {
		fn install_watch(&self, path: &Path, _recursive: bool) -> Result<WatchHandle, WatchError> {
			if path.is_dir() {
				Ok(WatchHandle::new(1))
			} else {
				Err(WatchError::NotFound(path.to_path_buf()))
			}
		}

		fn remove_watch(&self, _handle: WatchHandle) {}
	}

	fn app(authority: Arc<MemoryAuthority>) -> Router {
		let (_events_tx, events_rx) = async_channel::unbounded();
		let monitor = FileMonitor::new(
			Arc::new(NullBackend) as Arc<dyn WatchBackend>,
			events_rx,
			Arc::clone(&authority) as Arc<dyn StorageAuthority>,
			MonitorConfig {
				workers: 1,
				..Default::default()
			},
		);

		router(Arc::new(ServerState {
			monitor,
			authority,
			manifest_path: None,
		}))
	}

	async fn call(app: Router, method: &str, uri: &str, body: impl Into<String>) -> (StatusCode, String) {
		let response = app
			.oneshot(
				Request::builder()
					.method(method)
					.uri(uri)
					.body(Body::from(body.into()))
					.unwrap(),
			)
			.await
			.unwrap();

		let status = response.status();
		let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
		(status, String::from_utf8(bytes.to_vec()).unwrap())
	}

	#[tokio::test]
	#[traced_test]
	async fn malformed_bodies_are_rejected() {
		let app = app(Arc::new(MemoryAuthority::new()));

		for (body, message) in [
			("", "Body is empty"),
			("{ nope", "Input format is not parsable json."),
			("[1, 2]", "Input json is not an object."),
			(r#"{ "fileName": "a.txt" }"#, "Missing field: folderPath"),
		] {
			let (status, text) = call(app.clone(), "POST", "/addFile", body).await;
			assert_eq!(status, StatusCode::BAD_REQUEST);
			assert_eq!(text, message);
		}
	}

	#[tokio::test]
	#[traced_test]
	async fn health_and_start() {
		let app = app(Arc::new(MemoryAuthority::new()));

		assert_eq!(call(app.clone(), "GET", "/health", "").await, (StatusCode::OK, "OK".into()));
		assert_eq!(
			call(app, "POST", "/startMonitoring", "").await,
			(StatusCode::OK, "Monitoring started.".into())
		);
	}

	#[tokio::test]
	#[traced_test]
	async fn add_then_commit_then_report() {
		let dir = tempfile::tempdir().unwrap();
		std::fs::write(dir.path().join("a.txt"), b"a").unwrap();
		let folder = dir.path().display().to_string().replace('\\', "\\\\");

		let authority = Arc::new(MemoryAuthority::new());
		let app = app(Arc::clone(&authority));

		let add_folder = format!(r#"{{ "folderPath": "{folder}" }}"#);
		let (status, text) = call(app.clone(), "POST", "/addFolder", add_folder).await;
		assert_eq!((status, text.as_str()), (StatusCode::OK, "true"));

		let (_, report) = call(app.clone(), "GET", "/getFolderTreeStatus", "").await;
		let report = serde_json::from_str::<StatusReport>(&report).unwrap();
		assert_eq!(report.new_added_file_list.len(), 1);

		let commit = format!(r#"{{ "path": "{folder}/a.txt" }}"#);
		let (status, text) = call(app.clone(), "POST", "/commit", commit).await;
		assert_eq!((status, text.as_str()), (StatusCode::OK, "true"));

		let facts = authority.query(&dir.path().join("a.txt")).await.unwrap();
		assert!(facts.persisted);
		assert!(facts.hash.is_some());

		let (_, report) = call(app, "GET", "/getFolderTreeStatus", "").await;
		let report = serde_json::from_str::<StatusReport>(&report).unwrap();
		assert!(report.new_added_file_list.is_empty());
	}
}
