use crate::model::{Course, CourseMetadata, DistrictInfo, GradingPeriod, StudentInfo};
use crate::policy::GradingPolicy;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Everything a login or token refresh hands back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPayload {
    pub token: String,
    pub student: StudentInfo,
    pub policy: GradingPolicy,
    pub grading_periods: BTreeMap<String, GradingPeriod>,
    #[serde(default)]
    pub course_ordering: Vec<CourseMetadata>,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("{0}")]
    Server(String),
    #[error("not authenticated")]
    Unauthenticated,
    #[error("response could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] anyhow::Error),
}

impl TransportError {
    pub fn code(&self) -> &'static str {
        match self {
            TransportError::Unauthenticated => "unauthenticated",
            _ => "transport_failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RequestOptions {
    pub method: &'static str,
    pub body: Option<serde_json::Value>,
    pub authenticated: bool,
}

impl RequestOptions {
    pub fn get() -> Self {
        Self {
            method: "GET",
            body: None,
            authenticated: true,
        }
    }

    pub fn anonymous() -> Self {
        Self {
            authenticated: false,
            ..Self::get()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestOutcome {
    Data(serde_json::Value),
    Error(String),
}

/// Backend proxy access. Retries and re-login belong to implementations.
pub trait Transport {
    fn login(&mut self, host: &str, username: &str, password: &str) -> Result<SessionPayload, TransportError>;

    fn refresh_session(&mut self, token: &str) -> Result<SessionPayload, TransportError>;

    fn fetch_districts(&mut self, zip_code: &str) -> Result<Vec<DistrictInfo>, TransportError>;

    fn request(&mut self, path: &str, options: &RequestOptions) -> RequestOutcome;

    fn fetch_grading_period_courses(&mut self, period: &str) -> Result<Vec<Course>, TransportError> {
        match self.request(&format!("periods/{}", period), &RequestOptions::get()) {
            RequestOutcome::Data(v) => Ok(serde_json::from_value(v)?),
            RequestOutcome::Error(text) => Err(TransportError::Server(text)),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginFixture {
    #[serde(default)]
    username: Option<String>,
    #[serde(flatten)]
    session: SessionPayload,
}

/// Replays proxy responses recorded under `<workspace>/proxy/`.
#[derive(Debug, Clone)]
pub struct WorkspaceTransport {
    root: PathBuf,
    token: Option<String>,
}

impl WorkspaceTransport {
    pub fn new(workspace: &Path) -> Self {
        Self {
            root: workspace.join("proxy"),
            token: None,
        }
    }

    fn resolve(&self, path: &str) -> Option<PathBuf> {
        let rel = Path::new(path.trim_start_matches('/'));
        if rel.as_os_str().is_empty() || rel.components().any(|c| !matches!(c, Component::Normal(_))) {
            return None;
        }
        let mut file = self.root.join(rel).into_os_string();
        file.push(".json");
        Some(PathBuf::from(file))
    }

    fn read_json(&self, file: &Path) -> anyhow::Result<serde_json::Value> {
        let text = std::fs::read_to_string(file)
            .with_context(|| format!("failed to read {}", file.to_string_lossy()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("invalid json in {}", file.to_string_lossy()))
    }

    fn session_from(&self, name: &str) -> Result<(Option<String>, SessionPayload), TransportError> {
        let file = self.root.join(name);
        let value = self.read_json(&file)?;
        if let Some(text) = server_error(&value) {
            return Err(TransportError::Server(text));
        }
        let fixture: LoginFixture = serde_json::from_value(value)?;
        Ok((fixture.username, fixture.session))
    }
}

fn server_error(value: &serde_json::Value) -> Option<String> {
    value
        .as_object()
        .and_then(|o| o.get("error"))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

impl Transport for WorkspaceTransport {
    fn login(&mut self, host: &str, username: &str, _password: &str) -> Result<SessionPayload, TransportError> {
        let (expected_user, session) = self.session_from("login.json")?;
        if expected_user.as_deref().is_some_and(|u| u != username) {
            return Err(TransportError::Server("invalid username or password".to_string()));
        }
        tracing::info!(host, username, "session opened from recorded proxy responses");
        self.token = Some(session.token.clone());
        Ok(session)
    }

    fn refresh_session(&mut self, token: &str) -> Result<SessionPayload, TransportError> {
        if self.token.as_deref() != Some(token) {
            return Err(TransportError::Unauthenticated);
        }
        let name = if self.root.join("refresh.json").is_file() {
            "refresh.json"
        } else {
            "login.json"
        };
        let (_, session) = self.session_from(name)?;
        self.token = Some(session.token.clone());
        Ok(session)
    }

    fn fetch_districts(&mut self, zip_code: &str) -> Result<Vec<DistrictInfo>, TransportError> {
        if zip_code.is_empty() || !zip_code.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(TransportError::Server(format!("invalid zip code: {}", zip_code)));
        }
        let path = format!("districts/{}", zip_code);
        if !self.resolve(&path).is_some_and(|file| file.is_file()) {
            tracing::debug!(zip_code, "no recorded districts");
            return Ok(Vec::new());
        }
        match self.request(&path, &RequestOptions::anonymous()) {
            RequestOutcome::Data(v) => Ok(serde_json::from_value(v)?),
            RequestOutcome::Error(text) => Err(TransportError::Server(text)),
        }
    }

    fn request(&mut self, path: &str, options: &RequestOptions) -> RequestOutcome {
        if options.authenticated && self.token.is_none() {
            return RequestOutcome::Error("not authenticated".to_string());
        }
        let Some(file) = self.resolve(path) else {
            return RequestOutcome::Error(format!("invalid request path: {}", path));
        };
        match self.read_json(&file) {
            Ok(value) => match server_error(&value) {
                Some(text) => RequestOutcome::Error(text),
                None => RequestOutcome::Data(value),
            },
            Err(e) => {
                tracing::warn!(path, method = options.method, error = %e, "proxy request failed");
                RequestOutcome::Error(format!("{:#}", e))
            }
        }
    }
}
