//! ============================================================================
//! HTTP Backend Client - reqwest implementation of `WowfyApi`
//! ============================================================================

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{
    parse_next_task, parse_user_task_id, EndProgress, Envelope, WowfyApi,
    CHECK_NEXT_TASK_ENDPOINT, CREATE_USER_TASK_ENDPOINT, END_PROGRESS_ENDPOINT,
    PROGRESS_ENDPOINT,
};
use crate::config::ClientConfig;
use crate::types::{CaptureKind, Task, TaskAssignment, WowfyError, WowfyResult};

/// Backend client over plain HTTP
pub struct HttpWowfyApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpWowfyApi {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(
            config.api_base.clone(),
            Duration::from_secs(config.http_timeout_secs),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint)
    }

    async fn post_form(&self, endpoint: &str, fields: &[(&str, String)]) -> WowfyResult<Value> {
        debug!("POST {} ({} fields)", endpoint, fields.len());
        let request = self.client.post(self.url(endpoint)).form(fields);
        self.execute(endpoint, request).await
    }

    async fn execute(
        &self,
        endpoint: &str,
        request: reqwest::RequestBuilder,
    ) -> WowfyResult<Value> {
        self.fetch_envelope(endpoint, request)
            .await?
            .into_result(endpoint)
    }

    async fn fetch_envelope(
        &self,
        endpoint: &str,
        request: reqwest::RequestBuilder,
    ) -> WowfyResult<Envelope> {
        let response = request
            .send()
            .await
            .map_err(|e| WowfyError::Network(format!("{}: {}", endpoint, e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(WowfyError::Server {
                endpoint: endpoint.to_string(),
                message: format!("HTTP {}: {}", status, body),
            });
        }

        response
            .json::<Envelope>()
            .await
            .map_err(|e| WowfyError::MalformedResponse {
                endpoint: endpoint.to_string(),
                detail: e.to_string(),
            })
    }

    async fn media_part(upload: &super::MediaUpload) -> WowfyResult<Part> {
        let bytes = tokio::fs::read(&upload.path).await.map_err(|e| {
            WowfyError::NotFound(format!("media file {}: {}", upload.path.display(), e))
        })?;
        let file_name = upload
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "capture".to_string());
        let mime = match upload.capture {
            CaptureKind::Photo => "image/jpeg",
            CaptureKind::Video => "video/mp4",
        };

        Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(mime)
            .map_err(|e| WowfyError::InvalidState(format!("media part: {}", e)))
    }
}

#[async_trait]
impl WowfyApi for HttpWowfyApi {
    async fn report_progress(&self, assignment: &TaskAssignment, steps: u32) -> WowfyResult<()> {
        let fields = [
            ("user_id", assignment.user_id.clone()),
            ("user_task_id", assignment.user_task_id.clone()),
            ("steps", steps.to_string()),
        ];
        self.post_form(PROGRESS_ENDPOINT, &fields).await?;
        debug!("Progress {} reported for {}", steps, assignment.user_task_id);
        Ok(())
    }

    async fn end_progress(&self, report: &EndProgress) -> WowfyResult<()> {
        let fields = report.form_fields();

        match &report.media {
            Some(upload) => {
                let mut form = Form::new();
                for (key, value) in fields {
                    form = form.text(key, value);
                }
                form = form.part("media", Self::media_part(upload).await?);

                debug!("POST {} (multipart)", END_PROGRESS_ENDPOINT);
                let request = self
                    .client
                    .post(self.url(END_PROGRESS_ENDPOINT))
                    .multipart(form);
                self.execute(END_PROGRESS_ENDPOINT, request).await?;
            }
            None => {
                self.post_form(END_PROGRESS_ENDPOINT, &fields).await?;
            }
        }

        info!("Assignment {} closed", report.assignment.user_task_id);
        Ok(())
    }

    async fn check_next_task_exist(
        &self,
        task_id: &str,
        challenge_id: &str,
    ) -> WowfyResult<Option<Task>> {
        debug!("GET {} task={} challenge={}", CHECK_NEXT_TASK_ENDPOINT, task_id, challenge_id);
        let request = self
            .client
            .get(self.url(CHECK_NEXT_TASK_ENDPOINT))
            .query(&[("task_id", task_id), ("challenge_id", challenge_id)]);

        let envelope = self
            .fetch_envelope(CHECK_NEXT_TASK_ENDPOINT, request)
            .await
            .inspect_err(|e| warn!("Next task lookup failed for {}: {}", task_id, e))?;

        // this endpoint reports "no next task" as success = false, and so
        // does a failing backend; the message is the only way to tell
        if !envelope.is_success() {
            warn!("No next task after {}: {}", task_id, envelope.message());
            return Ok(None);
        }
        parse_next_task(envelope.data)
    }

    async fn create_user_task(
        &self,
        user_id: &str,
        task: &Task,
        challenge_id: &str,
    ) -> WowfyResult<TaskAssignment> {
        let fields = [
            ("user_id", user_id.to_string()),
            ("task_id", task.task_id.clone()),
            ("challenge_id", challenge_id.to_string()),
            ("task_type", task.task_type.to_string()),
        ];
        let data = self.post_form(CREATE_USER_TASK_ENDPOINT, &fields).await?;
        let user_task_id = parse_user_task_id(&data)?;

        info!("Created assignment {} for task {}", user_task_id, task.task_id);

        Ok(TaskAssignment {
            user_task_id,
            task_id: task.task_id.clone(),
            challenge_id: challenge_id.to_string(),
            user_id: user_id.to_string(),
        })
    }
}
