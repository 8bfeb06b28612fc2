//! Image description: drive the vision runtime over every materialized image.
//!
//! The runtime is a long-lived resource. [`LlamaServerRuntime`] spawns
//! llama.cpp's `llama-server` with the vision model and its CLIP projector,
//! waits for the model to finish loading, and then serves one OpenAI-style
//! chat completion per image. The child process is `kill_on_drop`, so it is
//! released on every exit path; [`RuntimeGuard::release`] is the orderly
//! shutdown used on the normal path.
//!
//! Each image gets exactly one attempt. A failure is logged with the image
//! token and recorded as [`Description::Fallback`]; it never aborts the run.

use crate::config::RuntimeOptions;
use crate::document::{Description, ImageToken};
use crate::error::{InferenceError, Pdf2TxtError};
use crate::pipeline::encode::data_uri;
use crate::pipeline::materialize::MaterializedImage;
use crate::progress::ProgressCallback;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

/// Maps an image file and a prompt to a description.
#[async_trait]
pub trait VisionRuntime: Send + Sync {
    async fn describe(&self, image: &Path, prompt: &str) -> Result<String, InferenceError>;
}

// ── llama-server runtime ─────────────────────────────────────────────────

/// A `llama-server` process (or an attached server) serving a vision model.
pub struct LlamaServerRuntime {
    client: reqwest::Client,
    base_url: String,
    child: Mutex<Option<Child>>,
    temperature: f32,
    max_tokens: usize,
    seed: u64,
    inference_timeout_secs: u64,
}

impl LlamaServerRuntime {
    /// Start (or attach to) the server and wait until the model is loaded.
    pub async fn load(options: &RuntimeOptions) -> Result<Self, Pdf2TxtError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(options.inference_timeout_secs))
            .build()
            .map_err(|e| Pdf2TxtError::Internal(format!("HTTP client: {e}")))?;

        let (base_url, child) = match options.server_url {
            Some(ref url) => {
                info!("Attaching to vision server at {}", url);
                (url.trim_end_matches('/').to_string(), None)
            }
            None => {
                let (url, child) = spawn_server(options)?;
                (url, Some(child))
            }
        };

        let runtime = Self {
            client,
            base_url,
            child: Mutex::new(child),
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            seed: options.seed,
            inference_timeout_secs: options.inference_timeout_secs,
        };

        let start = Instant::now();
        runtime.wait_until_healthy(options.startup_timeout_secs).await?;
        info!(
            "Vision model ready in {:.1}s",
            start.elapsed().as_secs_f64()
        );
        Ok(runtime)
    }

    /// Poll `/health` until it answers 200. `llama-server` answers 503 while
    /// the model is still loading.
    async fn wait_until_healthy(&self, timeout_secs: u64) -> Result<(), Pdf2TxtError> {
        let deadline = Instant::now() + Duration::from_secs(timeout_secs);
        let url = format!("{}/health", self.base_url);

        loop {
            if let Some(status) = self.exit_status() {
                return Err(Pdf2TxtError::ModelLoad {
                    reason: format!("llama-server exited with {status} while loading the model"),
                    hint: "Check the model paths and that the projector matches the model. \
                           Run with --verbose to see the server log."
                        .into(),
                });
            }

            match self
                .client
                .get(&url)
                .timeout(Duration::from_secs(2))
                .send()
                .await
            {
                Ok(resp) if resp.status().is_success() => return Ok(()),
                Ok(resp) => debug!("Vision server not ready yet (HTTP {})", resp.status()),
                Err(e) => debug!("Vision server not reachable yet: {}", e),
            }

            if Instant::now() >= deadline {
                return Err(Pdf2TxtError::ModelLoad {
                    reason: format!("vision server not ready after {timeout_secs}s"),
                    hint: "Increase --startup-timeout for large models.".into(),
                });
            }
            sleep(Duration::from_millis(500)).await;
        }
    }

    /// Exit status of the spawned server, if it has already exited.
    fn exit_status(&self) -> Option<std::process::ExitStatus> {
        let mut guard = self.child.lock().ok()?;
        guard.as_mut()?.try_wait().ok().flatten()
    }

    /// Stop the server process, if we started one.
    pub async fn shutdown(self) {
        let child = self.child.lock().ok().and_then(|mut c| c.take());
        if let Some(mut child) = child {
            match child.kill().await {
                Ok(()) => info!("Vision runtime stopped"),
                Err(e) => warn!("Failed to stop vision runtime: {}", e),
            }
        }
    }
}

fn spawn_server(options: &RuntimeOptions) -> Result<(String, Child), Pdf2TxtError> {
    let vision = options
        .vision_model_path
        .as_deref()
        .ok_or_else(|| Pdf2TxtError::ModelLoad {
            reason: "no vision model configured".into(),
            hint: "Pass --vision_model_path or set PDF2TXT_VISION_MODEL.".into(),
        })?;
    let clip = options
        .clip_model_path
        .as_deref()
        .ok_or_else(|| Pdf2TxtError::ModelLoad {
            reason: "no CLIP projector model configured".into(),
            hint: "Pass --clip_model_path or set PDF2TXT_CLIP_MODEL.".into(),
        })?;
    for model in [vision, clip] {
        if !model.is_file() {
            return Err(Pdf2TxtError::ModelLoad {
                reason: format!("model file not found: '{}'", model.display()),
                hint: "Check the path exists and is readable.".into(),
            });
        }
    }

    let port = free_local_port()?;
    info!(
        "Loading vision model {} (projector {}) on port {}",
        vision.display(),
        clip.display(),
        port
    );

    let mut child = Command::new(&options.server_bin)
        .arg("--model")
        .arg(vision)
        .arg("--mmproj")
        .arg(clip)
        .arg("--ctx-size")
        .arg(options.context_size.to_string())
        .arg("--n-gpu-layers")
        .arg(options.gpu_layers.to_string())
        .arg("--host")
        .arg("127.0.0.1")
        .arg("--port")
        .arg(port.to_string())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| Pdf2TxtError::ModelLoad {
            reason: format!("cannot start '{}': {e}", options.server_bin.display()),
            hint: "Install llama.cpp and put llama-server on PATH, or pass --server-bin.".into(),
        })?;

    // Drain the server log so the pipe never fills up.
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(target: "llama_server", "{}", line);
            }
        });
    }

    Ok((format!("http://127.0.0.1:{port}"), child))
}

fn free_local_port() -> Result<u16, Pdf2TxtError> {
    let listener = std::net::TcpListener::bind(("127.0.0.1", 0))
        .map_err(|e| Pdf2TxtError::Internal(format!("cannot reserve a local port: {e}")))?;
    listener
        .local_addr()
        .map(|addr| addr.port())
        .map_err(|e| Pdf2TxtError::Internal(format!("cannot reserve a local port: {e}")))
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[async_trait]
impl VisionRuntime for LlamaServerRuntime {
    async fn describe(&self, image: &Path, prompt: &str) -> Result<String, InferenceError> {
        let bytes = tokio::fs::read(image)
            .await
            .map_err(|e| InferenceError::ImageUnreadable {
                path: image.to_path_buf(),
                detail: e.to_string(),
            })?;

        let body = serde_json::json!({
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": prompt },
                    { "type": "image_url", "image_url": { "url": data_uri(&bytes, "image/png") } }
                ]
            }],
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
            "seed": self.seed,
            "stream": false
        });

        let resp = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            return Err(InferenceError::Rejected {
                status: status.as_u16(),
                detail: truncate(detail.trim(), 300),
            });
        }

        let parsed: ChatCompletionResponse =
            resp.json().await.map_err(|e| self.request_error(e))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or(InferenceError::EmptyResponse)
    }
}

impl LlamaServerRuntime {
    fn request_error(&self, e: reqwest::Error) -> InferenceError {
        if e.is_timeout() {
            InferenceError::Timeout {
                secs: self.inference_timeout_secs,
            }
        } else {
            InferenceError::Request(e.to_string())
        }
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_chars).collect();
        format!("{cut}\u{2026}")
    }
}

// ── Runtime lifecycle ────────────────────────────────────────────────────

/// The runtime used for one run: either injected by the caller (who owns its
/// lifecycle) or loaded by us (and released by us).
pub enum RuntimeGuard {
    Injected(Arc<dyn VisionRuntime>),
    Owned(LlamaServerRuntime),
}

impl RuntimeGuard {
    /// Use `injected` if present, otherwise load a `llama-server` runtime.
    pub async fn acquire(
        injected: Option<&Arc<dyn VisionRuntime>>,
        options: &RuntimeOptions,
    ) -> Result<Self, Pdf2TxtError> {
        match injected {
            Some(rt) => Ok(RuntimeGuard::Injected(Arc::clone(rt))),
            None => Ok(RuntimeGuard::Owned(LlamaServerRuntime::load(options).await?)),
        }
    }

    pub fn runtime(&self) -> &dyn VisionRuntime {
        match self {
            RuntimeGuard::Injected(rt) => rt.as_ref(),
            RuntimeGuard::Owned(rt) => rt,
        }
    }

    /// Unload an owned runtime. Injected runtimes are left to the caller.
    pub async fn release(self) {
        if let RuntimeGuard::Owned(rt) = self {
            rt.shutdown().await;
        }
    }
}

// ── Driver ───────────────────────────────────────────────────────────────

/// Result of describing one image.
#[derive(Debug, Clone)]
pub struct DescribedImage {
    pub token: ImageToken,
    pub description: Description,
    pub error: Option<InferenceError>,
    pub duration_ms: u64,
}

/// Describe images one at a time, in the order given.
pub async fn describe_images(
    runtime: &dyn VisionRuntime,
    images: &[MaterializedImage],
    prompt: &str,
    progress: Option<&ProgressCallback>,
) -> Vec<DescribedImage> {
    let total = images.len();
    let mut results = Vec::with_capacity(total);

    for (i, image) in images.iter().enumerate() {
        let index = i + 1;
        let token = image.token;
        if let Some(cb) = progress {
            cb.on_image_start(index, total, &token.to_string());
        }
        info!("Describing image {}/{}: {}", index, total, token);

        let start = Instant::now();
        let outcome = runtime.describe(&image.path, prompt).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        let described = match outcome {
            Ok(text) => {
                debug!("{}: {} chars in {}ms", token, text.len(), duration_ms);
                if let Some(cb) = progress {
                    cb.on_image_complete(index, total, text.len());
                }
                DescribedImage {
                    token,
                    description: Description::Generated(text),
                    error: None,
                    duration_ms,
                }
            }
            Err(e) => {
                warn!("{}: description failed, using fallback: {}", token, e);
                if let Some(cb) = progress {
                    cb.on_image_error(index, total, &e.to_string());
                }
                DescribedImage {
                    token,
                    description: Description::Fallback,
                    error: Some(e),
                    duration_ms,
                }
            }
        };
        results.push(described);
    }

    results
}
