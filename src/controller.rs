//! The conversion state machine.
//!
//! ```text
//!            submit                 2xx + %PDF
//!   Idle ───────────► Converting ─────────────► Success
//!    ▲                    │  │                     │
//!    │        abandon     │  │ timeout / network / │
//!    ├────────────────────┘  │ rejected            │
//!    │                       ▼                     │
//!    └──────── reset ───── Error ◄─── reset ───────┘
//! ```
//!
//! One [`ConversionController`] issues at most one HTTP request at a time.
//! Every transition happens under a single mutex at the moment of the event
//! that causes it; nothing polls. Each request carries the generation it
//! was started under, so a response that arrives after [`reset`] or
//! [`abandon`] is discarded instead of overwriting the newer state.
//!
//! [`reset`]: ConversionController::reset
//! [`abandon`]: ConversionController::abandon

use crate::config::{ClientConfig, ConversionOptions, PAGES_ALL};
use crate::error::{ConversionFailure, DarkPdfError, SubmitError};
use crate::events::Observer;
use crate::selector::{SelectedFile, PDF_MIME};
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

/// Longest slice of an error response body kept in the failure detail.
const MAX_DETAIL_BODY: usize = 200;

/// Snapshot of the controller's state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConversionState {
    Idle,
    Converting { request_id: u64, file_name: String },
    Success { request_id: u64, payload_len: usize },
    Error { request_id: u64, failure: ConversionFailure },
}

impl ConversionState {
    pub fn name(&self) -> &'static str {
        match self {
            ConversionState::Idle => "idle",
            ConversionState::Converting { .. } => "converting",
            ConversionState::Success { .. } => "success",
            ConversionState::Error { .. } => "error",
        }
    }

    /// `Success` or `Error`.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ConversionState::Success { .. } | ConversionState::Error { .. }
        )
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, ConversionState::Idle)
    }

    /// `Success` of the request `request_id` specifically.
    pub fn is_success_of(&self, request_id: u64) -> bool {
        matches!(self, ConversionState::Success { request_id: id, .. } if *id == request_id)
    }
}

/// Payload of a successful request, tagged with the request it answers.
#[derive(Debug, Clone)]
pub struct Converted {
    pub request_id: u64,
    pub payload: Bytes,
}

struct Machine {
    state: ConversionState,
    generation: u64,
    options: Option<ConversionOptions>,
}

/// Turns a selected file plus options into exactly one outstanding request.
pub struct ConversionController {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
    machine: Mutex<Machine>,
    cancel: Notify,
    observer: Observer,
}

impl ConversionController {
    pub fn new(config: &ClientConfig, observer: Observer) -> Result<Self, DarkPdfError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| DarkPdfError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: config.convert_url(),
            timeout: config.request_timeout(),
            machine: Mutex::new(Machine {
                state: ConversionState::Idle,
                generation: 0,
                options: None,
            }),
            cancel: Notify::new(),
            observer,
        })
    }

    /// The endpoint requests are posted to.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn state(&self) -> ConversionState {
        self.lock().state.clone()
    }

    /// Options of the current or last settled request. `None` when idle.
    pub fn options(&self) -> Option<ConversionOptions> {
        self.lock().options.clone()
    }

    /// Convert `file` with `options` and return the PDF payload.
    ///
    /// The cancellation listener is registered before the request leaves
    /// `Idle`, so an [`abandon`](Self::abandon) at any point after that
    /// aborts the transport. Refused with [`SubmitError::Busy`] while a request is in flight and
    /// with [`SubmitError::NotIdle`] while a settled result is held. The
    /// options are snapshotted here; later changes do not affect this
    /// request. There is no retry.
    pub async fn submit(
        &self,
        file: Arc<SelectedFile>,
        options: ConversionOptions,
    ) -> Result<Converted, SubmitError> {
        let cancelled = self.cancel.notified();
        tokio::pin!(cancelled);
        cancelled.as_mut().enable();

        let request_id = self.begin(&file, &options)?;
        self.observer.on_conversion_started(request_id, file.name());

        let outcome = tokio::select! {
            _ = &mut cancelled => {
                debug!("Request {} aborted", request_id);
                return Err(SubmitError::Superseded);
            }
            outcome = self.send(&file, &options) => outcome,
        };
        self.settle(request_id, outcome).map(|payload| Converted {
            request_id,
            payload,
        })
    }

    /// Return to `Idle` from `Success` or `Error`. A no-op when already
    /// idle; refused while converting (see [`Self::abandon`]).
    pub fn reset(&self) -> Result<(), SubmitError> {
        let mut machine = self.lock();
        match machine.state {
            ConversionState::Converting { .. } => Err(SubmitError::Busy),
            ConversionState::Idle => Ok(()),
            _ => {
                debug!("Reset from {}", machine.state.name());
                machine.state = ConversionState::Idle;
                machine.options = None;
                Ok(())
            }
        }
    }

    /// Drop the in-flight request, if any, and return to `Idle`.
    ///
    /// The transport is aborted and any response that still arrives is
    /// discarded. From a settled state this behaves like [`Self::reset`].
    /// Returns whether a request was in flight.
    pub fn abandon(&self) -> bool {
        let mut machine = self.lock();
        let in_flight = matches!(machine.state, ConversionState::Converting { .. });
        if in_flight {
            machine.generation += 1;
            info!("Abandoned in-flight conversion");
        }
        machine.state = ConversionState::Idle;
        machine.options = None;
        drop(machine);

        if in_flight {
            self.cancel.notify_waiters();
        }
        in_flight
    }

    fn lock(&self) -> MutexGuard<'_, Machine> {
        self.machine.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn begin(&self, file: &SelectedFile, options: &ConversionOptions) -> Result<u64, SubmitError> {
        let mut machine = self.lock();
        match &machine.state {
            ConversionState::Idle => {}
            ConversionState::Converting { .. } => {
                debug!("Submit refused: a conversion is in flight");
                return Err(SubmitError::Busy);
            }
            settled => {
                return Err(SubmitError::NotIdle {
                    state: settled.name(),
                })
            }
        }

        machine.generation += 1;
        let request_id = machine.generation;
        machine.state = ConversionState::Converting {
            request_id,
            file_name: file.name().to_string(),
        };
        machine.options = Some(options.clone());
        info!(
            "Converting '{}' (theme={}, eye_care={}) as request {}",
            file.name(),
            options.theme,
            options.eye_care,
            request_id
        );
        Ok(request_id)
    }

    fn settle(
        &self,
        request_id: u64,
        outcome: Result<Bytes, ConversionFailure>,
    ) -> Result<Bytes, SubmitError> {
        let mut machine = self.lock();
        let current = matches!(
            machine.state,
            ConversionState::Converting { request_id: id, .. } if id == request_id
        );
        if machine.generation != request_id || !current {
            debug!("Discarding result of superseded request {}", request_id);
            return Err(SubmitError::Superseded);
        }

        match outcome {
            Ok(payload) => {
                machine.state = ConversionState::Success {
                    request_id,
                    payload_len: payload.len(),
                };
                drop(machine);
                info!("Request {} succeeded: {} bytes", request_id, payload.len());
                self.observer
                    .on_conversion_settled(request_id, Ok(payload.len()));
                Ok(payload)
            }
            Err(failure) => {
                machine.state = ConversionState::Error {
                    request_id,
                    failure: failure.clone(),
                };
                drop(machine);
                warn!("Request {} failed: {}", request_id, failure);
                self.observer
                    .on_conversion_settled(request_id, Err(&failure));
                Err(SubmitError::Failed(failure))
            }
        }
    }

    async fn send(
        &self,
        file: &SelectedFile,
        options: &ConversionOptions,
    ) -> Result<Bytes, ConversionFailure> {
        let part = Part::stream_with_length(file.bytes().clone(), file.size())
            .file_name(file.name().to_string())
            .mime_str(PDF_MIME)
            .map_err(|e| ConversionFailure::network(format!("building request: {e}")))?;
        let form = Form::new()
            .part("file", part)
            .text("theme", options.theme.as_str())
            .text("eye_care", if options.eye_care { "true" } else { "false" })
            .text("pages", PAGES_ALL);

        let response = self
            .client
            .post(&self.url)
            .multipart(form)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(MAX_DETAIL_BODY).collect();
            return Err(ConversionFailure::server_rejected(format!(
                "HTTP {status}: {}",
                snippet.trim()
            )));
        }

        let payload = response.bytes().await.map_err(|e| self.classify(e))?;
        if !payload.starts_with(b"%PDF") {
            return Err(ConversionFailure::server_rejected(format!(
                "response is not a PDF ({} bytes)",
                payload.len()
            )));
        }
        Ok(payload)
    }

    fn classify(&self, e: reqwest::Error) -> ConversionFailure {
        if e.is_timeout() {
            ConversionFailure::timeout(format!(
                "no response within {}ms",
                self.timeout.as_millis()
            ))
        } else {
            ConversionFailure::network(e.to_string())
        }
    }
}

impl std::fmt::Debug for ConversionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversionController")
            .field("url", &self.url)
            .field("timeout", &self.timeout)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use crate::events::noop;

    fn controller() -> ConversionController {
        let config = ClientConfig::builder()
            .api_base("http://127.0.0.1:9")
            .build()
            .unwrap();
        ConversionController::new(&config, noop()).unwrap()
    }

    fn file() -> SelectedFile {
        SelectedFile::new("doc.pdf", b"%PDF-1.7".to_vec(), PDF_MIME)
    }

    #[test]
    fn starts_idle_without_options() {
        let c = controller();
        assert_eq!(c.state(), ConversionState::Idle);
        assert!(c.options().is_none());
        assert_eq!(c.url(), "http://127.0.0.1:9/convert");
    }

    #[test]
    fn begin_refuses_while_converting() {
        let c = controller();
        let id = c.begin(&file(), &ConversionOptions::default()).unwrap();
        assert_eq!(id, 1);
        assert_eq!(c.state().name(), "converting");
        assert_eq!(
            c.begin(&file(), &ConversionOptions::default()),
            Err(SubmitError::Busy)
        );
        assert_eq!(c.reset(), Err(SubmitError::Busy));
    }

    #[test]
    fn settle_success_then_reset() {
        let c = controller();
        let id = c.begin(&file(), &ConversionOptions::default()).unwrap();
        let payload = c.settle(id, Ok(Bytes::from_static(b"%PDF-x"))).unwrap();
        assert_eq!(payload.len(), 6);
        assert!(c.state().is_terminal());
        assert_eq!(
            c.begin(&file(), &ConversionOptions::default()),
            Err(SubmitError::NotIdle { state: "success" })
        );

        c.reset().unwrap();
        assert!(c.state().is_idle());
        assert!(c.options().is_none());
    }

    #[test]
    fn settle_failure_records_kind() {
        let c = controller();
        let id = c.begin(&file(), &ConversionOptions::default()).unwrap();
        let err = c
            .settle(id, Err(ConversionFailure::timeout("60000ms")))
            .unwrap_err();
        assert!(matches!(err, SubmitError::Failed(ref f) if f.kind == FailureKind::Timeout));
        match c.state() {
            ConversionState::Error { failure, .. } => assert_eq!(failure.kind, FailureKind::Timeout),
            other => panic!("unexpected state {other:?}"),
        }
    }

    #[test]
    fn late_result_after_abandon_is_discarded() {
        let c = controller();
        let id = c.begin(&file(), &ConversionOptions::default()).unwrap();
        assert!(c.abandon());
        assert_eq!(
            c.settle(id, Ok(Bytes::from_static(b"%PDF"))),
            Err(SubmitError::Superseded)
        );
        assert!(c.state().is_idle());

        let next = c.begin(&file(), &ConversionOptions::default()).unwrap();
        assert!(next > id);
    }

    #[test]
    fn abandon_when_idle_reports_nothing_in_flight() {
        let c = controller();
        assert!(!c.abandon());
        assert!(c.state().is_idle());
    }

    #[test]
    fn success_is_tied_to_its_request() {
        let c = controller();
        let id = c.begin(&file(), &ConversionOptions::default()).unwrap();
        c.settle(id, Ok(Bytes::from_static(b"%PDF"))).unwrap();
        assert!(c.state().is_success_of(id));
        assert!(!c.state().is_success_of(id + 1));
        assert!(!ConversionState::Idle.is_success_of(id));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn abandon_right_after_submit_aborts_the_transport() {
        let server = httpmock::MockServer::start();
        server.mock(|when, then| {
            when.method("POST").path("/convert");
            then.status(200)
                .body("%PDF-1.7")
                .delay(Duration::from_secs(10));
        });
        let config = ClientConfig::builder()
            .api_base(server.base_url())
            .build()
            .unwrap();

        for _ in 0..20 {
            let c = Arc::new(ConversionController::new(&config, noop()).unwrap());
            let submitting = tokio::spawn({
                let c = Arc::clone(&c);
                async move {
                    c.submit(Arc::new(file()), ConversionOptions::default())
                        .await
                }
            });
            // Abandon as soon as the request has left Idle.
            while !c.abandon() {
                tokio::task::yield_now().await;
            }
            let outcome = tokio::time::timeout(Duration::from_secs(2), submitting)
                .await
                .expect("transport aborted without waiting for the response")
                .unwrap();
            assert_eq!(outcome.unwrap_err(), SubmitError::Superseded);
        }
    }

    #[test]
    fn state_serialises_with_tag() {
        let json = serde_json::to_value(ConversionState::Success {
            request_id: 3,
            payload_len: 10,
        })
        .unwrap();
        assert_eq!(json["state"], "success");
        assert_eq!(json["payload_len"], 10);
    }
}
