use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue},
    response::{Html, IntoResponse, Response},
    Form,
};
use ns_core::{ModelChoice, SummaryParams, SummaryRequest};
use ns_inference::SummarizeError;
use serde::Deserialize;
use uuid::Uuid;

use crate::render::{render, Page};
use crate::AppState;

pub const SESSION_COOKIE: &str = "ns_session";

/// Session id from the request cookie, or a new one to hand out.
struct SessionId {
    id: Uuid,
    fresh: bool,
}

impl SessionId {
    fn from_headers(headers: &HeaderMap) -> Self {
        let existing = headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == SESSION_COOKIE)
            .and_then(|(_, value)| Uuid::parse_str(value).ok());

        match existing {
            Some(id) => Self { id, fresh: false },
            None => Self {
                id: Uuid::new_v4(),
                fresh: true,
            },
        }
    }

    fn respond(&self, html: String) -> Response {
        let mut response = Html(html).into_response();
        if self.fresh {
            let cookie = format!(
                "{}={}; Path=/; HttpOnly; SameSite=Lax",
                SESSION_COOKIE, self.id
            );
            if let Ok(value) = HeaderValue::from_str(&cookie) {
                response.headers_mut().insert(header::SET_COOKIE, value);
            }
        }
        response
    }
}

#[derive(Debug, Deserialize)]
pub struct SummarizeForm {
    pub model: String,
    pub min_length: u32,
    pub max_length: u32,
    pub num_beams: u32,
    #[serde(default)]
    pub article: String,
}

impl SummarizeForm {
    fn request(&self) -> Result<SummaryRequest, SummarizeError> {
        let model = self
            .model
            .parse::<ModelChoice>()
            .map_err(|e| SummarizeError::Validation(e.to_string()))?;
        Ok(SummaryRequest {
            model,
            params: SummaryParams {
                min_length: self.min_length,
                max_length: self.max_length,
                num_beams: self.num_beams,
            },
        })
    }
}

pub async fn index(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let session_id = SessionId::from_headers(&headers);
    let session = state.sessions.get(session_id.id).await;
    let html = render(&Page {
        article: session.article_text().unwrap_or_default(),
        request: session
            .summary()
            .map(|summary| summary.request)
            .unwrap_or_default(),
        session: &session,
        error: None,
    });
    session_id.respond(html)
}

async fn run_summarizer(
    state: &AppState,
    article: &str,
    request: SummaryRequest,
) -> Result<ns_inference::Summary, SummarizeError> {
    let _permit = state
        .generation_permit()
        .await
        .map_err(|e| SummarizeError::Execution(e.to_string()))?;

    let summarizer = state.summarizer.clone();
    let article = article.to_string();
    tokio::task::spawn_blocking(move || summarizer.run(&article, &request))
        .await
        .unwrap_or_else(|e| {
            Err(SummarizeError::Execution(format!(
                "summarization task failed: {}",
                e
            )))
        })
}

pub async fn summarize(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(form): Form<SummarizeForm>,
) -> Response {
    let session_id = SessionId::from_headers(&headers);

    let outcome = match form.request() {
        Ok(request) => run_summarizer(&state, &form.article, request)
            .await
            .map(|summary| (request, summary)),
        Err(e) => Err(e),
    };

    let error = match outcome {
        Ok((request, summary)) => {
            if summary.truncated() {
                tracing::info!(
                    "Session {} article truncated to {} tokens",
                    session_id.id,
                    summary.input_tokens
                );
            }
            state
                .sessions
                .record(session_id.id, form.article.clone(), summary.into_record(request))
                .await;
            None
        }
        Err(e) => {
            tracing::warn!("Session {} summarize failed: {}", session_id.id, e);
            Some(e)
        }
    };

    let session = state.sessions.get(session_id.id).await;
    let request = form.request().unwrap_or_default();
    let html = render(&Page {
        article: &form.article,
        request,
        session: &session,
        error: error.as_ref(),
    });
    session_id.respond(html)
}

pub async fn clear(State(state): State<Arc<AppState>>, headers: HeaderMap) -> impl IntoResponse {
    let session_id = SessionId::from_headers(&headers);
    state.sessions.clear(session_id.id).await;
    tracing::debug!("Session {} cleared", session_id.id);

    let session = state.sessions.get(session_id.id).await;
    session_id.respond(render(&Page {
        article: "",
        request: SummaryRequest::default(),
        session: &session,
        error: None,
    }))
}
