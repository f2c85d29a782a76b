//! The `/ask` endpoint.
//!
//! Business failures are part of the 200 contract: the endpoint never
//! raises a transport-level error for a turn that merely failed; callers
//! branch on the `error`/`clarify` fields and the `source` tag.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::Extension;
use axum::response::Response;
use axum::Json;
use serde::{Deserialize, Serialize};

use sibyl_core::resolver::{AskRequest, Resolution, Source};
use sibyl_core::response::ResponsePayload;

use crate::http::{json_response, RequestContext};
use crate::server::ServerState;

/// Raw request body. `question` is optional here so its absence can be
/// reported as a business error rather than a deserialization failure.
#[derive(Debug, Deserialize)]
pub struct AskBody {
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub followup: Option<String>,
}

#[derive(Serialize)]
struct AnswerBody {
    answer: ResponsePayload,
    #[serde(skip_serializing_if = "Option::is_none")]
    sql_used: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tables_used: Option<Vec<String>>,
    source: Source,
}

#[derive(Serialize)]
struct ClarifyBody {
    clarify: bool,
    conversation_id: String,
    question: String,
    options: Vec<String>,
    source: Source,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<Source>,
}

pub async fn handle(
    Extension(state): Extension<Arc<ServerState>>,
    Extension(ctx): Extension<RequestContext>,
    Json(body): Json<AskBody>,
) -> Response {
    let max_size = state.config.max_response_size;

    let Some(resolver) = &state.resolver else {
        return json_response(
            ErrorBody {
                error: "agent not configured".to_string(),
                source: Some(Source::AgentNotConfigured),
            },
            max_size,
            &ctx,
        );
    };

    let request = AskRequest {
        question: body.question.unwrap_or_default(),
        conversation_id: body.conversation_id,
        followup: body.followup,
    };

    let start = Instant::now();
    let resolution = resolver.resolve(&request).await;
    state.metrics.record_resolution(start.elapsed(), &resolution);

    match resolution {
        Resolution::Answer {
            answer,
            sql_used,
            tables_used,
            source,
        } => json_response(
            AnswerBody {
                answer,
                sql_used,
                tables_used,
                source,
            },
            max_size,
            &ctx,
        ),
        Resolution::Clarify {
            conversation_id,
            question,
            options,
        } => json_response(
            ClarifyBody {
                clarify: true,
                conversation_id,
                question,
                options,
                source: Source::DeepAgent,
            },
            max_size,
            &ctx,
        ),
        Resolution::Error { message, source } => json_response(
            ErrorBody {
                error: message,
                source,
            },
            max_size,
            &ctx,
        ),
    }
}
