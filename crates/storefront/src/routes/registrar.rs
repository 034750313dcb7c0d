//! Registrar command proxy.
//!
//! The registrar credential never reaches the browser: any client-supplied
//! `key` parameter is dropped and the configured key is added here.

use axum::{
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
};
use secrecy::ExposeSecret;
use tracing::instrument;

use crate::error::{AppError, Result};
use crate::middleware::request_id::{REQUEST_ID_HEADER, RequestId};
use crate::state::AppState;

/// Parameter the registrar reads its credential from.
const CREDENTIAL_PARAM: &str = "key";

/// Drop client-supplied credentials and require a command.
fn sanitize(params: Vec<(String, String)>) -> Result<Vec<(String, String)>> {
    let params: Vec<(String, String)> = params
        .into_iter()
        .filter(|(name, _)| !name.eq_ignore_ascii_case(CREDENTIAL_PARAM))
        .collect();

    if !params
        .iter()
        .any(|(name, value)| name == "command" && !value.trim().is_empty())
    {
        return Err(AppError::BadRequest("command is required".to_string()));
    }
    Ok(params)
}

/// `GET /api/registrar?command=...`
///
/// Forwards the query to `REGISTRAR_API_URL` and returns the upstream body
/// unchanged as `application/json`.
#[instrument(skip_all, fields(command = tracing::field::Empty))]
pub async fn proxy(
    State(state): State<AppState>,
    request_id: Option<axum::Extension<RequestId>>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Response> {
    let mut params = sanitize(params)?;
    let command = params
        .iter()
        .find(|(name, _)| name == "command")
        .map(|(_, value)| value.clone())
        .unwrap_or_default();
    tracing::Span::current().record("command", command.as_str());

    let registrar = &state.config().registrar;
    params.push((
        CREDENTIAL_PARAM.to_string(),
        registrar.api_key.expose_secret().to_string(),
    ));

    let mut request = state.http().get(&registrar.api_url).query(&params);
    if let Some(axum::Extension(id)) = request_id {
        request = request.header(REQUEST_ID_HEADER, id.as_str());
    }

    let response = request.send().await.map_err(|error| {
        tracing::warn!(command = %command, error = %error, "Registrar unreachable");
        AppError::Upstream(format!("registrar: {error}"))
    })?;

    let status = response.status();
    let body = response.text().await?;
    tracing::debug!(command = %command, %status, bytes = body.len(), "Registrar responded");

    Ok((status, [(header::CONTENT_TYPE, "application/json")], body).into_response())
}
