//! OAuth callback route
//!
//! Translates the HTTP request into a [`CallbackRequest`] and the
//! [`CallbackOutcome`] back into a `303 See Other`.

use axum::extract::rejection::{PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::header::{COOKIE, LOCATION, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use portability_core::application::callback::{AUTH_MODE_COOKIE, ERROR_PAGE, JOB_ID_COOKIE};
use portability_core::application::{CallbackOutcome, CallbackRequest, OauthCallbackHandler};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, error, warn};

#[derive(Debug, Default, Deserialize)]
pub struct CallbackQuery {
    pub oauth_token: Option<String>,
    pub oauth_verifier: Option<String>,
}

pub fn router(handler: Arc<OauthCallbackHandler>) -> Router {
    Router::new()
        .route("/callback1/:service_id", get(oauth_callback))
        .with_state(handler)
}

async fn oauth_callback(
    State(handler): State<Arc<OauthCallbackHandler>>,
    service_id: Result<Path<String>, PathRejection>,
    query: Result<Query<CallbackQuery>, QueryRejection>,
    headers: HeaderMap,
) -> Response {
    let (Path(service_id), Query(query)) = match (service_id, query) {
        (Ok(path), Ok(query)) => (path, query),
        (Err(e), _) => return malformed(e.body_text()),
        (_, Err(e)) => return malformed(e.body_text()),
    };

    let request = CallbackRequest {
        service_id,
        oauth_token: query.oauth_token,
        oauth_verifier: query.oauth_verifier,
        encoded_job_id: cookie_value(&headers, JOB_ID_COOKIE),
        auth_mode: cookie_value(&headers, AUTH_MODE_COOKIE),
    };
    debug!(service = %request.service_id, "OAuth callback received");

    let outcome = handler.handle(&request).await;
    see_other(&outcome)
}

/// Unparseable path or query: same redirect as any other failure
fn malformed(cause: String) -> Response {
    warn!(error = %cause, "Malformed OAuth callback request");
    see_other(&CallbackOutcome::Failed {
        location: ERROR_PAGE.to_string(),
        error: cause,
    })
}

/// Value of the first cookie called `name` across all `Cookie` headers
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim_matches('"').to_string())
}

fn set_cookie(name: &str, value: &str) -> String {
    format!("{}={}; Path=/; Secure; HttpOnly; SameSite=Lax", name, value)
}

/// Every outcome is a redirect; only successful ones carry a cookie
pub fn see_other(outcome: &CallbackOutcome) -> Response {
    let mut headers = HeaderMap::new();
    let location = match HeaderValue::from_str(outcome.location()) {
        Ok(location) => location,
        Err(e) => {
            error!(error = %e, "Redirect location is not a valid header value");
            HeaderValue::from_static(ERROR_PAGE)
        }
    };
    headers.insert(LOCATION, location);

    if let CallbackOutcome::Redirect { cookie, .. } = outcome {
        match HeaderValue::from_str(&set_cookie(&cookie.name, &cookie.value)) {
            Ok(value) => {
                headers.insert(SET_COOKIE, value);
            }
            Err(e) => {
                error!(error = %e, "Auth cookie is not a valid header value");
                headers.insert(LOCATION, HeaderValue::from_static(ERROR_PAGE));
            }
        }
    }

    (StatusCode::SEE_OTHER, headers).into_response()
}
