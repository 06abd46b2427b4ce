// Copyright (c) 2026 gemward contributors
// SPDX-License-Identifier: AGPL-3.0
//! HTTP mapping for [`GatewayError`]. Bodies are short plain-text reasons;
//! server-side failures are logged and answered with a generic message.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::domain::error::GatewayError;

impl GatewayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::AuthenticationFailed | Self::Session(_) | Self::InvalidToken(_) => StatusCode::UNAUTHORIZED,
            Self::BadCredentialHeader(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Forbidden(_) | Self::VersionParse { .. } => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Configuration(_)
            | Self::AdvisorySync(_)
            | Self::AdvisoryParse { .. }
            | Self::Repository(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn public_message(&self) -> String {
        match self {
            Self::AuthenticationFailed => "authentication failed".to_string(),
            Self::Session(e) => format!("invalid session: {e}"),
            Self::BadCredentialHeader(reason) => (*reason).to_string(),
            Self::InvalidToken(_) => "access token rejected by identity provider".to_string(),
            Self::Upstream(_) => "identity provider unavailable".to_string(),
            Self::Forbidden(reason) | Self::BadRequest(reason) => reason.clone(),
            Self::VersionParse { gem, version } => format!("{gem} {version}: unparsable version"),
            Self::NotFound(what) => format!("{what} not found"),
            _ => "internal server error".to_string(),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "Request rejected");
        }

        let mut response = (status, self.public_message()).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}
