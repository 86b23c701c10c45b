//! HTTP transport for the JSON API
//!
//! Owns the `reqwest` client, builds URLs under `<endpoint>/api2/json/`, and
//! decodes the `{"data": ...}` envelope every response is wrapped in.

use reqwest::header::COOKIE;
use reqwest::{Method, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use stratus_credential::SecretString;
use tracing::{debug, instrument};
use url::Url;

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult, ConfigError};
use crate::session::Session;

/// Header carrying the anti-forgery token on mutating requests
pub const CSRF_HEADER: &str = "CSRFPreventionToken";
/// Cookie carrying the session ticket
pub const AUTH_COOKIE: &str = "PVEAuthCookie";

/// Longest body excerpt kept in [`ClientError::Api`]
const MAX_ERROR_BODY: usize = 512;

#[derive(Deserialize)]
struct Envelope<T> {
    data: Option<T>,
}

#[derive(Deserialize)]
struct TicketData {
    ticket: String,
    #[serde(rename = "CSRFPreventionToken")]
    csrf_token: String,
}

/// Raw HTTP access to one API server
#[derive(Debug)]
pub(crate) struct Transport {
    http: reqwest::Client,
    endpoint: String,
    api_root: Url,
}

impl Transport {
    pub(crate) fn new(endpoint: &str, config: &ClientConfig) -> ClientResult<Self> {
        let endpoint = endpoint.trim_end_matches('/').to_string();
        let api_root = Url::parse(&format!("{endpoint}/api2/json/")).map_err(|e| {
            ConfigError::Invalid {
                field: "endpoint",
                reason: format!("'{endpoint}': {e}"),
            }
        })?;

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self {
            http,
            endpoint,
            api_root,
        })
    }

    pub(crate) fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn url(&self, path: &str) -> ClientResult<Url> {
        self.api_root
            .join(path.trim_start_matches('/'))
            .map_err(|e| {
                ClientError::from(ConfigError::Invalid {
                    field: "path",
                    reason: format!("'{path}': {e}"),
                })
            })
    }

    /// Exchange credentials for a ticket
    #[instrument(skip(self, secret), fields(endpoint = %self.endpoint))]
    pub(crate) async fn login(&self, principal: &str, secret: &SecretString) -> ClientResult<Session> {
        let url = self.url("access/ticket")?;
        let request = secret.expose_secret(|password| {
            self.http
                .post(url)
                .form(&[("username", principal), ("password", password)])
        });
        let response = request.send().await?;

        let status = response.status();
        if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            return Err(ClientError::Authentication {
                principal: principal.to_string(),
                reason: format!("server answered {status}"),
            });
        }

        let data: TicketData = decode("access/ticket", response).await.map_err(|err| match err {
            ClientError::UnexpectedResponse { reason, .. } => ClientError::Authentication {
                principal: principal.to_string(),
                reason,
            },
            other => other,
        })?;

        Ok(Session::new(
            self.endpoint.clone(),
            principal,
            SecretString::new(data.ticket),
            SecretString::new(data.csrf_token),
        ))
    }

    /// Authenticated request; form parameters on writes, query on reads
    ///
    /// A 401 comes back as [`ClientError::Unauthorized`] so the caller can
    /// decide whether to re-authenticate.
    pub(crate) async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
        session: &Session,
    ) -> ClientResult<T> {
        let url = self.url(path)?;
        debug!(%method, path, "api request");

        let is_read = method == Method::GET;
        let mut request = self
            .http
            .request(method, url)
            .header(COOKIE, session.ticket().expose_secret(|t| format!("{AUTH_COOKIE}={t}")));
        if !is_read {
            request = request.header(CSRF_HEADER, session.csrf_token().expose_secret(str::to_owned));
        }
        if !params.is_empty() {
            request = if is_read {
                request.query(params)
            } else {
                request.form(params)
            };
        }

        let response = request.send().await?;
        decode(path, response).await
    }
}

async fn decode<T: DeserializeOwned>(path: &str, response: Response) -> ClientResult<T> {
    let status = response.status();
    if status == StatusCode::UNAUTHORIZED {
        return Err(ClientError::Unauthorized);
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ClientError::Api {
            status: status.as_u16(),
            path: path.to_string(),
            message: error_message(status, &body),
        });
    }

    let body = response.bytes().await?;
    let envelope: Envelope<T> =
        serde_json::from_slice(&body).map_err(|e| ClientError::UnexpectedResponse {
            path: path.to_string(),
            reason: e.to_string(),
        })?;
    envelope.data.ok_or_else(|| ClientError::UnexpectedResponse {
        path: path.to_string(),
        reason: "missing data field".to_string(),
    })
}

fn error_message(status: StatusCode, body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        return status
            .canonical_reason()
            .unwrap_or("no response body")
            .to_string();
    }
    match body.char_indices().nth(MAX_ERROR_BODY) {
        Some((cut, _)) => format!("{}...", &body[..cut]),
        None => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn urls_are_rooted_under_api() {
        let transport = Transport::new("https://pve:8006/", &ClientConfig::default()).unwrap();
        assert_eq!(transport.endpoint(), "https://pve:8006");
        assert_eq!(
            transport.url("/cluster/resources").unwrap().as_str(),
            "https://pve:8006/api2/json/cluster/resources"
        );
        assert_eq!(
            transport
                .url("nodes/pve1/tasks/UPID:pve1:0001:0002:0003:qmstart:100:root@pam:/status")
                .unwrap()
                .path(),
            "/api2/json/nodes/pve1/tasks/UPID:pve1:0001:0002:0003:qmstart:100:root@pam:/status"
        );
    }

    #[test]
    fn bad_endpoint_is_a_config_error() {
        let err = Transport::new("not a url", &ClientConfig::default()).unwrap_err();
        assert!(matches!(err, ClientError::Config(ConfigError::Invalid { field: "endpoint", .. })));
    }

    #[test]
    fn long_error_bodies_are_truncated() {
        let body = "x".repeat(MAX_ERROR_BODY + 10);
        let message = error_message(StatusCode::INTERNAL_SERVER_ERROR, &body);
        assert_eq!(message.len(), MAX_ERROR_BODY + 3);
        assert_eq!(error_message(StatusCode::BAD_GATEWAY, ""), "Bad Gateway");
    }
}
