//! Okta Integration - identity-provider REST client
//!
//! Stateless wrappers over the Okta management API, one method per helpdesk
//! operation: user lookup, group lookup, group membership, account lifecycle,
//! and credential/factor resets. Every call attaches the static `SSWS` token.
//!
//! Error policy: the two lookups (`find_user_by_email`, `find_group_by_name`)
//! return `Ok(None)` on absence so the agent can narrate it; every mutation
//! fails hard on a non-success status, carrying the upstream status code and
//! response body in [`IdentityApiError::Api`].

use reqwest::{Client, Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum IdentityApiError {
    #[error("okta transport failure: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("okta api returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("okta client is not configured (set okta.org_url and okta.api_token)")]
    NotConfigured,
    #[error("unexpected okta response shape: {0}")]
    Decode(String),
}

#[derive(Clone, Debug, Deserialize)]
pub struct OktaUser {
    pub id: String,
    pub status: Option<String>,
    pub profile: UserProfile,
}

#[derive(Clone, Debug, Deserialize)]
pub struct UserProfile {
    pub login: Option<String>,
    pub email: Option<String>,
    #[serde(rename = "firstName")]
    pub first_name: Option<String>,
    #[serde(rename = "lastName")]
    pub last_name: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct OktaGroup {
    pub id: String,
    pub profile: GroupProfile,
}

#[derive(Clone, Debug, Deserialize)]
pub struct GroupProfile {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResetPasswordResponse {
    #[serde(rename = "resetPasswordUrl")]
    reset_password_url: String,
}

pub struct OktaClient {
    http: Client,
    org_url: Option<String>,
    api_token: Option<SecretString>,
}

impl OktaClient {
    /// Credentials are optional: a client built without them returns
    /// [`IdentityApiError::NotConfigured`] from every call instead of failing
    /// the process at startup.
    pub fn new(org_url: Option<String>, api_token: Option<SecretString>) -> Self {
        Self { http: Client::new(), org_url, api_token }
    }

    fn credentials(&self) -> Result<(&str, &SecretString), IdentityApiError> {
        match (self.org_url.as_deref(), self.api_token.as_ref()) {
            (Some(org_url), Some(api_token)) => Ok((org_url, api_token)),
            _ => Err(IdentityApiError::NotConfigured),
        }
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<(StatusCode, String), IdentityApiError> {
        let (org_url, api_token) = self.credentials()?;
        let url = format!("{org_url}{path}");

        let response = self
            .http
            .request(method, &url)
            .header("Authorization", format!("SSWS {}", api_token.expose_secret()))
            .header("Accept", "application/json")
            .query(query)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        debug!(event_name = "okta.api.response", path = %path, status = status.as_u16());
        Ok((status, body))
    }

    /// Exact-match search on the primary email. Zero matches is an explicit
    /// absent result, not an error; more than one match takes the first and
    /// logs, since it usually means dirty directory data.
    pub async fn find_user_by_email(
        &self,
        email: &str,
    ) -> Result<Option<OktaUser>, IdentityApiError> {
        let search = format!("profile.email eq \"{}\"", escape_filter_literal(email));
        let (status, body) =
            self.send(Method::GET, "/api/v1/users", &[("search", search.as_str())]).await?;

        let body = into_api_result(status.as_u16(), body)?;
        let users: Vec<OktaUser> = decode(&body)?;
        if users.len() > 1 {
            warn!(
                event_name = "okta.users.ambiguous_email",
                email = %email,
                matches = users.len(),
                "multiple users share one email; taking the first match"
            );
        }
        Ok(users.into_iter().next())
    }

    pub async fn get_user_groups(&self, user_id: &str) -> Result<Vec<String>, IdentityApiError> {
        let path = format!("/api/v1/users/{user_id}/groups");
        let (status, body) = self.send(Method::GET, &path, &[]).await?;

        let body = into_api_result(status.as_u16(), body)?;
        let groups: Vec<OktaGroup> = decode(&body)?;
        Ok(groups.into_iter().map(|group| group.profile.name).collect())
    }

    /// Generates a reset link without sending the provider's email, so the
    /// agent can hand the URL to the user directly.
    pub async fn reset_password(&self, user_id: &str) -> Result<String, IdentityApiError> {
        let path = format!("/api/v1/users/{user_id}/lifecycle/reset_password");
        let (status, body) = self.send(Method::POST, &path, &[("sendEmail", "false")]).await?;

        let body = into_api_result(status.as_u16(), body)?;
        let reset: ResetPasswordResponse = decode(&body)?;
        Ok(reset.reset_password_url)
    }

    pub async fn lock_user(&self, user_id: &str) -> Result<(), IdentityApiError> {
        let path = format!("/api/v1/users/{user_id}/lifecycle/suspend");
        let (status, body) = self.send(Method::POST, &path, &[]).await?;
        into_api_result(status.as_u16(), body).map(drop)
    }

    pub async fn unlock_user(&self, user_id: &str) -> Result<(), IdentityApiError> {
        let path = format!("/api/v1/users/{user_id}/lifecycle/unsuspend");
        let (status, body) = self.send(Method::POST, &path, &[]).await?;
        into_api_result(status.as_u16(), body).map(drop)
    }

    /// Substring query against the directory, then a case-insensitive exact
    /// name match among the candidates.
    pub async fn find_group_by_name(
        &self,
        name: &str,
    ) -> Result<Option<OktaGroup>, IdentityApiError> {
        let (status, body) = self.send(Method::GET, "/api/v1/groups", &[("q", name)]).await?;

        let body = into_api_result(status.as_u16(), body)?;
        let groups: Vec<OktaGroup> = decode(&body)?;
        Ok(exact_name_match(groups, name))
    }

    /// Idempotent membership grant.
    pub async fn add_user_to_group(
        &self,
        user_id: &str,
        group_id: &str,
    ) -> Result<(), IdentityApiError> {
        let path = format!("/api/v1/groups/{group_id}/users/{user_id}");
        let (status, body) = self.send(Method::PUT, &path, &[]).await?;
        into_api_result(status.as_u16(), body).map(drop)
    }

    /// Invalidates every enrolled MFA factor.
    pub async fn reset_mfa(&self, user_id: &str) -> Result<(), IdentityApiError> {
        let path = format!("/api/v1/users/{user_id}/lifecycle/reset_factors");
        let (status, body) = self.send(Method::POST, &path, &[]).await?;
        into_api_result(status.as_u16(), body).map(drop)
    }
}

/// Maps a raw upstream response to the error policy: success passes the body
/// through, anything else carries status and body to the caller.
fn into_api_result(status: u16, body: String) -> Result<String, IdentityApiError> {
    if (200..300).contains(&status) {
        Ok(body)
    } else {
        Err(IdentityApiError::Api { status, body })
    }
}

fn decode<T: serde::de::DeserializeOwned>(body: &str) -> Result<T, IdentityApiError> {
    serde_json::from_str(body).map_err(|error| IdentityApiError::Decode(error.to_string()))
}

/// Quotes and backslashes in a value would otherwise terminate the quoted
/// literal inside the search expression.
fn escape_filter_literal(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

fn exact_name_match(candidates: Vec<OktaGroup>, name: &str) -> Option<OktaGroup> {
    candidates.into_iter().find(|group| group.profile.name.eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::{
        decode, escape_filter_literal, exact_name_match, into_api_result, GroupProfile,
        IdentityApiError, OktaClient, OktaGroup, OktaUser, ResetPasswordResponse,
    };

    fn group(id: &str, name: &str) -> OktaGroup {
        OktaGroup {
            id: id.to_string(),
            profile: GroupProfile { name: name.to_string(), description: None },
        }
    }

    #[test]
    fn non_success_status_carries_status_and_body() {
        let error = into_api_result(404, r#"{"errorCode":"E0000007"}"#.to_string())
            .err()
            .expect("404 should be an error");

        let IdentityApiError::Api { status, body } = error else {
            panic!("expected Api error, got {error:?}")
        };
        assert_eq!(status, 404);
        assert!(body.contains("E0000007"));
    }

    #[test]
    fn success_status_passes_body_through() {
        let body = into_api_result(200, "[]".to_string()).expect("200 is success");
        assert_eq!(body, "[]");

        into_api_result(204, String::new()).expect("204 is success");
    }

    #[test]
    fn zero_user_matches_decodes_to_absent() {
        let users: Vec<OktaUser> = decode("[]").expect("empty array decodes");
        assert!(users.into_iter().next().is_none());
    }

    #[test]
    fn user_payload_decodes_profile_fields() {
        let users: Vec<OktaUser> = decode(
            r#"[{"id":"00u1","status":"ACTIVE",
                "profile":{"login":"john@x.com","email":"john@x.com",
                           "firstName":"John","lastName":"Doe"}}]"#,
        )
        .expect("user decodes");

        let user = users.into_iter().next().expect("one user");
        assert_eq!(user.id, "00u1");
        assert_eq!(user.profile.email.as_deref(), Some("john@x.com"));
        assert_eq!(user.profile.first_name.as_deref(), Some("John"));
    }

    #[test]
    fn group_match_is_case_insensitive_and_exact() {
        let candidates = vec![
            group("g1", "Developers Team"),
            group("g2", "Developers"),
            group("g3", "developers-guild"),
        ];

        let matched = exact_name_match(candidates, "developers").expect("exact match exists");
        assert_eq!(matched.id, "g2");
    }

    #[test]
    fn group_match_returns_none_when_only_substrings_match() {
        let candidates = vec![group("g1", "Developers Team")];
        assert!(exact_name_match(candidates, "developers").is_none());
    }

    #[test]
    fn reset_password_response_exposes_the_url() {
        let reset: ResetPasswordResponse =
            decode(r#"{"resetPasswordUrl":"https://example.okta.com/signin/reset-password/XE6wE"}"#)
                .expect("reset response decodes");
        assert!(reset.reset_password_url.ends_with("XE6wE"));
    }

    #[test]
    fn filter_literals_escape_quotes_and_backslashes() {
        assert_eq!(escape_filter_literal("john@x.com"), "john@x.com");
        assert_eq!(escape_filter_literal(r#"a"b@x.com"#), r#"a\"b@x.com"#);
        assert_eq!(escape_filter_literal(r"a\b@x.com"), r"a\\b@x.com");
    }

    #[test]
    fn malformed_body_is_a_decode_error() {
        let error = decode::<Vec<OktaUser>>("not json").err().expect("must fail");
        assert!(matches!(error, IdentityApiError::Decode(_)));
    }

    #[tokio::test]
    async fn unconfigured_client_fails_every_call_without_io() {
        let client = OktaClient::new(None, None);

        let error = client.find_user_by_email("john@x.com").await.err().expect("must fail");
        assert!(matches!(error, IdentityApiError::NotConfigured));

        let error = client.lock_user("00u1").await.err().expect("must fail");
        assert!(matches!(error, IdentityApiError::NotConfigured));
    }
}
