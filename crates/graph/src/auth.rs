//! App-only (client credentials) token acquisition.

use serde::Deserialize;

use crate::client::GraphError;

/// Azure AD application credentials plus the target SharePoint site.
#[derive(Debug, Clone)]
pub struct GraphCredentials {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
    /// Graph site id (`{hostname},{site-collection-id},{web-id}` or a
    /// server-relative form accepted by the API).
    pub site_id: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Exchanges the client credentials for an app-only Graph access token.
pub(crate) async fn acquire_token(
    http: &reqwest::Client,
    login_base: &str,
    credentials: &GraphCredentials,
) -> Result<String, GraphError> {
    let url = format!(
        "{login_base}/{}/oauth2/v2.0/token",
        credentials.tenant_id
    );
    let form = [
        ("grant_type", "client_credentials"),
        ("client_id", credentials.client_id.as_str()),
        ("client_secret", credentials.client_secret.as_str()),
        ("scope", "https://graph.microsoft.com/.default"),
    ];

    let response: TokenResponse = http
        .post(&url)
        .form(&form)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    Ok(response.access_token)
}
