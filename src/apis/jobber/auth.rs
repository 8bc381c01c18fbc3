use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use chrono::{DateTime, Utc};
use oauth2::basic::BasicClient;
use oauth2::reqwest::async_http_client;
use oauth2::{AuthType, AuthUrl, ClientId, ClientSecret, RefreshToken, TokenResponse, TokenUrl};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, trace, warn};

use super::JobberError;

pub const DEFAULT_CACHE_FILE: &str = "jobber_token.json";
const AUTH_URL: &str = "https://api.getjobber.com/api/oauth/authorize";
const TOKEN_URL: &str = "https://api.getjobber.com/api/oauth/token";

/// Whatever credentials were supplied on the command line or in the
/// environment. Any of them may be missing.
#[derive(Debug, Clone, Default)]
pub struct JobberCredentials {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

#[derive(Error, Debug)]
pub enum CredentialsError {
    #[error(
        "no Jobber access token is available, and getting one needs a refresh token, client ID, \
         and client secret"
    )]
    Missing,
    #[error("the Jobber access token is invalid and cannot be refreshed: {0}")]
    Rejected(JobberError),
    #[error("failed to refresh the Jobber access token")]
    Refresh(#[source] anyhow::Error),
    #[error("failed to validate the Jobber access token")]
    Probe(#[from] JobberError),
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct CachedTokens {
    access_token: String,
    refresh_token: Option<String>,
    time_obtained: DateTime<Utc>,
}

/// Finds an access token that Jobber accepts.
///
/// The token given in `credentials` (or else the cached one) is tried first.
/// If it is rejected or there is none, the refresh-token grant is used. Any
/// newly seen token pair is written to `cache_file`.
pub async fn get_access_token(
    client: &reqwest::Client,
    credentials: JobberCredentials,
    cache_file: &Path,
) -> Result<String, CredentialsError> {
    let JobberCredentials { access_token, refresh_token, client_id, client_secret } = credentials;
    let cached = read_cached_tokens(cache_file);

    let is_new_token = access_token.is_some();
    let access_token = access_token.or_else(|| cached.as_ref().map(|c| c.access_token.clone()));
    let refresh_token =
        refresh_token.or_else(|| cached.as_ref().and_then(|c| c.refresh_token.clone()));

    let rejection = match access_token {
        Some(access_token) => match super::probe(client, &access_token).await {
            Ok(job_count) => {
                debug!("Jobber accepted the access token; {} jobs are visible", job_count);
                if is_new_token {
                    let tokens = CachedTokens {
                        access_token: access_token.clone(),
                        refresh_token,
                        time_obtained: Utc::now(),
                    };
                    write_cached_tokens(cache_file, &tokens);
                }
                return Ok(access_token);
            }
            Err(e @ (JobberError::Unauthorized | JobberError::GraphQl(_))) => {
                debug!("access token was rejected: {}", e);
                Some(e)
            }
            Err(e) => return Err(e.into()),
        },
        None => {
            debug!("no access token given or cached");
            None
        }
    };

    let (Some(refresh_token), Some(client_id), Some(client_secret)) =
        (refresh_token, client_id, client_secret)
    else {
        return Err(match rejection {
            Some(e) => CredentialsError::Rejected(e),
            None => CredentialsError::Missing,
        });
    };

    trace!("attempting to refresh the access token");
    let tokens = refresh_credentials(refresh_token, client_id, client_secret)
        .await
        .map_err(CredentialsError::Refresh)?;
    info!("refreshed the Jobber access token");
    write_cached_tokens(cache_file, &tokens);
    Ok(tokens.access_token)
}

async fn refresh_credentials(
    refresh_token: String,
    client_id: String,
    client_secret: String,
) -> anyhow::Result<CachedTokens> {
    let time_obtained = Utc::now();
    let refresh_token = RefreshToken::new(refresh_token);
    let token = oauth2_client(client_id, client_secret)
        .exchange_refresh_token(&refresh_token)
        .request_async(async_http_client)
        .await?;
    // Jobber rotates refresh tokens, but keep the old one if none came back
    let refresh_token = token.refresh_token().unwrap_or(&refresh_token).secret().clone();
    Ok(CachedTokens {
        access_token: token.access_token().secret().clone(),
        refresh_token: Some(refresh_token),
        time_obtained,
    })
}

fn oauth2_client(client_id: String, client_secret: String) -> BasicClient {
    BasicClient::new(
        ClientId::new(client_id),
        Some(ClientSecret::new(client_secret)),
        AuthUrl::new(AUTH_URL.to_owned()).expect("hardcoded URL should be valid"),
        Some(TokenUrl::new(TOKEN_URL.to_owned()).expect("hardcoded URL should be valid")),
    )
    .set_auth_type(AuthType::RequestBody)
}

fn read_cached_tokens(cache_file: &Path) -> Option<CachedTokens> {
    let file = match File::open(cache_file) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("no token cache file at {}", cache_file.display());
            return None;
        }
        Err(e) => {
            warn!("failed to open token cache file: {}", e);
            return None;
        }
    };
    match serde_json::from_reader(BufReader::new(file)) {
        Ok(tokens) => {
            debug!("loaded cached tokens from {}", cache_file.display());
            Some(tokens)
        }
        Err(e) => {
            warn!("failed to deserialize cached tokens: {}", e);
            None
        }
    }
}

fn write_cached_tokens(cache_file: &Path, tokens: &CachedTokens) {
    let result = File::create(cache_file)
        .map_err(anyhow::Error::from)
        .and_then(|file| Ok(serde_json::to_writer(BufWriter::new(file), tokens)?));
    match result {
        Ok(()) => info!("cached Jobber tokens in {}", cache_file.display()),
        Err(e) => warn!("failed to cache Jobber tokens: {}", e),
    }
}
