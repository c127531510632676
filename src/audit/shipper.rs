use std::time::{Duration, SystemTime};

use anyhow::{Context, Result, anyhow};
use aws_config::SdkConfig;
use aws_credential_types::Credentials;
use aws_credential_types::provider::{ProvideCredentials, SharedCredentialsProvider};
use aws_sigv4::http_request::{SignableBody, SignableRequest, SigningParams, SigningSettings, sign};
use aws_sigv4::sign::v4;
use aws_smithy_runtime_api::client::identity::Identity;
use chrono::Utc;
use reqwest::header::CONTENT_TYPE;
use tracing::{debug, warn};

use super::record::{AuditRecord, build_bulk_body};

const SIGNING_SERVICE: &str = "es";
const CONTENT_TYPE_NDJSON: &str = "application/x-ndjson";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// `_bulk` URL of the search service at `es_host`. A bare hostname is
/// reached over HTTPS.
pub fn bulk_endpoint(es_host: &str) -> String {
    let host = es_host.trim().trim_end_matches('/');
    if host.starts_with("https://") || host.starts_with("http://") {
        format!("{host}/_bulk")
    } else {
        format!("https://{host}/_bulk")
    }
}

/// Signs `_bulk` requests with SigV4 for the `es` service.
#[derive(Debug, Clone)]
pub struct RequestSigner {
    credentials_provider: SharedCredentialsProvider,
    region: String,
}

impl RequestSigner {
    pub fn new(credentials_provider: SharedCredentialsProvider, region: &str) -> Self {
        Self {
            credentials_provider,
            region: region.to_string(),
        }
    }

    /// Signer using the resolved credentials and region, if both are known.
    pub fn from_sdk_config(sdk_config: &SdkConfig) -> Option<Self> {
        let credentials_provider = sdk_config.credentials_provider()?;
        let region = sdk_config.region()?;
        Some(Self::new(credentials_provider, region.as_ref()))
    }

    async fn signed_headers(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: &[u8],
    ) -> Result<Vec<(String, String)>> {
        let credentials = self
            .credentials_provider
            .provide_credentials()
            .await
            .context("failed to resolve credentials for audit log signing.")?;
        sign_request(
            &credentials,
            &self.region,
            "POST",
            url,
            headers,
            body,
            SystemTime::now(),
        )
    }
}

/// SigV4 headers (`authorization`, `x-amz-date`, and the session token when
/// present) for one request.
pub(crate) fn sign_request(
    credentials: &Credentials,
    region: &str,
    method: &str,
    url: &str,
    headers: &[(&str, &str)],
    body: &[u8],
    time: SystemTime,
) -> Result<Vec<(String, String)>> {
    let identity: Identity = credentials.clone().into();
    let signing_params: SigningParams<'_> = v4::SigningParams::builder()
        .identity(&identity)
        .region(region)
        .name(SIGNING_SERVICE)
        .time(time)
        .settings(SigningSettings::default())
        .build()
        .context("failed to build SigV4 signing params.")?
        .into();

    let signable_request = SignableRequest::new(
        method,
        url,
        headers.iter().copied(),
        SignableBody::Bytes(body),
    )
    .context("failed to build signable request.")?;

    let (instructions, _signature) = sign(signable_request, &signing_params)
        .context("failed to sign audit log request.")?
        .into_parts();

    Ok(instructions
        .headers()
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect())
}

/// Posts audit records to the search service's `_bulk` API.
pub struct AuditShipper {
    client: reqwest::Client,
    endpoint: String,
    index_base: String,
    signer: Option<RequestSigner>,
}

impl AuditShipper {
    /// `signer` is `None` for an endpoint that accepts unsigned requests.
    pub fn new(endpoint: String, index_base: String, signer: Option<RequestSigner>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build HTTP client for audit log shipping.")?;

        Ok(Self {
            client,
            endpoint,
            index_base,
            signer,
        })
    }

    pub fn is_signed(&self) -> bool {
        self.signer.is_some()
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub async fn ship(&self, records: &[AuditRecord]) -> Result<()> {
        let body = build_bulk_body(&self.index_base, records, Utc::now())?;
        let url = reqwest::Url::parse(&self.endpoint)
            .with_context(|| format!("invalid audit log endpoint: {}", self.endpoint))?;

        let mut request = self
            .client
            .post(url.clone())
            .header(CONTENT_TYPE, CONTENT_TYPE_NDJSON);

        if let Some(signer) = &self.signer {
            let host = host_header(&url)?;
            let headers = [
                ("host", host.as_str()),
                ("content-type", CONTENT_TYPE_NDJSON),
            ];
            for (name, value) in signer
                .signed_headers(url.as_str(), &headers, body.as_bytes())
                .await?
            {
                request = request.header(name, value);
            }
        }

        let response = request
            .body(body)
            .send()
            .await
            .context("audit log _bulk request failed.")?;

        let status = response.status();
        let response_body = response
            .bytes()
            .await
            .context("failed to read audit log _bulk response.")?;
        if !status.is_success() {
            return Err(anyhow!(
                "audit log _bulk request returned {status}: {}",
                String::from_utf8_lossy(&response_body)
            ));
        }

        let result: serde_json::Value = serde_json::from_slice(&response_body)
            .context("failed to parse audit log _bulk response.")?;
        if result["errors"] == true {
            warn!(
                records = records.len(),
                "search service rejected some audit log records."
            );
        } else {
            debug!(records = records.len(), "audit log records shipped.");
        }

        Ok(())
    }
}

fn host_header(url: &reqwest::Url) -> Result<String> {
    let host = url
        .host_str()
        .ok_or_else(|| anyhow!("audit log endpoint has no host: {url}"))?;
    Ok(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}
