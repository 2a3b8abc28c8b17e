//! The pinned, redirect-walking HTTP client

use super::body::{decode_text, read_capped, BodyError};
use super::{FetchRequest, SafeGetResult};
use crate::destination::{parse_destination, validate_destination, Resolver, ValidatedDestination};
use crate::url::resolve_location;
use crate::{BlockReason, NetworkShieldError, ShieldError, TransientError};
use reqwest::header::{CONTENT_TYPE, LOCATION};
use reqwest::{redirect::Policy, Client, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Fetches untrusted URLs without letting them reach internal addresses
///
/// A fetcher is cheap to clone and holds no per-host state; the resolver it
/// is given is used for every validation, so tests can swap in a
/// [`StaticResolver`](crate::destination::StaticResolver).
#[derive(Debug, Clone)]
pub struct SafeFetcher {
    resolver: Arc<dyn Resolver>,
    user_agent: String,
}

impl SafeFetcher {
    pub fn new(resolver: Arc<dyn Resolver>, user_agent: impl Into<String>) -> Self {
        Self {
            resolver,
            user_agent: user_agent.into(),
        }
    }

    pub fn resolver(&self) -> &Arc<dyn Resolver> {
        &self.resolver
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Fetches `url` and returns its decoded body
    ///
    /// # Request Flow
    ///
    /// 1. Validate the current URL (scheme, credentials, allowlists, DNS)
    /// 2. Build a client pinned to the first validated address
    /// 3. Send a GET with redirects disabled in the transport
    /// 4. On 301/302/303/307/308 with a `Location`, count the hop, resolve
    ///    the target against the current URL and go back to 1
    /// 5. Otherwise re-validate the final URL and stream the body under
    ///    `max_bytes`
    ///
    /// The whole sequence is bounded by `request.timeout`.
    ///
    /// # Returns
    ///
    /// * `Ok(SafeGetResult)` - The final response, whatever its status
    /// * `Err(ShieldError::Security)` - A hop was blocked or a limit was hit
    /// * `Err(ShieldError::Transient)` - Transport failure or timeout
    pub async fn get_text(
        &self,
        url: &str,
        request: &FetchRequest,
    ) -> Result<SafeGetResult, ShieldError> {
        let result = match tokio::time::timeout(request.timeout, self.walk(url, request)).await {
            Ok(result) => result,
            Err(_) => Err(TransientError::Timeout {
                url: url.to_string(),
            }
            .into()),
        };

        if let Err(ShieldError::Security(e)) = &result {
            tracing::warn!(target: "network_shield", "{}", e);
        }

        result
    }

    async fn walk(&self, url: &str, request: &FetchRequest) -> Result<SafeGetResult, ShieldError> {
        let mut current = parse_destination(url)?;
        let mut hops: u32 = 0;

        loop {
            // Fresh validation and a fresh pinned address for every hop
            let destination =
                validate_destination(&current, &request.rules, self.resolver.as_ref()).await?;
            let client = self
                .pinned_client(&destination, request.timeout)
                .map_err(|e| TransientError::from_reqwest(current.as_str(), e))?;

            let mut builder = client.get(current.clone());
            for (name, value) in &request.headers {
                builder = builder.header(name.as_str(), value.as_str());
            }

            let response = builder
                .send()
                .await
                .map_err(|e| TransientError::from_reqwest(current.as_str(), e))?;

            let status = response.status();
            if is_redirect(status) {
                if let Some(value) = response.headers().get(LOCATION) {
                    let Ok(location) = value.to_str() else {
                        return Err(invalid_redirect(
                            &current,
                            String::from_utf8_lossy(value.as_bytes()).into_owned(),
                        ));
                    };

                    hops += 1;
                    if hops > request.max_redirects {
                        return Err(NetworkShieldError::new(
                            current.as_str(),
                            BlockReason::MaxRedirectsExceeded {
                                max: request.max_redirects,
                            },
                        )
                        .into());
                    }

                    let Some(next) = resolve_location(&current, location) else {
                        return Err(invalid_redirect(&current, location.to_string()));
                    };

                    tracing::debug!(
                        "Redirect {} of {}: {} -> {}",
                        hops,
                        request.max_redirects,
                        current,
                        next
                    );
                    current = next;
                    continue;
                }
            }

            let final_url = response.url().clone();
            validate_destination(&final_url, &request.rules, self.resolver.as_ref()).await?;

            return read_response(response, &final_url, request.max_bytes).await;
        }
    }

    /// Builds a one-shot client whose only route to the host is `destination`
    ///
    /// Proxies are disabled since a proxy would make its own DNS lookup. TLS
    /// SNI and the `Host` header still carry the original host name.
    ///
    /// The override is keyed by the host exactly as the URL spells it, since
    /// that is what the connector looks up. `jobs.example.com.` and
    /// `jobs.example.com` are different keys.
    fn pinned_client(
        &self,
        destination: &ValidatedDestination,
        timeout: Duration,
    ) -> Result<Client, reqwest::Error> {
        let mut builder = Client::builder()
            .user_agent(self.user_agent.as_str())
            .timeout(timeout)
            .connect_timeout(timeout)
            .redirect(Policy::none())
            .no_proxy()
            .gzip(true)
            .brotli(true);

        if !destination.is_ip_literal {
            let addr = destination.pinned_addr();
            if let Some(raw) = destination.url.host_str() {
                if raw != destination.host {
                    builder = builder.resolve(raw, addr);
                }
            }
            builder = builder.resolve(&destination.host, addr);
        }

        builder.build()
    }
}

fn invalid_redirect(current: &Url, location: String) -> ShieldError {
    NetworkShieldError::new(current.as_str(), BlockReason::InvalidRedirect { location }).into()
}

fn is_redirect(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::MOVED_PERMANENTLY
            | StatusCode::FOUND
            | StatusCode::SEE_OTHER
            | StatusCode::TEMPORARY_REDIRECT
            | StatusCode::PERMANENT_REDIRECT
    )
}

async fn read_response(
    response: reqwest::Response,
    final_url: &Url,
    max_bytes: usize,
) -> Result<SafeGetResult, ShieldError> {
    let too_large = || {
        NetworkShieldError::new(
            final_url.as_str(),
            BlockReason::MaxBytesExceeded { max: max_bytes },
        )
    };

    if let Some(declared) = response.content_length() {
        if declared > max_bytes as u64 {
            return Err(too_large().into());
        }
    }

    let status_code = response.status().as_u16();
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    let body = match read_capped(response.bytes_stream(), max_bytes).await {
        Ok(body) => body,
        Err(BodyError::TooLarge) => return Err(too_large().into()),
        Err(BodyError::Stream(e)) => {
            return Err(TransientError::from_reqwest(final_url.as_str(), e).into())
        }
    };

    Ok(SafeGetResult {
        text: decode_text(&body, content_type.as_deref()),
        status_code,
        final_url: final_url.to_string(),
        bytes_len: body.len(),
    })
}
