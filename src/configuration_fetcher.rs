//! An HTTP client that fetches flag configuration from the server.
use reqwest::{StatusCode, Url};

use crate::{poller::RefreshOutcome, ufc::UniversalFlagConfig, Error, Result, SdkMetadata};

pub(crate) struct ConfigurationFetcherConfig {
    pub base_url: String,
    pub api_key: String,
    pub sdk_metadata: SdkMetadata,
}

const UFC_ENDPOINT: &str = "/flag-config/v1/config";

/// A client that fetches configuration from the server.
pub(crate) struct ConfigurationFetcher {
    // Client holds a connection pool internally, so we're reusing the client between requests.
    client: reqwest::blocking::Client,
    config: ConfigurationFetcherConfig,
    /// If we receive a 401 Unauthorized error during a request, it means the API key is not
    /// valid. We cache this error so we don't issue additional requests to the server.
    unauthorized: bool,
}

impl ConfigurationFetcher {
    pub fn new(config: ConfigurationFetcherConfig) -> ConfigurationFetcher {
        ConfigurationFetcher {
            client: reqwest::blocking::Client::new(),
            config,
            unauthorized: false,
        }
    }

    pub fn url(&self) -> Result<Url> {
        Url::parse_with_params(
            &format!("{}{}", self.config.base_url, UFC_ENDPOINT),
            &[
                ("apiKey", self.config.api_key.as_str()),
                ("sdkName", self.config.sdk_metadata.name),
                ("sdkVersion", self.config.sdk_metadata.version),
            ],
        )
        .map_err(Error::InvalidBaseUrl)
    }

    pub fn fetch_configuration(&mut self) -> Result<UniversalFlagConfig> {
        if self.unauthorized {
            return Err(Error::Unauthorized);
        }

        let url = self.url()?;

        log::debug!(target: "eppo", "fetching configuration");
        let response = self.client.get(url).send()?;

        let response = response.error_for_status().map_err(|err| {
            if err.status() == Some(StatusCode::UNAUTHORIZED) {
                log::warn!(target: "eppo", "client is not authorized. Check your API key");
                self.unauthorized = true;
                Error::Unauthorized
            } else {
                log::warn!(target: "eppo", "received non-200 response while fetching new configuration: {:?}", err);
                Error::from(err)
            }
        })?;

        let configuration = response.json()?;

        log::debug!(target: "eppo", "successfully fetched configuration");

        Ok(configuration)
    }
}

/// Classify a fetch error for the poller. Errors that a retry cannot fix halt polling.
pub(crate) fn refresh_outcome(result: Result<()>) -> RefreshOutcome {
    match result {
        Ok(()) => RefreshOutcome::Success,
        Err(err @ (Error::Unauthorized | Error::InvalidBaseUrl(_))) => {
            RefreshOutcome::HardFailure(err)
        }
        Err(err) => RefreshOutcome::SoftFailure(err),
    }
}
