use std::time::Duration;

use crate::{
    assignment_logger::NoopAssignmentLogger, configuration_store::ConfigurationStore,
    AssignmentLogger, Client, SdkMetadata,
};

/// Configuration for [`Client`].
///
/// # Examples
/// ```
/// # use eppo_assignment::{AssignmentEvent, ClientConfig};
/// let client = ClientConfig::from_api_key("api-key")
///     .assignment_logger(|event: AssignmentEvent| {
///         println!("{:?}", event);
///     })
///     .to_client();
/// ```
pub struct ClientConfig<'a> {
    pub(crate) api_key: String,
    pub(crate) base_url: String,
    pub(crate) assignment_logger: Box<dyn AssignmentLogger + Send + Sync + 'a>,
    pub(crate) sdk_metadata: SdkMetadata,
    pub(crate) max_cache_entries: usize,
    pub(crate) poll_interval: Duration,
    pub(crate) poll_jitter: Duration,
}

impl<'a> ClientConfig<'a> {
    /// Default base URL for API calls.
    pub const DEFAULT_BASE_URL: &'static str = "https://fscdn.eppo.cloud/api";

    /// Default interval between configuration refreshes.
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

    /// Default jitter subtracted from the refresh interval.
    pub const DEFAULT_POLL_JITTER: Duration = Duration::from_secs(3);

    /// Create a default configuration using the specified API key.
    ///
    /// ```
    /// # use eppo_assignment::ClientConfig;
    /// ClientConfig::from_api_key("api-key");
    /// ```
    pub fn from_api_key(api_key: impl Into<String>) -> Self {
        ClientConfig {
            api_key: api_key.into(),
            base_url: ClientConfig::DEFAULT_BASE_URL.to_owned(),
            assignment_logger: Box::new(NoopAssignmentLogger),
            sdk_metadata: SdkMetadata::default(),
            max_cache_entries: ConfigurationStore::DEFAULT_MAX_ENTRIES,
            poll_interval: ClientConfig::DEFAULT_POLL_INTERVAL,
            poll_jitter: ClientConfig::DEFAULT_POLL_JITTER,
        }
    }

    /// Set assignment logger to store variation assignments to your data warehouse.
    pub fn assignment_logger(
        mut self,
        assignment_logger: impl AssignmentLogger + Send + Sync + 'a,
    ) -> Self {
        self.assignment_logger = Box::new(assignment_logger);
        self
    }

    /// Override base URL for API calls. Clients should use the default setting in most cases.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Override SDK identity reported to the server and in assignment events.
    pub fn sdk_metadata(mut self, sdk_metadata: SdkMetadata) -> Self {
        self.sdk_metadata = sdk_metadata;
        self
    }

    /// Maximum number of flag configurations kept in memory.
    pub fn max_cache_entries(mut self, max_cache_entries: usize) -> Self {
        self.max_cache_entries = max_cache_entries;
        self
    }

    /// Interval between configuration refreshes.
    pub fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Random jitter subtracted from every refresh interval.
    pub fn poll_jitter(mut self, poll_jitter: Duration) -> Self {
        self.poll_jitter = poll_jitter;
        self
    }

    /// Create a new [`Client`] using the specified configuration.
    ///
    /// ```
    /// # use eppo_assignment::{ClientConfig, Client};
    /// let client: Client = ClientConfig::from_api_key("api-key").to_client();
    /// ```
    pub fn to_client(self) -> Client<'a> {
        Client::new(self)
    }
}
