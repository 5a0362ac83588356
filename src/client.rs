use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{
    configuration_fetcher::{refresh_outcome, ConfigurationFetcher, ConfigurationFetcherConfig},
    configuration_store::ConfigurationStore,
    eval::Assignment,
    poller::{PollerConfig, PollerThread},
    sharder::Md5Sharder,
    ufc::{Flag, UniversalFlagConfig, VariationType},
    Attributes, ClientConfig, Error, Result,
};

/// An assignment client.
///
/// The client evaluates flags against the configuration currently held in its store. The store is
/// filled either by the host via [`Client::set_configurations`] or by a poller thread started with
/// [`Client::start_poller_thread`].
///
/// # Examples
/// ```no_run
/// # use eppo_assignment::{Client, ClientConfig};
/// let client = Client::new(ClientConfig::from_api_key("api-key"));
/// let poller = client.start_poller_thread().unwrap();
/// poller.wait_for_configuration().unwrap();
/// ```
pub struct Client<'a> {
    configuration_store: Arc<ConfigurationStore>,
    config: ClientConfig<'a>,
}

impl<'a> Client<'a> {
    /// Create a new `Client` using the specified configuration.
    ///
    /// ```
    /// # use eppo_assignment::{ClientConfig, Client};
    /// let client = Client::new(ClientConfig::from_api_key("api-key"));
    /// ```
    pub fn new(config: ClientConfig<'a>) -> Self {
        Client {
            configuration_store: Arc::new(ConfigurationStore::new(config.max_cache_entries)),
            config,
        }
    }

    #[cfg(test)]
    fn new_with_configuration_store(
        config: ClientConfig<'a>,
        configuration_store: Arc<ConfigurationStore>,
    ) -> Self {
        Self {
            configuration_store,
            config,
        }
    }

    /// Merge flag configurations into the client's store.
    pub fn set_configurations(&self, configuration: UniversalFlagConfig) {
        self.configuration_store.set_configurations(configuration);
    }

    /// Get the current configuration of a flag.
    ///
    /// # Errors
    ///
    /// - [`Error::ConfigNotFound`] if the flag is unknown or has been evicted.
    /// - [`Error::ConfigurationParseError`] if the flag failed to parse.
    pub fn get_configuration(&self, flag_key: &str) -> Result<Arc<Flag>> {
        self.configuration_store.get_configuration(flag_key)
    }

    /// Get the assignment value for a given feature flag and subject.
    ///
    /// Returns `Ok(None)` if the flag is unknown, disabled, or the subject is not eligible for
    /// any allocation.
    ///
    /// # Errors
    ///
    /// - [`Error::TypeConversionFailure`] if the stored value does not match the flag's type.
    /// - [`Error::VariationNotFound`] if a split references an unknown variation.
    /// - [`Error::MalformedOperator`] if a rule uses an unknown operator.
    /// - [`Error::ConfigurationParseError`] if the flag configuration failed to parse.
    ///
    /// # Examples
    ///
    /// ```
    /// # fn test(client: &eppo_assignment::Client) {
    /// let assignment = client
    ///     .get_assignment(
    ///         "a-boolean-flag",
    ///         "user-id",
    ///         &[("age".to_owned(), 42.0.into())]
    ///             .into_iter()
    ///             .collect(),
    ///     )
    ///     .unwrap_or_default()
    ///     .and_then(|x| x.as_boolean())
    ///     // default assignment
    ///     .unwrap_or(false);
    /// # }
    /// ```
    pub fn get_assignment(
        &self,
        flag_key: &str,
        subject_key: &str,
        subject_attributes: &Attributes,
    ) -> Result<Option<AssignmentValue>> {
        Ok(self
            .get_assignment_details(flag_key, subject_key, subject_attributes)?
            .map(|assignment| assignment.value))
    }

    /// Same as [`Client::get_assignment`] but also returns the matched allocation and variation
    /// keys.
    pub fn get_assignment_details(
        &self,
        flag_key: &str,
        subject_key: &str,
        subject_attributes: &Attributes,
    ) -> Result<Option<Assignment>> {
        self.get_assignment_inner(flag_key, subject_key, subject_attributes, None)
    }

    /// Get the assignment of a `STRING` flag.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidType`] if the flag is not a string flag, even if the subject is not
    /// eligible for any allocation. Other errors are the same as for [`Client::get_assignment`].
    pub fn get_string_assignment(
        &self,
        flag_key: &str,
        subject_key: &str,
        subject_attributes: &Attributes,
    ) -> Result<Option<String>> {
        self.get_typed_assignment(
            flag_key,
            subject_key,
            subject_attributes,
            VariationType::String,
            |x| match x {
                AssignmentValue::String(s) => Some(s),
                _ => None,
            },
        )
    }

    /// Get the assignment of an `INTEGER` flag.
    ///
    /// # Errors
    ///
    /// See [`Client::get_string_assignment`].
    pub fn get_integer_assignment(
        &self,
        flag_key: &str,
        subject_key: &str,
        subject_attributes: &Attributes,
    ) -> Result<Option<i64>> {
        self.get_typed_assignment(
            flag_key,
            subject_key,
            subject_attributes,
            VariationType::Integer,
            |x| x.as_integer(),
        )
    }

    /// Get the assignment of a `NUMERIC` flag.
    ///
    /// # Errors
    ///
    /// See [`Client::get_string_assignment`].
    pub fn get_numeric_assignment(
        &self,
        flag_key: &str,
        subject_key: &str,
        subject_attributes: &Attributes,
    ) -> Result<Option<f64>> {
        self.get_typed_assignment(
            flag_key,
            subject_key,
            subject_attributes,
            VariationType::Numeric,
            |x| x.as_numeric(),
        )
    }

    /// Get the assignment of a `BOOLEAN` flag.
    ///
    /// # Errors
    ///
    /// See [`Client::get_string_assignment`].
    pub fn get_boolean_assignment(
        &self,
        flag_key: &str,
        subject_key: &str,
        subject_attributes: &Attributes,
    ) -> Result<Option<bool>> {
        self.get_typed_assignment(
            flag_key,
            subject_key,
            subject_attributes,
            VariationType::Boolean,
            |x| x.as_boolean(),
        )
    }

    /// Get the assignment of a `JSON` flag.
    ///
    /// # Errors
    ///
    /// See [`Client::get_string_assignment`].
    pub fn get_json_assignment(
        &self,
        flag_key: &str,
        subject_key: &str,
        subject_attributes: &Attributes,
    ) -> Result<Option<serde_json::Value>> {
        self.get_typed_assignment(
            flag_key,
            subject_key,
            subject_attributes,
            VariationType::Json,
            |x| match x {
                AssignmentValue::Json(v) => Some(v),
                _ => None,
            },
        )
    }

    fn get_typed_assignment<T>(
        &self,
        flag_key: &str,
        subject_key: &str,
        subject_attributes: &Attributes,
        expected_type: VariationType,
        convert: impl FnOnce(AssignmentValue) -> Option<T>,
    ) -> Result<Option<T>> {
        let assignment = self.get_assignment_inner(
            flag_key,
            subject_key,
            subject_attributes,
            Some(expected_type),
        )?;
        Ok(assignment.and_then(|assignment| convert(assignment.value)))
    }

    fn get_assignment_inner(
        &self,
        flag_key: &str,
        subject_key: &str,
        subject_attributes: &Attributes,
        expected_type: Option<VariationType>,
    ) -> Result<Option<Assignment>> {
        let flag = match self.configuration_store.get_configuration(flag_key) {
            Ok(flag) => flag,
            Err(Error::ConfigNotFound) => {
                log::debug!(target: "eppo", flag_key, subject_key; "flag configuration not found");
                return Ok(None);
            }
            Err(err) => return Err(err),
        };

        if let Some(expected) = expected_type {
            if flag.variation_type != expected {
                return Err(Error::InvalidType {
                    expected,
                    found: flag.variation_type,
                });
            }
        }

        let assignment = match flag.eval(
            subject_key,
            subject_attributes,
            &Md5Sharder,
            &self.config.sdk_metadata,
        ) {
            Ok(assignment) => assignment,
            Err(err) => {
                log::warn!(target: "eppo",
                    flag_key,
                    subject_key,
                    subject_attributes:serde;
                    "error occurred while evaluating a flag: {:?}", err,
                );
                return Err(err);
            }
        };

        log::trace!(target: "eppo",
                    flag_key,
                    subject_key,
                    subject_attributes:serde,
                    assignment:serde = assignment.as_ref().map(|a| &a.value);
                    "evaluated a flag");

        if let Some(event) = assignment.as_ref().and_then(|a| a.event.clone()) {
            log::trace!(target: "eppo",
                        event:serde;
                        "logging assignment");
            let logger = &self.config.assignment_logger;
            let logged = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                logger.log_assignment(event)
            }));
            if logged.is_err() {
                log::warn!(target: "eppo", flag_key, subject_key; "assignment logger panicked");
            }
        }

        Ok(assignment)
    }

    /// Start a poller thread to fetch configuration from the server.
    ///
    /// The first fetch happens immediately. Stop polling with [`PollerThread::stop`].
    ///
    /// # Errors
    ///
    /// - [`Error::Io`] if the thread failed to start.
    pub fn start_poller_thread(&self) -> Result<PollerThread> {
        let mut fetcher = ConfigurationFetcher::new(ConfigurationFetcherConfig {
            base_url: self.config.base_url.clone(),
            api_key: self.config.api_key.clone(),
            sdk_metadata: self.config.sdk_metadata,
        });
        let store = self.configuration_store.clone();

        PollerThread::start(
            move || {
                refresh_outcome(
                    fetcher
                        .fetch_configuration()
                        .map(|configuration| store.set_configurations(configuration)),
                )
            },
            PollerConfig::new()
                .with_interval(self.config.poll_interval)
                .with_jitter(self.config.poll_jitter)
                .with_refresh_on_start(true),
        )
    }
}

/// Enum representing values assigned to a subject as a result of feature flag evaluation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum AssignmentValue {
    /// A string value.
    String(String),
    /// An integer value.
    Integer(i64),
    /// A numeric value (floating-point).
    Numeric(f64),
    /// A boolean value.
    Boolean(bool),
    /// Arbitrary JSON value.
    Json(serde_json::Value),
}

impl AssignmentValue {
    /// Return `true` if the value is a string.
    pub fn is_string(&self) -> bool {
        self.as_str().is_some()
    }
    /// Return the string value, if any.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AssignmentValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Return `true` if the value is an integer.
    pub fn is_integer(&self) -> bool {
        self.as_integer().is_some()
    }
    /// Return the integer value, if any.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            AssignmentValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Return `true` if the value is numeric.
    pub fn is_numeric(&self) -> bool {
        self.as_numeric().is_some()
    }
    /// Return the numeric value, if any.
    pub fn as_numeric(&self) -> Option<f64> {
        match self {
            Self::Numeric(n) => Some(*n),
            _ => None,
        }
    }

    /// Return `true` if the value is a boolean.
    pub fn is_boolean(&self) -> bool {
        self.as_boolean().is_some()
    }
    /// Return the boolean value, if any.
    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            AssignmentValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Return `true` if the value is JSON.
    pub fn is_json(&self) -> bool {
        self.as_json().is_some()
    }
    /// Return the JSON value, if any.
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Json(v) => Some(v),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        sync::{Arc, Mutex},
    };

    use crate::{
        client::AssignmentValue,
        configuration_store::ConfigurationStore,
        ufc::{Allocation, Flag, Split, UniversalFlagConfig, Variation, VariationType},
        AssignmentEvent, Client, ClientConfig, Error,
    };

    fn boolean_flag(do_log: bool) -> Flag {
        Flag {
            key: "flag".to_owned(),
            enabled: true,
            variation_type: VariationType::Boolean,
            variations: [(
                "variation".to_owned(),
                Variation {
                    key: "variation".to_owned(),
                    value: true.into(),
                },
            )]
            .into(),
            allocations: vec![Allocation {
                key: "allocation".to_owned(),
                rules: vec![],
                start_at: None,
                end_at: None,
                splits: vec![Split {
                    shards: vec![],
                    variation_key: "variation".to_owned(),
                    extra_logging: HashMap::new(),
                }],
                do_log,
            }],
            total_shards: 10_000,
        }
    }

    #[test]
    fn returns_none_while_no_configuration() {
        let client = Client::new(ClientConfig::from_api_key("api-key"));

        assert_eq!(
            client
                .get_assignment("flag", "subject", &HashMap::new())
                .unwrap(),
            None
        );
        assert!(matches!(
            client.get_configuration("flag"),
            Err(Error::ConfigNotFound)
        ));
    }

    #[test]
    fn returns_proper_configuration_once_config_is_fetched() {
        let configuration_store = Arc::new(ConfigurationStore::default());
        let client = Client::new_with_configuration_store(
            ClientConfig::from_api_key("api-key"),
            configuration_store.clone(),
        );

        // updating configuration after client is created
        configuration_store.set_configurations(UniversalFlagConfig::from_flags([boolean_flag(
            false,
        )]));

        assert_eq!(
            client
                .get_assignment("flag", "subject", &HashMap::new())
                .unwrap(),
            Some(AssignmentValue::Boolean(true))
        );
        assert_eq!(client.get_configuration("flag").unwrap().key, "flag");
    }

    #[test]
    fn typed_getters_check_flag_type() {
        let client = Client::new(ClientConfig::from_api_key("api-key"));
        client.set_configurations(UniversalFlagConfig::from_flags([boolean_flag(false)]));

        assert_eq!(
            client
                .get_boolean_assignment("flag", "subject", &HashMap::new())
                .unwrap(),
            Some(true)
        );
        assert!(matches!(
            client.get_string_assignment("flag", "subject", &HashMap::new()),
            Err(Error::InvalidType {
                expected: VariationType::String,
                found: VariationType::Boolean
            })
        ));
        assert_eq!(
            client
                .get_integer_assignment("missing", "subject", &HashMap::new())
                .unwrap(),
            None
        );
    }

    #[test]
    fn logs_assignment_when_allocation_asks_for_it() {
        let events = Arc::new(Mutex::new(Vec::<AssignmentEvent>::new()));
        let client = {
            let events = events.clone();
            ClientConfig::from_api_key("api-key")
                .assignment_logger(move |event: AssignmentEvent| events.lock().unwrap().push(event))
                .to_client()
        };
        client.set_configurations(UniversalFlagConfig::from_flags([boolean_flag(true)]));

        let details = client
            .get_assignment_details("flag", "subject", &HashMap::new())
            .unwrap()
            .unwrap();
        assert_eq!(details.allocation_key, "allocation");
        assert_eq!(details.variation_key, "variation");

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].feature_flag, "flag");
        assert_eq!(events[0].subject, "subject");
        assert_eq!(events[0].variation, "variation");
    }

    #[test]
    fn panicking_logger_does_not_affect_assignment() {
        let client = ClientConfig::from_api_key("api-key")
            .assignment_logger(|_event: AssignmentEvent| panic!("logger is down"))
            .to_client();
        client.set_configurations(UniversalFlagConfig::from_flags([boolean_flag(true)]));

        assert_eq!(
            client
                .get_assignment("flag", "subject", &HashMap::new())
                .unwrap(),
            Some(AssignmentValue::Boolean(true))
        );
    }

    #[test]
    fn respects_max_cache_entries() {
        let client = ClientConfig::from_api_key("api-key")
            .max_cache_entries(1)
            .to_client();
        let mut other = boolean_flag(false);
        other.key = "other".to_owned();
        client.set_configurations(UniversalFlagConfig::from_flags([boolean_flag(false)]));
        client.set_configurations(UniversalFlagConfig::from_flags([other]));

        assert!(client.get_configuration("flag").is_err());
        assert!(client.get_configuration("other").is_ok());
    }

    #[test]
    fn poller_halts_on_invalid_base_url() {
        let client = ClientConfig::from_api_key("api-key")
            .base_url("not a url")
            .to_client();
        let poller = client.start_poller_thread().unwrap();

        assert!(matches!(
            poller.wait_for_configuration(),
            Err(Error::InvalidBaseUrl(_))
        ));
        poller.shutdown().unwrap();
    }
}
