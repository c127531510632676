use aws_config::retry::RetryConfig;
use aws_config::timeout::TimeoutConfig;
use aws_config::{BehaviorVersion, ConfigLoader, SdkConfig};
use aws_sdk_s3::Client;
use aws_sdk_s3::config::{Credentials, Region, StalledStreamProtectionConfig};
use std::time::Duration;

use crate::config::ClientConfig;
use crate::types::S3Credentials;

impl ClientConfig {
    /// Create an S3 client from this configuration.
    pub async fn create_client(&self) -> Client {
        let sdk_config = self.load_sdk_config().await;
        self.create_client_from_sdk_config(&sdk_config)
    }

    /// Create an S3 client from an already loaded `SdkConfig`.
    ///
    /// The same `SdkConfig` also signs audit log requests, so the entry
    /// point loads it once and shares it.
    pub fn create_client_from_sdk_config(&self, sdk_config: &SdkConfig) -> Client {
        let builder = aws_sdk_s3::config::Builder::from(sdk_config)
            .force_path_style(self.force_path_style);
        Client::from_conf(builder.build())
    }

    pub async fn load_sdk_config(&self) -> SdkConfig {
        let config_loader = self.load_config_credential(aws_config::defaults(
            BehaviorVersion::latest(),
        ));
        let mut config_loader = self
            .build_region_provider(config_loader)
            .retry_config(self.build_retry_config())
            .timeout_config(self.build_timeout_config());

        if let Some(endpoint_url) = &self.endpoint_url {
            config_loader = config_loader.endpoint_url(endpoint_url);
        }

        if self.disable_stalled_stream_protection {
            config_loader =
                config_loader.stalled_stream_protection(StalledStreamProtectionConfig::disabled());
        }

        config_loader.load().await
    }

    fn load_config_credential(&self, config_loader: ConfigLoader) -> ConfigLoader {
        match &self.credential {
            S3Credentials::Credentials { access_keys } => {
                let credentials = Credentials::new(
                    access_keys.access_key.to_string(),
                    access_keys.secret_access_key.to_string(),
                    access_keys.session_token.clone(),
                    None,
                    "",
                );
                config_loader.credentials_provider(credentials)
            }
            S3Credentials::Profile(profile_name) => config_loader.profile_name(profile_name),
            S3Credentials::FromEnvironment => config_loader,
        }
    }

    fn build_region_provider(&self, config_loader: ConfigLoader) -> ConfigLoader {
        match &self.region {
            Some(region) => config_loader.region(Region::new(region.clone())),
            // default region chain
            None => config_loader,
        }
    }

    fn build_retry_config(&self) -> RetryConfig {
        RetryConfig::standard()
            .with_max_attempts(self.retry_config.aws_max_attempts)
            .with_initial_backoff(Duration::from_millis(
                self.retry_config.initial_backoff_milliseconds,
            ))
    }

    fn build_timeout_config(&self) -> TimeoutConfig {
        let timeouts = &self.cli_timeout_config;
        let mut builder = TimeoutConfig::builder();
        builder
            .set_operation_timeout(timeouts.operation_timeout_milliseconds.map(Duration::from_millis))
            .set_operation_attempt_timeout(
                timeouts
                    .operation_attempt_timeout_milliseconds
                    .map(Duration::from_millis),
            )
            .set_connect_timeout(timeouts.connect_timeout_milliseconds.map(Duration::from_millis))
            .set_read_timeout(timeouts.read_timeout_milliseconds.map(Duration::from_millis));
        builder.build()
    }
}
