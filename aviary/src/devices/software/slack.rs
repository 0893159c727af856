use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Base url of the Slack Web API.
const SLACK_API_URL: &str = "https://slack.com/api";

/// Failures delivering to the notification channel. These are never fatal
/// to the control loop, callers log them and move on.
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Notification channel credentials are missing")]
    MissingCredentials,
    #[error("File does not exist: {0:?}")]
    MissingFile(PathBuf),
    #[error("Failed to read attachment: {0}")]
    Io(#[from] std::io::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Slack API error: {0}")]
    Api(String),
}

/// Messaging collaborator used for alerts and report delivery.
pub trait Notifier {
    /// Post a plain text message.
    fn post_message(&self, text: &str) -> Result<(), NotifyError>;
    /// Post a file as an attachment.
    fn post_file(&self, path: &Path) -> Result<(), NotifyError>;
}

/// Slack channel and bot token. The token is normally provided through the
/// environment rather than committed with the rest of the configuration.
#[derive(Deserialize, Serialize, PartialEq, Eq, Debug, Clone)]
pub struct SlackConfig {
    /// Channel id, e.g. the `monitor_alerts` channel.
    pub channel_id: String,
    /// Bot token (`xoxb-...`).
    pub token: String,
}

/// Envelope shared by every Slack Web API response.
#[derive(Deserialize, Debug)]
struct SlackResponse {
    ok: bool,
    error: Option<String>,
}

impl SlackResponse {
    fn into_result(self) -> Result<(), NotifyError> {
        if self.ok {
            Ok(())
        } else {
            Err(NotifyError::Api(
                self.error.unwrap_or_else(|| String::from("unknown error")),
            ))
        }
    }
}

/// Response of `files.getUploadURLExternal`.
#[derive(Deserialize, Debug)]
struct UploadUrlResponse {
    ok: bool,
    error: Option<String>,
    upload_url: Option<String>,
    file_id: Option<String>,
}

/// Notification channel backed by the Slack Web API.
pub struct SlackNotifier {
    client: Client,
    config: SlackConfig,
    api_url: String,
}

impl SlackNotifier {
    /// Create a client for the configured channel.
    ///
    /// * `config`: channel id and bot token, both must be set.
    pub fn new(config: SlackConfig) -> Result<Self, NotifyError> {
        if config.token.trim().is_empty() || config.channel_id.trim().is_empty() {
            return Err(NotifyError::MissingCredentials);
        }
        Ok(Self {
            client: Client::new(),
            config,
            api_url: String::from(SLACK_API_URL),
        })
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/{method}", self.api_url)
    }
}

impl Notifier for SlackNotifier {
    fn post_message(&self, text: &str) -> Result<(), NotifyError> {
        let response: SlackResponse = self
            .client
            .post(self.endpoint("chat.postMessage"))
            .bearer_auth(&self.config.token)
            .json(&json!({ "channel": self.config.channel_id, "text": text }))
            .send()?
            .error_for_status()?
            .json()?;
        response.into_result()?;
        debug!("Posted message to channel {}", self.config.channel_id);
        Ok(())
    }

    /// Files go through the external upload flow: reserve an upload url,
    /// push the bytes, then share the file into the channel.
    fn post_file(&self, path: &Path) -> Result<(), NotifyError> {
        if !path.is_file() {
            return Err(NotifyError::MissingFile(path.to_path_buf()));
        }
        let contents = std::fs::read(path)?;
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| String::from("report.csv"));

        let reservation: UploadUrlResponse = self
            .client
            .post(self.endpoint("files.getUploadURLExternal"))
            .bearer_auth(&self.config.token)
            .form(&[
                ("filename", filename.clone()),
                ("length", contents.len().to_string()),
            ])
            .send()?
            .error_for_status()?
            .json()?;
        let (upload_url, file_id) = match reservation {
            UploadUrlResponse {
                ok: true,
                upload_url: Some(upload_url),
                file_id: Some(file_id),
                ..
            } => (upload_url, file_id),
            UploadUrlResponse { error, .. } => {
                return Err(NotifyError::Api(
                    error.unwrap_or_else(|| String::from("no upload url returned")),
                ))
            }
        };

        self.client
            .post(upload_url)
            .body(contents)
            .send()?
            .error_for_status()?;

        let response: SlackResponse = self
            .client
            .post(self.endpoint("files.completeUploadExternal"))
            .bearer_auth(&self.config.token)
            .json(&json!({
                "files": [{ "id": file_id, "title": filename }],
                "channel_id": self.config.channel_id,
            }))
            .send()?
            .error_for_status()?
            .json()?;
        response.into_result()?;
        info!("File uploaded to Slack, file id = {file_id}");
        Ok(())
    }
}

#[cfg(test)]
pub use recording::RecordingNotifier;

#[cfg(test)]
mod recording {
    use super::{Notifier, NotifyError};
    use std::{
        cell::RefCell,
        collections::HashSet,
        path::{Path, PathBuf},
    };

    /// Notifier double that records what would have been sent. Files whose
    /// name contains one of `failing_files` are rejected.
    #[derive(Default)]
    pub struct RecordingNotifier {
        pub messages: RefCell<Vec<String>>,
        pub files: RefCell<Vec<PathBuf>>,
        pub failing_files: HashSet<String>,
        pub fail_messages: bool,
    }

    impl Notifier for RecordingNotifier {
        fn post_message(&self, text: &str) -> Result<(), NotifyError> {
            if self.fail_messages {
                return Err(NotifyError::Api(String::from("channel_not_found")));
            }
            self.messages.borrow_mut().push(text.to_string());
            Ok(())
        }

        fn post_file(&self, path: &Path) -> Result<(), NotifyError> {
            let name = path.to_string_lossy();
            if self.failing_files.iter().any(|f| name.contains(f.as_str())) {
                return Err(NotifyError::Api(String::from("invalid_auth")));
            }
            self.files.borrow_mut().push(path.to_path_buf());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("", "C04SXKM8K7V")]
    #[case("xoxb-token", "")]
    #[case("   ", "C04SXKM8K7V")]
    fn test_missing_credentials_are_fatal(#[case] token: &str, #[case] channel_id: &str) {
        let config = SlackConfig {
            channel_id: String::from(channel_id),
            token: String::from(token),
        };
        assert!(matches!(
            SlackNotifier::new(config),
            Err(NotifyError::MissingCredentials)
        ));
    }

    #[test]
    fn test_missing_attachment_fails_before_network() {
        let notifier = SlackNotifier::new(SlackConfig {
            channel_id: String::from("C04SXKM8K7V"),
            token: String::from("xoxb-token"),
        })
        .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing_weight_report.csv");
        assert!(matches!(
            notifier.post_file(&missing),
            Err(NotifyError::MissingFile(path)) if path == missing
        ));
    }

    #[test]
    fn test_api_error_is_surfaced() {
        let response: SlackResponse =
            serde_json::from_str(r#"{"ok": false, "error": "not_in_channel"}"#).unwrap();
        assert!(matches!(
            response.into_result(),
            Err(NotifyError::Api(error)) if error == "not_in_channel"
        ));
    }

    #[cfg_attr(not(feature = "hardware_test"), ignore)]
    #[test]
    /// Posts a message to the real channel, token taken from the environment.
    fn test_post_message_to_channel() {
        let notifier = SlackNotifier::new(SlackConfig {
            channel_id: std::env::var("AVIARY_NOTIFICATION__CHANNEL_ID").unwrap_or_default(),
            token: std::env::var("AVIARY_NOTIFICATION__TOKEN").unwrap_or_default(),
        })
        .expect("Notification credentials not set");
        notifier
            .post_message("aviary hardware test message")
            .expect("Failed to post message");
    }
}
