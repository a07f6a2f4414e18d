//! Configuration types for the voice session and its collaborators.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default system instruction sent at session open.
///
/// This is the advisor persona the remote service speaks as. Kept in config
/// so deployments can replace it without recompiling.
const DEFAULT_SYSTEM_INSTRUCTION: &str = "You are FinVocalist, an advanced AI Financial Advisor.\n\
Your goals:\n\
1. Provide personalized financial advice: use 'get_financial_profile' to understand user patterns.\n\
   Check the savings rate and emergency runway metrics; if savings rate is below 20%, recommend\n\
   specific cuts to discretionary spending, and if emergency runway is under 6 months, make\n\
   emergency saving the #1 recommendation. Use 'add_financial_insight' to post permanent\n\
   recommendations to the dashboard.\n\
2. Voice-activated bill payment: use 'get_pending_bills' to identify bills and 'pay_bill' to\n\
   initiate payment. Mention Voice ID Authentication for security, and always confirm the amount\n\
   and biller before proceeding.\n\
3. General finance: manage transactions and balances.\n\
4. Fund transfers: move money between accounts with 'transfer_funds'.\n\
Be proactive, warm, professional, and secure.";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VoxConfig {
    /// Audio capture/playback settings.
    pub audio: AudioConfig,
    /// Realtime session settings (service endpoint, voice, transcription).
    pub session: SessionConfig,
    /// Finance backend settings.
    pub finance: FinanceConfig,
}

/// Audio I/O configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Input sample rate in Hz (rate sent to the service).
    pub input_sample_rate: u32,
    /// Output sample rate in Hz (rate the service streams back).
    pub output_sample_rate: u32,
    /// Number of input channels (1 = mono).
    pub input_channels: u16,
    /// Maximum captured frames held while the encoder catches up.
    ///
    /// The capture callback never blocks; when the queue is full the oldest
    /// frame is dropped. See `FrameQueue` for the overflow policy.
    pub capture_queue_frames: usize,
    /// Input device name (None = system default).
    pub input_device: Option<String>,
    /// Output device name (None = system default).
    pub output_device: Option<String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            input_sample_rate: 16_000,
            output_sample_rate: 24_000,
            input_channels: 1,
            capture_queue_frames: 32,
            input_device: None,
            output_device: None,
        }
    }
}

/// Realtime conversational service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// WebSocket URL of the conversational service.
    pub service_url: String,
    /// Model identifier requested at session open.
    pub model: String,
    /// Prebuilt voice name for synthesized replies.
    pub voice: String,
    /// Whether the service should transcribe captured user audio.
    pub transcribe_input: bool,
    /// Whether the service should transcribe its own spoken replies.
    pub transcribe_output: bool,
    /// System instruction text block sent at session open.
    pub system_instruction: String,
    /// Environment variable holding the service API key.
    pub api_key_env: String,
    /// Bound of the outbound message queue.
    ///
    /// Under sustained network slowness the queue fills and further captured
    /// audio is dropped rather than backpressuring the device.
    pub outbound_queue_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            service_url: "wss://generativelanguage.example.com/v1/live".to_owned(),
            model: "gemini-2.5-flash-native-audio".to_owned(),
            voice: "Kore".to_owned(),
            transcribe_input: true,
            transcribe_output: true,
            system_instruction: DEFAULT_SYSTEM_INSTRUCTION.to_owned(),
            api_key_env: "GEMINI_API_KEY".to_owned(),
            outbound_queue_size: 64,
        }
    }
}

/// Finance backend REST API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FinanceConfig {
    /// Base URL of the finance backend.
    pub base_url: String,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for FinanceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_owned(),
            request_timeout_secs: 10,
        }
    }
}

impl VoxConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::error::VoxError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::VoxError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `~/.config/finvox/config.toml`.
    pub fn default_config_path() -> PathBuf {
        if let Some(config) = std::env::var_os("XDG_CONFIG_HOME") {
            PathBuf::from(config).join("finvox").join("config.toml")
        } else if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home)
                .join(".config")
                .join("finvox")
                .join("config.toml")
        } else {
            PathBuf::from("/tmp/finvox-config/config.toml")
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = VoxConfig::default();
        assert!(config.audio.input_sample_rate > 0);
        assert!(config.audio.output_sample_rate > 0);
        assert!(config.audio.capture_queue_frames > 0);
        assert!(config.session.outbound_queue_size > 0);
        assert!(!config.session.voice.is_empty());
        assert!(!config.session.system_instruction.is_empty());
        assert!(config.finance.base_url.starts_with("http"));
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = VoxConfig::default();
        config.audio.input_sample_rate = 44_100;
        config.session.voice = "Puck".to_owned();
        config.save_to_file(&path).unwrap();

        let loaded = VoxConfig::from_file(&path).unwrap();
        assert_eq!(loaded.audio.input_sample_rate, 44_100);
        assert_eq!(loaded.session.voice, "Puck");
        // Untouched fields keep their defaults.
        assert_eq!(loaded.audio.output_sample_rate, 24_000);
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.toml");
        std::fs::write(&path, "[session]\nvoice = \"Aoede\"\n").unwrap();

        let loaded = VoxConfig::from_file(&path).unwrap();
        assert_eq!(loaded.session.voice, "Aoede");
        assert_eq!(loaded.audio.input_sample_rate, 16_000);
    }
}
