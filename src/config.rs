use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use clap::Parser;
use config_file::{ConfigFileError, FromConfigFile};
use serde::Deserialize;

use crate::effects::DEFAULT_PIPELINE;
use crate::error::ConfigError;

#[derive(Parser, Debug, Default)]
#[command(about = "Renders LED strip animations and streams them to viewers")]
pub struct Cli {
    /// Config file (TOML, JSON or YAML)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// The broker URI, e.g. tcp://localhost:1883
    #[arg(short, long, value_name = "URI")]
    pub broker: Option<String>,

    /// The MQTT client id
    #[arg(long, value_name = "CLIENT_ID")]
    pub id: Option<String>,

    /// Where viewers connect
    #[arg(short, long, value_name = "ADDR")]
    pub listen: Option<SocketAddr>,

    /// Also accept parameter updates as OSC messages on this address
    #[arg(long, value_name = "ADDR")]
    pub osc_listen: Option<SocketAddr>,

    #[arg(long)]
    pub fps: Option<u32>,

    /// Number of pixels on the strip
    #[arg(short, long)]
    pub pixels: Option<usize>,

    /// Run without a broker
    #[arg(long)]
    pub no_mqtt: bool,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub pixel_count: usize,
    pub fps: u32,
    /// Effect names in render order
    pub pipeline: Vec<String>,
    pub mqtt: MqttConfig,
    pub viewer: ViewerConfig,
    pub osc: OscConfig,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct MqttConfig {
    pub enabled: bool,
    pub broker: String,
    pub client_id: String,
    pub topic_prefix: String,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ViewerConfig {
    pub listen: SocketAddr,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct OscConfig {
    pub listen: Option<SocketAddr>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            pixel_count: 1000,
            fps: 60,
            pipeline: DEFAULT_PIPELINE.iter().map(|name| name.to_string()).collect(),
            mqtt: MqttConfig::default(),
            viewer: ViewerConfig::default(),
            osc: OscConfig::default(),
        }
    }
}

impl Default for MqttConfig {
    fn default() -> Self {
        MqttConfig {
            enabled: true,
            broker: "tcp://localhost:1883".to_string(),
            client_id: "lightsd".to_string(),
            topic_prefix: "lightsd".to_string(),
        }
    }
}

impl Default for ViewerConfig {
    fn default() -> Self {
        ViewerConfig {
            listen: SocketAddr::from(([0, 0, 0, 0], 9000)),
        }
    }
}

impl Config {
    /// Missing keys keep their defaults.
    pub fn load(path: &Path) -> Result<Config, ConfigFileError> {
        Config::from_config_file(path)
    }

    /// Command line flags win over the file.
    pub fn apply_cli(mut self, cli: &Cli) -> Config {
        if let Some(broker) = &cli.broker {
            self.mqtt.broker = broker.clone();
        }
        if let Some(id) = &cli.id {
            self.mqtt.client_id = id.clone();
        }
        if cli.no_mqtt {
            self.mqtt.enabled = false;
        }
        if let Some(listen) = cli.listen {
            self.viewer.listen = listen;
        }
        if let Some(osc_listen) = cli.osc_listen {
            self.osc.listen = Some(osc_listen);
        }
        if let Some(fps) = cli.fps {
            self.fps = fps;
        }
        if let Some(pixels) = cli.pixels {
            self.pixel_count = pixels;
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fps == 0 {
            return Err(ConfigError::InvalidFrameRate(self.fps));
        }
        Ok(())
    }
}
