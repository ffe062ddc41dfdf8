use std::path::PathBuf;

use clap::Parser;

use crate::config::{Config, ConfigError};

/// Capture a set of flat frames: park the mount and the flat cap, turn on the
/// light, take the exposures and turn the light off again.
#[derive(Parser, Debug)]
#[command(version, about)]
pub struct Args {
    /// INDI server address and port [default: localhost:7624]
    #[arg(value_name = "HOST:PORT")]
    pub address: Option<String>,

    /// INDI server address and port, same as the positional argument.
    #[arg(long = "server", value_name = "HOST:PORT", conflicts_with = "address")]
    pub server: Option<String>,

    /// JSON file with settings.  Flags given on the command line win over the file.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub mount: Option<String>,

    #[arg(long)]
    pub camera: Option<String>,

    #[arg(long)]
    pub flat_cap: Option<String>,

    /// Exposure duration in seconds.
    #[arg(long)]
    pub exposure: Option<f64>,

    /// Number of flats to capture.
    #[arg(short = 'n', long)]
    pub count: Option<usize>,

    /// Output directory, strftime placeholders are expanded.
    #[arg(short, long)]
    pub output: Option<String>,

    /// File extension for saved frames.  Defaults to the format the camera reports.
    #[arg(long)]
    pub extension: Option<String>,

    /// Brightness to set on the flat cap before turning it on.
    #[arg(long)]
    pub light_intensity: Option<f64>,

    /// Verbose logging.
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Layers the command line over the config file (if any) over the defaults.
    pub fn into_config(self) -> Result<Config, ConfigError> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };

        if let Some(server) = self.server.or(self.address) {
            config.server = server;
        }
        if let Some(mount) = self.mount {
            config.mount = mount;
        }
        if let Some(camera) = self.camera {
            config.camera = camera;
        }
        if let Some(flat_cap) = self.flat_cap {
            config.flat_cap = flat_cap;
        }
        if let Some(exposure) = self.exposure {
            config.exposure = exposure;
        }
        if let Some(count) = self.count {
            config.count = count;
        }
        if let Some(output) = self.output {
            config.output = output;
        }
        if self.extension.is_some() {
            config.extension = self.extension;
        }
        if self.light_intensity.is_some() {
            config.light_intensity = self.light_intensity;
        }

        config.validate()?;
        Ok(config)
    }
}
