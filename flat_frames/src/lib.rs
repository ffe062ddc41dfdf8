use std::{
    future::Future,
    path::{Path, PathBuf},
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use indi::{client::ClientError, ParameterKind};

pub mod capture;
pub mod cli;
pub mod config;
pub mod connection;
pub mod on_drop;
pub mod resolve;
pub mod retry;
pub mod sequence;
pub mod session;

#[cfg(test)]
mod sim;

use config::{Config, ConfigError};
use on_drop::OnDropFutureExt;
use resolve::ResolveError;
use session::Session;

#[derive(Debug)]
pub enum FlatError {
    ServerUnreachable {
        addr: String,
        source: std::io::Error,
    },
    Resolve(ResolveError),
    NotConnected {
        device: String,
        attempts: usize,
    },
    ParkFailed {
        device: String,
    },
    ParkTimeout {
        device: String,
        timeout: Duration,
    },
    LightFailed {
        device: String,
    },
    CaptureTimeout {
        index: usize,
        waited: Duration,
    },
    EmptyCapture {
        index: usize,
    },
    FramesLost(u64),
    Interrupted,
    Session(ClientError),
    Io(std::io::Error),
    Config(ConfigError),
}

impl FlatError {
    /// Process exit status for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            FlatError::ServerUnreachable { .. } => 1,
            FlatError::Interrupted => 130,
            _ => 2,
        }
    }
}

impl std::fmt::Display for FlatError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FlatError::ServerUnreachable { addr, .. } => {
                write!(f, "No indiserver running on {}", addr)
            }
            FlatError::Resolve(e) => write!(f, "{}", e),
            FlatError::NotConnected { device, attempts } => write!(
                f,
                "{} did not connect after {} attempts",
                device, attempts
            ),
            FlatError::ParkFailed { device } => write!(f, "{} refused to park", device),
            FlatError::ParkTimeout { device, timeout } => write!(
                f,
                "{} did not report parked within {}s",
                device,
                timeout.as_secs_f64()
            ),
            FlatError::LightFailed { device } => {
                write!(f, "{} did not turn the light on", device)
            }
            FlatError::CaptureTimeout { index, waited } => write!(
                f,
                "no image for exposure {} after {}s",
                index,
                waited.as_secs_f64()
            ),
            FlatError::EmptyCapture { index } => {
                write!(f, "exposure {} delivered no image data", index)
            }
            FlatError::FramesLost(n) => {
                write!(f, "{} updates were dropped before they were read", n)
            }
            FlatError::Interrupted => write!(f, "interrupted"),
            FlatError::Session(e) => write!(f, "{}", e),
            FlatError::Io(e) => write!(f, "io error: {}", e),
            FlatError::Config(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for FlatError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FlatError::ServerUnreachable { source, .. } => Some(source),
            FlatError::Resolve(e) => Some(e),
            FlatError::Session(e) => Some(e),
            FlatError::Io(e) => Some(e),
            FlatError::Config(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ResolveError> for FlatError {
    fn from(value: ResolveError) -> Self {
        FlatError::Resolve(value)
    }
}

impl From<ClientError> for FlatError {
    fn from(value: ClientError) -> Self {
        FlatError::Session(value)
    }
}

impl From<std::io::Error> for FlatError {
    fn from(value: std::io::Error) -> Self {
        FlatError::Io(value)
    }
}

impl From<ConfigError> for FlatError {
    fn from(value: ConfigError) -> Self {
        FlatError::Config(value)
    }
}

/// Opens the INDI session for `config.server`.  A server that refuses the connection, or
/// doesn't answer within `server_timeout`, is reported as [FlatError::ServerUnreachable].
pub async fn connect(config: &Config) -> Result<indi::client::Client, FlatError> {
    within_server_timeout(config, indi::client::connect(config.server.as_str())).await
}

async fn within_server_timeout<T>(
    config: &Config,
    connecting: impl Future<Output = Result<T, ClientError>>,
) -> Result<T, FlatError> {
    let unreachable = |source: std::io::Error| FlatError::ServerUnreachable {
        addr: config.server.clone(),
        source,
    };
    match tokio::time::timeout(config.server_timeout(), connecting).await {
        Ok(Ok(connected)) => Ok(connected),
        Ok(Err(ClientError::Io(e))) => Err(unreachable(e)),
        Ok(Err(e)) => Err(e.into()),
        Err(_) => Err(unreachable(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            format!("no answer within {}s", config.server_timeout),
        ))),
    }
}

/// Runs a complete flat session against `session`, writing images into `destination`.
///
/// Once the flat cap's light switch has been resolved the light is turned off exactly once
/// on the way out, whether the run finishes, fails, or is dropped part way through.
#[tracing::instrument(skip_all)]
pub async fn run<S: Session>(
    session: &S,
    config: &Config,
    destination: &Path,
) -> Result<Vec<PathBuf>, FlatError> {
    let light_resolved = AtomicBool::new(false);

    async {
        let policy = config.resolve_policy();
        for device in [&config.mount, &config.camera, &config.flat_cap] {
            resolve::device(session, &policy, device).await?;
        }
        connection::ensure_connected(session, config, &config.mount).await?;
        connection::ensure_connected(session, config, &config.flat_cap).await?;
        resolve::property(
            session,
            &policy,
            &config.flat_cap,
            sequence::FLAT_LIGHT_CONTROL,
            ParameterKind::Switch,
        )
        .await?;
        light_resolved.store(true, Ordering::SeqCst);
        connection::ensure_connected(session, config, &config.camera).await?;

        sequence::park(session, config, &config.mount, sequence::TELESCOPE_PARK).await?;
        sequence::park(session, config, &config.flat_cap, sequence::CAP_PARK).await?;
        sequence::light_on(session, config).await?;
        let written = capture::expose(session, config, destination).await?;
        Ok::<_, FlatError>(written)
    }
    .on_drop(|| {
        if light_resolved.load(Ordering::SeqCst) {
            sequence::light_off(session, &config.flat_cap);
        } else {
            tracing::info!(
                "Light control on {} never resolved, leaving it alone",
                config.flat_cap
            );
        }
    })
    .await
}
