use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use indi::{
    client::{BlobPayload, ClientError, Update, UpdateKind},
    BlobEnable, ParameterKind,
};
use tokio::{
    fs::File,
    io::AsyncWriteExt,
    sync::broadcast::{
        self,
        error::{RecvError, TryRecvError},
    },
};

use crate::{config::Config, resolve, session::Session, FlatError};

pub const ACTIVE_DEVICES: &str = "ACTIVE_DEVICES";
pub const ACTIVE_TELESCOPE: &str = "ACTIVE_TELESCOPE";
pub const CCD_FRAME_TYPE: &str = "CCD_FRAME_TYPE";
pub const FRAME_FLAT: &str = "FRAME_FLAT";
pub const CCD_EXPOSURE: &str = "CCD_EXPOSURE";
pub const CCD_EXPOSURE_VALUE: &str = "CCD_EXPOSURE_VALUE";
pub const CCD1: &str = "CCD1";

/// Hands images from the session's update stream to the exposure loop.
///
/// The slot only sees updates delivered after it was opened.  Everything else the session
/// reports (number changes, messages, other devices) is skipped.  Images are delivered
/// exactly once and in order, as long as the loop keeps within the session's update
/// buffer.  Falling further behind than that is reported as [FlatError::FramesLost].
pub struct CaptureSlot {
    device: String,
    property: String,
    updates: broadcast::Receiver<Arc<Update>>,
}

impl CaptureSlot {
    pub fn open<S: Session>(session: &S, device: &str, property: &str) -> CaptureSlot {
        CaptureSlot {
            device: device.to_string(),
            property: property.to_string(),
            updates: session.subscribe(),
        }
    }

    fn payloads<'a>(&self, update: &'a Update) -> Option<&'a Vec<BlobPayload>> {
        match &update.kind {
            UpdateKind::Blobs(payloads)
                if update.device == self.device && update.name == self.property =>
            {
                Some(payloads)
            }
            _ => None,
        }
    }

    /// Throws away every image that has already arrived.  Returns how many were dropped.
    pub fn clear(&mut self) -> Result<usize, FlatError> {
        let mut stale = 0;
        loop {
            match self.updates.try_recv() {
                Ok(update) => {
                    if let Some(payloads) = self.payloads(&update) {
                        tracing::warn!(
                            "Discarding stale image from {}.{} ({} blobs)",
                            self.device,
                            self.property,
                            payloads.len()
                        );
                        stale += 1;
                    }
                }
                Err(TryRecvError::Lagged(n)) => {
                    tracing::warn!("Skipped {} updates while clearing", n);
                }
                Err(TryRecvError::Empty) => return Ok(stale),
                Err(TryRecvError::Closed) => return Err(ClientError::Disconnected.into()),
            }
        }
    }

    /// Waits up to `timeout` for the image of exposure `index`.
    pub async fn wait(
        &mut self,
        index: usize,
        timeout: Duration,
    ) -> Result<Vec<BlobPayload>, FlatError> {
        let received = tokio::time::timeout(timeout, async {
            loop {
                match self.updates.recv().await {
                    Ok(update) => {
                        if let Some(payloads) = self.payloads(&update) {
                            return Ok(payloads.clone());
                        }
                    }
                    Err(RecvError::Lagged(n)) => return Err(FlatError::FramesLost(n)),
                    Err(RecvError::Closed) => return Err(ClientError::Disconnected.into()),
                }
            }
        })
        .await
        .map_err(|_| FlatError::CaptureTimeout {
            index,
            waited: timeout,
        })??;

        if received.iter().all(|p| p.data.is_empty()) {
            return Err(FlatError::EmptyCapture { index });
        }
        Ok(received)
    }
}

#[derive(Debug)]
enum State {
    Idle,
    ExposureRequested(usize),
    AwaitingCapture(usize),
    CaptureReceived(usize, Vec<BlobPayload>),
    Done,
}

/// File name for `payload` of exposure `index`.  Frames carrying several images get the
/// element name appended so none of them overwrite each other.
fn file_name(
    index: usize,
    payload: &BlobPayload,
    several: bool,
    extension: Option<&str>,
) -> String {
    let format = payload.format.trim_start_matches('.');
    let extension = extension
        .or(if format.is_empty() { None } else { Some(format) })
        .unwrap_or("fits");
    if several {
        format!("{:03}_{}.{}", index, payload.name, extension)
    } else {
        format!("{:03}.{}", index, extension)
    }
}

async fn drain(
    index: usize,
    payloads: Vec<BlobPayload>,
    destination: &Path,
    extension: Option<&str>,
) -> Result<Vec<PathBuf>, FlatError> {
    let several = payloads.len() > 1;
    let mut written = Vec::with_capacity(payloads.len());
    for payload in payloads {
        tracing::info!(
            "Received {} ({} bytes, {})",
            payload.name,
            payload.size,
            payload.format
        );
        let filename = destination.join(file_name(index, &payload, several, extension));
        let mut file = File::create(&filename).await?;
        file.write_all(&payload.data).await?;
        file.flush().await?;
        tracing::info!("Wrote {}", filename.display());
        written.push(filename);
    }
    Ok(written)
}

fn request<S: Session>(
    session: &S,
    slot: &mut CaptureSlot,
    config: &Config,
    index: usize,
) -> Result<(), FlatError> {
    slot.clear()?;
    tracing::info!(
        "Exposure {}/{} for {}s",
        index + 1,
        config.count,
        config.exposure
    );
    session.change(
        &config.camera,
        CCD_EXPOSURE,
        vec![(CCD_EXPOSURE_VALUE, config.exposure)],
    )?;
    Ok(())
}

/// Configures the camera for flats and captures `config.count` exposures into `destination`.
#[tracing::instrument(skip_all)]
pub async fn expose<S: Session>(
    session: &S,
    config: &Config,
    destination: &Path,
) -> Result<Vec<PathBuf>, FlatError> {
    let camera = config.camera.as_str();
    let policy = config.resolve_policy();

    resolve::property(session, &policy, camera, ACTIVE_DEVICES, ParameterKind::Text).await?;
    session.change(
        camera,
        ACTIVE_DEVICES,
        vec![(ACTIVE_TELESCOPE, config.mount.as_str())],
    )?;

    if let Some(frame_type) = session.parameter(camera, CCD_FRAME_TYPE).await {
        session.change(
            camera,
            CCD_FRAME_TYPE,
            resolve::select(camera, &frame_type, FRAME_FLAT)?,
        )?;
    }

    let mut slot = CaptureSlot::open(session, camera, CCD1);
    session.enable_blob(camera, CCD1, BlobEnable::Also)?;
    resolve::property(session, &policy, camera, CCD_EXPOSURE, ParameterKind::Number).await?;
    resolve::property(session, &policy, camera, CCD1, ParameterKind::Blob).await?;

    tokio::fs::create_dir_all(destination).await?;

    let mut written = Vec::with_capacity(config.count);
    let mut state = State::Idle;
    loop {
        state = match state {
            State::Idle => {
                request(session, &mut slot, config, 0)?;
                State::ExposureRequested(0)
            }
            State::ExposureRequested(index) => State::AwaitingCapture(index),
            State::AwaitingCapture(index) => {
                let payloads = slot.wait(index, config.capture_wait()).await?;
                State::CaptureReceived(index, payloads)
            }
            State::CaptureReceived(index, payloads) => {
                let next = index + 1;
                // Start the next exposure before writing this one out.
                if next < config.count {
                    request(session, &mut slot, config, next)?;
                }
                written.extend(
                    drain(index, payloads, destination, config.extension.as_deref()).await?,
                );
                if next < config.count {
                    State::ExposureRequested(next)
                } else {
                    State::Done
                }
            }
            State::Done => break,
        };
    }

    tracing::info!("Captured {} flats into {}", config.count, destination.display());
    Ok(written)
}
