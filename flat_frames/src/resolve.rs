use indi::{select_switch, Parameter, ParameterKind};

use crate::{
    retry::{PollError, RetryPolicy, Status},
    session::Session,
};

#[derive(Debug, PartialEq)]
pub enum ResolveError {
    DeviceNotFound {
        device: String,
        attempts: usize,
    },
    PropertyNotFound {
        device: String,
        property: String,
        attempts: usize,
    },
    WrongType {
        device: String,
        property: String,
        expected: ParameterKind,
        found: ParameterKind,
    },
}

impl std::fmt::Display for ResolveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolveError::DeviceNotFound { device, attempts } => {
                write!(f, "device {:?} not found after {} attempts", device, attempts)
            }
            ResolveError::PropertyNotFound {
                device,
                property,
                attempts,
            } => write!(
                f,
                "property {}.{} not found after {} attempts",
                device, property, attempts
            ),
            ResolveError::WrongType {
                device,
                property,
                expected,
                found,
            } => write!(
                f,
                "property {}.{} is a {} vector, expected {}",
                device, property, found, expected
            ),
        }
    }
}

impl std::error::Error for ResolveError {}

/// Waits for `device` to be announced by the server.
#[tracing::instrument(level = "debug", skip(session, policy))]
pub async fn device<S: Session>(
    session: &S,
    policy: &RetryPolicy,
    device: &str,
) -> Result<(), ResolveError> {
    let result = policy
        .poll_fn(|| async move {
            if session.has_device(device).await {
                Ok::<_, ResolveError>(Status::Complete(()))
            } else {
                tracing::debug!("Waiting for {}", device);
                Ok(Status::Pending)
            }
        })
        .await;
    match result {
        Ok(()) => Ok(()),
        Err(PollError::Abort(e)) => Err(e),
        Err(PollError::Exhausted { attempts }) => Err(ResolveError::DeviceNotFound {
            device: device.to_string(),
            attempts,
        }),
    }
}

/// Waits for `device` to define `property` and checks that it is a `kind` vector.
#[tracing::instrument(level = "debug", skip(session, policy))]
pub async fn property<S: Session>(
    session: &S,
    policy: &RetryPolicy,
    device: &str,
    property: &str,
    kind: ParameterKind,
) -> Result<Parameter, ResolveError> {
    let result = policy
        .poll_fn(|| async move {
            match session.parameter(device, property).await {
                Some(param) if param.kind() == kind => Ok(Status::Complete(param)),
                Some(param) => Err(ResolveError::WrongType {
                    device: device.to_string(),
                    property: property.to_string(),
                    expected: kind,
                    found: param.kind(),
                }),
                None => {
                    tracing::debug!("Waiting for {}.{}", device, property);
                    Ok(Status::Pending)
                }
            }
        })
        .await;
    match result {
        Ok(param) => Ok(param),
        Err(PollError::Abort(e)) => Err(e),
        Err(PollError::Exhausted { attempts }) => Err(ResolveError::PropertyNotFound {
            device: device.to_string(),
            property: property.to_string(),
            attempts,
        }),
    }
}

/// Values that turn `on` on and every other switch in `param` off.
pub fn select<'a>(
    device: &str,
    param: &'a Parameter,
    on: &'a str,
) -> Result<Vec<(&'a str, bool)>, ResolveError> {
    select_switch(param, on).map_err(|_| ResolveError::WrongType {
        device: device.to_string(),
        property: param.get_name().clone(),
        expected: ParameterKind::Switch,
        found: param.kind(),
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::sim::{SimOptions, SimSession};

    fn policy() -> RetryPolicy {
        RetryPolicy::new(Duration::from_millis(500), 4)
    }

    #[tokio::test(start_paused = true)]
    async fn test_device_found() {
        let session = SimSession::new(SimOptions::default());
        assert_eq!(device(&session, &policy(), "EQMod Mount").await, Ok(()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_device_missing() {
        let session = SimSession::new(SimOptions::default());
        assert_eq!(
            device(&session, &policy(), "Telescope Simulator").await,
            Err(ResolveError::DeviceNotFound {
                device: String::from("Telescope Simulator"),
                attempts: 4
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_property() {
        let session = SimSession::new(SimOptions::default());
        let param = property(
            &session,
            &policy(),
            "Gastro Flatcap",
            "CAP_PARK",
            ParameterKind::Switch,
        )
        .await
        .unwrap();
        assert_eq!(param.get_name(), "CAP_PARK");

        assert_eq!(
            property(
                &session,
                &policy(),
                "Gastro Flatcap",
                "FLAT_LIGHT_NOPE",
                ParameterKind::Switch
            )
            .await,
            Err(ResolveError::PropertyNotFound {
                device: String::from("Gastro Flatcap"),
                property: String::from("FLAT_LIGHT_NOPE"),
                attempts: 4
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_property_wrong_type() {
        let session = SimSession::new(SimOptions::default());
        assert_eq!(
            property(
                &session,
                &policy(),
                "Canon DSLR EOS 1500D",
                "CCD_EXPOSURE",
                ParameterKind::Switch
            )
            .await,
            Err(ResolveError::WrongType {
                device: String::from("Canon DSLR EOS 1500D"),
                property: String::from("CCD_EXPOSURE"),
                expected: ParameterKind::Switch,
                found: ParameterKind::Number,
            })
        );
    }
}
