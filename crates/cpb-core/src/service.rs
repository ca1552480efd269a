//! The common service enable handshake.
//!
//! Every CPB sensor service is brought up the same way:
//!
//! 1. **Discovering**: locate the main characteristic
//! 2. **VersionResolving**: read the version characteristic (never fails)
//! 3. **PeriodSetting**: write the measurement period, if one was requested
//! 4. **NotifyEnabling**: subscribe to the main characteristic
//! 5. **Ready**: hand `(version, main characteristic)` to the caller
//!
//! Steps run strictly in order and a failing step ends the handshake in
//! [`EnableState::Failed`]. Nothing is retried.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use cpb_core::{EnableOptions, ServiceEnabler};
//! use cpb_types::SensorService;
//!
//! let peripheral = Arc::new(peripheral);
//! let options = EnableOptions::builder()
//!     .period(Duration::from_millis(500))
//!     .build();
//! let enabler = ServiceEnabler::with_options(&peripheral, SensorService::Temperature, options);
//!
//! let (version, characteristic) = enabler
//!     .enable(|result| match result {
//!         Ok(frame) => println!("{:?}", frame.data),
//!         Err(e) => eprintln!("{}", e),
//!     })
//!     .await?;
//! ```

use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use cpb_types::uuids::{MEASUREMENT_PERIOD, MEASUREMENT_VERSION};
use cpb_types::{MeasurementFrame, SensorService, Version};

use crate::characteristic::{Characteristic, NotifyHandler};
use crate::error::{Error, ErrorKind, Result};
use crate::notify::NotificationCoordinator;
use crate::period::PeriodController;
use crate::streaming::{MeasurementResult, MeasurementStream};
use crate::traits::GattTransport;
use crate::version::VersionResolver;

/// Service and main characteristic identifying one sensor service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServiceProfile {
    /// GATT service UUID.
    pub service: Uuid,
    /// UUID of the characteristic carrying measurements.
    pub main: Uuid,
}

impl ServiceProfile {
    /// Create a profile from explicit UUIDs.
    pub fn new(service: Uuid, main: Uuid) -> Self {
        Self { service, main }
    }
}

impl From<SensorService> for ServiceProfile {
    fn from(service: SensorService) -> Self {
        Self::new(service.service_uuid(), service.main_characteristic())
    }
}

/// Progress of an enable handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnableState {
    /// No handshake has run yet.
    Idle,
    /// Looking up the main characteristic.
    Discovering,
    /// Reading the service version.
    VersionResolving,
    /// Writing the requested measurement period.
    PeriodSetting,
    /// Subscribing to the main characteristic.
    NotifyEnabling,
    /// Handshake completed.
    Ready,
    /// Handshake stopped at a failing step.
    Failed(ErrorKind),
}

impl EnableState {
    /// Whether the handshake has finished, successfully or not.
    pub fn is_terminal(&self) -> bool {
        matches!(self, EnableState::Ready | EnableState::Failed(_))
    }
}

/// Options for the enable handshake.
///
/// Use the builder pattern for convenient configuration:
///
/// ```ignore
/// let options = EnableOptions::builder()
///     .period(Duration::from_millis(250))
///     .default_version(Version(1))
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct EnableOptions {
    /// Measurement period to write before enabling notifications.
    /// Default: `None` (leave the peripheral's period unchanged).
    pub period: Option<Duration>,
    /// Period characteristic UUID.
    pub period_characteristic: Uuid,
    /// Version characteristic UUID.
    pub version_characteristic: Uuid,
    /// Version reported when the version characteristic cannot be read.
    pub default_version: Version,
}

impl Default for EnableOptions {
    fn default() -> Self {
        Self {
            period: None,
            period_characteristic: MEASUREMENT_PERIOD,
            version_characteristic: MEASUREMENT_VERSION,
            default_version: Version::DEFAULT,
        }
    }
}

impl EnableOptions {
    /// Create a new builder for EnableOptions.
    pub fn builder() -> EnableOptionsBuilder {
        EnableOptionsBuilder::default()
    }

    /// Create options that set the given period.
    pub fn with_period(period: Duration) -> Self {
        Self {
            period: Some(period),
            ..Default::default()
        }
    }

    /// Validate the options and return an error if invalid.
    ///
    /// Checks that:
    /// - the period, if any, fits the 32-bit millisecond encoding
    /// - the period and version characteristics differ
    pub fn validate(&self) -> Result<()> {
        if let Some(period) = self.period {
            cpb_types::encode_period_ms(period)?;
        }
        if self.period_characteristic == self.version_characteristic {
            return Err(Error::InvalidConfig(
                "period and version characteristics must differ".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for EnableOptions.
#[derive(Debug, Clone, Default)]
pub struct EnableOptionsBuilder {
    options: EnableOptions,
}

impl EnableOptionsBuilder {
    /// Set the measurement period.
    #[must_use]
    pub fn period(mut self, period: Duration) -> Self {
        self.options.period = Some(period);
        self
    }

    /// Override the period characteristic UUID.
    #[must_use]
    pub fn period_characteristic(mut self, uuid: Uuid) -> Self {
        self.options.period_characteristic = uuid;
        self
    }

    /// Override the version characteristic UUID.
    #[must_use]
    pub fn version_characteristic(mut self, uuid: Uuid) -> Self {
        self.options.version_characteristic = uuid;
        self
    }

    /// Override the fallback version.
    #[must_use]
    pub fn default_version(mut self, version: Version) -> Self {
        self.options.default_version = version;
        self
    }

    /// Build the EnableOptions.
    #[must_use]
    pub fn build(self) -> EnableOptions {
        self.options
    }
}

/// Results of the last handshake, owned by the enabler.
#[derive(Debug, Default)]
struct Session {
    version: Option<Version>,
    main: Option<Characteristic>,
}

/// Runs the enable handshake for one service of one peripheral.
///
/// The enabler keeps only a weak reference to the peripheral. A step that
/// starts after the peripheral has been dropped fails with
/// [`Error::PeripheralReleased`]. Dropping an in-flight enable future
/// abandons the handshake without further side effects.
///
/// Concurrent calls on the same enabler are serialized.
pub struct ServiceEnabler<P: ?Sized> {
    peripheral: Weak<P>,
    identifier: String,
    profile: ServiceProfile,
    options: EnableOptions,
    state: watch::Sender<EnableState>,
    session: Mutex<Session>,
    handshake: tokio::sync::Mutex<()>,
}

impl<P: ?Sized> std::fmt::Debug for ServiceEnabler<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceEnabler")
            .field("identifier", &self.identifier)
            .field("profile", &self.profile)
            .field("options", &self.options)
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

impl<P: GattTransport + ?Sized> ServiceEnabler<P> {
    /// Create an enabler with default options.
    pub fn new(peripheral: &Arc<P>, profile: impl Into<ServiceProfile>) -> Self {
        Self::with_options(peripheral, profile, EnableOptions::default())
    }

    /// Create an enabler with custom options.
    pub fn with_options(
        peripheral: &Arc<P>,
        profile: impl Into<ServiceProfile>,
        options: EnableOptions,
    ) -> Self {
        let (state, _) = watch::channel(EnableState::Idle);
        Self {
            peripheral: Arc::downgrade(peripheral),
            identifier: peripheral.identifier().to_string(),
            profile: profile.into(),
            options,
            state,
            session: Mutex::new(Session::default()),
            handshake: tokio::sync::Mutex::new(()),
        }
    }

    /// The service this enabler drives.
    pub fn profile(&self) -> ServiceProfile {
        self.profile
    }

    /// The options in use.
    pub fn options(&self) -> &EnableOptions {
        &self.options
    }

    /// Identifier of the peripheral, captured at construction.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Current handshake state.
    pub fn state(&self) -> EnableState {
        *self.state.borrow()
    }

    /// Watch handshake state changes.
    pub fn watch_state(&self) -> watch::Receiver<EnableState> {
        self.state.subscribe()
    }

    /// Version resolved by the last successful handshake.
    pub fn version(&self) -> Option<Version> {
        self.session().version
    }

    /// Main characteristic found by the last successful handshake.
    pub fn main_characteristic(&self) -> Option<Characteristic> {
        self.session().main.clone()
    }

    /// Locate the main characteristic and resolve the version only.
    ///
    /// Use this when the caller needs service metadata but no measurement
    /// stream. No period is written and no subscription is made.
    #[tracing::instrument(level = "info", skip_all, fields(peripheral = %self.identifier, service = %self.profile.service))]
    pub async fn enable_metadata(&self) -> Result<(Version, Characteristic)> {
        let _guard = self.handshake.lock().await;
        let result = async {
            let main = self.discover().await?;
            let version = self.resolve_version().await?;
            Ok((version, main))
        }
        .await;
        self.finish(result)
    }

    /// Run the full handshake, delivering measurement frames to `response`.
    ///
    /// `response` receives one `Ok(frame)` per notification, or `Err` when the
    /// transport reports a delivery failure. It may be called any number of
    /// times after this method returns, including zero.
    ///
    /// The returned result is the single completion signal of the handshake.
    #[tracing::instrument(level = "info", skip_all, fields(peripheral = %self.identifier, service = %self.profile.service))]
    pub async fn enable<F>(&self, response: F) -> Result<(Version, Characteristic)>
    where
        F: Fn(MeasurementResult) + Send + Sync + 'static,
    {
        let _guard = self.handshake.lock().await;
        let result = self.handshake(Arc::new(response)).await;
        self.finish(result)
    }

    /// Run the full handshake and return the measurement frames as a stream.
    pub async fn enable_stream(&self) -> Result<(Version, Characteristic, MeasurementStream)> {
        let (sink, stream) = MeasurementStream::channel();
        let (version, main) = self
            .enable(move |result| {
                sink.send(result);
            })
            .await?;
        Ok((version, main, stream))
    }

    /// Read the service's current measurement period.
    pub async fn period(&self) -> Result<Option<Duration>> {
        let peripheral = self.peripheral()?;
        Ok(PeriodController::new(&*peripheral)
            .characteristic(self.options.period_characteristic)
            .get_period(self.profile.service)
            .await)
    }

    /// Write a new measurement period outside of the handshake.
    pub async fn set_period(&self, period: Duration) -> Result<()> {
        let peripheral = self.peripheral()?;
        PeriodController::new(&*peripheral)
            .characteristic(self.options.period_characteristic)
            .set_period(period, self.profile.service)
            .await
    }

    /// Stop notifications on the main characteristic, if enabled.
    pub async fn disable(&self) -> Result<()> {
        let Some(main) = self.main_characteristic() else {
            return Ok(());
        };
        let peripheral = self.peripheral()?;
        NotificationCoordinator::new(&*peripheral)
            .disable(&main)
            .await
    }

    async fn handshake(
        &self,
        response: Arc<dyn Fn(MeasurementResult) + Send + Sync>,
    ) -> Result<(Version, Characteristic)> {
        let main = self.discover().await?;
        let version = self.resolve_version().await?;

        if let Some(period) = self.options.period {
            self.transition(EnableState::PeriodSetting);
            let peripheral = self.peripheral()?;
            PeriodController::new(&*peripheral)
                .characteristic(self.options.period_characteristic)
                .set_period(period, self.profile.service)
                .await?;
        }

        self.transition(EnableState::NotifyEnabling);
        let peripheral = self.peripheral()?;
        let handler = measurement_handler(&main, self.identifier.clone(), response);
        NotificationCoordinator::new(&*peripheral)
            .enable(&main, handler)
            .await?;

        Ok((version, main))
    }

    async fn discover(&self) -> Result<Characteristic> {
        self.transition(EnableState::Discovering);
        let peripheral = self.peripheral()?;
        let ServiceProfile { service, main } = self.profile;
        peripheral
            .characteristic(service, main)
            .await
            .map_err(|e| match e {
                Error::InvalidCharacteristic { .. } => e,
                other => {
                    warn!(error = %other, "Main characteristic lookup failed");
                    Error::invalid_characteristic(service, main)
                }
            })
    }

    async fn resolve_version(&self) -> Result<Version> {
        self.transition(EnableState::VersionResolving);
        let peripheral = self.peripheral()?;
        Ok(VersionResolver::new(&*peripheral)
            .characteristic(self.options.version_characteristic)
            .default_version(self.options.default_version)
            .resolve(self.profile.service)
            .await)
    }

    fn finish(
        &self,
        result: Result<(Version, Characteristic)>,
    ) -> Result<(Version, Characteristic)> {
        match &result {
            Ok((version, main)) => {
                let mut session = self.session();
                session.version = Some(*version);
                session.main = Some(main.clone());
                drop(session);
                self.transition(EnableState::Ready);
                info!(%version, "Service ready");
            }
            Err(e) => {
                self.transition(EnableState::Failed(e.kind()));
                warn!(error = %e, "Service enable failed");
            }
        }
        result
    }

    fn transition(&self, state: EnableState) {
        debug!(?state, "Enable state");
        self.state.send_replace(state);
    }

    fn peripheral(&self) -> Result<Arc<P>> {
        self.peripheral.upgrade().ok_or(Error::PeripheralReleased)
    }

    fn session(&self) -> std::sync::MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Build the handler that turns notifications into measurement frames.
///
/// The handler holds the characteristic weakly; once the characteristic is
/// gone, notifications are ignored.
fn measurement_handler(
    characteristic: &Characteristic,
    peripheral: String,
    response: Arc<dyn Fn(MeasurementResult) + Send + Sync>,
) -> NotifyHandler {
    let weak = characteristic.downgrade();
    Arc::new(move |event: Result<()>| {
        if let Err(e) = event {
            response(Err(e));
            return;
        }
        let Some(characteristic) = weak.upgrade() else {
            debug!("Characteristic released, ignoring notification");
            return;
        };
        if let Some(data) = characteristic.value() {
            response(Ok(MeasurementFrame::new(data, peripheral.clone())));
        }
    })
}
