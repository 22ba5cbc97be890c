use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use axrt_sys::{AxDriver, ChipType, Driver, DriverConfig, VnpuMode};
use tracing::{debug, info, warn};

use crate::{Error, Result};

// Devices still alive, at most one per driver.
static LIVE: Mutex<Vec<Weak<Device>>> = Mutex::new(Vec::new());
// The device opened from the vendor libraries.
static OPENED: Mutex<Weak<Device>> = Mutex::new(Weak::new());

/// A brought-up NPU driver.
///
/// Acquiring runs system init and engine init; the last `Arc<Device>` to drop
/// runs engine deinit and system deinit. Sessions and buffer sets hold a clone,
/// so the driver is torn down only after every one of them is gone.
///
/// While a device is alive, opening or acquiring the same driver again hands
/// out that device instead of initializing twice.
pub struct Device {
    driver: Arc<dyn Driver>,
    chip: ChipType,
    vnpu: VnpuMode,
    version: String,
}

impl Device {
    /// Loads the vendor libraries named by `AXRT_SYS_LIB` / `AXRT_ENGINE_LIB`
    /// (or the defaults) and brings the driver up.
    pub fn open() -> Result<Arc<Self>> {
        Self::open_with(&DriverConfig::from_env())
    }

    /// Returns the device already opened in this process, if it is still alive;
    /// `config` only applies to the first open.
    pub fn open_with(config: &DriverConfig) -> Result<Arc<Self>> {
        let mut opened = OPENED.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(device) = opened.upgrade() {
            debug!("reusing opened npu device");
            return Ok(device);
        }

        let driver = AxDriver::load(config).map_err(|source| Error::DriverInit {
            stage: "library load",
            source,
        })?;
        let device = Self::acquire(Arc::new(driver))?;
        *opened = Arc::downgrade(&device);
        Ok(device)
    }

    /// Brings `driver` up, or returns the live device already running it.
    pub fn acquire(driver: Arc<dyn Driver>) -> Result<Arc<Self>> {
        let mut live = LIVE.lock().unwrap_or_else(PoisonError::into_inner);
        live.retain(|device| device.strong_count() > 0);
        if let Some(device) = live
            .iter()
            .filter_map(Weak::upgrade)
            .find(|device| same_driver(&device.driver, &driver))
        {
            debug!("reusing acquired npu device");
            return Ok(device);
        }

        let device = Self::bring_up(driver)?;
        live.push(Arc::downgrade(&device));
        Ok(device)
    }

    fn bring_up(driver: Arc<dyn Driver>) -> Result<Arc<Self>> {
        driver.sys_init().map_err(|source| Error::DriverInit {
            stage: "sys init",
            source,
        })?;

        let vnpu = match driver.vnpu_mode() {
            Ok(mode) => mode,
            Err(err) => {
                // The NPU was never partitioned.
                warn!(error = %err, "vnpu mode unavailable, assuming disabled");
                VnpuMode::Disabled
            }
        };

        if let Err(source) = driver.engine_init(vnpu) {
            if let Err(err) = driver.sys_deinit() {
                warn!(error = %err, "sys deinit failed while unwinding engine init");
            }
            return Err(Error::DriverInit {
                stage: "engine init",
                source,
            });
        }

        let chip = driver.chip_type();
        let version = driver.engine_version();
        info!(%chip, "chip type");
        info!(%vnpu, "vnpu type");
        info!(%version, "engine version");

        Ok(Arc::new(Self {
            driver,
            chip,
            vnpu,
            version,
        }))
    }

    pub fn chip_type(&self) -> ChipType {
        self.chip
    }

    pub fn vnpu_mode(&self) -> VnpuMode {
        self.vnpu
    }

    pub fn driver_version(&self) -> &str {
        &self.version
    }

    pub(crate) fn driver(&self) -> &dyn Driver {
        self.driver.as_ref()
    }
}

fn same_driver(a: &Arc<dyn Driver>, b: &Arc<dyn Driver>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("chip", &self.chip)
            .field("vnpu", &self.vnpu)
            .field("version", &self.version)
            .finish()
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        if let Err(err) = self.driver.engine_deinit() {
            warn!(error = %err, "engine deinit failed");
        }
        if let Err(err) = self.driver.sys_deinit() {
            warn!(error = %err, "sys deinit failed");
        }
    }
}
