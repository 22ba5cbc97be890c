use std::env;

pub const SYS_LIBRARY_ENV: &str = "AXRT_SYS_LIB";
pub const ENGINE_LIBRARY_ENV: &str = "AXRT_ENGINE_LIB";

/// Names or paths of the two native libraries the driver is bound from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DriverConfig {
    pub sys_library: String,
    pub engine_library: String,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            sys_library: "libax_sys.so".to_string(),
            engine_library: "libax_engine.so".to_string(),
        }
    }
}

impl DriverConfig {
    /// Defaults, overridden by `AXRT_SYS_LIB` / `AXRT_ENGINE_LIB` when set.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(path) = env::var(SYS_LIBRARY_ENV) {
            if !path.is_empty() {
                config.sys_library = path;
            }
        }
        if let Ok(path) = env::var(ENGINE_LIBRARY_ENV) {
            if !path.is_empty() {
                config.engine_library = path;
            }
        }
        config
    }
}
