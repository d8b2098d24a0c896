use crate::error::AppError;
use config::{Config as Cfg, Environment, File};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

/// Locate a service's `config` directory.
///
/// Works both when started from the workspace root and from inside the
/// service directory itself.
pub fn configuration_directory(service_dir: &str) -> Result<PathBuf, AppError> {
    let base_path = std::env::current_dir()?;

    if base_path.ends_with(service_dir) {
        Ok(base_path.join("config"))
    } else {
        Ok(base_path.join(service_dir).join("config"))
    }
}

/// Load settings from `<dir>/base.yaml`, then apply `APP_`-prefixed
/// environment overrides (`APP_SECTION__KEY`).
pub fn load_settings<T: DeserializeOwned>(configuration_directory: &Path) -> Result<T, AppError> {
    dotenvy::dotenv().ok();

    let settings = Cfg::builder()
        .add_source(File::from(configuration_directory.join("base.yaml")).required(true))
        .add_source(
            Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    Ok(settings.try_deserialize::<T>()?)
}
