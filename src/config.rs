use std::path::Path;

use tracing::info;

use crate::errors::SpecError;
use crate::probe::model::System;

pub const TEMPLATE_FILE: &str = "template.json";
pub const REMOTE_SPEC_URL_ENV: &str = "SYSPOLL_REMOTE_SPEC_URL";

pub fn template() -> Vec<System> {
    vec![System::http("Descriptive name", "30s", "https://google.com")]
}

/// Initial systems: `file` when given, otherwise the remote spec if
/// [`REMOTE_SPEC_URL_ENV`] is set, otherwise none.
pub async fn load_initial_systems(file: Option<&Path>) -> Result<Vec<System>, SpecError> {
    if let Some(path) = file {
        return load_systems(path).await;
    }
    if let Ok(remote_url) = std::env::var(REMOTE_SPEC_URL_ENV) {
        let remote_url = remote_url.trim();
        if !remote_url.is_empty() {
            return load_systems_from_remote(remote_url).await;
        }
    }
    Ok(Vec::new())
}

pub async fn load_systems<P: AsRef<Path>>(path: P) -> Result<Vec<System>, SpecError> {
    let path = path.as_ref();
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| SpecError::Open {
            path: path.to_path_buf(),
            source,
        })?;
    let systems: Vec<System> =
        serde_json::from_str(&content).map_err(|source| SpecError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    info!(path = %path.display(), systems = systems.len(), "polling spec loaded");
    Ok(systems)
}

pub async fn load_systems_from_remote(url: &str) -> Result<Vec<System>, SpecError> {
    let insecure = || SpecError::InsecureRemote {
        var: REMOTE_SPEC_URL_ENV,
        url: url.to_owned(),
    };
    let parsed = reqwest::Url::parse(url).map_err(|_| insecure())?;
    let scheme = parsed.scheme();
    let allowed = scheme == "https"
        || (cfg!(test)
            && scheme == "http"
            && parsed
                .host_str()
                .is_some_and(|h| h == "127.0.0.1" || h == "localhost"));
    if !allowed {
        return Err(insecure());
    }

    let fetch_error = |source| SpecError::RemoteFetch {
        url: url.to_owned(),
        source,
    };
    let response = crate::probe::http_probe::shared_client()
        .get(parsed)
        .send()
        .await
        .map_err(fetch_error)?;

    let status = response.status();
    if !status.is_success() {
        return Err(SpecError::RemoteStatus {
            url: url.to_owned(),
            status: status.as_u16(),
        });
    }

    let content = response.text().await.map_err(fetch_error)?;
    let systems: Vec<System> =
        serde_json::from_str(&content).map_err(|source| SpecError::RemoteParse {
            url: url.to_owned(),
            source,
        })?;
    info!(%url, systems = systems.len(), "remote polling spec loaded");
    Ok(systems)
}

/// Writes `systems` as a two-space indented JSON array, replacing the file.
pub async fn save_systems<P: AsRef<Path>>(path: P, systems: &[System]) -> Result<(), SpecError> {
    let path = path.as_ref();
    let mut encoded = serde_json::to_string_pretty(systems).map_err(SpecError::Encode)?;
    encoded.push('\n');
    tokio::fs::write(path, encoded)
        .await
        .map_err(|source| SpecError::Write {
            path: path.to_path_buf(),
            source,
        })?;
    info!(path = %path.display(), systems = systems.len(), "polling spec saved");
    Ok(())
}

/// Writes the one-element example spec to `path`.
pub async fn write_template<P: AsRef<Path>>(path: P) -> Result<(), SpecError> {
    save_systems(path, &template()).await
}
