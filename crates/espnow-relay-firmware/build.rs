//! Build-time configuration
//!
//! Reads `RELAY_*` settings from the environment or a `.env` file next to this
//! crate and generates:
//! - `relay_config.rs`: a `RELAY_CONFIG` constant included by `src/config.rs`
//! - `trust_anchor.der`: the CA certificate named by `RELAY_CA_PEM`, in DER

use std::env;
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

const PEM_BEGIN: &str = "-----BEGIN CERTIFICATE-----";
const PEM_END: &str = "-----END CERTIFICATE-----";

fn main() -> Result<(), Box<dyn Error>> {
    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR")?);
    let out_dir = PathBuf::from(env::var("OUT_DIR")?);

    let env_file = manifest_dir.join(".env");
    println!("cargo:rerun-if-changed={}", env_file.display());
    if env_file.exists() {
        dotenvy::from_path(&env_file)?;
    }
    for key in [
        "RELAY_WIFI_SSID",
        "RELAY_WIFI_PASSWORD",
        "RELAY_ENDPOINT_URL",
        "RELAY_CA_PEM",
        "RELAY_SKIP_HOSTNAME_CHECK",
        "RELAY_CONNECT_WAIT_MS",
        "RELAY_REQUEST_TIMEOUT_MS",
        "RELAY_INDICATOR_PULSE_MS",
    ] {
        println!("cargo:rerun-if-env-changed={key}");
    }

    let ssid = required("RELAY_WIFI_SSID")?;
    let password = env::var("RELAY_WIFI_PASSWORD").unwrap_or_default();
    let url = required("RELAY_ENDPOINT_URL")?;
    let skip_hostname_check = optional_bool("RELAY_SKIP_HOSTNAME_CHECK")?;
    let connect_wait_ms = optional_u64("RELAY_CONNECT_WAIT_MS", 15_000)?;
    let request_timeout_ms = optional_u64("RELAY_REQUEST_TIMEOUT_MS", 8_000)?;
    let indicator_pulse_ms = optional_u64("RELAY_INDICATOR_PULSE_MS", 500)?;

    let generated = format!(
        "pub const RELAY_CONFIG: RelayConfig<'static> = RelayConfig {{
    wifi: WifiConfig {{ ssid: {ssid:?}, password: {password:?} }},
    endpoint: EndpointSettings {{ url: {url:?}, skip_hostname_check: {skip_hostname_check} }},
    timing: TimingConfig {{
        connect_wait_ms: {connect_wait_ms},
        request_timeout_ms: {request_timeout_ms},
        indicator_pulse_ms: {indicator_pulse_ms},
    }},
}};
"
    );
    fs::write(out_dir.join("relay_config.rs"), generated)?;

    let pem_path = resolve(&manifest_dir, &required("RELAY_CA_PEM")?);
    println!("cargo:rerun-if-changed={}", pem_path.display());
    let pem = fs::read_to_string(&pem_path).map_err(|e| format!("reading {}: {e}", pem_path.display()))?;
    fs::write(out_dir.join("trust_anchor.der"), pem_to_der(&pem)?)?;

    Ok(())
}

fn required(key: &str) -> Result<String, Box<dyn Error>> {
    match env::var(key) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(format!("{key} is not set; copy .env.example to .env and fill it in").into()),
    }
}

fn optional_u64(key: &str, default: u64) -> Result<u64, Box<dyn Error>> {
    match env::var(key) {
        Ok(value) => value.trim().parse::<u64>().map_err(|e| format!("{key}: {e}").into()),
        Err(_) => Ok(default),
    }
}

fn optional_bool(key: &str) -> Result<bool, Box<dyn Error>> {
    match env::var(key).as_deref().map(str::trim) {
        Err(_) | Ok("") | Ok("0") | Ok("false") => Ok(false),
        Ok("1") | Ok("true") => Ok(true),
        Ok(other) => Err(format!("{key}: expected true or false, got {other:?}").into()),
    }
}

fn resolve(base: &Path, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Decode the first certificate in a PEM file.
fn pem_to_der(pem: &str) -> Result<Vec<u8>, Box<dyn Error>> {
    let start = pem.find(PEM_BEGIN).ok_or("no BEGIN CERTIFICATE marker in RELAY_CA_PEM")? + PEM_BEGIN.len();
    let end = pem[start..]
        .find(PEM_END)
        .ok_or("no END CERTIFICATE marker in RELAY_CA_PEM")?
        + start;

    let body: String = pem[start..end].chars().filter(|c| !c.is_ascii_whitespace()).collect();
    Ok(STANDARD.decode(body)?)
}
