//! Camera connection check over the HTTP management API.
//!
//! One digest-authenticated GET to the device-info endpoint decides
//! whether the camera counts as connected.  The result is fixed for the
//! lifetime of the [`ConnectionManager`]; reconnecting means building a
//! new one.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use reqwest::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use reqwest::StatusCode;
use tracing::{debug, error, info};

use scanshot_common::config::Config;

/// Device-info path probed by the connection check.
pub const DEVICE_INFO_PATH: &str = "/ISAPI/System/deviceInfo";

/// Address and credentials of a camera.
#[derive(Clone)]
pub struct CameraTarget {
    pub ip: String,
    /// HTTP management port.
    pub port: u16,
    pub rtsp_port: u16,
    pub username: String,
    pub password: String,
}

impl CameraTarget {
    pub fn from_config(config: &Config) -> Self {
        CameraTarget {
            ip: config.camera_ip.clone(),
            port: config.camera_port,
            rtsp_port: config.rtsp_port,
            username: config.camera_user.clone(),
            password: config.camera_password.clone(),
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.ip, self.port)
    }
}

impl std::fmt::Debug for CameraTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraTarget")
            .field("ip", &self.ip)
            .field("port", &self.port)
            .field("rtsp_port", &self.rtsp_port)
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Connectivity as seen by the capture engine.
pub trait Connection: Send + Sync {
    fn is_connected(&self) -> bool;
    fn target(&self) -> &CameraTarget;
}

/// One camera plus the outcome of its reachability check.
#[derive(Debug)]
pub struct ConnectionManager {
    target: CameraTarget,
    connected: bool,
}

impl ConnectionManager {
    /// Build a session and probe the device-info endpoint once.
    ///
    /// Never fails: any error leaves the manager not connected.
    pub fn connect(target: CameraTarget, timeout: Duration) -> Self {
        info!("Connecting to camera {}", target.base_url());

        // Cameras sit on the local network; never route them through a proxy.
        let client = match Client::builder().timeout(timeout).no_proxy().build() {
            Ok(c) => c,
            Err(e) => {
                error!("Cannot create HTTP client: {e}");
                return ConnectionManager {
                    target,
                    connected: false,
                };
            }
        };

        let connected = match probe(&client, &target) {
            Ok(status) if status == StatusCode::OK => {
                info!("Camera {} connected", target.ip);
                true
            }
            Ok(status) => {
                error!("Camera {} connection failed: HTTP {status}", target.ip);
                false
            }
            Err(e) => {
                error!("Camera {} connection error: {e:#}", target.ip);
                false
            }
        };

        ConnectionManager { target, connected }
    }
}

impl Connection for ConnectionManager {
    fn is_connected(&self) -> bool {
        self.connected
    }

    fn target(&self) -> &CameraTarget {
        &self.target
    }
}

/// GET the device-info endpoint, answering one digest challenge if the
/// camera sends one.  Returns the final status.
fn probe(client: &Client, target: &CameraTarget) -> Result<StatusCode> {
    let url = format!("{}{DEVICE_INFO_PATH}", target.base_url());
    let resp = client.get(&url).send().context("GET deviceInfo")?;

    if resp.status() != StatusCode::UNAUTHORIZED {
        return Ok(resp.status());
    }

    let challenge = resp
        .headers()
        .get(WWW_AUTHENTICATE)
        .context("401 without WWW-Authenticate")?
        .to_str()
        .context("Non-ASCII WWW-Authenticate")?
        .to_string();
    debug!("Answering auth challenge: {challenge}");

    let mut prompt = digest_auth::parse(&challenge)
        .map_err(|e| anyhow::anyhow!("Unsupported auth challenge: {e}"))?;
    let context = digest_auth::AuthContext::new(
        target.username.as_str(),
        target.password.as_str(),
        DEVICE_INFO_PATH,
    );
    let answer = prompt
        .respond(&context)
        .map_err(|e| anyhow::anyhow!("Cannot answer digest challenge: {e}"))?;

    let resp = client
        .get(&url)
        .header(AUTHORIZATION, answer.to_header_string())
        .send()
        .context("GET deviceInfo (authenticated)")?;
    Ok(resp.status())
}
