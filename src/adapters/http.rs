//! Local HTTP surface.
//!
//! | Route              | Method | Behaviour                                   |
//! |--------------------|--------|---------------------------------------------|
//! | `/`                | GET    | configuration form                          |
//! | `/api/status`      | GET    | last status document the controller built   |
//! | `/api/config`      | POST   | form fields → inbound queue → config path   |
//! | `/update`          | POST   | raw firmware image → [`OtaManager`]         |
//!
//! Handlers run on the httpd task, so they never touch controller state:
//! config posts are forwarded as [`InboundEvent::ConfigForm`] and status
//! reads go through the shared [`StatusMirror`].  The request handling
//! helpers below are target-independent and host-tested; only the server
//! wiring is ESP-IDF specific.

use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};

use log::{info, warn};

use crate::app::events::{AppEvent, InboundEvent, UpdateEvent};
use crate::app::ports::EventSink;
use crate::error::{ProtocolError, UpdateError};

use super::ota::OtaManager;

/// Largest accepted config form body.
pub const MAX_FORM_BODY: usize = 1024;

/// Read size for firmware uploads.
pub const UPLOAD_CHUNK: usize = 4096;

/// Minimal configuration form.  Field names are the `DeviceConfig` names.
pub const CONFIG_PAGE: &str = r#"<!DOCTYPE html>
<html><head><meta name="viewport" content="width=device-width,initial-scale=1">
<title>Pet Smart Home</title></head>
<body><h1>Pet Smart Home</h1>
<form method="post" action="/api/config">
<label>WiFi SSID <input name="wifiSSID"></label><br>
<label>WiFi password <input name="wifiPassword" type="password"></label><br>
<label>MQTT server <input name="mqttServer"></label><br>
<label>MQTT port <input name="mqttPort" type="number"></label><br>
<label>MQTT username <input name="mqttUsername"></label><br>
<label>MQTT password <input name="mqttPassword" type="password"></label><br>
<label>Device type <select name="deviceType">
<option>FEEDER</option><option>DOOR</option><option selected>COMBO</option>
</select></label><br>
<label><input type="checkbox" name="feederEnabled"> Feeder</label><br>
<label><input type="checkbox" name="doorEnabled"> Door</label><br>
<label>Default portion (g) <input name="defaultFeedingAmount" type="number"></label><br>
<label>Door open (ms) <input name="doorOpenDurationMs" type="number"></label><br>
<label><input type="checkbox" name="notificationsEnabled"> Notifications</label><br>
<label><input type="checkbox" name="debugEnabled"> Debug</label><br>
<button type="submit">Save and restart</button>
</form></body></html>
"#;

// ───────────────────────────────────────────────────────────────
// Status mirror
// ───────────────────────────────────────────────────────────────

/// Last status document, serialised, shared between the tick thread
/// (writer, as an [`EventSink`]) and the httpd task (reader).
#[derive(Clone, Default)]
pub struct StatusMirror {
    last: Arc<Mutex<Option<Vec<u8>>>>,
}

impl StatusMirror {
    pub fn new() -> Self {
        Self::default()
    }

    /// JSON body for `GET /api/status`, `None` before the first status.
    pub fn body(&self) -> Option<Vec<u8>> {
        match self.last.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl EventSink for StatusMirror {
    fn emit(&mut self, event: &AppEvent) {
        let AppEvent::Status(status) = event else {
            return;
        };
        match serde_json::to_vec(status) {
            Ok(bytes) => match self.last.lock() {
                Ok(mut guard) => *guard = Some(bytes),
                Err(poisoned) => *poisoned.into_inner() = Some(bytes),
            },
            Err(e) => warn!("HTTP: status encode failed: {}", e),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Request handling
// ───────────────────────────────────────────────────────────────

/// Validate a `POST /api/config` body and queue it for the tick thread.
///
/// Only transport-level checks happen here; field decoding and
/// validation run in the core so both config paths behave the same.
pub fn accept_config_form(body: &[u8], inbound: &Sender<InboundEvent>) -> Result<(), ProtocolError> {
    if body.len() > MAX_FORM_BODY {
        return Err(ProtocolError::BadForm);
    }
    let text = core::str::from_utf8(body).map_err(|_| ProtocolError::BadForm)?;
    inbound
        .send(InboundEvent::ConfigForm(text.into()))
        .map_err(|_| ProtocolError::BadForm)?;
    info!("HTTP: config form queued ({} bytes)", body.len());
    Ok(())
}

/// Stream a firmware image from `read` into a fresh [`OtaManager`].
///
/// `read` fills the buffer and returns the byte count, 0 at end of body.
pub fn receive_firmware<E: core::fmt::Debug>(
    total: u32,
    events: Sender<UpdateEvent>,
    mut read: impl FnMut(&mut [u8]) -> Result<usize, E>,
) -> Result<u32, UpdateError> {
    let mut ota = OtaManager::new(events);
    ota.begin(total)?;

    let mut buf = [0u8; UPLOAD_CHUNK];
    let mut written = 0;
    loop {
        let n = match read(&mut buf) {
            Ok(n) => n,
            Err(e) => {
                warn!("HTTP: upload read failed: {:?}", e);
                ota.abort();
                return Err(UpdateError::IncompleteTransfer);
            }
        };
        if n == 0 {
            break;
        }
        written = ota.write_chunk(&buf[..n])?;
    }
    ota.finalize()?;
    Ok(written)
}

// ───────────────────────────────────────────────────────────────
// ESP-IDF server
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
pub use esp::start_server;

#[cfg(target_os = "espidf")]
mod esp {
    use super::*;
    use embedded_svc::http::{Headers, Method};
    use embedded_svc::io::{Read, Write};
    use esp_idf_svc::http::server::{Configuration, EspHttpServer};

    pub fn start_server(
        inbound: Sender<InboundEvent>,
        updates: Sender<UpdateEvent>,
        mirror: StatusMirror,
    ) -> anyhow::Result<EspHttpServer<'static>> {
        let conf = Configuration {
            stack_size: 10 * 1024,
            ..Default::default()
        };
        let mut server = EspHttpServer::new(&conf)?;

        server.fn_handler::<anyhow::Error, _>("/", Method::Get, |req| {
            req.into_response(200, None, &[("Content-Type", "text/html; charset=utf-8")])?
                .write_all(CONFIG_PAGE.as_bytes())?;
            Ok(())
        })?;

        server.fn_handler::<anyhow::Error, _>("/api/status", Method::Get, move |req| {
            match mirror.body() {
                Some(body) => {
                    req.into_response(200, None, &[("Content-Type", "application/json")])?
                        .write_all(&body)?;
                }
                None => {
                    req.into_status_response(503)?
                        .write_all(b"{\"error\":\"no status yet\"}")?;
                }
            }
            Ok(())
        })?;

        server.fn_handler::<anyhow::Error, _>("/api/config", Method::Post, move |mut req| {
            let len = req.content_len().unwrap_or(0) as usize;
            if len > MAX_FORM_BODY {
                req.into_status_response(413)?.write_all(b"form too large")?;
                return Ok(());
            }
            let mut body = vec![0u8; len];
            req.read_exact(&mut body)?;
            match accept_config_form(&body, &inbound) {
                Ok(()) => {
                    req.into_ok_response()?
                        .write_all(b"Configuration received. The device restarts if it is valid.")?;
                }
                Err(e) => {
                    req.into_status_response(400)?.write_all(e.to_string().as_bytes())?;
                }
            }
            Ok(())
        })?;

        server.fn_handler::<anyhow::Error, _>("/update", Method::Post, move |mut req| {
            let total = req.content_len().unwrap_or(0) as u32;
            let result = receive_firmware(total, updates.clone(), |buf| req.read(buf));
            match result {
                Ok(written) => {
                    req.into_ok_response()?
                        .write_all(format!("Update staged ({written} bytes)").as_bytes())?;
                }
                Err(e) => {
                    req.into_status_response(500)?.write_all(e.to_string().as_bytes())?;
                }
            }
            Ok(())
        })?;

        info!("HTTP: server listening");
        Ok(server)
    }
}
