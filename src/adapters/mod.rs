//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter       | Implements              | Connects to                   |
//! |---------------|-------------------------|-------------------------------|
//! | `wifi`        | NetworkPort             | ESP-IDF WiFi STA              |
//! | `mqtt`        | BrokerPort, InboundPort | ESP-IDF MQTT client           |
//! | `http`        | EventSink (mirror)      | ESP-IDF httpd (form, OTA)     |
//! | `ota`         | UpdatePort              | esp-ota partition writer      |
//! | `nvs`         | StoragePort             | NVS / in-memory store         |
//! | `system`      | SystemPort              | restart, heap, SNTP, eFuse MAC|
//! | `hardware`    | SensorPort              | battery ADC, reset button     |
//! |               | IndicatorPort           | status LED, buzzer GPIO       |
//! | `peripherals` | PeripheralPort          | feeder / door mechanisms      |
//! | `log_sink`    | EventSink               | Serial log output             |

pub mod hardware;
pub mod http;
pub mod log_sink;
pub mod mqtt;
pub mod nvs;
pub mod ota;
pub mod peripherals;
pub mod system;
pub mod wifi;
