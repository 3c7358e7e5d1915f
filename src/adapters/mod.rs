//! Adapters — concrete implementations of the hexagonal port traits.
//!
//! | Adapter     | Implements         | Connects to              |
//! |-------------|--------------------|--------------------------|
//! | `uart`      | ByteSource         | Optical head on UART1    |
//! | `mqtt`      | PublishPort        | ESP-IDF MQTT client      |
//! | `log_sink`  | EventSink          | Serial log output        |
//! | `nvs`       | ConfigPort         | NVS / in-memory store    |
//! | `wifi`      | ConnectivityPort   | ESP-IDF WiFi STA         |
//! | `time`      | (clock, DelayNs)   | ESP32 system timer       |
//! | `device_id` | —                  | eFuse MAC                |
//! | `ota_server`| UpdatePort         | TCP sender → OTA slot    |

pub mod device_id;
pub mod log_sink;
pub mod mqtt;
pub mod nvs;
pub mod ota_server;
pub mod time;
pub mod uart;
pub(super) mod utils;
pub mod wifi;
