//! UART link
//!
//! [`Link`] implementation over a serial port. The sensor talks 8N1 at
//! 19200 baud; each byte takes roughly 500us on the wire, so reads poll with
//! a short per-byte timeout and give up after a bounded number of misses.

use serde::{Deserialize, Serialize};
use serialport::{SerialPort, SerialPortInfo, SerialPortType};
use std::collections::HashMap;
#[cfg(target_os = "linux")]
use std::fs;
use std::io::{self, Read, Write};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{Checksum, Link, ProtocolError, DEFAULT_LINK_ARGUMENT};

/// Baud rate the sensor's UART interface runs at
pub const DEFAULT_BAUD_RATE: u32 = 19200;

/// Information about an available serial port
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortInfo {
    /// Port name (e.g., "/dev/ttyUSB0" or "COM3")
    pub name: String,

    /// USB vendor ID (if USB device)
    pub vid: Option<u16>,

    /// USB product ID (if USB device)
    pub pid: Option<u16>,

    /// Product name (if available)
    pub product: Option<String>,
}

impl From<SerialPortInfo> for PortInfo {
    fn from(info: SerialPortInfo) -> Self {
        let (vid, pid, product) = match info.port_type {
            SerialPortType::UsbPort(usb_info) => {
                (Some(usb_info.vid), Some(usb_info.pid), usb_info.product)
            }
            _ => (None, None, None),
        };

        Self {
            name: info.port_name,
            vid,
            pid,
            product,
        }
    }
}

/// Sort key: ttyACM* first, then ttyUSB* (both numerically), then the rest by name
fn port_sort_key(name: &str) -> (u8, usize, String) {
    let basename = name.rsplit('/').next().unwrap_or(name);
    if let Some(rest) = basename.strip_prefix("ttyACM") {
        let num = rest.parse::<usize>().unwrap_or(usize::MAX);
        return (0, num, basename.to_string());
    }
    if let Some(rest) = basename.strip_prefix("ttyUSB") {
        let num = rest.parse::<usize>().unwrap_or(usize::MAX);
        return (1, num, basename.to_string());
    }
    (2, 0, basename.to_string())
}

/// List available serial ports in a deterministic order
pub fn list_ports() -> Vec<PortInfo> {
    let mut map: HashMap<String, PortInfo> = HashMap::new();
    for info in serialport::available_ports().unwrap_or_default() {
        let p = PortInfo::from(info);
        map.entry(p.name.clone()).or_insert(p);
    }

    // udev does not always report USB CDC devices
    #[cfg(target_os = "linux")]
    if let Ok(entries) = fs::read_dir("/dev") {
        for entry in entries.flatten() {
            if let Some(fname) = entry.file_name().to_str() {
                if fname.starts_with("ttyACM") || fname.starts_with("ttyUSB") {
                    let full = format!("/dev/{}", fname);
                    map.entry(full.clone()).or_insert_with(|| PortInfo {
                        name: full,
                        vid: None,
                        pid: None,
                        product: None,
                    });
                }
            }
        }
    }

    let mut v: Vec<PortInfo> = map.into_values().collect();
    v.sort_by_key(|p| port_sort_key(&p.name));
    v
}

/// UART link settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Port used for the default link argument; `None` picks the first listed port
    pub port_name: Option<String>,
    pub baud_rate: u32,
    /// Wait for a single byte before counting a miss
    pub byte_timeout_us: u64,
    /// Misses tolerated per byte before the read fails; the product with
    /// `byte_timeout_us` bounds how long a silent sensor stalls one byte
    pub byte_retries: u32,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port_name: None,
            baud_rate: DEFAULT_BAUD_RATE,
            byte_timeout_us: 10,
            byte_retries: 200,
        }
    }
}

impl SerialConfig {
    pub fn with_port(port_name: impl Into<String>) -> Self {
        Self {
            port_name: Some(port_name.into()),
            ..Self::default()
        }
    }

    pub fn byte_timeout(&self) -> Duration {
        Duration::from_micros(self.byte_timeout_us)
    }

    /// Longest a single byte read can block before failing
    pub fn byte_budget(&self) -> Duration {
        self.byte_timeout() * self.byte_retries
    }

    /// Resolve a link argument to a port name.
    ///
    /// The default argument uses `port_name` (or the first listed port);
    /// any other value indexes into `ports`.
    fn resolve_port(&self, argument: u32, ports: &[PortInfo]) -> Result<String, ProtocolError> {
        if argument == DEFAULT_LINK_ARGUMENT {
            if let Some(name) = &self.port_name {
                return Ok(name.clone());
            }
            return ports
                .first()
                .map(|p| p.name.clone())
                .ok_or_else(|| ProtocolError::Serial("no serial ports found".to_string()));
        }

        ports
            .get(argument as usize)
            .map(|p| p.name.clone())
            .ok_or_else(|| {
                ProtocolError::Serial(format!(
                    "port index {} out of range ({} ports)",
                    argument,
                    ports.len()
                ))
            })
    }
}

fn serial_err(e: serialport::Error) -> ProtocolError {
    ProtocolError::Serial(e.to_string())
}

/// Serial port [`Link`]
pub struct UartLink {
    config: SerialConfig,
    port: Option<Box<dyn SerialPort>>,
}

impl UartLink {
    pub fn new(config: SerialConfig) -> Self {
        Self { config, port: None }
    }

    pub fn config(&self) -> &SerialConfig {
        &self.config
    }

    pub fn is_open(&self) -> bool {
        self.port.is_some()
    }

    /// Name of the open port, if any
    pub fn port_name(&self) -> Option<String> {
        self.port.as_ref().and_then(|p| p.name())
    }

    fn configure(port: &mut dyn SerialPort) -> Result<(), ProtocolError> {
        port.set_data_bits(serialport::DataBits::Eight)
            .map_err(serial_err)?;
        port.set_parity(serialport::Parity::None).map_err(serial_err)?;
        port.set_stop_bits(serialport::StopBits::One)
            .map_err(serial_err)?;
        port.set_flow_control(serialport::FlowControl::None)
            .map_err(serial_err)?;
        port.clear(serialport::ClearBuffer::All).map_err(serial_err)
    }

    /// Read one byte, tolerating up to `byte_retries` timeouts
    fn read_byte(&mut self) -> Result<u8, ProtocolError> {
        let retries = self.config.byte_retries;
        let port = self.port.as_mut().ok_or(ProtocolError::NotConnected)?;
        let mut byte = [0u8; 1];

        for _ in 0..retries {
            match port.read(&mut byte) {
                Ok(1) => return Ok(byte[0]),
                Ok(_) => continue,
                Err(e) if e.kind() == io::ErrorKind::TimedOut => continue,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(ProtocolError::Io(e)),
            }
        }
        Err(ProtocolError::Transport(-1))
    }
}

impl Link for UartLink {
    fn open(&mut self, argument: u32) -> Result<(), ProtocolError> {
        let name = self.config.resolve_port(argument, &list_ports())?;
        debug!(
            "uart: opening {} at {} baud, {}us per byte",
            name,
            self.config.baud_rate,
            self.config.byte_budget().as_micros()
        );

        let mut port = serialport::new(&name, self.config.baud_rate)
            .timeout(self.config.byte_timeout())
            .open()
            .map_err(serial_err)?;
        Self::configure(port.as_mut())?;

        info!("uart: {} open", name);
        self.port = Some(port);
        Ok(())
    }

    fn close(&mut self) {
        if let Some(port) = self.port.take() {
            debug!("uart: closing {}", port.name().unwrap_or_default());
        }
    }

    fn send(&mut self, data: &[u8]) -> Result<usize, ProtocolError> {
        let port = self.port.as_mut().ok_or(ProtocolError::NotConnected)?;
        port.write_all(data)?;
        port.flush()?;
        Ok(data.len())
    }

    fn receive(
        &mut self,
        buf: &mut [u8],
        mut checksum: Option<&mut Checksum>,
    ) -> Result<usize, ProtocolError> {
        if let Some(cs) = checksum.as_deref_mut() {
            cs.reset();
        }

        for (i, slot) in buf.iter_mut().enumerate() {
            *slot = match self.read_byte() {
                Ok(b) => b,
                Err(e) => {
                    warn!("uart: read stalled after {} of {} bytes", i, buf.len());
                    return Err(e);
                }
            };
            if let Some(cs) = checksum.as_deref_mut() {
                cs.update(*slot);
            }
        }
        Ok(buf.len())
    }
}

impl Drop for UartLink {
    fn drop(&mut self) {
        self.close();
    }
}
