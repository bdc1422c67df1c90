//! Transport layer abstraction for the ROM loader
//!
//! This module provides a unified interface for serial and TCP transports.
//! Only the serial transport can drive the reset lines; bridges reached
//! over TCP are expected to handle reset on their side.

use std::time::Duration;

use crate::error::Result;

/// Byte link to the target
pub trait Transport {
    /// Write all bytes
    fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Read up to `buf.len()` bytes, waiting at most `timeout`
    ///
    /// Returns 0 on timeout.
    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Switch the link rate
    fn set_baud(&mut self, baud: u32) -> Result<()>;

    /// Drive DTR (wired to the target's boot strap)
    fn set_dtr(&mut self, level: bool) -> Result<()>;

    /// Drive RTS (wired to the target's reset)
    fn set_rts(&mut self, level: bool) -> Result<()>;

    /// Discard unread input
    fn clear_input(&mut self) -> Result<()>;

    /// Wait `ms` milliseconds
    fn delay(&mut self, ms: u64) {
        std::thread::sleep(Duration::from_millis(ms));
    }
}

pub mod serial {
    //! Serial port transport implementation

    use super::*;
    use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
    use std::io::{Read, Write};

    use crate::error::RomError;

    /// Serial port transport
    pub struct SerialTransport {
        port: Box<dyn SerialPort>,
    }

    impl SerialTransport {
        /// Open a serial port at `baud`
        pub fn open(device: &str, baud: u32) -> Result<Self> {
            let port = serialport::new(device, baud)
                .data_bits(DataBits::Eight)
                .parity(Parity::None)
                .stop_bits(StopBits::One)
                .flow_control(FlowControl::None)
                .timeout(Duration::from_secs(1))
                .open()?;

            log::info!("rom: opened serial port {} at {} baud", device, baud);

            Ok(Self { port })
        }
    }

    impl Transport for SerialTransport {
        fn write(&mut self, data: &[u8]) -> Result<()> {
            self.port.write_all(data)?;
            self.port.flush()?;
            Ok(())
        }

        fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
            self.port.set_timeout(timeout)?;
            match self.port.read(buf) {
                Ok(n) => Ok(n),
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
                Err(e) => Err(RomError::from(e)),
            }
        }

        fn set_baud(&mut self, baud: u32) -> Result<()> {
            self.port.set_baud_rate(baud)?;
            log::debug!("rom: host port switched to {} baud", baud);
            Ok(())
        }

        fn set_dtr(&mut self, level: bool) -> Result<()> {
            self.port.write_data_terminal_ready(level)?;
            Ok(())
        }

        fn set_rts(&mut self, level: bool) -> Result<()> {
            self.port.write_request_to_send(level)?;
            Ok(())
        }

        fn clear_input(&mut self) -> Result<()> {
            self.port.clear(ClearBuffer::Input)?;
            Ok(())
        }
    }
}

pub mod tcp {
    //! TCP socket transport implementation

    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpStream;

    use crate::error::RomError;

    /// TCP socket transport, for serial-over-TCP bridges
    pub struct TcpTransport {
        stream: TcpStream,
    }

    impl TcpTransport {
        /// Connect to a bridge at the specified host and port
        pub fn connect(host: &str, port: u16) -> Result<Self> {
            let addr = format!("{}:{}", host, port);
            log::info!("rom: connecting to {}", addr);

            let stream = TcpStream::connect(&addr)
                .map_err(|e| RomError::ConnectionFailed(format!("{}: {}", addr, e)))?;

            // Set TCP_NODELAY to reduce latency
            stream.set_nodelay(true).map_err(|e| {
                RomError::ConnectionFailed(format!("Failed to set TCP_NODELAY: {}", e))
            })?;
            stream
                .set_write_timeout(Some(Duration::from_secs(5)))
                .map_err(|e| {
                    RomError::ConnectionFailed(format!("Failed to set write timeout: {}", e))
                })?;

            Ok(Self { stream })
        }
    }

    impl Transport for TcpTransport {
        fn write(&mut self, data: &[u8]) -> Result<()> {
            self.stream.write_all(data)?;
            Ok(())
        }

        fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
            self.stream.set_read_timeout(Some(timeout))?;
            match self.stream.read(buf) {
                Ok(0) => Err(RomError::ConnectionFailed("connection closed".into())),
                Ok(n) => Ok(n),
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(0),
                Err(e) => Err(RomError::from(e)),
            }
        }

        fn set_baud(&mut self, baud: u32) -> Result<()> {
            log::debug!("rom: ignoring rate change to {} on TCP link", baud);
            Ok(())
        }

        fn set_dtr(&mut self, _level: bool) -> Result<()> {
            Ok(())
        }

        fn set_rts(&mut self, _level: bool) -> Result<()> {
            Ok(())
        }

        fn clear_input(&mut self) -> Result<()> {
            let mut buf = [0u8; 256];
            while self.read_timeout(&mut buf, Duration::from_millis(1))? > 0 {}
            Ok(())
        }
    }
}
