//! ROM loader session
//!
//! This module provides the `RomLoader` struct that speaks the ROM
//! bootloader protocol over a [`Transport`] and implements the `Loader`
//! trait.

use std::collections::VecDeque;
use std::io::{self, Read};
use std::time::{Duration, Instant};

use flashdock_core::chip::{TargetChip, TargetIdentity};
use flashdock_core::flash::FlashProgress;
use flashdock_core::loader::{self, Loader, FLASH_BLOCK_SIZE};
use flashdock_core::ProtocolError;

use crate::error::{Result, RomError};
use crate::protocol::*;
use crate::slip::{self, SlipDecoder};
use crate::transport::Transport;

/// Maximum reset-and-sync rounds
pub const MAX_CONNECT_ATTEMPTS: usize = 7;
/// SYNC commands sent per round
pub const MAX_SYNC_ATTEMPTS: usize = 5;

/// Frames skipped while waiting for the response to a command
const MAX_STRAY_FRAMES: usize = 100;

/// Session parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RomOptions {
    /// Rate used for the handshake
    pub baud: u32,
    /// Default response timeout
    pub timeout: Duration,
    /// Reset-and-sync rounds
    pub connect_attempts: usize,
    /// SYNC commands per round
    pub sync_attempts: usize,
}

impl Default for RomOptions {
    fn default() -> Self {
        Self {
            baud: 115_200,
            timeout: DEFAULT_TIMEOUT,
            connect_attempts: MAX_CONNECT_ATTEMPTS,
            sync_attempts: MAX_SYNC_ATTEMPTS,
        }
    }
}

/// Region written by the last `program` call
#[derive(Clone)]
#[cfg_attr(not(feature = "verify"), allow(dead_code))]
struct Written {
    address: u32,
    length: u32,
    #[cfg(feature = "verify")]
    digest: md5::Md5,
}

/// Opens the link at the start of each session
pub type Opener<T> = Box<dyn FnMut() -> Result<T> + Send>;

/// ROM bootloader driver
///
/// The link is opened by `connect` and closed by `disconnect`, so a loader
/// can run any number of sessions.
pub struct RomLoader<T: Transport> {
    open: Opener<T>,
    transport: Option<T>,
    decoder: SlipDecoder,
    /// Bytes read past the end of the last frame
    rx: VecDeque<u8>,
    options: RomOptions,
    chip: Option<TargetChip>,
    written: Option<Written>,
}

impl<T: Transport> RomLoader<T> {
    /// Create a loader that opens its link with `open`
    pub fn new(options: RomOptions, open: impl FnMut() -> Result<T> + Send + 'static) -> Self {
        Self {
            open: Box::new(open),
            transport: None,
            decoder: SlipDecoder::new(),
            rx: VecDeque::new(),
            options,
            chip: None,
            written: None,
        }
    }

    /// Session parameters
    pub fn options(&self) -> &RomOptions {
        &self.options
    }

    /// Chip detected by the last handshake
    pub fn chip(&self) -> Option<TargetChip> {
        self.chip
    }

    fn transport(&mut self) -> Result<&mut T> {
        self.transport.as_mut().ok_or(RomError::NotConnected)
    }

    fn handshake(&mut self) -> Result<TargetIdentity> {
        let transport = (self.open)()?;
        self.transport = Some(transport);
        self.discard_buffered();

        self.synchronize()?;
        log::debug!("rom: synchronized");

        let magic = self.read_reg(CHIP_DETECT_MAGIC_REG_ADDR)?;
        let chip = chip_from_magic(magic);
        if chip == TargetChip::Unknown {
            log::warn!("rom: unrecognized chip magic 0x{:08X}", magic);
        }
        self.chip = Some(chip);

        if chip != TargetChip::Esp8266 {
            self.command(SPI_ATTACH, &words(&[0, 0]), 0, self.options.timeout)?;
            log::debug!("rom: SPI flash attached");
        }

        Ok(TargetIdentity { chip, magic })
    }

    /// Pulse the reset lines so the target boots into its ROM loader
    fn reset_to_bootloader(&mut self) -> Result<()> {
        let t = self.transport()?;
        t.set_dtr(false)?;
        t.set_rts(true)?;
        t.delay(100);
        t.set_dtr(true)?;
        t.set_rts(false)?;
        t.delay(50);
        t.set_dtr(false)?;
        Ok(())
    }

    fn synchronize(&mut self) -> Result<()> {
        for attempt in 0..self.options.connect_attempts {
            self.reset_to_bootloader()?;
            for _ in 0..self.options.sync_attempts {
                self.transport()?.clear_input()?;
                self.discard_buffered();
                match self.command(SYNC, &SYNC_PAYLOAD, 0, SYNC_TIMEOUT) {
                    Ok(_) => {
                        // The ROM answers one SYNC with several responses
                        let t = self.transport()?;
                        t.delay(10);
                        t.clear_input()?;
                        self.discard_buffered();
                        return Ok(());
                    }
                    Err(RomError::Timeout(_)) | Err(RomError::InvalidResponse(_)) => {}
                    Err(e) => return Err(e),
                }
            }
            log::debug!("rom: no SYNC response, attempt {}", attempt + 1);
        }
        Err(RomError::SyncFailed)
    }

    fn read_reg(&mut self, address: u32) -> Result<u32> {
        let resp = self.command(READ_REG, &words(&[address]), 0, self.options.timeout)?;
        Ok(resp.value)
    }

    /// Send a command and wait for its response
    fn command(&mut self, op: u8, data: &[u8], checksum: u32, timeout: Duration) -> Result<Response> {
        let frame = slip::encode(&encode_request(op, data, checksum));
        self.transport()?.write(&frame)?;

        for _ in 0..MAX_STRAY_FRAMES {
            let packet = self.read_frame(op, timeout)?;
            let resp = match Response::parse(&packet) {
                Ok(resp) => resp,
                Err(e) => {
                    log::trace!("rom: skipping frame: {}", e);
                    continue;
                }
            };
            if resp.op != op {
                log::trace!("rom: skipping response to {}", command_name(resp.op));
                continue;
            }
            if resp.status != 0 {
                return Err(RomError::Nak {
                    command: op,
                    status: resp.status,
                    code: resp.error,
                });
            }
            return Ok(resp);
        }
        Err(RomError::InvalidResponse(format!(
            "no response to {}",
            command_name(op)
        )))
    }

    fn discard_buffered(&mut self) {
        self.decoder.reset();
        self.rx.clear();
    }

    fn read_frame(&mut self, op: u8, timeout: Duration) -> Result<Vec<u8>> {
        while let Some(byte) = self.rx.pop_front() {
            if let Some(packet) = self.decoder.push(byte) {
                return Ok(packet);
            }
        }

        let deadline = Instant::now() + timeout;
        let mut buf = [0u8; 256];
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(RomError::Timeout(op));
            }
            let n = self.transport()?.read_timeout(&mut buf, remaining)?;
            if n == 0 {
                return Err(RomError::Timeout(op));
            }
            for (i, &byte) in buf[..n].iter().enumerate() {
                if let Some(packet) = self.decoder.push(byte) {
                    self.rx.extend(&buf[i + 1..n]);
                    return Ok(packet);
                }
            }
        }
    }

    fn change_rate(&mut self, rate: u32) -> Result<()> {
        // Second word is the current rate for the stub; the ROM wants 0
        self.command(CHANGE_BAUDRATE, &words(&[rate, 0]), 0, self.options.timeout)?;
        let t = self.transport()?;
        t.set_baud(rate)?;
        t.delay(50);
        t.clear_input()?;
        self.discard_buffered();
        log::info!("rom: link rate changed to {}", rate);
        Ok(())
    }

    fn write_image(
        &mut self,
        address: u32,
        length: u32,
        payload: &mut dyn Read,
        progress: &mut dyn FlashProgress,
    ) -> loader::Result<()> {
        let chip = self.chip.ok_or(RomError::NotConnected)?;
        let block_size = FLASH_BLOCK_SIZE as u32;
        let blocks = length.div_ceil(block_size);

        progress.erasing(address, length);
        let mut params = vec![length, blocks, block_size, address];
        if begin_has_encrypted_flag(chip) {
            params.push(0);
        }
        log::debug!(
            "rom: FLASH_BEGIN 0x{:08X}, {} bytes in {} blocks",
            address,
            length,
            blocks
        );
        self.command(FLASH_BEGIN, &words(&params), 0, erase_timeout(length))?;

        #[cfg_attr(not(feature = "verify"), allow(unused_mut))]
        let mut written = Written {
            address,
            length,
            #[cfg(feature = "verify")]
            digest: md5::Md5::default(),
        };
        let mut block = [0u8; FLASH_BLOCK_SIZE];
        let mut sent = 0u32;
        let mut seq = 0u32;
        while sent < length {
            let want = (length - sent).min(block_size) as usize;
            let got = read_full(payload, &mut block[..want])
                .map_err(|e| ProtocolError::TransportError(format!("payload read failed: {}", e)))?;
            if got < want {
                return Err(ProtocolError::TruncatedImage {
                    expected: length,
                    delivered: sent + got as u32,
                });
            }
            #[cfg(feature = "verify")]
            md5::Digest::update(&mut written.digest, &block[..want]);

            let padded = want.next_multiple_of(4);
            block[want..padded].fill(0xFF);
            let data = &block[..padded];

            let mut packet = words(&[padded as u32, seq, 0, 0]);
            packet.extend_from_slice(data);
            self.command(FLASH_DATA, &packet, checksum(data), self.options.timeout)?;

            sent += want as u32;
            seq += 1;
            progress.write_progress(sent, length);
        }

        self.written = Some(written);
        Ok(())
    }

    #[cfg(feature = "verify")]
    fn check_digest(&mut self) -> loader::Result<()> {
        use md5::Digest;

        let written = self.written.take().ok_or(RomError::NotConnected)?;
        let resp = self.command(
            SPI_FLASH_MD5,
            &words(&[written.address, written.length, 0, 0]),
            0,
            md5_timeout(written.length),
        )?;

        let expected: String = written
            .digest
            .finalize()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect();
        let actual = match resp.data.len() {
            // Raw digest from a flasher stub
            16 => resp.data.iter().map(|b| format!("{:02x}", b)).collect(),
            n if n >= 32 => String::from_utf8_lossy(&resp.data[..32]).to_lowercase(),
            n => {
                return Err(RomError::InvalidResponse(format!(
                    "SPI_FLASH_MD5 returned {} bytes",
                    n
                ))
                .into())
            }
        };

        if expected != actual {
            return Err(ProtocolError::ChecksumMismatch { expected, actual });
        }
        log::debug!("rom: 0x{:08X} digest {}", written.address, actual);
        Ok(())
    }

    #[cfg(not(feature = "verify"))]
    fn check_digest(&mut self) -> loader::Result<()> {
        Err(ProtocolError::UnsupportedFunction("flash digest"))
    }

    /// Pulse reset so the target runs the new firmware
    fn hard_reset(&mut self) -> Result<()> {
        let t = self.transport()?;
        t.set_dtr(false)?;
        t.set_rts(true)?;
        t.delay(100);
        t.set_rts(false)?;
        Ok(())
    }
}

/// Fill `buf` from `reader`, returning fewer bytes only at end of input
fn read_full(reader: &mut dyn Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

impl<T: Transport> Loader for RomLoader<T> {
    fn connect(&mut self) -> loader::Result<TargetIdentity> {
        self.transport = None;
        self.chip = None;
        self.written = None;
        let identity = self.handshake()?;
        log::info!("rom: detected {} (magic 0x{:08X})", identity.chip, identity.magic);
        Ok(identity)
    }

    fn negotiate_rate(&mut self, rate: u32) -> loader::Result<()> {
        let chip = self.chip.ok_or(RomError::NotConnected)?;
        if !chip.supports_rate_change() {
            log::info!("rom: {} cannot change rate, staying at {}", chip, self.options.baud);
            return Ok(());
        }
        self.change_rate(rate)?;
        Ok(())
    }

    fn program(
        &mut self,
        address: u32,
        length: u32,
        payload: &mut dyn Read,
        progress: &mut dyn FlashProgress,
    ) -> loader::Result<()> {
        self.written = None;
        self.write_image(address, length, payload, progress)
    }

    fn verify(&mut self) -> loader::Result<()> {
        let chip = self.chip.ok_or(RomError::NotConnected)?;
        if !chip.supports_flash_digest() {
            return Err(ProtocolError::UnsupportedFunction("flash digest"));
        }
        self.check_digest()
    }

    fn disconnect(&mut self) {
        if self.transport.is_none() {
            return;
        }
        if let Err(e) = self.hard_reset() {
            log::warn!("rom: reset after session failed: {}", e);
        }
        self.transport = None;
        self.chip = None;
        self.written = None;
        log::debug!("rom: link closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flashdock_core::flash::NoProgress;
    use flashdock_core::manifest::FlashEntry;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    const ESP32_MAGIC: u32 = 0x00F0_1D83;
    const ESP32C3_MAGIC: u32 = 0x1B31_506F;
    const ESP8266_MAGIC: u32 = 0xFFF0_C101;

    /// Scripted ROM loader on the far end of the link
    #[derive(Default)]
    struct Rom {
        magic: u32,
        decoder: SlipDecoder,
        pending: VecDeque<u8>,
        /// Requests received, as (opcode, data)
        requests: Vec<(u8, Vec<u8>)>,
        ignore_syncs: usize,
        reject: Vec<(u8, u8)>,
        fail_data_at: Option<usize>,
        flash: Vec<u8>,
        corrupt_digest: bool,
        /// Answer SPI_FLASH_MD5 with 16 raw bytes, as a flasher stub does
        raw_digest: bool,
        lines: Vec<(&'static str, bool)>,
        baud: u32,
        opens: usize,
    }

    impl Rom {
        fn status_len(&self) -> usize {
            if self.magic == ESP8266_MAGIC {
                2
            } else {
                4
            }
        }

        fn respond(&mut self, op: u8, value: u32, data: Vec<u8>, status: u8, error: u8) {
            let status_len = self.status_len();
            self.respond_with(status_len, op, value, data, status, error);
        }

        fn respond_with(
            &mut self,
            status_len: usize,
            op: u8,
            value: u32,
            data: Vec<u8>,
            status: u8,
            error: u8,
        ) {
            let resp = Response {
                op,
                value,
                data,
                status,
                error,
            };
            let frame = slip::encode(&resp.encode(status_len));
            self.pending.extend(frame);
        }

        fn handle(&mut self, packet: Vec<u8>) -> io::Result<()> {
            let op = packet[1];
            let len = u16::from_le_bytes([packet[2], packet[3]]) as usize;
            let sum = u32::from_le_bytes([packet[4], packet[5], packet[6], packet[7]]);
            let data = packet[8..8 + len].to_vec();
            self.requests.push((op, data.clone()));

            if let Some(&(_, code)) = self.reject.iter().find(|(o, _)| *o == op) {
                self.respond(op, 0, vec![], 1, code);
                return Ok(());
            }

            match op {
                SYNC => {
                    if self.ignore_syncs > 0 {
                        self.ignore_syncs -= 1;
                    } else {
                        for _ in 0..8 {
                            self.respond(SYNC, 0, vec![], 0, 0);
                        }
                    }
                }
                READ_REG => self.respond(READ_REG, self.magic, vec![], 0, 0),
                FLASH_BEGIN => {
                    self.flash.clear();
                    self.respond(op, 0, vec![], 0, 0);
                }
                FLASH_DATA => {
                    let blocks = self.requests.iter().filter(|(o, _)| *o == FLASH_DATA).count();
                    if self.fail_data_at == Some(blocks - 1) {
                        return Err(io::Error::new(io::ErrorKind::BrokenPipe, "cable pulled"));
                    }
                    let size = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
                    let block = &data[16..16 + size];
                    if checksum(block) != sum {
                        self.respond(op, 0, vec![], 1, 0x07);
                    } else {
                        self.flash.extend_from_slice(block);
                        self.respond(op, 0, vec![], 0, 0);
                    }
                }
                #[cfg(feature = "verify")]
                SPI_FLASH_MD5 => {
                    use md5::Digest;
                    let length = u32::from_le_bytes([data[4], data[5], data[6], data[7]]) as usize;
                    if self.raw_digest {
                        let raw = md5::Md5::digest(&self.flash[..length]).to_vec();
                        self.respond_with(2, op, 0, raw, 0, 0);
                        return Ok(());
                    }
                    let mut digest: String = md5::Md5::digest(&self.flash[..length])
                        .iter()
                        .map(|b| format!("{:02x}", b))
                        .collect();
                    if self.corrupt_digest {
                        digest.replace_range(0..2, "zz");
                    }
                    self.respond(op, 0, digest.into_bytes(), 0, 0);
                }
                SPI_ATTACH | CHANGE_BAUDRATE => self.respond(op, 0, vec![], 0, 0),
                _ => self.respond(op, 0, vec![], 1, ROM_INVALID_MESSAGE),
            }
            Ok(())
        }

        fn count(&self, op: u8) -> usize {
            self.requests.iter().filter(|(o, _)| *o == op).count()
        }
    }

    #[derive(Clone)]
    struct MockTransport(Arc<Mutex<Rom>>);

    impl Transport for MockTransport {
        fn write(&mut self, data: &[u8]) -> Result<()> {
            let mut rom = self.0.lock().unwrap();
            for &byte in data {
                if let Some(packet) = rom.decoder.push(byte) {
                    rom.handle(packet)?;
                }
            }
            Ok(())
        }

        fn read_timeout(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<usize> {
            let mut rom = self.0.lock().unwrap();
            let n = buf.len().min(rom.pending.len());
            for (slot, byte) in buf.iter_mut().zip(rom.pending.drain(..n)) {
                *slot = byte;
            }
            Ok(n)
        }

        fn set_baud(&mut self, baud: u32) -> Result<()> {
            self.0.lock().unwrap().baud = baud;
            Ok(())
        }

        fn set_dtr(&mut self, level: bool) -> Result<()> {
            self.0.lock().unwrap().lines.push(("dtr", level));
            Ok(())
        }

        fn set_rts(&mut self, level: bool) -> Result<()> {
            self.0.lock().unwrap().lines.push(("rts", level));
            Ok(())
        }

        fn clear_input(&mut self) -> Result<()> {
            self.0.lock().unwrap().pending.clear();
            Ok(())
        }

        fn delay(&mut self, _ms: u64) {}
    }

    fn loader(rom: Rom) -> (RomLoader<MockTransport>, Arc<Mutex<Rom>>) {
        let rom = Arc::new(Mutex::new(rom));
        let link = rom.clone();
        let options = RomOptions {
            connect_attempts: 2,
            sync_attempts: 2,
            ..RomOptions::default()
        };
        let loader = RomLoader::new(options, move || {
            link.lock().unwrap().opens += 1;
            Ok(MockTransport(link.clone()))
        });
        (loader, rom)
    }

    fn rom(magic: u32) -> Rom {
        Rom {
            magic,
            ..Rom::default()
        }
    }

    #[derive(Default)]
    struct Writes(Vec<(u32, u32)>);

    impl FlashProgress for Writes {
        fn connecting(&mut self) {}
        fn entry_started(&mut self, _index: usize, _entry: &FlashEntry) {}
        fn erasing(&mut self, _address: u32, _length: u32) {}
        fn write_progress(&mut self, written: u32, total: u32) {
            self.0.push((written, total));
        }
        fn verifying(&mut self, _address: u32) {}
        fn entry_finished(&mut self, _index: usize) {}
    }

    fn image(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7 + 3) as u8).collect()
    }

    #[test]
    fn test_connect_detects_chip_and_attaches() {
        let (mut loader, rom) = loader(rom(ESP32C3_MAGIC));
        let identity = loader.connect().unwrap();
        assert_eq!(identity.chip, TargetChip::Esp32c3);
        assert_eq!(identity.magic, ESP32C3_MAGIC);

        let rom = rom.lock().unwrap();
        assert_eq!(rom.opens, 1);
        assert_eq!(rom.count(SPI_ATTACH), 1);
        assert_eq!(rom.requests[0], (SYNC, SYNC_PAYLOAD.to_vec()));
        assert_eq!(&rom.lines[..2], &[("dtr", false), ("rts", true)]);
    }

    #[test]
    fn test_esp8266_skips_attach() {
        let (mut loader, rom) = loader(rom(ESP8266_MAGIC));
        assert_eq!(loader.connect().unwrap().chip, TargetChip::Esp8266);
        assert_eq!(rom.lock().unwrap().count(SPI_ATTACH), 0);
    }

    #[test]
    fn test_sync_retries() {
        let mut target = rom(ESP32_MAGIC);
        target.ignore_syncs = 3;
        let (mut loader, rom) = loader(target);
        assert_eq!(loader.connect().unwrap().chip, TargetChip::Esp32);
        assert_eq!(rom.lock().unwrap().count(SYNC), 4);
    }

    #[test]
    fn test_handshake_failure() {
        let mut target = rom(ESP32_MAGIC);
        target.ignore_syncs = usize::MAX;
        let (mut loader, rom) = loader(target);
        assert_eq!(loader.connect().unwrap_err(), ProtocolError::HandshakeFailed);
        assert_eq!(rom.lock().unwrap().count(SYNC), 4);
    }

    #[test]
    fn test_program_chunks() {
        let (mut loader, rom) = loader(rom(ESP32_MAGIC));
        loader.connect().unwrap();
        let data = image(5000);
        let mut progress = Writes::default();
        loader
            .program(0x10000, 5000, &mut data.as_slice(), &mut progress)
            .unwrap();

        let rom = rom.lock().unwrap();
        let sizes: Vec<usize> = rom
            .requests
            .iter()
            .filter(|(op, _)| *op == FLASH_DATA)
            .map(|(_, d)| d.len() - 16)
            .collect();
        assert_eq!(sizes, vec![1024, 1024, 1024, 1024, 904]);
        assert_eq!(rom.flash, data);

        let begin = &rom.requests.iter().find(|(op, _)| *op == FLASH_BEGIN).unwrap().1;
        assert_eq!(begin, &words(&[5000, 5, 1024, 0x10000]));

        assert!(progress.0.windows(2).all(|w| w[0].0 < w[1].0));
        assert_eq!(progress.0.last(), Some(&(5000, 5000)));
        assert_eq!(progress.0.len(), 5);
    }

    #[test]
    fn test_sequence_numbers_and_padding() {
        let (mut loader, rom) = loader(rom(ESP32C3_MAGIC));
        loader.connect().unwrap();
        let data = image(1025);
        loader
            .program(0, 1025, &mut data.as_slice(), &mut NoProgress)
            .unwrap();

        let rom = rom.lock().unwrap();
        let blocks: Vec<&Vec<u8>> = rom
            .requests
            .iter()
            .filter(|(op, _)| *op == FLASH_DATA)
            .map(|(_, d)| d)
            .collect();
        assert_eq!(&blocks[0][..16], words(&[1024, 0, 0, 0]).as_slice());
        assert_eq!(&blocks[1][..16], words(&[4, 1, 0, 0]).as_slice());
        assert_eq!(&blocks[1][16..], &[data[1024], 0xFF, 0xFF, 0xFF]);

        // Newer chips carry the encryption word
        let begin = &rom.requests.iter().find(|(op, _)| *op == FLASH_BEGIN).unwrap().1;
        assert_eq!(begin.len(), 20);
    }

    #[test]
    fn test_truncated_image() {
        let (mut loader, _rom) = loader(rom(ESP32_MAGIC));
        loader.connect().unwrap();
        let data = image(2000);
        let err = loader
            .program(0x1000, 3000, &mut data.as_slice(), &mut NoProgress)
            .unwrap_err();
        assert_eq!(
            err,
            ProtocolError::TruncatedImage {
                expected: 3000,
                delivered: 2000
            }
        );
    }

    #[test]
    fn test_transport_failure_mid_stream() {
        let mut target = rom(ESP32_MAGIC);
        target.fail_data_at = Some(2);
        let (mut loader, rom) = loader(target);
        loader.connect().unwrap();
        let data = image(4096);
        let mut progress = Writes::default();
        let err = loader
            .program(0, 4096, &mut data.as_slice(), &mut progress)
            .unwrap_err();
        assert!(matches!(err, ProtocolError::TransportError(_)));
        assert_eq!(progress.0.len(), 2);
        assert_eq!(rom.lock().unwrap().count(FLASH_DATA), 3);
    }

    #[test]
    fn test_program_requires_connect() {
        let (mut loader, _rom) = loader(rom(ESP32_MAGIC));
        let data = image(16);
        assert!(matches!(
            loader.program(0, 16, &mut data.as_slice(), &mut NoProgress),
            Err(ProtocolError::TransportError(_))
        ));
    }

    #[test]
    fn test_rate_change() {
        let (mut loader, rom) = loader(rom(ESP32_MAGIC));
        loader.connect().unwrap();
        loader.negotiate_rate(921_600).unwrap();
        let rom = rom.lock().unwrap();
        assert_eq!(rom.baud, 921_600);
        let params = &rom.requests.iter().find(|(op, _)| *op == CHANGE_BAUDRATE).unwrap().1;
        assert_eq!(params, &words(&[921_600, 0]));
    }

    #[test]
    fn test_rate_change_rejected_is_unsupported() {
        let mut target = rom(ESP32_MAGIC);
        target.reject.push((CHANGE_BAUDRATE, ROM_INVALID_MESSAGE));
        let (mut loader, rom) = loader(target);
        loader.connect().unwrap();
        assert_eq!(
            loader.negotiate_rate(921_600).unwrap_err(),
            ProtocolError::UnsupportedFunction("CHANGE_BAUDRATE")
        );
        assert_eq!(rom.lock().unwrap().baud, 0);
    }

    #[test]
    fn test_esp8266_skips_rate_and_verify() {
        let (mut loader, rom) = loader(rom(ESP8266_MAGIC));
        loader.connect().unwrap();
        loader.negotiate_rate(921_600).unwrap();
        let data = image(100);
        loader
            .program(0, 100, &mut data.as_slice(), &mut NoProgress)
            .unwrap();
        assert!(matches!(
            loader.verify(),
            Err(ProtocolError::UnsupportedFunction(_))
        ));

        let rom = rom.lock().unwrap();
        assert_eq!(rom.count(CHANGE_BAUDRATE), 0);
        assert_eq!(rom.count(SPI_FLASH_MD5), 0);
    }

    #[cfg(feature = "verify")]
    #[test]
    fn test_verify_matches() {
        let (mut loader, _rom) = loader(rom(ESP32_MAGIC));
        loader.connect().unwrap();
        let data = image(3001);
        loader
            .program(0x8000, 3001, &mut data.as_slice(), &mut NoProgress)
            .unwrap();
        loader.verify().unwrap();
    }

    #[cfg(feature = "verify")]
    #[test]
    fn test_verify_mismatch() {
        let mut target = rom(ESP32_MAGIC);
        target.corrupt_digest = true;
        let (mut loader, _rom) = loader(target);
        loader.connect().unwrap();
        let data = image(64);
        loader
            .program(0x8000, 64, &mut data.as_slice(), &mut NoProgress)
            .unwrap();
        assert!(matches!(
            loader.verify(),
            Err(ProtocolError::ChecksumMismatch { .. })
        ));
    }

    #[cfg(feature = "verify")]
    #[test]
    fn test_verify_accepts_raw_digest() {
        let mut target = rom(ESP32_MAGIC);
        target.raw_digest = true;
        let (mut loader, _rom) = loader(target);
        loader.connect().unwrap();
        let data = image(2048);
        loader
            .program(0x10000, 2048, &mut data.as_slice(), &mut NoProgress)
            .unwrap();
        loader.verify().unwrap();
    }

    #[test]
    fn test_disconnect_releases_link() {
        let (mut loader, rom) = loader(rom(ESP32_MAGIC));
        loader.connect().unwrap();
        loader.disconnect();
        assert!(loader.chip().is_none());
        let resets = rom.lock().unwrap().lines.len();
        loader.disconnect();
        assert_eq!(rom.lock().unwrap().lines.len(), resets);

        loader.connect().unwrap();
        assert_eq!(rom.lock().unwrap().opens, 2);
    }
}
