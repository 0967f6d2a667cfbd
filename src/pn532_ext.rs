//! [`Transceiver`] over the `pn532` crate.
//!
//! The crate owns framing, ACK handling and ready polling; this module
//! adds the MIFARE and NTAG exchanges the reader adapter needs and folds
//! `pn532::Error` into the crate-wide [`Error`].
//!
//! PN532 User Manual: <https://www.nxp.com/docs/en/user-guide/141520.pdf>
//! (InDataExchange status byte: section 7.1, "Error Handling").

use core::fmt::Debug;
use core::time::Duration;

use pn532::requests::{Command, SAMMode};
use pn532::{CountDown, Interface, Request};

use crate::bus::{FirmwareVersion, MifareKey, TargetId, Transceiver};
use crate::config::{PN532_ACTIVATION_RETRIES, PN532_RESPONSE_TIMEOUT_MS};
use crate::error::Error;
use crate::log_macros::{debug, warning};

/// Frame buffer size. Large enough for an InListPassiveTarget reply that
/// carries a 10-byte UID plus ATS.
pub const FRAME_BUFFER_LEN: usize = 64;

/// Data bytes requested back from InListPassiveTarget. Replies may be
/// shorter; anything after the UID (ATS) is ignored.
const INLIST_RESPONSE_LEN: usize = 48;

/// MIFARE commands tunnelled through InDataExchange. NTAG READ shares
/// the `0x30` opcode.
const MIFARE_AUTH_A: u8 = 0x60;
const MIFARE_READ: u8 = 0x30;

/// Logical target number assigned by InListPassiveTarget.
const TARGET: u8 = 0x01;

/// RFConfiguration item 5: MxRtyATR, MxRtyPSL, MxRtyPassiveActivation.
const RF_MAX_RETRIES: u8 = 0x05;

/// Error bits of the InDataExchange status byte.
const STATUS_ERROR_MASK: u8 = 0x3F;

/// Status byte plus one 16-byte READ answer.
const READ_RESPONSE_LEN: usize = 17;

/// Response data copied out of the driver's frame buffer.
type Reply = heapless::Vec<u8, FRAME_BUFFER_LEN>;

/// A PN532 on some [`Interface`], timed by `T`.
pub struct Pn532Reader<I, T> {
    pn532: pn532::Pn532<I, T, FRAME_BUFFER_LEN>,
}

impl<I, T> Pn532Reader<I, T>
where
    I: Interface,
    T: CountDown<Time = Duration>,
{
    pub fn new(interface: I, timer: T) -> Self {
        Self {
            pn532: pn532::Pn532::new(interface, timer),
        }
    }

    /// Send one request and copy the response data out.
    fn exchange<const N: usize>(
        &mut self,
        request: &Request<N>,
        response_len: usize,
        timeout_ms: u32,
    ) -> Result<Reply, Error> {
        let reply = self
            .pn532
            .process(request, response_len, millis(timeout_ms))
            .map_err(from_pn532)?;
        Reply::from_slice(reply).map_err(|_| Error::BufferOverflow)
    }

    /// Tunnel a tag command through InDataExchange. Returns the bytes
    /// after the status byte.
    fn data_exchange<const N: usize>(
        &mut self,
        request: &Request<N>,
        response_len: usize,
    ) -> Result<Reply, Error> {
        let reply = self.exchange(request, response_len, PN532_RESPONSE_TIMEOUT_MS)?;
        match reply.split_first() {
            Some((&status, data)) if status & STATUS_ERROR_MASK == 0 => {
                Reply::from_slice(data).map_err(|_| Error::BufferOverflow)
            }
            Some((&status, _)) => Err(Error::Status(status & STATUS_ERROR_MASK)),
            None => Err(Error::Frame),
        }
    }
}

impl<I, T> Transceiver for Pn532Reader<I, T>
where
    I: Interface,
    T: CountDown<Time = Duration>,
{
    fn firmware_version(&mut self) -> Result<FirmwareVersion, Error> {
        let data = self.exchange(&Request::GET_FIRMWARE_VERSION, 4, PN532_RESPONSE_TIMEOUT_MS)?;
        match *data {
            [ic, version, revision, support, ..] => Ok(FirmwareVersion {
                ic,
                version,
                revision,
                support,
            }),
            _ => Err(Error::Frame),
        }
    }

    fn configure_session(&mut self) -> Result<(), Error> {
        self.exchange(
            &Request::sam_configuration(SAMMode::Normal, true),
            0,
            PN532_RESPONSE_TIMEOUT_MS,
        )?;
        self.exchange(
            &Request::new(
                Command::RFConfiguration,
                [RF_MAX_RETRIES, 0xFF, 0x01, PN532_ACTIVATION_RETRIES],
            ),
            0,
            PN532_RESPONSE_TIMEOUT_MS,
        )?;
        Ok(())
    }

    fn detect_target(&mut self, timeout_ms: u32) -> Result<Option<TargetId>, Error> {
        let data = match self.exchange(
            &Request::INLIST_ONE_ISO_A_TARGET,
            INLIST_RESPONSE_LEN,
            timeout_ms,
        ) {
            Ok(data) => data,
            Err(Error::Timeout) => return Ok(None),
            Err(e) => return Err(e),
        };

        // NbTg, Tg, SENS_RES (2), SEL_RES, NFCIDLength, NFCID…, [ATS…]
        match *data {
            [0, ..] => Ok(None),
            [_, _, _, _, _, uid_len, ref rest @ ..] => {
                let uid = rest.get(..usize::from(uid_len)).ok_or(Error::Frame)?;
                TargetId::from_slice(uid)
                    .map(Some)
                    .map_err(|_| Error::BufferOverflow)
            }
            _ => Err(Error::Frame),
        }
    }

    fn authenticate_block(
        &mut self,
        uid: &[u8],
        block: u8,
        key: &MifareKey,
    ) -> Result<(), Error> {
        let mut payload = [0u8; 13];
        payload[..3].copy_from_slice(&[TARGET, MIFARE_AUTH_A, block]);
        payload[3..9].copy_from_slice(key);
        // Authentication takes the first four UID bytes.
        let n = uid.len().min(4);
        payload[9..9 + n].copy_from_slice(&uid[..n]);

        self.data_exchange(&Request::new(Command::InDataExchange, payload), 1)?;
        Ok(())
    }

    fn read_block(&mut self, block: u8) -> Result<[u8; 16], Error> {
        let request = Request::new(Command::InDataExchange, [TARGET, MIFARE_READ, block]);
        let data = self.data_exchange(&request, READ_RESPONSE_LEN)?;
        data.get(..16)
            .and_then(|d| d.try_into().ok())
            .ok_or(Error::Frame)
    }

    /// NTAG READ returns four pages; the first is the one asked for.
    fn read_page(&mut self, page: u8) -> Result<[u8; 4], Error> {
        let data = self.data_exchange(&Request::ntag_read(page), READ_RESPONSE_LEN)?;
        data.get(..4)
            .and_then(|d| d.try_into().ok())
            .ok_or(Error::Frame)
    }
}

fn millis(ms: u32) -> Duration {
    Duration::from_millis(u64::from(ms))
}

fn from_pn532<E: Debug>(e: pn532::Error<E>) -> Error {
    match e {
        pn532::Error::TimeoutResponse => Error::Timeout,
        pn532::Error::TimeoutAck => {
            debug!("pn532: no ACK");
            Error::NoAck
        }
        pn532::Error::InterfaceError(_) => Error::Bus,
        _ => {
            warning!("pn532: bad response frame");
            Error::Frame
        }
    }
}
