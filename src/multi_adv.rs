//! Multi-advertising vendor commands.
//!
//! Every command here is vendor OCF [`OCF_MULTI_ADV`] with a sub-opcode in the first parameter
//! byte. Parameters are validated before anything is handed to the [`VendorDispatcher`]; a
//! rejected call sends nothing.
//!
//! Parameter blocks, all multi-byte fields little endian:
//!
//! | sub-command       | bytes                                                         |
//! |-------------------|---------------------------------------------------------------|
//! | set params        | sub, int_min:2, int_max:2, type, own_type, own_addr:6, peer_type, peer_addr:6, channels, filter, instance, tx_power |
//! | adv / scan data   | sub, len, data (zero padded to 31), instance                  |
//! | random address    | sub, addr:6, instance                                         |
//! | enable            | sub, enable, instance                                         |

use crate::transport::HciWrite;
use crate::vendor::{self, Callback, VendorDispatcher};

/// Multi-advertising vendor command field.
pub const OCF_MULTI_ADV: u16 = 0x0154;

pub const SUBCMD_SET_PARAM: u8 = 0x01;
pub const SUBCMD_WRITE_ADV_DATA: u8 = 0x02;
pub const SUBCMD_WRITE_SCAN_RSP_DATA: u8 = 0x03;
pub const SUBCMD_SET_RANDOM_ADDR: u8 = 0x04;
pub const SUBCMD_ENABLE: u8 = 0x05;

const SET_PARAM_LEN: usize = 24;
const WRITE_DATA_LEN: usize = 34;
const SET_RANDOM_ADDR_LEN: usize = 8;
const ENABLE_LEN: usize = 3;

/// Largest legacy advertising or scan response payload.
pub const MAX_ADV_DATA_LEN: usize = 31;

/// Advertising interval bounds, in 0.625 ms units.
pub const HCI_ADV_MIN_INTERVAL: u16 = 0x0020;
pub const HCI_ADV_MAX_INTERVAL: u16 = 0x4000;

/// TX power bounds, dBm.
pub const MIN_TX_POWER: i8 = -21;
pub const MAX_TX_POWER: i8 = 9;

/// Advertising instance bounds.
pub const MIN_INSTANCE: u8 = 1;
pub const MAX_INSTANCE: u8 = 16;

pub type BdAddr = [u8; 6];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum AdvType {
    /// Connectable undirected.
    AdvInd = 0,
    /// Connectable directed, high duty cycle.
    AdvDirectIndHighDuty = 1,
    /// Scannable undirected.
    AdvScanInd = 2,
    /// Non-connectable undirected.
    AdvNonconnInd = 3,
    /// Connectable directed, low duty cycle.
    AdvDirectIndLowDuty = 4,
}

impl TryFrom<u8> for AdvType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Error> {
        Ok(match value {
            0 => AdvType::AdvInd,
            1 => AdvType::AdvDirectIndHighDuty,
            2 => AdvType::AdvScanInd,
            3 => AdvType::AdvNonconnInd,
            4 => AdvType::AdvDirectIndLowDuty,
            _ => return Err(Error::BadAdvertisingType(value)),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum FilterPolicy {
    /// Scan and connect requests from anyone.
    AllowAll = 0,
    /// Scan requests from the filter accept list only.
    ScanAcceptList = 1,
    /// Connect requests from the filter accept list only.
    ConnectAcceptList = 2,
    /// Both from the filter accept list only.
    AcceptListOnly = 3,
}

impl TryFrom<u8> for FilterPolicy {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Error> {
        Ok(match value {
            0 => FilterPolicy::AllowAll,
            1 => FilterPolicy::ScanAcceptList,
            2 => FilterPolicy::ConnectAcceptList,
            3 => FilterPolicy::AcceptListOnly,
            _ => return Err(Error::BadFilterPolicy(value)),
        })
    }
}

/// Advertising channels 37, 38 and 39 as bits 0, 1 and 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelMap(pub u8);

impl ChannelMap {
    pub const CH37: ChannelMap = ChannelMap(0x01);
    pub const CH38: ChannelMap = ChannelMap(0x02);
    pub const CH39: ChannelMap = ChannelMap(0x04);
    pub const ALL: ChannelMap = ChannelMap(0x07);

    const MASK: u8 = 0x07;

    pub fn is_valid(self) -> bool {
        self.0 != 0 && self.0 & !Self::MASK == 0
    }
}

impl Default for ChannelMap {
    fn default() -> Self {
        Self::ALL
    }
}

/// Parameters of one advertising instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AdvParams {
    pub interval_min: u16,
    pub interval_max: u16,
    pub adv_type: AdvType,
    pub own_addr_type: u8,
    pub own_addr: BdAddr,
    pub peer_addr_type: u8,
    pub peer_addr: BdAddr,
    pub channel_map: ChannelMap,
    pub filter_policy: FilterPolicy,
    pub tx_power: i8,
}

impl Default for AdvParams {
    fn default() -> Self {
        Self {
            interval_min: 0x0800,
            interval_max: 0x0800,
            adv_type: AdvType::AdvInd,
            own_addr_type: 0,
            own_addr: [0; 6],
            peer_addr_type: 0,
            peer_addr: [0; 6],
            channel_map: ChannelMap::ALL,
            filter_policy: FilterPolicy::AllowAll,
            tx_power: 0,
        }
    }
}

impl AdvParams {
    fn validate(&self) -> Result<(), Error> {
        let interval = HCI_ADV_MIN_INTERVAL..=HCI_ADV_MAX_INTERVAL;
        if !interval.contains(&self.interval_min)
            || !interval.contains(&self.interval_max)
            || self.interval_min > self.interval_max
        {
            return Err(Error::BadAdvertisingInterval {
                min: self.interval_min,
                max: self.interval_max,
            });
        }
        if !(MIN_TX_POWER..=MAX_TX_POWER).contains(&self.tx_power) {
            return Err(Error::BadTxPower(self.tx_power));
        }
        if !self.channel_map.is_valid() {
            return Err(Error::BadChannelMap(self.channel_map.0));
        }
        Ok(())
    }
}

#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Instance outside 1..=16.
    BadInstance(u8),
    /// Interval outside the allowed range, or min above max.
    BadAdvertisingInterval { min: u16, max: u16 },
    BadTxPower(i8),
    /// Channel map empty or naming channels other than 37..=39.
    BadChannelMap(u8),
    BadAdvertisingType(u8),
    BadFilterPolicy(u8),
    /// Advertising or scan response data over 31 bytes.
    DataTooLong(usize),
    /// The command was valid but could not be sent.
    Dispatch(vendor::Error),
}

impl Error {
    /// Rejected during validation; nothing was sent.
    pub fn is_invalid_parameter(&self) -> bool {
        !matches!(self, Error::Dispatch(_))
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::BadInstance(i) => write!(f, "invalid advertising instance {}", i),
            Error::BadAdvertisingInterval { min, max } => {
                write!(f, "invalid advertising interval 0x{:04X}..0x{:04X}", min, max)
            }
            Error::BadTxPower(p) => write!(f, "invalid TX power {} dBm", p),
            Error::BadChannelMap(m) => write!(f, "invalid channel map 0x{:02X}", m),
            Error::BadAdvertisingType(t) => write!(f, "invalid advertising type {}", t),
            Error::BadFilterPolicy(p) => write!(f, "invalid filter policy {}", p),
            Error::DataTooLong(n) => write!(f, "advertising data too long: {} bytes", n),
            Error::Dispatch(e) => write!(f, "{}", e),
        }
    }
}

impl core::error::Error for Error {}

impl From<vendor::Error> for Error {
    fn from(e: vendor::Error) -> Self {
        Error::Dispatch(e)
    }
}

fn check_instance(instance: u8) -> Result<(), Error> {
    if (MIN_INSTANCE..=MAX_INSTANCE).contains(&instance) {
        Ok(())
    } else {
        Err(Error::BadInstance(instance))
    }
}

/// Enable or disable advertising on `instance`. The instance is passed through unchecked.
pub fn start_multi_advertisements<T: HciWrite, const S: usize, const R: usize>(
    dispatcher: &VendorDispatcher<S, R>,
    transport: &mut T,
    enable: bool,
    instance: u8,
    callback: Callback,
) -> Result<(), Error> {
    let params: [u8; ENABLE_LEN] = [SUBCMD_ENABLE, enable as u8, instance];
    dispatcher.send_vendor_command(transport, OCF_MULTI_ADV, &params, callback)?;
    Ok(())
}

/// Set the advertising payload of `instance`.
pub fn set_advertisement_data<T: HciWrite, const S: usize, const R: usize>(
    dispatcher: &VendorDispatcher<S, R>,
    transport: &mut T,
    data: &[u8],
    instance: u8,
    callback: Callback,
) -> Result<(), Error> {
    let params = encode_data(SUBCMD_WRITE_ADV_DATA, data, instance)?;
    dispatcher.send_vendor_command(transport, OCF_MULTI_ADV, &params, callback)?;
    Ok(())
}

/// Set the scan response payload of `instance`.
pub fn set_scan_response_data<T: HciWrite, const S: usize, const R: usize>(
    dispatcher: &VendorDispatcher<S, R>,
    transport: &mut T,
    data: &[u8],
    instance: u8,
    callback: Callback,
) -> Result<(), Error> {
    let params = encode_data(SUBCMD_WRITE_SCAN_RSP_DATA, data, instance)?;
    dispatcher.send_vendor_command(transport, OCF_MULTI_ADV, &params, callback)?;
    Ok(())
}

fn encode_data(subcmd: u8, data: &[u8], instance: u8) -> Result<[u8; WRITE_DATA_LEN], Error> {
    if data.len() > MAX_ADV_DATA_LEN {
        return Err(Error::DataTooLong(data.len()));
    }
    let mut params = [0u8; WRITE_DATA_LEN];
    params[0] = subcmd;
    params[1] = data.len() as u8;
    params[2..2 + data.len()].copy_from_slice(data);
    params[WRITE_DATA_LEN - 1] = instance;
    Ok(params)
}

/// Configure `instance`. Nothing is sent if any parameter is out of range.
pub fn set_advertisement_params<T: HciWrite, const S: usize, const R: usize>(
    dispatcher: &VendorDispatcher<S, R>,
    transport: &mut T,
    instance: u8,
    params: &AdvParams,
    callback: Callback,
) -> Result<(), Error> {
    check_instance(instance)?;
    params.validate()?;

    let mut buf = [0u8; SET_PARAM_LEN];
    buf[0] = SUBCMD_SET_PARAM;
    buf[1..3].copy_from_slice(&params.interval_min.to_le_bytes());
    buf[3..5].copy_from_slice(&params.interval_max.to_le_bytes());
    buf[5] = params.adv_type as u8;
    buf[6] = params.own_addr_type;
    buf[7..13].copy_from_slice(&params.own_addr);
    buf[13] = params.peer_addr_type;
    buf[14..20].copy_from_slice(&params.peer_addr);
    buf[20] = params.channel_map.0;
    buf[21] = params.filter_policy as u8;
    buf[22] = instance;
    buf[23] = params.tx_power as u8;

    debug!("multi-adv instance {} params", instance);
    dispatcher.send_vendor_command(transport, OCF_MULTI_ADV, &buf, callback)?;
    Ok(())
}

/// Set the random address `instance` advertises with.
pub fn set_random_address<T: HciWrite, const S: usize, const R: usize>(
    dispatcher: &VendorDispatcher<S, R>,
    transport: &mut T,
    instance: u8,
    addr: &BdAddr,
    callback: Callback,
) -> Result<(), Error> {
    check_instance(instance)?;

    let mut buf = [0u8; SET_RANDOM_ADDR_LEN];
    buf[0] = SUBCMD_SET_RANDOM_ADDR;
    buf[1..7].copy_from_slice(addr);
    buf[7] = instance;

    dispatcher.send_vendor_command(transport, OCF_MULTI_ADV, &buf, callback)?;
    Ok(())
}
