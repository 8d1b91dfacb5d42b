//! OCPP 1.6 configuration registry.
//!
//! The whole key set is declared once in the `config_table!` invocation at
//! the bottom of this file; the key enum, name strings, capacities, access
//! checks, pool offsets and default values are all derived from that single
//! list. Values live in one contiguous byte pool so a snapshot is a verbatim
//! copy of the pool.

use crate::error::Error;
use bitflags::bitflags;
use lazy_static::lazy_static;
use num_enum::TryFromPrimitive;

/// Value shape of a configuration entry.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DataType {
    Bool,
    Int,
    /// Comma-separated list, stored as a bitmask.
    Csl,
    Str,
}

/// Who may touch an entry. `W` exists for write-only secrets.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Access {
    R,
    W,
    RW,
}

#[derive(Clone, Copy, Debug)]
enum Decl {
    Bool(bool),
    Int(i32),
    Csl(u32),
    Str(usize, &'static str),
}

#[derive(Clone, Copy, Debug)]
struct Entry {
    name: &'static str,
    access: Access,
    decl: Decl,
}

impl Entry {
    const fn cap(&self) -> usize {
        match self.decl {
            Decl::Bool(_) => 1,
            Decl::Int(_) | Decl::Csl(_) => 4,
            Decl::Str(cap, _) => cap,
        }
    }

    const fn data_type(&self) -> DataType {
        match self.decl {
            Decl::Bool(_) => DataType::Bool,
            Decl::Int(_) => DataType::Int,
            Decl::Csl(_) => DataType::Csl,
            Decl::Str(..) => DataType::Str,
        }
    }
}

macro_rules! config_table {
    ($($key:ident => $access:ident, $ty:ident $decl:tt;)*) => {
        /// Every key this charge point understands, in declaration order.
        #[derive(Clone, Copy, PartialEq, Eq, Debug, TryFromPrimitive)]
        #[repr(u8)]
        #[allow(clippy::enum_variant_names)]
        pub enum ConfigKey {
            $($key,)*
        }

        static TABLE: &[Entry] = &[
            $(Entry {
                name: stringify!($key),
                access: Access::$access,
                decl: Decl::$ty $decl,
            },)*
        ];
    };
}

config_table! {
    // Core profile, in the order of the OCPP 1.6 specification table.
    AllowOfflineTxForUnknownId => RW, Bool(false);
    AuthorizationCacheEnabled => RW, Bool(false);
    AuthorizeRemoteTxRequests => RW, Bool(true);
    BlinkRepeat => RW, Int(0);
    ClockAlignedDataInterval => RW, Int(0);
    ConnectionTimeOut => RW, Int(180);
    ConnectorPhaseRotation => RW, Csl(0);
    ConnectorPhaseRotationMaxLength => R, Int(1);
    GetConfigurationMaxKeys => R, Int(54);
    HeartbeatInterval => RW, Int(240);
    LightIntensity => RW, Int(100);
    LocalAuthorizeOffline => RW, Bool(false);
    LocalPreAuthorize => RW, Bool(false);
    MaxEnergyOnInvalidId => RW, Int(0);
    MeterValuesAlignedData => RW, Csl(0);
    MeterValuesAlignedDataMaxLength => R, Int(1);
    MeterValuesSampledData => RW, Csl(Measurand::ENERGY_ACTIVE_IMPORT_REGISTER.bits());
    MeterValuesSampledDataMaxLength => R, Int(1);
    MeterValueSampleInterval => RW, Int(0);
    MinimumStatusDuration => RW, Int(0);
    NumberOfConnectors => R, Int(1);
    ResetRetries => RW, Int(0);
    StopTransactionOnEVSideDisconnect => RW, Bool(true);
    StopTransactionOnInvalidId => RW, Bool(true);
    StopTxnAlignedData => RW, Csl(0);
    StopTxnAlignedDataMaxLength => R, Int(1);
    StopTxnSampledData => RW, Csl(0);
    StopTxnSampledDataMaxLength => R, Int(1);
    SupportedFeatureProfiles => R, Csl(FeatureProfile::all().bits());
    SupportedFeatureProfilesMaxLength => R, Int(1);
    TransactionMessageAttempts => RW, Int(3);
    TransactionMessageRetryInterval => RW, Int(60);
    UnlockConnectorOnEVSideDisconnect => RW, Bool(true);
    WebSocketPingInterval => RW, Int(0);
    // Firmware management profile. The default is longer than the capacity
    // on purpose; default initialization truncates.
    SupportedFileTransferProtocols => R, Str(14, "FTP,FTPS,HTTP,HTTPS");
    // Local auth list profile.
    LocalAuthListEnabled => RW, Bool(true);
    LocalAuthListMaxLength => R, Int(128);
    SendLocalListMaxLength => R, Int(128);
    // Reservation profile.
    ReserveConnectorZeroSupported => R, Bool(false);
    // Smart charging profile.
    ChargeProfileMaxStackLevel => R, Int(8);
    ChargingScheduleAllowedChargingRateUnit => R, Csl(RateUnit::all().bits());
    ChargingScheduleMaxPeriods => R, Int(24);
    ConnectorSwitch3to1PhaseSupported => R, Bool(false);
    MaxChargingProfilesInstalled => R, Int(8);
    // Security extension.
    AdditionalRootCertificateCheck => R, Bool(false);
    AuthorizationKey => RW, Str(40, "");
    CertificateSignedMaxChainSize => R, Int(0);
    CertificateStoreMaxLength => R, Int(0);
    CpoName => RW, Str(20, "");
    SecurityProfile => RW, Int(0);
    // Connection back-off keys plus the endpoint the transport dials.
    RetryBackOffRepeatTimes => RW, Int(0);
    RetryBackOffRandomRange => RW, Int(0);
    RetryBackOffWaitMinimum => RW, Int(3);
    CentralSystemURL => RW, Str(32, "");
}

bitflags! {
    /// Bits of the measurand CSL keys (`MeterValuesSampledData` et al).
    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    pub struct Measurand: u32 {
        const CURRENT_EXPORT = 1 << 0;
        const CURRENT_IMPORT = 1 << 1;
        const CURRENT_OFFERED = 1 << 2;
        const ENERGY_ACTIVE_EXPORT_REGISTER = 1 << 3;
        const ENERGY_ACTIVE_IMPORT_REGISTER = 1 << 4;
        const ENERGY_REACTIVE_EXPORT_REGISTER = 1 << 5;
        const ENERGY_REACTIVE_IMPORT_REGISTER = 1 << 6;
        const ENERGY_ACTIVE_EXPORT_INTERVAL = 1 << 7;
        const ENERGY_ACTIVE_IMPORT_INTERVAL = 1 << 8;
        const ENERGY_REACTIVE_EXPORT_INTERVAL = 1 << 9;
        const ENERGY_REACTIVE_IMPORT_INTERVAL = 1 << 10;
        const FREQUENCY = 1 << 11;
        const POWER_ACTIVE_EXPORT = 1 << 12;
        const POWER_ACTIVE_IMPORT = 1 << 13;
        const POWER_FACTOR = 1 << 14;
        const POWER_OFFERED = 1 << 15;
        const POWER_REACTIVE_EXPORT = 1 << 16;
        const POWER_REACTIVE_IMPORT = 1 << 17;
        const RPM = 1 << 18;
        const SOC = 1 << 19;
        const TEMPERATURE = 1 << 20;
        const VOLTAGE = 1 << 21;
    }

    /// Bits of the `ConnectorPhaseRotation` CSL.
    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    pub struct PhaseRotation: u32 {
        const NOT_APPLICABLE = 1 << 0;
        const UNKNOWN = 1 << 1;
        const RST = 1 << 2;
        const RTS = 1 << 3;
        const SRT = 1 << 4;
        const STR = 1 << 5;
        const TRS = 1 << 6;
        const TSR = 1 << 7;
    }

    /// Bits of the read-only `SupportedFeatureProfiles` CSL.
    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    pub struct FeatureProfile: u32 {
        const CORE = 1 << 0;
        const FIRMWARE_MANAGEMENT = 1 << 1;
        const LOCAL_AUTH_LIST_MANAGEMENT = 1 << 2;
        const RESERVATION = 1 << 3;
        const SMART_CHARGING = 1 << 4;
        const REMOTE_TRIGGER = 1 << 5;
    }

    /// Bits of `ChargingScheduleAllowedChargingRateUnit`.
    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    pub struct RateUnit: u32 {
        const CURRENT = 1 << 0;
        const POWER = 1 << 1;
    }
}

lazy_static! {
    /// Byte offset of each value in the pool, in declaration order.
    static ref OFFSETS: Vec<usize> = {
        let mut offsets = Vec::with_capacity(TABLE.len());
        let mut at = 0;
        for entry in TABLE {
            offsets.push(at);
            at += entry.cap();
        }
        offsets
    };
}

fn lookup(key: &str) -> Option<usize> {
    TABLE.iter().position(|e| e.name == key)
}

/// The typed key/value registry. All values occupy one contiguous pool whose
/// layout is fixed at build time; entries can neither appear nor disappear at
/// runtime.
pub struct Configuration {
    pool: Vec<u8>,
}

impl Configuration {
    pub fn new() -> Self {
        let mut conf = Configuration {
            pool: vec![0; Self::total_size()],
        };
        conf.reset();
        conf
    }

    /// Number of known keys.
    pub fn count() -> usize {
        TABLE.len()
    }

    /// Sum of the capacities of every value.
    pub fn total_size() -> usize {
        TABLE.iter().map(|e| e.cap()).sum()
    }

    pub fn has(key: &str) -> bool {
        lookup(key).is_some()
    }

    pub fn data_type(key: &str) -> Option<DataType> {
        lookup(key).map(|i| TABLE[i].data_type())
    }

    /// Capacity in bytes, 0 for an unknown key.
    pub fn size(key: &str) -> usize {
        lookup(key).map(|i| TABLE[i].cap()).unwrap_or(0)
    }

    /// Key name for an ordinal, in declaration order.
    pub fn keystr(index: usize) -> Option<&'static str> {
        TABLE.get(index).map(|e| e.name)
    }

    pub fn is_writable(key: &str) -> bool {
        match lookup(key) {
            Some(i) => matches!(TABLE[i].access, Access::W | Access::RW),
            None => false,
        }
    }

    pub fn is_readable(key: &str) -> bool {
        match lookup(key) {
            Some(i) => matches!(TABLE[i].access, Access::R | Access::RW),
            None => false,
        }
    }

    /// Copies up to `buf.len()` bytes of the value into `buf` and returns
    /// whether the key is read-only.
    pub fn get(&self, key: &str, buf: &mut [u8]) -> Result<bool, Error> {
        let index = lookup(key).ok_or(Error::UnknownKey)?;
        self.copy_out(index, buf);
        Ok(!Self::is_writable(key))
    }

    /// Same as [`get`](Self::get), addressed by ordinal.
    pub fn get_by_index(&self, index: usize, buf: &mut [u8]) -> Result<bool, Error> {
        if index >= TABLE.len() {
            return Err(Error::UnknownKey);
        }
        self.copy_out(index, buf);
        Ok(!matches!(TABLE[index].access, Access::W | Access::RW))
    }

    pub fn set(&mut self, key: &str, value: &[u8]) -> Result<(), Error> {
        let index = lookup(key).ok_or(Error::UnknownKey)?;
        let entry = &TABLE[index];
        if value.len() > entry.cap() {
            return Err(Error::BadSize);
        }
        if !matches!(entry.access, Access::W | Access::RW) {
            return Err(Error::NotWritable);
        }
        let at = OFFSETS[index];
        self.pool[at..at + entry.cap()].fill(0);
        self.pool[at..at + value.len()].copy_from_slice(value);
        Ok(())
    }

    /// Re-applies every declared default. String defaults longer than their
    /// capacity are truncated.
    pub fn reset(&mut self) {
        self.pool.fill(0);
        for (index, entry) in TABLE.iter().enumerate() {
            let at = OFFSETS[index];
            match entry.decl {
                Decl::Bool(v) => self.pool[at] = v as u8,
                Decl::Int(v) => self.pool[at..at + 4].copy_from_slice(&v.to_le_bytes()),
                Decl::Csl(v) => self.pool[at..at + 4].copy_from_slice(&v.to_le_bytes()),
                Decl::Str(cap, s) => {
                    let n = s.len().min(cap);
                    self.pool[at..at + n].copy_from_slice(&s.as_bytes()[..n]);
                }
            }
        }
    }

    /// Verbatim copy of the value pool into `buf`.
    pub fn snapshot_to(&self, buf: &mut [u8]) -> Result<(), Error> {
        if buf.len() < self.pool.len() {
            return Err(Error::BadSize);
        }
        buf[..self.pool.len()].copy_from_slice(&self.pool);
        Ok(())
    }

    /// Restores a pool dump. The dump must be exactly [`total_size`] bytes.
    ///
    /// [`total_size`]: Self::total_size
    pub fn snapshot_from(&mut self, data: &[u8]) -> Result<(), Error> {
        if data.len() != self.pool.len() {
            return Err(Error::BadSize);
        }
        self.pool.copy_from_slice(data);
        Ok(())
    }

    fn copy_out(&self, index: usize, buf: &mut [u8]) {
        let at = OFFSETS[index];
        let n = TABLE[index].cap().min(buf.len());
        buf[..n].copy_from_slice(&self.pool[at..at + n]);
    }

    // Typed accessors. The engine and the connector FSM only ever need
    // these; the raw byte interface above is what ChangeConfiguration and
    // snapshots go through.

    pub fn get_int(&self, key: &str) -> Result<i32, Error> {
        let mut buf = [0u8; 4];
        self.get(key, &mut buf)?;
        Ok(i32::from_le_bytes(buf))
    }

    pub fn get_csl(&self, key: &str) -> Result<u32, Error> {
        let mut buf = [0u8; 4];
        self.get(key, &mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    pub fn get_bool(&self, key: &str) -> Result<bool, Error> {
        let mut buf = [0u8; 1];
        self.get(key, &mut buf)?;
        Ok(buf[0] != 0)
    }

    pub fn get_str(&self, key: &str) -> Result<String, Error> {
        let mut buf = vec![0u8; Self::size(key)];
        self.get(key, &mut buf)?;
        let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
        Ok(String::from_utf8_lossy(&buf[..end]).into_owned())
    }

    pub fn set_int(&mut self, key: &str, value: i32) -> Result<(), Error> {
        self.set(key, &value.to_le_bytes())
    }

    pub fn set_csl(&mut self, key: &str, value: u32) -> Result<(), Error> {
        self.set(key, &value.to_le_bytes())
    }

    pub fn set_bool(&mut self, key: &str, value: bool) -> Result<(), Error> {
        self.set(key, &[value as u8])
    }

    pub fn set_str(&mut self, key: &str, value: &str) -> Result<(), Error> {
        self.set(key, value.as_bytes())
    }

    /// Renders a value for GetConfiguration ("true"/"false", decimal, or the
    /// raw string).
    pub fn value_string(&self, key: &str) -> Result<String, Error> {
        match Self::data_type(key).ok_or(Error::UnknownKey)? {
            DataType::Bool => Ok(if self.get_bool(key)? { "true" } else { "false" }.into()),
            DataType::Int => Ok(self.get_int(key)?.to_string()),
            DataType::Csl => Ok(self.get_csl(key)?.to_string()),
            DataType::Str => self.get_str(key),
        }
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self::new()
    }
}
