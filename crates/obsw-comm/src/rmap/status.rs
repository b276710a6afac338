//! Reply status codes (ECSS-E-ST-50-52C table 5-3).

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RmapReplyStatus {
    CommandExecutedSuccessfully = 0,
    GeneralErrorCode = 1,
    UnusedRmapPacketType = 2,
    InvalidKey = 3,
    InvalidDataCrc = 4,
    EarlyEop = 5,
    TooMuchData = 6,
    Eep = 7,
    VerifyBufferOverrun = 9,
    RmapCommandNotImplemented = 10,
    RmwDataLengthError = 11,
    InvalidTargetLogicalAddress = 12,
    Unknown = 255,
}

impl From<u8> for RmapReplyStatus {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::CommandExecutedSuccessfully,
            1 => Self::GeneralErrorCode,
            2 => Self::UnusedRmapPacketType,
            3 => Self::InvalidKey,
            4 => Self::InvalidDataCrc,
            5 => Self::EarlyEop,
            6 => Self::TooMuchData,
            7 => Self::Eep,
            9 => Self::VerifyBufferOverrun,
            10 => Self::RmapCommandNotImplemented,
            11 => Self::RmwDataLengthError,
            12 => Self::InvalidTargetLogicalAddress,
            _ => Self::Unknown,
        }
    }
}

impl std::fmt::Display for RmapReplyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::CommandExecutedSuccessfully => "command executed successfully",
            Self::GeneralErrorCode => "general error",
            Self::UnusedRmapPacketType => "unused packet type",
            Self::InvalidKey => "invalid key",
            Self::InvalidDataCrc => "invalid data CRC",
            Self::EarlyEop => "early EOP",
            Self::TooMuchData => "too much data",
            Self::Eep => "EEP",
            Self::VerifyBufferOverrun => "verify buffer overrun",
            Self::RmapCommandNotImplemented => "command not implemented",
            Self::RmwDataLengthError => "RMW data length error",
            Self::InvalidTargetLogicalAddress => "invalid target logical address",
            Self::Unknown => "unknown",
        };
        write!(f, "{} ({})", text, *self as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip() {
        for code in [0u8, 1, 2, 3, 4, 5, 6, 7, 9, 10, 11, 12] {
            assert_eq!(RmapReplyStatus::from(code) as u8, code);
        }
        assert_eq!(RmapReplyStatus::from(8), RmapReplyStatus::Unknown);
        assert_eq!(RmapReplyStatus::from(200), RmapReplyStatus::Unknown);
    }
}
