use std::fmt::Display;

/// Reason bitmask following a NAK sentinel.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct NakReasons(u8);

impl NakReasons {
    pub const COMMAND_NOT_SUPPORTED: NakReasons = NakReasons(1 << 0);
    pub const TIMEOUT: NakReasons = NakReasons(1 << 1);
    pub const UNDEFINED: NakReasons = NakReasons(1 << 2);
    pub const INTERFACE_ERROR: NakReasons = NakReasons(1 << 3);
    pub const BYTE_COUNT_ERROR: NakReasons = NakReasons(1 << 4);
    pub const CHECKSUM_ERROR: NakReasons = NakReasons(1 << 5);
    pub const PROTOCOL_ERROR: NakReasons = NakReasons(1 << 6);

    const DESCRIPTIONS: [(NakReasons, &str); 7] = [
        (Self::COMMAND_NOT_SUPPORTED, "command not supported"),
        (Self::TIMEOUT, "timeout"),
        (Self::UNDEFINED, "undefined error"),
        (Self::INTERFACE_ERROR, "interface error"),
        (Self::BYTE_COUNT_ERROR, "byte count error"),
        (Self::CHECKSUM_ERROR, "checksum error"),
        (Self::PROTOCOL_ERROR, "protocol error"),
    ];

    pub const fn from_bits(bits: u8) -> NakReasons {
        NakReasons(bits)
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn contains(&self, other: NakReasons) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Human readable description of every set bit, lowest bit first.
    /// Bit 7 has no assigned meaning and is reported as unknown.
    pub fn descriptions(&self) -> Vec<&'static str> {
        let mut reasons: Vec<&'static str> = Self::DESCRIPTIONS
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, text)| *text)
            .collect();
        if self.0 & 0x80 != 0 {
            reasons.push("unknown reason");
        }
        reasons
    }
}

impl std::ops::BitOr for NakReasons {
    type Output = NakReasons;

    fn bitor(self, rhs: NakReasons) -> NakReasons {
        NakReasons(self.0 | rhs.0)
    }
}

impl Display for NakReasons {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return write!(f, "no reason given");
        }
        write!(f, "{}", self.descriptions().join(", "))
    }
}

#[cfg(test)]
mod test {
    use super::NakReasons;

    #[test]
    fn decodes_reason_list() {
        let reasons = NakReasons::from_bits(0b0010_0001);
        assert_eq!(
            reasons.descriptions(),
            vec!["command not supported", "checksum error"]
        );
        assert_eq!(reasons.to_string(), "command not supported, checksum error");
    }

    #[test]
    fn combines_flags() {
        let reasons = NakReasons::BYTE_COUNT_ERROR | NakReasons::PROTOCOL_ERROR;
        assert_eq!(reasons.bits(), 0x50);
        assert!(reasons.contains(NakReasons::PROTOCOL_ERROR));
        assert!(!reasons.contains(NakReasons::TIMEOUT));
    }

    #[test]
    fn empty_and_unknown() {
        assert_eq!(NakReasons::default().to_string(), "no reason given");
        assert_eq!(NakReasons::from_bits(0x80).descriptions(), vec!["unknown reason"]);
    }
}
