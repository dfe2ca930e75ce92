//! TON account addresses.
//!
//! Accepts the 48-character user-friendly form (standard or URL-safe base64)
//! and the raw `<workchain>:<hex>` form.

use std::fmt;
use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use crc::{CRC_16_XMODEM, Crc};

use crate::error::AddressError;

const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

const TAG_BOUNCEABLE: u8 = 0x11;
const TAG_NON_BOUNCEABLE: u8 = 0x51;
const TAG_TEST_ONLY: u8 = 0x80;

const FRIENDLY_LEN: usize = 48;
const DECODED_LEN: usize = 36;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    workchain: i8,
    hash: [u8; 32],
    bounceable: bool,
    test_only: bool,
}

impl Address {
    pub fn new(workchain: i8, hash: [u8; 32], bounceable: bool) -> Self {
        Self {
            workchain,
            hash,
            bounceable,
            test_only: false,
        }
    }

    pub fn workchain(&self) -> i8 {
        self.workchain
    }

    pub fn hash_part(&self) -> &[u8; 32] {
        &self.hash
    }

    /// Whether transfers to this address should bounce back on failure.
    pub fn is_bounceable(&self) -> bool {
        self.bounceable
    }

    pub fn is_test_only(&self) -> bool {
        self.test_only
    }

    /// `<workchain>:<hex>` form, which carries no flags.
    pub fn to_raw(&self) -> String {
        format!("{}:{}", self.workchain, hex::encode(self.hash))
    }

    fn parse_friendly(s: &str) -> Result<Self, AddressError> {
        if s.len() != FRIENDLY_LEN {
            return Err(AddressError::InvalidLength(s.len()));
        }

        let engine = if s.contains(['-', '_']) { &URL_SAFE } else { &STANDARD };
        let bytes = engine
            .decode(s)
            .map_err(|e| AddressError::InvalidEncoding(e.to_string()))?;
        if bytes.len() != DECODED_LEN {
            return Err(AddressError::InvalidLength(bytes.len()));
        }

        let expected = u16::from_be_bytes([bytes[34], bytes[35]]);
        if CRC16.checksum(&bytes[..34]) != expected {
            return Err(AddressError::ChecksumMismatch);
        }

        let tag = bytes[0];
        let test_only = tag & TAG_TEST_ONLY != 0;
        let bounceable = match tag & !TAG_TEST_ONLY {
            TAG_BOUNCEABLE => true,
            TAG_NON_BOUNCEABLE => false,
            _ => return Err(AddressError::UnknownTag(tag)),
        };

        let mut hash = [0u8; 32];
        hash.copy_from_slice(&bytes[2..34]);

        Ok(Self {
            workchain: bytes[1] as i8,
            hash,
            bounceable,
            test_only,
        })
    }

    fn parse_raw(s: &str) -> Result<Self, AddressError> {
        let (workchain, hash_hex) = s
            .split_once(':')
            .ok_or_else(|| AddressError::InvalidRaw(s.to_string()))?;
        let workchain = workchain
            .parse::<i8>()
            .map_err(|_| AddressError::InvalidRaw(s.to_string()))?;

        let mut hash = [0u8; 32];
        hex::decode_to_slice(hash_hex, &mut hash)
            .map_err(|e| AddressError::InvalidRaw(format!("{s}: {e}")))?;

        Ok(Self::new(workchain, hash, true))
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.contains(':') {
            Self::parse_raw(s)
        } else {
            Self::parse_friendly(s)
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tag = if self.bounceable {
            TAG_BOUNCEABLE
        } else {
            TAG_NON_BOUNCEABLE
        };
        if self.test_only {
            tag |= TAG_TEST_ONLY;
        }

        let mut bytes = [0u8; DECODED_LEN];
        bytes[0] = tag;
        bytes[1] = self.workchain as u8;
        bytes[2..34].copy_from_slice(&self.hash);
        let crc = CRC16.checksum(&bytes[..34]);
        bytes[34..].copy_from_slice(&crc.to_be_bytes());

        f.write_str(&URL_SAFE.encode(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOUNCEABLE: &str = "EQAAAQIDBAUGBwgJCgsMDQ4PEBESExQVFhcYGRobHB0eHx2j";
    const NON_BOUNCEABLE: &str = "UQAAAQIDBAUGBwgJCgsMDQ4PEBESExQVFhcYGRobHB0eH0Bm";
    const MASTERCHAIN: &str = "Ef-rq6urq6urq6urq6urq6urq6urq6urq6urq6urq6urqzps";

    fn sequential_hash() -> [u8; 32] {
        let mut hash = [0u8; 32];
        for (i, byte) in hash.iter_mut().enumerate() {
            *byte = i as u8;
        }
        hash
    }

    #[test]
    fn test_parse_bounceable_flag_from_tag() {
        let bounceable: Address = BOUNCEABLE.parse().unwrap();
        assert!(bounceable.is_bounceable());
        assert_eq!(bounceable.workchain(), 0);
        assert_eq!(bounceable.hash_part(), &sequential_hash());

        let plain: Address = NON_BOUNCEABLE.parse().unwrap();
        assert!(!plain.is_bounceable());
        assert_eq!(plain.hash_part(), bounceable.hash_part());
    }

    #[test]
    fn test_parse_both_base64_alphabets() {
        let url_safe: Address = MASTERCHAIN.parse().unwrap();
        let standard: Address = MASTERCHAIN.replace('-', "+").parse().unwrap();
        assert_eq!(url_safe, standard);
        assert_eq!(url_safe.workchain(), -1);
    }

    #[test]
    fn test_display_is_canonical_url_safe() {
        let address: Address = MASTERCHAIN.replace('-', "+").parse().unwrap();
        assert_eq!(address.to_string(), MASTERCHAIN);
        assert_eq!(
            Address::new(0, sequential_hash(), false).to_string(),
            NON_BOUNCEABLE
        );
    }

    #[test]
    fn test_test_only_flag() {
        let address: Address = "kQAAAQIDBAUGBwgJCgsMDQ4PEBESExQVFhcYGRobHB0eH6Yp"
            .parse()
            .unwrap();
        assert!(address.is_test_only());
        assert!(address.is_bounceable());
    }

    #[test]
    fn test_checksum_mismatch() {
        let corrupted = format!("{}AA", &BOUNCEABLE[..46]);
        assert_eq!(
            corrupted.parse::<Address>(),
            Err(AddressError::ChecksumMismatch)
        );
    }

    #[test]
    fn test_rejects_garbage() {
        assert_eq!(
            "not-an-address".parse::<Address>(),
            Err(AddressError::InvalidLength(14))
        );
        assert!(matches!(
            "!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!".parse::<Address>(),
            Err(AddressError::InvalidEncoding(_))
        ));
    }

    #[test]
    fn test_parse_raw_form() {
        let raw = "0:000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";
        let address: Address = raw.parse().unwrap();
        assert!(address.is_bounceable());
        assert_eq!(address.to_raw(), raw);
        assert_eq!(address.to_string(), BOUNCEABLE);

        assert!(matches!(
            "0:abcd".parse::<Address>(),
            Err(AddressError::InvalidRaw(_))
        ));
        assert!(matches!(
            "x:000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f"
                .parse::<Address>(),
            Err(AddressError::InvalidRaw(_))
        ));
    }
}
