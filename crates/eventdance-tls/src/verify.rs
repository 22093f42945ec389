//! Peer verification bitfield, `spec.md` §4.C "Peer verification": a
//! basic chain check plus a per-certificate validity window check,
//! reported as advisory bits rather than a hard pass/fail — the
//! application decides whether any of them warrant tearing the
//! connection down.

use bitflags::bitflags;

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct VerifyResult: u16 {
        const OK                  = 0b0000_0000_0001;
        const NO_CERT             = 0b0000_0000_0010;
        const INVALID             = 0b0000_0000_0100;
        const REVOKED             = 0b0000_0000_1000;
        const SIGNER_NOT_FOUND    = 0b0000_0001_0000;
        const SIGNER_NOT_CA       = 0b0000_0010_0000;
        const INSECURE_ALGORITHM  = 0b0000_0100_0000;
        const EXPIRED             = 0b0000_1000_0000;
        const NOT_ACTIVATED       = 0b0001_0000_0000;
    }
}

impl VerifyResult {
    pub fn is_clean(self) -> bool {
        self == VerifyResult::OK
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_is_the_only_clean_result() {
        assert!(VerifyResult::OK.is_clean());
        assert!(!(VerifyResult::OK | VerifyResult::EXPIRED).is_clean());
    }

    #[test]
    fn bits_combine_for_multiple_findings() {
        let found = VerifyResult::EXPIRED | VerifyResult::SIGNER_NOT_FOUND;
        assert!(found.contains(VerifyResult::EXPIRED));
        assert!(found.contains(VerifyResult::SIGNER_NOT_FOUND));
        assert!(!found.contains(VerifyResult::REVOKED));
    }
}
