/// Two-digit fingerprint of a quoted price
pub mod fingerprint;
