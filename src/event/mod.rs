/// Price lookup, fingerprint and publish for one index
pub mod index_fingerprint;
