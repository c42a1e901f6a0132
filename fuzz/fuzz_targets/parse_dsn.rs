//! Fuzz target for libpq-style connection string parsing.
//!
//! Parsing must never panic, and anything that parses must survive a
//! render/parse round trip unchanged.

#![no_main]

use dbpool_driver::ConnectionParams;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(dsn) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(params) = ConnectionParams::from_dsn(dsn) {
        let rendered = params.to_dsn();
        let reparsed = ConnectionParams::from_dsn(&rendered)
            .unwrap_or_else(|e| panic!("rendered DSN {rendered:?} failed to parse: {e}"));
        assert_eq!(params, reparsed);

        // Port extraction only reports errors.
        let _ = params.port();
    }
});
