//! Fuzz testing for the request admission parsers.
//!
//! Feeds arbitrary input to the functions that see raw request data before
//! any authentication happens:
//!
//! - Route classification of the request path
//! - Login redirect construction
//! - `Cookie` header parsing and session token lookup
//! - `CidrRange` parsing
//!
//! None of them may panic, and a redirect `Location` must always stay on the
//! login page.
//!
//! # Running the Fuzz Tests
//!
//! ```bash
//! cargo +nightly install cargo-fuzz
//! cargo +nightly fuzz run fuzz_admission -- -max_total_time=60
//! ```

#![no_main]

use admission_gate::middleware::ip::CidrRange;
use admission_gate::middleware::{RouteTable, login_redirect_location};
use admission_gate::session::{SessionVerifier, parse_cookie_header};
use axum::http::{HeaderMap, HeaderValue, header};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };

    let _ = RouteTable::default().classify(s);

    let location = login_redirect_location(s);
    let callback = location
        .strip_prefix("/login?callbackUrl=")
        .expect("redirect left the login page");
    assert!(!callback.contains(['/', '?', '&', '#']));

    for (name, value) in parse_cookie_header(s) {
        assert!(!name.is_empty());
        let _ = value;
    }

    let _ = CidrRange::parse(s);

    if let Ok(value) = HeaderValue::from_str(s) {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, value);
        let verifier = SessionVerifier::new(
            "fuzzing-secret-fuzzing-secret-0000",
            vec!["session-token".to_string()],
        );
        let _ = verifier.session_from_headers(&headers);
    }
});
