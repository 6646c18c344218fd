// SPDX-License-Identifier: MIT

//! Tester pass/fail detection by substring: reads a specific
//! field (`tests_passed: true/false`) from the JSON-encoded result payload.
//! Both compact and spaced forms are accepted; any other shape is a failure.

const COMPACT_PASS: &str = "\"tests_passed\":true";
const SPACED_PASS: &str = "\"tests_passed\": true";

pub(crate) fn tests_passed(payload: &str) -> bool {
    payload.contains(COMPACT_PASS) || payload.contains(SPACED_PASS)
}
