// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use snapsight::ocr::clean_ocr_text;

#[derive(Arbitrary, Debug)]
struct Input<'a> {
    raw: &'a str,
    min_line_len: u8,
}

fuzz_target!(|input: Input<'_>| {
    let min = input.min_line_len as usize;
    let cleaned = clean_ocr_text(input.raw, min);

    assert!(!cleaned.contains('\n'));
    assert_eq!(cleaned, cleaned.trim());
    // cleaning is idempotent once everything is on one line
    if cleaned.chars().count() > min {
        assert_eq!(clean_ocr_text(&cleaned, min), cleaned);
    }
});
