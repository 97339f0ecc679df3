// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn uuid_mint_produces_distinct_prefixed_ids() {
    let mint = UuidMint;
    let a = mint.run_id();
    let b = mint.run_id();
    assert_ne!(a, b);
    assert!(a.as_str().starts_with("r-"));
    assert!(mint.inst_id().as_str().starts_with("i-"));
    assert!(mint.adhoc_job_id().as_str().starts_with("adhoc-"));
}

#[test]
fn counting_mint_numbers_each_kind_independently() {
    let mint = CountingMint::new();
    assert_eq!(mint.run_id(), "r0");
    assert_eq!(mint.run_id(), "r1");
    assert_eq!(mint.inst_id(), "i0");
    assert_eq!(mint.adhoc_job_id(), "adhoc0");
    assert_eq!(mint.run_id(), "r2");
}

#[test]
fn counting_mint_clones_share_counters() {
    let mint = CountingMint::new();
    let other = mint.clone();
    assert_eq!(mint.run_id(), "r0");
    assert_eq!(other.run_id(), "r1");
}

#[test]
fn short_clips_to_the_column_width() {
    let id = RunId::new("r-0123456789abcdef");
    assert_eq!(id.short(8), "r-012345");
    assert_eq!(id.short(64), "r-0123456789abcdef");
}

#[test]
fn ids_compare_with_plain_strings() {
    let id = JobId::new("backup");
    assert_eq!(id, "backup");
    assert_eq!(id.as_str(), "backup");
    assert_eq!(id.to_string(), "backup");
}

#[test]
fn ids_serialize_as_bare_strings() {
    let id = InstId::new("i7");
    assert_eq!(serde_json::to_string(&id).unwrap(), "\"i7\"");
    let back: InstId = serde_json::from_str("\"i7\"").unwrap();
    assert_eq!(back, id);
}
