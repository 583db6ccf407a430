// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use bytes::Bytes;
use eses_engine::{
    engine::{
        classifier::{EnclosureError, SideEffect, classify, handle},
        retry::{RetryContext, RetryDecision, decide},
        transport::ScsiCompletion,
        validator::validate,
    },
    models::{opcode::Operation, status::EnclosureStatus},
};
use hex_literal::hex;

const CTX: RetryContext = RetryContext {
    max_retry: 3,
    enclosure_ready: true,
    fw_bytes: 0,
};

// configuration page header only, generation 0x0003
const CONFIG_HDR: [u8; 8] = hex!("01 00 00 04 00 00 00 03");
// download status page, generation 0x0003
const DL_STATUS: [u8; 24] = hex!(
    "0E 00 00 14 00 00 00 03"
    "00 01 10 00 00 00 00 00 00 00 00 00 00 00 00 00"
);

fn sense(key: u8, asc: u8, ascq: u8) -> Bytes {
    let mut s = [0u8; 18];
    s[0] = 0x70;
    s[2] = key;
    s[7] = 10;
    s[12] = asc;
    s[13] = ascq;
    Bytes::copy_from_slice(&s)
}

#[test]
fn test_validate_is_repeatable() {
    let c = ScsiCompletion::good(1, Bytes::from_static(&DL_STATUS));
    let run = || validate(Operation::GetDownloadStatus, Some(0x0E), &c.outcome(), &c.data_in, 4096, Some(3));
    let first = run();
    assert_eq!(first.status, EnclosureStatus::Ok);
    for _ in 0..4 {
        assert_eq!(run(), first);
    }
}

#[test]
fn test_configuration_page_ignores_generation() {
    let c = ScsiCompletion::good(1, Bytes::from_static(&CONFIG_HDR));
    let v = validate(Operation::GetConfiguration, Some(0x01), &c.outcome(), &c.data_in, 4096, None);
    assert_eq!(v.status, EnclosureStatus::Ok);
}

#[test]
fn test_stale_generation_marks_config_unknown() {
    let c = ScsiCompletion::good(1, Bytes::from_static(&DL_STATUS));
    for held in [None, Some(2), Some(4)] {
        let v = validate(Operation::GetDownloadStatus, Some(0x0E), &c.outcome(), &c.data_in, 4096, held);
        assert_eq!(v.status, EnclosureStatus::ConfigurationUnknown, "held {held:?}");
        assert_eq!(v.effect, SideEffect::MarkConfigUnknown);
    }
}

#[test]
fn test_allocation_smaller_than_page() {
    let c = ScsiCompletion::good(1, Bytes::from_static(&DL_STATUS));
    let v = validate(Operation::GetDownloadStatus, Some(0x0E), &c.outcome(), &c.data_in, 16, Some(3));
    assert_eq!(v.status, EnclosureStatus::AllocatedMemoryInsufficient);
}

#[test]
fn test_busy_page_in_place_of_expected() {
    let c = ScsiCompletion::good(1, Bytes::from_static(&hex!("09 00 00 04 00 00 00 00")));
    let v = validate(Operation::GetStatus, Some(0x02), &c.outcome(), &c.data_in, 4096, Some(0));
    assert_eq!(v.status, EnclosureStatus::Busy);
}

#[test]
fn test_check_condition_is_classified() {
    let c = ScsiCompletion::check_condition(1, sense(0x06, 0x29, 0x00));
    let v = validate(Operation::GetStatus, Some(0x02), &c.outcome(), &c.data_in, 4096, Some(0));
    assert_eq!(v.status, EnclosureStatus::CmdFailed);
    assert_eq!(v.effect, SideEffect::MarkConfigUnknown);
    assert_eq!(v.sense.map(|t| (t.sense_key, t.asc)), Some((0x06, 0x29)));
}

#[test]
fn test_unsupported_function_per_operation() {
    let err = classify(0x05, 0x35, 0x01);
    assert_eq!(err, EnclosureError::UnsupportedEnclosureFunction);
    assert_eq!(
        handle(Operation::GetEmcSpecificStatus, err),
        (EnclosureStatus::UnsupportedPageHandled, SideEffect::RunFallbackMapping)
    );
    assert_ne!(handle(Operation::GetStatus, err).1, SideEffect::RunFallbackMapping);
}

#[test]
fn test_retry_never_exceeds_ceiling() {
    let statuses = [
        EnclosureStatus::Busy,
        EnclosureStatus::CdbRequestFailed,
        EnclosureStatus::PageInvalid,
        EnclosureStatus::CmdFailed,
    ];
    for op in [Operation::GetStatus, Operation::GetConfiguration, Operation::SetEnclosureControl] {
        for status in statuses {
            let last = decide(op, status, CTX.max_retry - 1, &CTX);
            assert_ne!(last.decision, RetryDecision::Retry, "{op} {status}");
            assert_eq!(decide(op, status, CTX.max_retry - 1, &CTX), last);
        }
    }
}

#[test]
fn test_download_retried_only_before_first_chunk() {
    let first = decide(Operation::DownloadFirmware, EnclosureStatus::PageInvalid, 0, &CTX);
    assert_eq!(first.decision, RetryDecision::Retry);

    let after = RetryContext { fw_bytes: 4072, ..CTX };
    let later = decide(Operation::DownloadFirmware, EnclosureStatus::PageInvalid, 0, &after);
    assert_eq!(later.decision, RetryDecision::NoAction);
}
