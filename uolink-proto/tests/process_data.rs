//! Loopback tests for the ProcessData envelope: a test-side mirror plays
//! the HSM, swapping the request flag for `0xF1` and incrementing the
//! nonce words, so build → parse can be exercised end to end.

use uolink_crypto::cbc::{self, CbcError};
use uolink_crypto::padding::PadError;
use uolink_crypto::{BitString, Padding};
use uolink_proto::envelope::ResponseEnvelope;
use uolink_proto::process_data::{self, ParseError, ProcessDataRequest, RequestType, REQUEST_FLAG};
use uolink_proto::nonce;

const ZERO_IV: [u8; 16] = [0u8; 16];

fn random_key() -> [u8; 32] {
    uolink_crypto::random_key()
}

fn envelope(result: String) -> ResponseEnvelope {
    serde_json::from_value(serde_json::json!({
        "status": "9000",
        "statusdetail": "(OK)SW_STAT_OK",
        "function": "ProcessData",
        "result": result,
        "version": "1.0",
    }))
    .expect("envelope decodes")
}

/// Decrypt a built request, then re-encrypt it the way the service replies.
fn mirror(wire: &str, enc_key: &[u8; 32], mac_key: &[u8; 32]) -> ResponseEnvelope {
    let mut parts = wire.splitn(3, '_');
    assert_eq!(parts.next(), Some("Packet0"));
    let req_type = parts.next().expect("request type token");
    let body = hex::decode(parts.next().expect("hex body")).expect("valid hex");

    let plain_len = usize::from(u16::from_be_bytes([body[0], body[1]]));
    let ct = &body[2 + plain_len..body.len() - 16];
    let pdin = cbc::decrypt(enc_key, &ZERO_IV, ct, Padding::Pkcs7).expect("request decrypts");
    assert_eq!(pdin[0], REQUEST_FLAG, "request flag");

    let mut frame = vec![0xf1];
    frame.extend_from_slice(&pdin[1..5]); // echoed UOid
    let mangled = nonce::mangle(&BitString::from_bytes(&pdin[5..13]));
    frame.extend_from_slice(&mangled.to_bytes());
    frame.extend_from_slice(&pdin[13..]); // echo userData as protectedData

    let resp_ct = cbc::encrypt(enc_key, &ZERO_IV, &frame, Padding::Pkcs7).expect("reply encrypts");
    let resp_tag = cbc::cbc_mac(mac_key, &resp_ct).expect("reply macs");

    let mut resp_body = vec![0x00, 0x00];
    resp_body.extend_from_slice(&resp_ct);
    resp_body.extend_from_slice(&resp_tag);
    envelope(format!("{}_{}", hex::encode(resp_body), req_type))
}

#[test]
fn round_trip_random_inputs() {
    for len in [0usize, 1, 5, 16, 33, 255] {
        let enc_key = random_key();
        let mac_key = random_key();
        let mut user_data = vec![0u8; len];
        uolink_crypto::random_bytes(&mut user_data);

        let req = ProcessDataRequest::new(0xdead_beef, RequestType::PlainAes, user_data.clone());
        let built = process_data::build(&req, &enc_key, &mac_key).unwrap();
        let resp = process_data::parse(&mirror(&built.wire, &enc_key, &mac_key), &enc_key, &mac_key)
            .unwrap();

        assert_eq!(resp.status, 0x9000);
        assert_eq!(resp.uo_id, 0xdead_beef, "echoed UOid");
        assert_eq!(resp.nonce, built.nonce, "demangled nonce matches the request");
        assert_eq!(resp.protected_data, user_data, "payload survives the loop");
        assert!(resp.plain_data.is_empty());
    }
}

#[test]
fn known_vector_parses_to_empty_payload() {
    let zero = [0u8; 32];
    let req = ProcessDataRequest {
        uo_id: 0xee01,
        req_type: RequestType::PlainAes,
        plain_data: Vec::new(),
        user_data: Vec::new(),
        nonce: Some(*b"\xaa\xaa\xbb\xbb\xcc\xcc\xdd\xdd"),
    };
    let built = process_data::build(&req, &zero, &zero).unwrap();
    let resp = process_data::parse(&mirror(&built.wire, &zero, &zero), &zero, &zero).unwrap();
    assert_eq!(resp.status, 0x9000);
    assert!(resp.protected_data.is_empty());
    assert_eq!(&resp.nonce, b"\xaa\xaa\xbb\xbb\xcc\xcc\xdd\xdd");
}

#[test]
fn any_single_bit_flip_fails_the_mac() {
    let enc_key = random_key();
    let mac_key = random_key();
    let req = ProcessDataRequest::new(7, RequestType::PlainAes, vec![0x42; 20]);
    let built = process_data::build(&req, &enc_key, &mac_key).unwrap();
    let env = mirror(&built.wire, &enc_key, &mac_key);
    let hex_body = env.result.as_ref().unwrap().as_str().unwrap()
        .split('_').next().unwrap().to_string();
    let body = hex::decode(&hex_body).unwrap();

    // Flip one bit per byte across CT and TAG; every position must fail.
    for i in 2..body.len() {
        let mut tampered = body.clone();
        tampered[i] ^= 1 << (i % 8);
        let env = envelope(format!("{}_PLAINAES", hex::encode(tampered)));
        assert_eq!(
            process_data::parse(&env, &enc_key, &mac_key),
            Err(ParseError::MacMismatch),
            "flip at byte {i}"
        );
    }
}

#[test]
fn bad_padding_behind_a_valid_mac_is_a_padding_error() {
    let enc_key = random_key();
    let mac_key = random_key();

    // A ciphertext the parser will accept at the MAC stage but whose
    // decryption carries no valid PKCS#7 tail.
    let garbage_ct = cbc::encrypt(&enc_key, &ZERO_IV, &[0x11u8; 16], Padding::None).unwrap();
    let tag = cbc::cbc_mac(&mac_key, &garbage_ct).unwrap();
    let mut body = vec![0x00, 0x00];
    body.extend_from_slice(&garbage_ct);
    body.extend_from_slice(&tag);

    let got = process_data::parse(&envelope(format!("{}_X", hex::encode(body))), &enc_key, &mac_key);
    match got {
        Err(ParseError::Crypto(CbcError::Padding(PadError::Length | PadError::Content))) => {}
        other => panic!("expected padding failure, got {other:?}"),
    }
}

#[test]
fn mac_is_checked_before_padding() {
    let enc_key = random_key();
    let mac_key = random_key();

    // Both invariants broken: wrong tag AND bad padding. The MAC error
    // must win; decryption never runs on unauthenticated data.
    let garbage_ct = cbc::encrypt(&enc_key, &ZERO_IV, &[0x11u8; 16], Padding::None).unwrap();
    let mut body = vec![0x00, 0x00];
    body.extend_from_slice(&garbage_ct);
    body.extend_from_slice(&[0u8; 16]);

    assert_eq!(
        process_data::parse(&envelope(format!("{}_X", hex::encode(body))), &enc_key, &mac_key),
        Err(ParseError::MacMismatch)
    );
}

#[test]
fn wrong_response_flag_is_corrupt() {
    let enc_key = random_key();
    let mac_key = random_key();

    // A "reply" whose frame still carries the request flag.
    let mut frame = vec![REQUEST_FLAG];
    frame.extend_from_slice(&[0, 0, 0, 9]);
    frame.extend_from_slice(&[0u8; 8]);
    let ct = cbc::encrypt(&enc_key, &ZERO_IV, &frame, Padding::Pkcs7).unwrap();
    let tag = cbc::cbc_mac(&mac_key, &ct).unwrap();
    let mut body = vec![0x00, 0x00];
    body.extend_from_slice(&ct);
    body.extend_from_slice(&tag);

    assert_eq!(
        process_data::parse(&envelope(format!("{}_X", hex::encode(body))), &enc_key, &mac_key),
        Err(ParseError::FlagMismatch { found: REQUEST_FLAG })
    );
}

#[test]
fn plain_data_is_carried_outside_the_ciphertext() {
    let enc_key = random_key();
    let mac_key = random_key();
    let req = ProcessDataRequest {
        uo_id: 1,
        req_type: RequestType::PlainAes,
        plain_data: vec![0xca, 0xfe],
        user_data: Vec::new(),
        nonce: None,
    };
    let built = process_data::build(&req, &enc_key, &mac_key).unwrap();
    let hex_body = built.wire.splitn(3, '_').nth(2).unwrap();
    assert!(hex_body.starts_with("0002cafe"), "16-bit length then the bytes");
}
