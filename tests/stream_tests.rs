//! tests/stream_tests.rs
//! End-to-end update / do-final behavior of a cipher context

mod common;

use aes_stream_core::{
    Algorithm, CipherContextBuilder, CipherError, Direction, Padding, SharedEngine, StreamState,
};
use common::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

// ─────────────────────────────────────────────────────────────────────────────
// Round trips
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn roundtrip_every_mode_and_length() {
    for &(algorithm, padding) in ALL_MODES {
        for &len in ROUNDTRIP_LENGTHS {
            let plaintext = test_plaintext(len);
            let encrypted = one_shot(algorithm, Direction::Encrypt, padding, &plaintext);

            if !accepts_len(algorithm, padding, len) {
                assert!(
                    matches!(encrypted, Err(CipherError::BadLength(_))),
                    "{algorithm} {padding:?} len {len} should be rejected"
                );
                continue;
            }

            let ciphertext = encrypted.unwrap();
            let decrypted = one_shot(algorithm, Direction::Decrypt, padding, &ciphertext).unwrap();
            assert_eq!(decrypted, plaintext, "{algorithm} {padding:?} len {len}");
        }
    }
}

#[test]
fn chunking_never_changes_the_output() {
    let mut rng = StdRng::seed_from_u64(0x5EED);

    for _ in 0..300 {
        let &(algorithm, padding) = &ALL_MODES[rng.random_range(0..ALL_MODES.len())];
        let mut len = rng.random_range(0..300);
        if !accepts_len(algorithm, padding, len) {
            len = (len / 16 + 1) * 16;
        }
        let plaintext = test_plaintext(len);
        let reference = one_shot(algorithm, Direction::Encrypt, padding, &plaintext).unwrap();

        let splits = random_splits(&mut rng, len);
        let mut ctx = context(algorithm, Direction::Encrypt, padding);
        let encrypted = drive(&mut ctx, &plaintext, &splits).unwrap();
        assert_eq!(
            encrypted.output, reference,
            "{algorithm} {padding:?} len {len} splits {splits:?}"
        );

        let splits = random_splits(&mut rng, reference.len());
        let mut ctx = context(algorithm, Direction::Decrypt, padding);
        let decrypted = drive(&mut ctx, &reference, &splits).unwrap();
        assert_eq!(
            decrypted.output, plaintext,
            "{algorithm} {padding:?} len {len} decrypt splits {splits:?}"
        );
    }
}

#[test]
fn byte_at_a_time_matches_one_shot() {
    for &(algorithm, padding) in ALL_MODES {
        let plaintext = test_plaintext(130);
        let len = if accepts_len(algorithm, padding, 130) { 130 } else { 128 };
        let plaintext = &plaintext[..len];

        let reference = one_shot(algorithm, Direction::Encrypt, padding, plaintext).unwrap();
        let mut ctx = context(algorithm, Direction::Encrypt, padding);
        let driven = drive(&mut ctx, plaintext, &vec![1; len]).unwrap();
        assert_eq!(driven.output, reference, "{algorithm} {padding:?}");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Padding
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn padded_ciphertext_length() {
    for len in [0usize, 1, 15, 16, 17, 31, 32, 100] {
        let ciphertext =
            one_shot(Algorithm::Cbc, Direction::Encrypt, Padding::Pkcs7, &test_plaintext(len))
                .unwrap();
        assert_eq!(ciphertext.len(), (len / 16 + 1) * 16, "len {len}");
    }
}

#[test]
fn aligned_message_gets_a_full_pad_block() {
    let plaintext = test_plaintext(32);
    let ciphertext =
        one_shot(Algorithm::Ecb, Direction::Encrypt, Padding::Pkcs7, &plaintext).unwrap();
    let raw = one_shot(Algorithm::Ecb, Direction::Decrypt, Padding::None, &ciphertext).unwrap();
    assert_eq!(&raw[..32], &plaintext[..]);
    assert_eq!(&raw[32..], &[16u8; 16]);
}

#[test]
fn tampered_padding_is_rejected_and_terminal() {
    let plaintext = test_plaintext(20);
    let mut ciphertext =
        one_shot(Algorithm::Cbc, Direction::Encrypt, Padding::Pkcs7, &plaintext).unwrap();
    // flips the last plaintext byte of block two: pad 12 becomes 13
    ciphertext[15] ^= 0x01;

    let mut ctx = context(Algorithm::Cbc, Direction::Decrypt, Padding::Pkcs7);
    let mut dst = vec![0u8; 32];
    assert_eq!(ctx.do_final(&ciphertext, &mut dst), Err(CipherError::NotValid));
    assert_eq!(ctx.state(), StreamState::Done);
    assert_eq!(ctx.total_bytes_written(), 0);
    assert!(matches!(ctx.do_final(&[], &mut dst), Err(CipherError::BadState(_))));
}

#[test]
fn padded_decrypt_without_ciphertext_fails() {
    let mut ctx = context(Algorithm::Cbc, Direction::Decrypt, Padding::Pkcs7);
    assert!(matches!(ctx.do_final(&[], &mut []), Err(CipherError::BadLength(_))));
}

// ─────────────────────────────────────────────────────────────────────────────
// Alignment enforcement
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn unaligned_block_cipher_fails_regardless_of_chunking() {
    for splits in [vec![], vec![5], vec![16], vec![3, 3, 3], vec![17]] {
        for direction in [Direction::Encrypt, Direction::Decrypt] {
            let mut ctx = context(Algorithm::Cbc, direction, Padding::None);
            let err = drive(&mut ctx, &test_plaintext(33), &splits).unwrap_err();
            assert!(matches!(err, CipherError::BadLength(_)), "{direction} {splits:?}");
        }
    }
}

#[test]
fn unpadded_block_cipher_rejects_empty_message() {
    let mut ctx = context(Algorithm::Ecb, Direction::Encrypt, Padding::None);
    assert!(matches!(ctx.do_final(&[], &mut []), Err(CipherError::BadLength(_))));
}

#[test]
fn unpadded_block_cipher_allows_empty_final_after_updates() {
    let plaintext = test_plaintext(64);
    let reference =
        one_shot(Algorithm::Cbc, Direction::Encrypt, Padding::None, &plaintext).unwrap();

    let mut ctx = context(Algorithm::Cbc, Direction::Encrypt, Padding::None);
    let driven = drive(&mut ctx, &plaintext, &[64]).unwrap();
    assert_eq!(driven.reported, vec![64, 0]);
    assert_eq!(driven.output, reference);
}

// ─────────────────────────────────────────────────────────────────────────────
// Accounting
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn total_equals_reported_plus_stripped_padding() {
    let mut rng = StdRng::seed_from_u64(7);

    for &(algorithm, padding) in ALL_MODES {
        for _ in 0..20 {
            let len = rng.random_range(1..200);
            let len = if accepts_len(algorithm, padding, len) { len } else { 16 * (len / 16 + 1) };
            let plaintext = test_plaintext(len);

            let splits = random_splits(&mut rng, len);
            let mut enc = context(algorithm, Direction::Encrypt, padding);
            let encrypted = drive(&mut enc, &plaintext, &splits).unwrap();
            let reported: usize = encrypted.reported.iter().sum();
            assert_eq!(enc.total_bytes_written(), reported as u64);
            assert_eq!(enc.strip_pad_bytes(), 0);

            let splits = random_splits(&mut rng, encrypted.output.len());
            let mut dec = context(algorithm, Direction::Decrypt, padding);
            let decrypted = drive(&mut dec, &encrypted.output, &splits).unwrap();
            let reported: usize = decrypted.reported.iter().sum();
            assert_eq!(
                dec.total_bytes_written(),
                (reported + dec.strip_pad_bytes()) as u64,
                "{algorithm} {padding:?}"
            );
            assert_eq!(reported, len);
        }
    }
}

#[test]
fn cbc_pkcs7_split_twenty_bytes() {
    let plaintext = test_plaintext(20);
    let reference =
        one_shot(Algorithm::Cbc, Direction::Encrypt, Padding::Pkcs7, &plaintext).unwrap();

    let mut ctx = context(Algorithm::Cbc, Direction::Encrypt, Padding::Pkcs7);
    let mut out = vec![0u8; 32];
    assert_eq!(ctx.update(&plaintext[..10], &mut out).unwrap(), 0);
    assert_eq!(ctx.gather_used(), 10);
    assert_eq!(ctx.state(), StreamState::Accumulating);
    assert_eq!(ctx.do_final(&plaintext[10..], &mut out).unwrap(), 32);
    assert_eq!(out, reference);
    assert_eq!(ctx.state(), StreamState::Done);
    assert!(ctx.is_last());

    let mut dec = context(Algorithm::Cbc, Direction::Decrypt, Padding::Pkcs7);
    let mut plain = vec![0u8; 32];
    let n = dec.do_final(&out, &mut plain).unwrap();
    assert_eq!(n, 20);
    assert_eq!(dec.strip_pad_bytes(), 12);
    assert_eq!(dec.total_bytes_written(), 32);
    assert_eq!(&plain[..n], &plaintext[..]);
}

#[test]
fn ctr_split_thirty_three_bytes() {
    let plaintext = test_plaintext(33);
    let reference =
        one_shot(Algorithm::Ctr, Direction::Encrypt, Padding::None, &plaintext).unwrap();
    assert_eq!(reference.len(), 33);

    let mut ctx = context(Algorithm::Ctr, Direction::Encrypt, Padding::None);
    let mut out = Vec::new();
    for piece in plaintext[..30].chunks(10) {
        let mut dst = vec![0u8; ctx.update_len(piece.len()).unwrap()];
        let n = ctx.update(piece, &mut dst).unwrap();
        out.extend_from_slice(&dst[..n]);
    }
    let mut dst = vec![0u8; ctx.final_len(3).unwrap()];
    assert_eq!(dst.len(), 33 - out.len());
    let n = ctx.do_final(&plaintext[30..], &mut dst).unwrap();
    out.extend_from_slice(&dst[..n]);

    assert_eq!(out, reference);
    assert_eq!(ctx.total_bytes_written(), 33);
}

// ─────────────────────────────────────────────────────────────────────────────
// Lifecycle
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn empty_update_is_a_no_op() {
    let mut ctx = context(Algorithm::Ofb, Direction::Encrypt, Padding::None);
    assert_eq!(ctx.update(&[], &mut []).unwrap(), 0);
    assert_eq!(ctx.state(), StreamState::Empty);
    assert_eq!(ctx.engine().calls(), 0);
}

#[test]
fn done_context_rejects_everything() {
    let mut ctx = context(Algorithm::Ctr, Direction::Encrypt, Padding::None);
    let mut dst = [0u8; 4];
    ctx.do_final(&[1, 2, 3, 4], &mut dst).unwrap();

    assert_eq!(
        ctx.update(&[1], &mut dst).unwrap_err(),
        CipherError::BadState("context already finalized".into())
    );
    assert!(matches!(ctx.do_final(&[], &mut dst), Err(CipherError::BadState(_))));
    assert!(matches!(ctx.begin_async(&[1]), Err(CipherError::BadState(_))));
}

#[test]
fn short_output_buffer_leaves_context_usable() {
    let plaintext = test_plaintext(80);
    let reference =
        one_shot(Algorithm::Ecb, Direction::Encrypt, Padding::None, &plaintext).unwrap();

    let mut ctx = context(Algorithm::Ecb, Direction::Encrypt, Padding::None);
    let mut small = [0u8; 8];
    assert!(matches!(ctx.update(&plaintext, &mut small), Err(CipherError::BadLength(_))));
    assert_eq!(ctx.state(), StreamState::Empty);

    let driven = drive(&mut ctx, &plaintext, &[80]).unwrap();
    assert_eq!(driven.output, reference);
}

#[test]
fn short_final_buffer_is_rejected() {
    let mut ctx = context(Algorithm::Cbc, Direction::Encrypt, Padding::Pkcs7);
    let mut dst = [0u8; 15];
    assert!(matches!(ctx.do_final(&[0u8; 3], &mut dst), Err(CipherError::BadLength(_))));
}

#[test]
fn engine_failure_is_terminal() {
    let engine = RecordingEngine {
        fail_on_call: Some(1),
        ..RecordingEngine::default()
    };
    let mut ctx = CipherContextBuilder::new(Algorithm::Ctr, Direction::Encrypt)
        .build(engine)
        .unwrap();
    let input = test_plaintext(128);
    let mut dst = vec![0u8; 128];

    // first direct pass succeeds
    assert_eq!(ctx.update(&input, &mut dst).unwrap(), 128);
    let err = ctx.update(&input, &mut dst).unwrap_err();
    assert!(matches!(err, CipherError::Engine(_)));
    assert_eq!(ctx.state(), StreamState::Done);
    assert_eq!(ctx.total_bytes_written(), 128);
    assert_eq!(ctx.gather_used(), 0);
}

#[test]
fn engine_flags_mark_first_and_last_call_only() {
    let mut rng = StdRng::seed_from_u64(99);

    for _ in 0..50 {
        let len = rng.random_range(1..400);
        let splits = random_splits(&mut rng, len);
        let mut ctx = CipherContextBuilder::new(Algorithm::Ctr, Direction::Encrypt)
            .with_max_engine_chunk(32)
            .build(RecordingEngine::default())
            .unwrap();
        drive(&mut ctx, &test_plaintext(len), &splits).unwrap();

        let calls = &ctx.engine().calls;
        assert!(calls.iter().all(|c| c.len <= 32 && c.len % 16 == 0));
        assert!(calls[0].is_first);
        assert_eq!(calls.iter().filter(|c| c.is_first).count(), 1, "splits {splits:?}");
        // an aligned stream may be fully processed by updates, leaving
        // do-final nothing to hand the engine
        let last_count = calls.iter().filter(|c| c.is_last).count();
        assert!(last_count <= 1, "splits {splits:?}");
        if len % 16 != 0 {
            assert_eq!(last_count, 1, "splits {splits:?}");
        }
        if last_count == 1 {
            assert!(calls.last().is_some_and(|c| c.is_last));
        }
    }
}

#[test]
fn filling_the_gather_buffer_flushes_it_mid_stream() {
    let input = test_plaintext(64);
    let mut dst = [0u8; 64];

    // a padded stream keeps its last gathered block for do-final
    let mut padded = CipherContextBuilder::new(Algorithm::Cbc, Direction::Encrypt)
        .with_padding(Padding::Pkcs7)
        .build(RecordingEngine::default())
        .unwrap();
    assert_eq!(padded.update(&input[..30], &mut dst).unwrap(), 0);
    assert_eq!(padded.update(&input[30..], &mut dst).unwrap(), 48);
    assert_eq!(&dst[..48], &input[..48]);
    assert_eq!(padded.gather_used(), 16);
    assert_eq!(padded.state(), StreamState::Accumulating);
    assert_eq!(
        padded.engine().calls,
        vec![RecordedCall { len: 48, is_first: true, is_last: false }]
    );

    let mut unpadded = CipherContextBuilder::new(Algorithm::Ctr, Direction::Encrypt)
        .build(RecordingEngine::default())
        .unwrap();
    assert_eq!(unpadded.update(&input[..30], &mut dst).unwrap(), 0);
    assert_eq!(unpadded.update(&input[30..], &mut dst).unwrap(), 64);
    assert_eq!(&dst[..], &input[..]);
    assert_eq!(unpadded.gather_used(), 0);
    assert_eq!(unpadded.state(), StreamState::Empty);

    // decryption hands the tag module the flushed ciphertext before the engine runs
    let tag = RecordingTag::default();
    let mut gcm = CipherContextBuilder::new(Algorithm::Gcm, Direction::Decrypt)
        .with_aead_tag(Box::new(tag.clone()))
        .build(RecordingEngine::default())
        .unwrap();
    gcm.update(&input[..30], &mut dst).unwrap();
    assert!(tag.log.lock().unwrap().ciphertext.is_empty());
    assert_eq!(gcm.update(&input[30..], &mut dst).unwrap(), 64);
    assert_eq!(tag.log.lock().unwrap().ciphertext, input);
}

#[test]
fn small_engine_ceiling_gives_same_ciphertext() {
    let plaintext = test_plaintext(1000);
    let reference =
        one_shot(Algorithm::Cbc, Direction::Encrypt, Padding::Pkcs7, &plaintext).unwrap();

    let mut ctx = CipherContextBuilder::new(Algorithm::Cbc, Direction::Encrypt)
        .with_padding(Padding::Pkcs7)
        .with_max_engine_chunk(16)
        .build(software_engine(Algorithm::Cbc, Direction::Encrypt))
        .unwrap();
    let driven = drive(&mut ctx, &plaintext, &[300, 1, 99]).unwrap();

    assert_eq!(driven.output, reference);
    assert_eq!(ctx.engine().calls(), reference.len() / 16);
}

// ─────────────────────────────────────────────────────────────────────────────
// Async gate
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn sync_calls_blocked_while_async_in_flight() {
    let mut ctx = context(Algorithm::Ctr, Direction::Encrypt, Padding::None);
    let mut dst = [0u8; 64];

    ctx.begin_async(&[0u8; 16]).unwrap();
    assert!(matches!(ctx.update(&[1; 4], &mut dst), Err(CipherError::BadState(_))));
    assert!(matches!(ctx.do_final(&[1; 4], &mut dst), Err(CipherError::BadState(_))));
    assert!(matches!(ctx.begin_async(&[0u8; 16]), Err(CipherError::BadState(_))));

    ctx.complete_async().unwrap();
    assert_eq!(ctx.do_final(&[1; 4], &mut dst).unwrap(), 4);
}

#[test]
fn async_needs_input_and_contiguous_memory() {
    let mut ctx = context(Algorithm::Ctr, Direction::Encrypt, Padding::None);
    assert!(matches!(ctx.begin_async(&[]), Err(CipherError::InvalidArgs(_))));
    assert!(matches!(ctx.complete_async(), Err(CipherError::BadState(_))));

    let mut fragmented = CipherContextBuilder::new(Algorithm::Ctr, Direction::Encrypt)
        .build(RecordingEngine {
            fragmented: true,
            ..RecordingEngine::default()
        })
        .unwrap();
    assert!(matches!(fragmented.begin_async(&[0u8; 16]), Err(CipherError::InvalidArgs(_))));
}

// ─────────────────────────────────────────────────────────────────────────────
// Collaborators
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn gcm_tag_sees_exactly_the_ciphertext() {
    let mut rng = StdRng::seed_from_u64(3);

    for len in [1usize, 15, 16, 17, 64, 65, 200] {
        let plaintext = test_plaintext(len);

        let tag = RecordingTag::default();
        let mut enc =
            context_with_tag(Algorithm::Gcm, Direction::Encrypt, Padding::None, tag.clone());
        let splits = random_splits(&mut rng, len);
        let ciphertext = drive(&mut enc, &plaintext, &splits).unwrap().output;
        {
            let log = tag.log.lock().unwrap();
            assert_eq!(log.ciphertext, ciphertext, "encrypt len {len}");
            assert_eq!(log.finalized, 1);
        }

        let tag = RecordingTag::default();
        let mut dec =
            context_with_tag(Algorithm::Gcm, Direction::Decrypt, Padding::None, tag.clone());
        let splits = random_splits(&mut rng, len);
        let decrypted = drive(&mut dec, &ciphertext, &splits).unwrap().output;
        assert_eq!(decrypted, plaintext);
        let log = tag.log.lock().unwrap();
        assert_eq!(log.ciphertext, ciphertext, "decrypt len {len}");
        assert_eq!(log.finalized, 1);
    }
}

#[test]
fn keyslot_output_never_reaches_memory() {
    let input = test_plaintext(48);
    let expected = one_shot(Algorithm::Ecb, Direction::Encrypt, Padding::None, &input).unwrap();

    let mut ctx = CipherContextBuilder::new(Algorithm::Ecb, Direction::Encrypt)
        .into_keyslot()
        .build(software_engine(Algorithm::Ecb, Direction::Encrypt))
        .unwrap();

    assert_eq!(ctx.update_len(32).unwrap(), 0);
    assert_eq!(ctx.update(&input[..32], &mut []).unwrap(), 0);
    assert_eq!(ctx.do_final(&input[32..], &mut []).unwrap(), 0);
    assert_eq!(ctx.state(), StreamState::Done);
    assert_eq!(ctx.total_bytes_written(), 0);

    let engine = ctx.into_engine();
    assert_eq!(engine.keyslot(), &expected[..]);
    assert!(engine.is_finalized());
}

#[test]
fn keyslot_rejects_unaligned_input() {
    let mut ctx = CipherContextBuilder::new(Algorithm::Ecb, Direction::Encrypt)
        .into_keyslot()
        .build(RecordingEngine::default())
        .unwrap();
    assert!(matches!(ctx.update(&[0u8; 20], &mut []), Err(CipherError::BadLength(_))));
    assert!(matches!(ctx.do_final(&[], &mut []), Err(CipherError::BadLength(_))));
}

#[test]
fn shared_engine_serves_a_context() {
    let shared = SharedEngine::new(RecordingEngine::default());
    let mut ctx = CipherContextBuilder::new(Algorithm::Ofb, Direction::Encrypt)
        .build(shared.clone())
        .unwrap();

    let input = test_plaintext(70);
    let driven = drive(&mut ctx, &input, &[20, 50]).unwrap();
    assert_eq!(driven.output, input, "identity engine");

    let calls = shared.with_engine(|engine| engine.calls.clone()).unwrap();
    assert!(calls[0].is_first);
    assert!(calls.last().is_some_and(|c| c.is_last));
}
